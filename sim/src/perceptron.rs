//! Online perceptron over sparse or dense features.
//!
//! Weights live in a map keyed by feature index, so the model never needs to
//! know the dimensionality up front and works with either representation.

use std::collections::HashMap;

use databounty::{Classifier, FeatureVector, Label, Reject};

pub struct Perceptron {
    weights: HashMap<u32, f64>,
    bias: f64,
    learning_rate: f64,
    epochs: usize,
    snapshot: Option<(HashMap<u32, f64>, f64)>,
    initialized: bool,
}

impl Perceptron {
    pub fn new() -> Self {
        Self::with_params(1.0, 5)
    }

    pub fn with_params(learning_rate: f64, epochs: usize) -> Self {
        Self {
            weights: HashMap::new(),
            bias: 0.0,
            learning_rate,
            epochs,
            snapshot: None,
            initialized: false,
        }
    }

    fn raw_score(&self, data: &FeatureVector) -> f64 {
        let mut score = self.bias;
        for (i, v) in data.pairs() {
            score += self.weights.get(&i).copied().unwrap_or(0.0) * v;
        }
        score
    }
}

impl Default for Perceptron {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for Perceptron {
    fn init_model(
        &mut self,
        data: &[FeatureVector],
        labels: &[Label],
        save_model: bool,
    ) -> Result<(), Reject> {
        if self.initialized {
            return Err(Reject::AlreadyInitialized);
        }
        for _ in 0..self.epochs {
            for (x, y) in data.iter().zip(labels) {
                self.update(x, *y);
            }
        }
        self.initialized = true;
        if save_model {
            self.snapshot = Some((self.weights.clone(), self.bias));
        }
        Ok(())
    }

    fn reset_model(&mut self) -> Result<(), Reject> {
        match &self.snapshot {
            Some((weights, bias)) => {
                self.weights = weights.clone();
                self.bias = *bias;
                Ok(())
            }
            None => Err(Reject::ModelNotSaved),
        }
    }

    fn update(&mut self, data: &FeatureVector, label: Label) {
        // Classic mistake-driven rule: only move on a wrong prediction.
        if self.predict(data) == label {
            return;
        }
        let direction = if label == 1 { 1.0 } else { -1.0 };
        let step = self.learning_rate * direction;
        for (i, v) in data.pairs() {
            *self.weights.entry(i).or_insert(0.0) += step * v;
        }
        self.bias += step;
    }

    fn predict(&self, data: &FeatureVector) -> Label {
        if self.raw_score(data) >= 0.0 {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(values: &[f64]) -> FeatureVector {
        FeatureVector::dense(values.to_vec())
    }

    #[test]
    fn learns_a_separable_rule() {
        let mut model = Perceptron::new();
        let data = vec![
            dense(&[2.0, 0.1]),
            dense(&[1.5, -0.2]),
            dense(&[-2.0, 0.3]),
            dense(&[-1.0, -0.1]),
        ];
        let labels = vec![1, 1, 0, 0];
        model.init_model(&data, &labels, true).unwrap();
        assert_eq!(model.evaluate(&data, &labels), 1.0);
        assert_eq!(model.predict(&dense(&[3.0, 0.0])), 1);
        assert_eq!(model.predict(&dense(&[-3.0, 0.0])), 0);
    }

    #[test]
    fn reset_restores_the_saved_state() {
        let mut model = Perceptron::new();
        let data = vec![dense(&[1.0]), dense(&[-1.0])];
        let labels = vec![1, 0];
        model.init_model(&data, &labels, true).unwrap();
        let before = model.predict(&dense(&[1.0]));
        // Push the model the other way, then restore.
        for _ in 0..10 {
            model.update(&dense(&[1.0]), 0);
        }
        assert_ne!(model.predict(&dense(&[1.0])), before);
        model.reset_model().unwrap();
        assert_eq!(model.predict(&dense(&[1.0])), before);
    }

    #[test]
    fn reset_without_snapshot_is_rejected() {
        let mut model = Perceptron::new();
        model.init_model(&[], &[], false).unwrap();
        assert_eq!(model.reset_model(), Err(Reject::ModelNotSaved));
    }

    #[test]
    fn double_initialization_is_rejected() {
        let mut model = Perceptron::new();
        model.init_model(&[], &[], true).unwrap();
        assert_eq!(model.init_model(&[], &[], true), Err(Reject::AlreadyInitialized));
    }

    #[test]
    fn handles_sparse_inputs() {
        let mut model = Perceptron::new();
        let data = vec![
            FeatureVector::sparse(vec![(3, 2.0)]),
            FeatureVector::sparse(vec![(7, 2.0)]),
        ];
        let labels = vec![1, 0];
        model.init_model(&data, &labels, false).unwrap();
        assert_eq!(model.predict(&FeatureVector::sparse(vec![(3, 2.0)])), 1);
        assert_eq!(model.predict(&FeatureVector::sparse(vec![(7, 2.0)])), 0);
    }
}
