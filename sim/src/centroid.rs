//! Nearest-centroid classifier.
//!
//! Keeps a running mean per label and predicts the label of the closest
//! centroid. Cheap, deterministic, and untouched by sample order, which
//! makes it a useful second collaborator for the incentive layer.

use std::collections::BTreeMap;

use databounty::{Classifier, FeatureVector, Label, Reject};

#[derive(Debug, Clone, Default)]
struct Centroid {
    sums: BTreeMap<u32, f64>,
    count: u64,
}

impl Centroid {
    fn add(&mut self, data: &FeatureVector) {
        for (i, v) in data.pairs() {
            *self.sums.entry(i).or_insert(0.0) += v;
        }
        self.count += 1;
    }

    fn distance_squared(&self, data: &FeatureVector) -> f64 {
        let point: BTreeMap<u32, f64> = data.pairs().into_iter().collect();
        let mut distance = 0.0;
        for (i, sum) in &self.sums {
            let mean = sum / self.count as f64;
            let x = point.get(i).copied().unwrap_or(0.0);
            distance += (x - mean) * (x - mean);
        }
        for (i, x) in &point {
            if !self.sums.contains_key(i) {
                distance += x * x;
            }
        }
        distance
    }
}

pub struct NearestCentroid {
    centroids: BTreeMap<Label, Centroid>,
    snapshot: Option<BTreeMap<Label, Centroid>>,
    initialized: bool,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self {
            centroids: BTreeMap::new(),
            snapshot: None,
            initialized: false,
        }
    }
}

impl Default for NearestCentroid {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for NearestCentroid {
    fn init_model(
        &mut self,
        data: &[FeatureVector],
        labels: &[Label],
        save_model: bool,
    ) -> Result<(), Reject> {
        if self.initialized {
            return Err(Reject::AlreadyInitialized);
        }
        for (x, y) in data.iter().zip(labels) {
            self.update(x, *y);
        }
        self.initialized = true;
        if save_model {
            self.snapshot = Some(self.centroids.clone());
        }
        Ok(())
    }

    fn reset_model(&mut self) -> Result<(), Reject> {
        match &self.snapshot {
            Some(saved) => {
                self.centroids = saved.clone();
                Ok(())
            }
            None => Err(Reject::ModelNotSaved),
        }
    }

    fn update(&mut self, data: &FeatureVector, label: Label) {
        self.centroids.entry(label).or_default().add(data);
    }

    fn predict(&self, data: &FeatureVector) -> Label {
        let mut best: Option<(Label, f64)> = None;
        // Label order, so distance ties resolve deterministically.
        for (label, centroid) in &self.centroids {
            let distance = centroid.distance_squared(data);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((*label, distance));
            }
        }
        best.map(|(label, _)| label).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(values: &[f64]) -> FeatureVector {
        FeatureVector::dense(values.to_vec())
    }

    #[test]
    fn predicts_the_closest_centroid() {
        let mut model = NearestCentroid::new();
        let data = vec![
            dense(&[1.0, 1.0]),
            dense(&[1.2, 0.8]),
            dense(&[-1.0, -1.0]),
            dense(&[-0.8, -1.2]),
        ];
        let labels = vec![1, 1, 0, 0];
        model.init_model(&data, &labels, true).unwrap();
        assert_eq!(model.predict(&dense(&[0.9, 1.1])), 1);
        assert_eq!(model.predict(&dense(&[-1.1, -0.9])), 0);
        assert_eq!(model.evaluate(&data, &labels), 1.0);
    }

    #[test]
    fn updates_shift_the_centroid() {
        let mut model = NearestCentroid::new();
        model.init_model(&[dense(&[1.0]), dense(&[-1.0])], &[1, 0], true).unwrap();
        // Drag the positive centroid far to the negative side.
        for _ in 0..20 {
            model.update(&dense(&[-5.0]), 1);
        }
        assert_eq!(model.predict(&dense(&[-4.0])), 1);
        model.reset_model().unwrap();
        assert_eq!(model.predict(&dense(&[-4.0])), 0);
    }
}
