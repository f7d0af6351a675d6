//! Scripted classifiers for exercising the incentive layer without a real
//! learner. The mechanisms only ever see the `Classifier` surface.

#![allow(dead_code)]

use std::collections::HashMap;

use databounty::{Classifier, FeatureVector, Label, Reject};

/// Always predicts the same label and never learns.
pub struct FixedModel {
    label: Label,
    initialized: bool,
    saved: bool,
}

impl FixedModel {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            initialized: false,
            saved: false,
        }
    }
}

impl Classifier for FixedModel {
    fn init_model(
        &mut self,
        _data: &[FeatureVector],
        _labels: &[Label],
        save_model: bool,
    ) -> Result<(), Reject> {
        if self.initialized {
            return Err(Reject::AlreadyInitialized);
        }
        self.initialized = true;
        self.saved = save_model;
        Ok(())
    }

    fn reset_model(&mut self) -> Result<(), Reject> {
        if !self.saved {
            return Err(Reject::ModelNotSaved);
        }
        Ok(())
    }

    fn update(&mut self, _data: &FeatureVector, _label: Label) {}

    fn predict(&self, _data: &FeatureVector) -> Label {
        self.label
    }
}

/// Memorizes the last label taught for each exact feature vector; anything
/// unseen gets the default label. Deterministic, which makes reward-loop
/// accounting checkable by hand.
pub struct TableModel {
    default_label: Label,
    table: HashMap<FeatureVector, Label>,
    snapshot: Option<HashMap<FeatureVector, Label>>,
    initialized: bool,
}

impl TableModel {
    pub fn new(default_label: Label) -> Self {
        Self {
            default_label,
            table: HashMap::new(),
            snapshot: None,
            initialized: false,
        }
    }
}

impl Classifier for TableModel {
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
            self.table.insert(x.canonicalize(), *y);
        }
        self.initialized = true;
        if save_model {
            self.snapshot = Some(self.table.clone());
        }
        Ok(())
    }

    fn reset_model(&mut self) -> Result<(), Reject> {
        match &self.snapshot {
            Some(saved) => {
                self.table = saved.clone();
                Ok(())
            }
            None => Err(Reject::ModelNotSaved),
        }
    }

    fn update(&mut self, data: &FeatureVector, label: Label) {
        self.table.insert(data.canonicalize(), label);
    }

    fn predict(&self, data: &FeatureVector) -> Label {
        self.table
            .get(&data.canonicalize())
            .copied()
            .unwrap_or(self.default_label)
    }
}
