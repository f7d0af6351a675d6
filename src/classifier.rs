//! The classifier contract the incentive mechanisms rely on.
//!
//! Concrete models are external collaborators; any online learner satisfying
//! this trait is pluggable. The incentive layer never inspects model
//! internals, it only updates, predicts, evaluates, and (for the prediction
//! market) resets to a saved snapshot.

use crate::error::Reject;
use crate::features::{FeatureVector, Label};

pub trait Classifier {
    /// Fit the model to an initial dataset. Fails on re-initialization.
    /// With `save_model`, a snapshot of the fitted state is kept so
    /// [`Classifier::reset_model`] can restore it later.
    fn init_model(
        &mut self,
        data: &[FeatureVector],
        labels: &[Label],
        save_model: bool,
    ) -> Result<(), Reject>;

    /// Restore the state saved by `init_model`. Fails without a snapshot.
    fn reset_model(&mut self) -> Result<(), Reject>;

    /// Online update with a single sample.
    fn update(&mut self, data: &FeatureVector, label: Label);

    /// Predicted label for one sample.
    fn predict(&self, data: &FeatureVector) -> Label;

    /// Accuracy in `[0, 1]` on the given test set.
    fn evaluate(&self, data: &[FeatureVector], labels: &[Label]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let correct = data
            .iter()
            .zip(labels)
            .filter(|(x, y)| self.predict(x) == **y)
            .count();
        correct as f64 / data.len() as f64
    }
}
