//! Discrete-event simulator for the collaborative-AI marketplace.
//!
//! Drives a roster of stochastic agents against the contract surface in the
//! core crate: agents submit labeled samples with deposits, attempt refunds
//! and reports as the virtual clock advances, and the run is recorded as a
//! JSON artifact. Two external collaborators the core treats as ports are
//! provided here as well: online classifiers (a perceptron and a nearest
//! centroid model) and a seeded synthetic dataset.

pub mod agent;
pub mod artifact;
pub mod centroid;
pub mod data;
pub mod driver;
pub mod perceptron;

pub use agent::Agent;
pub use artifact::RunArtifact;
pub use centroid::NearestCentroid;
pub use data::Dataset;
pub use driver::{MarketRunOpts, SimOpts, Simulator};
pub use perceptron::Perceptron;
