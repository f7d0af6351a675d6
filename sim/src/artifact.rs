//! Persisted record of one simulation run.
//!
//! The JSON layout is shared with downstream tooling that combines and
//! plots runs, so the field names are part of the format.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use serde::Serialize;

use crate::agent::Agent;

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyPoint {
    pub t: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalancePoint {
    pub t: u64,
    /// Address.
    pub a: String,
    /// Balance.
    pub b: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunArtifact {
    pub agents: Vec<Agent>,
    pub baseline_accuracy: Option<f64>,
    pub init_train_data_portion: f64,
    pub accuracies: Vec<AccuracyPoint>,
    pub balances: Vec<BalancePoint>,
}

impl RunArtifact {
    pub fn new(agents: &[Agent], baseline_accuracy: Option<f64>, init_train_data_portion: f64) -> Self {
        Self {
            agents: agents.to_vec(),
            baseline_accuracy,
            init_train_data_portion,
            accuracies: Vec::new(),
            balances: Vec::new(),
        }
    }

    pub fn record_accuracy(&mut self, t: u64, accuracy: f64) {
        self.accuracies.push(AccuracyPoint { t, accuracy });
    }

    pub fn record_balance(&mut self, t: u64, address: &str, balance: f64) {
        self.balances.push(BalancePoint {
            t,
            a: address.to_string(),
            b: balance,
        });
    }

    /// Write the artifact as compact JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, self).map_err(io::Error::from)
    }
}
