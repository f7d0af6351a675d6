//! Append-only index of contributed training data.
//!
//! The registry enforces authorship and key uniqueness and keeps the claim
//! bookkeeping for each deposit; it never decides payouts. Both incentive
//! mechanisms share it.

use std::collections::{HashMap, HashSet};

use crate::error::Reject;
use crate::features::{FeatureVector, Label};
use crate::types::{Address, Amount};

/// Identity of one contribution: the canonicalized features, the submitted
/// label, the submit time, and the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataKey {
    pub data: FeatureVector,
    pub label: Label,
    pub time: u64,
    pub sender: Address,
}

impl DataKey {
    pub fn new(data: &FeatureVector, label: Label, time: u64, sender: &str) -> Self {
        Self {
            data: data.canonicalize(),
            label,
            time,
            sender: sender.to_string(),
        }
    }
}

/// Stored meta-data for one contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredData {
    pub label: Label,
    /// The time the data was added, in seconds.
    pub time: u64,
    pub sender: Address,
    /// The deposit given when the data was added. Immutable.
    pub initial_deposit: Amount,
    /// The portion of the deposit that can still be claimed.
    pub claimable_amount: Amount,
    /// Addresses that have already claimed against this entry.
    pub claimed_by: HashSet<Address>,
}

impl StoredData {
    pub fn is_claimed_by(&self, address: &str) -> bool {
        self.claimed_by.contains(address)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataRegistry {
    added: HashMap<DataKey, StoredData>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    pub fn get_data(
        &self,
        data: &FeatureVector,
        label: Label,
        added_time: u64,
        original_author: &str,
    ) -> Option<&StoredData> {
        self.added
            .get(&DataKey::new(data, label, added_time, original_author))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataKey, &StoredData)> {
        self.added.iter()
    }

    /// Record an accepted contribution. The same key can only be added once.
    pub fn handle_add_data(
        &mut self,
        now: u64,
        sender: &str,
        cost: Amount,
        data: &FeatureVector,
        label: Label,
    ) -> Result<(), Reject> {
        let key = DataKey::new(data, label, now, sender);
        if self.added.contains_key(&key) {
            return Err(Reject::DuplicateData);
        }
        self.added.insert(
            key,
            StoredData {
                label,
                time: now,
                sender: sender.to_string(),
                initial_deposit: cost,
                claimable_amount: cost,
                claimed_by: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Look up a refund attempt. Returns the claimable amount, whether the
    /// submitter already claimed, and a copy of the entry for the mechanism.
    pub fn handle_refund(
        &self,
        submitter: &str,
        data: &FeatureVector,
        label: Label,
        added_time: u64,
    ) -> Result<(Amount, bool, StoredData), Reject> {
        let stored = self
            .get_data(data, label, added_time, submitter)
            .ok_or(Reject::DataNotFound)?;
        if stored.sender != submitter {
            return Err(Reject::NotFromSender);
        }
        Ok((
            stored.claimable_amount,
            stored.is_claimed_by(submitter),
            stored.clone(),
        ))
    }

    /// Look up a report attempt against someone else's entry.
    pub fn handle_report(
        &self,
        reporter: &str,
        data: &FeatureVector,
        label: Label,
        added_time: u64,
        original_author: &str,
    ) -> Result<(bool, StoredData), Reject> {
        let stored = self
            .get_data(data, label, added_time, original_author)
            .ok_or(Reject::DataNotFound)?;
        // The claim is recorded in `update_claimable_amount`, once the whole
        // operation is known to succeed.
        Ok((stored.is_claimed_by(reporter), stored.clone()))
    }

    /// Mark `receiver`'s claim and deduct the paid amount. Saturates at zero:
    /// the market mechanism can pay out more than one entry's deposit.
    pub fn update_claimable_amount(
        &mut self,
        receiver: &str,
        data: &FeatureVector,
        label: Label,
        added_time: u64,
        original_author: &str,
        reward_amount: Amount,
    ) -> Result<(), Reject> {
        let key = DataKey::new(data, label, added_time, original_author);
        let stored = self.added.get_mut(&key).ok_or(Reject::DataNotFound)?;
        stored.claimed_by.insert(receiver.to_string());
        stored.claimable_amount = (stored.claimable_amount - reward_amount).max(0.0);
        Ok(())
    }
}
