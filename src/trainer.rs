//! The collaborative trainer: the contract surface agents call.
//!
//! Routes `add_data` / `refund` / `report` / `predict` across the registry,
//! the incentive mechanism, the classifier, and the ledger. Each operation is
//! transactional: every check runs before any state is touched, and the
//! ledger transfer comes last so a rejection never charges the caller.

use crate::classifier::Classifier;
use crate::clock::Clock;
use crate::error::Reject;
use crate::features::{FeatureVector, Label};
use crate::incentive::IncentiveMechanism;
use crate::ledger::Ledger;
use crate::market::{PredictionMarket, TestSetPortion};
use crate::registry::DataRegistry;
use crate::types::{Address, Amount, Msg};

pub struct Trainer<M, I> {
    pub ledger: Ledger,
    pub clock: Clock,
    pub registry: DataRegistry,
    pub im: I,
    pub model: M,
    address: Address,
}

impl<M: Classifier, I: IncentiveMechanism> Trainer<M, I> {
    pub fn new(model: M, im: I) -> Self {
        Self {
            ledger: Ledger::new(),
            clock: Clock::new(),
            registry: DataRegistry::new(),
            im,
            model,
            address: "collaborative-trainer".to_string(),
        }
    }

    /// The trainer's own address: where deposits and bounties are held.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Submit one labeled sample with a deposit.
    pub fn add_data(&mut self, msg: &Msg, data: &FeatureVector, label: Label) -> Result<(), Reject> {
        let now = self.clock.now();
        // Check the key before the mechanism runs so a duplicate cannot
        // leave mechanism state behind.
        if self.registry.get_data(data, label, now, &msg.sender).is_some() {
            return Err(Reject::DuplicateData);
        }
        let (cost, update_model) =
            self.im
                .handle_add_data(now, &msg.sender, msg.value, data, label)?;
        self.registry
            .handle_add_data(now, &msg.sender, cost, data, label)?;
        if update_model {
            self.model.update(data, label);
        }
        // The charge comes last so earlier rejects never move funds.
        self.ledger.send(&msg.sender, &self.address, cost)?;
        Ok(())
    }

    /// Reclaim the deposit on one's own submission. Returns the amount paid.
    pub fn refund(
        &mut self,
        msg: &Msg,
        data: &FeatureVector,
        label: Label,
        added_time: u64,
    ) -> Result<Amount, Reject> {
        let now = self.clock.now();
        let (claimable_amount, claimed_by_submitter, stored) =
            self.registry
                .handle_refund(&msg.sender, data, label, added_time)?;
        let prediction = self.model.predict(data);
        let refund_amount = self.im.handle_refund(
            now,
            &msg.sender,
            &stored,
            claimable_amount,
            claimed_by_submitter,
            prediction,
        )?;
        self.ledger.send(&self.address, &msg.sender, refund_amount)?;
        self.registry.update_claimable_amount(
            &msg.sender,
            data,
            label,
            added_time,
            &msg.sender,
            refund_amount,
        )?;
        Ok(refund_amount)
    }

    /// Report someone else's bad or stale submission for a reward.
    pub fn report(
        &mut self,
        msg: &Msg,
        data: &FeatureVector,
        label: Label,
        added_time: u64,
        original_author: &str,
    ) -> Result<Amount, Reject> {
        let now = self.clock.now();
        let (claimed_by_reporter, stored) =
            self.registry
                .handle_report(&msg.sender, data, label, added_time, original_author)?;
        // The mechanism may reject before it ever needs the prediction, so
        // hand it a thunk instead of evaluating eagerly.
        let model = &self.model;
        let mut prediction = || model.predict(data);
        let reward_amount = self.im.handle_report(
            now,
            &msg.sender,
            &stored,
            claimed_by_reporter,
            &mut prediction,
        )?;
        self.registry.update_claimable_amount(
            &msg.sender,
            data,
            label,
            added_time,
            original_author,
            reward_amount,
        )?;
        self.ledger.send(&self.address, &msg.sender, reward_amount)?;
        Ok(reward_amount)
    }

    /// Query the model, sharing any payment with past contributors.
    pub fn predict(&mut self, msg: &Msg, data: &FeatureVector) -> Result<Label, Reject> {
        self.im
            .distribute_payment_for_prediction(&mut self.ledger, &msg.sender, msg.value)?;
        Ok(self.model.predict(data))
    }
}

/// Market-lifecycle passthroughs, available when the trainer runs a
/// prediction market. These keep the clock, ledger, and model wiring in one
/// place so drivers only talk to the trainer.
impl<M: Classifier> Trainer<M, PredictionMarket> {
    pub fn initialize_market(
        &mut self,
        msg: &Msg,
        test_set_hashes: Vec<String>,
        min_length_s: u64,
        min_num_contributions: usize,
    ) -> Result<usize, Reject> {
        let now = self.clock.now();
        let owner = self.address.clone();
        self.im.initialize_market(
            msg,
            test_set_hashes,
            min_length_s,
            min_num_contributions,
            now,
            &mut self.ledger,
            &owner,
        )
    }

    pub fn add_test_set_hashes(
        &mut self,
        msg: &Msg,
        more_hashes: Vec<String>,
    ) -> Result<usize, Reject> {
        self.im.add_test_set_hashes(msg, more_hashes)
    }

    pub fn reveal_init_test_set(&mut self, portion: &TestSetPortion) -> Result<(), Reject> {
        self.im.reveal_init_test_set(portion)
    }

    pub fn end_market(&mut self) -> Result<(), Reject> {
        let now = self.clock.now();
        self.im.end_market(now)
    }

    pub fn verify_next_test_set(&mut self, portion: &TestSetPortion) -> Result<(), Reject> {
        self.im.verify_next_test_set(portion)
    }

    pub fn process_contribution(&mut self) -> Result<(), Reject> {
        let now = self.clock.now();
        self.im.process_contribution(&mut self.model, now)
    }
}
