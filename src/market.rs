//! Prediction-market incentive mechanism.
//!
//! A single-run market over a committed test set. The bounty provider commits
//! hashes of test-set pieces, opens one at random to prove the commitment,
//! and participants stake deposits on labeled samples. After participation
//! closes and the remaining pieces are revealed and checked, the reward loop
//! repeatedly trains the model over the contributions, scores each one by the
//! test-set accuracy change it produced, and spends bounty rounds driving the
//! worst contributor's stake to zero until either the bounty or the
//! contributions run out. What is left in each participant's market balance
//! is collected through the trainer's refund path.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::classifier::Classifier;
use crate::error::Reject;
use crate::features::{FeatureVector, Label};
use crate::incentive::IncentiveMechanism;
use crate::ledger::Ledger;
use crate::registry::StoredData;
use crate::stakeable::SECONDS_PER_DAY;
use crate::types::{Address, Amount, Msg};

/// One piece of the committed test set.
pub type TestSetPortion = Vec<(FeatureVector, Label)>;

/// The minimum deposit to participate in a market.
pub const MIN_STAKE: Amount = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPhase {
    /// No market has been initialized yet.
    Unstarted,
    /// Hashes committed; waiting for the challenge piece to be opened.
    Initialization,
    /// Accepting staked contributions.
    Participation,
    /// Participation closed; revealing and checking the remaining pieces.
    RevealTestSet,
    /// About to start (or restart) a pass over the contributions.
    RewardRestart,
    /// Mid-pass over the contributions.
    Reward,
    /// Rewards settled; market balances can be collected.
    RewardCollect,
}

#[derive(Debug, Clone, Copy)]
pub struct MarketConfig {
    /// If set, a contribution may stake more than the minimum (the stake is
    /// the sent amount); otherwise the stake is pinned to [`MIN_STAKE`].
    pub allow_greater_deposit: bool,
    /// If set, scores are tracked per contributor (summed across their
    /// contributions) instead of per individual contribution.
    pub group_contributions: bool,
    /// If set, the classifier is reset to its saved snapshot each time the
    /// reward loop restarts; otherwise the model trains once through and
    /// each contribution's post-update accuracy is captured on first pass.
    pub reset_model_during_reward_phase: bool,
    /// How long after rewards settle until anyone can take a participant's
    /// stale, uncollected market balance.
    pub any_address_claim_wait_s: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            allow_greater_deposit: false,
            group_contributions: false,
            reset_model_during_reward_phase: false,
            any_address_claim_wait_s: 9 * SECONDS_PER_DAY,
        }
    }
}

/// A single staked submission, alive only while the market runs.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub contributor: Address,
    pub data: FeatureVector,
    pub label: Label,
    /// The effective stake. When contributions are not grouped this decays
    /// as reward rounds are applied.
    pub balance: Amount,
    /// Test-accuracy change attributed to this contribution, per pass.
    pub score: Option<f64>,
    /// Accuracy snapshot taken on the first pass when the model is not reset
    /// between passes.
    pub accuracy: Option<f64>,
}

#[derive(Debug)]
pub struct PredictionMarket {
    config: MarketConfig,
    phase: MarketPhase,
    rng: ChaCha8Rng,

    // Commitment and bounty accounting.
    bounty_provider: Address,
    total_bounty: Amount,
    remaining_bounty_rounds: f64,
    test_set_hashes: Vec<String>,
    test_reveal_index: usize,
    next_test_set_index_to_verify: usize,
    min_length_s: u64,
    min_num_contributions: usize,
    market_start_s: u64,

    // The revealed test set, accumulated piece by piece.
    test_data: Vec<FeatureVector>,
    test_labels: Vec<Label>,

    // Participation and reward state.
    contributions: Vec<Contribution>,
    market_balances: BTreeMap<Address, Amount>,
    scores: BTreeMap<Address, f64>,
    num_contributions_per_user: BTreeMap<Address, usize>,
    next_index: usize,
    prev_acc: Option<f64>,
    original_acc: f64,
    min_score: f64,
    worst_contributor: Option<Address>,
    worst_index: Option<usize>,
    reward_phase_end_s: u64,
}

impl PredictionMarket {
    pub fn new(config: MarketConfig, seed: u64) -> Self {
        Self {
            config,
            phase: MarketPhase::Unstarted,
            rng: ChaCha8Rng::seed_from_u64(seed),
            bounty_provider: Address::new(),
            total_bounty: 0.0,
            remaining_bounty_rounds: 0.0,
            test_set_hashes: Vec::new(),
            test_reveal_index: 0,
            next_test_set_index_to_verify: 0,
            min_length_s: 0,
            min_num_contributions: 0,
            market_start_s: 0,
            test_data: Vec::new(),
            test_labels: Vec::new(),
            contributions: Vec::new(),
            market_balances: BTreeMap::new(),
            scores: BTreeMap::new(),
            num_contributions_per_user: BTreeMap::new(),
            next_index: 0,
            prev_acc: None,
            original_acc: 0.0,
            min_score: f64::INFINITY,
            worst_contributor: None,
            worst_index: None,
            reward_phase_end_s: 0,
        }
    }

    pub fn phase(&self) -> MarketPhase {
        self.phase
    }

    pub fn test_reveal_index(&self) -> usize {
        self.test_reveal_index
    }

    pub fn total_bounty(&self) -> Amount {
        self.total_bounty
    }

    pub fn remaining_bounty_rounds(&self) -> f64 {
        self.remaining_bounty_rounds
    }

    pub fn num_contributions(&self) -> usize {
        self.contributions.len()
    }

    pub fn min_num_contributions(&self) -> usize {
        self.min_num_contributions
    }

    /// Earliest virtual time at which the market may end regardless of how
    /// many contributions arrived.
    pub fn market_earliest_end_s(&self) -> u64 {
        self.market_start_s + self.min_length_s
    }

    pub fn market_balance(&self, address: &str) -> Amount {
        self.market_balances.get(address).copied().unwrap_or(0.0)
    }

    /// Commitment hash of one test-set piece: SHA-256 over the canonical
    /// JSON serialization of its `(features, label)` pairs, hex encoded.
    pub fn hash_test_set(portion: &TestSetPortion) -> String {
        let canonical: Vec<(FeatureVector, Label)> = portion
            .iter()
            .map(|(x, y)| (x.canonicalize(), *y))
            .collect();
        let bytes =
            serde_json::to_vec(&canonical).expect("serializing a test set cannot fail");
        hex::encode(Sha256::digest(&bytes))
    }

    /// Split a test set into `num_pieces` consecutive pieces and hash each.
    /// Returns the hashes alongside the pieces themselves.
    pub fn get_test_set_hashes(
        num_pieces: usize,
        x_test: &[FeatureVector],
        y_test: &[Label],
    ) -> (Vec<String>, Vec<TestSetPortion>) {
        assert_eq!(x_test.len(), y_test.len());
        let mut hashes = Vec::with_capacity(num_pieces);
        let mut portions = Vec::with_capacity(num_pieces);
        for i in 0..num_pieces {
            let start = i * x_test.len() / num_pieces;
            let end = (i + 1) * x_test.len() / num_pieces;
            let portion: TestSetPortion = x_test[start..end]
                .iter()
                .cloned()
                .zip(y_test[start..end].iter().copied())
                .collect();
            hashes.push(Self::hash_test_set(&portion));
            portions.push(portion);
        }
        (hashes, portions)
    }

    fn pick_reveal_index(&mut self) {
        self.test_reveal_index = self.rng.gen_range(0..self.test_set_hashes.len());
        self.next_test_set_index_to_verify = 0;
        if self.next_test_set_index_to_verify == self.test_reveal_index {
            self.next_test_set_index_to_verify += 1;
        }
    }

    /// Open a market. The message's value is the bounty, interpreted as the
    /// number of reward rounds, and is transferred to the market owner up
    /// front. Returns the index of the piece the provider must open before
    /// participation starts.
    pub fn initialize_market(
        &mut self,
        msg: &Msg,
        test_set_hashes: Vec<String>,
        min_length_s: u64,
        min_num_contributions: usize,
        now: u64,
        ledger: &mut Ledger,
        owner: &str,
    ) -> Result<usize, Reject> {
        if self.phase != MarketPhase::Unstarted {
            return Err(Reject::WrongPhase(self.phase));
        }
        if test_set_hashes.len() < 2 {
            return Err(Reject::NotEnoughHashes);
        }
        if !(msg.value >= 0.0) {
            return Err(Reject::InvalidAmount);
        }
        self.bounty_provider = msg.sender.clone();
        self.total_bounty = msg.value;
        self.remaining_bounty_rounds = msg.value;
        self.test_set_hashes = test_set_hashes;
        self.pick_reveal_index();
        self.min_length_s = min_length_s;
        self.min_num_contributions = min_num_contributions;
        self.market_start_s = now;
        ledger.send(&self.bounty_provider, owner, self.total_bounty)?;
        self.phase = MarketPhase::Initialization;
        Ok(self.test_reveal_index)
    }

    /// Commit more test-set hashes. Only the bounty provider may do this,
    /// and it must bring new hashes so it cannot be used just to reroll the
    /// challenge index. The challenge index is re-drawn over the grown list.
    pub fn add_test_set_hashes(
        &mut self,
        msg: &Msg,
        more_hashes: Vec<String>,
    ) -> Result<usize, Reject> {
        if self.phase != MarketPhase::Initialization {
            return Err(Reject::WrongPhase(self.phase));
        }
        if msg.sender != self.bounty_provider {
            return Err(Reject::NotBountyProvider);
        }
        if more_hashes.is_empty() {
            return Err(Reject::NeedsMoreHashes);
        }
        self.test_set_hashes.extend(more_hashes);
        self.pick_reveal_index();
        Ok(self.test_reveal_index)
    }

    fn verify_test_set(&self, index: usize, portion: &TestSetPortion) -> Result<(), Reject> {
        if Self::hash_test_set(portion) != self.test_set_hashes[index] {
            return Err(Reject::HashMismatch);
        }
        Ok(())
    }

    /// Open the challenge piece, proving the committed hashes are real data.
    pub fn reveal_init_test_set(&mut self, portion: &TestSetPortion) -> Result<(), Reject> {
        if self.phase != MarketPhase::Initialization {
            return Err(Reject::WrongPhase(self.phase));
        }
        self.verify_test_set(self.test_reveal_index, portion)?;
        self.phase = MarketPhase::Participation;
        Ok(())
    }

    /// Close participation. Allowed once enough contributions have arrived
    /// or the minimum market length has elapsed.
    pub fn end_market(&mut self, now: u64) -> Result<(), Reject> {
        if self.phase != MarketPhase::Participation {
            return Err(Reject::WrongPhase(self.phase));
        }
        if self.contributions.len() < self.min_num_contributions
            && now < self.market_earliest_end_s()
        {
            return Err(Reject::CannotEndMarketYet);
        }
        info!("ending market with {} contributions", self.contributions.len());
        self.phase = MarketPhase::RevealTestSet;
        self.next_index = 0;
        self.test_data.clear();
        self.test_labels.clear();
        Ok(())
    }

    /// Reveal the next unopened piece. Once every piece except the challenge
    /// one has been revealed and checked, the reward loop can start.
    pub fn verify_next_test_set(&mut self, portion: &TestSetPortion) -> Result<(), Reject> {
        if self.phase != MarketPhase::RevealTestSet {
            return Err(Reject::WrongPhase(self.phase));
        }
        self.verify_test_set(self.next_test_set_index_to_verify, portion)?;
        for (x, y) in portion {
            self.test_data.push(x.clone());
            self.test_labels.push(*y);
        }
        self.next_test_set_index_to_verify += 1;
        if self.next_test_set_index_to_verify == self.test_reveal_index {
            self.next_test_set_index_to_verify += 1;
        }
        if self.next_test_set_index_to_verify >= self.test_set_hashes.len() {
            self.phase = MarketPhase::RewardRestart;
        }
        Ok(())
    }

    /// One step of the reward loop: train the model with the next
    /// contribution and, at group boundaries, settle accuracy deltas into
    /// scores. At the end of a pass the worst score decides how many bounty
    /// rounds are spent and who is eliminated.
    pub fn process_contribution<M: Classifier>(
        &mut self,
        model: &mut M,
        now: u64,
    ) -> Result<(), Reject> {
        if self.remaining_bounty_rounds <= 0.0 {
            return Err(Reject::MarketEnded);
        }
        if self.phase == MarketPhase::RewardRestart {
            self.start_reward_pass(model, now)?;
            if self.phase != MarketPhase::Reward {
                // Nothing was left to process.
                return Ok(());
            }
        }
        if self.phase != MarketPhase::Reward {
            return Err(Reject::WrongPhase(self.phase));
        }

        let i = self.next_index;
        let (data, label, contributor) = {
            let c = &self.contributions[i];
            (c.data.clone(), c.label, c.contributor.clone())
        };
        *self
            .num_contributions_per_user
            .entry(contributor.clone())
            .or_insert(0) += 1;
        model.update(&data, label);
        if !self.config.reset_model_during_reward_phase && self.contributions[i].accuracy.is_none()
        {
            self.contributions[i].accuracy =
                Some(model.evaluate(&self.test_data, &self.test_labels));
        }
        self.next_index += 1;

        let finished_pass = self.next_index >= self.contributions.len();
        let group_boundary = finished_pass
            || (self.config.group_contributions
                && self.contributions[self.next_index].contributor != contributor);
        if group_boundary {
            let prev = self.prev_acc.unwrap_or(self.original_acc);
            let acc = if self.config.reset_model_during_reward_phase {
                model.evaluate(&self.test_data, &self.test_labels)
            } else {
                self.contributions[i].accuracy.unwrap_or(prev)
            };
            let score_change = acc - prev;
            let new_score = if self.config.group_contributions {
                let score = self.scores.entry(contributor.clone()).or_insert(0.0);
                *score += score_change;
                *score
            } else {
                self.contributions[i].score = Some(score_change);
                score_change
            };

            if new_score < self.min_score {
                self.min_score = new_score;
                if self.config.group_contributions {
                    self.worst_contributor = Some(contributor.clone());
                } else {
                    self.worst_index = Some(i);
                }
            } else if self.config.group_contributions
                && self.worst_contributor.as_deref() == Some(contributor.as_str())
            {
                // The tracked worst contributor just improved; rescan.
                self.min_score = f64::INFINITY;
                self.worst_contributor = None;
                for (address, score) in &self.scores {
                    if *score < self.min_score {
                        self.min_score = *score;
                        self.worst_contributor = Some(address.clone());
                    }
                }
            }
            self.prev_acc = Some(acc);

            if finished_pass {
                self.finish_reward_pass(now);
            }
        }
        Ok(())
    }

    fn start_reward_pass<M: Classifier>(&mut self, model: &mut M, now: u64) -> Result<(), Reject> {
        debug!("remaining bounty rounds: {}", self.remaining_bounty_rounds);
        self.next_index = 0;
        self.scores.clear();
        self.num_contributions_per_user.clear();
        self.worst_contributor = None;
        self.worst_index = None;
        self.min_score = f64::INFINITY;
        if self.contributions.is_empty() {
            self.remaining_bounty_rounds = 0.0;
            self.phase = MarketPhase::RewardCollect;
            self.reward_phase_end_s = now;
            return Ok(());
        }
        if self.config.reset_model_during_reward_phase {
            model.reset_model()?;
        }
        match self.prev_acc {
            None => {
                let acc = model.evaluate(&self.test_data, &self.test_labels);
                self.prev_acc = Some(acc);
                self.original_acc = acc;
                debug!("initial test set accuracy: {:.2}%", acc * 100.0);
            }
            // Later passes start from the accuracy of the untouched model.
            Some(_) => self.prev_acc = Some(self.original_acc),
        }
        self.phase = MarketPhase::Reward;
        Ok(())
    }

    fn finish_reward_pass(&mut self, now: u64) {
        if self.min_score < 0.0 {
            let available_pool = if self.config.group_contributions {
                self.worst_contributor
                    .as_deref()
                    .map(|w| self.market_balance(w))
                    .unwrap_or(0.0)
            } else {
                self.worst_index
                    .map(|i| self.contributions[i].balance)
                    .unwrap_or(0.0)
            };
            // Spend exactly enough rounds to drive the worst stake to zero,
            // capped by what is left of the bounty.
            let mut num_rounds = available_pool / -self.min_score;
            if num_rounds > self.remaining_bounty_rounds {
                num_rounds = self.remaining_bounty_rounds;
            }
            self.remaining_bounty_rounds -= num_rounds;
            if self.remaining_bounty_rounds == 0.0 {
                self.end_reward_phase(num_rounds, now);
            } else {
                self.apply_rounds_and_eliminate(num_rounds);
                if self.contributions.is_empty() {
                    self.remaining_bounty_rounds = 0.0;
                    self.phase = MarketPhase::RewardCollect;
                    self.reward_phase_end_s = now;
                } else {
                    self.phase = MarketPhase::RewardRestart;
                }
            }
        } else {
            // Nobody to eliminate: pay the whole remaining bounty out.
            let num_rounds = self.remaining_bounty_rounds;
            self.remaining_bounty_rounds = 0.0;
            self.end_reward_phase(num_rounds, now);
        }
    }

    fn apply_rounds_and_eliminate(&mut self, num_rounds: f64) {
        debug!("minimum score: {:.4}, applying {num_rounds} rounds", self.min_score);
        if self.config.group_contributions {
            for (address, score) in &self.scores {
                *self.market_balances.entry(address.clone()).or_insert(0.0) +=
                    score * num_rounds;
            }
            // Whoever can no longer cover a stake per remaining contribution
            // leaves the market entirely.
            let removed: HashSet<Address> = self
                .market_balances
                .iter()
                .filter(|(address, balance)| {
                    let held = self
                        .num_contributions_per_user
                        .get(*address)
                        .copied()
                        .unwrap_or(0);
                    **balance < held as f64 * MIN_STAKE
                })
                .map(|(address, _)| address.clone())
                .collect();
            self.contributions
                .retain(|c| !removed.contains(&c.contributor));
        } else {
            for c in &mut self.contributions {
                c.balance += c.score.unwrap_or(0.0) * num_rounds;
            }
            let mut kept = Vec::with_capacity(self.contributions.len());
            for c in self.contributions.drain(..) {
                if c.balance < MIN_STAKE {
                    // The contribution can no longer cover its stake; return
                    // whatever is left to its contributor's market balance.
                    if c.balance > 0.0 {
                        *self
                            .market_balances
                            .entry(c.contributor.clone())
                            .or_insert(0.0) += c.balance;
                    }
                } else {
                    kept.push(c);
                }
            }
            self.contributions = kept;
        }
    }

    fn end_reward_phase(&mut self, num_rounds: f64, now: u64) {
        debug!("dividing the bounty amongst the remaining contributors");
        if self.config.group_contributions {
            for (address, score) in &self.scores {
                *self.market_balances.entry(address.clone()).or_insert(0.0) +=
                    score * num_rounds;
            }
        } else {
            for c in self.contributions.drain(..) {
                let payout = c.balance + c.score.unwrap_or(0.0) * num_rounds;
                if payout > 0.0 {
                    *self.market_balances.entry(c.contributor).or_insert(0.0) += payout;
                }
            }
        }
        self.contributions.clear();
        self.phase = MarketPhase::RewardCollect;
        self.reward_phase_end_s = now;
    }
}

impl IncentiveMechanism for PredictionMarket {
    // Deposits cannot be reclaimed while the market runs; the driver's claim
    // sweep stays off this mechanism entirely.
    fn refund_wait_s(&self) -> u64 {
        u64::MAX
    }

    fn takeover_wait_s(&self) -> u64 {
        u64::MAX
    }

    /// The market does not share prediction fees.
    fn distribute_payment_for_prediction(
        &mut self,
        _ledger: &mut Ledger,
        _sender: &str,
        _value: Amount,
    ) -> Result<(), Reject> {
        Ok(())
    }

    fn handle_add_data(
        &mut self,
        _now: u64,
        contributor: &str,
        msg_value: Amount,
        data: &FeatureVector,
        label: Label,
    ) -> Result<(Amount, bool), Reject> {
        if self.phase != MarketPhase::Participation {
            return Err(Reject::WrongPhase(self.phase));
        }
        if msg_value < MIN_STAKE {
            return Err(Reject::InsufficientPayment {
                sent: msg_value,
                required: MIN_STAKE,
            });
        }
        let stake = if self.config.allow_greater_deposit {
            msg_value
        } else {
            MIN_STAKE
        };
        self.contributions.push(Contribution {
            contributor: contributor.to_string(),
            data: data.clone(),
            label,
            balance: stake,
            score: None,
            accuracy: None,
        });
        if self.config.group_contributions {
            // Grouped scoring settles directly against the contributor's
            // market balance, so the stake is banked there up front. Per
            // contribution, the stake rides on the contribution itself and
            // settles when it leaves the market.
            *self
                .market_balances
                .entry(contributor.to_string())
                .or_insert(0.0) += stake;
        }
        // The model is not updated at submission time.
        Ok((stake, false))
    }

    fn handle_refund(
        &mut self,
        _now: u64,
        submitter: &str,
        _stored: &StoredData,
        _claimable_amount: Amount,
        _claimed_by_submitter: bool,
        _prediction: Label,
    ) -> Result<Amount, Reject> {
        if self.phase != MarketPhase::RewardCollect {
            return Err(Reject::WrongPhase(self.phase));
        }
        let result = self.market_balances.remove(submitter).unwrap_or(0.0);
        debug!("market reward for '{submitter}': {result:.2}");
        Ok(result.max(0.0))
    }

    fn handle_report(
        &mut self,
        now: u64,
        reporter: &str,
        stored: &StoredData,
        _claimed_by_reporter: bool,
        _prediction: &mut dyn FnMut() -> Label,
    ) -> Result<Amount, Reject> {
        if self.phase != MarketPhase::RewardCollect {
            return Err(Reject::WrongPhase(self.phase));
        }
        if now.saturating_sub(self.reward_phase_end_s) >= self.config.any_address_claim_wait_s {
            let result = self.market_balances.remove(&stored.sender).unwrap_or(0.0);
            if result > 0.0 {
                debug!(
                    "giving '{}''s stale market balance of {result:.2} to '{reporter}'",
                    stored.sender
                );
            }
            return Ok(result.max(0.0));
        }
        Ok(0.0)
    }
}
