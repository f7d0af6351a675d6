//! Deposit/refund/report incentive mechanism.
//!
//! Adding data requires a deposit whose cost decays with the time since the
//! last accepted update. A submitter reclaims the deposit after a waiting
//! period if the current model still agrees with the contribution; a third
//! party that has verified good data of its own can report data the model
//! disagrees with and take a share. After a much longer window anyone can
//! take whatever is left, so deposits never strand.

use std::collections::BTreeMap;

use log::debug;

use crate::error::Reject;
use crate::features::{FeatureVector, Label};
use crate::incentive::IncentiveMechanism;
use crate::ledger::Ledger;
use crate::registry::StoredData;
use crate::types::{Address, Amount};

pub const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Every refund window must leave at least this long before takeover opens.
const MIN_REFUND_WINDOW_S: u64 = 7 * SECONDS_PER_DAY;

#[derive(Debug, Clone)]
pub struct Stakeable {
    cost_weight: u64,
    refund_wait_s: u64,
    takeover_wait_s: u64,
    num_good_per_user: BTreeMap<Address, u64>,
    total_good: u64,
    last_update_s: u64,
}

impl Stakeable {
    /// Default windows: one day to refund, nine days until takeover.
    pub fn new(created_at_s: u64) -> Self {
        Self::with_params(created_at_s, 1, SECONDS_PER_DAY, 9 * SECONDS_PER_DAY)
    }

    pub fn with_params(
        created_at_s: u64,
        cost_weight: u64,
        refund_wait_s: u64,
        takeover_wait_s: u64,
    ) -> Self {
        assert!(
            takeover_wait_s > refund_wait_s + MIN_REFUND_WINDOW_S,
            "takeover window leaves too little time for refunds"
        );
        Self {
            cost_weight,
            refund_wait_s,
            takeover_wait_s,
            num_good_per_user: BTreeMap::new(),
            total_good: 0,
            last_update_s: created_at_s,
        }
    }

    pub fn num_good_for(&self, address: &str) -> u64 {
        self.num_good_per_user.get(address).copied().unwrap_or(0)
    }

    pub fn total_good(&self) -> u64 {
        self.total_good
    }

    /// The current cost to add one sample.
    ///
    /// The weight is per hour; dividing by 3600 inside the square root is the
    /// same as multiplying by 60 outside it, and every step truncates the way
    /// the emulated contract's integer arithmetic would.
    pub fn get_next_add_data_cost(&self, now: u64) -> Result<Amount, Reject> {
        if now <= self.last_update_s {
            return Err(Reject::NotEnoughTimePassed);
        }
        let dt = now - self.last_update_s;
        let cost = (self.cost_weight * 60 / isqrt(dt)).max(1);
        Ok(cost as Amount)
    }
}

/// Floor integer square root (Newton's method).
fn isqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

impl IncentiveMechanism for Stakeable {
    fn refund_wait_s(&self) -> u64 {
        self.refund_wait_s
    }

    fn takeover_wait_s(&self) -> u64 {
        self.takeover_wait_s
    }

    fn distribute_payment_for_prediction(
        &mut self,
        ledger: &mut Ledger,
        sender: &str,
        value: Amount,
    ) -> Result<(), Reject> {
        if value > 0.0 && self.total_good > 0 {
            for (address, num_good) in &self.num_good_per_user {
                // Round down so the total distributed never exceeds `value`.
                let share = (value * *num_good as f64 / self.total_good as f64).floor();
                ledger.send(sender, address, share)?;
            }
        }
        Ok(())
    }

    fn handle_add_data(
        &mut self,
        now: u64,
        _contributor: &str,
        msg_value: Amount,
        _data: &FeatureVector,
        _label: Label,
    ) -> Result<(Amount, bool), Reject> {
        let cost = self.get_next_add_data_cost(now)?;
        if cost > msg_value {
            return Err(Reject::InsufficientPayment {
                sent: msg_value,
                required: cost,
            });
        }
        self.last_update_s = now;
        Ok((cost, true))
    }

    fn handle_refund(
        &mut self,
        now: u64,
        submitter: &str,
        stored: &StoredData,
        claimable_amount: Amount,
        claimed_by_submitter: bool,
        prediction: Label,
    ) -> Result<Amount, Reject> {
        if claimed_by_submitter {
            return Err(Reject::AlreadyClaimed);
        }
        if claimable_amount <= 0.0 {
            return Err(Reject::NothingToClaim);
        }
        if now.saturating_sub(stored.time) <= self.refund_wait_s {
            return Err(Reject::NotEnoughTimePassed);
        }
        if prediction != stored.label {
            return Err(Reject::ModelDisagrees);
        }
        *self
            .num_good_per_user
            .entry(submitter.to_string())
            .or_insert(0) += 1;
        self.total_good += 1;
        Ok(claimable_amount)
    }

    fn handle_report(
        &mut self,
        now: u64,
        reporter: &str,
        stored: &StoredData,
        claimed_by_reporter: bool,
        prediction: &mut dyn FnMut() -> Label,
    ) -> Result<Amount, Reject> {
        if stored.claimable_amount <= 0.0 {
            return Err(Reject::NothingToClaim);
        }
        if now.saturating_sub(stored.time) >= self.takeover_wait_s {
            // Deposits must not strand: whatever is left goes to whoever asks.
            debug!("giving all remaining deposit to '{reporter}'");
            return Ok(stored.claimable_amount);
        }
        // Submitters cannot take back their own bad deposit this way; they
        // could still report it from another address, but only one that has
        // had good data verified.
        if reporter == stored.sender {
            return Err(Reject::CannotTakeOwnDeposit);
        }
        if claimed_by_reporter {
            return Err(Reject::AlreadyClaimed);
        }
        if now.saturating_sub(stored.time) <= self.refund_wait_s {
            return Err(Reject::NotEnoughTimePassed);
        }
        if prediction() == stored.label {
            return Err(Reject::ModelAgrees);
        }
        let num_good = self.num_good_for(reporter);
        if num_good == 0 {
            return Err(Reject::NoVerifiedData);
        }
        let mut reward =
            stored.initial_deposit * num_good as f64 / self.total_good as f64;
        // Rounding can leave a sliver nobody could take, and a dominant
        // reporter's share can exceed what is left: collapse both cases to
        // the remaining claimable amount.
        if reward <= 0.0 || reward > stored.claimable_amount {
            reward = stored.claimable_amount;
        }
        Ok(reward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn stored(time: u64, label: Label, deposit: Amount) -> StoredData {
        StoredData {
            label,
            time,
            sender: "author".to_string(),
            initial_deposit: deposit,
            claimable_amount: deposit,
            claimed_by: HashSet::new(),
        }
    }

    #[test]
    fn isqrt_floors() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(3), 1);
        assert_eq!(isqrt(4), 2);
        assert_eq!(isqrt(3599), 59);
        assert_eq!(isqrt(3600), 60);
    }

    #[test]
    fn cost_decays_with_time_and_bottoms_at_one() {
        let im = Stakeable::new(0);
        assert_eq!(im.get_next_add_data_cost(0), Err(Reject::NotEnoughTimePassed));
        assert_eq!(im.get_next_add_data_cost(1).unwrap(), 60.0);
        assert_eq!(im.get_next_add_data_cost(100).unwrap(), 6.0);
        assert_eq!(im.get_next_add_data_cost(3600).unwrap(), 1.0);
        assert_eq!(im.get_next_add_data_cost(1_000_000).unwrap(), 1.0);
    }

    #[test]
    fn accepting_data_resets_the_cost_clock() {
        let mut im = Stakeable::new(0);
        let (cost, update_model) = im
            .handle_add_data(1, "a", 100.0, &FeatureVector::dense(vec![1.0]), 1)
            .unwrap();
        assert_eq!(cost, 60.0);
        assert!(update_model);
        assert_eq!(im.get_next_add_data_cost(1), Err(Reject::NotEnoughTimePassed));
        assert_eq!(im.get_next_add_data_cost(2).unwrap(), 60.0);
    }

    #[test]
    fn underpaying_is_rejected() {
        let mut im = Stakeable::new(0);
        let err = im
            .handle_add_data(1, "a", 10.0, &FeatureVector::dense(vec![1.0]), 1)
            .unwrap_err();
        assert_eq!(
            err,
            Reject::InsufficientPayment {
                sent: 10.0,
                required: 60.0
            }
        );
    }

    #[test]
    fn refund_gates() {
        let mut im = Stakeable::new(0);
        let entry = stored(10, 1, 60.0);
        // Too early.
        assert_eq!(
            im.handle_refund(10 + SECONDS_PER_DAY, "author", &entry, 60.0, false, 1),
            Err(Reject::NotEnoughTimePassed)
        );
        // Model disagrees.
        assert_eq!(
            im.handle_refund(11 + SECONDS_PER_DAY, "author", &entry, 60.0, false, 0),
            Err(Reject::ModelDisagrees)
        );
        // Already claimed.
        assert_eq!(
            im.handle_refund(11 + SECONDS_PER_DAY, "author", &entry, 60.0, true, 1),
            Err(Reject::AlreadyClaimed)
        );
        // Success bumps the good-data counters.
        let refund = im
            .handle_refund(11 + SECONDS_PER_DAY, "author", &entry, 60.0, false, 1)
            .unwrap();
        assert_eq!(refund, 60.0);
        assert_eq!(im.num_good_for("author"), 1);
        assert_eq!(im.total_good(), 1);
    }

    #[test]
    fn report_requires_verified_good_data() {
        let mut im = Stakeable::new(0);
        let entry = stored(10, 1, 60.0);
        let err = im
            .handle_report(11 + SECONDS_PER_DAY, "reporter", &entry, false, &mut || 0)
            .unwrap_err();
        assert_eq!(err, Reject::NoVerifiedData);
    }

    #[test]
    fn report_share_is_proportional_and_capped() {
        let mut im = Stakeable::new(0);
        // Two verified refunds: one for the reporter, one for someone else.
        let good = stored(10, 1, 60.0);
        im.handle_refund(11 + SECONDS_PER_DAY, "reporter", &good, 60.0, false, 1)
            .unwrap();
        im.handle_refund(11 + SECONDS_PER_DAY, "other", &good, 60.0, false, 1)
            .unwrap();

        let bad = stored(100, 0, 60.0);
        let reward = im
            .handle_report(101 + SECONDS_PER_DAY, "reporter", &bad, false, &mut || 1)
            .unwrap();
        assert_eq!(reward, 30.0);

        // A nearly-exhausted entry collapses to what is left.
        let mut drained = stored(100, 0, 60.0);
        drained.claimable_amount = 10.0;
        let reward = im
            .handle_report(101 + SECONDS_PER_DAY, "reporter", &drained, false, &mut || 1)
            .unwrap();
        assert_eq!(reward, 10.0);
    }

    #[test]
    fn takeover_skips_all_checks() {
        let mut im = Stakeable::new(0);
        let entry = stored(0, 1, 60.0);
        // Even the author, with the model agreeing, takes the remainder.
        let reward = im
            .handle_report(9 * SECONDS_PER_DAY, "author", &entry, true, &mut || 1)
            .unwrap();
        assert_eq!(reward, 60.0);
    }

    #[test]
    fn prediction_payment_is_floored_per_recipient() {
        let mut im = Stakeable::new(0);
        let good = stored(10, 1, 60.0);
        im.handle_refund(11 + SECONDS_PER_DAY, "a", &good, 60.0, false, 1)
            .unwrap();
        im.handle_refund(11 + SECONDS_PER_DAY, "b", &good, 60.0, false, 1)
            .unwrap();
        im.handle_refund(11 + SECONDS_PER_DAY, "b", &good, 60.0, false, 1)
            .unwrap();

        let mut ledger = Ledger::new();
        ledger.initialize("caller", 100.0).unwrap();
        im.distribute_payment_for_prediction(&mut ledger, "caller", 10.0)
            .unwrap();
        // a gets floor(10/3) = 3, b gets floor(20/3) = 6.
        assert_eq!(ledger.get("a").unwrap(), 3.0);
        assert_eq!(ledger.get("b").unwrap(), 6.0);
        assert_eq!(ledger.get("caller").unwrap(), 91.0);
    }
}
