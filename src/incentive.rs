//! The incentive-mechanism contract the trainer routes through.
//!
//! A mechanism decides what adding data costs, what a refund or report pays,
//! and how prediction fees are shared. It never touches the registry; the
//! trainer sequences the two so that a rejection leaves no state behind.

use crate::error::Reject;
use crate::features::{FeatureVector, Label};
use crate::ledger::Ledger;
use crate::registry::StoredData;
use crate::types::Amount;

pub trait IncentiveMechanism {
    /// Seconds a submitter must wait before reclaiming their deposit.
    fn refund_wait_s(&self) -> u64;

    /// Seconds after which anyone may take an entry's remaining deposit.
    fn takeover_wait_s(&self) -> u64;

    /// Share a prediction fee with past contributors.
    fn distribute_payment_for_prediction(
        &mut self,
        ledger: &mut Ledger,
        sender: &str,
        value: Amount,
    ) -> Result<(), Reject>;

    /// Decide whether a request to add data is acceptable. Returns the cost
    /// charged and whether the model should be updated with the sample.
    fn handle_add_data(
        &mut self,
        now: u64,
        contributor: &str,
        msg_value: Amount,
        data: &FeatureVector,
        label: Label,
    ) -> Result<(Amount, bool), Reject>;

    /// Decide a refund attempt. Returns the amount to pay the submitter.
    fn handle_refund(
        &mut self,
        now: u64,
        submitter: &str,
        stored: &StoredData,
        claimable_amount: Amount,
        claimed_by_submitter: bool,
        prediction: Label,
    ) -> Result<Amount, Reject>;

    /// Decide a report attempt. The prediction is a thunk because a report
    /// can be rejected before the (possibly expensive) prediction is needed.
    fn handle_report(
        &mut self,
        now: u64,
        reporter: &str,
        stored: &StoredData,
        claimed_by_reporter: bool,
        prediction: &mut dyn FnMut() -> Label,
    ) -> Result<Amount, Reject>;
}
