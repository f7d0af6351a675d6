//! Rejection errors for the contract surface.
//!
//! Every failure a caller can trigger is a [`Reject`]: the transaction is
//! refused and no state changes. None of these are fatal to a simulation
//! run; the driver logs them and keeps going.

use thiserror::Error;

use crate::market::MarketPhase;
use crate::types::Amount;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Reject {
    #[error("data has already been added")]
    DuplicateData,
    #[error("data not found")]
    DataNotFound,
    #[error("data isn't from the sender")]
    NotFromSender,
    #[error("did not pay enough, sent {sent} < {required}")]
    InsufficientPayment { sent: Amount, required: Amount },
    #[error("not enough time has passed")]
    NotEnoughTimePassed,
    #[error("the model doesn't agree with the contribution")]
    ModelDisagrees,
    #[error("the model should not agree with the contribution")]
    ModelAgrees,
    #[error("deposit already claimed")]
    AlreadyClaimed,
    #[error("there is no reward left to claim")]
    NothingToClaim,
    #[error("no good data was verified by the reporter")]
    NoVerifiedData,
    #[error("cannot take your own deposit, ask for a refund instead")]
    CannotTakeOwnDeposit,
    #[error("operation not allowed in the {0:?} phase")]
    WrongPhase(MarketPhase),
    #[error("revealed test set does not match the committed hash")]
    HashMismatch,
    #[error("the market has ended")]
    MarketEnded,
    #[error("can't end the market yet")]
    CannotEndMarketYet,
    #[error("at least two test set hashes are required")]
    NotEnoughHashes,
    #[error("at least one test set hash must be given")]
    NeedsMoreHashes,
    #[error("only the bounty provider may do this")]
    NotBountyProvider,
    #[error("amount must be a non-negative number")]
    InvalidAmount,
    #[error("'{0}' already has a balance")]
    AlreadyHasBalance(String),
    #[error("'{0}' has no balance")]
    UnknownAddress(String),
    #[error("the model has already been initialized")]
    AlreadyInitialized,
    #[error("no saved model to restore")]
    ModelNotSaved,
}
