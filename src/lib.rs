//! Incentive layer for a simulated collaborative machine-learning marketplace.
//!
//! Autonomous participants submit labeled training samples to a shared online
//! model and are paid or penalized by an incentive mechanism that mimics what
//! a smart contract would enforce:
//!
//! - [`Ledger`] - closed-economy balance sheet with a `send` primitive
//! - [`DataRegistry`] - append-only index of contributions with claim accounting
//! - [`Stakeable`] - deposit/refund/report mechanism with time-decayed costs
//! - [`PredictionMarket`] - commit-reveal market with bounded-round rewards
//! - [`Trainer`] - the contract surface that routes the four operations
//!
//! Everything here is deterministic given the seeds handed to the market and
//! the driver; there is no chain, no networking, and no persistence. The
//! simulator that drives agents against this surface lives in a sibling crate.

pub mod classifier;
pub mod clock;
pub mod error;
pub mod features;
pub mod incentive;
pub mod ledger;
pub mod market;
pub mod registry;
pub mod stakeable;
pub mod trainer;
pub mod types;

pub use classifier::Classifier;
pub use clock::Clock;
pub use error::Reject;
pub use features::{FeatureVector, Label};
pub use incentive::IncentiveMechanism;
pub use ledger::Ledger;
pub use market::{Contribution, MarketConfig, MarketPhase, PredictionMarket, TestSetPortion, MIN_STAKE};
pub use registry::{DataKey, DataRegistry, StoredData};
pub use stakeable::{Stakeable, SECONDS_PER_DAY};
pub use trainer::Trainer;
pub use types::{Address, Amount, Msg};
