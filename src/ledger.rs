//! Closed-economy balance sheet.
//!
//! The total held across all addresses only changes through [`Ledger::initialize`],
//! which models bootstrapping agents and the bounty provider. Transfers clamp
//! to the sender's balance instead of failing, the way the emulated contract
//! would cap a withdrawal.

use std::collections::HashMap;

use log::warn;

use crate::error::Reject;
use crate::types::{Address, Amount};

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    balances: HashMap<Address, Amount>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `address` a starting balance. Errors if it already holds one.
    pub fn initialize(&mut self, address: impl Into<Address>, start_balance: Amount) -> Result<(), Reject> {
        let address = address.into();
        if !(start_balance >= 0.0) {
            return Err(Reject::InvalidAmount);
        }
        if self.balances.contains_key(&address) {
            return Err(Reject::AlreadyHasBalance(address));
        }
        self.balances.insert(address, start_balance);
        Ok(())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.balances.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Result<Amount, Reject> {
        self.balances
            .get(address)
            .copied()
            .ok_or_else(|| Reject::UnknownAddress(address.to_string()))
    }

    /// Snapshot of every balance, used by the driver when recording a run.
    pub fn all(&self) -> &HashMap<Address, Amount> {
        &self.balances
    }

    /// Sum of all balances. Constant across any sequence of `send` calls.
    pub fn total(&self) -> Amount {
        self.balances.values().sum()
    }

    /// Transfer `amount` from one address to another.
    ///
    /// Clamps to the sender's balance (with a warning) rather than failing,
    /// and initializes the receiver if it has never held funds. Returns the
    /// amount actually moved.
    pub fn send(&mut self, from: &str, to: &str, amount: Amount) -> Result<Amount, Reject> {
        if !(amount >= 0.0) {
            return Err(Reject::InvalidAmount);
        }
        if amount == 0.0 {
            return Ok(0.0);
        }
        let sender_balance = self.get(from)?;
        let amount = if sender_balance < amount {
            warn!("'{from}' has {sender_balance} < {amount}, will only send {sender_balance}");
            sender_balance
        } else {
            amount
        };
        if let Some(balance) = self.balances.get_mut(from) {
            *balance -= amount;
        }
        *self.balances.entry(to.to_string()).or_insert(0.0) += amount;
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_rejects_existing_address() {
        let mut ledger = Ledger::new();
        ledger.initialize("a", 100.0).unwrap();
        assert_eq!(
            ledger.initialize("a", 5.0),
            Err(Reject::AlreadyHasBalance("a".to_string()))
        );
    }

    #[test]
    fn send_moves_funds_and_initializes_receiver() {
        let mut ledger = Ledger::new();
        ledger.initialize("a", 100.0).unwrap();
        let moved = ledger.send("a", "b", 40.0).unwrap();
        assert_eq!(moved, 40.0);
        assert_eq!(ledger.get("a").unwrap(), 60.0);
        assert_eq!(ledger.get("b").unwrap(), 40.0);
    }

    #[test]
    fn send_clamps_to_sender_balance() {
        let mut ledger = Ledger::new();
        ledger.initialize("a", 10.0).unwrap();
        ledger.initialize("b", 0.0).unwrap();
        let moved = ledger.send("a", "b", 25.0).unwrap();
        assert_eq!(moved, 10.0);
        assert_eq!(ledger.get("a").unwrap(), 0.0);
        assert_eq!(ledger.get("b").unwrap(), 10.0);
    }

    #[test]
    fn send_zero_is_a_no_op() {
        let mut ledger = Ledger::new();
        ledger.initialize("a", 10.0).unwrap();
        assert_eq!(ledger.send("a", "b", 0.0).unwrap(), 0.0);
        assert!(!ledger.contains("b"));
    }

    #[test]
    fn send_rejects_negative_amounts() {
        let mut ledger = Ledger::new();
        ledger.initialize("a", 10.0).unwrap();
        assert_eq!(ledger.send("a", "b", -1.0), Err(Reject::InvalidAmount));
        assert_eq!(ledger.send("a", "b", f64::NAN), Err(Reject::InvalidAmount));
    }

    #[test]
    fn total_is_conserved_by_sends() {
        let mut ledger = Ledger::new();
        ledger.initialize("a", 100.0).unwrap();
        ledger.initialize("b", 50.0).unwrap();
        ledger.send("a", "b", 30.0).unwrap();
        ledger.send("b", "c", 80.0).unwrap();
        ledger.send("c", "a", 200.0).unwrap();
        assert_eq!(ledger.total(), 150.0);
    }
}
