//! Shared contract-surface types.

/// An address that can hold funds and participate in training models.
pub type Address = String;

/// A quantity of funds. Values are non-negative at every mutation site;
/// fractional amounts appear only in the prediction market's reward math.
pub type Amount = f64;

/// A message sent to a contract-like operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Msg {
    /// The sender's address.
    pub sender: Address,
    /// Amount sent with the message.
    pub value: Amount,
}

impl Msg {
    pub fn new(sender: impl Into<Address>, value: Amount) -> Self {
        Self {
            sender: sender.into(),
            value,
        }
    }
}
