//! The stochastic profile of one simulated participant.

use databounty::{Address, Amount};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub address: Address,
    pub start_balance: Amount,
    pub mean_deposit: f64,
    pub stdev_deposit: f64,
    pub mean_update_wait_s: f64,
    #[serde(default = "default_stdev_wait")]
    pub stdev_update_wait_s: f64,
    /// Amount sent along with each model query, for agents that call the
    /// model instead of contributing.
    #[serde(default)]
    pub pay_to_call: Amount,
    /// Good agents submit labels as-is; bad agents flip them.
    #[serde(default = "default_good")]
    pub good: bool,
    /// Chance that a submission's label is flipped by accident.
    #[serde(default)]
    pub prob_mistake: f64,
    /// Queries the model rather than contributing data.
    #[serde(default)]
    pub calls_model: bool,
}

fn default_stdev_wait() -> f64 {
    1.0
}

fn default_good() -> bool {
    true
}

impl Agent {
    pub fn new(
        address: impl Into<Address>,
        start_balance: Amount,
        mean_deposit: f64,
        stdev_deposit: f64,
        mean_update_wait_s: f64,
    ) -> Self {
        assert!(
            start_balance > mean_deposit,
            "an agent must be able to afford its own deposits"
        );
        Self {
            address: address.into(),
            start_balance,
            mean_deposit,
            stdev_deposit,
            mean_update_wait_s,
            stdev_update_wait_s: default_stdev_wait(),
            pay_to_call: 0.0,
            good: true,
            prob_mistake: 0.0,
            calls_model: false,
        }
    }

    /// Turn this into a label-flipping agent.
    pub fn bad(mut self) -> Self {
        self.good = false;
        self
    }

    pub fn with_mistakes(mut self, prob_mistake: f64) -> Self {
        self.prob_mistake = prob_mistake;
        self
    }

    /// Turn this into an agent that queries the model instead of
    /// contributing, paying `pay_to_call` per query.
    pub fn model_caller(mut self, pay_to_call: Amount) -> Self {
        self.calls_model = true;
        self.pay_to_call = pay_to_call;
        self
    }

    /// Next deposit: a normal draw truncated to a whole amount, redrawn
    /// until positive.
    pub fn next_deposit<R: Rng>(&self, rng: &mut R) -> Amount {
        let dist = match Normal::new(self.mean_deposit, self.stdev_deposit) {
            Ok(dist) => dist,
            Err(_) => return self.mean_deposit.max(1.0).trunc(),
        };
        loop {
            let value = dist.sample(rng).trunc();
            if value > 0.0 {
                return value;
            }
        }
    }

    /// Next wait before this agent acts again, at least one second.
    pub fn next_wait_s<R: Rng>(&self, rng: &mut R) -> u64 {
        let dist = match Normal::new(self.mean_update_wait_s, self.stdev_update_wait_s) {
            Ok(dist) => dist,
            Err(_) => return self.mean_update_wait_s.max(1.0) as u64,
        };
        loop {
            let value = dist.sample(rng).trunc();
            if value >= 1.0 {
                return value as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn draws_are_positive_whole_numbers() {
        let agent = Agent::new("a", 10_000.0, 5.0, 3.0, 600.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..1_000 {
            let deposit = agent.next_deposit(&mut rng);
            assert!(deposit >= 1.0);
            assert_eq!(deposit, deposit.trunc());
            assert!(agent.next_wait_s(&mut rng) >= 1);
        }
    }

    #[test]
    fn builders_set_the_profile() {
        let agent = Agent::new("b", 1_000.0, 10.0, 3.0, 3_600.0)
            .bad()
            .with_mistakes(0.1);
        assert!(!agent.good);
        assert_eq!(agent.prob_mistake, 0.1);
        let caller = Agent::new("c", 1_000.0, 1.0, 1.0, 60.0).model_caller(2.0);
        assert!(caller.calls_model);
        assert_eq!(caller.pay_to_call, 2.0);
    }
}
