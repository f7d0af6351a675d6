//! The discrete-event simulator.
//!
//! A priority queue of `(time, address)` events drives agents against the
//! trainer: at each dequeue the clock jumps to the event time, the agent may
//! contribute a sample (or query the model), then sweeps its view of
//! unclaimed deposits attempting refunds and reports, and finally
//! reschedules itself. Ties on the event time break by address, so a run is
//! fully determined by its seeds.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use databounty::{
    Classifier, FeatureVector, IncentiveMechanism, Label, Msg, PredictionMarket, Reject, Trainer,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::agent::Agent;
use crate::artifact::RunArtifact;
use crate::data::Dataset;

/// First periodic accuracy snapshot, then one every `ACCURACY_EVAL_STEP_S`.
const FIRST_ACCURACY_EVAL_S: u64 = 10_000;
const ACCURACY_EVAL_STEP_S: u64 = 200_000;

#[derive(Debug, Clone)]
pub struct SimOpts {
    /// Accuracy of the model when trained with all data, recorded in the
    /// artifact for downstream plots.
    pub baseline_accuracy: Option<f64>,
    /// Portion of the training data used to fit the initial model.
    pub init_train_data_portion: f64,
}

impl Default for SimOpts {
    fn default() -> Self {
        Self {
            baseline_accuracy: None,
            init_train_data_portion: 0.1,
        }
    }
}

/// Configuration for driving a prediction-market run.
#[derive(Debug, Clone)]
pub struct MarketRunOpts {
    pub bounty_provider: String,
    pub total_bounty: f64,
    pub num_test_pieces: usize,
    pub min_length_s: u64,
    pub min_num_contributions: usize,
}

/// A contribution the driver still expects someone to claim.
struct UnclaimedEntry {
    added_time: u64,
    author: String,
    data: FeatureVector,
    label: Label,
}

pub struct Simulator<M, I> {
    pub trainer: Trainer<M, I>,
    rng: ChaCha8Rng,
}

impl<M: Classifier, I: IncentiveMechanism> Simulator<M, I> {
    pub fn new(trainer: Trainer<M, I>, seed: u64) -> Self {
        Self {
            trainer,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Run a deposit-style simulation to completion: the run ends when the
    /// training data is exhausted and every deposit has been claimed.
    pub fn simulate(
        &mut self,
        agents: &[Agent],
        dataset: &Dataset,
        opts: &SimOpts,
    ) -> Result<RunArtifact, Reject> {
        let init_idx = self.fit_initial_model(dataset, opts)?;
        let mut artifact =
            RunArtifact::new(agents, opts.baseline_accuracy, opts.init_train_data_portion);
        self.run_events(agents, dataset, init_idx, &mut artifact, None)?;
        info!("done going through data");
        Ok(artifact)
    }

    fn fit_initial_model(&mut self, dataset: &Dataset, opts: &SimOpts) -> Result<usize, Reject> {
        assert!((0.0..=1.0).contains(&opts.init_train_data_portion));
        let init_idx = (dataset.x_train.len() as f64 * opts.init_train_data_portion) as usize;
        info!(
            "initializing model with {init_idx} out of {} samples",
            dataset.x_train.len()
        );
        self.trainer
            .model
            .init_model(&dataset.x_train[..init_idx], &dataset.y_train[..init_idx], true)?;
        Ok(init_idx)
    }

    /// The shared agent loop. `max_contributions` caps accepted submissions,
    /// which is how a market run stops at its contribution target.
    fn run_events(
        &mut self,
        agents: &[Agent],
        dataset: &Dataset,
        init_idx: usize,
        artifact: &mut RunArtifact,
        max_contributions: Option<usize>,
    ) -> Result<(), Reject> {
        let x_remaining = &dataset.x_train[init_idx..];
        let y_remaining = &dataset.y_train[init_idx..];
        let mut accuracy = self
            .trainer
            .model
            .evaluate(&dataset.x_test, &dataset.y_test);
        info!("initial test set accuracy: {:.2}%", accuracy * 100.0);
        artifact.record_accuracy(self.trainer.clock.now(), accuracy);

        let agents_by_address: HashMap<String, Agent> = agents
            .iter()
            .map(|a| (a.address.clone(), a.clone()))
            .collect();

        let mut queue: BinaryHeap<Reverse<(u64, String)>> = BinaryHeap::new();
        let mut order: Vec<&Agent> = agents.iter().collect();
        order.shuffle(&mut self.rng);
        let start = self.trainer.clock.now();
        for agent in order {
            self.trainer
                .ledger
                .initialize(agent.address.as_str(), agent.start_balance)?;
            let wait = agent.next_wait_s(&mut self.rng);
            queue.push(Reverse((start + wait, agent.address.clone())));
            artifact.record_balance(start, &agent.address, agent.start_balance);
        }

        let mut unclaimed: Vec<UnclaimedEntry> = Vec::new();
        let mut next_data_index = 0usize;
        let mut next_accuracy_eval_s = FIRST_ACCURACY_EVAL_S;

        let progress = ProgressBar::new(x_remaining.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({per_sec})")
        {
            progress.set_style(style.progress_chars("=> "));
        }
        progress.set_message("processing agent requests");

        loop {
            // Capped (market) runs stop as soon as the data or the cap is
            // reached; open-ended runs also wait for every deposit to clear.
            if next_data_index >= x_remaining.len()
                && (max_contributions.is_some() || unclaimed.is_empty())
            {
                break;
            }
            if let Some(max) = max_contributions {
                if next_data_index >= max {
                    break;
                }
            }
            let Some(Reverse((event_time, address))) = queue.pop() else {
                break;
            };

            if event_time > next_accuracy_eval_s {
                next_accuracy_eval_s += ACCURACY_EVAL_STEP_S;
                accuracy = self
                    .trainer
                    .model
                    .evaluate(&dataset.x_test, &dataset.y_test);
                artifact.record_accuracy(event_time, accuracy);
                debug!("unclaimed deposits: {}", unclaimed.len());
            }

            self.trainer.clock.set(event_time);
            let now = self.trainer.clock.now();
            let Some(agent) = agents_by_address.get(&address) else {
                continue;
            };

            let mut balance = self.trainer.ledger.get(&address).unwrap_or(0.0);
            let mut acted = false;

            if balance > 0.0 && next_data_index < x_remaining.len() {
                let x = &x_remaining[next_data_index];
                let mut y = y_remaining[next_data_index];

                if agent.calls_model {
                    // Callers only bother while the model is good.
                    if self.rng.gen::<f64>() < accuracy {
                        let msg = Msg::new(address.clone(), agent.pay_to_call);
                        match self.trainer.predict(&msg, x) {
                            Ok(_) => acted = true,
                            Err(e) => debug!("error calling the model: {e}"),
                        }
                    }
                } else {
                    if !agent.good {
                        y = 1 - y;
                    }
                    if agent.prob_mistake > 0.0 && self.rng.gen::<f64>() < agent.prob_mistake {
                        y = 1 - y;
                    }
                    // Bad agents always contribute; good agents mostly work
                    // while the model is doing well.
                    if !agent.good || self.rng.gen::<f64>() < accuracy + 0.15 {
                        let value = agent.next_deposit(&mut self.rng);
                        if value <= balance {
                            let msg = Msg::new(address.clone(), value);
                            match self.trainer.add_data(&msg, x, y) {
                                Ok(()) => {
                                    acted = true;
                                    balance = self.trainer.ledger.get(&address).unwrap_or(0.0);
                                    unclaimed.push(UnclaimedEntry {
                                        added_time: now,
                                        author: address.clone(),
                                        data: x.clone(),
                                        label: y,
                                    });
                                    next_data_index += 1;
                                    progress.inc(1);
                                }
                                // Usually an underpayment or a too-soon
                                // submission, both expected in normal runs.
                                Err(e) => debug!("error adding data: {e}"),
                            }
                        }
                    }
                }
            }

            if balance > 0.0 {
                let wait = agent.next_wait_s(&mut self.rng);
                queue.push(Reverse((now + wait, address.clone())));
            }

            acted |= self.sweep_unclaimed(
                &mut unclaimed,
                &address,
                now,
                next_data_index >= x_remaining.len(),
            );

            if acted {
                let balance = self.trainer.ledger.get(&address).unwrap_or(0.0);
                artifact.record_balance(now, &address, balance);
            }
        }
        progress.finish_and_clear();
        Ok(())
    }

    /// Attempt refunds and reports for deposits whose windows have opened.
    /// The current agent refunds its own entries and reports everyone
    /// else's; fully-claimed entries drop off the list.
    fn sweep_unclaimed(
        &mut self,
        unclaimed: &mut Vec<UnclaimedEntry>,
        address: &str,
        now: u64,
        data_exhausted: bool,
    ) -> bool {
        let refund_wait = self.trainer.im.refund_wait_s();
        let takeover_wait = self.trainer.im.takeover_wait_s();
        let mut acted = false;
        let mut claimed = Vec::new();
        for (i, entry) in unclaimed.iter().enumerate() {
            let age = now.saturating_sub(entry.added_time);
            // The list is in submission order: the first entry still inside
            // its window means all later ones are too.
            if age < refund_wait {
                break;
            }
            if data_exhausted && age < takeover_wait {
                break;
            }
            let balance = self.trainer.ledger.get(address).unwrap_or(0.0);
            let msg = Msg::new(address.to_string(), balance);
            let result = if age > takeover_wait {
                // The whole remaining deposit is up for grabs.
                self.trainer
                    .report(&msg, &entry.data, entry.label, entry.added_time, &entry.author)
            } else if entry.author == address {
                self.trainer
                    .refund(&msg, &entry.data, entry.label, entry.added_time)
            } else {
                self.trainer
                    .report(&msg, &entry.data, entry.label, entry.added_time, &entry.author)
            };
            match result {
                Ok(_) => acted = true,
                Err(e) => debug!("claim attempt failed: {e}"),
            }
            match self
                .trainer
                .registry
                .get_data(&entry.data, entry.label, entry.added_time, &entry.author)
            {
                Some(stored) if stored.claimable_amount > 0.0 => {}
                _ => claimed.push(i),
            }
        }
        for i in claimed.into_iter().rev() {
            unclaimed.remove(i);
        }
        acted
    }
}

impl<M: Classifier> Simulator<M, PredictionMarket> {
    /// Run a full prediction-market lifecycle: commitment, participation,
    /// reveal, the reward loop, and collection.
    pub fn simulate_market(
        &mut self,
        agents: &[Agent],
        dataset: &Dataset,
        opts: &SimOpts,
        market_opts: &MarketRunOpts,
    ) -> Result<RunArtifact, Reject> {
        let init_idx = self.fit_initial_model(dataset, opts)?;
        let mut artifact =
            RunArtifact::new(agents, opts.baseline_accuracy, opts.init_train_data_portion);

        // Commitment phase: fund the bounty and open the challenge piece.
        self.trainer
            .ledger
            .initialize(market_opts.bounty_provider.as_str(), market_opts.total_bounty)?;
        let (hashes, portions) = PredictionMarket::get_test_set_hashes(
            market_opts.num_test_pieces,
            &dataset.x_test,
            &dataset.y_test,
        );
        let reveal_index = self.trainer.initialize_market(
            &Msg::new(market_opts.bounty_provider.clone(), market_opts.total_bounty),
            hashes,
            market_opts.min_length_s,
            market_opts.min_num_contributions,
        )?;
        self.trainer.reveal_init_test_set(&portions[reveal_index])?;

        // Participation runs through the shared agent loop until the
        // contribution target (or the data) is exhausted.
        self.run_events(
            agents,
            dataset,
            init_idx,
            &mut artifact,
            Some(market_opts.min_num_contributions),
        )?;

        // Close the market, waiting out the minimum length if we fell short
        // of the contribution target.
        self.advance_by_agent_wait(agents);
        match self.trainer.end_market() {
            Ok(()) => {}
            Err(Reject::CannotEndMarketYet) => {
                let earliest = self.trainer.im.market_earliest_end_s();
                self.trainer.clock.set(earliest.max(self.trainer.clock.now()));
                self.trainer.end_market()?;
            }
            Err(e) => return Err(e),
        }

        for (i, portion) in portions.iter().enumerate() {
            if i != reveal_index {
                self.trainer.verify_next_test_set(portion)?;
            }
        }

        info!(
            "processing {} market contributions",
            self.trainer.im.num_contributions()
        );
        let progress = ProgressBar::new_spinner();
        progress.set_message("processing contributions");
        while self.trainer.im.remaining_bounty_rounds() > 0.0 {
            self.advance_by_agent_wait(agents);
            self.trainer.process_contribution()?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        // Collection: every agent asks for whatever its market balance holds,
        // through one of its stored entries.
        self.advance_by_agent_wait(agents);
        for agent in agents {
            let entry = self
                .trainer
                .registry
                .iter()
                .find(|(_, stored)| stored.sender == agent.address)
                .map(|(key, _)| (key.data.clone(), key.label, key.time));
            if let Some((data, label, time)) = entry {
                let msg = Msg::new(agent.address.clone(), 0.0);
                match self.trainer.refund(&msg, &data, label, time) {
                    Ok(amount) => debug!("'{}' collected {amount:.2}", agent.address),
                    Err(e) => debug!("'{}' could not collect: {e}", agent.address),
                }
            }
            let balance = self.trainer.ledger.get(&agent.address).unwrap_or(0.0);
            artifact.record_balance(self.trainer.clock.now(), &agent.address, balance);
        }

        let accuracy = self
            .trainer
            .model
            .evaluate(&dataset.x_test, &dataset.y_test);
        artifact.record_accuracy(self.trainer.clock.now(), accuracy);
        info!("final test set accuracy: {:.2}%", accuracy * 100.0);
        Ok(artifact)
    }

    fn advance_by_agent_wait(&mut self, agents: &[Agent]) {
        let wait = agents[0].next_wait_s(&mut self.rng);
        self.trainer.clock.add(wait);
    }
}
