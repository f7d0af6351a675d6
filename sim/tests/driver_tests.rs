//! End-to-end driver runs over the synthetic dataset.

use databounty::{MarketConfig, MarketPhase, PredictionMarket, Stakeable, Trainer};
use databounty_sim::{Agent, Dataset, MarketRunOpts, Perceptron, SimOpts, Simulator};

fn roster() -> Vec<Agent> {
    vec![
        Agent::new("Good 1", 10_000.0, 5.0, 1.0, 10.0 * 60.0),
        Agent::new("Good 2", 10_000.0, 5.0, 1.0, 20.0 * 60.0),
        Agent::new("Bad 1", 10_000.0, 10.0, 3.0, 60.0 * 60.0).bad(),
    ]
}

#[test]
fn stakeable_run_terminates_and_conserves_the_ledger() {
    let dataset = Dataset::synthetic(40, 20, 3, 77);
    let trainer = Trainer::new(Perceptron::new(), Stakeable::new(0));
    let mut sim = Simulator::new(trainer, 12345);

    let agents = roster();
    let opts = SimOpts {
        baseline_accuracy: Some(0.9),
        init_train_data_portion: 0.25,
    };
    let artifact = sim.simulate(&agents, &dataset, &opts).unwrap();

    // Everything the agents ever held is still in the system.
    let start_total: f64 = agents.iter().map(|a| a.start_balance).sum();
    assert!((sim.trainer.ledger.total() - start_total).abs() < 1e-6);
    for balance in sim.trainer.ledger.all().values() {
        assert!(*balance >= 0.0);
    }

    // Data made it into the registry and the run was recorded.
    assert!(!sim.trainer.registry.is_empty());
    assert!(!artifact.balances.is_empty());
    assert!(!artifact.accuracies.is_empty());
    assert_eq!(artifact.baseline_accuracy, Some(0.9));
}

#[test]
fn stakeable_runs_are_reproducible_for_a_seed() {
    let run = || {
        let dataset = Dataset::synthetic(30, 10, 3, 5);
        let trainer = Trainer::new(Perceptron::new(), Stakeable::new(0));
        let mut sim = Simulator::new(trainer, 99);
        let artifact = sim
            .simulate(&roster(), &dataset, &SimOpts::default())
            .unwrap();
        let mut balances: Vec<(String, f64)> = sim
            .trainer
            .ledger
            .all()
            .iter()
            .map(|(a, b)| (a.clone(), *b))
            .collect();
        balances.sort_by(|a, b| a.0.cmp(&b.0));
        (balances, artifact.balances.len(), artifact.accuracies.len())
    };
    assert_eq!(run(), run());
}

#[test]
fn market_run_reaches_collection_within_the_bounty() {
    let dataset = Dataset::synthetic(60, 40, 3, 101);
    let market = PredictionMarket::new(MarketConfig::default(), 8);
    let trainer = Trainer::new(Perceptron::new(), market);
    let mut sim = Simulator::new(trainer, 2024);

    let agents = vec![
        Agent::new("Good 1", 1_000.0, 5.0, 1.0, 10.0 * 60.0),
        Agent::new("Good 2", 1_000.0, 5.0, 1.0, 20.0 * 60.0),
        Agent::new("Bad 1", 1_000.0, 10.0, 3.0, 30.0 * 60.0).bad(),
    ];
    let opts = SimOpts {
        baseline_accuracy: None,
        init_train_data_portion: 0.1,
    };
    let market_opts = MarketRunOpts {
        bounty_provider: "initializer".to_string(),
        total_bounty: 5_000.0,
        num_test_pieces: 4,
        min_length_s: 1_000,
        min_num_contributions: 30,
    };
    let artifact = sim
        .simulate_market(&agents, &dataset, &opts, &market_opts)
        .unwrap();

    assert_eq!(sim.trainer.im.phase(), MarketPhase::RewardCollect);
    assert_eq!(sim.trainer.im.remaining_bounty_rounds(), 0.0);

    // Conservation: starting balances plus the bounty, nothing more.
    let expected_total = 3_000.0 + market_opts.total_bounty;
    assert!((sim.trainer.ledger.total() - expected_total).abs() < 1e-6);
    for balance in sim.trainer.ledger.all().values() {
        assert!(*balance >= 0.0);
    }

    // Collection balances were recorded for every agent.
    for agent in &agents {
        assert!(artifact.balances.iter().any(|p| p.a == agent.address));
    }
}

#[test]
fn grouped_market_run_with_greater_deposits() {
    let dataset = Dataset::synthetic(50, 30, 3, 7);
    let config = MarketConfig {
        allow_greater_deposit: true,
        group_contributions: true,
        reset_model_during_reward_phase: true,
        ..MarketConfig::default()
    };
    let market = PredictionMarket::new(config, 3);
    let trainer = Trainer::new(Perceptron::new(), market);
    let mut sim = Simulator::new(trainer, 55);

    let agents = vec![
        Agent::new("Good 1", 2_000.0, 5.0, 1.0, 600.0),
        Agent::new("Bad 1", 2_000.0, 5.0, 1.0, 600.0).bad(),
    ];
    let market_opts = MarketRunOpts {
        bounty_provider: "initializer".to_string(),
        total_bounty: 2_000.0,
        num_test_pieces: 3,
        min_length_s: 500,
        min_num_contributions: 20,
    };
    sim.simulate_market(&agents, &dataset, &SimOpts::default(), &market_opts)
        .unwrap();

    assert_eq!(sim.trainer.im.phase(), MarketPhase::RewardCollect);
    assert!((sim.trainer.ledger.total() - 6_000.0).abs() < 1e-6);
}
