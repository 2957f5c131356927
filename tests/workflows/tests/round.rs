use std::{sync::Arc, time::Duration};

use anyhow::Result;
use fabric_bench_core::{
    FabricRequest, ProcessRole,
    scenario::{Runner, ScenarioBuilder, ScenarioError},
};
use fabric_bench_workflows::{INDEX_PLACEHOLDER, ScenarioBuilderExt as _};
use tests_workflows::{
    CommitScript, MockNetwork, TWO_ORG_NETWORK, connector, network_config, test_settings,
};

fn init_marble() -> FabricRequest {
    FabricRequest::invoke("marbles", "initMarble").with_arguments([
        format!("marble_{INDEX_PLACEHOLDER}"),
        "blue".to_owned(),
    ])
}

#[tokio::test(start_paused = true)]
async fn manager_round_sets_up_and_drives_transactions() -> Result<()> {
    let network = MockNetwork::new();
    let connector = Arc::new(connector(
        &network,
        network_config(TWO_ORG_NETWORK),
        test_settings(),
    ));

    connector.init(ProcessRole::Manager).await?;
    connector.install_smart_contract().await?;

    let mut scenario = ScenarioBuilder::new()
        .transactions_with(|flow| flow.request(init_marble()).count(4).rate(10.0))
        .expect_success_rate(1.0)
        .with_run_duration(Duration::from_secs(10))
        .build()?;

    let runner = Runner::prepare(Arc::clone(&connector), &scenario, 0).await?;
    let summary = runner.run(&mut scenario).await?;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.verified, 4);
    assert_eq!(summary.success_ratio(), Some(1.0));

    let arguments: Vec<String> = network
        .proposals()
        .into_iter()
        .map(|proposal| proposal.request.arguments[0].clone())
        .collect();
    assert_eq!(arguments, ["marble_0", "marble_1", "marble_2", "marble_3"]);
    assert_eq!(network.connected_sources(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failing_commits_break_the_success_expectation() -> Result<()> {
    let network = MockNetwork::new();
    network.script_commit("peer0.org2", CommitScript::invalid("MVCC_READ_CONFLICT"));
    let connector = Arc::new(connector(
        &network,
        network_config(TWO_ORG_NETWORK),
        test_settings(),
    ));

    let mut scenario = ScenarioBuilder::new()
        .transactions_with(|flow| flow.request(init_marble()).count(3))
        .expect_success_rate(0.9)
        .with_run_duration(Duration::from_secs(5))
        .build()?;

    let runner = Runner::prepare(Arc::clone(&connector), &scenario, 0).await?;
    let context = runner.context();
    let err = runner.run(&mut scenario).await.unwrap_err();

    assert!(matches!(err, ScenarioError::Expectations(_)));
    let message = err.to_string();
    assert!(message.contains("success_rate"), "{message}");
    assert!(message.contains("below required"), "{message}");

    let summary = context.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.failed, 3);
    assert_eq!(network.connected_sources(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn round_duration_bounds_the_workload() -> Result<()> {
    let network = MockNetwork::new();
    let connector = Arc::new(connector(
        &network,
        network_config(TWO_ORG_NETWORK),
        test_settings(),
    ));

    let mut scenario = ScenarioBuilder::new()
        .transactions_with(|flow| flow.request(init_marble()).count(100).rate(1.0))
        .with_run_duration(Duration::from_secs(3))
        .build()?;

    let runner = Runner::prepare(Arc::clone(&connector), &scenario, 0).await?;
    let summary = runner.run(&mut scenario).await?;

    assert!(summary.total >= 1);
    assert!(summary.total < 100);
    assert_eq!(summary.total, summary.succeeded);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_contract_aborts_the_round() -> Result<()> {
    let network = MockNetwork::new();
    let connector = Arc::new(connector(
        &network,
        network_config(TWO_ORG_NETWORK),
        test_settings(),
    ));

    let mut scenario = ScenarioBuilder::new()
        .transactions_with(|flow| flow.request(FabricRequest::invoke("nope", "initMarble")))
        .with_run_duration(Duration::from_secs(5))
        .build()?;

    let runner = Runner::prepare(Arc::clone(&connector), &scenario, 0).await?;
    let err = runner.run(&mut scenario).await.unwrap_err();

    assert!(matches!(err, ScenarioError::Workload(_)));
    assert!(
        err.to_string()
            .contains("Could not find details for contract ID nope")
    );
    Ok(())
}
