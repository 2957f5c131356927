use std::sync::Arc;

use fabric_bench_config::LoadBalancing;
use fabric_bench_core::{
    ConnectorError, FabricRequest, ProcessRole, engine::EngineError,
};
use tests_workflows::{
    MockNetwork, TWO_ORG_NETWORK, WIDE_NETWORK, connector, network_config, test_settings,
};

fn init_marble() -> FabricRequest {
    FabricRequest::invoke("marbles", "initMarble").with_arguments(["marble1"])
}

#[tokio::test(start_paused = true)]
async fn repeated_get_context_returns_the_same_context() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());

    let first = connector.get_context(0).await.expect("context");
    let second = connector.get_context(0).await.expect("context");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.round_index(), 0);
    assert_eq!(
        network.created_clients(),
        ["admin", "user1", "_Org2MSP_admin"]
    );
    assert_eq!(network.connected_sources(), 2);
}

#[tokio::test(start_paused = true)]
async fn release_tears_the_context_down() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(3).await.expect("context");

    connector.release_context().await;

    assert_eq!(network.connected_sources(), 0);
    assert_eq!(network.closed_clients().len(), 3);
    assert!(matches!(
        connector.send_request(&init_marble()).await,
        Err(ConnectorError::NoContext)
    ));

    // A second release has nothing left to do.
    connector.release_context().await;
    assert_eq!(network.closed_clients().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn new_context_restarts_load_balancing() {
    let network = MockNetwork::new();
    let settings = test_settings().with_load_balancing(LoadBalancing::RoundRobin);
    let connector = connector(&network, network_config(WIDE_NETWORK), settings);

    connector.get_context(0).await.expect("context");
    connector.send_request(&init_marble()).await.expect("status");
    connector.send_request(&init_marble()).await.expect("status");
    connector.release_context().await;

    connector.get_context(1).await.expect("context");
    connector.send_request(&init_marble()).await.expect("status");

    let proposals = network.proposals();
    assert_eq!(proposals.len(), 3);
    assert_eq!(proposals[2].request.targets, proposals[0].request.targets);
    assert_ne!(proposals[1].request.targets, proposals[0].request.targets);
}

#[tokio::test(start_paused = true)]
async fn request_without_context_is_refused() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());

    assert!(matches!(
        connector.send_request(&init_marble()).await,
        Err(ConnectorError::NoContext)
    ));
    assert!(network.proposals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_requests_are_workload_errors() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let missing_id = FabricRequest {
        contract_function: Some("initMarble".to_owned()),
        ..FabricRequest::default()
    };
    let err = connector.send_request(&missing_id).await.unwrap_err();
    assert_eq!(err.to_string(), "No contractId provided in the request");

    let unknown = FabricRequest::invoke("nope", "initMarble");
    let err = connector.send_request(&unknown).await.unwrap_err();
    assert_eq!(err.to_string(), "Could not find details for contract ID nope");

    let no_function = FabricRequest {
        contract_id: Some("marbles".to_owned()),
        ..FabricRequest::default()
    };
    assert!(matches!(
        connector.send_request(&no_function).await,
        Err(ConnectorError::MissingContractFunction(id)) if id == "marbles"
    ));

    let stranger = init_marble().with_invoker("mallory", Some("Org2MSP".to_owned()));
    let err = connector.send_request(&stranger).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::Engine(EngineError::UnknownInvoker { .. })
    ));
    assert_eq!(
        err.to_string(),
        "No contracts for invokerIdentity mallory in Org2MSP found. Identity and/or MspId does not exist"
    );

    assert!(network.proposals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn invoker_identity_selects_the_client() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    connector.send_request(&init_marble()).await.expect("status");
    connector
        .send_request(&init_marble().with_invoker("user1", None))
        .await
        .expect("status");
    connector
        .send_request(&init_marble().with_invoker("admin", Some("Org2MSP".to_owned())))
        .await
        .expect("status");

    let invokers: Vec<String> = network
        .proposals()
        .into_iter()
        .map(|proposal| proposal.invoker)
        .collect();
    assert_eq!(invokers, ["admin", "user1", "_Org2MSP_admin"]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_event_source_fails_the_context() {
    let network = MockNetwork::new();
    network.make_event_source_unreachable("peer0.org2");
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());

    let err = connector.get_context(0).await.err().expect("context error");

    assert!(
        err.to_string()
            .starts_with("Couldn't connect to the event source of peer0.org2 on mychannel"),
        "{err}"
    );
}

#[tokio::test(start_paused = true)]
async fn client_creation_failure_fails_the_context() {
    let network = MockNetwork::new();
    network.fail_client_creation("user1");
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());

    let err = connector.get_context(0).await.err().expect("context error");

    assert_eq!(
        err.to_string(),
        "Couldn't create client for user1: identity user1 was revoked"
    );
}

#[tokio::test(start_paused = true)]
async fn init_rejects_invalid_settings_and_dynamic_topologies() {
    let network = MockNetwork::new();

    let settings = test_settings().with_latency_threshold(1.5);
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), settings);
    assert!(matches!(
        connector.init(ProcessRole::Worker).await,
        Err(ConnectorError::Settings(_))
    ));

    let mut config = network_config(TWO_ORG_NETWORK);
    config.discover = true;
    let connector = tests_workflows::connector(&network, config, test_settings());
    assert!(matches!(
        connector.init(ProcessRole::Worker).await,
        Err(ConnectorError::DynamicTopology)
    ));
}

#[tokio::test(start_paused = true)]
async fn worker_init_leaves_the_network_alone() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());

    connector.init(ProcessRole::Worker).await.expect("init");

    assert!(network.created_channels().is_empty());
    assert!(network.created_clients().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_keep_input_order() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let requests = [
        init_marble(),
        FabricRequest::invoke("nope", "initMarble"),
        FabricRequest::query("marbles", "readMarble"),
    ];
    let results = connector.send_requests(&requests).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].as_ref().is_ok_and(|status| status.is_success()));
    assert!(matches!(results[1], Err(ConnectorError::UnknownContract(_))));
    assert!(results[2].as_ref().is_ok_and(|status| status.is_success()));
    assert_eq!(connector.stats().submitted, 2);
}
