use std::time::Duration;

use bytes::Bytes;
use fabric_bench_config::ConnectorSettings;
use fabric_bench_core::{
    FabricRequest, TxState, TxStats,
    tx_status::{Annotation, keys},
};
use tests_workflows::{MockNetwork, TWO_ORG_NETWORK, connector, network_config, test_settings};

fn read_marble() -> FabricRequest {
    FabricRequest::query("marbles", "readMarble").with_arguments(["marble1"])
}

fn text(value: &str) -> Option<Annotation> {
    Some(Annotation::Text(value.to_owned()))
}

#[tokio::test(start_paused = true)]
async fn query_returns_the_last_payload() {
    let network = MockNetwork::new();
    network.delay_proposals(Duration::from_millis(7));
    network.script_peer("peer0.org2", |peer| {
        peer.payload = Bytes::from_static(br#"{"color":"blue"}"#);
    });

    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let status = connector.send_request(&read_marble()).await.expect("status");

    assert_eq!(status.status(), TxState::Success);
    assert!(status.is_verified());
    assert_eq!(status.time_final(), 7);
    assert_eq!(status.result(), &Bytes::from_static(br#"{"color":"blue"}"#));
    assert_eq!(
        status.annotation(keys::REQUEST_TYPE),
        text(keys::REQUEST_QUERY).as_ref()
    );
    assert_eq!(network.queries().len(), 1);
    assert!(network.proposals().is_empty());
    assert!(network.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn peer_error_fails_the_query() {
    let network = MockNetwork::new();
    network.script_peer("peer0.org1", |peer| {
        peer.error = Some("marble1 does not exist".to_owned());
    });

    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let status = connector.send_request(&read_marble()).await.expect("status");

    assert_eq!(status.status(), TxState::Failed);
    assert!(status.is_verified());
    assert!(status.result().is_empty());
    assert_eq!(
        status.annotation(&keys::endorsement_result_error("peer0.org1")),
        text("marble1 does not exist").as_ref()
    );
    assert!(
        status
            .annotation(&keys::endorsement_result("peer0.org2"))
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn slow_query_times_out() {
    let network = MockNetwork::new();
    network.delay_proposals(Duration::from_secs(5));

    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let request = read_marble().with_timeout(Duration::from_secs(2));
    let status = connector.send_request(&request).await.expect("status");

    assert_eq!(status.status(), TxState::Failed);
    assert_eq!(status.time_final(), 2_000);
    assert_eq!(
        status.annotation(keys::UNEXPECTED_ERROR),
        text("TIMEOUT").as_ref()
    );
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_unexpected() {
    let network = MockNetwork::new();
    network.fail_proposals("gateway down");

    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let status = connector.send_request(&read_marble()).await.expect("status");

    assert_eq!(status.status(), TxState::Failed);
    assert_eq!(
        status.annotation(keys::UNEXPECTED_ERROR),
        text("gateway down").as_ref()
    );
}

#[tokio::test(start_paused = true)]
async fn queries_count_as_load_only_when_configured() {
    let network = MockNetwork::new();
    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");
    connector.send_request(&read_marble()).await.expect("status");
    assert_eq!(
        connector.stats(),
        TxStats {
            submitted: 1,
            finished: 1
        }
    );

    let settings = ConnectorSettings {
        count_query_as_load: false,
        ..test_settings()
    };
    let network = MockNetwork::new();
    let quiet = tests_workflows::connector(&network, network_config(TWO_ORG_NETWORK), settings);
    quiet.get_context(0).await.expect("context");
    quiet.send_request(&read_marble()).await.expect("status");
    quiet
        .send_request(&FabricRequest::invoke("marbles", "initMarble"))
        .await
        .expect("status");
    assert_eq!(
        quiet.stats(),
        TxStats {
            submitted: 1,
            finished: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn short_query_response_list_is_unexpected() {
    let network = MockNetwork::new();
    network.drop_responses_from("peer0.org1");

    let connector = connector(&network, network_config(TWO_ORG_NETWORK), test_settings());
    connector.get_context(0).await.expect("context");

    let status = connector.send_request(&read_marble()).await.expect("status");

    assert_eq!(status.status(), TxState::Failed);
    assert!(status.result().is_empty());
    assert_eq!(
        status.annotation(keys::UNEXPECTED_ERROR),
        text("received 1 query responses for 2 targets").as_ref()
    );
    assert!(
        status
            .annotation(&keys::endorsement_result("peer0.org2"))
            .is_none()
    );
}
