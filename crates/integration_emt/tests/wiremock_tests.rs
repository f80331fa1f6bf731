//! Integration tests for the EMT client (wiremock-based)

use std::error::Error as _;
use std::time::Duration;

use wiremock::matchers::{any, body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use integration_emt::{
    Direction, DirectionTokens, EmtClient, EmtConfig, EmtError, EmtHttpClient, Location,
    ReturnCode, StopIds,
};

const ARRIVALS: &str = "/geo/GetArriveStop.php";
const STOPS_FROM_XY: &str = "/geo/GetStopsFromXY.php";
const STOPS_LINE: &str = "/geo/GetStopsLine.php";
const NODES_LINES: &str = "/bus/GetNodesLines.php";

fn config_for_mock(base_url: &str) -> EmtConfig {
    EmtConfig::for_testing().with_base_url(base_url)
}

fn client_for(server: &MockServer) -> EmtHttpClient {
    EmtHttpClient::new(&config_for_mock(&server.uri())).unwrap()
}

fn json_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body.to_string())
}

const NODE_69_JSON: &str = r#"{
    "ReturnCode": "0",
    "Description": "Data recovered OK",
    "resultValues": {
        "node": 69,
        "name": "Pza. de Cibeles-Palacio de Comunicaciones",
        "lines": ["1/1/1", "2/1/1", "74/2/1"],
        "latitude": 40.4189,
        "longitude": -3.6935
    }
}"#;

const NODES_69_3729_JSON: &str = r#"{
    "ReturnCode": "0",
    "Description": "Data recovered OK",
    "resultValues": [
        { "node": 69, "name": "Pza. de Cibeles", "lines": ["1/1/1"] },
        { "node": "3729", "name": "Atocha", "lines": "N1/1/1" }
    ]
}"#;

const ARRIVALS_JSON: &str = r#"{
    "ReturnCode": "0",
    "Description": "Data recovered OK",
    "arrives": [
        {
            "stopId": 69,
            "lineId": "27",
            "isHead": "False",
            "destination": "PLAZA CASTILLA",
            "busId": "4662",
            "busTimeLeft": 140,
            "busDistance": 550
        },
        {
            "stopId": 69,
            "lineId": "5",
            "destination": "CHAMARTIN",
            "busId": "2140",
            "busTimeLeft": 999999,
            "busDistance": 4100
        }
    ]
}"#;

const STOPS_XY_JSON: &str = r#"{
    "ReturnCode": "0",
    "Description": "Data recovered OK",
    "stop": [
        { "stopId": "1234", "name": "Atocha Renfe", "postalAddress": "Pza. Emperador Carlos V" },
        { "stopId": 1235, "name": "Atocha", "line": { "line": "27" } }
    ]
}"#;

const LINE_21_JSON: &str = r#"{
    "ReturnCode": "0",
    "Description": "Data recovered OK",
    "line": 21,
    "label": "21",
    "stop": [{ "stopId": 101 }, { "stopId": 102 }]
}"#;

#[tokio::test]
async fn test_request_carries_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_FROM_XY))
        .and(body_string_contains("cultureInfo=ES"))
        .and(body_string_contains("idClient=test-client"))
        .and(body_string_contains("passKey=test-passkey"))
        .and(body_string_contains("Radius=200"))
        .respond_with(json_response(STOPS_XY_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let stops = client
        .stops_from_location(Location::new(40.4, -3.6), 200)
        .await
        .unwrap();

    assert_eq!(stops.len(), 2);
    assert_eq!(stops[0].stop_id, Some(1234));
    assert_eq!(stops[0].postal_address.as_deref(), Some("Pza. Emperador Carlos V"));
    assert!(stops[1].extra.contains_key("line"));
}

#[tokio::test]
async fn test_incoming_buses_existing_stop() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .and(body_string_contains("Nodes=69"))
        .respond_with(json_response(NODE_69_JSON))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(ARRIVALS))
        .and(body_string_contains("idStop=69"))
        .respond_with(json_response(ARRIVALS_JSON))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let arrivals = client.incoming_buses(69.into()).await.unwrap();
    assert_eq!(arrivals.len(), 2);
    assert_eq!(arrivals[0].line_id.as_deref(), Some("27"));
    assert_eq!(arrivals[0].minutes_left(), Some(2));
    assert_eq!(arrivals[1].minutes_left(), None);

    // Existence is cached, so only the arrivals endpoint is hit again
    let again = client.incoming_buses("69".into()).await.unwrap();
    assert_eq!(again, arrivals);
    assert_eq!(client.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_incoming_buses_no_buses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .respond_with(json_response(NODE_69_JSON))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(ARRIVALS))
        .respond_with(json_response(r#"{ "ReturnCode": "0", "Description": "OK" }"#))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let arrivals = client.incoming_buses(69.into()).await.unwrap();
    assert!(arrivals.is_empty());
}

#[tokio::test]
async fn test_incoming_buses_unknown_stop_is_rechecked() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .respond_with(json_response("[false]"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(ARRIVALS))
        .respond_with(json_response(ARRIVALS_JSON))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    for _ in 0..2 {
        let err = client.incoming_buses(9_999_999.into()).await.unwrap_err();
        assert!(matches!(err, EmtError::StopNotFound { .. }));
        assert!(err.is_not_found());
        assert!(err.source().is_none());
    }
}

#[tokio::test]
async fn test_incoming_buses_invalid_stop() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.incoming_buses("a".into()).await.unwrap_err();

    assert!(matches!(err, EmtError::StopNotFound { .. }));
    let cause = err.source().unwrap();
    assert!(cause.to_string().contains("Invalid input"));
}

#[tokio::test]
async fn test_incoming_buses_existence_check_failure_is_wrapped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.incoming_buses(69.into()).await.unwrap_err();

    match err {
        EmtError::StopNotFound { stop, source } => {
            assert_eq!(stop, "69");
            assert!(matches!(
                source.as_deref(),
                Some(EmtError::Technical { status: 502 })
            ));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_incoming_buses_without_stop_check() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .respond_with(json_response(NODE_69_JSON))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(ARRIVALS))
        .respond_with(json_response(ARRIVALS_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for_mock(&server.uri()).with_stop_check(false);
    let client = EmtHttpClient::new(&config).unwrap();

    let arrivals = client.incoming_buses(69.into()).await.unwrap();
    assert_eq!(arrivals.len(), 2);

    let err = client.incoming_buses("a".into()).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidInput(_)));
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(json_response(
            r#"{ "ReturnCode": "9", "Description": "Attemp to Auth Failed" }"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client.nodes_lines(69.into()).await.unwrap_err();
    match err {
        EmtError::Api { code, description } => {
            assert_eq!(code, ReturnCode::AuthFailed);
            assert_eq!(description, "Attemp to Auth Failed");
        },
        other => panic!("unexpected error: {other}"),
    }

    let err = client.incoming_buses(69.into()).await.unwrap_err();
    assert!(matches!(err, EmtError::StopNotFound { source: Some(_), .. }));
}

#[tokio::test]
async fn test_stop_exists() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .and(body_string_contains("Nodes=69"))
        .respond_with(json_response(NODE_69_JSON))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .and(body_string_contains("Nodes=99999"))
        .respond_with(json_response("[false]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert!(client.stop_exists(69.into()).await.unwrap());
    assert!(client.stop_exists(69.into()).await.unwrap());
    assert!(!client.stop_exists(99_999.into()).await.unwrap());

    let err = client.stop_exists((-1).into()).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidInput(_)));
}

#[tokio::test]
async fn test_stops_from_location_degenerate_area() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(json_response(STOPS_XY_JSON))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let stops = client
        .stops_from_location(Location::new(0.0, 0.0), 200)
        .await
        .unwrap();
    assert!(stops.is_empty());

    let stops = client
        .stops_from_location(Location::new(40.4, -3.6), 0)
        .await
        .unwrap();
    assert!(stops.is_empty());
}

#[tokio::test]
async fn test_stops_from_location_technical_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_FROM_XY))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .stops_from_location(Location::new(40.4, -3.6), 200)
        .await
        .unwrap_err();

    assert!(matches!(err, EmtError::Technical { status: 503 }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_stops_from_location_unparseable_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_FROM_XY))
        .respond_with(json_response("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .stops_from_location(Location::new(40.4, -3.6), 200)
        .await
        .unwrap_err();

    assert!(matches!(err, EmtError::ParseError(_)));
}

#[tokio::test]
async fn test_stops_on_line_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_LINE))
        .and(body_string_contains("line=21"))
        .respond_with(json_response(LINE_21_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let first = client.stops_on_line("21", None).await.unwrap();
    assert_eq!(first.label().as_deref(), Some("21"));

    let second = client.stops_on_line("21", None).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stops_on_line_returns_body_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_LINE))
        .respond_with(json_response(LINE_21_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let upstream: serde_json::Value = serde_json::from_str(LINE_21_JSON).unwrap();

    let fetched = client.stops_on_line("21", None).await.unwrap();
    assert_eq!(serde_json::to_value(&fetched).unwrap(), upstream);
    assert_eq!(fetched.get("line"), Some(&serde_json::json!(21)));

    let cached = client.stops_on_line("21", None).await.unwrap();
    assert_eq!(serde_json::to_value(&cached).unwrap(), upstream);
}

#[tokio::test]
async fn test_stops_on_line_with_direction() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_LINE))
        .and(body_string_contains("direction=1"))
        .respond_with(json_response(LINE_21_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let line = client.stops_on_line("21", Some("1")).await.unwrap();
    assert_eq!(line.line().as_deref(), Some("21"));
    assert!(line.get("stop").is_some());

    // Same key through the typed direction
    let typed = client
        .stops_on_line_towards("21", Direction::Outbound)
        .await
        .unwrap();
    assert_eq!(typed, line);
}

#[tokio::test]
async fn test_stops_on_line_invalid_direction() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(json_response(LINE_21_JSON))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    for line in ["21", "1000"] {
        let err = client.stops_on_line(line, Some("3")).await.unwrap_err();
        assert!(matches!(err, EmtError::InvalidDirection(_)));
        assert!(err.is_invalid_input());
    }

    // Tokens of the older API are not accepted by default
    let err = client.stops_on_line("21", Some("A")).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidDirection(_)));
}

#[tokio::test]
async fn test_stops_on_line_legacy_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_LINE))
        .and(body_string_contains("direction=B"))
        .respond_with(json_response(LINE_21_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let config =
        config_for_mock(&server.uri()).with_direction_tokens(DirectionTokens::legacy());
    let client = EmtHttpClient::new(&config).unwrap();

    let line = client
        .stops_on_line_towards("21", Direction::Inbound)
        .await
        .unwrap();
    assert_eq!(line.label().as_deref(), Some("21"));

    let err = client.stops_on_line("21", Some("1")).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidDirection(_)));
}

#[tokio::test]
async fn test_stops_on_line_not_found_is_not_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STOPS_LINE))
        .respond_with(json_response("[false]"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);

    for _ in 0..2 {
        let err = client.stops_on_line("1000", Some("1")).await.unwrap_err();
        match err {
            EmtError::LineNotFound { line, direction } => {
                assert_eq!(line, "1000");
                assert_eq!(direction.as_deref(), Some("1"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[tokio::test]
async fn test_nodes_lines_scalar_and_sequence() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .and(body_string_contains("Nodes=69"))
        .respond_with(json_response(NODE_69_JSON))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let scalar = client.nodes_lines(69.into()).await.unwrap();
    let sequence = client.nodes_lines(vec![69].into()).await.unwrap();

    assert_eq!(scalar.len(), 1);
    assert_eq!(scalar, sequence);
    assert_eq!(scalar[0].node, Some(69));
    assert_eq!(scalar[0].lines.len(), 3);
}

#[tokio::test]
async fn test_nodes_lines_several_stops() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .and(body_string_contains("Nodes=69%7C3729"))
        .respond_with(json_response(NODES_69_3729_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let nodes = client.nodes_lines(StopIds::from([69, 3729])).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].node, Some(3729));
    assert_eq!(nodes[1].lines, vec!["N1/1/1".to_string()]);
}

#[tokio::test]
async fn test_nodes_lines_without_filter() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .and(|req: &Request| !String::from_utf8_lossy(&req.body).contains("Nodes="))
        .respond_with(json_response(NODES_69_3729_JSON))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let nodes = client.nodes_lines(StopIds::all()).await.unwrap();
    assert_eq!(nodes.len(), 2);
}

#[tokio::test]
async fn test_nodes_lines_invalid_input() {
    let server = MockServer::start().await;

    Mock::given(any())
        .respond_with(json_response(NODE_69_JSON))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client.nodes_lines((-1).into()).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidInput(_)));

    let err = client.nodes_lines("a".into()).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidInput(_)));

    let err = client.nodes_lines(vec!["69", "x"].into()).await.unwrap_err();
    assert!(matches!(err, EmtError::InvalidInput(_)));
}

#[tokio::test]
async fn test_nodes_lines_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .respond_with(json_response("[false]"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.nodes_lines(99_999.into()).await.unwrap_err();

    assert!(matches!(err, EmtError::StopsNotFound(ref ids) if ids == "99999"));
}

#[tokio::test]
async fn test_connection_refused() {
    let client = EmtHttpClient::new(&config_for_mock("http://127.0.0.1:1")).unwrap();
    let err = client.nodes_lines(69.into()).await.unwrap_err();
    assert!(matches!(err, EmtError::ConnectionFailed(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_metadata_lookup_uses_longer_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(NODES_LINES))
        .respond_with(json_response(NODE_69_JSON).set_delay(Duration::from_millis(1500)))
        .expect(2)
        .mount(&server)
        .await;

    let config = EmtConfig {
        timeout_secs: 1,
        metadata_timeout_secs: 3,
        ..config_for_mock(&server.uri())
    };
    let client = EmtHttpClient::new(&config).unwrap();

    assert!(client.stop_exists(69.into()).await.unwrap());
    let nodes = client.nodes_lines(69.into()).await.unwrap();
    assert_eq!(nodes.len(), 1);
}

#[tokio::test]
async fn test_slow_arrivals_time_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ARRIVALS))
        .respond_with(json_response(ARRIVALS_JSON).set_delay(Duration::from_millis(1500)))
        .expect(1)
        .mount(&server)
        .await;

    let config = EmtConfig {
        timeout_secs: 1,
        metadata_timeout_secs: 3,
        ..config_for_mock(&server.uri())
    }
    .with_stop_check(false);
    let client = EmtHttpClient::new(&config).unwrap();

    let err = client.incoming_buses(69.into()).await.unwrap_err();
    assert!(matches!(err, EmtError::Timeout { timeout_secs: 1 }));
    assert!(err.is_retryable());
}
