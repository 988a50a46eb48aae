//! End-to-end tests: a real gateway on an ephemeral port driven by
//! tokio-tungstenite clients.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ocpp_gateway::application::Event;
use ocpp_gateway::domain::{ChargePointService, ChargePointStatus, RegistrationStatus};
use ocpp_gateway::{AppConfig, ServerHandle};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.ws_host = "127.0.0.1".to_string();
    config.server.ws_port = 0;
    config.server.shutdown_timeout = 5;
    config
}

async fn start_gateway() -> ServerHandle {
    start_gateway_with(test_config()).await
}

async fn start_gateway_with(config: AppConfig) -> ServerHandle {
    ServerHandle::start(config.into()).await.unwrap()
}

async fn connect(handle: &ServerHandle, id: &str) -> Client {
    let url = format!("ws://{}/ws?id={}", handle.ws_addr, id);
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert(
        header::SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static("ocpp1.6"),
    );
    let (client, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::SEC_WEBSOCKET_PROTOCOL).unwrap(),
        "ocpp1.6"
    );
    wait_until(|| handle.session_registry.lookup(id).is_some()).await;
    client
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("no frame received")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return text;
        }
    }
}

async fn call(client: &mut Client, frame: Value) -> Value {
    client
        .send(Message::Text(frame.to_string()))
        .await
        .unwrap();
    serde_json::from_str(&next_text(client).await).unwrap()
}

/// True once the server has closed the connection.
async fn is_closed_by_server(client: &mut Client) -> bool {
    match tokio::time::timeout(TIMEOUT, client.next()).await {
        Ok(None) | Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) => true,
        Ok(Some(Ok(_))) => false,
        Err(_) => false,
    }
}

#[tokio::test]
async fn missing_identity_is_rejected_with_400() {
    let handle = start_gateway().await;

    for url in [
        format!("ws://{}/ws", handle.ws_addr),
        format!("ws://{}/ws?id=", handle.ws_addr),
    ] {
        match tokio_tungstenite::connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
            other => panic!("Expected HTTP 400, got {:?}", other.map(|_| ())),
        }
    }
    assert_eq!(handle.session_registry.count(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn unknown_path_is_rejected_with_404() {
    let handle = start_gateway().await;

    let url = format!("ws://{}/ocpp/CP-1?id=CP-1", handle.ws_addr);
    match tokio_tungstenite::connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
        other => panic!("Expected HTTP 404, got {:?}", other.map(|_| ())),
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn boot_notification_is_accepted() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;

    let response = call(
        &mut client,
        json!([2, "boot-1", "BootNotification", {
            "chargePointVendor": "ABB",
            "chargePointModel": "Terra AC",
            "chargePointSerialNumber": "SN-1",
            "firmwareVersion": "1.2.3"
        }]),
    )
    .await;

    assert_eq!(response[0], 3);
    assert_eq!(response[1], "boot-1");
    assert_eq!(response[2]["status"], "Accepted");
    assert_eq!(response[2]["interval"], 60);
    assert!(response[2]["currentTime"].is_string());

    let cp = handle.service.get("CP-1").await.unwrap().unwrap();
    assert_eq!(cp.vendor.as_deref(), Some("ABB"));
    assert_eq!(cp.firmware_version.as_deref(), Some("1.2.3"));
    assert_eq!(cp.registration_status, RegistrationStatus::Accepted);

    handle.shutdown().await;
}

#[tokio::test]
async fn heartbeat_echoes_unique_id() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;

    let response = call(&mut client, json!([2, "42", "Heartbeat", {}])).await;

    let arr = response.as_array().unwrap();
    assert_eq!(arr.len(), 3);
    assert_eq!(arr[0], 3);
    assert_eq!(arr[1], "42");
    assert!(arr[2]["currentTime"].is_string());

    handle.shutdown().await;
}

#[tokio::test]
async fn status_notification_updates_charge_point() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;

    let response = call(
        &mut client,
        json!([2, "s-1", "StatusNotification", {
            "connectorId": 1,
            "status": "Faulted",
            "errorCode": "GroundFailure",
            "timestamp": "2024-05-01T10:00:00Z"
        }]),
    )
    .await;
    assert_eq!(response, json!([3, "s-1", {}]));

    let cp = handle.service.get("CP-1").await.unwrap().unwrap();
    assert_eq!(cp.status, ChargePointStatus::Faulted);

    handle.shutdown().await;
}

#[tokio::test]
async fn protocol_errors_keep_the_connection_open() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;

    client.send(Message::Text("not json".into())).await.unwrap();
    let response: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(response[0], 4);
    assert_eq!(response[1], "");
    assert_eq!(response[2], "FormationViolation");

    let response = call(&mut client, json!([2, "a-1", "Authorize", {"idTag": "X"}])).await;
    assert_eq!(response[1], "a-1");
    assert_eq!(response[2], "NotSupported");

    let response = call(&mut client, json!([3, "r-1", {}])).await;
    assert_eq!(response[2], "NotSupported");

    let response = call(&mut client, json!([2, "hb", "Heartbeat", {}])).await;
    assert_eq!(response[0], 3);
    assert_eq!(response[1], "hb");

    handle.shutdown().await;
}

#[tokio::test]
async fn concurrent_devices_get_their_own_responses() {
    let handle = start_gateway().await;
    let mut a = connect(&handle, "CP-A").await;
    let mut b = connect(&handle, "CP-B").await;

    async fn run(client: &mut Client, prefix: &str) {
        for i in 0..100 {
            let id = format!("{}-{}", prefix, i);
            let response = call(client, json!([2, id, "Heartbeat", {}])).await;
            assert_eq!(response[0], 3);
            assert_eq!(response[1], id.as_str());
        }
    }

    tokio::join!(run(&mut a, "a"), run(&mut b, "b"));

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_idle_devices() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;
    let registry = handle.session_registry.clone();

    tokio::time::timeout(TIMEOUT, handle.shutdown())
        .await
        .expect("shutdown did not finish in time");

    assert!(registry.is_empty());
    assert!(is_closed_by_server(&mut client).await);
}

#[tokio::test]
async fn reconnect_replaces_previous_session() {
    let handle = start_gateway().await;
    let mut first = connect(&handle, "CP-1").await;
    let first_id = handle.session_registry.lookup("CP-1").unwrap().connection_id();

    let mut second = connect(&handle, "CP-1").await;
    wait_until(|| {
        handle
            .session_registry
            .lookup("CP-1")
            .is_some_and(|s| s.connection_id() != first_id)
    })
    .await;

    assert!(is_closed_by_server(&mut first).await);

    // The old task's cleanup must not remove the new session.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.session_registry.is_connected("CP-1"));
    assert_eq!(handle.session_registry.count(), 1);

    let response = call(&mut second, json!([2, "after", "Heartbeat", {}])).await;
    assert_eq!(response[1], "after");

    handle.shutdown().await;
}

#[tokio::test]
async fn disconnect_removes_session() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;

    client.close(None).await.unwrap();
    wait_until(|| !handle.session_registry.is_connected("CP-1")).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn server_initiated_frames_are_delivered() {
    let handle = start_gateway().await;
    let mut client = connect(&handle, "CP-1").await;

    let frame = json!([2, "srv-1", "Reset", {"type": "Soft"}]).to_string();
    handle.session_registry.send_to("CP-1", frame.clone()).unwrap();

    assert_eq!(next_text(&mut client).await, frame);

    handle.shutdown().await;
}

#[tokio::test]
async fn outbound_frames_do_not_keep_idle_device_open() {
    let mut config = test_config();
    config.ocpp.idle_timeout = 1;
    let handle = start_gateway_with(config).await;
    let mut client = connect(&handle, "CP-1").await;

    let registry = handle.session_registry.clone();
    let pusher = tokio::spawn(async move {
        for i in 0..20 {
            let frame = json!([2, format!("srv-{}", i), "TriggerMessage", {}]).to_string();
            if registry.send_to("CP-1", frame).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });

    let started = tokio::time::Instant::now();
    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Ping(_))) => continue,
                _ => break,
            }
        }
    })
    .await;

    assert!(closed.is_ok(), "idle device was kept open by outbound frames");
    assert!(started.elapsed() >= Duration::from_millis(900));
    wait_until(|| !handle.session_registry.is_connected("CP-1")).await;

    pusher.abort();
    handle.shutdown().await;
}

#[tokio::test]
async fn inbound_frames_keep_device_open() {
    let mut config = test_config();
    config.ocpp.idle_timeout = 1;
    let handle = start_gateway_with(config).await;
    let mut client = connect(&handle, "CP-1").await;

    for i in 0..4 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let id = format!("hb-{}", i);
        let response = call(&mut client, json!([2, id, "Heartbeat", {}])).await;
        assert_eq!(response[1], id.as_str());
    }
    assert!(handle.session_registry.is_connected("CP-1"));

    handle.shutdown().await;
}

#[tokio::test]
async fn connection_events_are_published() {
    let handle = start_gateway().await;
    let mut events = handle.event_bus.subscribe();

    let mut client = connect(&handle, "CP-7").await;
    let connected = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .unwrap()
        .unwrap();
    match connected.event {
        Event::ChargePointConnected(e) => assert_eq!(e.charge_point_id, "CP-7"),
        other => panic!("Unexpected event {:?}", other),
    }

    client.close(None).await.unwrap();
    let disconnected = tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Some(msg) = events.recv().await {
                if let Event::ChargePointDisconnected(e) = msg.event {
                    return e;
                }
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(disconnected.charge_point_id, "CP-7");

    handle.shutdown().await;
}
