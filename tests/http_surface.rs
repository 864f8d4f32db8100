//! End-to-end run of the HTTP surface against a fake detection backend

use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use livewatch::state::{AppConfig, AppState, TransportMode};
use livewatch::web_api::create_router;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}

async fn detection_backend() -> String {
    let router = Router::new().route(
        "/latest-detections",
        get(|| async {
            axum::Json(json!({
                "success": true,
                "detections": [
                    {"id": "1", "name": "Front Door", "url": "http://cam1/stream"},
                    {"event": "Person detected", "timestamp": "10:00:00", "feedId": "1"}
                ]
            }))
        }),
    );
    format!("http://{}/latest-detections", serve(router).await)
}

async fn spawn_app(detection_url: String) -> (String, AppState) {
    let config = AppConfig {
        transport_mode: TransportMode::Poll,
        detection_url,
        poll_interval: Duration::from_secs(60),
        ..AppConfig::default()
    };
    let state = AppState::new(config).unwrap();
    let addr = serve(create_router(state.clone())).await;
    (format!("http://{}", addr), state)
}

async fn next_json_of_type(
    ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    kind: &str,
) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("dashboard socket closed");
            };
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    })
    .await
    .expect("no hub message of expected type")
}

#[tokio::test]
async fn test_poll_session_end_to_end() {
    let backend = detection_backend().await;
    let (base, _state) = spawn_app(backend).await;
    let client = reqwest::Client::new();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!(
        "ws://{}/api/ws",
        base.trim_start_matches("http://")
    ))
    .await
    .unwrap();
    let greeting = next_json_of_type(&mut ws, "connection_state").await;
    assert_eq!(greeting["data"]["connected"], false);

    let resp = client
        .post(format!("{}/api/connection/connect", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["state"], "connected");

    // feed announcement registered before the detection resolved its name
    let record = loop {
        let msg = next_json_of_type(&mut ws, "log_record").await;
        if msg["data"]["kind"] == "standard" {
            break msg;
        }
    };
    assert_eq!(record["data"]["displayText"], "Person detected on Front Door");
    assert_eq!(record["data"]["videoRef"], "http://cam1/stream");

    let feeds: Value = client
        .get(format!("{}/api/feeds", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(feeds["data"][0]["name"], "Front Door");

    let resp = client
        .post(format!("{}/api/connection/disconnect", base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["connected"], false);

    let log: Value = client
        .get(format!("{}/api/log?limit=1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let last = log["data"][0]["displayText"].as_str().unwrap();
    assert!(last.ends_with("Disconnected from detection service"));
}

#[tokio::test]
async fn test_feed_management_and_display_cursor() {
    let (base, state) = spawn_app("http://127.0.0.1:9/latest".to_string()).await;
    let client = reqwest::Client::new();

    for (id, name) in [("1", "Front Door"), ("2", "Back Yard"), ("3", "Garage")] {
        client
            .post(format!("{}/api/feeds", base))
            .json(&json!({"id": id, "name": name, "url": "192.168.1.1"}))
            .send()
            .await
            .unwrap();
        client
            .post(format!("{}/api/feeds/{}/toggle", base, id))
            .send()
            .await
            .unwrap();
    }

    let display: Value = client
        .post(format!("{}/api/display/prev", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(display["data"]["active"]["currentIndex"], 2);
    assert_eq!(display["data"]["displayed"]["name"], "Garage");
    assert_eq!(display["data"]["displayed"]["totalFeeds"], 3);

    let bad_url = client
        .put(format!("{}/api/feeds/2/url", base))
        .json(&json!({"url": "not a url"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_url.status(), 400);
    assert_eq!(state.registry.get("2").await.unwrap().url, "http://192.168.1.1");

    let renamed: Value = client
        .put(format!("{}/api/feeds/2/name", base))
        .json(&json!({"name": "  Patio  "}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["data"]["name"], "Patio");

    let mode = client
        .put(format!("{}/api/feeds/2/mode", base))
        .json(&json!({"mode": "object", "prompt": "red car"}))
        .send()
        .await
        .unwrap();
    assert_eq!(mode.status(), 200);
    let feed = state.registry.get("2").await.unwrap();
    assert_eq!(feed.detection_mode, "object");
    assert_eq!(feed.prompts["object"], "red car");

    let modes: Value = client
        .get(format!("{}/api/detection-modes", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(modes["data"].as_array().unwrap().len() >= 2);

    let health: Value = client
        .get(format!("{}/healthz", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["transport"], "poll");
    assert_eq!(health["detection_connected"], false);
}
