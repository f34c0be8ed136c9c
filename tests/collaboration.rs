//! End to end tests: real HTTP server, real WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use diagram_colab::config::Config;
use diagram_colab::db::MemoryStore;
use diagram_colab::{create_app, AppState};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &str = "test-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestApp {
    base: String,
    ws_base: String,
    http: reqwest::Client,
}

async fn spawn_app() -> TestApp {
    spawn_app_with(Config::default()).await
}

async fn spawn_app_with(config: Config) -> TestApp {
    let config = Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        ..config
    };
    let state = AppState::new(config, Arc::new(MemoryStore::new()));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base: format!("http://{}", addr),
        ws_base: format!("ws://{}", addr),
        http: reqwest::Client::new(),
    }
}

fn token(email: &str) -> String {
    let claims = json!({
        "sub": format!("sub-{}", email),
        "email": email,
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

impl TestApp {
    async fn create_diagram(&self, user: &str) -> (String, String) {
        let tm: Value = self
            .http
            .post(format!("{}/api/v1/threat_models", self.base))
            .bearer_auth(token(user))
            .json(&json!({ "name": "Payments" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let tm_id = tm["id"].as_str().unwrap().to_string();

        let response = self
            .http
            .post(format!("{}/api/v1/threat_models/{}/diagrams", self.base, tm_id))
            .bearer_auth(token(user))
            .json(&json!({ "name": "Checkout flow", "cells": [] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let diagram: Value = response.json().await.unwrap();
        (tm_id, diagram["id"].as_str().unwrap().to_string())
    }

    fn diagram_url(&self, tm_id: &str, diagram_id: &str) -> String {
        format!("{}/api/v1/threat_models/{}/diagrams/{}", self.base, tm_id, diagram_id)
    }

    fn collaborate_url(&self, tm_id: &str, diagram_id: &str) -> String {
        format!("{}/collaborate", self.diagram_url(tm_id, diagram_id))
    }

    async fn connect(&self, diagram_id: &str, user: &str) -> Client {
        let url = format!("{}/ws/diagrams/{}?token={}", self.ws_base, diagram_id, token(user));
        let (client, _) = connect_async(url).await.expect("websocket handshake");
        client
    }

    async fn session_info(&self, tm_id: &str, diagram_id: &str, user: &str) -> reqwest::Response {
        self.http
            .get(self.collaborate_url(tm_id, diagram_id))
            .bearer_auth(token(user))
            .send()
            .await
            .unwrap()
    }

    /// Wait until the session reports the given participant count
    async fn wait_for_participants(&self, tm_id: &str, diagram_id: &str, count: usize) {
        for _ in 0..200 {
            let response = self.session_info(tm_id, diagram_id, "observer@example.com").await;
            if response.status() == StatusCode::OK {
                let info: Value = response.json().await.unwrap();
                if info["participants"].as_array().map(Vec::len) == Some(count) {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {} participant(s)", count);
    }
}

/// Next text frame as JSON
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json message");
        }
    }
}

/// Consume frames until the server closes the connection
async fn expect_closed(client: &mut Client) {
    loop {
        match timeout(Duration::from_secs(5), client.next()).await.expect("close in time") {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn two_users_edit_while_rest_writes_are_blocked() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let response = app
        .http
        .post(app.collaborate_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let started: Value = response.json().await.unwrap();
    assert!(started["websocket_url"].as_str().unwrap().ends_with(&format!("/ws/diagrams/{}", diagram_id)));

    let mut alice = app.connect(&diagram_id, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &diagram_id, 1).await;
    let mut bob = app.connect(&diagram_id, "bob@example.com").await;

    let joined = next_json(&mut alice).await;
    assert_eq!(joined["event"], "join");
    assert_eq!(joined["user_id"], "bob@example.com");

    let info: Value = app.session_info(&tm_id, &diagram_id, "alice@example.com").await.json().await.unwrap();
    assert_eq!(info["session_id"], started["session_id"]);
    assert_eq!(info["participants"].as_array().unwrap().len(), 2);

    let add = json!({ "operation": { "type": "add", "component": { "id": "c1", "shape": "process" } } });
    alice.send(Message::Text(add.to_string().into())).await.unwrap();

    let update = next_json(&mut bob).await;
    assert_eq!(update["event"], "update");
    assert_eq!(update["user_id"], "alice@example.com");
    assert_eq!(update["operation"]["type"], "add");
    assert_eq!(update["operation"]["component"]["id"], "c1");

    // The sender gets its own update back
    let echo = next_json(&mut alice).await;
    assert_eq!(echo, update);

    let response = app
        .http
        .put(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("carol@example.com"))
        .json(&json!({ "name": "Renamed", "cells": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "conflict");

    // The relayed add was persisted
    let diagram: Value = app
        .http
        .get(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("carol@example.com"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(diagram["cells"][0]["id"], "c1");

    let response = app
        .http
        .delete(app.collaborate_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    expect_closed(&mut alice).await;
    expect_closed(&mut bob).await;

    let response = app
        .http
        .put(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("carol@example.com"))
        .json(&json!({ "name": "Renamed", "cells": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn last_disconnect_ends_the_session() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let mut alice = app.connect(&diagram_id, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &diagram_id, 1).await;

    alice.close(None).await.unwrap();

    for _ in 0..200 {
        if app.session_info(&tm_id, &diagram_id, "alice@example.com").await.status() == StatusCode::NOT_FOUND {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("session outlived its last participant");
}

#[tokio::test]
async fn leave_is_announced_when_a_client_disconnects() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let mut alice = app.connect(&diagram_id, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &diagram_id, 1).await;
    let mut bob = app.connect(&diagram_id, "bob@example.com").await;
    assert_eq!(next_json(&mut alice).await["event"], "join");

    bob.close(None).await.unwrap();

    let left = next_json(&mut alice).await;
    assert_eq!(left["event"], "leave");
    assert_eq!(left["user_id"], "bob@example.com");
}

#[tokio::test]
async fn plain_http_request_to_websocket_route_is_rejected() {
    let app = spawn_app().await;
    let (_, diagram_id) = app.create_diagram("alice@example.com").await;

    let response = app
        .http
        .get(format!("{}/ws/diagrams/{}", app.base, diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert!(
        response.status() == StatusCode::BAD_REQUEST || response.status() == StatusCode::UPGRADE_REQUIRED,
        "unexpected status {}",
        response.status()
    );
}

#[tokio::test]
async fn websocket_requires_a_valid_token_and_diagram() {
    let app = spawn_app().await;
    let (_, diagram_id) = app.create_diagram("alice@example.com").await;

    let url = format!("{}/ws/diagrams/{}?token=not-a-jwt", app.ws_base, diagram_id);
    match connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        other => panic!("expected 401, got {:?}", other.map(|(_, response)| response.status())),
    }

    let url = format!(
        "{}/ws/diagrams/{}?token={}",
        app.ws_base,
        uuid::Uuid::new_v4(),
        token("alice@example.com")
    );
    match connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 404),
        other => panic!("expected 404, got {:?}", other.map(|(_, response)| response.status())),
    }

    let url = format!("{}/ws/diagrams/not-a-uuid?token={}", app.ws_base, token("alice@example.com"));
    match connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 400),
        other => panic!("expected 400, got {:?}", other.map(|(_, response)| response.status())),
    }
}

#[tokio::test]
async fn threat_model_delete_is_blocked_by_a_live_session() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let response = app
        .http
        .post(app.collaborate_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let tm_url = format!("{}/api/v1/threat_models/{}", app.base, tm_id);
    let response = app.http.delete(&tm_url).bearer_auth(token("alice@example.com")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .http
        .delete(app.collaborate_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.http.delete(&tm_url).bearer_auth(token("alice@example.com")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .http
        .get(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ending_without_a_session_succeeds() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let response = app
        .http
        .delete(app.collaborate_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.session_info(&tm_id, &diagram_id, "alice@example.com").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_are_listed_and_health_is_public() {
    let app = spawn_app().await;
    let (tm_id, first) = app.create_diagram("alice@example.com").await;
    let (_, second) = app.create_diagram("alice@example.com").await;

    let _alice = app.connect(&first, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &first, 1).await;
    let _bob = app.connect(&second, "bob@example.com").await;

    let sessions_url = format!("{}/api/v1/collaboration/sessions", app.base);
    let mut sessions: Vec<Value> = Vec::new();
    for _ in 0..200 {
        sessions = app
            .http
            .get(&sessions_url)
            .bearer_auth(token("alice@example.com"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if sessions.len() == 2 && sessions.iter().all(|s| s["participants"].as_array().unwrap().len() == 1) {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sessions.len(), 2);
    let listed: Vec<&str> = sessions.iter().map(|s| s["diagram_id"].as_str().unwrap()).collect();
    assert!(listed.contains(&first.as_str()));
    assert!(listed.contains(&second.as_str()));

    let response = app.http.get(&sessions_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let health: Value = app
        .http
        .get(format!("{}/api/health", app.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["active_sessions"], 2);
}

#[tokio::test]
async fn patch_and_delete_are_blocked_while_collaborating() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let _alice = app.connect(&diagram_id, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &diagram_id, 1).await;

    let response = app
        .http
        .patch(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("bob@example.com"))
        .json(&json!({ "name": "Patched", "cells": [{ "id": "c9" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "conflict");
    assert!(error["error_description"]
        .as_str()
        .unwrap()
        .contains("collaboration session is active"));

    let response = app
        .http
        .delete(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("bob@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let diagram: Value = app
        .http
        .get(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("bob@example.com"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(diagram["name"], "Checkout flow");
    assert_eq!(diagram["cells"], json!([]));
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_closing_the_connection() {
    let app = spawn_app().await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let mut alice = app.connect(&diagram_id, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &diagram_id, 1).await;
    let mut bob = app.connect(&diagram_id, "bob@example.com").await;
    assert_eq!(next_json(&mut alice).await["event"], "join");

    let rejected = [
        "not json".to_string(),
        json!({ "operation": { "type": "add", "component": null } }).to_string(),
        json!({ "operation": { "type": "update", "component": { "id": "ghost" } } }).to_string(),
        json!({ "operation": { "type": "remove" } }).to_string(),
    ];
    for frame in rejected {
        alice.send(Message::Text(frame.into())).await.unwrap();
    }
    let valid = json!({ "operation": { "type": "add", "component": { "id": "c1" } } });
    alice.send(Message::Text(valid.to_string().into())).await.unwrap();

    // Only the valid add comes through, in order, to both connections
    let update = next_json(&mut bob).await;
    assert_eq!(update["operation"]["type"], "add");
    assert_eq!(update["operation"]["component"]["id"], "c1");
    let echo = next_json(&mut alice).await;
    assert_eq!(echo["operation"]["component"]["id"], "c1");

    let diagram: Value = app
        .http
        .get(app.diagram_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(diagram["cells"], json!([{ "id": "c1" }]));
}

#[tokio::test]
async fn server_pings_connected_clients() {
    let app = spawn_app_with(Config {
        ws_ping_interval_secs: 1,
        ..Config::default()
    })
    .await;
    let (_, diagram_id) = app.create_diagram("alice@example.com").await;
    let mut alice = app.connect(&diagram_id, "alice@example.com").await;

    loop {
        let frame = timeout(Duration::from_secs(5), alice.next())
            .await
            .expect("ping in time")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Ping(_) = frame {
            break;
        }
    }
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_timeout() {
    let app = spawn_app_with(Config {
        ws_read_timeout_secs: 1,
        ..Config::default()
    })
    .await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    // Never read from or write to this socket
    let _alice = app.connect(&diagram_id, "alice@example.com").await;
    app.wait_for_participants(&tm_id, &diagram_id, 1).await;

    for _ in 0..100 {
        if app.session_info(&tm_id, &diagram_id, "bob@example.com").await.status() == StatusCode::NOT_FOUND {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("silent client kept the session alive");
}

#[tokio::test]
async fn started_session_nobody_joins_releases_the_diagram() {
    let app = spawn_app_with(Config {
        session_empty_grace_secs: 1,
        ..Config::default()
    })
    .await;
    let (tm_id, diagram_id) = app.create_diagram("alice@example.com").await;

    let response = app
        .http
        .post(app.collaborate_url(&tm_id, &diagram_id))
        .bearer_auth(token("alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let put = || {
        app.http
            .put(app.diagram_url(&tm_id, &diagram_id))
            .bearer_auth(token("bob@example.com"))
            .json(&json!({ "name": "Renamed", "cells": [] }))
            .send()
    };
    assert_eq!(put().await.unwrap().status(), StatusCode::CONFLICT);

    for _ in 0..100 {
        if app.session_info(&tm_id, &diagram_id, "bob@example.com").await.status() == StatusCode::NOT_FOUND {
            assert_eq!(put().await.unwrap().status(), StatusCode::OK);
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("unused session kept the diagram locked");
}
