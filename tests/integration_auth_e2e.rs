use std::net::SocketAddr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::{redirect::Policy, StatusCode};

use sessionguard::{
    config::Config,
    crypto::password::CredentialHasher,
    repositories::memory::{MemoryLoginAttemptLog, MemoryPrincipalDirectory, MemorySessionStore},
    routes,
    state::{AppState, Stores},
};

static ALICE_HASH: Lazy<String> = Lazy::new(|| {
    CredentialHasher::new(1024, 1, 1)
        .unwrap()
        .hash("wonderland")
        .unwrap()
});

/// Starts the full stack on an ephemeral port and returns its base URL.
async fn spawn_server() -> String {
    let config = Config {
        hash_memory_kib: 1024,
        hash_iterations: 1,
        hash_parallelism: 1,
        ..Config::default()
    };

    let principals = MemoryPrincipalDirectory::new();
    principals.insert("alice", &ALICE_HASH).unwrap();

    let state = AppState::with_stores(
        &config,
        Stores {
            sessions: Arc::new(MemorySessionStore::new()),
            principals: Arc::new(principals),
            attempts: Arc::new(MemoryLoginAttemptLog::new()),
        },
    )
    .unwrap();
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn browser_session_lifecycle() {
    let base = spawn_server().await;
    let client = browser();

    let response = client.get(format!("{}/account", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/login");

    let response = client
        .post(format!("{}/login", base))
        .form(&[("identifier", "alice"), ("password", "wonderland")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let response = client.get(format!("{}/me", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me: serde_json::Value = response.json().await.unwrap();
    assert_eq!(me["identifier"], "alice");
    assert_eq!(me["authorized"], true);

    let response = client.get(format!("{}/account", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.post(format!("{}/logout", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(format!("{}/me", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn separate_browsers_do_not_share_sessions() {
    let base = spawn_server().await;
    let alice = browser();
    let stranger = browser();

    let response = alice
        .post(format!("{}/login", base))
        .form(&[("identifier", "alice"), ("password", "wonderland")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = stranger.get(format!("{}/me", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Authentication required");
}
