//! Exercises the management HTTP router in-process with
//! `tower::ServiceExt::oneshot`, covering the end-to-end scenarios from the
//! design's Testable Properties section: cache descriptor lookup, the
//! missing-narinfo probe, and the full begin/put/complete upload lifecycle
//! followed by a narinfo read back through the substituter.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use cache_coordinator::Coordinator;
use cache_db::models::{Access, AgentRow, CacheRow, WorkspaceRow};
use cache_db::Db;
use cache_domain::Config;
use cache_gateway::state::AppState;
use cache_gateway::{management, substituter};
use cache_store::{ArtifactStore, UploadRegistry};

async fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::connect(&dir.path().join("test.sqlite")).await.unwrap();
    db.create_database().await.unwrap();

    let config = Config {
        cache_dir: dir.path().join("caches"),
        database: dir.path().join("test.sqlite"),
        server_hostname: "cache.example.com".to_string(),
        server_port: 0,
        deploy_port: 0,
        key: "test-signing-key".to_string(),
    };

    let state = AppState {
        config: Arc::new(config),
        db: Arc::new(db),
        coordinator: Arc::new(Coordinator::new()),
        uploads: Arc::new(UploadRegistry::new()),
    };
    (state, dir)
}

async fn seed_cache(state: &AppState, name: &str, port: u16, access: Access) -> CacheRow {
    let cache_dir = state.cache_dir(name);
    std::fs::create_dir_all(&cache_dir).unwrap();
    cache_signer::write_keypair(&cache_dir, name, &state.config.server_hostname).unwrap();

    let row = CacheRow {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        url: format!("http://{name}.{}", state.config.server_hostname),
        token: "cache-token".to_string(),
        access: access.as_str().to_string(),
        port: port.to_string(),
        retention: -1,
    };
    state.db.insert_cache(&row).await.unwrap();
    row
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn cache_descriptor_reports_public_cache_with_one_key() {
    let (state, _dir) = test_state().await;
    seed_cache(&state, "c1", 5000, Access::Public).await;

    let app = management::router().with_state(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/cache/c1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isPublic"], true);
    assert_eq!(body["name"], "c1");
    assert_eq!(body["publicSigningKeys"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn narinfo_query_on_empty_cache_returns_all_hashes_missing() {
    let (state, _dir) = test_state().await;
    seed_cache(&state, "c1", 5000, Access::Public).await;

    let app = management::router().with_state(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cache/c1/narinfo")
                .header("content-type", "application/json")
                .header("authorization", "Bearer cache-token")
                .body(Body::from(
                    json!({ "hashes": ["aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0"] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!(["aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0"]));
}

#[tokio::test]
async fn private_cache_descriptor_rejects_wrong_token() {
    let (state, _dir) = test_state().await;
    seed_cache(&state, "priv1", 5001, Access::Private).await;

    let app = management::router().with_state(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/cache/priv1")
                .header("authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_lifecycle_then_narinfo_round_trips_through_substituter() {
    let (state, _dir) = test_state().await;
    let cache = seed_cache(&state, "c1", 5000, Access::Public).await;

    let mgmt = management::router().with_state(state.clone());

    let begin = mgmt
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cache/c1/multipart-nar?compression=xz")
                .header("authorization", "Bearer cache-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(begin.status(), StatusCode::OK);
    let begin_body = body_json(begin).await;
    let upload_id = begin_body["uploadId"].as_str().unwrap().to_string();

    let store = ArtifactStore::new(state.cache_dir("c1"));
    store.put(uuid::Uuid::parse_str(&upload_id).unwrap(), b"HELLO").unwrap();

    let complete = mgmt
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/cache/c1/multipart-nar/{upload_id}/complete"))
                .header("content-type", "application/json")
                .header("authorization", "Bearer cache-token")
                .body(Body::from(
                    json!({
                        "narInfoCreate": {
                            "storeHash": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0",
                            "storeSuffix": "foo-1.0",
                            "fileHash": "deadbeef",
                            "fileSize": 5,
                            "narHash": "sha256:abc",
                            "narSize": 5,
                            "deriver": "",
                            "references": []
                        }
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(complete.status(), StatusCode::OK);

    // a second complete for the same upload id must be rejected (§4.D
    // at-most-one terminal transition).
    let second_complete = mgmt
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/cache/c1/multipart-nar/{upload_id}/complete"))
                .header("content-type", "application/json")
                .header("authorization", "Bearer cache-token")
                .body(Body::from(
                    json!({
                        "narInfoCreate": {
                            "storeHash": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0",
                            "storeSuffix": "foo-1.0",
                            "fileHash": "deadbeef",
                            "fileSize": 5,
                            "narHash": "sha256:abc",
                            "narSize": 5,
                            "deriver": "",
                            "references": []
                        }
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second_complete.status(), StatusCode::BAD_REQUEST);

    let cache_state = substituter::CacheState {
        cache: Arc::new(cache),
        db: state.db.clone(),
        store: Arc::new(store),
    };
    let sub_app = substituter::router(cache_state);

    let narinfo = sub_app
        .oneshot(
            Request::builder()
                .uri("/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0.narinfo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(narinfo.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(narinfo.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("StorePath: /nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0-foo-1.0\n"));
    assert!(text.contains("FileHash: sha256:deadbeef\n"));
    assert!(text.contains("Sig: c1.cache.example.com-1:"));
}

#[tokio::test]
async fn missing_narinfo_is_404_on_get_and_400_on_head() {
    let (state, _dir) = test_state().await;
    let cache = seed_cache(&state, "c1", 5000, Access::Public).await;

    let cache_state = substituter::CacheState {
        cache: Arc::new(cache),
        db: state.db.clone(),
        store: Arc::new(ArtifactStore::new(state.cache_dir("c1"))),
    };

    let get = substituter::router(cache_state.clone())
        .oneshot(
            Request::builder()
                .uri("/bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb0.narinfo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::NOT_FOUND);

    let head = substituter::router(cache_state)
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri("/bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb0.narinfo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(head.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn activate_fails_whole_batch_when_one_agent_is_unknown() {
    let (state, _dir) = test_state().await;
    seed_cache(&state, "c1", 5000, Access::Public).await;
    state
        .db
        .insert_workspace(&WorkspaceRow {
            id: "w1".into(),
            name: "ws1".into(),
            token: "wtok".into(),
            cache_name: "c1".into(),
        })
        .await
        .unwrap();
    state
        .db
        .insert_agent(&AgentRow {
            id: "a1".into(),
            name: "agent1".into(),
            token: "atok".into(),
            workspace_name: "ws1".into(),
        })
        .await
        .unwrap();

    let app = management::router().with_state(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v2/deploy/activate")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "agents": { "agent1": "/nix/store/x-y", "ghost": "/nix/store/x-y" } })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
