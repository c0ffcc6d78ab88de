//! Per-cache substituter endpoint (component H): one listener bound to
//! `cache.port`, serving `nix-cache-info`, `*.narinfo`, `nar/*`, and
//! accepting the staging `PUT` half of the upload state machine.
//!
//! The original dispatches on hand-written `re.match` path regexes rather
//! than a route tree (a `.narinfo`/`.nar.<ext>` suffix embedded in a single
//! path segment doesn't fit a segment-per-param router), so this endpoint
//! keeps that shape: one fallback handler, one small set of anchored
//! regexes, matched in the same order as `BinaryCacheRequestHandler`.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use regex::Regex;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use cache_db::models::{Access, CacheRow};
use cache_db::Db;
use cache_domain::Result;
use cache_signer::Signer;
use cache_store::{ArtifactStore, NarinfoFields, NIX_CACHE_INFO};

use crate::auth::{bearer_token, decode_basic_token, token_eq};

#[derive(Clone)]
pub struct CacheState {
    pub cache: Arc<CacheRow>,
    pub db: Arc<Db>,
    pub store: Arc<ArtifactStore>,
}

pub fn router(state: CacheState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

fn narinfo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/([a-z0-9]+)\.narinfo$").unwrap())
}

fn nar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/nar/([a-z0-9]+)\.nar\.(xz|zst)$").unwrap())
}

fn upload_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/([a-z0-9]{8}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{12})$").unwrap()
    })
}

/// `access == private` gates every route: decode the base64 basic-auth
/// token (leading `:` dropped) and compare against `cache.token`.
fn authorize_private(headers: &HeaderMap, cache: &CacheRow) -> bool {
    if cache.access() != Access::Private {
        return true;
    }
    let Some(raw) = bearer_token(headers) else {
        return false;
    };
    let Some(decoded) = decode_basic_token(&raw) else {
        return false;
    };
    token_eq(&decoded, &cache.token)
}

async fn dispatch(
    State(state): State<CacheState>,
    method: Method,
    headers: HeaderMap,
    req: axum::extract::Request,
) -> Response {
    let path = req.uri().path().to_string();

    match method {
        Method::GET => {
            if !authorize_private(&headers, &state.cache) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if path == "/nix-cache-info" {
                return nix_cache_info();
            }
            if let Some(caps) = narinfo_re().captures(&path) {
                return get_narinfo(&state, &caps[1]).await;
            }
            if let Some(caps) = nar_re().captures(&path) {
                return get_nar(&state, &caps[1]).await;
            }
            StatusCode::BAD_REQUEST.into_response()
        }
        Method::HEAD => {
            if !authorize_private(&headers, &state.cache) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if let Some(caps) = narinfo_re().captures(&path) {
                return head_narinfo(&state, &caps[1]).await;
            }
            StatusCode::BAD_REQUEST.into_response()
        }
        Method::PUT => {
            if let Some(caps) = upload_re().captures(&path) {
                let Ok(upload_id) = Uuid::parse_str(&caps[1]) else {
                    return StatusCode::BAD_REQUEST.into_response();
                };
                let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await
                {
                    Ok(b) => b,
                    Err(_) => return StatusCode::BAD_REQUEST.into_response(),
                };
                return put_upload(&state, upload_id, &body);
            }
            StatusCode::BAD_REQUEST.into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn nix_cache_info() -> Response {
    (
        [("Content-Type", "application/octet-stream")],
        NIX_CACHE_INFO,
    )
        .into_response()
}

async fn get_narinfo(state: &CacheState, store_hash: &str) -> Response {
    let row = match state
        .db
        .get_store_path_by_store_hash(&state.cache.name, store_hash)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return e.into_response(),
    };

    let Ok(Some((_path, ext))) = state.store.find_archive(&row.file_hash) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let signature = match render_signature(state, &row) {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };

    let text = NarinfoFields {
        store_hash: &row.store_hash,
        store_suffix: &row.store_suffix,
        file_hash: &row.file_hash,
        ext: &ext,
        file_size: row.file_size,
        nar_hash: &row.nar_hash,
        nar_size: row.nar_size,
        deriver: &row.deriver,
        references: &row.references,
        signature: &signature,
    }
    .render();

    ([("Content-Type", "text/x-nix-narinfo")], text).into_response()
}

/// Presence probe: unlike `GET`, a miss here is `400` rather than `404`
/// (matches `do_HEAD` in the original, which sends `400` for a missing
/// path).
async fn head_narinfo(state: &CacheState, store_hash: &str) -> Response {
    match state
        .db
        .get_store_path_by_store_hash(&state.cache.name, store_hash)
        .await
    {
        Ok(Some(_)) => StatusCode::OK.into_response(),
        Ok(None) => StatusCode::BAD_REQUEST.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_nar(state: &CacheState, file_hash: &str) -> Response {
    let Ok(Some((path, _ext))) = state.store.find_archive(file_hash) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    (
        [("Content-Type", "text/x-nix-narinfo")],
        body,
    )
        .into_response()
}

fn put_upload(state: &CacheState, upload_id: Uuid, body: &[u8]) -> Response {
    match state.store.put(upload_id, body) {
        Ok(()) => ([("Content-Location", "/")], StatusCode::CREATED).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn render_signature(state: &CacheState, row: &cache_db::models::StorePathRow) -> Result<String> {
    let signer = Signer::load(state.store.dir())?;
    let fingerprint = cache_signer::fingerprint(
        &row.store_hash,
        &row.store_suffix,
        &row.nar_hash,
        row.nar_size,
        &row.references,
    );
    Ok(signer.sign(&fingerprint))
}
