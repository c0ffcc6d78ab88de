//! Management HTTP endpoint (component F): `/api/v1/cache/*` and
//! `/api/v2/deploy/*`. Every `/api/v1/cache/<name>/...` route resolves the
//! cache by name (400 if unknown) and, except for `GET` of a public cache's
//! descriptor, enforces bearer-token equality against the cache's token.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cache_db::models::{Access, CacheRow};
use cache_domain::{Error, Result};
use cache_store::{ArtifactStore, Compression};

use crate::auth::{bearer_token, token_eq};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/cache/:name", get(get_cache_descriptor))
        .route("/api/v1/cache/:name/narinfo", post(missing_narinfo))
        .route(
            "/api/v1/cache/:name/multipart-nar",
            post(begin_multipart_nar),
        )
        .route(
            "/api/v1/cache/:name/multipart-nar/:upload_id",
            post(upload_url),
        )
        .route(
            "/api/v1/cache/:name/multipart-nar/:upload_id/complete",
            post(complete_multipart_nar),
        )
        .route(
            "/api/v1/cache/:name/multipart-nar/:upload_id/abort",
            post(abort_multipart_nar),
        )
        .route(
            "/api/v1/deploy/deployment/:id",
            get(deployment_status),
        )
        .route("/api/v2/deploy/activate", post(activate))
}

async fn resolve_cache(state: &AppState, name: &str) -> Result<CacheRow> {
    state
        .db
        .get_cache(name)
        .await?
        .ok_or_else(|| Error::BadRequest(format!("unknown cache '{name}'")))
}

fn authorize(headers: &HeaderMap, cache: &CacheRow) -> Result<()> {
    let provided = bearer_token(headers).unwrap_or_default();
    if token_eq(&provided, &cache.token) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheDescriptorResponse {
    github_username: &'static str,
    is_public: bool,
    name: String,
    permission: &'static str,
    preferred_compression_method: &'static str,
    public_signing_keys: Vec<String>,
    uri: String,
}

async fn get_cache_descriptor(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let cache = resolve_cache(&state, &name).await?;
    let is_public = cache.access() == Access::Public;

    let permission = if is_public {
        "read-only"
    } else {
        authorize(&headers, &cache)?;
        "read-write"
    };

    let public_key = cache_signer::read_public_key(&state.cache_dir(&name))?;

    Ok(Json(CacheDescriptorResponse {
        github_username: "",
        is_public,
        name: cache.name.clone(),
        permission,
        preferred_compression_method: "XZ",
        public_signing_keys: vec![public_key],
        uri: cache.url.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct NarinfoQuery {
    hashes: Vec<String>,
}

async fn missing_narinfo(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<NarinfoQuery>,
) -> Result<impl IntoResponse> {
    let cache = resolve_cache(&state, &name).await?;
    authorize(&headers, &cache)?;

    let mut missing = Vec::new();
    for hash in body.hashes {
        if state
            .db
            .get_store_path_by_store_hash(&name, &hash)
            .await?
            .is_none()
        {
            missing.push(hash);
        }
    }
    Ok(Json(missing))
}

#[derive(Debug, Deserialize)]
struct BeginQuery {
    compression: String,
}

#[derive(Debug, Serialize)]
struct BeginResponse {
    #[serde(rename = "narId")]
    nar_id: String,
    #[serde(rename = "uploadId")]
    upload_id: String,
}

async fn begin_multipart_nar(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<BeginQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let cache = resolve_cache(&state, &name).await?;
    authorize(&headers, &cache)?;

    let compression = Compression::parse(&query.compression)
        .ok_or_else(|| Error::BadRequest(format!("unknown compression '{}'", query.compression)))?;

    let upload_id = Uuid::new_v4();
    let store = ArtifactStore::new(state.cache_dir(&name));
    store.create_dir()?;
    store.begin_upload(upload_id, compression)?;
    state.uploads.begin(upload_id);

    let id = upload_id.to_string();
    Ok(Json(BeginResponse {
        nar_id: id.clone(),
        upload_id: id,
    }))
}

#[derive(Debug, Serialize)]
struct UploadUrlResponse {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

async fn upload_url(
    State(state): State<AppState>,
    Path((name, upload_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let cache = resolve_cache(&state, &name).await?;
    authorize(&headers, &cache)?;

    Ok(Json(UploadUrlResponse {
        upload_url: format!("{}/{}", cache.url, upload_id),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NarInfoCreate {
    store_hash: String,
    store_suffix: String,
    file_hash: String,
    file_size: i64,
    nar_hash: String,
    nar_size: i64,
    deriver: String,
    references: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody {
    nar_info_create: NarInfoCreate,
}

/// Finalizes an upload. `state.uploads.try_complete` enforces the
/// at-most-one-terminal-transition rule (§4.D) before anything else runs,
/// so a racing double-complete or a complete-after-abort is rejected
/// before it can insert a duplicate row.
async fn complete_multipart_nar(
    State(state): State<AppState>,
    Path((name, upload_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<CompleteBody>,
) -> Result<impl IntoResponse> {
    let cache = resolve_cache(&state, &name).await?;
    authorize(&headers, &cache)?;

    let upload_uuid = Uuid::parse_str(&upload_id)
        .map_err(|_| Error::BadRequest("malformed upload id".into()))?;
    state.uploads.try_complete(upload_uuid)?;
    let info = body.nar_info_create;

    state
        .db
        .insert_store_path(
            &Uuid::new_v4().to_string(),
            &info.store_hash,
            &info.store_suffix,
            &info.file_hash,
            info.file_size,
            &info.nar_hash,
            info.nar_size,
            &info.deriver,
            &info.references,
            &name,
        )
        .await?;

    let store = ArtifactStore::new(state.cache_dir(&name));
    store.finalize(upload_uuid, &info.file_hash)?;

    Ok(axum::http::StatusCode::OK)
}

async fn abort_multipart_nar(
    State(state): State<AppState>,
    Path((name, upload_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let cache = resolve_cache(&state, &name).await?;
    authorize(&headers, &cache)?;

    let upload_uuid = Uuid::parse_str(&upload_id)
        .map_err(|_| Error::BadRequest("malformed upload id".into()))?;
    state.uploads.try_abort(upload_uuid)?;
    let store = ArtifactStore::new(state.cache_dir(&name));
    store.abort(upload_uuid)?;

    Ok(axum::http::StatusCode::OK)
}

#[derive(Debug, Serialize)]
struct DeploymentStatusResponse {
    id: String,
    status: &'static str,
}

async fn deployment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let status = state
        .coordinator
        .deployment_status(&id)
        .ok_or_else(|| Error::NotFound(format!("unknown deployment '{id}'")))?;

    Ok(Json(DeploymentStatusResponse {
        id,
        status: status.as_str(),
    }))
}

#[derive(Debug, Deserialize)]
struct ActivateRequest {
    agents: std::collections::HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ActivatedAgent {
    id: String,
    url: &'static str,
}

#[derive(Debug, Serialize)]
struct ActivateResponse {
    agents: std::collections::HashMap<String, ActivatedAgent>,
}

/// `POST /api/v2/deploy/activate`. Verifies every named agent exists before
/// dispatching any deployment; per §5 the whole batch fails together if one
/// agent is unknown.
async fn activate(
    State(state): State<AppState>,
    Json(body): Json<ActivateRequest>,
) -> Result<impl IntoResponse> {
    let mut rows = Vec::with_capacity(body.agents.len());
    for name in body.agents.keys() {
        let row = state
            .db
            .get_agent(name)
            .await?
            .ok_or_else(|| Error::BadRequest(format!("unknown agent '{name}'")))?;
        rows.push(row);
    }

    let mut activated = std::collections::HashMap::new();
    for row in rows {
        let store_path = &body.agents[&row.name];
        let deploy_id = Uuid::new_v4().to_string();
        state
            .coordinator
            .start_deployment(&row.name, &row.id, store_path, &deploy_id)
            .await
            .map_err(|e| Error::BadRequest(e.to_string()))?;
        activated.insert(
            row.name,
            ActivatedAgent {
                id: deploy_id,
                url: "",
            },
        );
    }

    Ok(Json(ActivateResponse { agents: activated }))
}
