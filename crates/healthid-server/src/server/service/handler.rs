//! HTTP routes over the Health ID engine.
//!
//! [`HidService`] owns the shared [`Engine`] and a [`WorkerPool`]. Block
//! issuance and pool paging go through the pool; point lookups and entry
//! updates call the engine directly.

use crate::server::{
    config::ServerConfig,
    pool::{
        manager::WorkerPool,
        request::{BlockOwner, WorkRequest},
        worker::worker_loop,
    },
    service::{
        config::{Backend, Clock, Engine},
        error::ApiError,
    },
};
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use healthid::{Actor, GeneratedBlock, Hid, HidEngine, IssuedBlock, PoolEntry, Result};
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

/// Header carrying the caller's identity.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the caller's display name.
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";

/// Shutdown flag and in-flight request count shared by the handlers and the
/// worker pool.
#[derive(Debug, Default)]
pub struct Lifecycle {
    shutting_down: AtomicBool,
    in_flight: AtomicUsize,
}

impl Lifecycle {
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Registers a request for the duration of the returned guard.
    ///
    /// # Errors
    ///
    /// [`ApiError::ServiceShutdown`] once shutdown began.
    pub fn enter(self: &Arc<Self>) -> Result<InFlight, ApiError> {
        if self.is_shutting_down() {
            return Err(ApiError::ServiceShutdown);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(InFlight(Arc::clone(self)))
    }
}

/// Decrements the in-flight count on drop.
pub struct InFlight(Arc<Lifecycle>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared state of every route.
#[derive(Clone)]
pub struct HidService {
    engine: Arc<Engine>,
    worker_pool: Arc<WorkerPool>,
    lifecycle: Arc<Lifecycle>,
}

impl HidService {
    /// Builds the engine from `config` over a fresh in-memory store and
    /// spawns the worker pool.
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let engine = HidEngine::new(
            config.registry()?,
            Backend::new(),
            config.directory(),
            Clock::default(),
            config.engine.clone(),
        );
        Ok(Self::with_engine(
            engine,
            config.num_workers,
            config.shutdown_timeout,
        ))
    }

    /// Spawns `num_workers` workers (at least one) sharing `engine`.
    pub fn with_engine(
        engine: Engine,
        num_workers: usize,
        shutdown_timeout: core::time::Duration,
    ) -> Self {
        let engine = Arc::new(engine);
        let lifecycle = Arc::new(Lifecycle::default());
        let shutdown_token = CancellationToken::new();
        let num_workers = num_workers.max(1);

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            // Handlers wait for each reply, so a small buffer only smooths
            // bursts.
            let (tx, rx) = mpsc::channel(16);
            workers.push(tx);
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&engine),
                shutdown_token.clone(),
            ));
        }

        let worker_pool = WorkerPool::new(
            workers,
            shutdown_token,
            shutdown_timeout,
            Arc::clone(&lifecycle),
        );

        Self {
            engine,
            worker_pool: Arc::new(worker_pool),
            lifecycle,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// All routes, with permissive CORS.
    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/healthIds/generate", post(generate))
            .route("/healthIds/generateBlock", post(generate_block))
            .route("/healthIds/generateBlockForOrg", post(generate_block_for_org))
            .route("/healthIds/nextPage", get(next_page))
            .route("/healthIds/resetCursor", post(reset_cursor))
            .route("/healthIds/blocks", get(blocks))
            .route("/healthIds/{hid}", get(find_hid).delete(remove_hid))
            .route("/healthIds/{hid}/used", put(mark_used))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self)
    }

    /// Drains in-flight requests, stops the workers and waits for
    /// fire-and-forget writes to land.
    pub async fn shutdown(&self) {
        self.worker_pool.shutdown().await;
        self.engine.settle().await;
    }

    async fn dispatch<T>(
        &self,
        to_cursor_worker: bool,
        build: impl FnOnce(oneshot::Sender<Result<T, healthid::Error>>) -> WorkRequest,
    ) -> Result<T, ApiError> {
        let (tx, rx) = oneshot::channel();
        let request = build(tx);
        if to_cursor_worker {
            self.worker_pool.send_to_cursor_worker(request).await?;
        } else {
            self.worker_pool.send_to_next_worker(request).await?;
        }
        rx.await
            .map_err(|_| ApiError::ChannelError {
                context: "worker dropped the request".to_string(),
            })?
            .map_err(ApiError::from)
    }
}

fn actor(headers: &HeaderMap) -> Actor {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let actor = Actor::new(value(ACTOR_ID_HEADER).unwrap_or("anonymous"));
    match value(ACTOR_NAME_HEADER) {
        Some(name) => actor.with_name(name),
        None => actor,
    }
}

fn query<T>(query: core::result::Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query.map(|Query(q)| q).map_err(|rejection| ApiError::InvalidRequest {
        reason: rejection.body_text(),
    })
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::InvalidRequest {
        reason: format!("missing query parameter `{name}`"),
    })
}

fn parse_hid(raw: &str) -> Result<Hid, ApiError> {
    Ok(raw.parse::<Hid>()?)
}

#[derive(Debug, Deserialize)]
pub struct BlockParams {
    start: Option<u64>,
    #[serde(rename = "totalHIDs")]
    total_hids: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct OrgBlockParams {
    #[serde(rename = "orgCode")]
    org_code: Option<String>,
    start: Option<u64>,
    #[serde(rename = "totalHIDs")]
    total_hids: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BlocksParams {
    owner: Option<String>,
    #[serde(rename = "seriesNo")]
    series_no: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HidPage {
    pub hids: Vec<Hid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

async fn health(State(service): State<HidService>) -> (StatusCode, Json<HealthStatus>) {
    if service.lifecycle.is_shutting_down() {
        let body = HealthStatus {
            status: "shutting_down".to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    } else {
        let body = HealthStatus {
            status: "ok".to_string(),
        };
        (StatusCode::OK, Json(body))
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
async fn generate(
    State(service): State<HidService>,
    headers: HeaderMap,
) -> Result<Json<IssuedBlock>, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let actor = actor(&headers);
    let issued = service
        .dispatch(false, |response| WorkRequest::Generate { actor, response })
        .await?;
    Ok(Json(issued))
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
async fn generate_block(
    State(service): State<HidService>,
    headers: HeaderMap,
    params: core::result::Result<Query<BlockParams>, QueryRejection>,
) -> Result<Json<IssuedBlock>, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let params = query(params)?;
    let start = required(params.start, "start")?;
    let count = required(params.total_hids, "totalHIDs")?;
    let actor = actor(&headers);

    let issued = service
        .dispatch(false, |response| WorkRequest::Block {
            owner: BlockOwner::Mci,
            start,
            count,
            actor,
            response,
        })
        .await?;
    Ok(Json(issued))
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
async fn generate_block_for_org(
    State(service): State<HidService>,
    headers: HeaderMap,
    params: core::result::Result<Query<OrgBlockParams>, QueryRejection>,
) -> Result<Json<IssuedBlock>, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let params = query(params)?;
    let org_code = required(params.org_code, "orgCode")?;
    let start = required(params.start, "start")?;
    let count = required(params.total_hids, "totalHIDs")?;
    let actor = actor(&headers);

    let issued = service
        .dispatch(false, |response| WorkRequest::Block {
            owner: BlockOwner::Organization(org_code),
            start,
            count,
            actor,
            response,
        })
        .await?;
    Ok(Json(issued))
}

async fn next_page(
    State(service): State<HidService>,
    params: core::result::Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<HidPage>, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let size = query(params)?.size;
    let hids = service
        .dispatch(true, |response| WorkRequest::Page { size, response })
        .await?;
    Ok(Json(HidPage { hids }))
}

async fn reset_cursor(State(service): State<HidService>) -> Result<StatusCode, ApiError> {
    let _guard = service.lifecycle.enter()?;
    service
        .dispatch(true, |response| WorkRequest::ResetCursor { response })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn blocks(
    State(service): State<HidService>,
    params: core::result::Result<Query<BlocksParams>, QueryRejection>,
) -> Result<Json<Vec<GeneratedBlock>>, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let params = query(params)?;
    let owner = required(params.owner, "owner")?;
    let series_no = required(params.series_no, "seriesNo")?;
    Ok(Json(service.engine.blocks_in_series(&owner, series_no).await?))
}

async fn find_hid(
    State(service): State<HidService>,
    Path(hid): Path<String>,
) -> Result<Json<PoolEntry>, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let hid = parse_hid(&hid)?;
    Ok(Json(service.engine.find_entry(&hid).await?))
}

async fn mark_used(
    State(service): State<HidService>,
    Path(hid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let hid = parse_hid(&hid)?;
    service.engine.find_entry(&hid).await?;
    service.engine.mark_used(&hid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_hid(
    State(service): State<HidService>,
    Path(hid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _guard = service.lifecycle.enter()?;
    let hid = parse_hid(&hid)?;
    service.engine.remove_entry(&hid).await?;
    Ok(StatusCode::NO_CONTENT)
}
