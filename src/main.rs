mod collaborators;
mod compliance;
mod config;
mod generation;
mod http;
mod jobs;
mod listing;
mod llm;
mod metrics;
mod models;
mod progress;
mod retry;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use collaborators::{ContentRepository, memory::InMemoryContentRepository, redis_store::RedisContentRepository};
use compliance::ComplianceValidator;
use config::ServiceConfig;
use futures::{Sink, SinkExt, Stream, StreamExt};
use generation::{
    GenerationError, GenerationOrchestrator, GenerationRequest, OrchestratorConfig, ProgressInfo,
    ValidationReport,
};
use listing::{ContentSummary, GeneratedContent};
use llm::{AiClient, tensorzero::GatewayConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, EnhanceRequest, GenerateResponse};
use progress::{ClientMessage, ProgressBroadcaster, ProgressMessage, Subscriber};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    if let Err(err) = run().await {
        error!(target = "hermes.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let config = Arc::new(ServiceConfig::from_env());
    let validator = ComplianceValidator::new(config.compliance_rules()?, config.quality_threshold);

    let repository: Arc<dyn ContentRepository> = match &config.redis_url {
        Some(url) => {
            info!(target = "hermes.api", "content repository: redis");
            Arc::new(RedisContentRepository::open(url)?)
        }
        None => {
            info!(target = "hermes.api", "content repository: in-memory");
            Arc::new(InMemoryContentRepository::new())
        }
    };
    let ai = Arc::new(AiClient::new(GatewayConfig::from_env(), config.backoff));
    let provider = ai.provider_label();
    let collaborators =
        collaborators::demo::collaborators(ai, repository, &config.default_currency);

    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let state = AppState::new(collaborators, validator, config.clone(), provider, prometheus_handle);

    let app = build_router(state);
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "hermes.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<GenerationOrchestrator>,
    jobs: jobs::JobQueue,
    broadcaster: ProgressBroadcaster,
    prometheus_handle: PrometheusHandle,
    config: Arc<ServiceConfig>,
}

impl AppState {
    fn new(
        collaborators: collaborators::Collaborators,
        validator: ComplianceValidator,
        config: Arc<ServiceConfig>,
        provider: String,
        prometheus_handle: PrometheusHandle,
    ) -> Self {
        let broadcaster = ProgressBroadcaster::new(config.progress_send_timeout);
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            collaborators,
            Arc::new(validator),
            broadcaster.clone(),
            OrchestratorConfig::from_service(&config, provider),
        ));
        let (jobs, _worker) = jobs::JobQueue::spawn(
            orchestrator.clone(),
            config.queue_capacity,
            config.status_ttl,
        );
        Self {
            orchestrator,
            jobs,
            broadcaster,
            prometheus_handle,
            config,
        }
    }
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);
    let body_limit = state.config.request_max_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/generations", post(start_generation))
        .route("/generations/{id}", get(get_generation))
        .route("/generations/{id}/ws", get(progress_socket))
        .nest(
            "/contents",
            Router::new()
                .route("/{id}/enhance", post(enhance_content))
                .route("/{id}/validation", get(content_validation))
                .route("/{id}/versions", get(content_versions)),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "hermes-listing-rs",
    }))
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Start a generation run in the background.
///
/// - Method: `POST`
/// - Path: `/generations`
/// - Body: `GenerationRequest`
/// - Response: `202` with `GenerateResponse`; follow progress on
///   `/generations/{processing_id}/ws` or poll `/generations/{processing_id}`.
async fn start_generation(
    State(state): State<AppState>,
    Json(payload): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    metrics::inc_requests("/generations");
    let config = state.orchestrator.config();
    payload.validate(config.max_images)?;
    info!(
        target = "hermes.api",
        product_id = %payload.product_id,
        regenerate = payload.regenerate,
        "generation requested"
    );
    let estimated = config.estimated_total.as_secs();
    let pending = state.jobs.enqueue(payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse::accepted(&pending, estimated)),
    ))
}

async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProgressInfo>, AppError> {
    metrics::inc_requests("/generations/{id}");
    let id = parse_id(&id)?;
    state
        .jobs
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| GenerationError::not_found("generation", id).into())
}

/// Progress stream for one processing id.
///
/// Server frames are JSON `ProgressMessage`s; the client may send
/// `{"type":"heartbeat"}` and gets a heartbeat back.
async fn progress_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    metrics::inc_requests("/generations/{id}/ws");
    let processing_id = parse_id(&id)?;
    Ok(ws.on_upgrade(move |socket| serve_progress(socket, state, processing_id)))
}

async fn serve_progress(socket: WebSocket, state: AppState, processing_id: Uuid) {
    let (sink, stream) = socket.split();
    progress_session(sink, stream, state, processing_id).await;
}

/// Drives one progress subscription over any frame sink and stream.
async fn progress_session<S, R, E>(mut sink: S, mut stream: R, state: AppState, processing_id: Uuid)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Send,
{
    let (subscriber, mut rx) = Subscriber::channel(state.config.progress_channel_capacity);
    if let Err(err) = state.broadcaster.connect(subscriber.clone(), processing_id).await {
        warn!(target = "hermes.api", %processing_id, error = %err, "progress socket rejected");
        return;
    }
    let subscribers = state.broadcaster.subscriber_count(processing_id).await;
    debug!(
        target = "hermes.api",
        %processing_id,
        subscribers,
        "progress socket open"
    );
    if let Some(info) = state.jobs.get(processing_id).await
        && let Err(err) = state
            .broadcaster
            .replay(&subscriber, ProgressMessage::progress(&info))
            .await
    {
        debug!(target = "hermes.api", %processing_id, error = %err, "snapshot replay failed");
    }

    let forward = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    error!(target = "hermes.api", error = %err, "progress frame encode failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Heartbeat) => {
                    if state
                        .broadcaster
                        .heartbeat(&subscriber, processing_id)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    debug!(target = "hermes.api", %processing_id, error = %err, "ignored client frame");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state
        .broadcaster
        .disconnect(subscriber.id(), processing_id)
        .await;
    forward.abort();
}

/// Regenerate one aspect of stored content as a new version.
///
/// - Method: `POST`
/// - Path: `/contents/{id}/enhance`
/// - Body: `{"aspect": "title" | "description" | "category" | "price" | "attributes", "extra"?: string}`
async fn enhance_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EnhanceRequest>,
) -> Result<Json<GeneratedContent>, AppError> {
    metrics::inc_requests("/contents/{id}/enhance");
    let id = parse_id(&id)?;
    let content = state
        .orchestrator
        .enhance_content(id, payload.aspect, payload.extra.as_deref())
        .await?;
    Ok(Json(content))
}

async fn content_validation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ValidationReport>, AppError> {
    metrics::inc_requests("/contents/{id}/validation");
    let id = parse_id(&id)?;
    Ok(Json(state.orchestrator.validate_generated_content(id).await?))
}

async fn content_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ContentSummary>>, AppError> {
    metrics::inc_requests("/contents/{id}/versions");
    let id = parse_id(&id)?;
    Ok(Json(state.orchestrator.list_versions(id).await?))
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| GenerationError::InvalidRequest(format!("`{raw}` is not a valid id")).into())
}

#[derive(Debug)]
struct AppError(GenerationError);

impl From<GenerationError> for AppError {
    fn from(value: GenerationError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            GenerationError::NotFound { .. } => StatusCode::NOT_FOUND,
            GenerationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GenerationError::StructuralValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GenerationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GenerationError::Transition(_) => StatusCode::CONFLICT,
            GenerationError::CategoryDetection(_)
            | GenerationError::AiService(_)
            | GenerationError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            GenerationError::Repository(_) | GenerationError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(target = "hermes.api", code = err.code(), error = %err, "request failed");
        }
        let payload = ApiError {
            error: err.code().to_string(),
            detail: Some(err.to_string()),
        };
        let mut response = (status, Json(payload)).into_response();
        if let Some(wait) = err.retry_after()
            && let Ok(value) = HeaderValue::from_str(&wait.as_secs().max(1).to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
