use crate::{
    config::{check_filter_threshold, check_similarity_threshold, Config},
    errors::DedupError,
    pipeline::{self, PipelineContext, PipelineOptions},
    report::{filter_report, DedupResponse, ReportFilter},
    spreadsheet::read_column_bytes,
};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::{signal, sync::Mutex};

pub struct SharedState {
    ctx: PipelineContext,
    config: Config,
    /// One run at a time owns the vector collection
    run_lock: Mutex<()>,
}

impl SharedState {
    pub fn new(ctx: PipelineContext, config: Config) -> Self {
        Self {
            ctx,
            config,
            run_lock: Mutex::new(()),
        }
    }
}

pub fn build_router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/download_report", get(download_report))
        .route("/api/config", get(get_config))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

async fn start_app(state: Arc<SharedState>) -> anyhow::Result<()> {
    let bind = state.config.server.bind.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    log::info!("listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(ctx: PipelineContext, config: Config) -> anyhow::Result<()> {
    let state = Arc::new(SharedState::new(ctx, config));
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(state).await })
}

#[derive(Debug)]
struct HttpError(DedupError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            DedupError::Input(_) => StatusCode::BAD_REQUEST,
            DedupError::Report(_) => StatusCode::NOT_FOUND,
            DedupError::FatalSetup { .. } => {
                log::error!("{self:?}");
                StatusCode::SERVICE_UNAVAILABLE
            }
            DedupError::Csv(_) | DedupError::Io(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<DedupError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Deserialize)]
pub struct UploadRequest {
    /// Spreadsheet contents (xlsx, xls, ods or CSV), base64 encoded
    pub file_b64: String,
    pub column_name: String,
    pub filter_threshold: Option<f64>,
    pub similarity_threshold: Option<f64>,
}

impl Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UploadRequest {{ file_b64: [REDUCTED], column_name: {:?}, filter_threshold: {:?}, similarity_threshold: {:?} }}", self.column_name, self.filter_threshold, self.similarity_threshold)
    }
}

async fn upload(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<DedupResponse>, HttpError> {
    let Json(payload) =
        payload.map_err(|rejection| DedupError::Input(rejection.body_text()))?;
    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        if payload.column_name.trim().is_empty() {
            return Err(DedupError::Input("column_name is required".to_string()).into());
        }

        let bytes = STANDARD.decode(payload.file_b64.trim())?;
        let rows = read_column_bytes(&bytes, &payload.column_name)?;

        let mut options = PipelineOptions::from_config(&state.config, false);
        if let Some(value) = payload.filter_threshold {
            options.blocking.filter_threshold = check_filter_threshold("filter_threshold", value)?;
        }
        if let Some(value) = payload.similarity_threshold {
            options.refine.similarity_threshold =
                check_similarity_threshold("similarity_threshold", value)?;
        }

        let _guard = state.run_lock.blocking_lock();
        let output = pipeline::run(&state.ctx, &rows, &options)?;
        Ok(Json(output.response()))
    })
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

async fn download_report(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<DownloadParams>,
) -> Result<axum::response::Response, HttpError> {
    let filter = ReportFilter::parse(params.kind.as_deref().unwrap_or("all"));

    tokio::task::block_in_place(move || {
        let _guard = state.run_lock.blocking_lock();
        let path = filter_report(&state.config.report_path(), filter)?;
        let body = std::fs::read(&path)?;

        Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filter.file_name()),
                ),
            ],
            body,
        )
            .into_response())
    })
}

async fn get_config(State(state): State<Arc<SharedState>>) -> Json<Config> {
    Json(state.config.clone())
}
