use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use abenteuer_config::{Config, Retry, Scoring};
use abenteuer_contracts::{
    contracts_manifest_v1, Context, PlanReport, ReportReason, SearchCriteria, TimeWindow,
    WeatherSummary, API_VERSION,
};
use abenteuer_kernel::{
    BackoffPolicy, CallError, CancelHandle, CancelSignal, LibraryStore, Pipeline, PipelineSettings,
    PlanOutcome, PlanRequest, Recommendations, Redactor, ReportSink, ScoringWeights,
};
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::Instrument;

pub mod open_meteo;
pub mod openai;
pub mod reports;

use open_meteo::OpenMeteoWeather;
use openai::{OpenAiModerator, OpenAiPlanGenerator};
use reports::{JsonlReportSink, SqliteReportSink};

const REPORTS_DEFAULT_LIMIT: usize = 20;
const REPORTS_MAX_LIMIT: usize = 200;

type ApiError = (StatusCode, Json<Value>);

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let (shutdown, signal) = CancelHandle::new();
    let app = router(AppState::new(cfg, signal).await?);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    Ok(router(AppState::new(cfg, CancelSignal::never()).await?))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/contracts", get(contracts))
        .route("/v1/activities", get(activities))
        .route("/v1/recommendations", post(recommendations))
        .route("/v1/plans", post(plans))
        .route("/v1/plan-reports", post(create_report).get(list_reports))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

/// Builds the kernel pipeline with the collaborators the config enables.
pub fn build_pipeline(cfg: &Config) -> Result<Pipeline, String> {
    let library = LibraryStore::load(cfg.catalog.extended_path.as_deref().map(Path::new))
        .map_err(|e| e.to_string())?;
    let redactor = Redactor::new(&cfg.redaction.family_names)
        .map_err(|e| format!("invalid redaction.family_names: {e}"))?;
    let mut pipeline = Pipeline::new(Arc::new(library), redactor, pipeline_settings(cfg));

    if cfg.weather.provider == "open_meteo" {
        pipeline = pipeline.with_weather_source(Arc::new(OpenMeteoWeather::new(&cfg.weather)?));
    }

    if cfg.generator.provider == "openai" {
        match (api_key(&cfg.generator.api_key_env), api_key(&cfg.moderation.api_key_env)) {
            (Some(generator_key), Some(moderation_key)) => {
                pipeline = pipeline
                    .with_generator(Arc::new(OpenAiPlanGenerator::new(&cfg.generator, generator_key)?))
                    .with_moderator(Arc::new(OpenAiModerator::new(&cfg.moderation, moderation_key)?));
            }
            _ => tracing::warn!(
                env = %cfg.generator.api_key_env,
                "api key not set; serving library plans only"
            ),
        }
    }
    Ok(pipeline)
}

fn api_key(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn pipeline_settings(cfg: &Config) -> PipelineSettings {
    PipelineSettings {
        weights: scoring_weights(&cfg.scoring),
        daily_rotation_margin: cfg.scoring.daily_rotation_margin,
        alternatives: cfg.scoring.alternatives,
        backoff: backoff_policy(&cfg.retry),
        latitude: cfg.weather.latitude,
        longitude: cfg.weather.longitude,
        max_input_chars: cfg.generator.max_input_chars,
    }
}

fn scoring_weights(s: &Scoring) -> ScoringWeights {
    ScoringWeights {
        age_weight: s.age_weight,
        duration_penalty_per_minute: s.duration_penalty_per_minute,
        season_bonus: s.season_bonus,
        weather_bonus: s.weather_bonus,
        outdoor_precipitation_penalty: s.outdoor_precipitation_penalty,
        optional_material_bonus: s.optional_material_bonus,
        mood_bonus: s.mood_bonus,
        topic_bonus: s.topic_bonus,
        topic_bonus_cap: s.topic_bonus_cap,
        location_bonus: s.location_bonus,
        effort_bonus: s.effort_bonus,
        over_budget_penalty: s.over_budget_penalty,
    }
}

fn backoff_policy(retry: &Retry) -> BackoffPolicy {
    BackoffPolicy::new(
        retry.max_attempts,
        Duration::from_millis(retry.base_delay_ms),
        Duration::from_millis(retry.max_delay_ms),
        retry.jitter_ratio,
    )
}

/// Opens the report sink named by `reports.sink`.
pub async fn open_report_sink(cfg: &Config) -> Result<Arc<dyn ReportSink>, String> {
    if cfg.reports.sink == "sqlite" {
        let sqlite_path = cfg
            .reports
            .sqlite_path
            .clone()
            .ok_or_else(|| "reports.sqlite_path is required for sqlite sink".to_string())?;
        Ok(Arc::new(SqliteReportSink::new(&sqlite_path)?))
    } else {
        Ok(Arc::new(JsonlReportSink::new(&cfg.reports.jsonl_path).await?))
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> CallError {
    if err.is_timeout() {
        CallError::Timeout
    } else if let Some(status) = err.status() {
        CallError::Status {
            status: status.as_u16(),
        }
    } else {
        CallError::Connect(err.to_string())
    }
}

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    reports: Arc<dyn ReportSink>,
    shutdown: CancelSignal,
}

impl AppState {
    async fn new(cfg: Config, shutdown: CancelSignal) -> Result<Self, String> {
        Ok(Self {
            pipeline: Arc::new(build_pipeline(&cfg)?),
            reports: open_report_sink(&cfg).await?,
            shutdown,
        })
    }
}

async fn request_span(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({"error": {"code": code, "message": message.into()}})),
    )
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn contracts() -> Json<Value> {
    let manifest = contracts_manifest_v1();
    Json(json!({
        "version": API_VERSION,
        "contracts_set_sha256": manifest.contracts_set_sha256,
        "generated_at": manifest.generated_at,
        "schemas": manifest
            .schemas
            .iter()
            .map(|s| json!({"path": s.path, "sha256": s.sha256}))
            .collect::<Vec<_>>(),
        "endpoints": [
            "GET /v1/activities",
            "POST /v1/recommendations",
            "POST /v1/plans",
            "POST /v1/plan-reports",
            "GET /v1/plan-reports"
        ]
    }))
}

async fn activities(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"activities": state.pipeline.library().all()}))
}

/// Body shared by `/v1/recommendations` and `/v1/plans`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanInput {
    #[serde(default)]
    date: Option<NaiveDate>,
    criteria: SearchCriteria,
    #[serde(default)]
    time_window: Option<TimeWindow>,
    #[serde(default)]
    weather: Option<WeatherSummary>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    count: Option<usize>,
}

impl PlanInput {
    fn parse(body: Value) -> Result<Self, ApiError> {
        serde_json::from_value(body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
    }

    fn into_request(self) -> Result<(PlanRequest, Option<usize>), ApiError> {
        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        let context = Context::new(date, self.criteria, self.time_window, self.weather)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))?;
        let mut request = PlanRequest::new(context);
        if let Some(notes) = self.notes {
            request = request.with_notes(notes);
        }
        Ok((request, self.count))
    }
}

async fn recommendations(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Recommendations>, ApiError> {
    let (request, count) = PlanInput::parse(body)?.into_request()?;
    let count = count
        .unwrap_or(state.pipeline.settings().alternatives + 1)
        .clamp(1, state.pipeline.library().len().max(1));
    state
        .pipeline
        .recommend(&request, count, &state.shutdown)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, "no_candidates", e.to_string()))
}

async fn plans(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PlanOutcome>, ApiError> {
    let (request, _) = PlanInput::parse(body)?.into_request()?;
    Ok(Json(state.pipeline.plan(&request, &state.shutdown).await))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportInput {
    plan_hash: String,
    reason: ReportReason,
}

async fn create_report(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<PlanReport>), ApiError> {
    let input: ReportInput = serde_json::from_value(body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))?;
    if input.plan_hash.len() != 64
        || !input
            .plan_hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "plan_hash must be 64 lowercase hex characters",
        ));
    }

    let report = PlanReport {
        timestamp_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        plan_hash: input.plan_hash,
        reason: input.reason,
    };
    state.reports.append(&report).await.map_err(|e| {
        tracing::error!(error = %e, "report sink append failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "report_sink_error", "report could not be stored")
    })?;
    tracing::info!(reason = ?report.reason, "plan report recorded");
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Debug, Deserialize)]
struct ReportsQuery {
    limit: Option<usize>,
}

async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(REPORTS_DEFAULT_LIMIT)
        .clamp(1, REPORTS_MAX_LIMIT);
    let reports = state.reports.recent(limit).await.map_err(|e| {
        tracing::error!(error = %e, "report sink read failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "report_sink_error", "reports could not be read")
    })?;
    Ok(Json(json!({"reports": reports})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_kernel_defaults() {
        let scoring = Scoring::default();
        let kernel = PipelineSettings::default();
        assert_eq!(scoring_weights(&scoring), kernel.weights);
        assert_eq!(scoring.daily_rotation_margin, kernel.daily_rotation_margin);
        assert_eq!(scoring.alternatives, kernel.alternatives);
        assert_eq!(backoff_policy(&Retry::default()), kernel.backoff);
    }
}
