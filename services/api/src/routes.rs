use crate::infra::{ApiContext, AppState};
use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::{DateTime, Utc};
use linkmetric::error::AppError;
use linkmetric::pipeline::intake::normalize_profile_url;
use linkmetric::pipeline::{
    Attempt, AttemptId, Customer, CustomerId, IntakeRequest, PaymentConfirmation, PaymentState,
    PipelineError, PipelineStep, ScrapeState, StartReceipt,
};
use linkmetric::scoring::{compare, ComparisonResult, ScoreRecord};
use linkmetric::store::ActivityLogEntry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn api_router(context: Arc<ApiContext>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/v1/intake", axum::routing::post(intake_endpoint))
        .route(
            "/api/v1/status/:attempt_id",
            axum::routing::get(status_endpoint),
        )
        .route("/api/v1/report/:id", axum::routing::get(report_endpoint))
        .route(
            "/api/v1/payment/webhook",
            axum::routing::post(payment_webhook_endpoint),
        )
        .route("/api/v1/lookup", axum::routing::get(lookup_endpoint))
        .route(
            "/api/v1/customers/:customer_id/attempts",
            axum::routing::get(attempt_history_endpoint),
        )
        .route(
            "/api/v1/compare/:current/:previous",
            axum::routing::get(compare_endpoint),
        )
        .route("/api/v1/logs", axum::routing::get(logs_endpoint))
        .layer(Extension(context))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Intake receipt. Every submission gets one, accepted or not: a rejected
/// intake answers 400 with `rejection` set and no customer, and its
/// `status_url` points at the persisted terminal attempt.
#[derive(Debug, Serialize)]
pub(crate) struct IntakeResponse {
    pub(crate) attempt_id: AttemptId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) customer_id: Option<CustomerId>,
    pub(crate) is_returning_user: bool,
    pub(crate) status_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rejection: Option<String>,
}

pub(crate) async fn intake_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Json(request): Json<IntakeRequest>,
) -> Result<(StatusCode, Json<IntakeResponse>), AppError> {
    let StartReceipt {
        attempt_id,
        customer_id,
        is_returning_user,
    } = match context.runner.start(request) {
        Ok(receipt) => receipt,
        Err(PipelineError::Rejected { attempt_id, source }) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(IntakeResponse {
                    attempt_id,
                    customer_id: None,
                    is_returning_user: false,
                    status_url: format!("/api/v1/status/{attempt_id}"),
                    rejection: Some(source.to_string()),
                }),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    if context.auto_confirm_payments {
        context.confirm_payment(attempt_id);
    }

    let runner = context.runner.clone();
    tokio::spawn(async move {
        // Failures are recorded on the attempt itself; nothing to do here.
        let _ = runner.run(attempt_id).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(IntakeResponse {
            attempt_id,
            customer_id: Some(customer_id),
            is_returning_user,
            status_url: format!("/api/v1/status/{attempt_id}"),
            rejection: None,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) attempt_id: AttemptId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) customer_id: Option<CustomerId>,
    pub(crate) current_step: PipelineStep,
    pub(crate) step_label: String,
    pub(crate) progress_percent: u8,
    pub(crate) payment_status: PaymentState,
    pub(crate) scrape_status: ScrapeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl From<Attempt> for StatusResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            attempt_id: attempt.attempt_id,
            customer_id: attempt.customer_id,
            current_step: attempt.current_step,
            step_label: attempt.current_step.label().to_string(),
            progress_percent: attempt.progress_percent,
            payment_status: attempt.payment_status,
            scrape_status: attempt.scrape_status,
            error_message: attempt.error_message,
            created_at: attempt.created_at,
            completed_at: attempt.completed_at,
        }
    }
}

pub(crate) async fn status_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Path(attempt_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let attempt_id = parse_attempt_id(&attempt_id)?;
    let attempt = context
        .store()
        .attempt(&attempt_id)?
        .ok_or_else(|| AppError::NotFound(format!("attempt {attempt_id}")))?;
    Ok(Json(StatusResponse::from(attempt)))
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportResponse {
    pub(crate) attempt_id: AttemptId,
    pub(crate) customer_id: CustomerId,
    pub(crate) profile_name: String,
    pub(crate) profile_url: String,
    pub(crate) report: ScoreRecord,
}

/// Accepts either an attempt id (UUID) or a customer id (`LM-…`); a customer
/// id resolves to that customer's most recent completed attempt.
pub(crate) async fn report_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Path(id): Path<String>,
) -> Result<Json<ReportResponse>, AppError> {
    let store = context.store();

    let attempt = if id.starts_with("LM-") {
        let customer_id = CustomerId(id.clone());
        store
            .customer(&customer_id)?
            .ok_or_else(|| AppError::NotFound(format!("customer {id}")))?;
        store
            .attempts_for_customer(&customer_id)?
            .into_iter()
            .find(|attempt| attempt.current_step == PipelineStep::Complete)
            .ok_or_else(|| AppError::NotFound(format!("completed report for {id}")))?
    } else {
        let attempt_id = parse_attempt_id(&id)?;
        store
            .attempt(&attempt_id)?
            .ok_or_else(|| AppError::NotFound(format!("attempt {id}")))?
    };

    let record = store
        .score_record(&attempt.attempt_id)?
        .ok_or_else(|| AppError::NotFound(format!("report for attempt {}", attempt.attempt_id)))?;
    let profile_name = store
        .snapshot(&attempt.attempt_id)?
        .map(|snapshot| snapshot.full_name())
        .unwrap_or_default();

    Ok(Json(ReportResponse {
        attempt_id: attempt.attempt_id,
        customer_id: record.customer_id.clone(),
        profile_name,
        profile_url: attempt.profile_url,
        report: record,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentWebhookRequest {
    pub(crate) attempt_id: AttemptId,
    pub(crate) provider_ref: String,
    #[serde(default)]
    pub(crate) amount: Option<f64>,
    pub(crate) status: PaymentState,
}

pub(crate) async fn payment_webhook_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Json(request): Json<PaymentWebhookRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = context.store();
    store
        .attempt(&request.attempt_id)?
        .ok_or_else(|| AppError::NotFound(format!("attempt {}", request.attempt_id)))?;

    let applied = store.apply_payment(PaymentConfirmation {
        attempt_id: request.attempt_id,
        provider_ref: request.provider_ref,
        amount: request.amount,
        status: request.status,
        received_at: Utc::now(),
    })?;

    Ok(Json(json!({ "applied": applied })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LookupQuery {
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LookupResponse {
    pub(crate) customer: Customer,
    pub(crate) is_returning_user: bool,
}

/// Returning-user lookup by normalized profile URL or by email.
pub(crate) async fn lookup_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<LookupResponse>, AppError> {
    let store = context.store();

    let customer = match (&query.url, &query.email) {
        (Some(url), _) => {
            let normalized = normalize_profile_url(url).map_err(PipelineError::InvalidInput)?;
            store.customer_by_profile_url(&normalized)?
        }
        (None, Some(email)) => store.customer_by_email(&email.trim().to_ascii_lowercase())?,
        (None, None) => {
            return Err(AppError::BadRequest(
                "either a url or an email query parameter is required".to_string(),
            ))
        }
    };

    let customer =
        customer.ok_or_else(|| AppError::NotFound("customer for that profile".to_string()))?;
    let is_returning_user = customer.total_attempts > 0;

    Ok(Json(LookupResponse {
        customer,
        is_returning_user,
    }))
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptHistoryResponse {
    pub(crate) customer_id: CustomerId,
    pub(crate) attempts: Vec<StatusResponse>,
}

/// Full attempt history for a customer, most recent first.
pub(crate) async fn attempt_history_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Path(customer_id): Path<String>,
) -> Result<Json<AttemptHistoryResponse>, AppError> {
    let customer_id = CustomerId(customer_id);
    let store = context.store();
    store
        .customer(&customer_id)?
        .ok_or_else(|| AppError::NotFound(format!("customer {customer_id}")))?;

    let attempts = store
        .attempts_for_customer(&customer_id)?
        .into_iter()
        .map(StatusResponse::from)
        .collect();

    Ok(Json(AttemptHistoryResponse {
        customer_id,
        attempts,
    }))
}

pub(crate) async fn compare_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Path((current, previous)): Path<(String, String)>,
) -> Result<Json<ComparisonResult>, AppError> {
    let current = parse_attempt_id(&current)?;
    let previous = parse_attempt_id(&previous)?;
    let result = compare::compare(context.store().as_ref(), current, previous)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub(crate) limit: usize,
}

fn default_log_limit() -> usize {
    50
}

pub(crate) async fn logs_endpoint(
    Extension(context): Extension<Arc<ApiContext>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<ActivityLogEntry>> {
    Json(context.runner.activity_log().recent(query.limit))
}

fn parse_attempt_id(raw: &str) -> Result<AttemptId, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("attempt {raw}")))
}
