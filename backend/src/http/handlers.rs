//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the service
//! layer. Every route except `/health` is scoped to the caller's identity.

use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::channel::mpsc;
use futures::stream::Stream;
use futures::SinkExt;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::dto::{
    AnalysisListResponse, CreateScheduleRequest, DateRangeQuery, ExportCsvRequest,
    GenerateReportResponse, HealthResponse, LatestQuery, LocationQuery, MessageResponse,
    PageQuery, SaveTemplateRequest,
};
use super::error::AppError;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::identity::OwnerIdentity;
use super::state::AppState;
use crate::api::{
    AnalysisId, AnalysisRun, ParameterSet, PredictionId, PredictionResult, ReportConfig,
    ReportId, ReportSchedule, ReportStatus, ReportSummary, ReportTemplate, SampleInput,
    ScheduleId,
};
use crate::db::AnalysisRepository;
use crate::models::time::{parse_range_end, parse_timestamp};
use crate::services::{
    BatchResults, PredictionPage, PredictionStatistics, ReportData, ReportPage, ReportStatusView,
    UploadResponse,
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Token that fires if the handler future is dropped (client went away).
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Service status, repository status and the scoring strategy's probe.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match crate::db::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let scoring = state.calculator.health_check().await;
    let status = if db_status == "connected" && scoring.is_healthy() {
        "ok"
    } else {
        "degraded"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: "v1".to_string(),
        database: db_status,
        scoring,
    }))
}

// =============================================================================
// Upload and analysis runs
// =============================================================================

/// POST /v1/upload
///
/// Multipart form with the CSV under `file` (or `csvfile`). Parameters come
/// as one JSON `parameters` part or as separate `metals`, `standards`,
/// `backgrounds` and `presenceLimits` JSON parts, and must precede the file:
/// rows are validated while the file part is still arriving.
pub async fn upload(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    multipart: Result<Multipart, MultipartRejection>,
) -> HandlerResult<UploadResponse> {
    let mut multipart = multipart?;
    let mut parameters = ParameterSet::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "csvfile" => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(UPLOAD_CHUNK_BUFFER);
                let (cancel, _guard) = request_token();
                let (_, response) = tokio::join!(
                    forward_chunks(field, tx),
                    state.uploads.upload_reader(
                        owner,
                        file_name,
                        StreamReader::new(rx),
                        parameters,
                        &cancel,
                    )
                );
                return Ok(Json(response?));
            }
            "parameters" => parameters = json_part(field, "parameters").await?,
            "metals" => parameters.metals = Some(json_part(field, "metals").await?),
            "standards" => parameters.standards = Some(json_part(field, "standards").await?),
            "backgrounds" => parameters.backgrounds = Some(json_part(field, "backgrounds").await?),
            "presenceLimits" => {
                parameters.presence_limits = Some(json_part(field, "presenceLimits").await?)
            }
            _ => {}
        }
    }

    Err(AppError::bad_request("No file uploaded"))
}

/// Chunks of the file part buffered between the request and the parser.
const UPLOAD_CHUNK_BUFFER: usize = 4;

/// Feed the file part into the ingest channel until it ends, fails, or the
/// ingest side hangs up.
async fn forward_chunks(mut field: Field<'_>, mut tx: mpsc::Sender<io::Result<Bytes>>) {
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => Ok(chunk),
            Ok(None) => break,
            Err(e) => Err(io::Error::other(format!("Failed to read file: {}", e))),
        };
        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() || failed {
            break;
        }
    }
}

async fn json_part<T: DeserializeOwned>(field: Field<'_>, name: &str) -> Result<T, AppError> {
    let text = field
        .text()
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to read {}: {}", name, e)))?;
    serde_json::from_str(&text)
        .map_err(|e| AppError::bad_request(format!("Invalid {} JSON: {}", name, e)))
}

/// GET /v1/data
pub async fn list_analyses(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
) -> HandlerResult<AnalysisListResponse> {
    let analyses = state.repository.list_analyses(&owner).await?;
    let total = analyses.len();
    Ok(Json(AnalysisListResponse { analyses, total }))
}

/// GET /v1/data/{analysis_id}
pub async fn get_analysis(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(analysis_id): ApiPath<AnalysisId>,
) -> HandlerResult<AnalysisRun> {
    Ok(Json(state.repository.get_analysis(&owner, analysis_id).await?))
}

/// DELETE /v1/data/{analysis_id}
pub async fn delete_analysis(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(analysis_id): ApiPath<AnalysisId>,
) -> HandlerResult<MessageResponse> {
    state.repository.delete_analysis(&owner, analysis_id).await?;
    tracing::info!(owner = %owner, upload_id = %analysis_id, "Analysis deleted");
    Ok(Json(MessageResponse::new("Analysis deleted successfully")))
}

// =============================================================================
// Predictions
// =============================================================================

/// POST /v1/predict/single
pub async fn predict_single(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiJson(input): ApiJson<SampleInput>,
) -> Result<(StatusCode, Json<PredictionResult>), AppError> {
    let (cancel, _guard) = request_token();
    let prediction = state.predictions.score_single(&owner, input, &cancel).await?;
    Ok((StatusCode::CREATED, Json(prediction)))
}

/// GET /v1/predict/results
pub async fn list_predictions(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> HandlerResult<PredictionPage> {
    Ok(Json(state.predictions.list(&owner, query.page, query.limit).await?))
}

/// GET /v1/predict/results/{prediction_id}
pub async fn get_prediction(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(prediction_id): ApiPath<PredictionId>,
) -> HandlerResult<PredictionResult> {
    Ok(Json(state.predictions.get(&owner, prediction_id).await?))
}

/// DELETE /v1/predict/results/{prediction_id}
pub async fn delete_prediction(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(prediction_id): ApiPath<PredictionId>,
) -> HandlerResult<MessageResponse> {
    state.predictions.delete(&owner, prediction_id).await?;
    Ok(Json(MessageResponse::new("Prediction deleted successfully")))
}

/// GET /v1/predict/location?latitude=..&longitude=..&radius=..
pub async fn predictions_by_location(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiQuery(query): ApiQuery<LocationQuery>,
) -> HandlerResult<Vec<PredictionResult>> {
    let found = state
        .predictions
        .by_location(&owner, query.latitude, query.longitude, query.radius)
        .await?;
    Ok(Json(found))
}

/// GET /v1/predict/date-range?startDate=..&endDate=..
pub async fn predictions_by_date_range(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiQuery(query): ApiQuery<DateRangeQuery>,
) -> HandlerResult<Vec<PredictionResult>> {
    let start = parse_timestamp(&query.start_date)
        .ok_or_else(|| AppError::bad_request(format!("Invalid startDate: '{}'", query.start_date)))?;
    let end = parse_range_end(&query.end_date)
        .ok_or_else(|| AppError::bad_request(format!("Invalid endDate: '{}'", query.end_date)))?;
    Ok(Json(state.predictions.by_date_range(&owner, start, end).await?))
}

/// GET /v1/predict/latest
pub async fn latest_predictions(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiQuery(query): ApiQuery<LatestQuery>,
) -> HandlerResult<Vec<PredictionResult>> {
    Ok(Json(state.predictions.latest(&owner, query.limit).await?))
}

/// GET /v1/predict/batch/{upload_id}
pub async fn batch_results(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(upload_id): ApiPath<AnalysisId>,
) -> HandlerResult<BatchResults> {
    Ok(Json(state.predictions.batch(&owner, upload_id).await?))
}

/// GET /v1/predict/statistics
pub async fn prediction_statistics(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
) -> HandlerResult<PredictionStatistics> {
    Ok(Json(state.predictions.statistics(&owner).await?))
}

// =============================================================================
// Reports
// =============================================================================

/// POST /v1/reports/generate
///
/// Returns immediately; the report is assembled in the background.
pub async fn generate_report(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiJson(config): ApiJson<ReportConfig>,
) -> Result<(StatusCode, Json<GenerateReportResponse>), AppError> {
    let report_id = state.reports.generate(&owner, config).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateReportResponse {
            report_id,
            status: ReportStatus::Pending,
            message: "Report generation started".to_string(),
        }),
    ))
}

/// GET /v1/reports
pub async fn list_reports(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> HandlerResult<ReportPage> {
    Ok(Json(state.reports.list(&owner, query.page, query.limit).await?))
}

/// GET /v1/reports/{report_id}
pub async fn get_report(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(report_id): ApiPath<ReportId>,
) -> HandlerResult<ReportSummary> {
    Ok(Json(state.reports.get(&owner, report_id).await?))
}

/// GET /v1/reports/{report_id}/status
pub async fn report_status(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(report_id): ApiPath<ReportId>,
) -> HandlerResult<ReportStatusView> {
    Ok(Json(state.reports.status(&owner, report_id).await?))
}

/// GET /v1/reports/{report_id}/data
pub async fn report_data(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(report_id): ApiPath<ReportId>,
) -> HandlerResult<ReportData> {
    Ok(Json(state.reports.report_data(&owner, report_id).await?))
}

fn attachment(content_type: &'static str, file_name: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// GET /v1/reports/{report_id}/download
pub async fn download_report(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(report_id): ApiPath<ReportId>,
) -> Result<Response, AppError> {
    let artifact = state.reports.download(&owner, report_id).await?;
    Ok(attachment(artifact.content_type, &artifact.file_name, artifact.bytes))
}

/// DELETE /v1/reports/{report_id}
pub async fn delete_report(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(report_id): ApiPath<ReportId>,
) -> HandlerResult<MessageResponse> {
    state.reports.delete(&owner, report_id).await?;
    Ok(Json(MessageResponse::new("Report deleted successfully")))
}

/// GET /v1/reports/{report_id}/events
///
/// Stream status changes via Server-Sent Events, ending with `complete`.
pub async fn stream_report_status(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(report_id): ApiPath<ReportId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Verify report exists
    state.reports.status(&owner, report_id).await?;

    let reports = state.reports.clone();
    let stream = async_stream::stream! {
        let mut last: Option<ReportStatus> = None;
        loop {
            let view = match reports.status(&owner, report_id).await {
                Ok(view) => view,
                Err(e) => {
                    let body = serde_json::json!({ "error": e.user_message() });
                    yield Ok(Event::default().event("error").data(body.to_string()));
                    break;
                }
            };

            if last != Some(view.status) {
                last = Some(view.status);
                let data = serde_json::to_string(&view).unwrap_or_default();
                yield Ok(Event::default().event("status").data(data));
            }

            if view.status.is_terminal() {
                let final_event = serde_json::json!({
                    "status": view.status,
                    "message": view.message,
                });
                yield Ok(Event::default()
                    .event("complete")
                    .data(final_event.to_string()));
                break;
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keep-alive"),
    ))
}

/// POST /v1/reports/export/csv
pub async fn export_csv(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiJson(request): ApiJson<ExportCsvRequest>,
) -> Result<Response, AppError> {
    let bytes = state.reports.export_csv(&owner, &request.prediction_ids).await?;
    let file_name = format!("predictions-{}.csv", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    Ok(attachment("text/csv; charset=utf-8", &file_name, bytes))
}

/// GET /v1/reports/templates
pub async fn list_templates(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
) -> HandlerResult<Vec<ReportTemplate>> {
    Ok(Json(state.reports.templates(&owner).await?))
}

/// POST /v1/reports/templates
pub async fn save_template(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiJson(request): ApiJson<SaveTemplateRequest>,
) -> Result<(StatusCode, Json<ReportTemplate>), AppError> {
    let template = state
        .reports
        .save_template(&owner, request.name, request.description, request.config)
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /v1/reports/schedules
pub async fn list_report_schedules(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
) -> HandlerResult<Vec<ReportSchedule>> {
    Ok(Json(state.reports.schedules(&owner).await?))
}

/// POST /v1/reports/schedules
pub async fn create_report_schedule(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiJson(request): ApiJson<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ReportSchedule>), AppError> {
    let schedule = state
        .reports
        .schedule(&owner, request.frequency, request.config)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// DELETE /v1/reports/schedules/{schedule_id}
pub async fn cancel_report_schedule(
    State(state): State<AppState>,
    OwnerIdentity(owner): OwnerIdentity,
    ApiPath(schedule_id): ApiPath<ScheduleId>,
) -> HandlerResult<MessageResponse> {
    state.reports.cancel_schedule(&owner, schedule_id).await?;
    Ok(Json(MessageResponse::new("Schedule cancelled successfully")))
}
