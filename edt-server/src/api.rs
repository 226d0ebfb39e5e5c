use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use edt_core::{
  parse, DisplaySettings, ExtractionReport, PartialTimetable, Planner, TimeTableData,
};
use edt_vision::{Extractor, MediaKind};

use crate::error::ApiError;

/// Room for the multipart framing around the uploaded file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
  pub planner: Arc<Planner>,
  pub extractor: Arc<Extractor>,
  pub max_upload_bytes: usize,
}

pub fn router(state: AppState) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
    .allow_headers(Any);

  Router::new()
    .route("/health", get(health))
    .route("/api/extract", post(extract))
    .route("/api/import", post(import))
    .route("/api/timetable", get(get_timetable).put(put_timetable))
    .route("/api/settings", get(get_settings).put(put_settings))
    .route("/api/reset", post(reset))
    .layer(DefaultBodyLimit::max(
      state.max_upload_bytes + MULTIPART_OVERHEAD,
    ))
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[derive(Serialize)]
struct Health {
  status: &'static str,
  version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Extraction {
  text: String,
  timetable_data: PartialTimetable,
  report: ExtractionReport,
}

async fn health() -> Json<Health> {
  Json(Health {
    status: "ok",
    version: env!("CARGO_PKG_VERSION"),
  })
}

fn multipart_error(err: MultipartError, max: usize) -> ApiError {
  if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
    return ApiError::PayloadTooLarge { max };
  }
  ApiError::BadRequest(err.body_text())
}

async fn extract(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<Extraction>, ApiError> {
  let max = state.max_upload_bytes;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|err| multipart_error(err, max))?
  {
    if field.name() != Some("file") {
      continue;
    }

    let mime = field.content_type().unwrap_or_default().to_string();
    let kind = MediaKind::from_mime(&mime)
      .ok_or_else(|| ApiError::UnsupportedMediaType(mime.clone()))?;
    if kind == MediaKind::Image && !state.extractor.has_vision() {
      return Err(ApiError::Unavailable(
        "no vision api is configured for images".to_string(),
      ));
    }

    let bytes = field
      .bytes()
      .await
      .map_err(|err| multipart_error(err, max))?;
    if bytes.len() > max {
      return Err(ApiError::PayloadTooLarge { max });
    }

    info!("Extracting timetable from {} bytes of {}", bytes.len(), mime);
    let text = state
      .extractor
      .extract(&bytes, &mime)
      .await
      .map_err(ApiError::Upstream)?;

    let timetable_data = parse(&text);
    let report = timetable_data.report();
    if !report.is_complete() {
      info!("Extraction is missing {:?}", report.missing);
    }

    return Ok(Json(Extraction {
      text,
      timetable_data,
      report,
    }));
  }

  Err(ApiError::BadRequest(
    "Missing 'file' field in multipart form".to_string(),
  ))
}

/// Runs store access off the async workers; file stores block on disk io.
async fn blocking<T, F>(task: F) -> Result<T, ApiError>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(task)
    .await
    .map_err(|err| ApiError::Internal(format!("Storage task failed: {}", err)))
}

async fn import(
  State(state): State<AppState>,
  Json(partial): Json<PartialTimetable>,
) -> Result<Json<TimeTableData>, ApiError> {
  let planner = state.planner.clone();
  let data = blocking(move || {
    let current = planner.load();
    planner.import(&current, partial)
  })
  .await?;
  Ok(Json(data))
}

async fn get_timetable(State(state): State<AppState>) -> Result<Json<TimeTableData>, ApiError> {
  let planner = state.planner.clone();
  Ok(Json(blocking(move || planner.load()).await?))
}

async fn put_timetable(
  State(state): State<AppState>,
  Json(data): Json<TimeTableData>,
) -> Result<StatusCode, ApiError> {
  data
    .validate()
    .map_err(|err| ApiError::BadRequest(err.to_string()))?;

  let planner = state.planner.clone();
  if !blocking(move || planner.save(&data)).await? {
    return Err(ApiError::Internal("Unable to save timetable".to_string()));
  }
  Ok(StatusCode::NO_CONTENT)
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<DisplaySettings>, ApiError> {
  let planner = state.planner.clone();
  Ok(Json(blocking(move || planner.gateway().load_settings()).await?))
}

async fn put_settings(
  State(state): State<AppState>,
  Json(settings): Json<DisplaySettings>,
) -> Result<StatusCode, ApiError> {
  let planner = state.planner.clone();
  if !blocking(move || planner.gateway().save_settings(&settings)).await? {
    return Err(ApiError::Internal("Unable to save settings".to_string()));
  }
  Ok(StatusCode::NO_CONTENT)
}

async fn reset(State(state): State<AppState>) -> Result<Json<TimeTableData>, ApiError> {
  let planner = state.planner.clone();
  Ok(Json(blocking(move || planner.reset()).await?))
}
