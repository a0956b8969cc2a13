use std::sync::Arc;

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use mc_store::{reconcile, Error, MetricItem, MetricKind, MetricValue, Snapshot, SyncedStore};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

type Store = State<Arc<SyncedStore>>;

#[derive(Debug, Error)]
pub enum ApiError {
	#[error(transparent)]
	Store(#[from] Error),
	#[error("malformed request body: {0}")]
	Body(String),
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self::Body(rejection.body_text())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self {
			Self::Body(_) => StatusCode::BAD_REQUEST,
			Self::Store(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
			Self::Store(Error::NotFound { .. }) => StatusCode::NOT_FOUND,
			Self::Store(e) => {
				error!("Metric store failure: {e:#}");
				StatusCode::INTERNAL_SERVER_ERROR
			}
		};

		(status, self.to_string()).into_response()
	}
}

/// Body of `POST /value/`
#[derive(Debug, Deserialize)]
struct MetricQuery {
	id: String,
	#[serde(rename = "type")]
	kind: String,
}

pub fn router(store: Arc<SyncedStore>) -> Router {
	Router::new()
		.route("/", get(list_metrics))
		.route("/ping", get(ping))
		.route("/update/:kind/:name/:value", post(update_from_path))
		.route("/value/:kind/:name", get(value_from_path))
		.route("/update/", post(update_from_json))
		.route("/value/", post(value_from_json))
		.route("/updates/", post(update_batch))
		.with_state(store)
}

async fn list_metrics(State(store): Store) -> Result<Json<Snapshot>, ApiError> {
	Ok(Json(store.get_all().await?))
}

async fn ping(State(store): Store) -> Result<&'static str, ApiError> {
	store.ping().await?;
	Ok("OK")
}

async fn update_from_path(
	State(store): Store,
	Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<&'static str, ApiError> {
	store.update(&kind, &name, &value).await?;
	Ok("updated")
}

async fn value_from_path(
	State(store): Store,
	Path((kind, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
	Ok(store.get(&kind, &name).await?)
}

async fn update_from_json(
	State(store): Store,
	payload: Result<Json<MetricItem>, JsonRejection>,
) -> Result<Json<MetricItem>, ApiError> {
	let Json(item) = payload?;
	let value = item.to_value()?;

	debug!(id = %item.id, kind = %item.kind, %value, "Updating metric");

	store.update(&item.kind, &item.id, &value.to_string()).await?;

	Ok(Json(item))
}

async fn value_from_json(
	State(store): Store,
	payload: Result<Json<MetricQuery>, JsonRejection>,
) -> Result<Json<MetricItem>, ApiError> {
	let Json(query) = payload?;
	let kind = MetricKind::parse(&query.kind)?;

	let text = store.get(kind.as_ref(), &query.id).await?;

	Ok(Json(MetricItem::from_value(
		query.id,
		MetricValue::parse(kind, &text)?,
	)))
}

async fn update_batch(
	State(store): Store,
	payload: Result<Json<Vec<MetricItem>>, JsonRejection>,
) -> Result<&'static str, ApiError> {
	let Json(items) = payload?;
	let batch = reconcile(&items)?;

	debug!(
		items = items.len(),
		counters = batch.counters.len(),
		gauges = batch.gauges.len(),
		"Applying batch"
	);

	store.update_all(&batch).await?;

	Ok("updated")
}
