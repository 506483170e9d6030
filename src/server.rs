use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::{GenerationError, StoreError};
use crate::generate::Generator;
use crate::models::{
    BlogPost, GenerationOutcome, GenerationRequest, InternalLink, NewConnection, NewPost, PostPatch, PostStatus,
};
use crate::pipeline;
use crate::prompt::PromptBuilder;
use crate::store::{self, SqliteStore};

pub const ADMIN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub admin_token: Arc<str>,
    pub generator: Generator,
    /// Cancelled on shutdown; aborts in-flight generation.
    pub cancel: CancellationToken,
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let blog = Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/public", get(public_posts))
        .route("/public/{slug}", get(public_post))
        .route("/stats", get(stats))
        .route("/topics", get(list_topics).post(create_topic))
        .route("/topics/{id}", axum::routing::put(update_topic).delete(delete_topic))
        .route("/generate", post(generate))
        .route("/generate/preview", post(generate_preview))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
        .route("/{id}/publish", post(publish_post))
        .route("/{id}/unpublish", post(unpublish_post));

    let connections = Router::new()
        .route("/", get(list_connections).post(create_connection))
        .route("/{id}", axum::routing::delete(delete_connection));

    Router::new()
        .route("/", get(service_info))
        .route("/api/health", get(health))
        .nest("/api/blog", blog)
        .nest("/api/connections", connections)
        .fallback(not_found)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(ADMIN_HEADER),
        ])
}

// ── Errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Admin access required")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    GenerationFailed(String),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::Validation(msg) | StoreError::Conflict(msg)) => ApiError::BadRequest(msg.clone()),
            Some(StoreError::NotFound(what)) => ApiError::NotFound(*what),
            None => ApiError::Internal(err),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Cancelled => ApiError::Unavailable("Server is shutting down".to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GenerationFailed(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = %format!("{e:#}"), "request failed");
                "Server Error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` body extractor whose rejections use the API error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// ── Admin access ───────────────────────────────────────────────────────

/// Extractor that only succeeds when `x-admin-token` matches the configured token.
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !state.admin_token.is_empty() && constant_time_eq(provided, &state.admin_token) {
            Ok(AdminAccess)
        } else {
            warn!(path = %parts.uri.path(), "rejected admin request");
            Err(ApiError::Forbidden)
        }
    }
}

/// Constant-time string comparison to prevent timing attacks on token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ── Service ────────────────────────────────────────────────────────────

async fn service_info() -> Json<Value> {
    Json(json!({
        "name": "quillpress",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "blog": "/api/blog",
            "connections": "/api/connections",
            "health": "/api/health",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "quillpress API is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Route not found" })),
    )
}

// ── Public blog ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PublicQuery {
    limit: Option<i64>,
    category: Option<String>,
}

async fn public_posts(State(state): State<AppState>, Query(query): Query<PublicQuery>) -> ApiResult<Json<Value>> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let posts = store::list_published(&state.pool, category, query.limit).await?;
    Ok(Json(json!({ "success": true, "count": posts.len(), "data": posts })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicPost {
    #[serde(flatten)]
    post: BlogPost,
    content_html: String,
}

fn render_markdown(markdown: &str) -> String {
    let parser = pulldown_cmark::Parser::new(markdown);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

async fn public_post(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<Value>> {
    let post = store::view_published(&state.pool, &slug)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;
    let content_html = render_markdown(&post.content);
    let data = PublicPost { post, content_html };
    Ok(Json(json!({ "success": true, "data": data })))
}

// ── Admin: posts ───────────────────────────────────────────────────────

async fn stats(_: AdminAccess, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let counts = store::post_counts(&state.pool).await?;
    Ok(Json(json!({ "success": true, "data": counts })))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_posts(
    _: AdminAccess,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<PostStatus>().map_err(ApiError::BadRequest)?),
        None => None,
    };
    let posts = store::list_posts(&state.pool, status).await?;
    let counts = store::post_counts(&state.pool).await?;
    Ok(Json(json!({ "success": true, "counts": counts, "data": posts })))
}

async fn get_post(_: AdminAccess, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let post = store::get_post(&state.pool, &id).await?.ok_or(ApiError::NotFound("Post"))?;
    Ok(Json(json!({ "success": true, "data": post })))
}

async fn create_post(
    _: AdminAccess,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewPost>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let post = store::create_post(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": post }))))
}

async fn update_post(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<PostPatch>,
) -> ApiResult<Json<Value>> {
    let post = store::update_post(&state.pool, &id, patch)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;
    Ok(Json(json!({ "success": true, "data": post })))
}

async fn delete_post(_: AdminAccess, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !store::delete_post(&state.pool, &id).await? {
        return Err(ApiError::NotFound("Post"));
    }
    Ok(Json(json!({ "success": true, "message": "Post deleted successfully" })))
}

async fn publish_post(_: AdminAccess, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let post = store::publish_post(&state.pool, &id)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;
    Ok(Json(json!({ "success": true, "data": post, "message": "Post published successfully" })))
}

async fn unpublish_post(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let post = store::unpublish_post(&state.pool, &id)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;
    Ok(Json(json!({ "success": true, "data": post, "message": "Post moved to drafts" })))
}

// ── Admin: topics ──────────────────────────────────────────────────────

async fn list_topics(_: AdminAccess, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let topics = store::topic_catalog(&state.pool).await?;
    Ok(Json(json!({
        "success": true,
        "data": topics,
        "aiAvailable": state.generator.is_available(),
    })))
}

#[derive(Deserialize)]
struct TopicInput {
    #[serde(default)]
    name: String,
    description: Option<String>,
}

async fn create_topic(
    _: AdminAccess,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<TopicInput>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let topic = store::create_topic(&state.pool, &input.name, input.description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": topic }))))
}

async fn update_topic(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<TopicInput>,
) -> ApiResult<Json<Value>> {
    let topic = store::update_topic(&state.pool, &id, Some(&input.name), input.description.as_deref())
        .await?
        .ok_or(ApiError::NotFound("Topic"))?;
    Ok(Json(json!({ "success": true, "data": topic })))
}

async fn delete_topic(_: AdminAccess, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !store::delete_topic(&state.pool, &id).await? {
        return Err(ApiError::NotFound("Topic"));
    }
    Ok(Json(json!({ "success": true, "message": "Topic deleted successfully" })))
}

// ── Admin: generation ──────────────────────────────────────────────────

/// Generator resolving topics against the stored catalog.
async fn catalog_generator(state: &AppState) -> ApiResult<Generator> {
    if !state.generator.is_available() {
        return Err(ApiError::Unavailable(
            "No AI providers configured. Set GROQ_API_KEY, GEMINI_API_KEY or OPENROUTER_API_KEY.".to_string(),
        ));
    }
    let catalog = store::topic_catalog(&state.pool).await?;
    Ok(state.generator.clone().with_prompts(PromptBuilder::new(catalog)))
}

async fn generate(
    _: AdminAccess,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerationRequest>,
) -> ApiResult<Json<Value>> {
    let generator = catalog_generator(&state).await?;
    let outcomes = generator.generate_batch(&request, &state.cancel).await?;

    let summary = pipeline::persist_outcomes(&SqliteStore::new(state.pool.clone()), outcomes).await;
    let generated = summary.posts.len();
    let mut data = json!({
        "generated": generated,
        "failed": summary.errors.len(),
        "posts": summary.posts,
    });
    if !summary.errors.is_empty() {
        data["errors"] = json!(summary.errors);
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Generated {generated} posts successfully"),
        "data": data,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewRequest {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    internal_links: Vec<InternalLink>,
}

async fn generate_preview(
    _: AdminAccess,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<PreviewRequest>,
) -> ApiResult<Json<Value>> {
    let generator = catalog_generator(&state).await?;
    let request = GenerationRequest {
        topic: input.topic,
        count: 1,
        internal_links: input.internal_links,
    };
    request.validate(generator.settings().max_count)?;

    match generator
        .generate_post(&request.topic, &request.internal_links, &state.cancel)
        .await?
    {
        GenerationOutcome::Success(post) => Ok(Json(json!({ "success": true, "data": post }))),
        GenerationOutcome::Failure(message) => Err(ApiError::GenerationFailed(message)),
    }
}

// ── Connections ────────────────────────────────────────────────────────

async fn create_connection(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewConnection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let connection = store::create_connection(&state.pool, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": connection, "message": "Successfully submitted" })),
    ))
}

async fn list_connections(_: AdminAccess, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let connections = store::list_connections(&state.pool).await?;
    Ok(Json(json!({ "success": true, "data": connections })))
}

async fn delete_connection(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !store::delete_connection(&state.pool, &id).await? {
        return Err(ApiError::NotFound("Connection"));
    }
    Ok(Json(json!({ "success": true, "data": {}, "message": "Connection deleted" })))
}
