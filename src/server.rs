//! HTTP API server: axum router and request handlers.
//!
//! Handlers validate input, decode images on tokio's blocking pool and hand
//! a prepared `DrawCommand` to the render thread. They answer as soon as the
//! command is queued; animations keep running on the render thread.
//!
//! Every route except the OpenAPI document and Swagger UI sits behind the
//! API key middleware from `auth`.

use crate::auth::{ApiKeyAuth, require_api_key};
use crate::frame::{self, Frame, Position};
use crate::media::{self, ImageEntry};
use crate::render::{
    DisplayState, DisplayStatus, DrawCommand, RenderCommand, StopCondition, TextLayer,
};
use crate::sink::CellFont;
use crate::{Color, Error, MatrixConfig};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Channel to send commands to the render thread
    pub command_tx: Sender<RenderCommand>,
    /// Shared display status (render thread writes, handlers read)
    pub status: Arc<Mutex<DisplayStatus>>,
    /// Root directory for assets (images/, fonts/)
    pub assets_dir: PathBuf,
    /// Panel geometry, for default sizes and positions
    pub matrix: MatrixConfig,
}

// ── Errors ───────────────────────────────────────────────────────────

/// An error answered as `{"detail": ...}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn render_thread_gone() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Render thread gone".to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_rejected_input() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        hello,
        read_item,
        post_draw,
        post_draw_rectangle,
        post_draw_image,
        post_draw_scroll_image,
        post_draw_text,
        post_draw_overlay,
        post_stop,
        post_clear,
        get_status,
        get_images,
        get_fonts,
    ),
    components(schemas(
        DisplayStatus,
        DisplayState,
        ImageEntry,
        MessageResponse,
        ItemResponse,
        RectangleRequest,
        ImageRequest,
        ScrollImageRequest,
        TextRequest,
        OverlayRequest,
    )),
    modifiers(&ApiKeySecurity),
    security(("api_key" = [])),
    tags(
        (name = "draw", description = "Drawing on the LED matrix"),
        (name = "assets", description = "Images and fonts available to draw with"),
        (name = "system", description = "Status and health endpoints"),
    ),
    info(
        title = "LEDController",
        version = env!("CARGO_PKG_VERSION"),
        description = "Draw rectangles, images and scrolling text on an RGB LED matrix"
    )
)]
pub struct ApiDoc;

struct ApiKeySecurity;

impl utoipa::Modify for ApiKeySecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                crate::auth::DEFAULT_HEADER,
            ))),
        );
    }
}

// ── Request/Response types ───────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    #[schema(example = "success")]
    message: String,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ItemResponse {
    item_id: i64,
    item_name: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RectangleRequest {
    /// [width, height] in pixels
    #[schema(value_type = Vec<u32>, example = json!([20, 10]))]
    size: (u32, u32),
    /// [x, y] of the top-left corner
    #[serde(default)]
    #[schema(value_type = Vec<i32>, example = json!([0, 0]))]
    position: Position,
    /// Fill color [r, g, b]
    #[serde(default = "default_fill")]
    #[schema(value_type = Vec<u8>, example = json!([0, 0, 0]))]
    fill: Color,
    /// Outline color [r, g, b]
    #[serde(default = "default_outline")]
    #[schema(value_type = Vec<u8>, example = json!([0, 0, 255]))]
    outline: Color,
}

fn default_fill() -> Color {
    Color::BLACK
}

fn default_outline() -> Color {
    Color::BLUE
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ImageRequest {
    /// Image path relative to the assets directory
    #[schema(example = "images/logo.png")]
    path: String,
    /// [x, y] of the top-left corner
    #[serde(default)]
    #[schema(value_type = Vec<i32>, example = json!([0, 0]))]
    position: Position,
    /// Scale to fit within size × size; native size when omitted
    size: Option<u32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ScrollImageRequest {
    /// Image path relative to the assets directory
    #[schema(example = "images/logo.png")]
    path: String,
    /// Scale to fit within size × size; defaults to the panel height
    size: Option<u32>,
    /// Row of the image's top edge
    #[serde(default)]
    y: i32,
    /// How long to scroll; forever when omitted
    #[schema(example = 10)]
    seconds: Option<u64>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TextRequest {
    /// Text to scroll
    #[schema(example = "Hello, world!")]
    text: String,
    /// BDF font path relative to the assets directory
    #[serde(default = "default_font")]
    #[schema(example = "fonts/7x13.bdf")]
    font: String,
    /// Text color [r, g, b]
    #[serde(default = "default_text_color")]
    #[schema(value_type = Vec<u8>, example = json!([255, 255, 255]))]
    color: Color,
    /// Baseline row; defaults to just below the vertical centre
    y: Option<i32>,
    /// How long to scroll; forever when omitted
    #[schema(example = 10)]
    seconds: Option<u64>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct OverlayRequest {
    /// Static image path relative to the assets directory
    #[schema(example = "images/logo.png")]
    image: String,
    /// Scale the image to fit within size × size; defaults to the panel height
    size: Option<u32>,
    /// [x, y] of the image's top-left corner
    #[serde(default)]
    #[schema(value_type = Vec<i32>, example = json!([0, 0]))]
    position: Position,
    /// Text to scroll over the panel
    #[schema(example = "Hello, world!")]
    text: String,
    /// BDF font path relative to the assets directory
    #[serde(default = "default_font")]
    #[schema(example = "fonts/7x13.bdf")]
    font: String,
    /// Text color [r, g, b]
    #[serde(default = "default_text_color")]
    #[schema(value_type = Vec<u8>, example = json!([255, 255, 255]))]
    color: Color,
    /// Baseline row; defaults to just below the vertical centre
    y: Option<i32>,
    /// How long to run; forever when omitted
    #[schema(example = 10)]
    seconds: Option<u64>,
}

impl OverlayRequest {
    /// What `POST /draw` shows: the logo on the left with a greeting
    /// scrolling past for ten seconds.
    fn default_program() -> Self {
        Self {
            image: "images/logo.png".to_string(),
            size: None,
            position: Position::default(),
            text: "Hello, world!".to_string(),
            font: default_font(),
            color: default_text_color(),
            y: None,
            seconds: Some(10),
        }
    }
}

fn default_font() -> String {
    "fonts/7x13.bdf".to_string()
}

fn default_text_color() -> Color {
    Color::WHITE
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState, auth: ApiKeyAuth) -> Router {
    let api = Router::new()
        .route("/hello", get(hello))
        .route("/items/{item_id}", get(read_item))
        .route("/draw", post(post_draw))
        .route("/draw/rectangle", post(post_draw_rectangle))
        .route("/draw/image", post(post_draw_image))
        .route("/draw/scroll-image", post(post_draw_scroll_image))
        .route("/draw/text", post(post_draw_text))
        .route("/draw/overlay", post(post_draw_overlay))
        .route("/stop", post(post_stop))
        .route("/clear", post(post_clear))
        .route("/status", get(get_status))
        .route("/assets/images", get(get_images))
        .route("/assets/fonts", get(get_fonts))
        .route_layer(from_fn_with_state(auth, require_api_key));

    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .merge(api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Preparation helpers ──────────────────────────────────────────────

/// Run file work on tokio's blocking pool.
async fn blocking<T, F>(what: &str, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> crate::Result<T> + Send + 'static,
{
    let done = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("{what} failed: {e}"),
        })?;

    Ok(done?)
}

/// Decode (and optionally scale) an image off the async runtime.
async fn load_frame(path: PathBuf, size: Option<u32>) -> Result<Frame, ApiError> {
    blocking("Image loader", move || match size {
        Some(size) => frame::load_scaled(&path, size),
        None => frame::load_image(&path),
    })
    .await
}

/// Resolve and parse the font before anything is queued; a file that isn't
/// a usable BDF font is rejected with 400.
async fn text_layer(
    state: &AppState,
    text: String,
    font: &str,
    color: Color,
    y: Option<i32>,
) -> Result<TextLayer, ApiError> {
    let font = media::resolve_asset(&state.assets_dir, font)?;
    let checked = font.clone();
    blocking("Font loader", move || CellFont::load(&checked)).await?;

    let y = match y {
        Some(y) => frame::check_coordinate(y)?,
        None => state.matrix.height() as i32 / 2 + 5,
    };
    Ok(TextLayer {
        text,
        font,
        color,
        y,
    })
}

fn send(state: &AppState, cmd: RenderCommand) -> Result<Json<MessageResponse>, ApiError> {
    state
        .command_tx
        .send(cmd)
        .map_err(|_| ApiError::render_thread_gone())?;
    Ok(message("success"))
}

async fn prepare_overlay(state: &AppState, req: OverlayRequest) -> Result<DrawCommand, ApiError> {
    let path = media::resolve_asset(&state.assets_dir, &req.image)?;
    let size = req.size.unwrap_or(state.matrix.height());
    let image = load_frame(path, Some(size)).await?;
    let text = text_layer(state, req.text, &req.font, req.color, req.y).await?;

    Ok(DrawCommand::Overlay {
        image,
        position: req.position.checked()?,
        text,
        stop: StopCondition::from_seconds(req.seconds),
    })
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /hello — greeting, handy for checking the key works
#[utoipa::path(
    get,
    path = "/hello",
    tag = "system",
    responses(
        (status = 200, description = "Greeting", body = MessageResponse),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn hello() -> Json<MessageResponse> {
    message("Hello from your async endpoint!")
}

/// GET /items/{item_id} — mock item lookup
#[utoipa::path(
    get,
    path = "/items/{item_id}",
    tag = "system",
    params(("item_id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Mock item", body = ItemResponse),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn read_item(Path(item_id): Path<i64>) -> Json<ItemResponse> {
    Json(ItemResponse {
        item_id,
        item_name: format!("Item {item_id}"),
    })
}

/// POST /draw — run the default overlay program
#[utoipa::path(
    post,
    path = "/draw",
    tag = "draw",
    responses(
        (status = 200, description = "Drawing started", body = MessageResponse),
        (status = 403, description = "Invalid or missing API key"),
        (status = 404, description = "Default image or font missing")
    )
)]
async fn post_draw(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let cmd = prepare_overlay(&state, OverlayRequest::default_program()).await?;
    send(&state, RenderCommand::Draw(cmd))
}

/// POST /draw/rectangle — outlined rectangle
#[utoipa::path(
    post,
    path = "/draw/rectangle",
    tag = "draw",
    request_body = RectangleRequest,
    responses(
        (status = 200, description = "Rectangle drawn", body = MessageResponse),
        (status = 400, description = "Empty or oversized rectangle, or position far off the panel"),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn post_draw_rectangle(
    State(state): State<AppState>,
    Json(req): Json<RectangleRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (width, height) = req.size;
    let position = req.position.checked()?;
    let frame = frame::rectangle(width, height, req.fill, req.outline)?;
    send(
        &state,
        RenderCommand::Draw(DrawCommand::Rectangle {
            frame,
            position,
        }),
    )
}

/// POST /draw/image — static image
#[utoipa::path(
    post,
    path = "/draw/image",
    tag = "draw",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Image drawn", body = MessageResponse),
        (status = 400, description = "Invalid path or image"),
        (status = 403, description = "Invalid or missing API key"),
        (status = 404, description = "Image not found")
    )
)]
async fn post_draw_image(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let position = req.position.checked()?;
    let path = media::resolve_asset(&state.assets_dir, &req.path)?;
    let frame = load_frame(path, req.size).await?;
    send(
        &state,
        RenderCommand::Draw(DrawCommand::Image {
            frame,
            position,
        }),
    )
}

/// POST /draw/scroll-image — image scrolling right to left
#[utoipa::path(
    post,
    path = "/draw/scroll-image",
    tag = "draw",
    request_body = ScrollImageRequest,
    responses(
        (status = 200, description = "Scrolling started", body = MessageResponse),
        (status = 400, description = "Invalid path or image"),
        (status = 403, description = "Invalid or missing API key"),
        (status = 404, description = "Image not found")
    )
)]
async fn post_draw_scroll_image(
    State(state): State<AppState>,
    Json(req): Json<ScrollImageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let y = frame::check_coordinate(req.y)?;
    let path = media::resolve_asset(&state.assets_dir, &req.path)?;
    let size = req.size.unwrap_or(state.matrix.height());
    let frame = load_frame(path, Some(size)).await?;
    send(
        &state,
        RenderCommand::Draw(DrawCommand::ScrollImage {
            frame,
            y,
            stop: StopCondition::from_seconds(req.seconds),
        }),
    )
}

/// POST /draw/text — text scrolling right to left
#[utoipa::path(
    post,
    path = "/draw/text",
    tag = "draw",
    request_body = TextRequest,
    responses(
        (status = 200, description = "Scrolling started", body = MessageResponse),
        (status = 400, description = "Invalid font path, not a BDF font, or row out of range"),
        (status = 403, description = "Invalid or missing API key"),
        (status = 404, description = "Font not found")
    )
)]
async fn post_draw_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let text = text_layer(&state, req.text, &req.font, req.color, req.y).await?;
    send(
        &state,
        RenderCommand::Draw(DrawCommand::ScrollText {
            text,
            stop: StopCondition::from_seconds(req.seconds),
        }),
    )
}

/// POST /draw/overlay — static image with scrolling text
#[utoipa::path(
    post,
    path = "/draw/overlay",
    tag = "draw",
    request_body = OverlayRequest,
    responses(
        (status = 200, description = "Overlay started", body = MessageResponse),
        (status = 400, description = "Invalid path or image"),
        (status = 403, description = "Invalid or missing API key"),
        (status = 404, description = "Image or font not found")
    )
)]
async fn post_draw_overlay(
    State(state): State<AppState>,
    Json(req): Json<OverlayRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let cmd = prepare_overlay(&state, req).await?;
    send(&state, RenderCommand::Draw(cmd))
}

/// POST /stop — end the running animation
#[utoipa::path(
    post,
    path = "/stop",
    tag = "draw",
    responses(
        (status = 200, description = "Animation stopped", body = MessageResponse),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn post_stop(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    send(&state, RenderCommand::Stop)
}

/// POST /clear — blank the panel
#[utoipa::path(
    post,
    path = "/clear",
    tag = "draw",
    responses(
        (status = 200, description = "Panel cleared", body = MessageResponse),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn post_clear(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    send(&state, RenderCommand::Clear)
}

/// GET /status — what the panel is doing
#[utoipa::path(
    get,
    path = "/status",
    tag = "system",
    responses(
        (status = 200, description = "Current display status", body = DisplayStatus),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    let status = state.status.lock().unwrap().clone();
    Json(status)
}

/// GET /assets/images — images available to draw
#[utoipa::path(
    get,
    path = "/assets/images",
    tag = "assets",
    responses(
        (status = 200, description = "Images under images/", body = Vec<ImageEntry>),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn get_images(State(state): State<AppState>) -> Json<Vec<ImageEntry>> {
    Json(media::list_images(&state.assets_dir))
}

/// GET /assets/fonts — BDF fonts available for text
#[utoipa::path(
    get,
    path = "/assets/fonts",
    tag = "assets",
    responses(
        (status = 200, description = "Fonts under fonts/", body = Vec<String>),
        (status = 403, description = "Invalid or missing API key")
    )
)]
async fn get_fonts(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(media::list_fonts(&state.assets_dir))
}
