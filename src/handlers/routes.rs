use axum::extract::State;
use axum::http::header::{ACCEPT_LANGUAGE, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::handlers::operations::execute_detached;
use crate::handlers::view::{MaskView, SessionView};
use crate::llm::ImageService;
use crate::mask::{Point, PointerKind};
use crate::persona::{AspectRatio, PersonaAttributes};
use crate::session::{EditTab, SessionError, SessionState};
use crate::state::AppState;
use crate::utils::language::resolve_overlay_language;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::Busy | SessionError::WrongMode(_) => StatusCode::CONFLICT,
            SessionError::NoImage => StatusCode::NOT_FOUND,
            SessionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SessionError::Mask(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct TabBody {
    tab: EditTab,
}

#[derive(Debug, Deserialize)]
struct InpaintBody {
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: String,
}

#[derive(Debug, Deserialize)]
struct ResizeBody {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct PointerBody {
    kind: PointerKind,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

#[derive(Debug, Deserialize)]
struct BrushBody {
    width: f32,
}

#[derive(Debug, Deserialize)]
struct StrokeBody {
    points: Vec<Point>,
}

fn view_of(session: &Mutex<SessionState>) -> Json<SessionView> {
    Json(SessionView::capture(session))
}

fn mask_view_of(state: &SessionState) -> Json<MaskView> {
    Json(MaskView::from(state.mask()))
}

pub fn router<S: ImageService + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/session", get(get_session::<S>))
        .route("/api/error/dismiss", post(dismiss_error::<S>))
        .route("/api/persona", put(update_persona::<S>))
        .route("/api/persona/reset", post(reset_persona::<S>))
        .route("/api/generate", post(generate::<S>))
        .route("/api/edit/tab", post(select_tab::<S>))
        .route("/api/edit/inpaint", post(inpaint::<S>))
        .route("/api/edit/scene", post(new_scene::<S>))
        .route("/api/edit/text", post(add_text::<S>))
        .route("/api/mask/resize", post(resize_mask::<S>))
        .route("/api/mask/pointer", post(mask_pointer::<S>))
        .route("/api/mask/stroke", post(mask_stroke::<S>))
        .route("/api/mask/clear", post(clear_mask::<S>))
        .route("/api/mask/brush", put(set_brush::<S>))
        .route("/api/mask.png", get(mask_png::<S>))
        .route("/api/start-over", post(start_over::<S>))
        .route("/api/image/download", get(download_image::<S>))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_session<S: ImageService>(State(state): State<AppState<S>>) -> Json<SessionView> {
    view_of(&state.session)
}

async fn dismiss_error<S: ImageService>(State(state): State<AppState<S>>) -> Json<SessionView> {
    state.session.lock().dismiss_error();
    view_of(&state.session)
}

async fn update_persona<S: ImageService>(
    State(state): State<AppState<S>>,
    Json(attributes): Json<PersonaAttributes>,
) -> ApiResult<Json<SessionView>> {
    state.session.lock().update_attributes(attributes)?;
    Ok(view_of(&state.session))
}

async fn reset_persona<S: ImageService>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<SessionView>> {
    state.session.lock().reset_attributes()?;
    Ok(view_of(&state.session))
}

async fn generate<S: ImageService + 'static>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<SessionView>> {
    let pending = state.session.lock().begin_generate()?;
    execute_detached(state.session.clone(), state.service.clone(), pending).await;
    Ok(view_of(&state.session))
}

async fn select_tab<S: ImageService>(
    State(state): State<AppState<S>>,
    Json(body): Json<TabBody>,
) -> ApiResult<Json<SessionView>> {
    state.session.lock().select_tab(body.tab)?;
    Ok(view_of(&state.session))
}

async fn inpaint<S: ImageService + 'static>(
    State(state): State<AppState<S>>,
    Json(body): Json<InpaintBody>,
) -> ApiResult<Json<SessionView>> {
    let pending = state.session.lock().begin_inpaint(&body.prompt)?;
    execute_detached(state.session.clone(), state.service.clone(), pending).await;
    Ok(view_of(&state.session))
}

async fn new_scene<S: ImageService + 'static>(
    State(state): State<AppState<S>>,
    Json(body): Json<SceneBody>,
) -> ApiResult<Json<SessionView>> {
    let pending = state
        .session
        .lock()
        .begin_new_scene(&body.prompt, body.aspect_ratio)?;
    execute_detached(state.session.clone(), state.service.clone(), pending).await;
    Ok(view_of(&state.session))
}

async fn add_text<S: ImageService + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(body): Json<TextBody>,
) -> ApiResult<Json<SessionView>> {
    let accept_language = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    let resolved = resolve_overlay_language(
        &body.language,
        &body.text,
        accept_language,
        &state.config.default_overlay_language,
    );
    let pending = state
        .session
        .lock()
        .begin_add_text(&body.text, &body.language, &resolved)?;
    execute_detached(state.session.clone(), state.service.clone(), pending).await;
    Ok(view_of(&state.session))
}

async fn resize_mask<S: ImageService>(
    State(state): State<AppState<S>>,
    Json(body): Json<ResizeBody>,
) -> Json<MaskView> {
    let mut session = state.session.lock();
    session.resize_mask(body.width, body.height);
    mask_view_of(&session)
}

async fn mask_pointer<S: ImageService>(
    State(state): State<AppState<S>>,
    Json(body): Json<PointerBody>,
) -> ApiResult<Json<MaskView>> {
    let mut session = state.session.lock();
    session.mask_pointer(body.kind, Point::new(body.x, body.y))?;
    Ok(mask_view_of(&session))
}

async fn mask_stroke<S: ImageService>(
    State(state): State<AppState<S>>,
    Json(body): Json<StrokeBody>,
) -> ApiResult<Json<MaskView>> {
    let mut session = state.session.lock();
    session.draw_mask_stroke(&body.points)?;
    Ok(mask_view_of(&session))
}

async fn clear_mask<S: ImageService>(State(state): State<AppState<S>>) -> Json<MaskView> {
    let mut session = state.session.lock();
    session.clear_mask();
    mask_view_of(&session)
}

async fn set_brush<S: ImageService>(
    State(state): State<AppState<S>>,
    Json(body): Json<BrushBody>,
) -> Json<MaskView> {
    let mut session = state.session.lock();
    session.set_brush_width(body.width);
    mask_view_of(&session)
}

async fn mask_png<S: ImageService>(State(state): State<AppState<S>>) -> ApiResult<Response> {
    let mask = state.session.lock().mask().clone();
    let png = mask.to_png().map_err(SessionError::from)?;
    Ok(([(CONTENT_TYPE, "image/png")], png).into_response())
}

async fn start_over<S: ImageService>(State(state): State<AppState<S>>) -> Json<SessionView> {
    state.session.lock().start_over();
    info!("Session started over");
    view_of(&state.session)
}

async fn download_image<S: ImageService>(State(state): State<AppState<S>>) -> ApiResult<Response> {
    let image = state
        .session
        .lock()
        .current_image()
        .cloned()
        .ok_or(SessionError::NoImage)?;
    let file_name = image.download_file_name(Utc::now());
    info!("Downloading current image as {}", file_name);
    let disposition = format!("attachment; filename=\"{file_name}\"");
    Ok((
        [(CONTENT_TYPE, image.mime_type.clone()), (CONTENT_DISPOSITION, disposition)],
        image.bytes,
    )
        .into_response())
}
