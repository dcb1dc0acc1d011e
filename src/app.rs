use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::access::{AccessPolicy, Actor};
use crate::assistant::{self, ChatTurn, CompletionClient, ContextLimits, GeminiClient, Prompt};
use crate::config::Config;
use crate::error::{TableError, WorkspaceError};
use crate::metrics::{self, Metrics};
use crate::model::RowId;
use crate::sheet::{SheetKind, StoreScope, TAGGING_WORKSHEET};
use crate::store::{ColumnConfig, DataDir, PhotoMap};
use crate::table::TableView;
use crate::workbook;
use crate::workspace::{PhotoSync, SaveReport, Workspace};

/// Header carrying the authenticated email, set by the upstream proxy.
pub const USER_HEADER: &str = "x-user-email";

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared server state: one lazily opened workspace per sheet.
pub struct AppState {
    data_dir: DataDir,
    policy: AccessPolicy,
    workspaces: Mutex<HashMap<SheetKind, Workspace>>,
    assistant: Option<Arc<dyn CompletionClient>>,
    context_limits: ContextLimits,
}

impl AppState {
    pub fn new(data_dir: DataDir, policy: AccessPolicy) -> Self {
        AppState {
            data_dir,
            policy,
            workspaces: Mutex::new(HashMap::new()),
            assistant: None,
            context_limits: ContextLimits::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let state = AppState::new(config.data_dir(), config.access_policy()).with_context_limits(
            ContextLimits {
                tagging_rows: config.context_rows,
                reference_rows: config.reference_rows,
            },
        );
        match &config.gemini_api_key {
            Some(key) if !key.trim().is_empty() => {
                state.with_assistant(Arc::new(GeminiClient::new(key.trim(), &config.gemini_model)))
            }
            _ => {
                warn!("GOOGLE_API_KEY not set, the assistant is disabled");
                state
            }
        }
    }

    pub fn with_assistant(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.assistant = Some(client);
        self
    }

    pub fn with_context_limits(mut self, limits: ContextLimits) -> Self {
        self.context_limits = limits;
        self
    }

    fn with_workspace<R>(&self, kind: SheetKind, f: impl FnOnce(&mut Workspace) -> R) -> R {
        let mut workspaces = self.workspaces.lock().unwrap_or_else(PoisonError::into_inner);
        let workspace = workspaces
            .entry(kind)
            .or_insert_with(|| Workspace::open(self.data_dir.clone(), kind));
        f(workspace)
    }

    /// Run `f` against the workspace for `kind` on the blocking pool.
    ///
    /// Opening, saving and exporting read and write workbooks on disk.
    async fn run<R, F>(self: &Arc<Self>, kind: SheetKind, f: F) -> ApiResult<R>
    where
        F: FnOnce(&mut Workspace) -> R + Send + 'static,
        R: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || state.with_workspace(kind, f))
            .await
            .map_err(|e| {
                error!("Workspace task failed: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Workspace task failed")
            })
    }

    // Side stores were rewritten behind the workspaces' backs; reopen on next use.
    fn forget(&self, scope: StoreScope) {
        let mut workspaces = self.workspaces.lock().unwrap_or_else(PoisonError::into_inner);
        workspaces.retain(|kind, _| kind.store_scope() != scope);
    }
}

/// Build the HTTP router.
///
/// Every route sees the caller's [`Actor`]; routes that write anything are
/// additionally wrapped in a single administrator guard.
pub fn router(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route("/api/tagging-plan", post(save_legacy_rows))
        .route("/api/tagging-plan/photos", post(save_photos))
        .route("/api/tagging-plan/config", post(save_config))
        .route("/api/table/cell", put(edit_cell))
        .route("/api/table/rows", post(add_row))
        .route("/api/table/rows/:id", delete(delete_row))
        .route("/api/table/rows/reorder", post(reorder_rows))
        .route("/api/table/columns", post(add_column))
        .route("/api/table/columns/:name", delete(delete_column))
        .route("/api/table/columns/rename", post(rename_column))
        .route("/api/table/columns/reorder", post(reorder_columns))
        .route("/api/table/photos/:id", post(upload_photo).delete(remove_photo))
        .route("/api/table/save", post(save_table))
        .route_layer(middleware::from_fn(require_admin));

    let open = Router::new()
        .route("/api/tagging-plan/photos", get(load_photos))
        .route("/api/tagging-plan/config", get(load_config))
        .route("/api/table", get(view_table))
        .route("/api/table/metrics", get(table_metrics))
        .route("/api/table/export", get(export_table))
        .route("/api/table/reload", post(reload_table))
        .route("/api/table/columns/width", put(set_column_width))
        .route("/api/table/categories/toggle", post(toggle_category))
        .route("/api/ai-copilot", post(ask_assistant))
        .route("/api/me", get(whoami));

    let data = ServeDir::new(state.data_dir.root());

    guarded
        .merge(open)
        .nest_service("/data", data)
        .layer(middleware::from_fn_with_state(state.clone(), identify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and block until it stops.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::from_config(&config));
    match state.policy.admin_email() {
        Some(email) => info!("Administrator: {}", email),
        None => warn!("No administrator configured, the plan is read-only"),
    }

    let app = router(state);
    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn identify(State(state): State<Arc<AppState>>, mut request: Request, next: Next) -> Response {
    let email = request
        .headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok());
    let actor = state.policy.resolve(email);
    request.extensions_mut().insert(actor);
    next.run(request).await
}

async fn require_admin(request: Request, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<Actor>()
        .is_some_and(Actor::can_edit);
    if !allowed {
        warn!("Rejected {} {} from a non-administrator", request.method(), request.uri().path());
        return ApiError::forbidden().into_response();
    }
    next.run(request).await
}

/// `{ success, message }` body used by every write endpoint.
#[derive(Serialize)]
struct Outcome {
    success: bool,
    message: String,
}

impl Outcome {
    fn ok(message: impl Into<String>) -> Json<Outcome> {
        Json(Outcome {
            success: true,
            message: message.into(),
        })
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn forbidden() -> Self {
        ApiError::new(StatusCode::FORBIDDEN, "Unauthorized")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(Outcome {
            success: false,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<TableError> for ApiError {
    fn from(e: TableError) -> Self {
        let status = match e {
            TableError::Forbidden => return ApiError::forbidden(),
            TableError::UnknownRow(_) | TableError::UnknownColumn(_) => StatusCode::NOT_FOUND,
            TableError::DuplicateColumn(_) => StatusCode::CONFLICT,
            TableError::InvalidName(_)
            | TableError::ConfirmationRequired(_)
            | TableError::UnsupportedMedia(_) => StatusCode::BAD_REQUEST,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::Table(e) => e.into(),
            other => {
                error!("{}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct SheetQuery {
    sheet: Option<String>,
}

impl SheetQuery {
    fn scope(&self) -> StoreScope {
        StoreScope::for_sheet_param(self.sheet.as_deref())
    }

    fn kind(&self) -> ApiResult<SheetKind> {
        match self.sheet.as_deref() {
            None => Ok(SheetKind::default()),
            Some(name) => name
                .parse()
                .map_err(|e: String| ApiError::new(StatusCode::BAD_REQUEST, e)),
        }
    }
}

// Persistence gateway

async fn load_photos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
) -> Response {
    match state.data_dir.load_photos(query.scope()) {
        Ok(photos) => Json(photos).into_response(),
        Err(e) => {
            error!("Error loading photos: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(PhotoMap::new())).into_response()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhotosPayload {
    Wrapped {
        photos: PhotoMap,
        sheet: Option<String>,
    },
    Bare(PhotoMap),
}

async fn save_photos(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PhotosPayload>,
) -> ApiResult<Json<Outcome>> {
    let (photos, sheet) = match payload {
        PhotosPayload::Wrapped { photos, sheet } => (photos, sheet),
        PhotosPayload::Bare(photos) => (photos, None),
    };
    let scope = StoreScope::for_sheet_param(sheet.as_deref());

    state.data_dir.save_photos(scope, &photos).map_err(|e| {
        error!("Error saving photos: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save photos")
    })?;
    state.forget(scope);
    Ok(Outcome::ok("Photos saved successfully"))
}

async fn load_config(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
) -> Response {
    match state.data_dir.load_config(query.scope()) {
        Ok(config) => Json(config).into_response(),
        Err(e) => {
            error!("Error loading config: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ColumnConfig::default())).into_response()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigPayload {
    Wrapped {
        config: ColumnConfig,
        sheet: Option<String>,
    },
    Bare(ColumnConfig),
}

async fn save_config(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfigPayload>,
) -> ApiResult<Json<Outcome>> {
    let (config, sheet) = match payload {
        ConfigPayload::Wrapped { config, sheet } => (config, sheet),
        ConfigPayload::Bare(config) => (config, None),
    };
    let scope = StoreScope::for_sheet_param(sheet.as_deref());

    state.data_dir.save_config(scope, &config).map_err(|e| {
        error!("Error saving config: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save config")
    })?;
    state.forget(scope);
    Ok(Outcome::ok("Config saved successfully"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowsPayload {
    Wrapped {
        data: Vec<Map<String, Value>>,
        #[serde(rename = "sheetName")]
        sheet_name: Option<String>,
    },
    Bare(Vec<Map<String, Value>>),
}

async fn save_legacy_rows(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RowsPayload>,
) -> ApiResult<Json<Outcome>> {
    let (records, sheet_name) = match payload {
        RowsPayload::Wrapped { data, sheet_name } => (data, sheet_name),
        RowsPayload::Bare(data) => (data, None),
    };
    let sheet_name = sheet_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| TAGGING_WORKSHEET.to_string());

    let path = state.data_dir.workbook_path(SheetKind::Legacy);
    let grid = workbook::records_to_grid(&records);
    let (target, sheet) = (path.clone(), sheet_name.clone());
    tokio::task::spawn_blocking(move || workbook::replace_sheet(&target, &sheet, &grid))
        .await
        .map_err(|e| e.to_string())
        .and_then(|written| written.map_err(|e| e.to_string()))
        .map_err(|e| {
            error!("Error saving file: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
        })?;
    info!("Wrote {} rows to {} in {}", records.len(), sheet_name, path.display());

    state
        .workspaces
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&SheetKind::Legacy);
    Ok(Outcome::ok("File saved successfully"))
}

// Table workspace

#[derive(Deserialize)]
struct ViewQuery {
    sheet: Option<String>,
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableResponse<'a> {
    #[serde(flatten)]
    view: TableView<'a>,
    metrics: Metrics,
    can_edit: bool,
}

async fn view_table(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<Response> {
    let kind = SheetQuery {
        sheet: query.sheet,
    }
    .kind()?;

    let needle = query.q;
    state
        .run(kind, move |workspace| {
            let table = workspace.table();
            let body = TableResponse {
                view: table.filter(&needle),
                metrics: metrics::compute(table.rows()),
                can_edit: actor.can_edit(),
            };
            Json(body).into_response()
        })
        .await
}

async fn table_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<Json<Metrics>> {
    let kind = query.kind()?;
    let metrics = state
        .run(kind, |workspace| metrics::compute(workspace.table().rows()))
        .await?;
    Ok(Json(metrics))
}

async fn reload_table(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<Json<Outcome>> {
    let kind = query.kind()?;
    let rows = state
        .run(kind, |workspace| {
            workspace.reload();
            workspace.table().len()
        })
        .await?;
    Ok(Outcome::ok(format!("Reloaded {} rows", rows)))
}

#[derive(Deserialize)]
struct CellEdit {
    id: RowId,
    column: String,
    value: String,
}

async fn edit_cell(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
    Json(edit): Json<CellEdit>,
) -> ApiResult<Json<Outcome>> {
    let kind = query.kind()?;
    state
        .run(kind, move |workspace| {
            workspace
                .table_mut()
                .edit(&actor, &edit.id, &edit.column, &edit.value)
        })
        .await??;
    Ok(Outcome::ok("Cell updated"))
}

#[derive(Serialize)]
struct Created {
    success: bool,
    id: String,
}

async fn add_row(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let kind = query.kind()?;
    let id = state
        .run(kind, move |workspace| workspace.table_mut().add_row(&actor))
        .await??;
    Ok((
        StatusCode::CREATED,
        Json(Created {
            success: true,
            id: id.to_string(),
        }),
    ))
}

#[derive(Serialize)]
struct Synced {
    success: bool,
    photo: PhotoSync,
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<Json<Synced>> {
    let kind = query.kind()?;
    let photo = state
        .run(kind, move |workspace| workspace.delete_row(&actor, &RowId::new(id)))
        .await??;
    Ok(Json(Synced {
        success: !photo.is_failed(),
        photo,
    }))
}

async fn add_column(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let kind = query.kind()?;
    let name = state
        .run(kind, move |workspace| workspace.table_mut().add_column(&actor))
        .await??;
    Ok((StatusCode::CREATED, Json(Created { success: true, id: name })))
}

#[derive(Deserialize)]
struct DeleteColumnQuery {
    sheet: Option<String>,
    #[serde(default)]
    confirm: bool,
}

async fn delete_column(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    Query(query): Query<DeleteColumnQuery>,
) -> ApiResult<Json<Outcome>> {
    let kind = SheetQuery { sheet: query.sheet }.kind()?;
    let column = name.clone();
    state
        .run(kind, move |workspace| {
            workspace
                .table_mut()
                .delete_column(&actor, &column, query.confirm)
        })
        .await??;
    Ok(Outcome::ok(format!("Column {} deleted", name)))
}

#[derive(Deserialize)]
struct Rename {
    from: String,
    to: String,
}

async fn rename_column(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
    Json(rename): Json<Rename>,
) -> ApiResult<Json<Outcome>> {
    let kind = query.kind()?;
    state
        .run(kind, move |workspace| {
            workspace
                .table_mut()
                .rename_column(&actor, &rename.from, &rename.to)
        })
        .await??;
    Ok(Outcome::ok("Column renamed"))
}

#[derive(Deserialize)]
struct Reorder {
    dragged: String,
    target: String,
}

async fn reorder_columns(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
    Json(reorder): Json<Reorder>,
) -> ApiResult<Json<Outcome>> {
    let kind = query.kind()?;
    let moved = state
        .run(kind, move |workspace| {
            workspace
                .table_mut()
                .reorder_columns(&actor, &reorder.dragged, &reorder.target)
        })
        .await??;
    Ok(Outcome::ok(if moved { "Columns reordered" } else { "Nothing to move" }))
}

#[derive(Deserialize)]
struct RowMove {
    dragged: RowId,
    target: RowId,
}

async fn reorder_rows(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
    Json(request): Json<RowMove>,
) -> ApiResult<Json<Outcome>> {
    let kind = query.kind()?;
    let moved = state
        .run(kind, move |workspace| {
            workspace
                .table_mut()
                .move_row(&actor, &request.dragged, &request.target)
        })
        .await??;
    Ok(Outcome::ok(if moved { "Rows reordered" } else { "Nothing to move" }))
}

#[derive(Deserialize)]
struct Width {
    column: String,
    width: u32,
}

#[derive(Serialize)]
struct WidthSet {
    column: String,
    width: u32,
}

async fn set_column_width(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
    Json(request): Json<Width>,
) -> ApiResult<Json<WidthSet>> {
    let kind = query.kind()?;
    let Width { column, width } = request;
    let (width, column) = state
        .run(kind, move |workspace| {
            let width = workspace.table_mut().set_column_width(&column, width);
            (width, column)
        })
        .await?;
    Ok(Json(WidthSet { column, width }))
}

#[derive(Deserialize)]
struct Toggle {
    category: String,
}

#[derive(Serialize)]
struct Toggled {
    category: String,
    expanded: bool,
}

async fn toggle_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
    Json(toggle): Json<Toggle>,
) -> ApiResult<Json<Toggled>> {
    let kind = query.kind()?;
    let category = toggle.category;
    let (expanded, category) = state
        .run(kind, move |workspace| {
            let expanded = workspace.table_mut().toggle_category(&category);
            (expanded, category)
        })
        .await?;
    let expanded = expanded.ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, format!("Category not found: {}", category))
    })?;
    Ok(Json(Toggled { category, expanded }))
}

async fn upload_photo(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Query(query): Query<SheetQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<Synced>> {
    let kind = query.kind()?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
        upload = Some((mime, bytes));
    }
    let (mime, bytes) =
        upload.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No photo received"))?;

    let photo = state
        .run(kind, move |workspace| {
            workspace.attach_photo(&actor, &RowId::new(id), &mime, &bytes)
        })
        .await??;
    Ok(Json(Synced {
        success: !photo.is_failed(),
        photo,
    }))
}

async fn remove_photo(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<Json<Synced>> {
    let kind = query.kind()?;
    let photo = state
        .run(kind, move |workspace| workspace.detach_photo(&actor, &RowId::new(id)))
        .await??;
    Ok(Json(Synced {
        success: !photo.is_failed(),
        photo,
    }))
}

#[derive(Serialize)]
struct Saved {
    success: bool,
    #[serde(flatten)]
    report: SaveReport,
}

async fn save_table(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<Json<Saved>> {
    let kind = query.kind()?;
    let report = state
        .run(kind, move |workspace| workspace.save(&actor))
        .await??;
    Ok(Json(Saved {
        success: true,
        report,
    }))
}

async fn export_table(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<Response> {
    let kind = query.kind()?;
    let bytes = state
        .run(kind, |workspace| workspace.export())
        .await?
        .map_err(|e| {
            error!("Export failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, XLSX_MIME)
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"tagging_plan_export.xlsx\"",
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(response)
}

async fn whoami(Extension(actor): Extension<Actor>) -> Json<Actor> {
    Json(actor)
}

// Assistant

#[derive(Deserialize)]
struct AskRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AskResponse {
    Answer { response: String },
    Failure { error: String },
}

async fn ask_assistant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> (StatusCode, Json<AskResponse>) {
    let Some(client) = state.assistant.clone() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AskResponse::Failure {
                error: assistant::AssistantError::NotConfigured.to_string(),
            }),
        );
    };

    let data_dir = state.data_dir.clone();
    let limits = state.context_limits;
    let context = tokio::task::spawn_blocking(move || assistant::load_context(&data_dir, limits))
        .await
        .unwrap_or_else(|e| {
            error!("Error loading context: {}", e);
            assistant::ContextData::default()
        });

    let prompt = Prompt {
        system: assistant::system_prompt(&context),
        history: request.history,
        message: request.message,
    };

    match client.complete(&prompt).await {
        Ok(response) => (StatusCode::OK, Json(AskResponse::Answer { response })),
        Err(e) => {
            error!("Assistant error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AskResponse::Failure {
                    error: format!("Failed to process request: {}", e),
                }),
            )
        }
    }
}
