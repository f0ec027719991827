use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::StreamBody,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::{
    fs::CodiumFsError,
    model::{
        CommitRecord, CreateRepositoryResponse, LoginRequest, LoginResponse, NewRepository,
        Repository, RepositoryContents,
    },
    storage::SnapshotStore,
    CodiumError,
};

pub mod auth;
pub mod config;
pub mod meta;
pub mod resolver;

use auth::{AuthUser, Authenticator};
use config::ServerConfig;
use meta::FileRepositoryStore;
use resolver::{TreeResolver, UploadedFile};

/// `CodiumServerError` stand for server error.
#[derive(Error, Debug)]
pub enum CodiumServerError {
    #[error("{0}")]
    CodiumError(#[from] CodiumError),
    #[error("missing authentication credentials")]
    MissingCredentials,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("token validation failed: {0}")]
    TokenValidation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("network error: {0}")]
    NetworkError(#[from] hyper::Error),
}

impl CodiumServerError {
    fn status(&self) -> StatusCode {
        match self {
            CodiumServerError::MissingCredentials
            | CodiumServerError::InvalidCredentials
            | CodiumServerError::TokenValidation(_) => StatusCode::UNAUTHORIZED,
            CodiumServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CodiumServerError::NetworkError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CodiumServerError::CodiumError(err) => match err {
                CodiumError::Validation(_) | CodiumError::BadUsage(_) => StatusCode::BAD_REQUEST,
                CodiumError::NotAuthenticated => StatusCode::UNAUTHORIZED,
                CodiumError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                CodiumError::FileNotFound(_) | CodiumError::RepositoryNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CodiumError::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for CodiumServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    pub resolver: Arc<TreeResolver>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/login", post(login))
        .route("/repo/create", post(create_repository))
        .route("/repo/:id", get(fetch_repository).delete(delete_repository))
        .route("/repo/:id/contents", get(repository_root))
        .route("/repo/:id/contents/*path", get(repository_contents))
        .route("/repo/:id/commit", post(register_commit))
        .route("/repo/:id/commit/:commit_id/file/*path", get(file_content))
        .route("/repo/:id/commit/:commit_id/zip", get(download_zip))
        .route("/repo/:id/upload", post(upload_commit))
        .route("/repo/:id/visibility", patch(toggle_visibility))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the state from `config` and serves the API until ctrl-c.
pub async fn serve(config: ServerConfig) -> Result<(), CodiumServerError> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|_| CodiumError::BadUsage(format!("invalid bind address {}", config.bind)))?;
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .map_err(|err| CodiumError::FsError(CodiumFsError::Os(err)))?;
    let store = match &config.storage_url {
        Some(url) => SnapshotStore::from_url(url)?,
        None => SnapshotStore::local(config.data_dir.join("objects")).await?,
    }
    .with_timeout(Duration::from_secs(config.storage_timeout_secs));
    let repositories = FileRepositoryStore::open(config.data_dir.join("repositories")).await?;
    let state = AppState {
        auth: Arc::new(Authenticator::new(
            config.jwt_secret.clone(),
            Duration::from_secs(config.token_ttl_secs),
            config.users.clone(),
        )),
        resolver: Arc::new(TreeResolver::new(Arc::new(repositories), store)),
    };
    let app = router(state, config.max_upload_bytes);
    tracing::info!("codium api listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn welcome() -> &'static str {
    "Welcome to Codium API!"
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, CodiumServerError> {
    Ok(Json(state.auth.login(&request.username, &request.password)?))
}

async fn create_repository(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(new): Json<NewRepository>,
) -> Result<(StatusCode, Json<CreateRepositoryResponse>), CodiumServerError> {
    let repository = state.resolver.repositories().create(&user, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRepositoryResponse {
            message: "Repository Created Successfully".to_owned(),
            repository_id: repository.id,
        }),
    ))
}

async fn fetch_repository(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Repository>, CodiumServerError> {
    Ok(Json(state.resolver.repository(&id).await?))
}

async fn delete_repository(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CodiumServerError> {
    state.resolver.delete_repository(&id, &user).await?;
    Ok(Json(json!({ "message": "Repository deleted successfully" })))
}

async fn toggle_visibility(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Repository>, CodiumServerError> {
    Ok(Json(state.resolver.toggle_visibility(&id, &user).await?))
}

async fn repository_root(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RepositoryContents>, CodiumServerError> {
    Ok(Json(state.resolver.list_contents(&id, "").await?))
}

async fn repository_contents(
    State(state): State<AppState>,
    Path((id, path)): Path<(String, String)>,
) -> Result<Json<RepositoryContents>, CodiumServerError> {
    Ok(Json(
        state
            .resolver
            .list_contents(&id, path.trim_matches('/'))
            .await?,
    ))
}

async fn register_commit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(record): Json<CommitRecord>,
) -> Result<(StatusCode, Json<CommitRecord>), CodiumServerError> {
    let record = state.resolver.register_commit(&id, &user, record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Raw file content. JSON files are pretty printed for display.
async fn file_content(
    State(state): State<AppState>,
    Path((id, commit_id, path)): Path<(String, String, String)>,
) -> Result<Response, CodiumServerError> {
    let path = path.trim_start_matches('/');
    let data = state
        .resolver
        .get_file_content(&id, &commit_id, path)
        .await?;
    if path.ends_with(".json") {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&data) {
            let pretty = serde_json::to_string_pretty(&value).map_err(CodiumError::from)?;
            return Ok((
                [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
                pretty,
            )
                .into_response());
        }
    }
    let content_type = if std::str::from_utf8(&data).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

async fn download_zip(
    State(state): State<AppState>,
    Path((id, commit_id)): Path<(String, String)>,
) -> Result<Response, CodiumServerError> {
    let (repository, archive) = state.resolver.download_as_zip(&id, &commit_id).await?;
    let disposition = format!("attachment; filename=\"{}.zip\"", repository.name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        StreamBody::new(archive),
    )
        .into_response())
}

async fn upload_commit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CommitRecord>), CodiumServerError> {
    let mut files = Vec::new();
    let mut message = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| CodiumServerError::BadRequest(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "message" => {
                message = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| CodiumServerError::BadRequest(err.to_string()))?,
                );
            }
            "files" | "file" => {
                let path = field
                    .file_name()
                    .map(str::to_owned)
                    .ok_or_else(|| CodiumServerError::BadRequest("file without a name".to_owned()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| CodiumServerError::BadRequest(err.to_string()))?;
                files.push(UploadedFile { path, data });
            }
            _ => {}
        }
    }
    let record = state
        .resolver
        .upload_new_commit(&id, &user, files, message)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}
