//! Routing and per-request dispatch.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{path::PathBuf, sync::Arc};
use tower::ServiceExt;
use tower_http::{services::ServeFile, trace::TraceLayer};
use tracing::info;

use crate::archive::build_archive;
use crate::config::App;
use crate::error::{AppError, Result};
use crate::export::export_csv;
use crate::format::{negotiate, Format, FormatQuery};
use crate::gate::{login_page, login_submit, logout, require_auth};
use crate::listing::list_directory;
use crate::presenter::present_error;
use crate::resolver::{resolve, FsInfo};
use crate::session::SessionStore;
use crate::views::Templates;

// --- State ---
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub app: App,
    pub sessions: Arc<dyn SessionStore>,
    pub templates: Arc<dyn Templates>,
}

/// Everything one browse request needs once its path has been resolved.
///
/// `state` carries the app config plus the session store. Access was already
/// checked by [`require_auth`] before the handler ran.
#[derive(Clone)]
pub struct Context {
    pub state: SharedState,
    pub fs_path: PathBuf,
    pub fs_info: FsInfo,
    pub format: Format,
}

pub fn build_router(state: SharedState) -> Router {
    let browse = Router::new()
        .route("/", get(browse_handler))
        .route("/*path", get(browse_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .merge(browse)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The single place where a failed browse request becomes an error page.
async fn browse_handler(State(state): State<SharedState>, request: Request) -> Response {
    let method: Method = request.method().clone();
    let uri: Uri = request.uri().clone();
    match dispatch(&state, request).await {
        Ok(response) => response,
        Err(err) => present_error(state.templates.as_ref(), &err, &method, &uri),
    }
}

async fn dispatch(state: &SharedState, request: Request) -> Result<Response> {
    let hint = match Query::<FormatQuery>::try_from_uri(request.uri()) {
        Ok(Query(query)) => query.format,
        Err(_) => {
            return Err(AppError::UnsupportedFormat(
                request.uri().query().unwrap_or_default().to_string(),
            ))
        }
    };

    let root = state.app.root_path.clone();
    let request_path = request.uri().path().to_string();
    let resolved = tokio::task::spawn_blocking(move || resolve(&root, &request_path)).await??;
    let context = Context {
        state: state.clone(),
        format: negotiate(resolved.info.is_dir, hint.as_deref())?,
        fs_path: resolved.fs_path,
        fs_info: resolved.info,
    };

    match context.format {
        Format::List => serve_listing(context).await,
        Format::Csv => serve_csv(context).await,
        Format::Archive => serve_archive(context).await,
        Format::Raw | Format::ForceDownload => serve_file(context, request).await,
    }
}

async fn serve_listing(context: Context) -> Result<Response> {
    let templates = context.state.templates.clone();
    let view = tokio::task::spawn_blocking(move || {
        list_directory(&context.state.app, &context.fs_path, &context.fs_info)
    })
    .await??;
    let markup = templates.directory_list(&view)?;
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        markup.into_string(),
    )
        .into_response())
}

async fn serve_csv(context: Context) -> Result<Response> {
    let csv = tokio::task::spawn_blocking(move || export_csv(&context.fs_path)).await??;
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/csv; charset=utf-8"),
        )],
        csv,
    )
        .into_response())
}

/// Raw files go through `ServeFile` for conditional and range handling.
async fn serve_file(context: Context, request: Request) -> Result<Response> {
    let response = match ServeFile::new(&context.fs_path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    if context.format == Format::ForceDownload && response.status().is_success() {
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        let filename = context
            .fs_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("download");
        headers.insert(header::CONTENT_DISPOSITION, attachment(filename));
    }
    Ok(response)
}

async fn serve_archive(context: Context) -> Result<Response> {
    let temp_dir = context.state.app.temp_dir.clone();
    let source = context.fs_path;
    let artifact =
        tokio::task::spawn_blocking(move || build_archive(&source, temp_dir.as_deref())).await??;

    info!(
        "Serving archive {} from {} ({} bytes)",
        artifact.file_name(),
        artifact.path().display(),
        artifact.size()
    );
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(artifact.size()));
    headers.insert(header::CONTENT_DISPOSITION, attachment(artifact.file_name()));

    let stream = artifact.into_stream().await?;
    Ok((headers, Body::from_stream(stream)).into_response())
}

fn attachment(filename: &str) -> HeaderValue {
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", escaped))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
