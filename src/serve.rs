use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc as StdArc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::{Catalog, CatalogError};
use crate::config::ServerConfig;
use crate::convert::{ConversionPipeline, UploadError, UploadOutcome, UploadRequest};
use crate::decode::Transcoder;
use crate::status::StatusTracker;

const RESTRICTED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Access Restricted</title></head>
<body>
  <h1>Access Restricted</h1>
  <p>The admin panel is only available from the machine running the recorder.</p>
  <p><a href="/">Back to recorder</a></p>
</body>
</html>"#;

// State shared by all handlers
pub struct AppState {
    pub catalog: Catalog,
    pub pipeline: ConversionPipeline,
    pub status: StatusTracker,
    /// Held for the whole of an upload so status updates from two uploads
    /// never interleave. The worker thread owns the guard, not the request.
    pub upload_lock: StdArc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let transcoder = Transcoder::from_config(config.transcode);
        AppState {
            catalog: Catalog::new(config.recordings_dir.clone(), transcoder),
            pipeline: ConversionPipeline::new(config.recordings_dir.clone(), transcoder),
            status: StatusTracker::new(),
            upload_lock: StdArc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Queue one upload behind any in-flight upload and start it on the
/// blocking pool.
///
/// The lock is released when the worker finishes, even if the returned
/// handle is dropped because the client went away.
pub async fn spawn_upload(
    state: StdArc<AppState>,
    request: UploadRequest,
) -> JoinHandle<Result<UploadOutcome, UploadError>> {
    let guard = state.upload_lock.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        state.pipeline.process(&request, &state.status)
    })
}

/// Build the full router. Admin routes only answer loopback peers, which
/// requires serving with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: StdArc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin_routes = Router::new()
        .route("/admin/recordings", get(admin_recordings_handler))
        .route("/api/process-status", get(process_status_handler))
        .route("/delete/{filename}", delete(delete_handler))
        .route("/system-info", get(system_info_handler))
        .route("/debug/audio/{filename}", get(debug_audio_handler))
        .route_layer(middleware::from_fn(localhost_only));

    Router::new()
        .route("/health", get(health_handler))
        .route("/upload", post(upload_handler))
        .route("/recordings", get(list_recordings_handler))
        .route("/recordings/{filename}", get(get_recording_handler))
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Run the recorder server until the process is stopped
pub fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    std::fs::create_dir_all(&config.recordings_dir).map_err(|e| {
        format!(
            "Failed to create recordings directory '{}': {}",
            config.recordings_dir.display(),
            e
        )
    })?;

    let addr = config.listen_addr();
    println!("{}", "=".repeat(60));
    println!("Audio recorder starting");
    println!("Recordings directory: {}", config.recordings_dir.display());
    println!("Listening on: http://{}", addr);
    if config.transcode {
        println!("Transcoding: ENABLED");
    } else {
        println!("Transcoding: DISABLED (uploads stored as received)");
    }
    println!("Quality settings:");
    println!("  high    48kHz, 24-bit, stereo");
    println!("  medium  44.1kHz, 16-bit, stereo");
    println!("  low     22.05kHz, 16-bit, mono");
    println!("Endpoints:");
    println!("  POST   /upload                  - Upload a recording (multipart)");
    println!("  GET    /recordings              - List recordings");
    println!("  GET    /recordings/:filename    - Download a recording");
    println!("Admin endpoints (localhost only):");
    println!("  GET    /admin/recordings        - List recordings");
    println!("  GET    /api/process-status      - Last upload status");
    println!("  DELETE /delete/:filename        - Delete a recording");
    println!("  GET    /system-info             - Disk usage and totals");
    println!("  GET    /debug/audio/:filename   - File diagnostics");
    println!("{}", "=".repeat(60));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let app_state = StdArc::new(AppState::new(&config));
        let app = build_router(app_state, config.max_upload_bytes());

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn is_local_peer(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6 == Ipv6Addr::LOCALHOST || v6.to_ipv4_mapped() == Some(Ipv4Addr::LOCALHOST),
    }
}

/// Refuse admin routes to anything but the local machine
async fn localhost_only(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match peer {
        Some(ip) if is_local_peer(ip) => next.run(request).await,
        _ => {
            warn!("Refused {} from {:?}", request.uri().path(), peer);
            (StatusCode::FORBIDDEN, Html(RESTRICTED_PAGE)).into_response()
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "File not found")
}

// Health check endpoint - returns 200 OK if server is running
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn upload_handler(State(state): State<StdArc<AppState>>, mut multipart: Multipart) -> Response {
    let mut data = None;
    let mut request = UploadRequest::new(Vec::new(), "high");

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed upload: {}", e);
                return error_response(StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio_data" => {
                request.file_name = field.file_name().map(str::to_string);
                request.content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => data = Some(bytes),
                    Err(e) => {
                        warn!("Failed to read audio_data: {}", e);
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            format!("Failed to read audio_data: {}", e),
                        );
                    }
                }
            }
            "quality" | "sample_rate" | "channels" => {
                let value = match field.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        return error_response(StatusCode::BAD_REQUEST, format!("Invalid {}: {}", name, e))
                    }
                };
                match name.as_str() {
                    "quality" => request.quality = value,
                    "sample_rate" => request.sample_rate = value.trim().parse().ok(),
                    _ => request.channels = value.trim().parse().ok(),
                }
            }
            _ => {}
        }
    }

    match data {
        Some(bytes) => request.data = bytes,
        None => return error_response(StatusCode::BAD_REQUEST, "No audio file found"),
    }

    let result = spawn_upload(state, request).await.await;

    match result {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => {
            error!("Upload worker failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Upload failed: {}", e))
        }
    }
}

async fn process_status_handler(State(state): State<StdArc<AppState>>) -> Response {
    let snapshot = state.status.snapshot();
    Json(json!({
        "success": true,
        "process_status": snapshot.process_status,
        "last_errors": snapshot.last_errors,
    }))
    .into_response()
}

async fn list_recordings_handler(State(state): State<StdArc<AppState>>) -> Response {
    list_recordings(state).await
}

async fn admin_recordings_handler(State(state): State<StdArc<AppState>>) -> Response {
    list_recordings(state).await
}

async fn list_recordings(state: StdArc<AppState>) -> Response {
    // Durations may require decoding whole files
    match tokio::task::spawn_blocking(move || state.catalog.list()).await {
        Ok(Ok(recordings)) => Json(recordings).into_response(),
        Ok(Err(e)) => {
            error!("Failed to list recordings: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_recording_handler(
    State(state): State<StdArc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    let path = match state.catalog.resolve(&filename) {
        Some(path) => path,
        None => return not_found(),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "audio/wav".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn delete_handler(
    State(state): State<StdArc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    match state.catalog.delete(&filename) {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Deleted {}", filename),
        }))
        .into_response(),
        Err(CatalogError::NotFound) => not_found(),
        Err(e) => {
            error!("Failed to delete {}: {}", filename, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn system_info_handler(State(state): State<StdArc<AppState>>) -> Response {
    match state.catalog.stats() {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            error!("Failed to gather system info: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn debug_audio_handler(
    State(state): State<StdArc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || state.catalog.debug_info(&filename)).await;
    match result {
        Ok(Ok(info)) => {
            info!("Debug dump for {}: {}", info.filename, info.format_detected);
            Json(info).into_response()
        }
        Ok(Err(CatalogError::NotFound)) => not_found(),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_peers() {
        assert!(is_local_peer("127.0.0.1".parse().unwrap()));
        assert!(is_local_peer("::1".parse().unwrap()));
        assert!(is_local_peer("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_local_peer("192.168.1.20".parse().unwrap()));
        assert!(!is_local_peer("127.0.0.2".parse().unwrap()));
        assert!(!is_local_peer("fe80::1".parse().unwrap()));
    }
}
