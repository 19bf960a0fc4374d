//! HTTP server for live view, camera actions and health checks
//!
//! Frames are served two ways: an MJPEG multipart body that browsers render
//! in an `<img>` tag, and a WebSocket carrying base64 JSON frame messages.

use crate::account::ServiceError;
use crate::capture::Frame;
use crate::relay::{FrameStream, Strategy};
use crate::transport::EndpointReference;
use crate::web::shared::{SharedState, ViewerKind};
use axum::{
    body::{Body, Bytes},
    extract::ws::{close_code, CloseFrame, Message, WebSocket},
    extract::{Path, State, WebSocketUpgrade},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::Engine;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Multipart boundary for the MJPEG stream
const BOUNDARY: &str = "frame";

/// Error returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    NotFound(String),
    BadReference(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Service(e) => {
                let status = match e {
                    ServiceError::NotAuthenticated | ServiceError::Unavailable(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    ServiceError::CameraNotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadReference(message) => (StatusCode::BAD_GATEWAY, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the application router
pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/cameras", get(cameras_handler))
        .route(
            "/api/cameras/{id}/snapshot",
            get(snapshot_handler).post(request_snapshot_handler),
        )
        .route("/api/cameras/{id}/record", post(record_handler))
        .route("/api/cameras/{id}/latest-clip", get(latest_clip_handler))
        .route("/api/cameras/{id}/liveview", get(liveview_handler))
        .route("/api/cameras/{id}/stream", get(mjpeg_handler))
        .route("/ws/stream/{id}", get(ws_handler))
        .with_state(state)
}

/// Run the HTTP server until it fails
pub async fn run_http_server(
    host: &str,
    port: u16,
    state: Arc<SharedState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    Ok(())
}

/// Health check handler
async fn health_handler(State(state): State<Arc<SharedState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.uptime().as_secs_f64(),
        "viewers": state.viewer_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn cameras_handler(State(state): State<Arc<SharedState>>) -> ApiResult<Response> {
    let cameras = state.account.list_cameras().await?;
    Ok(Json(cameras).into_response())
}

async fn snapshot_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let camera = state.account.find_camera(&id).await?;
    match state.account.get_cached_image(&camera).await? {
        Some(image) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], image).into_response()),
        None => Err(ApiError::NotFound(format!("no snapshot for camera {}", id))),
    }
}

async fn request_snapshot_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let camera = state.account.find_camera(&id).await?;
    state.account.request_snapshot(&camera).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "requested" }))).into_response())
}

async fn record_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let camera = state.account.find_camera(&id).await?;
    state.account.request_recording(&camera).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "recording" }))).into_response())
}

async fn latest_clip_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let camera = state.account.find_camera(&id).await?;
    state.account.force_refresh().await?;
    match state.account.get_latest_clip_reference(&camera).await? {
        Some(url) => Ok(Json(json!({ "clip_url": url })).into_response()),
        None => Err(ApiError::NotFound(format!("no clip for camera {}", id))),
    }
}

/// Diagnostic view of the camera's live-view reference
async fn liveview_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let camera = state.account.find_camera(&id).await?;
    let reference = state.account.get_liveview_reference(&camera).await?;
    let endpoint =
        EndpointReference::parse(&reference).map_err(|e| ApiError::BadReference(e.to_string()))?;
    Ok(Json(json!({
        "url": endpoint.url(),
        "scheme": endpoint.scheme.as_str(),
        "host": endpoint.host,
        "port": endpoint.port,
        "is_proprietary": endpoint.is_proprietary(),
    }))
    .into_response())
}

fn multipart_part(frame: &Frame) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        frame.len()
    );
    let mut part = Vec::with_capacity(header.len() + frame.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(&frame.data);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// MJPEG stream as `multipart/x-mixed-replace`
async fn mjpeg_handler(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let camera = state.account.find_camera(&id).await?;
    let viewer = state.open_viewer(camera, ViewerKind::Mjpeg);

    // The viewer guard travels with the body and is dropped when the client
    // goes away or the stream ends.
    let body = futures::stream::unfold(viewer, move |(mut stream, guard)| {
        let id = id.clone();
        async move {
            match stream.next_frame().await {
                Ok(Some(frame)) => Some((Ok::<_, Infallible>(multipart_part(&frame)), (stream, guard))),
                Ok(None) => None,
                Err(e) => {
                    warn!("MJPEG stream for camera {} ended: {}", id, e);
                    None
                }
            }
        }
    });

    let content_type = format!("multipart/x-mixed-replace; boundary={}", BOUNDARY);
    let mut response = Response::new(Body::from_stream(body));
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
    Ok(response)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream_socket(socket, state, id))
}

fn frame_message(frame: &Frame, strategy: Option<Strategy>) -> String {
    json!({
        "type": "frame",
        "frame": frame.sequence,
        "data": base64::engine::general_purpose::STANDARD.encode(&frame.data),
        "strategy": strategy.map(|s| s.as_str()),
    })
    .to_string()
}

/// Push frames for one camera over a WebSocket until either side stops
async fn handle_stream_socket(socket: WebSocket, state: Arc<SharedState>, id: String) {
    let (mut ws_sender, ws_receiver) = socket.split();

    let camera = match state.account.find_camera(&id).await {
        Ok(camera) => camera,
        Err(e) => {
            warn!("Rejecting stream socket for camera {}: {}", id, e);
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let (stream, _guard) = state.open_viewer(camera, ViewerKind::Websocket);
    forward_frames(stream, ws_sender, ws_receiver, &id).await;
}

/// Send every frame of `stream` to `sender`. Client messages are drained on
/// their own task; the loop only stops early once the client closes.
async fn forward_frames<S, R>(mut stream: FrameStream, mut sender: S, receiver: R, id: &str)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Send + Unpin + 'static,
{
    let (closed_tx, mut closed_rx) = oneshot::channel();
    let watcher = tokio::spawn(watch_client(receiver, closed_tx));

    loop {
        tokio::select! {
            _ = &mut closed_rx => {
                debug!("Client left stream for camera {}", id);
                break;
            }
            next = stream.next_frame() => {
                let message = match next {
                    Ok(Some(frame)) => frame_message(&frame, stream.strategy()),
                    Ok(None) => {
                        let _ = sender.send(Message::Text(json!({"type": "end"}).to_string().into())).await;
                        break;
                    }
                    Err(e) => {
                        warn!("Stream for camera {} failed: {}", id, e);
                        let error = json!({"type": "error", "message": e.to_string()});
                        let _ = sender.send(Message::Text(error.to_string().into())).await;
                        break;
                    }
                };
                if sender.send(Message::Text(message.into())).await.is_err() {
                    debug!("Stream socket for camera {} closed while sending", id);
                    break;
                }
            }
        }
    }

    watcher.abort();
    stream.close().await;
    if sender.close().await.is_err() {
        debug!("Stream socket for camera {} already closed", id);
    }
}

/// Read client messages until the client goes away, then signal `closed`
async fn watch_client<R>(mut receiver: R, closed: oneshot::Sender<()>)
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Stream socket error: {}", e);
                break;
            }
        }
    }
    let _ = closed.send(());
}
