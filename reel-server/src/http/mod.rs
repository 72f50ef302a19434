//! HTTP endpoints for reel-server.
//!
//! Media delivery (`/claims/...`, `/speech/...`), the transcoded-variant
//! redirect surface (`/api/v4/streams/...`), and the operational endpoints
//! (`/health`, `/metrics`).

pub mod health;
mod metrics;

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query};
use axum::http::header::{
    self, HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_RANGE, CONTENT_TYPE, LAST_MODIFIED, RANGE,
};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Router};
use bytes::Bytes;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::PlayerError;
use crate::mime::{percent_encode_filename, sanitize_filename};
use crate::player::Player;
use crate::range;
use crate::stream::Stream;

/// Query parameter that switches the response to a download.
const PARAM_DOWNLOAD: &str = "download";

/// Buffer size for response body reads.
const BODY_BUF_SIZE: usize = 512 * 1024;

/// Build the HTTP router with all endpoints.
pub fn build_router(player: Arc<Player>) -> Router {
    Router::new()
        .route("/claims/{claim_name}/{claim_id}", get(handle_claim))
        .route("/claims/{claim_name}/{claim_id}/{token}", get(handle_claim_token))
        .route("/speech/{*path}", get(handle_speech))
        .route("/api/v4/streams/free/{claim_name}/{claim_id}", get(handle_v4))
        .route(
            "/api/v4/streams/free/{claim_name}/{claim_id}/{token}",
            get(handle_v4_token),
        )
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(player))
}

async fn handle_claim(
    Extension(player): Extension<Arc<Player>>,
    Path((claim_name, claim_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let uri = format!("{claim_name}#{claim_id}");
    serve(player, uri, None, false, method, headers, &query).await
}

async fn handle_claim_token(
    Extension(player): Extension<Arc<Player>>,
    Path((claim_name, claim_id, token)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let uri = format!("{claim_name}#{claim_id}");
    serve(player, uri, Some(token), false, method, headers, &query).await
}

async fn handle_speech(
    Extension(player): Extension<Arc<Player>>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    // Strip the trailing extension; an empty residue is a 404.
    let uri = match path.rfind('.') {
        Some(idx) => &path[..idx],
        None => path.as_str(),
    };
    if uri.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    serve(player, uri.to_string(), None, false, method, headers, &query).await
}

async fn handle_v4(
    Extension(player): Extension<Arc<Player>>,
    Path((claim_name, claim_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let uri = format!("{claim_name}#{claim_id}");
    serve(player, uri, None, true, method, headers, &query).await
}

async fn handle_v4_token(
    Extension(player): Extension<Arc<Player>>,
    Path((claim_name, claim_id, token)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let uri = format!("{claim_name}#{claim_id}");
    serve(player, uri, Some(token), true, method, headers, &query).await
}

/// Resolve, authorize and serve one stream request.
async fn serve(
    player: Arc<Player>,
    uri: String,
    token: Option<String>,
    check_transcoder: bool,
    method: Method,
    headers: HeaderMap,
    query: &HashMap<String, String>,
) -> Response {
    tracing::info!("{method} stream {uri}");

    match serve_inner(&player, &uri, token, check_transcoder, method, headers, query).await {
        Ok(response) => response,
        Err(e) => {
            player.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
            tracing::error!("{uri} failed: {e}");
            (e.status_code(), e.to_string()).into_response()
        }
    }
}

async fn serve_inner(
    player: &Arc<Player>,
    uri: &str,
    token: Option<String>,
    check_transcoder: bool,
    method: Method,
    headers: HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Response, PlayerError> {
    let mut stream = player.resolve_stream(uri).await?;

    if check_transcoder {
        let sd_hash = stream.claim().sd_hash;
        if let Some(variant) = player.transcoder().variant(uri, &sd_hash).await {
            player
                .metrics()
                .transcoded_redirects
                .fetch_add(1, Ordering::Relaxed);
            return Ok(Redirect::permanent(&variant.playlist_url()).into_response());
        }
        // Not transcoded yet: kick a transcode and carry on over blobs.
        let transcoder = Arc::clone(player.transcoder());
        let uri = uri.to_string();
        tokio::spawn(async move {
            transcoder.request_transcode(&uri, &sd_hash).await;
        });
    }

    player.verify_access(stream.claim(), token.as_deref()).await?;

    stream.prepare().await?;

    let response_headers =
        stream_headers(player.as_ref(), &stream, query.contains_key(PARAM_DOWNLOAD));

    if method == Method::HEAD {
        let mut response = (StatusCode::OK, Body::empty()).into_response();
        response.headers_mut().extend(response_headers);
        return Ok(response);
    }

    player.metrics().streams_served.fetch_add(1, Ordering::Relaxed);

    match headers.get(RANGE) {
        None => {
            let size = stream.size();
            let mut response =
                (StatusCode::OK, stream_body(stream, 0, size)).into_response();
            response.headers_mut().extend(response_headers);
            Ok(response)
        }
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| PlayerError::MalformedRange("not ascii".to_string()))?;
            let spec = range::parse_range_header(raw)?;
            let resolved = range::resolve(spec, stream.size())?;

            let size = stream.size();
            let mut response = (
                StatusCode::PARTIAL_CONTENT,
                stream_body(stream, resolved.start, resolved.len()),
            )
                .into_response();
            let out = response.headers_mut();
            out.extend(response_headers);
            out.insert(
                CONTENT_RANGE,
                header_value(format!(
                    "bytes {}-{}/{size}",
                    resolved.start, resolved.end
                )),
            );
            out.insert(CONTENT_LENGTH, header_value(resolved.len().to_string()));
            Ok(response)
        }
    }
}

/// Headers common to HEAD, full and partial responses.
fn stream_headers(player: &Player, stream: &Stream, download: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, header_value(stream.size().to_string()));
    headers.insert(CONTENT_TYPE, header_value(stream.content_type().to_string()));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    headers.insert(
        LAST_MODIFIED,
        header_value(httpdate::fmt_http_date(stream.timestamp())),
    );
    headers.insert(
        HeaderName::from_static("x-powered-by"),
        header_value(player.name().to_string()),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("X-Powered-By"),
    );

    if download {
        let filename = sanitize_filename(&stream.filename());
        headers.insert(
            CONTENT_DISPOSITION,
            header_value(format!(
                "attachment; filename=\"{filename}\"; filename*=UTF-8''{}",
                percent_encode_filename(&filename)
            )),
        );
    }

    headers
}

/// Build a `HeaderValue`, falling back to empty on invalid bytes.
fn header_value(s: String) -> HeaderValue {
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Stream `len` bytes starting at `start` through a bounded channel.
///
/// The producer task owns the stream; when the client goes away the channel
/// closes, the task stops, and dropping the stream cancels its prefetches.
fn stream_body(mut stream: Stream, start: u64, len: u64) -> Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(2);

    tokio::spawn(async move {
        if start > 0 {
            if let Err(e) = stream.seek(SeekFrom::Start(start)) {
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                return;
            }
        }

        let mut remaining = len;
        let mut buf = vec![0u8; BODY_BUF_SIZE];
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            match stream.read(&mut buf[..want]).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx
                        .send(Ok(Bytes::copy_from_slice(&buf[..n])))
                        .await
                        .is_err()
                    {
                        // Client went away.
                        break;
                    }
                    remaining -= n as u64;
                }
                Err(e) => {
                    let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                    break;
                }
            }
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}
