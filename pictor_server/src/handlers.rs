use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use blob::{Blob, StreamSource};
use futures::Stream;
use pictor::{PictorError, RequestContext, ServiceOptions};
use pictor_path::{Filter, Params};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::server::AppState;

pub(crate) async fn health_check() -> &'static str {
    "OK"
}

pub(crate) async fn index(State(state): State<Arc<AppState>>) -> Response {
    match &state.app.options().base_path_redirect {
        Some(target) => Redirect::temporary(target).into_response(),
        None => error_response(&PictorError::NotFound, state.app.options()),
    }
}

pub(crate) async fn handle(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let options = state.app.options();
    let path = match strip_prefix(&path, &state.path_prefix) {
        Some(path) => path,
        None => return error_response(&PictorError::NotFound, options),
    };

    if let Some(spec) = path.strip_prefix("params/") {
        if options.disable_params_endpoint {
            return error_response(&PictorError::NotFound, options);
        }
        let params = pictor_path::parse(spec);
        let blob = Blob::from_json(&params);
        let ctx = RequestContext::new(None);
        return blob_response(Arc::new(blob), ctx, StatusCode::OK, None).await;
    }

    let mut params = pictor_path::parse(path);
    let negotiated = negotiate_format(&mut params, &headers, options);
    debug!(path, image = params.image, "serving request");

    let ctx = RequestContext::new(Some(options.request_timeout));
    let result = state.app.serve(&ctx, params).await;
    let vary = negotiated.then_some(header::ACCEPT);

    match result {
        Ok(output) => {
            let cache_control = cache_control_value(options);
            let mut response = blob_response(output, ctx, StatusCode::OK, vary).await;
            if let Ok(value) = cache_control.parse() {
                response.headers_mut().insert(header::CACHE_CONTROL, value);
            }
            response
        },
        Err(PictorError::ProcessorFallback { source, blob }) => {
            // Error-image fallback: serve the partial artifact with the
            // failure's status code.
            let status = StatusCode::from_u16(source.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            blob_response(blob, ctx, status, vary).await
        },
        Err(e) => {
            ctx.complete();
            error_response(&e, options)
        },
    }
}

fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let path = path.trim_start_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    path.strip_prefix(prefix).map(|rest| rest.trim_start_matches('/'))
}

/// Append a format filter when the client negotiates a better output format
/// via Accept. The fingerprint then incorporates the chosen format.
fn negotiate_format(params: &mut Params, headers: &HeaderMap, options: &ServiceOptions) -> bool {
    if !(options.auto_webp || options.auto_avif) || params.has_filter("format") {
        return false;
    }
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if options.auto_avif && accept.contains("image/avif") {
        params.filters.push(Filter::new("format", "avif"));
    } else if options.auto_webp && accept.contains("image/webp") {
        params.filters.push(Filter::new("format", "webp"));
    }
    // Responses vary on Accept whenever negotiation is on, hit or miss.
    true
}

fn cache_control_value(options: &ServiceOptions) -> String {
    if options.cache_header_no_cache {
        return "no-cache, no-store, must-revalidate".to_string();
    }
    let max_age = options.cache_header_ttl.as_secs();
    let swr = options.cache_header_swr.as_secs();
    if swr > 0 && swr < max_age {
        format!("public, max-age={max_age}, stale-while-revalidate={swr}")
    } else {
        format!("public, max-age={max_age}")
    }
}

async fn blob_response(
    blob: Arc<Blob>,
    ctx: RequestContext,
    status: StatusCode,
    vary: Option<header::HeaderName>,
) -> Response {
    let content_type = blob.content_type().await;
    let size = blob.size().await;
    let reader = match blob.new_reader().await {
        Ok((reader, _)) => reader,
        Err(e) => {
            ctx.complete();
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to open artifact: {e}"),
            )
                .into_response();
        },
    };

    let body = Body::from_stream(BodyStream {
        inner: ReaderStream::new(reader),
        ctx: Some(ctx),
    });
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    if let Some(size) = size {
        if let Ok(value) = size.to_string().parse() {
            response.headers_mut().insert(header::CONTENT_LENGTH, value);
        }
    }
    if let Some(vary) = vary {
        if let Ok(value) = vary.as_str().parse() {
            response.headers_mut().insert(header::VARY, value);
        }
    }
    response
}

fn error_response(err: &PictorError, options: &ServiceOptions) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if options.disable_error_body {
        return status.into_response();
    }
    let body = serde_json::json!({
        "message": err.to_string(),
        "status": status.as_u16(),
    });
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

/// Streams the artifact body; the request scope completes (running deferred
/// cleanup) only after the body has been fully written or the client went
/// away.
struct BodyStream {
    inner: ReaderStream<StreamSource>,
    ctx: Option<RequestContext>,
}

impl Stream for BodyStream {
    type Item = std::io::Result<bytes::Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.complete();
        }
    }
}
