//! Gzip handling for response and request bodies
//!
//! [`Compressor::compress_response`] gzip-encodes a response only when the
//! policy is enabled, the content type is allow-listed and the body size lies
//! within `[min_size, max_size]`. Anything else passes through untouched,
//! byte for byte. Bodies without a known exact size (streams, server-sent
//! events) are never buffered.
//!
//! [`Compressor::decompress_request`] decodes `Content-Encoding: gzip` request
//! bodies. Concatenated gzip members decode in full; a malformed stream or
//! trailing bytes after the last member fail with [`Error::Decompression`]
//! instead of handing corrupt bytes to the handler.
//!
//! Both directions work through the body in fixed-size chunks and check a
//! [`CancellationToken`] between chunks, so abandoned requests stop consuming
//! CPU.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Router};
//! use gigbook_service::compression::{compression_middleware, Compressor};
//!
//! let compressor = Arc::new(Compressor::from_config(&config.compression));
//! let app = Router::new()
//!     .route("/venues", get(list_venues))
//!     .layer(middleware::from_fn_with_state(compressor, compression_middleware));
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::CompressionConfig;
use crate::error::{Error, Result};

/// Bytes processed between cancellation checks
const CHUNK_SIZE: usize = 16 * 1024;

/// First two bytes of every gzip member
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Content types that are never compressed, whatever the allow-list says
const NEVER_COMPRESSED: &[&str] = &["text/event-stream"];

/// When and how bodies are gzip-encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Compress responses at all
    pub enabled: bool,
    /// Smallest body compressed, in bytes
    pub min_size: usize,
    /// Largest body compressed, in bytes
    pub max_size: usize,
    /// gzip level (0-9)
    pub level: u32,
    /// Allow-listed content types; a trailing `*` matches by prefix
    pub content_types: Vec<String>,
    /// Largest decoded request body accepted, in bytes
    pub max_decompressed_size: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self::from(&CompressionConfig::default())
    }
}

impl From<&CompressionConfig> for CompressionPolicy {
    fn from(config: &CompressionConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_size: config.min_size,
            max_size: config.max_size,
            level: config.level.min(9),
            content_types: config
                .content_types
                .iter()
                .map(|ct| ct.trim().to_ascii_lowercase())
                .collect(),
            max_decompressed_size: config.max_decompressed_size,
        }
    }
}

impl CompressionPolicy {
    /// Whether a `Content-Type` value is on the allow-list
    ///
    /// Parameters such as `; charset=utf-8` are ignored. Streaming types
    /// such as `text/event-stream` never match.
    pub fn matches_content_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if NEVER_COMPRESSED.contains(&essence.as_str()) {
            return false;
        }

        self.content_types.iter().any(|allowed| match allowed.strip_suffix('*') {
            Some(prefix) => essence.starts_with(prefix),
            None => essence == *allowed,
        })
    }

    /// Whether a body of this many bytes is worth compressing
    pub fn size_in_range(&self, len: usize) -> bool {
        len >= self.min_size && len <= self.max_size
    }
}

/// Applies a [`CompressionPolicy`] to responses and requests
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    policy: CompressionPolicy,
}

impl Compressor {
    /// Create a compressor for a policy
    pub fn new(policy: CompressionPolicy) -> Self {
        Self { policy }
    }

    /// Build from configuration
    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(CompressionPolicy::from(config))
    }

    /// The policy in effect
    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    /// gzip-encode a response body if the policy allows it
    ///
    /// The body is buffered only when the content type qualifies, the
    /// declared `Content-Length` (if any) is within range and the body
    /// reports an exact size within range. Streamed bodies pass through.
    pub async fn compress_response(
        &self,
        response: Response,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if !self.policy.enabled || response.headers().contains_key(header::CONTENT_ENCODING) {
            return Ok(response);
        }

        let compressible_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| self.policy.matches_content_type(ct));
        if !compressible_type {
            return Ok(response);
        }

        if let Some(declared) = content_length(response.headers()) {
            if !self.policy.size_in_range(declared) {
                return Ok(response);
            }
        }

        let exact_size = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok());
        match exact_size {
            Some(len) if self.policy.size_in_range(len) => {}
            _ => return Ok(response),
        }

        let (mut parts, body) = response.into_parts();
        let bytes = to_bytes(body, self.policy.max_size)
            .await
            .map_err(|e| Error::Internal(format!("Failed to buffer response body: {}", e)))?;

        if !self.policy.size_in_range(bytes.len()) {
            return Ok(Response::from_parts(parts, Body::from(bytes)));
        }

        let encoded = self.gzip(&bytes, cancel).await?;
        tracing::debug!(
            original = bytes.len(),
            compressed = encoded.len(),
            "Compressed response body"
        );

        let headers = &mut parts.headers;
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(encoded.len()));
        if !varies_on_encoding(headers) {
            headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }

        Ok(Response::from_parts(parts, Body::from(encoded)))
    }

    /// Decode a `Content-Encoding: gzip` request body
    ///
    /// Requests without that header are returned unchanged. The decoding
    /// header is removed and `Content-Length` updated on success.
    pub async fn decompress_request(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Request> {
        if !is_gzip_encoded(request.headers()) {
            return Ok(request);
        }

        let (mut parts, body) = request.into_parts();
        let bytes = read_limited(body, self.policy.max_decompressed_size).await?;

        let decoded = self.gunzip(&bytes, cancel).await?;

        parts.headers.remove(header::CONTENT_ENCODING);
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(decoded.len()));

        Ok(Request::from_parts(parts, Body::from(decoded)))
    }

    /// gzip-encode bytes at the policy's level
    pub async fn gzip(&self, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(self.policy.level),
        );

        for chunk in data.chunks(CHUNK_SIZE) {
            checkpoint(cancel).await?;
            encoder
                .write_all(chunk)
                .map_err(|e| Error::Compression(e.to_string()))?;
        }
        checkpoint(cancel).await?;

        encoder.finish().map_err(|e| Error::Compression(e.to_string()))
    }

    /// Decode a gzip stream, bounded by `max_decompressed_size`
    ///
    /// Every member of a multi-member stream is decoded, and all input must
    /// be consumed.
    pub async fn gunzip(&self, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
        if !data.starts_with(&GZIP_MAGIC) {
            return Err(Error::Decompression("missing gzip header".to_string()));
        }

        let limit = self.policy.max_decompressed_size;
        let mut decoder = MultiGzDecoder::new(data);
        let mut decoded = Vec::with_capacity(data.len().saturating_mul(2).min(limit));
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            checkpoint(cancel).await?;
            let n = decoder
                .read(&mut buf)
                .map_err(|e| Error::Decompression(e.to_string()))?;
            if n == 0 {
                break;
            }
            if decoded.len() + n > limit {
                return Err(Error::PayloadTooLarge(format!(
                    "decompressed body exceeds {} bytes",
                    limit
                )));
            }
            decoded.extend_from_slice(&buf[..n]);
        }

        let trailing = decoder.get_ref().len();
        if trailing > 0 {
            return Err(Error::Decompression(format!(
                "{} trailing bytes after gzip stream",
                trailing
            )));
        }

        Ok(decoded)
    }
}

/// Buffer a request body, failing with [`Error::PayloadTooLarge`] past `limit`
async fn read_limited(body: Body, limit: usize) -> Result<Bytes> {
    let mut stream = body.into_data_stream();
    let mut collected = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::BadRequest(format!("Failed to read request body: {}", e)))?;
        if collected.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                limit
            )));
        }
        collected.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(collected))
}

/// Yield to the scheduler, then stop if the work was cancelled
async fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    tokio::task::yield_now().await;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip")
        })
}

fn varies_on_encoding(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"))
}

/// Whether an `Accept-Encoding` header admits gzip
///
/// An explicit `gzip` entry wins over `*`; a q-value of 0 refuses.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut gzip_q = None;
    let mut wildcard_q = None;

    for entry in headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
    {
        let mut params = entry.split(';');
        let coding = params.next().unwrap_or_default().trim();
        let q = params
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);

        if coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip") {
            gzip_q = Some(q);
        } else if coding == "*" {
            wildcard_q = Some(q);
        }
    }

    gzip_q.or(wildcard_q).is_some_and(|q| q > 0.0)
}

/// Middleware that decodes gzip request bodies and gzip-encodes responses
///
/// Responses are only compressed for clients whose `Accept-Encoding` admits
/// gzip. Coding work is tied to a cancellation token that fires if this
/// future is dropped, and that is a child of any [`CancellationToken`] found
/// in the request extensions (e.g. a server shutdown token).
pub async fn compression_middleware(
    State(compressor): State<Arc<Compressor>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, Error> {
    let cancel = request
        .extensions()
        .get::<CancellationToken>()
        .map(CancellationToken::child_token)
        .unwrap_or_default();
    let guard = cancel.clone().drop_guard();

    let wants_gzip = accepts_gzip(request.headers());

    let request = compressor.decompress_request(request, &cancel).await?;
    let response = next.run(request).await;

    let response = if wants_gzip {
        compressor.compress_response(response, &cancel).await?
    } else {
        response
    };

    guard.disarm();
    Ok(response)
}
