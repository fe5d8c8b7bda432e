//! Serving immutable content with conditional and range request support
//!
//! Resources served here have no modification time, so only entity-tag
//! preconditions (`If-Match`, `If-None-Match`, `If-Range`) are evaluated.

use axum::body::Body;
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header, request};
use axum::response::Response;
use bytes::Bytes;

use crate::range::{ByteRange, RangeError, parse_range, total_length};
use crate::reader::{BlobReader, Segment};

/// Write a response for `reader`, honoring the request's preconditions and ranges.
///
/// `headers` holds the response headers prepared by the caller; `ETag` and
/// `Content-Type` are read from it. The reader is moved into the response
/// body, or dropped right away when no body is sent.
///
/// Fails only if a computed header cannot be encoded.
pub fn serve_content(
    request: &request::Parts,
    mut headers: HeaderMap,
    identity: &str,
    size: u64,
    reader: BlobReader,
) -> Result<Response, InvalidHeaderValue> {
    let etag = headers
        .get(header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match check_preconditions(request, etag.as_deref()) {
        Precondition::Proceed => {}
        Precondition::NotModified => {
            tracing::debug!(%identity, "not modified");
            return Ok(not_modified(headers));
        }
        Precondition::Failed => {
            tracing::debug!(%identity, "precondition failed");
            strip_content_headers(&mut headers);
            return Ok(respond(
                StatusCode::PRECONDITION_FAILED,
                headers,
                Body::empty(),
            ));
        }
    }

    let requested = request
        .headers
        .get(header::RANGE)
        .filter(|_| honor_range(request, etag.as_deref()))
        .map(|value| {
            value
                .to_str()
                .map_err(|_| RangeError::Invalid)
                .and_then(|value| parse_range(value, size))
        });

    let mut ranges = match requested {
        None => Vec::new(),
        Some(Ok(ranges)) => ranges,
        Some(Err(error)) => {
            tracing::debug!(%identity, %error, "range not satisfiable");
            return range_not_satisfiable(headers, size, error);
        }
    };

    if total_length(&ranges) > size {
        // Overlapping ranges would cost more than the whole blob.
        ranges.clear();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(crate::descriptor::DEFAULT_MEDIA_TYPE));

    let (status, segments, trailer, length) = match ranges.as_slice() {
        [] => (
            StatusCode::OK,
            vec![Segment::new(0, size)],
            Bytes::new(),
            size,
        ),
        [range] => {
            headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::try_from(range.content_range(size))?,
            );
            (
                StatusCode::PARTIAL_CONTENT,
                vec![Segment::new(range.start, range.length)],
                Bytes::new(),
                range.length,
            )
        }
        ranges => {
            let multipart = Multipart::new(ranges, size, &content_type);
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::try_from(format!(
                    "multipart/byteranges; boundary={}",
                    multipart.boundary
                ))?,
            );
            (
                StatusCode::PARTIAL_CONTENT,
                multipart.segments,
                multipart.trailer,
                multipart.length,
            )
        }
    };

    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }

    if request.method == Method::HEAD {
        return Ok(respond(status, headers, Body::empty()));
    }

    tracing::debug!(%identity, %status, length, "streaming content");
    let body = Body::from_stream(reader.into_stream(segments, trailer));
    Ok(respond(status, headers, body))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

fn check_preconditions(request: &request::Parts, etag: Option<&str>) -> Precondition {
    if let Some(if_match) = header_str(&request.headers, header::IF_MATCH) {
        if !any_etag_matches(if_match, etag, strong_match) {
            return Precondition::Failed;
        }
    }

    if let Some(if_none_match) = header_str(&request.headers, header::IF_NONE_MATCH) {
        if any_etag_matches(if_none_match, etag, weak_match) {
            return if request.method == Method::GET || request.method == Method::HEAD {
                Precondition::NotModified
            } else {
                Precondition::Failed
            };
        }
    }

    Precondition::Proceed
}

/// Whether a `Range` header should be applied, given any `If-Range` validator.
fn honor_range(request: &request::Parts, etag: Option<&str>) -> bool {
    if request.method != Method::GET && request.method != Method::HEAD {
        return false;
    }

    let Some(if_range) = header_str(&request.headers, header::IF_RANGE) else {
        return true;
    };

    // A date validator never matches content without a modification time.
    match scan_etag(if_range) {
        Some((validator, rest)) if rest.is_empty() => {
            etag.is_some_and(|etag| strong_match(validator, etag))
        }
        _ => false,
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn any_etag_matches(list: &str, etag: Option<&str>, matches: fn(&str, &str) -> bool) -> bool {
    let Some(etag) = etag else {
        return false;
    };

    let mut rest = list;
    loop {
        rest = rest.trim_start_matches([' ', '\t', ',']);
        if rest.is_empty() {
            return false;
        }
        if let Some(after) = rest.strip_prefix('*') {
            if after.trim_start().is_empty() || after.trim_start().starts_with(',') {
                return true;
            }
            return false;
        }
        let Some((candidate, after)) = scan_etag(rest) else {
            return false;
        };
        if matches(candidate, etag) {
            return true;
        }
        rest = after;
    }
}

/// Split the leading entity tag (weak or strong) from `s`.
fn scan_etag(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let start = if s.starts_with("W/") { 2 } else { 0 };
    let bytes = s.as_bytes();
    if bytes.get(start) != Some(&b'"') {
        return None;
    }

    for (i, &c) in bytes.iter().enumerate().skip(start + 1) {
        match c {
            b'"' => return Some((&s[..=i], &s[i + 1..])),
            0x21 | 0x23..=0x7E | 0x80..=0xFF => {}
            _ => return None,
        }
    }
    None
}

fn strong_match(a: &str, b: &str) -> bool {
    a == b && !a.is_empty() && a.starts_with('"')
}

fn weak_match(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

/// Framing for a `multipart/byteranges` body.
struct Multipart {
    boundary: String,
    segments: Vec<Segment>,
    trailer: Bytes,
    length: u64,
}

impl Multipart {
    fn new(ranges: &[ByteRange], size: u64, content_type: &HeaderValue) -> Self {
        let boundary = uuid::Uuid::new_v4().simple().to_string();
        let content_type = String::from_utf8_lossy(content_type.as_bytes());

        let mut length = 0;
        let segments = ranges
            .iter()
            .enumerate()
            .map(|(index, range)| {
                let separator = if index == 0 { "" } else { "\r\n" };
                let prefix = format!(
                    "{separator}--{boundary}\r\nContent-Range: {}\r\nContent-Type: {content_type}\r\n\r\n",
                    range.content_range(size)
                );
                length += prefix.len() as u64 + range.length;
                Segment {
                    prefix: Bytes::from(prefix),
                    start: range.start,
                    length: range.length,
                }
            })
            .collect();

        let trailer = Bytes::from(format!("\r\n--{boundary}--\r\n"));
        length += trailer.len() as u64;

        Self {
            boundary,
            segments,
            trailer,
            length,
        }
    }
}

fn strip_content_headers(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);
}

fn not_modified(mut headers: HeaderMap) -> Response {
    strip_content_headers(&mut headers);
    respond(StatusCode::NOT_MODIFIED, headers, Body::empty())
}

fn range_not_satisfiable(
    mut headers: HeaderMap,
    size: u64,
    error: RangeError,
) -> Result<Response, InvalidHeaderValue> {
    strip_content_headers(&mut headers);
    headers.insert(
        header::CONTENT_RANGE,
        HeaderValue::try_from(format!("bytes */{size}"))?,
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(respond(
        StatusCode::RANGE_NOT_SATISFIABLE,
        headers,
        Body::from(error.to_string()),
    ))
}

fn respond(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
