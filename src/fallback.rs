//! Pull-based fallback feed.
//!
//! The backend serves `GET /video_feed/{id}` as `multipart/x-mixed-replace`
//! with one JPEG per part. Browser hosts just point an image element at the
//! URL; native hosts can pull decoded parts through [`MjpegPuller`].

use crate::error::{Result, StreamError};
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BOUNDARY: &str = "frame";

/// Parts larger than this without a delimiter are treated as garbage
const MAX_BUFFERED: usize = 8 * 1024 * 1024;

/// Builds fallback feed URLs below a base URL
#[derive(Debug, Clone)]
pub struct FallbackFeed {
    base: Url,
}

impl FallbackFeed {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| StreamError::Config(format!("invalid fallback base url {base:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StreamError::Config(format!(
                "fallback base url {base} cannot carry a path"
            )));
        }
        Ok(Self { base })
    }

    /// `{base}/video_feed/{id}`, the id percent-encoded as one segment
    pub fn url_for(&self, exercise_id: &str) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("video_feed").push(exercise_id);
        }
        url.to_string()
    }
}

/// One part of the multipart feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// `boundary=` parameter of a multipart content type
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

#[derive(Default)]
struct PartHeaders {
    content_type: Option<String>,
    content_length: Option<usize>,
}

fn parse_headers(block: &[u8]) -> PartHeaders {
    let mut headers = PartHeaders::default();
    for line in String::from_utf8_lossy(block).split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("content-type") {
            headers.content_type = Some(value.to_string());
        } else if name.trim().eq_ignore_ascii_case("content-length") {
            headers.content_length = value.parse().ok();
        }
    }
    headers
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Incremental `multipart/x-mixed-replace` splitter
pub struct MultipartParser {
    delimiter: Vec<u8>,
    body_end: Vec<u8>,
    buf: BytesMut,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let delimiter = format!("--{boundary}").into_bytes();
        let mut body_end = b"\r\n".to_vec();
        body_end.extend_from_slice(&delimiter);
        Self {
            delimiter,
            body_end,
            buf: BytesMut::new(),
        }
    }

    /// Feeds a chunk and returns every part it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        if self.buf.len() > MAX_BUFFERED {
            warn!("fallback feed: dropping {} bytes without a part delimiter", self.buf.len());
            self.buf.clear();
        }
        frames
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let start = find(&self.buf, &self.delimiter)?;
        let header_start = start + self.delimiter.len();
        if self.buf.len() < header_start + 2 {
            return None;
        }
        // closing delimiter
        if &self.buf[header_start..header_start + 2] == b"--" {
            self.buf.clear();
            return None;
        }

        let header_end = header_start + find(&self.buf[header_start..], b"\r\n\r\n")?;
        let headers = parse_headers(&self.buf[header_start..header_end]);
        let body_start = header_end + 4;

        let body_end = match headers.content_length {
            Some(len) if self.buf.len() >= body_start + len => body_start + len,
            Some(_) => return None,
            None => body_start + find(&self.buf[body_start..], &self.body_end)?,
        };

        let data = Bytes::copy_from_slice(&self.buf[body_start..body_end]);
        self.buf.advance(body_end);
        Some(Frame {
            content_type: headers.content_type,
            data,
        })
    }
}

/// Pulls the fallback feed and yields its parts as they arrive
pub struct MjpegPuller {
    client: Client,
}

impl MjpegPuller {
    /// The feed never ends, so only connecting is bounded.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }

    pub async fn frames(&self, url: &str) -> Result<BoxStream<'static, Result<Frame>>> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        debug!("fallback feed {url}: boundary {boundary:?}");

        let body = response.bytes_stream().boxed();
        let state = (body, MultipartParser::new(&boundary), VecDeque::new());

        let frames = stream::unfold(state, |(mut body, mut parser, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (body, parser, pending)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.push(&chunk)),
                    Some(Err(e)) => return Some((Err(StreamError::Http(e)), (body, parser, pending))),
                    None => return None,
                }
            }
        });

        Ok(frames.boxed())
    }
}
