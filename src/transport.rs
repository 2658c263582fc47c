use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, CONTENT_ENCODING,
    HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use tracing::{debug, error, warn};

use crate::config::RequestPolicy;
use crate::error::HarvestError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SNIFF_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Content(String),
    /// The resource does not exist (404), or its payload could not be decoded.
    NotFound,
}

pub trait Transport {
    fn fetch(&self, url: &str) -> Result<Fetched, HarvestError>;
}

/// Outcome of a single HTTP exchange, before decoding.
#[derive(Debug)]
pub enum RawResponse {
    NotFound,
    Body {
        bytes: Vec<u8>,
        content_encoding: Option<String>,
    },
}

pub struct HttpTransport {
    client: Client,
    policy: RequestPolicy,
}

impl HttpTransport {
    pub fn new(policy: RequestPolicy) -> Result<Self, HarvestError> {
        Self::with_builder(policy, Client::builder())
    }

    fn with_builder(policy: RequestPolicy, builder: ClientBuilder) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let client = builder
            .default_headers(headers)
            .timeout(policy.timeout)
            .build()
            .map_err(|err| HarvestError::ClientSetup(err.to_string()))?;

        Ok(Self { client, policy })
    }

    fn request_once(&self, url: &str) -> Result<RawResponse, HarvestError> {
        debug!(url, "sending request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| HarvestError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "response received");
        if status == StatusCode::NOT_FOUND {
            return Ok(RawResponse::NotFound);
        }
        if !status.is_success() {
            return Err(HarvestError::TransportStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        let bytes = response
            .bytes()
            .map_err(|err| HarvestError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?
            .to_vec();

        Ok(RawResponse::Body {
            bytes,
            content_encoding,
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Fetched, HarvestError> {
        let outcome = send_with_retries(self.policy.retry_attempts, self.policy.retry_delay, |_| {
            self.request_once(url)
        });
        thread::sleep(self.policy.request_delay);

        match outcome? {
            RawResponse::NotFound => {
                debug!(url, "received 404, no data available");
                Ok(Fetched::NotFound)
            }
            RawResponse::Body {
                bytes,
                content_encoding,
            } => match decode_body(&bytes, content_encoding.as_deref()) {
                Some(text) => {
                    debug!(url, length = text.len(), "response decoded");
                    Ok(Fetched::Content(text))
                }
                None => Ok(Fetched::NotFound),
            },
        }
    }
}

/// Runs `attempt` until it succeeds, retrying transport failures up to
/// `retries` extra times with a fixed `delay` before each retry. Other
/// errors are returned immediately.
pub fn send_with_retries<T, F>(retries: usize, delay: Duration, mut attempt: F) -> Result<T, HarvestError>
where
    F: FnMut(usize) -> Result<T, HarvestError>,
{
    let mut tries = 0usize;
    loop {
        match attempt(tries) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport() && tries < retries => {
                tries += 1;
                warn!(attempt = tries, retries, error = %err, "retrying request");
                thread::sleep(delay);
            }
            Err(err) => {
                error!(error = %err, "request failed");
                return Err(err);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Brotli,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    const FALLBACK_ORDER: [ContentEncoding; 3] = [
        ContentEncoding::Brotli,
        ContentEncoding::Gzip,
        ContentEncoding::Deflate,
    ];

    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.to_ascii_lowercase();
        if value.contains("br") {
            Some(ContentEncoding::Brotli)
        } else if value.contains("gzip") {
            Some(ContentEncoding::Gzip)
        } else if value.contains("deflate") {
            Some(ContentEncoding::Deflate)
        } else {
            None
        }
    }

    /// The encoding named by the header first, then every other one.
    pub fn attempt_order(header: Option<&str>) -> Vec<ContentEncoding> {
        let named = header.and_then(ContentEncoding::from_header);
        let mut order: Vec<_> = named.into_iter().collect();
        order.extend(
            Self::FALLBACK_ORDER
                .into_iter()
                .filter(|encoding| Some(*encoding) != named),
        );
        order
    }

    fn decompress(&self, bytes: &[u8]) -> std::io::Result<String> {
        let mut text = String::new();
        match self {
            ContentEncoding::Brotli => {
                brotli::Decompressor::new(bytes, 4096).read_to_string(&mut text)?;
            }
            ContentEncoding::Gzip => {
                flate2::read::GzDecoder::new(bytes).read_to_string(&mut text)?;
            }
            ContentEncoding::Deflate => {
                flate2::read::ZlibDecoder::new(bytes).read_to_string(&mut text)?;
            }
        }
        Ok(text)
    }
}

/// More than half of the leading characters fall outside printable ASCII.
pub fn looks_binary(text: &str) -> bool {
    let non_printable = text
        .chars()
        .take(SNIFF_CHARS)
        .filter(|ch| !(' '..='~').contains(ch))
        .count();
    non_printable > SNIFF_CHARS / 2
}

/// Turns a response body into text. A declared encoding is decoded first;
/// bodies that still look like compressed data are then tried against every
/// algorithm. `None` when nothing works.
pub fn decode_body(bytes: &[u8], content_encoding: Option<&str>) -> Option<String> {
    if let Some(declared) = content_encoding.and_then(ContentEncoding::from_header) {
        match declared.decompress(bytes) {
            Ok(text) => {
                debug!(encoding = ?declared, "decoded declared content encoding");
                return Some(text);
            }
            // The client may already have decoded it.
            Err(err) => debug!(encoding = ?declared, error = %err, "declared encoding did not apply"),
        }
    }

    let text = String::from_utf8_lossy(bytes);
    if !looks_binary(&text) {
        return Some(text.into_owned());
    }

    warn!("response appears to contain compressed/binary data, trying manual decompression");
    for encoding in ContentEncoding::attempt_order(content_encoding) {
        match encoding.decompress(bytes) {
            Ok(text) => {
                debug!(?encoding, "decompressed response body");
                return Some(text);
            }
            Err(err) => debug!(?encoding, error = %err, "decompression attempt failed"),
        }
    }
    error!("failed to decompress response body");
    None
}
