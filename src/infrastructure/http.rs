use chrono::{DateTime, SecondsFormat};
use gloo_net::http::Request;

use crate::domain::chart::Gap;
use crate::domain::errors::{AppError, AppResult};
use crate::domain::logging::LogComponent;
use crate::domain::market_data::{InstrumentId, TimeInterval, Timestamp};
use crate::log_debug;

/// Status and raw body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// GET transport used by the backfill fetcher.
///
/// Non-2xx statuses are returned as responses; `Err` is reserved for
/// requests that never completed.
#[allow(async_fn_in_trait)]
pub trait OhlcvTransport {
    async fn get(&self, url: &str) -> AppResult<HttpResponse>;
}

/// Browser transport over `fetch`
#[derive(Clone, Debug, Default)]
pub struct GlooHttpClient;

impl GlooHttpClient {
    pub fn new() -> Self {
        Self
    }
}

impl OhlcvTransport for GlooHttpClient {
    async fn get(&self, url: &str) -> AppResult<HttpResponse> {
        log_debug!(LogComponent::Infrastructure("HTTP"), "GET {}", url);

        let response = Request::get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::Network(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("failed to read body from {}: {}", url, e)))?;

        log_debug!(LogComponent::Infrastructure("HTTP"), "{} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

/// Parameters of one OHLCV range request
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvQuery<'a> {
    pub instrument: &'a InstrumentId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub interval: TimeInterval,
    pub exchange: &'a str,
}

impl<'a> OhlcvQuery<'a> {
    pub fn for_gap(gap: &Gap, instrument: &'a InstrumentId, interval: TimeInterval, exchange: &'a str) -> Self {
        Self { instrument, start: gap.start, end: gap.end, interval, exchange }
    }

    pub fn url(&self, base_url: &str) -> AppResult<String> {
        let path = format!(
            "{}/api/companies/{}/ohlcv",
            base_url.trim_end_matches('/'),
            HttpUtils::url_encode(self.instrument.value())
        );
        let params = [
            ("startDate", HttpUtils::iso8601(self.start)?),
            ("endDate", HttpUtils::iso8601(self.end)?),
            ("interval", self.interval.wire().to_string()),
            ("exchange", self.exchange.to_string()),
        ];
        Ok(HttpUtils::build_url_with_params(&path, &params))
    }
}

pub struct HttpUtils;

impl HttpUtils {
    /// Query parameters are encoded and kept in the given order.
    pub fn build_url_with_params(base_url: &str, params: &[(&str, String)]) -> String {
        if params.is_empty() {
            return base_url.to_string();
        }

        let query_string: String = params
            .iter()
            .map(|(key, value)| format!("{}={}", Self::url_encode(key), Self::url_encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", base_url, query_string)
    }

    /// Percent-encodes everything outside the RFC 3986 unreserved set
    pub fn url_encode(input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        for byte in input.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{:02X}", byte)),
            }
        }
        out
    }

    /// UTC, millisecond precision, `Z` suffix
    pub fn iso8601(ts: Timestamp) -> AppResult<String> {
        DateTime::from_timestamp(ts.value(), 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .ok_or_else(|| AppError::Validation(format!("timestamp {} out of range", ts)))
    }
}
