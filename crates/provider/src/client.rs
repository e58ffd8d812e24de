//! Daily bar REST client with rate limiting.
//!
//! Talks to a bars endpoint of the form
//! `GET {base_url}/v1/bars/{symbol}?start=YYYY-MM-DD&end=YYYY-MM-DD`
//! and normalizes whatever column naming the provider uses into
//! [`DailyRecord`]s. Request rate is bounded by a governor quota shared by
//! every task holding the client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use market_sync_core::config::ProviderConfig;
use market_sync_core::{format_canonical_date, parse_canonical_date, DailyRecord, FetchClient, FetchError};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Default request budget per minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Epoch values above this are milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub struct HttpDailyBarClient {
    /// HTTP client
    http: Client,
    /// Base URL for API
    base_url: String,
    /// Optional bearer token
    api_key: Option<String>,
    /// Rate limiter (requests per minute)
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpDailyBarClient {
    /// Creates a client with the default rate limit and timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_limits(base_url, DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom rate limit and request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_limits(
        base_url: impl Into<String>,
        requests_per_minute: u32,
        timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Builds a client from the `provider` configuration section.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, FetchError> {
        let client =
            Self::with_limits(&config.base_url, config.requests_per_minute, config.timeout_secs)?;
        Ok(match &config.api_key {
            Some(key) => client.with_api_key(key),
            None => client,
        })
    }

    /// Sends `Authorization: Bearer {key}` with every request.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches and normalizes bars for `entity` within `[start, end]`.
    ///
    /// # Errors
    /// Maps transport failures and non-success statuses to [`FetchError`].
    pub async fn get_bars(
        &self,
        entity: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, FetchError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v1/bars/{}", self.base_url, urlencoding::encode(entity));
        tracing::debug!("GET {} [{} .. {}]", url, start, end);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("start", format_canonical_date(start)),
                ("end", format_canonical_date(end)),
            ]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, text));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        let parsed: BarsResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("{entity}: {e}")))?;

        let mut records = parsed
            .into_bars()
            .into_iter()
            .map(DailyRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.date);

        Ok(records)
    }
}

#[async_trait]
impl FetchClient for HttpDailyBarClient {
    async fn fetch_full(
        &self,
        entity: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, FetchError> {
        self.get_bars(entity, start, end).await
    }

    async fn fetch_incremental(
        &self,
        entity: &str,
        since: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, FetchError> {
        self.get_bars(entity, since, end).await
    }
}

fn map_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_connect() {
        FetchError::Network(format!("connection failed: {err}"))
    } else {
        FetchError::Network(err.to_string())
    }
}

fn map_status(status: StatusCode, text: String) -> FetchError {
    let message = if text.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {text}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimit(message),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            FetchError::Unavailable(message)
        }
        _ => FetchError::api(status.as_u16(), text),
    }
}

/// Providers either wrap bars in an object or return a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BarsResponse {
    Wrapped {
        #[serde(alias = "data", alias = "results")]
        bars: Vec<WireBar>,
    },
    Bare(Vec<WireBar>),
}

impl BarsResponse {
    fn into_bars(self) -> Vec<WireBar> {
        match self {
            Self::Wrapped { bars } | Self::Bare(bars) => bars,
        }
    }
}

/// Bar as sent by the provider, before normalization.
#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(alias = "Date", alias = "timestamp", alias = "datetime", alias = "t")]
    date: serde_json::Value,
    #[serde(alias = "Open", alias = "o")]
    open: Decimal,
    #[serde(alias = "High", alias = "h")]
    high: Decimal,
    #[serde(alias = "Low", alias = "l")]
    low: Decimal,
    #[serde(alias = "Close", alias = "c")]
    close: Decimal,
    #[serde(alias = "Volume", alias = "v", default)]
    volume: Decimal,
}

impl TryFrom<WireBar> for DailyRecord {
    type Error = FetchError;

    fn try_from(bar: WireBar) -> Result<Self, Self::Error> {
        let date = match &bar.date {
            serde_json::Value::String(raw) => parse_canonical_date(raw),
            serde_json::Value::Number(n) => n.as_i64().and_then(|epoch| {
                let secs = if epoch > EPOCH_MILLIS_THRESHOLD {
                    epoch / 1000
                } else {
                    epoch
                };
                DateTime::from_timestamp(secs, 0).map(|ts| ts.date_naive())
            }),
            _ => None,
        }
        .ok_or_else(|| FetchError::Malformed(format!("invalid bar date: {}", bar.date)))?;

        Ok(DailyRecord::new(
            date, bar.open, bar.high, bar.low, bar.close, bar.volume,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = HttpDailyBarClient::new("http://localhost:8900/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8900");
    }

    #[test]
    fn test_from_config() {
        let config = ProviderConfig {
            base_url: "http://example.test".to_string(),
            api_key: Some("secret".to_string()),
            requests_per_minute: 0,
            timeout_secs: 5,
        };
        let client = HttpDailyBarClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://example.test");
        assert_eq!(client.api_key.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_get_bars_wrapped_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/bars/AAA"))
            .and(query_param("start", "2024-01-11"))
            .and(query_param("end", "2024-01-12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bars": [
                    {"date": "2024-01-12", "open": 11, "high": 12, "low": 10, "close": 11.5, "volume": 900},
                    {"date": "2024-01-11", "open": "10", "high": "11", "low": "9", "close": "10.5", "volume": "1000"}
                ]
            })))
            .mount(&mock_server)
            .await;

        let client = HttpDailyBarClient::new(mock_server.uri()).unwrap();
        let records = client
            .fetch_incremental("AAA", day(2024, 1, 11), day(2024, 1, 12))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, day(2024, 1, 11));
        assert_eq!(records[0].close, dec!(10.5));
        assert_eq!(records[1].close, dec!(11.5));
    }

    #[tokio::test]
    async fn test_get_bars_bare_array_with_aliases() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/bars/BTC-USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"t": 1704844800, "o": 1, "h": 2, "l": 0.5, "c": 1.5, "v": 10},
                {"Date": "2024-01-11T00:00:00Z", "Open": 1.5, "High": 2, "Low": 1, "Close": 1.8}
            ])))
            .mount(&mock_server)
            .await;

        let client = HttpDailyBarClient::new(mock_server.uri()).unwrap();
        let records = client
            .fetch_full("BTC-USD", day(2024, 1, 1), day(2024, 1, 11))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, day(2024, 1, 10));
        assert_eq!(records[1].date, day(2024, 1, 11));
        assert_eq!(records[1].volume, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_empty_response_is_not_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/bars/AAA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"bars": []})))
            .mount(&mock_server)
            .await;

        let client = HttpDailyBarClient::new(mock_server.uri()).unwrap();
        let records = client
            .get_bars("AAA", day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap();

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_api_key_sent_as_bearer() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/bars/AAA"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpDailyBarClient::new(mock_server.uri())
            .unwrap()
            .with_api_key("secret");
        client
            .get_bars("AAA", day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let cases = [
            (401, "unauthorized"),
            (429, "rate limit"),
            (503, "unavailable"),
            (404, "API error"),
        ];

        for (status, expected) in cases {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&mock_server)
                .await;

            let client = HttpDailyBarClient::new(mock_server.uri()).unwrap();
            let err = client
                .get_bars("AAA", day(2024, 1, 1), day(2024, 1, 2))
                .await
                .unwrap_err();

            assert!(
                err.to_string().to_lowercase().contains(&expected.to_lowercase()),
                "status {status} produced {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = HttpDailyBarClient::new(mock_server.uri()).unwrap();
        let err = client
            .get_bars("AAA", day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn test_wire_bar_rejects_bad_date() {
        let bar: WireBar = serde_json::from_value(serde_json::json!({
            "date": "soon", "open": 1, "high": 1, "low": 1, "close": 1
        }))
        .unwrap();
        assert!(matches!(DailyRecord::try_from(bar), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_wire_bar_epoch_millis() {
        let bar: WireBar = serde_json::from_value(serde_json::json!({
            "t": 1_704_844_800_000_i64, "open": 1, "high": 1, "low": 1, "close": 1
        }))
        .unwrap();
        assert_eq!(DailyRecord::try_from(bar).unwrap().date, day(2024, 1, 10));
    }
}
