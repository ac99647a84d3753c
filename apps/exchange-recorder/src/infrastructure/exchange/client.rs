//! Signed HTTP client for the exchange REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use super::signing::sign_request;
use crate::application::ports::{ExchangePort, RawResponse, SourceError, SourceRequest};
use crate::infrastructure::config::{Credentials, ExchangeSettings};

/// FTX REST client. Performs exactly one HTTP request per call.
#[derive(Debug, Clone)]
pub struct FtxRestClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl FtxRestClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] if the HTTP client cannot be built.
    pub fn new(settings: &ExchangeSettings, credentials: Credentials) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(settings.call_timeout)
            .build()
            .map_err(|e| SourceError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: settings.rest_url.trim_end_matches('/').to_string(),
            credentials,
            timeout: settings.call_timeout,
        })
    }

    /// REST base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Signed GET returning the full response envelope.
    async fn get(&self, path: &str) -> Result<RawResponse, SourceError> {
        let url = Url::parse(&format!("{}{path}", self.base_url)).map_err(|e| {
            SourceError::Network {
                message: format!("invalid request URL: {e}"),
            }
        })?;
        let signed_path = url
            .query()
            .map_or_else(|| url.path().to_string(), |q| format!("{}?{q}", url.path()));

        let timestamp = Utc::now().timestamp_millis();
        let signature = sign_request(
            self.credentials.api_secret(),
            timestamp,
            "GET",
            &signed_path,
            "",
        )
        .map_err(|e| SourceError::AuthenticationFailed {
            message: e.to_string(),
        })?;

        let mut request = self
            .client
            .get(url)
            .header("FTX-KEY", self.credentials.api_key())
            .header("FTX-TS", timestamp.to_string())
            .header("FTX-SIGN", signature);
        if let Some(subaccount) = self.credentials.subaccount() {
            request = request.header("FTX-SUBACCOUNT", subaccount);
        }

        let response = request.send().await.map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(&e))?;

        tracing::trace!(path = %signed_path, status = status.as_u16(), "Exchange response");
        decode_envelope(status, &body)
    }

    fn transport_error(&self, error: &reqwest::Error) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Network {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl ExchangePort for FtxRestClient {
    async fn fetch(&self, request: SourceRequest) -> Result<RawResponse, SourceError> {
        self.get(&request_path(request)).await
    }

    async fn load_markets(&self) -> Result<Vec<String>, SourceError> {
        let response = self.get("/markets").await?;
        let markets = response
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Decode {
                message: "markets response has no result array".to_string(),
            })?;

        Ok(markets
            .iter()
            .filter(|m| m.get("enabled").and_then(Value::as_bool) != Some(false))
            .filter_map(|m| m.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

/// Path and query for a data-source call.
fn request_path(request: SourceRequest) -> String {
    match request {
        SourceRequest::Account => "/account".to_string(),
        SourceRequest::Balances => "/wallet/balances".to_string(),
        SourceRequest::OrderHistory { since } => {
            format!("/orders/history?start_time={}", since.timestamp())
        }
        SourceRequest::Fills { since } => format!("/fills?start_time={}", since.timestamp()),
    }
}

/// Error category for an HTTP status.
enum ErrorCategory {
    RateLimited,
    Unauthorized,
    Failed,
    Success,
}

const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        401 | 403 => ErrorCategory::Unauthorized,
        200..=299 => ErrorCategory::Success,
        _ => ErrorCategory::Failed,
    }
}

/// Check the HTTP status and the `{success, result, error}` envelope.
fn decode_envelope(status: StatusCode, body: &str) -> Result<RawResponse, SourceError> {
    let parsed = serde_json::from_str::<Value>(body);
    let api_message = parsed
        .as_ref()
        .ok()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string);

    match categorize_status(status) {
        ErrorCategory::RateLimited => return Err(SourceError::RateLimited),
        ErrorCategory::Unauthorized => {
            return Err(SourceError::AuthenticationFailed {
                message: api_message.unwrap_or_else(|| status.to_string()),
            });
        }
        ErrorCategory::Failed => {
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: api_message.unwrap_or_else(|| body.chars().take(200).collect()),
            });
        }
        ErrorCategory::Success => {}
    }

    let value = parsed.map_err(|e| SourceError::Decode {
        message: e.to_string(),
    })?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(SourceError::Api {
            status: status.as_u16(),
            message: api_message.unwrap_or_else(|| "request unsuccessful".to_string()),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer, subaccount: Option<&str>) -> FtxRestClient {
        let settings = ExchangeSettings {
            rest_url: format!("{}/api", server.uri()),
            call_timeout: Duration::from_millis(500),
            ..ExchangeSettings::default()
        };
        let credentials = Credentials::new(
            "key".to_string(),
            "secret".to_string(),
            subaccount.map(str::to_string),
        );
        FtxRestClient::new(&settings, credentials).unwrap()
    }

    #[test]
    fn request_paths_use_whole_seconds() {
        let since = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(request_path(SourceRequest::Account), "/account");
        assert_eq!(request_path(SourceRequest::Balances), "/wallet/balances");
        assert_eq!(
            request_path(SourceRequest::OrderHistory { since }),
            "/orders/history?start_time=1609459200"
        );
        assert_eq!(
            request_path(SourceRequest::Fills { since }),
            "/fills?start_time=1609459200"
        );
    }

    #[tokio::test]
    async fn fetch_sends_signed_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/account"))
            .and(header("FTX-KEY", "key"))
            .and(header("FTX-SUBACCOUNT", "bot"))
            .and(header_exists("FTX-TS"))
            .and(header_exists("FTX-SIGN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"collateral": 1000}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server, Some("bot"))
            .fetch(SourceRequest::Account)
            .await
            .unwrap();

        assert_eq!(response["result"]["collateral"], 1000);
    }

    #[tokio::test]
    async fn fetch_passes_window_as_start_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fills"))
            .and(query_param("start_time", "1609459080"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "result": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let since = Utc.with_ymd_and_hms(2020, 12, 31, 23, 58, 0).unwrap();
        let response = client(&server, None)
            .fetch(SourceRequest::Fills { since })
            .await
            .unwrap();

        assert_eq!(response["result"], json!([]));
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/wallet/balances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "Not logged in"
            })))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .fetch(SourceRequest::Balances)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SourceError::Api {
                status: 200,
                message: "Not logged in".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn http_statuses_are_categorized() {
        let server = MockServer::start().await;
        Mock::given(path("/api/account"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(path("/api/wallet/balances"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "error": "Invalid signature"
            })))
            .mount(&server)
            .await;
        Mock::given(path("/api/fills"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client(&server, None);
        let since = Utc::now();

        assert_eq!(
            client.fetch(SourceRequest::Account).await.unwrap_err(),
            SourceError::RateLimited
        );
        assert_eq!(
            client.fetch(SourceRequest::Balances).await.unwrap_err(),
            SourceError::AuthenticationFailed {
                message: "Invalid signature".to_string(),
            }
        );
        assert_eq!(
            client
                .fetch(SourceRequest::Fills { since })
                .await
                .unwrap_err(),
            SourceError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn non_json_success_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(path("/api/account"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .fetch(SourceRequest::Account)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/api/account"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .fetch(SourceRequest::Account)
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::Timeout(Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn load_markets_skips_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [
                    {"name": "BTC-PERP", "enabled": true},
                    {"name": "OLD-PERP", "enabled": false},
                    {"name": "ETH/USD"}
                ]
            })))
            .mount(&server)
            .await;

        let markets = client(&server, None).load_markets().await.unwrap();
        assert_eq!(markets, ["BTC-PERP", "ETH/USD"]);
    }
}
