//! OAuth2 client-credentials token lifecycle for the transit API
//!
//! One token at a time, held in memory only. The token is renewed strictly
//! before the server-side expiry so a data call built with it cannot be
//! rejected mid-flight.

use crate::error::AuthError;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Seconds shaved off the server-reported lifetime when computing the local
/// renew-by deadline.
const RENEWAL_SKEW_SECS: u64 = 30;

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 300;

/// Ceiling on the accepted server-reported lifetime.
const MAX_EXPIRES_IN_SECS: u64 = 86_400;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// A bearer token plus its renew-by deadline. Never persisted.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Acquires and renews the bearer token via client-credentials exchange.
///
/// Shares the process-wide HTTP client so the affinity cookie set by the
/// auth endpoint rides along on subsequent data calls.
pub struct TokenManager {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    token: Option<AccessToken>,
    metrics: Arc<Metrics>,
    #[cfg(test)]
    mock_token: Option<String>,
    #[cfg(test)]
    exchange_count: u64,
}

impl TokenManager {
    pub fn new(client: reqwest::Client, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            auth_url: config.auth_url().to_string(),
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
            token: None,
            metrics,
            #[cfg(test)]
            mock_token: None,
            #[cfg(test)]
            exchange_count: 0,
        }
    }

    /// Return the held token, exchanging credentials for a fresh one first if
    /// none is held or the renew-by deadline has passed. At most one exchange
    /// per call; no internal retry.
    pub async fn ensure_valid_token(&mut self) -> Result<AccessToken, AuthError> {
        let now = Instant::now();
        if let Some(ref token) = self.token {
            if !token.is_expired(now) {
                return Ok(token.clone());
            }
        }
        self.exchange(now).await
    }

    async fn exchange(&mut self, now: Instant) -> Result<AccessToken, AuthError> {
        #[cfg(test)]
        if let Some(ref value) = self.mock_token {
            self.exchange_count += 1;
            let token = AccessToken {
                value: value.clone(),
                expires_at: Self::compute_expiry(now, DEFAULT_EXPIRES_IN_SECS),
            };
            self.token = Some(token.clone());
            return Ok(token);
        }

        let start = Instant::now();
        let response = self
            .client
            .post(&self.auth_url)
            .header("Accept", "application/json")
            .header("Authorization", self.basic_auth_header())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status));
        }

        let body = response.text().await?;
        let (value, expires_in) = parse_token_response(&body)?;
        let latency_us = start.elapsed().as_micros() as u64;

        let token = AccessToken { value, expires_at: Self::compute_expiry(now, expires_in) };
        self.token = Some(token.clone());
        self.metrics.record_token_renewal();
        info!(expires_in = %expires_in, latency_us = %latency_us, "token_renewed");
        Ok(token)
    }

    fn compute_expiry(now: Instant, expires_in_secs: u64) -> Instant {
        // A nonsense lifetime is capped so the deadline arithmetic cannot overflow
        let secs = expires_in_secs.min(MAX_EXPIRES_IN_SECS).saturating_sub(RENEWAL_SKEW_SECS);
        now + Duration::from_secs(secs)
    }

    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        let encoded = STANDARD.encode(credentials.as_bytes());
        format!("Basic {}", encoded)
    }

    /// Route exchanges to a canned token instead of the network
    #[cfg(test)]
    pub(crate) fn set_mock_token(&mut self, value: &str) {
        self.mock_token = Some(value.to_string());
    }

    #[cfg(test)]
    pub(crate) fn exchange_count(&self) -> u64 {
        self.exchange_count
    }

    /// Age the held token past its deadline
    #[cfg(test)]
    pub(crate) fn force_expire(&mut self) {
        if let Some(token) = self.token.as_mut() {
            token.expires_at = Instant::now() - Duration::from_secs(1);
        }
    }
}

fn parse_token_response(body: &str) -> Result<(String, u64), AuthError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    if response.access_token.is_empty() {
        return Err(AuthError::MalformedResponse("empty access_token".to_string()));
    }
    Ok((response.access_token, response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> TokenManager {
        let config = Config::default().with_credentials("client-id", "client-secret");
        let mut manager =
            TokenManager::new(reqwest::Client::new(), &config, Arc::new(Metrics::new()));
        manager.set_mock_token("tok-1");
        manager
    }

    #[tokio::test]
    async fn test_first_call_exchanges_once() {
        let mut manager = test_manager();
        let token = manager.ensure_valid_token().await.unwrap();
        assert_eq!(token.value(), "tok-1");
        assert_eq!(manager.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_valid_token_is_reused_without_exchange() {
        let mut manager = test_manager();
        manager.ensure_valid_token().await.unwrap();
        manager.ensure_valid_token().await.unwrap();
        manager.ensure_valid_token().await.unwrap();
        assert_eq!(manager.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_exactly_one_exchange() {
        let mut manager = test_manager();
        manager.ensure_valid_token().await.unwrap();
        manager.force_expire();
        manager.ensure_valid_token().await.unwrap();
        assert_eq!(manager.exchange_count(), 2);
    }

    #[test]
    fn test_expiry_applies_renewal_skew() {
        let now = Instant::now();
        let expiry = TokenManager::compute_expiry(now, 300);
        assert_eq!(expiry - now, Duration::from_secs(270));
    }

    #[test]
    fn test_expiry_saturates_on_tiny_lifetime() {
        let now = Instant::now();
        // A lifetime shorter than the skew renews on every call rather than
        // panicking or going negative
        let expiry = TokenManager::compute_expiry(now, 10);
        assert_eq!(expiry, now);
    }

    #[test]
    fn test_expiry_caps_nonsense_lifetime() {
        let now = Instant::now();
        let expiry = TokenManager::compute_expiry(now, u64::MAX);
        assert!(expiry <= now + Duration::from_secs(MAX_EXPIRES_IN_SECS));
    }

    #[test]
    fn test_parse_token_response_defaults_expires_in() {
        let (value, expires_in) = parse_token_response(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(value, "abc");
        assert_eq!(expires_in, 300);
    }

    #[test]
    fn test_parse_token_response_with_expires_in() {
        let (_, expires_in) =
            parse_token_response(r#"{"access_token": "abc", "expires_in": 3600}"#).unwrap();
        assert_eq!(expires_in, 3600);
    }

    #[test]
    fn test_parse_token_response_rejects_missing_token() {
        let err = parse_token_response(r#"{"expires_in": 300}"#).unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));

        let err = parse_token_response("not json").unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[test]
    fn test_basic_auth_header_encoding() {
        let config = Config::default().with_credentials("user", "pass");
        let manager = TokenManager::new(reqwest::Client::new(), &config, Arc::new(Metrics::new()));
        // base64("user:pass")
        assert_eq!(manager.basic_auth_header(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_access_token_expiry_check() {
        let now = Instant::now();
        let token =
            AccessToken { value: "t".to_string(), expires_at: now + Duration::from_secs(60) };
        assert!(!token.is_expired(now));
        assert!(!token.is_expired(now + Duration::from_secs(59)));
        assert!(token.is_expired(now + Duration::from_secs(60)));
        assert!(token.is_expired(now + Duration::from_secs(120)));
    }
}
