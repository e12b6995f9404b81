//! Verification-code retrieval.
//!
//! Playback calls an abstract [`OtpLookup`] when it reaches a recorded
//! checkpoint; the production implementation asks an HTTP mail-search
//! service for the freshest matching code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use keyring::Entry;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SERVICE_NAME: &str = "com.recplay.engine";
const LOOKUP_TOKEN_KEY: &str = "otp_lookup_token";
const LOOKUP_TOKEN_ENV: &str = "OTP_LOOKUP_TOKEN";

/// What the lookup service found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OtpOutcome {
    pub fn found(code: impl Into<String>) -> Self {
        Self {
            success: true,
            otp: Some(code.into()),
            error: None,
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            otp: None,
            error: Some(reason.into()),
        }
    }
}

/// Source of verification codes. The caller bounds the wait with its own
/// timeout; implementations just answer.
#[async_trait]
pub trait OtpLookup: Send + Sync {
    async fn lookup(&self, terms: &[String]) -> Result<OtpOutcome>;
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    terms: &'a [String],
}

/// Asks the configured lookup endpoint to search recent mail for a code
/// matching the terms.
pub struct HttpOtpLookup {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpOtpLookup {
    /// Builds a client for `endpoint`, picking up a bearer token from the
    /// environment or the system keyring when one is stored. A missing
    /// token is fine for unauthenticated local services.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let auth_token = match std::env::var(LOOKUP_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Some(token),
            _ => stored_lookup_token()?,
        };
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            auth_token,
        })
    }

    pub fn with_token(endpoint: impl Into<String>, auth_token: String) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            auth_token: Some(auth_token),
        }
    }
}

#[async_trait]
impl OtpLookup for HttpOtpLookup {
    async fn lookup(&self, terms: &[String]) -> Result<OtpOutcome> {
        debug!(endpoint = %self.endpoint, terms = terms.len(), "requesting code lookup");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&LookupRequest { terms });
        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("code lookup request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("code lookup error ({}): {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse lookup response: {}", e))
    }
}

/// Lookup that always comes up empty. Keeps checkpoint handling on the
/// manual path when no service is configured.
pub struct NullLookup;

#[async_trait]
impl OtpLookup for NullLookup {
    async fn lookup(&self, _terms: &[String]) -> Result<OtpOutcome> {
        Ok(OtpOutcome::not_found("no lookup service configured"))
    }
}

/// Reads the stored lookup token from the system keyring.
pub fn stored_lookup_token() -> Result<Option<String>> {
    let entry = Entry::new(SERVICE_NAME, LOOKUP_TOKEN_KEY)
        .map_err(|e| anyhow!("failed to access keyring: {}", e))?;

    match entry.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!("failed to read lookup token: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_terms_array() {
        let terms = vec!["example.com".to_string(), "Enter the code".to_string()];
        let json = serde_json::to_string(&LookupRequest { terms: &terms }).unwrap();
        assert_eq!(json, r#"{"terms":["example.com","Enter the code"]}"#);
    }

    #[test]
    fn outcome_parses_with_and_without_code() {
        let hit: OtpOutcome = serde_json::from_str(r#"{"success":true,"otp":"482913"}"#).unwrap();
        assert!(hit.success);
        assert_eq!(hit.otp.as_deref(), Some("482913"));

        let miss: OtpOutcome =
            serde_json::from_str(r#"{"success":false,"error":"no recent mail"}"#).unwrap();
        assert!(!miss.success);
        assert_eq!(miss.error.as_deref(), Some("no recent mail"));
    }

    #[tokio::test]
    async fn null_lookup_reports_miss() {
        let outcome = NullLookup.lookup(&[]).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.otp.is_none());
    }
}
