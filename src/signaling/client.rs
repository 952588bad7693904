use super::messages::{rejection_message, ConnectRequest, ConnectResponse, SessionCredentials};
use crate::config::SignalingConfig;
use crate::error::{CallError, Result};
use tracing::{error, info};

/// Obtains room credentials for a call attempt.
///
/// Implementations never retry; the caller decides what a failure means.
#[async_trait::async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn request_session(&self, continuation_id: Option<&str>) -> Result<SessionCredentials>;
}

/// Credential exchange against the upstream HTTP signaling API
pub struct HttpCredentialExchange {
    http: reqwest::Client,
    config: SignalingConfig,
}

impl HttpCredentialExchange {
    pub fn new(config: SignalingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn with_client(http: reqwest::Client, config: SignalingConfig) -> Self {
        Self { http, config }
    }

    fn upstream_credentials(&self) -> Result<(&str, &str)> {
        let api_key = self.config.api_key.as_deref().filter(|k| !k.is_empty());
        let character_id = self.config.character_id.as_deref().filter(|c| !c.is_empty());

        match (api_key, character_id) {
            (Some(key), Some(character)) => Ok((key, character)),
            _ => Err(CallError::Configuration(
                "Missing CONVAI_API_KEY or CONVAI_CHARACTER_ID".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl CredentialExchange for HttpCredentialExchange {
    async fn request_session(&self, continuation_id: Option<&str>) -> Result<SessionCredentials> {
        let (api_key, character_id) = self.upstream_credentials()?;

        let request = ConnectRequest {
            character_id: character_id.to_string(),
            connection_type: self.config.connection_type.clone(),
            character_session_id: continuation_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        };

        info!(
            "Requesting session from {} (resuming={})",
            self.config.endpoint,
            request.character_session_id.is_some()
        );

        let resp = self
            .http
            .post(&self.config.endpoint)
            .header("X-API-Key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(payload) => rejection_message(&payload),
                Err(_) => body.trim().to_string(),
            };
            error!("Signaling backend rejected connection ({}): {}", status, message);
            return Err(CallError::ConnectionRejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ConnectResponse =
            serde_json::from_str(&body).map_err(|e| CallError::ConnectionRejected {
                status: status.as_u16(),
                message: format!("Malformed signaling response: {}", e),
            })?;

        let credentials = SessionCredentials::from(parsed);
        info!("Got room: {}", credentials.room_name);

        Ok(credentials)
    }
}
