use serde::{Deserialize, Serialize};

/// Request body sent to the signaling backend
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub character_id: String,
    pub connection_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_session_id: Option<String>,
}

/// Successful response from the signaling backend
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub session_id: String,
    #[serde(default)]
    pub character_session_id: Option<String>,
    pub room_url: String,
    pub room_name: String,
    pub token: String,
}

/// Everything needed to join the media room for one call attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub room_address: String,
    pub room_name: String,
    pub access_token: String,
    pub session_id: String,
    /// Token for resuming conversational context on the next call
    pub continuation_id: Option<String>,
}

impl From<ConnectResponse> for SessionCredentials {
    fn from(resp: ConnectResponse) -> Self {
        Self {
            room_address: resp.room_url,
            room_name: resp.room_name,
            access_token: resp.token,
            session_id: resp.session_id,
            continuation_id: resp.character_session_id.filter(|id| !id.is_empty()),
        }
    }
}

/// Pull a human-readable message out of an upstream error payload.
///
/// Upstream payloads are not uniform: some carry `message`, some nest it under
/// `error`, some are bare strings. Anything else is passed through serialised.
pub fn rejection_message(payload: &serde_json::Value) -> String {
    let nested = payload.get("error").unwrap_or(payload);

    for candidate in [payload.get("message"), nested.get("message"), Some(nested)] {
        if let Some(serde_json::Value::String(s)) = candidate {
            if !s.is_empty() {
                return s.clone();
            }
        }
    }

    if nested.is_null() {
        String::new()
    } else {
        nested.to_string()
    }
}
