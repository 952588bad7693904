//! Side-channel transcription decoding
//!
//! The room's data channel is best-effort and carries more than transcripts.
//! Only two payload shapes are recognised:
//!
//! ```json
//! { "type": "bot-transcription" | "user-transcription",
//!   "data": { "text": "...", "language": "en" } }
//! ```
//!
//! Everything else decodes to `None`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Reported when a transcription carries no language code
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

/// One utterance to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub speaker: Speaker,
    pub text: String,
    /// Language code as sent, or [`UNKNOWN_LANGUAGE`]
    pub language: String,
}

impl TranscriptEvent {
    pub fn language_label(&self) -> Cow<'static, str> {
        language_label(&self.language)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
enum SideChannelMessage {
    BotTranscription(TranscriptionData),
    UserTranscription(TranscriptionData),
}

#[derive(Debug, Deserialize)]
struct TranscriptionData {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// Decode a raw side-channel payload. Never fails; unusable input is `None`.
pub fn decode(raw: &[u8]) -> Option<TranscriptEvent> {
    let text = std::str::from_utf8(raw).ok()?;
    let message: SideChannelMessage = serde_json::from_str(text).ok()?;

    let (speaker, data) = match message {
        SideChannelMessage::BotTranscription(data) => (Speaker::Agent, data),
        SideChannelMessage::UserTranscription(data) => (Speaker::User, data),
    };

    Some(TranscriptEvent {
        speaker,
        text: data.text,
        language: data
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
    })
}

/// Display name for a language code. Unmapped codes are returned verbatim.
pub fn language_label(code: &str) -> Cow<'static, str> {
    let primary = code.split(['-', '_']).next().unwrap_or(code).to_ascii_lowercase();
    let name = match primary.as_str() {
        "en" => "English",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "tr" => "Turkish",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "unknown" => "Unknown",
        _ => return Cow::Owned(code.to_string()),
    };
    Cow::Borrowed(name)
}
