//! Credential exchange with the upstream signaling backend
//!
//! One request per call attempt: the backend books a media room for the
//! configured character and answers with the room address, an access token and
//! the session identifiers. The continuation id from a previous call is sent
//! back so the character can resume the conversation.

pub mod client;
pub mod messages;

pub use client::{CredentialExchange, HttpCredentialExchange};
pub use messages::{ConnectRequest, ConnectResponse, SessionCredentials};
