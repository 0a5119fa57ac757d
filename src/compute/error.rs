//! Mapping of Compute Engine HTTP failures onto [`ClientError`].

use crate::client::ClientError;
use crate::resource::ResourceRef;

use super::types::ApiErrorEnvelope;

const NOT_FOUND: u16 = 404;
const CONFLICT: u16 = 409;

/// Classifies a non-success response for a request about `target`.
pub(crate) fn classify_failure(status: u16, body: &str, target: &ResourceRef) -> ClientError {
    let envelope: ApiErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    if status == NOT_FOUND {
        return ClientError::NotFound {
            kind: target.kind,
            name: target.name.clone(),
        };
    }
    if status == CONFLICT || envelope.error.has_reason("alreadyExists") {
        return ClientError::AlreadyExists {
            kind: target.kind,
            name: target.name.clone(),
        };
    }
    let message = envelope
        .error
        .message
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback_message(body));
    ClientError::Rejected { status, message }
}

fn fallback_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::from("no error details returned")
    } else {
        trimmed.to_owned()
    }
}

pub(crate) fn transport(err: &reqwest::Error) -> ClientError {
    ClientError::Transport {
        message: err.to_string(),
    }
}

pub(crate) fn decode(err: &serde_json::Error) -> ClientError {
    ClientError::Decode {
        message: err.to_string(),
    }
}
