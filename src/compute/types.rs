//! Wire types for the Compute Engine v1 REST API.

use std::fmt;
use std::ops::Deref;

use serde::Deserialize;
use serde_json::Value;

use crate::resource::{OperationState, OperationStatus};

macro_rules! newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) struct $name(String);

        impl $name {
            pub(crate) fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.trim().to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }
    };
}

newtype!(ProjectId);
newtype!(Zone);

/// Operation resource as returned by insert, delete and operations.get.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireOperation {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) error: Option<WireOperationError>,
    #[serde(default)]
    pub(crate) http_error_message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct WireOperationError {
    #[serde(default)]
    pub(crate) errors: Vec<WireErrorItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct WireErrorItem {
    #[serde(default)]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

impl WireErrorItem {
    fn describe(&self) -> Option<String> {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message.clone()),
            (Some(code), None) => Some(code.clone()),
            (None, None) => None,
        }
    }
}

/// Maps the provider status vocabulary onto [`OperationStatus`]. Unknown
/// values are treated as still running.
pub(crate) fn parse_status(value: &str) -> OperationStatus {
    match value {
        "PENDING" => OperationStatus::Pending,
        "DONE" => OperationStatus::Done,
        _ => OperationStatus::Running,
    }
}

impl WireOperation {
    /// Status of the operation, with a DONE operation that carries an error
    /// block reported as ERROR.
    pub(crate) fn state(&self) -> OperationState {
        let status = parse_status(&self.status);
        if status != OperationStatus::Done {
            return OperationState::with_status(status);
        }
        match &self.error {
            Some(error) => {
                let messages: Vec<String> =
                    error.errors.iter().filter_map(WireErrorItem::describe).collect();
                let message = if messages.is_empty() {
                    self.http_error_message
                        .clone()
                        .unwrap_or_else(|| String::from("operation reported an error"))
                } else {
                    messages.join("; ")
                };
                OperationState::failed(message)
            }
            None => OperationState::with_status(OperationStatus::Done),
        }
    }
}

/// One page of a list response.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListPage {
    #[serde(default)]
    pub(crate) items: Vec<Value>,
    #[serde(default)]
    pub(crate) next_page_token: Option<String>,
}

/// Error envelope returned with non-success HTTP statuses.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    #[serde(default)]
    pub(crate) error: ApiErrorBody,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) errors: Vec<WireErrorItem>,
}

impl ApiErrorBody {
    pub(crate) fn has_reason(&self, reason: &str) -> bool {
        self.errors
            .iter()
            .any(|item| item.reason.as_deref() == Some(reason))
    }
}
