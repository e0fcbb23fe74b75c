use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Errors raised by the HTTP clients talking to Readwise and Anytype.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request to {api} failed: {source}")]
    Transport {
        api: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{api} API returned status {status}")]
    Status { api: &'static str, status: StatusCode },

    #[error("failed to decode {api} response: {source}")]
    Decode {
        api: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {api} url {url:?}: {reason}")]
    InvalidUrl {
        api: &'static str,
        url: String,
        reason: String,
    },
}

impl ApiError {
    pub fn transport(api: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ApiError::Transport { api, source }
    }

    /// The HTTP status behind this error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reject non-success statuses, then read and decode the JSON body.
pub async fn decode_response<T: DeserializeOwned>(
    api: &'static str,
    response: Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        debug!("Unexpected {} response: {:?}", api, response);
        return Err(ApiError::Status { api, status });
    }

    let bytes = response.bytes().await.map_err(ApiError::transport(api))?;
    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { api, source })
}
