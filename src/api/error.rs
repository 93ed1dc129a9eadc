/// Errors talking to the reading-assistant backend
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with `{success: false, error}` or a non-2xx status
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// Non-2xx status without a readable error envelope
    #[error("unexpected response ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl ApiError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }

    /// HTTP status attached to the error, if the backend answered at all
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::Generic { .. } => None,
        }
    }
}
