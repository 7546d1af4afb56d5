use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Model API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model API rejected the credentials ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited or quota exceeded (429): {0}")]
    RateLimited(String),

    #[error("Model API error {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid response from model API: {0}")]
    InvalidResponse(String),

    #[error("Model returned no text")]
    EmptyResponse,
}

impl GatewayError {
    /// Classify a non-success HTTP status with the body's error message.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => GatewayError::Auth { status, message },
            429 => GatewayError::RateLimited(message),
            _ => GatewayError::Provider { status, message },
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        match self {
            GatewayError::RateLimited(_) => true,
            GatewayError::Provider { status, .. } => *status == 429,
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16() == 429).unwrap_or(false),
            _ => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Auth { status, .. } | GatewayError::Provider { status, .. } => {
                Some(*status)
            }
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16()),
            GatewayError::RateLimited(_) => Some(429),
            _ => None,
        }
    }
}
