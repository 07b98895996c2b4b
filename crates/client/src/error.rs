use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected the session. The global handler has already
    /// cleared it and sent the context back to login.
    #[error("session is no longer valid")]
    Unauthorized,
    /// 401 on the login call itself.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("{status}: {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("server error {status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid state: {0}")]
    State(&'static str),
}

impl ClientError {
    /// Whether the same request may succeed if issued again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Transport(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => "Session expired, please log in again.".to_string(),
            Self::InvalidCredentials => "Invalid identifier or password.".to_string(),
            Self::Validation(message) => message.clone(),
            Self::Forbidden => "Admin privileges required.".to_string(),
            Self::NotFound => "Not found.".to_string(),
            Self::Rejected { status, message }
                if *status == StatusCode::BAD_REQUEST && !message.is_empty() =>
            {
                message.clone()
            }
            Self::Rejected { message, .. } => format!("Request rejected: {message}"),
            Self::Server { message, .. } => format!("Server error: {message}. Please retry."),
            Self::Transport(err) => format!("Server unreachable: {err}. Please retry."),
            Self::Storage(err) => format!("Local storage error: {err}"),
            Self::Json(err) => format!("Malformed data: {err}"),
            Self::State(message) => format!("Unexpected state: {message}"),
        }
    }
}
