use shared::{
    checklist::PayloadError,
    domain::QuestionId,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Every variant owns plain data so one failed in-flight fetch can be
/// handed to all of its waiters.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {status}: {error}")]
    Http { status: u16, error: ApiError },
    #[error("failed to decode server response: {0}")]
    Decode(String),
    #[error("invalid endpoint '{0}'")]
    InvalidUrl(String),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("invalid access token: {0}")]
    InvalidToken(String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("question {0} is not part of this checklist")]
    UnknownQuestion(QuestionId),
    #[error("no question with id '{0}' in this checklist")]
    UnknownExternalId(String),
    #[error("question {0} has no saved response")]
    NothingToDelete(QuestionId),
    #[error("autosave task is no longer running")]
    AutosaveClosed,
    #[error("local store error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Http { error, .. } => Some(error.code),
            ClientError::NotAuthenticated | ClientError::InvalidToken(_) => {
                Some(ErrorCode::Unauthorized)
            }
            ClientError::Payload(_) => Some(ErrorCode::Validation),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code() == Some(ErrorCode::Unauthorized)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            ClientError::Decode(value.to_string())
        } else {
            ClientError::Transport(value.to_string())
        }
    }
}

/// Only the local store reports through `anyhow`.
impl From<anyhow::Error> for ClientError {
    fn from(value: anyhow::Error) -> Self {
        ClientError::Storage(format!("{value:#}"))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        ClientError::Decode(value.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(value: url::ParseError) -> Self {
        ClientError::InvalidUrl(value.to_string())
    }
}
