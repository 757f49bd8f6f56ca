use shared::error::CatalogError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("your session has expired, please log in again")]
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no site selected")]
    NoRecordSelected,
    #[error("no data to update")]
    NothingToUpdate,
    #[error("please enter a site ID")]
    EmptySiteId,
    #[error("the displayed site is not being edited")]
    NotEditing,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    InvalidField(#[from] CatalogError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("network error: {0}")]
    Network(String),
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("edit access denied: {0}")]
    PermissionDenied(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Auth failures are never recovered locally; the front end must send
    /// the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    pub fn auth(&self) -> Option<AuthError> {
        match self {
            ClientError::Auth(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            ClientError::Validation(kind) => Some(kind),
            _ => None,
        }
    }
}

impl From<CatalogError> for ClientError {
    fn from(value: CatalogError) -> Self {
        ClientError::Validation(value.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        ClientError::Network(value.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        ClientError::Decode(value.to_string())
    }
}
