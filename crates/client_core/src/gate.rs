use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    api::ApiClient,
    error::{ClientError, ValidationError},
};

#[derive(Clone)]
pub struct EditCredentials {
    pub username: String,
    pub password: String,
}

impl EditCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for EditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Confirms that the person at the keyboard may switch the view into edit
/// mode. This only decides whether the form opens; the update endpoint
/// still enforces authorization on its own.
#[async_trait]
pub trait EditGate: Send + Sync {
    async fn authorize(&self, credentials: &EditCredentials) -> Result<(), ClientError>;
}

/// Re-verifies the supplied credentials with the backend and requires the
/// returned profile to carry an editing role.
pub struct ServerEditGate {
    api: Arc<ApiClient>,
    allowed_roles: Vec<String>,
}

impl ServerEditGate {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self::with_roles(api, ["admin"])
    }

    pub fn with_roles<I, S>(api: Arc<ApiClient>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api,
            allowed_roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EditGate for ServerEditGate {
    async fn authorize(&self, credentials: &EditCredentials) -> Result<(), ClientError> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(ValidationError::InvalidCredentials.into());
        }

        let response = match self
            .api
            .verify_credentials(credentials.username.trim(), &credentials.password)
            .await
        {
            Ok(response) => response,
            Err(ClientError::Api { status, .. }) if status == 400 || status == 401 => {
                info!(username = %credentials.username, "edit gate: credentials rejected");
                return Err(ValidationError::InvalidCredentials.into());
            }
            Err(err) => return Err(err),
        };

        let role = response.user.role.unwrap_or_default();
        if self.allowed_roles.iter().any(|allowed| *allowed == role) {
            info!(username = %credentials.username, %role, "edit gate: access granted");
            Ok(())
        } else {
            warn!(username = %credentials.username, %role, "edit gate: role may not edit sites");
            Err(ClientError::PermissionDenied(format!(
                "role '{role}' may not edit sites"
            )))
        }
    }
}
