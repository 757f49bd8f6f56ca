use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{SiteId, SiteRecord},
    error::ApiMessage,
    protocol::{LoginRequest, LoginResponse, SiteResponse, SiteUpdate, UpdateResponse, UserProfile},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{AuthError, ClientError},
    session::SessionContext,
};

const LOGIN_FAILED: &str = "Login failed";
const SITE_NOT_FOUND: &str = "Site not found";
const UPDATE_FAILED: &str = "Error updating site";

/// Outbound gateway to the dashboard backend. Every authenticated call
/// carries the session's bearer token; a 401 tears the session down.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionContext) -> Result<Self, ClientError> {
        Self::with_client(Client::new(), base_url, session)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        session: SessionContext,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Signs in and stores the issued token and profile in the session.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ClientError> {
        let body = self.verify_credentials(username, password).await?;
        self.session.set_session(body.access_token, body.user.clone());
        Ok(body.user)
    }

    /// Checks a username/password pair with the server without touching the
    /// current session. A 401 here means bad credentials, not expiry.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ClientError> {
        let url = self.endpoint(&["api", "auth", "login"])?;
        debug!(%username, "api: login");
        let response = self
            .http
            .post(url)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = ApiMessage::from_body(&bytes).unwrap_or_else(|| LOGIN_FAILED.into());
            info!(%username, status = status.as_u16(), "api: login rejected");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn logout(&self) {
        self.session.clear();
    }

    /// Generic authenticated call. `path` is relative to the base url and may
    /// carry a query string.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = self.endpoint(&segments)?;
        url.set_query(query);
        self.send_authenticated(method, url, body, None).await
    }

    pub async fn fetch_site(&self, site_id: &SiteId) -> Result<SiteRecord, ClientError> {
        let mut url = self.endpoint(&["api", "sites"])?;
        url.query_pairs_mut().append_pair("site_id", site_id.as_str());
        let response: SiteResponse = decode(
            self.send_authenticated(Method::GET, url, None, Some(SITE_NOT_FOUND))
                .await?,
        )?;
        Ok(response.site)
    }

    pub async fn update_site(
        &self,
        site_id: &SiteId,
        update: &SiteUpdate,
    ) -> Result<UpdateResponse, ClientError> {
        let url = self.endpoint(&["api", "sites", site_id.as_str()])?;
        let body = serde_json::to_value(update)?;
        let value = self
            .send_authenticated(Method::PUT, url, Some(&body), Some(UPDATE_FAILED))
            .await?;
        if value.is_null() {
            return Ok(UpdateResponse::default());
        }
        decode(value)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_authenticated(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        fallback_message: Option<&str>,
    ) -> Result<Value, ClientError> {
        let Some(token) = self.session.token() else {
            warn!(%method, path = url.path(), "api: no session token, login required");
            return Err(AuthError::NotAuthenticated.into());
        };

        debug!(%method, path = url.path(), "api: request");
        let mut request = self.http.request(method.clone(), url.clone()).bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|err| {
            warn!(%method, path = url.path(), %err, "api: transport failure");
            ClientError::from(err)
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.expire(&token);
            return Err(AuthError::SessionExpired.into());
        }

        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = ApiMessage::from_body(&bytes)
                .or_else(|| fallback_message.map(str::to_string))
                .unwrap_or_else(|| status_text(status));
            info!(%method, path = url.path(), status = status.as_u16(), %message, "api: request failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    Ok(serde_json::from_value(value)?)
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
