use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::SiteRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteResponse {
    pub site: SiteRecord,
}

/// Partial update body for `PUT /api/sites/<id>`: only the changed fields.
pub type SiteUpdate = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub message: Option<String>,
}
