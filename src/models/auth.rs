use serde::{Deserialize, Serialize};

/// Claims of the session token minted by the identity layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // identity-provider user id
    #[serde(alias = "organizationId")]
    pub org_id: Option<String>,
    #[serde(default)]
    pub approved: bool,
    pub email: Option<String>,
    #[serde(alias = "nickname")]
    pub name: Option<String>,
    pub exp: usize,
}

/// Extracted from a validated, approved session, available via Axum extractors
#[derive(Debug, Clone)]
pub struct OrgSession {
    pub user_id: String,
    pub organization_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}
