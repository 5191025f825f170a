//! Typed request context
//!
//! The upstream auth gateway authenticates callers and forwards who they are
//! in headers. Handlers receive a [`RequestContext`] instead of reading loose
//! header values.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::error::ApiError;

pub const PRINCIPAL_HEADER: &str = "x-principal-id";
pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const PERMISSIONS_HEADER: &str = "x-permissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "wallets:create")]
    WalletsCreate,
    #[serde(rename = "transactions:sign")]
    TransactionsSign,
    #[serde(rename = "nodes:manage")]
    NodesManage,
    /// Grants every permission
    #[serde(rename = "*")]
    All,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::WalletsCreate => "wallets:create",
            Permission::TransactionsSign => "transactions:sign",
            Permission::NodesManage => "nodes:manage",
            Permission::All => "*",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "wallets:create" => Some(Permission::WalletsCreate),
            "transactions:sign" => Some(Permission::TransactionsSign),
            "nodes:manage" => Some(Permission::NodesManage),
            "*" => Some(Permission::All),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: String,
    pub organization_id: Uuid,
    pub permissions: HashSet<Permission>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let principal = header_value(headers, PRINCIPAL_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing request principal".to_string()))?;

        let organization_id = header_value(headers, ORGANIZATION_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing organization".to_string()))?;
        let organization_id = Uuid::parse_str(organization_id)
            .map_err(|_| ApiError::Unauthorized("Malformed organization ID".to_string()))?;

        // Unknown permission strings are ignored
        let permissions = header_value(headers, PERMISSIONS_HEADER)
            .map(|raw| raw.split(',').filter_map(Permission::parse).collect())
            .unwrap_or_default();

        Ok(Self {
            principal: principal.to_string(),
            organization_id,
            permissions,
        })
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::All) || self.permissions.contains(&permission)
    }

    /// Fail with 403 unless the caller holds `permission`
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Permission {} required",
                permission
            )))
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
