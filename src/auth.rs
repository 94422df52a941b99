//! Authenticated-principal boundary.
//!
//! Authentication itself happens upstream (API gateway / identity service);
//! this module only materializes the principal the gateway injects via
//! request headers and exposes the role capability check the core gates on.

use crate::errors::ServiceError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Role of the authenticated principal within their account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Privileged: may create materials, review requests, issue and
    /// receive loans.
    InventoryManager,
    /// Restricted: may submit requests, view own loans, request extensions.
    Employee,
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inventory_manager" | "manager" => Ok(Role::InventoryManager),
            "employee" => Ok(Role::Employee),
            _ => Err(ServiceError::Unauthorized),
        }
    }
}

/// Tenant-scoped identity threaded explicitly through every core operation.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(account_id: Uuid, user_id: Uuid, role: Role) -> Self {
        Self {
            account_id,
            user_id,
            role,
        }
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::InventoryManager
    }

    /// Gate for manager-only operations.
    pub fn require_manager(&self) -> Result<(), ServiceError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied)
        }
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ServiceError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::Unauthorized)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = Uuid::parse_str(header_value(parts, ACCOUNT_ID_HEADER)?)
            .map_err(|_| ServiceError::Unauthorized)?;
        let user_id = Uuid::parse_str(header_value(parts, USER_ID_HEADER)?)
            .map_err(|_| ServiceError::Unauthorized)?;
        let role: Role = header_value(parts, USER_ROLE_HEADER)?.parse()?;

        Ok(AuthContext::new(account_id, user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn role_parsing() {
        assert_eq!(
            "inventory_manager".parse::<Role>().unwrap(),
            Role::InventoryManager
        );
        assert_eq!("employee".parse::<Role>().unwrap(), Role::Employee);
        assert_matches!("root".parse::<Role>(), Err(ServiceError::Unauthorized));
    }

    #[test]
    fn manager_gate() {
        let manager = AuthContext::new(Uuid::new_v4(), Uuid::new_v4(), Role::InventoryManager);
        let employee = AuthContext::new(Uuid::new_v4(), Uuid::new_v4(), Role::Employee);

        assert!(manager.require_manager().is_ok());
        assert_matches!(
            employee.require_manager(),
            Err(ServiceError::PermissionDenied)
        );
    }
}
