//! Identity of the caller. Credentials are verified upstream; this layer trusts the
//! `x-user-id` / `x-user-role` headers set by the gateway and gates routes by role.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Role sets used by route gates.
pub mod roles {
    use crate::entities::user::UserRole;

    pub const ADMIN: &[UserRole] = &[UserRole::Admin];
    pub const SITE_MANAGERS: &[UserRole] = &[UserRole::Admin, UserRole::SiteLead];
}

/// The acting user, used for audit fields and role checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub role: Option<UserRole>,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(UserRole::Admin)
    }

    /// Fails with `Unauthorized` for anonymous callers and `Forbidden` for other roles.
    pub fn require(&self, allowed: &[UserRole]) -> Result<(), ServiceError> {
        let role = self
            .role
            .ok_or_else(|| ServiceError::Unauthorized("missing user role".into()))?;
        if allowed.contains(&role) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {:?} may not perform this action",
                role
            )))
        }
    }

    pub fn require_identified(&self) -> Result<Uuid, ServiceError> {
        self.user_id
            .ok_or_else(|| ServiceError::Unauthorized("missing user id".into()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| ServiceError::Unauthorized(format!("invalid {USER_ID_HEADER}")))
            })
            .transpose()?;
        let role = header(parts, USER_ROLE_HEADER)
            .map(|raw| raw.parse::<UserRole>().map_err(ServiceError::Unauthorized))
            .transpose()?;

        Ok(Actor { user_id, role })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
