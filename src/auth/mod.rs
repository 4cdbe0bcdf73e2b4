//! Caller identity and permission checks at the HTTP boundary.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id and role in headers. Anonymous shoppers identify their cart with a
//! session header.

pub mod rbac;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::cart::CartOwner;

pub use rbac::{can_access_dashboard, has_permission, permissions_for, Action, Dashboard, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Identity of whoever is making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Uuid>,
    pub role: Role,
    pub session_id: Option<String>,
}

impl Caller {
    pub fn anonymous(session_id: Option<String>) -> Self {
        Self {
            user_id: None,
            role: Role::Customer,
            session_id,
        }
    }

    pub fn user(user_id: Uuid, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role,
            session_id: None,
        }
    }

    /// Reads the identity headers. Missing headers mean an anonymous
    /// customer; malformed ones are rejected.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServiceError> {
        let user_id = header(headers, USER_ID_HEADER)
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| ServiceError::Unauthorized(format!("Invalid {}", USER_ID_HEADER)))
            })
            .transpose()?;

        let role = header(headers, USER_ROLE_HEADER)
            .map(|raw| {
                Role::from_str(raw)
                    .map_err(|_| ServiceError::Unauthorized(format!("Unknown role '{}'", raw)))
            })
            .transpose()?
            .unwrap_or(Role::Customer);

        if user_id.is_none() && role != Role::Customer {
            return Err(ServiceError::Unauthorized(
                "Staff roles require a user id".to_string(),
            ));
        }

        Ok(Self {
            user_id,
            role,
            session_id: header(headers, SESSION_ID_HEADER).map(str::to_string),
        })
    }

    pub fn can(&self, action: Action) -> bool {
        has_permission(self.role, action)
    }

    pub fn require(&self, action: Action) -> Result<(), ServiceError> {
        if self.can(action) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "Role {} may not {}",
                self.role, action
            )))
        }
    }

    pub fn require_user(&self) -> Result<Uuid, ServiceError> {
        self.user_id
            .ok_or_else(|| ServiceError::Unauthorized("Sign in required".to_string()))
    }

    /// Signed-in users keep a persisted cart; anonymous callers use their session
    pub fn cart_owner(&self) -> Result<CartOwner, ServiceError> {
        match (&self.user_id, &self.session_id) {
            (Some(user_id), _) => Ok(CartOwner::User(*user_id)),
            (None, Some(session)) => Ok(CartOwner::Session(session.clone())),
            (None, None) => Err(ServiceError::Unauthorized(format!(
                "Provide {} or {} to use a cart",
                USER_ID_HEADER, SESSION_ID_HEADER
            ))),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(caller.clone());
        }
        Caller::from_headers(&parts.headers)
    }
}

/// Rejects the request unless the caller's role grants `action`
pub async fn permission_middleware(
    State(action): State<Action>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let caller = Caller::from_headers(request.headers())?;

    if !caller.can(action) {
        warn!(role = %caller.role, %action, "Permission denied");
        return Err(ServiceError::Forbidden(format!(
            "Role {} may not {}",
            caller.role, action
        )));
    }

    debug!(role = %caller.role, %action, "Permission granted");
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Extension methods for Router to add permission checks
pub trait AuthRouterExt {
    fn with_permission(self, action: Action) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_permission(self, action: Action) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            action,
            permission_middleware,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn missing_headers_mean_anonymous_customer() {
        let caller = Caller::from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(caller, Caller::anonymous(None));
        assert!(caller.require_user().is_err());
        assert!(caller.cart_owner().is_err());
    }

    #[test]
    fn session_header_addresses_anonymous_cart() {
        let caller = Caller::from_headers(&headers(&[(SESSION_ID_HEADER, "sess-1")])).unwrap();
        assert_eq!(
            caller.cart_owner().unwrap(),
            CartOwner::Session("sess-1".into())
        );
    }

    #[test]
    fn user_headers_are_parsed() {
        let id = Uuid::new_v4();
        let caller = Caller::from_headers(&headers(&[
            (USER_ID_HEADER, &id.to_string()),
            (USER_ROLE_HEADER, "vendedor"),
        ]))
        .unwrap();
        assert_eq!(caller.user_id, Some(id));
        assert_eq!(caller.role, Role::Seller);
        assert_eq!(caller.cart_owner().unwrap(), CartOwner::User(id));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(Caller::from_headers(&headers(&[(USER_ID_HEADER, "not-a-uuid")])).is_err());
        assert!(Caller::from_headers(&headers(&[(USER_ROLE_HEADER, "admin")])).is_err());
    }

    #[test]
    fn require_maps_to_forbidden() {
        let caller = Caller::user(Uuid::new_v4(), Role::Customer);
        assert!(caller.require(Action::PlaceOrder).is_ok());
        assert!(matches!(
            caller.require(Action::ManageInventory),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
