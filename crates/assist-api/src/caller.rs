use crate::{error::ApiError, AppState};
use assist_db::status::Role;
use axum::{extract::FromRequestParts, http::request::Parts};

/// The authenticated user making a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

impl Caller {
    /// Fails with `Forbidden` unless the caller holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::debug!(username = %self.username, role = %self.role, ?roles, "access denied");
            Err(ApiError::Forbidden)
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;
        let claims = state
            .tokens
            .verify(token.trim())
            .map_err(|err| ApiError::Unauthorized(err.to_string()))?;
        let user = state
            .store
            .load_user_by_username(&claims.sub)
            .await?
            .filter(|user| user.enabled)
            .ok_or_else(|| ApiError::Unauthorized("User no longer exists or is disabled".into()))?;
        // Role comes from the stored user, not from the token.
        Ok(Caller {
            id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}

#[cfg(test)]
pub(crate) fn caller(id: i32, role: Role) -> Caller {
    Caller {
        id,
        username: format!("user{id}"),
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_accepts_any_listed_role() {
        let verifier = caller(1, Role::Verifier);
        assert!(verifier.require(&[Role::Verifier, Role::Approver]).is_ok());
        assert!(matches!(
            verifier.require(&[Role::Admin]),
            Err(ApiError::Forbidden)
        ));
    }
}
