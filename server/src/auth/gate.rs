//! Connection-time authentication.
//!
//! Stateless: one verification call per connection attempt. Every channel
//! requires an identity; the admin channel additionally requires the admin
//! role. The endpoint path names the user the connection is scoped to, so a
//! valid token for a different user is its own distinct refusal.

use crate::auth::{Identity, Role, jwt};
use crate::error::AuthError;
use crate::ws::ChannelType;

/// Verify a bearer credential for a connection attempt on `channel`, scoped
/// to `path_user_id`. Returns the established identity or the refusal that
/// decides the close code.
pub fn authenticate(
    secret: &[u8],
    token: Option<&str>,
    path_user_id: &str,
    channel: ChannelType,
) -> Result<Identity, AuthError> {
    let token = token.ok_or(AuthError::MissingCredential)?;

    let claims = jwt::validate_access_token(secret, token).map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Invalid,
    })?;

    if claims.sub != path_user_id {
        return Err(AuthError::UserMismatch);
    }

    if channel == ChannelType::Admin && claims.role != Role::Admin {
        return Err(AuthError::Forbidden);
    }

    Ok(Identity {
        user_id: claims.sub,
        role: claims.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> Vec<u8> {
        vec![7u8; 32]
    }

    fn token(user_id: &str, role: Role, ttl_secs: i64) -> String {
        jwt::issue_access_token(&secret(), user_id, role, ttl_secs).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let t = token("alice", Role::Student, 60);
        let identity = authenticate(&secret(), Some(&t), "alice", ChannelType::Chat).unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.role, Role::Student);
    }

    #[test]
    fn rejects_missing_token() {
        let err = authenticate(&secret(), None, "alice", ChannelType::Chat).unwrap_err();
        assert_eq!(err, AuthError::MissingCredential);
    }

    #[test]
    fn rejects_expired_token() {
        let t = token("alice", Role::Student, -600);
        let err = authenticate(&secret(), Some(&t), "alice", ChannelType::Chat).unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[test]
    fn rejects_garbage_token() {
        let err =
            authenticate(&secret(), Some("not-a-jwt"), "alice", ChannelType::Chat).unwrap_err();
        assert_eq!(err, AuthError::Invalid);
    }

    #[test]
    fn rejects_user_mismatch() {
        let t = token("alice", Role::Student, 60);
        let err = authenticate(&secret(), Some(&t), "bob", ChannelType::Chat).unwrap_err();
        assert_eq!(err, AuthError::UserMismatch);
    }

    #[test]
    fn admin_channel_requires_admin_role() {
        let t = token("alice", Role::Student, 60);
        let err = authenticate(&secret(), Some(&t), "alice", ChannelType::Admin).unwrap_err();
        assert_eq!(err, AuthError::Forbidden);

        let t = token("root", Role::Admin, 60);
        let identity = authenticate(&secret(), Some(&t), "root", ChannelType::Admin).unwrap();
        assert_eq!(identity.role, Role::Admin);
    }
}
