use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long an account-confirmation token stays valid, in seconds.
pub const CONFIRMATION_TOKEN_TTL_SECS: i64 = 900;

/// Confirmation-token claims. The `confirm` claim doubles as the intent
/// tag: session tokens carry `sub`/`username` instead, so neither kind
/// decodes as the other even when signed with the same secret.
#[derive(Debug, Serialize, Deserialize)]
struct ConfirmClaims {
    confirm: Uuid,
    iat: i64,
    exp: i64,
}

/// Issue a signed confirmation token binding `user_id` to the
/// account-confirmation intent for `ttl_secs` from now.
pub fn generate_confirmation_token(secret: &str, user_id: Uuid, ttl_secs: i64) -> Result<String> {
    let now = Utc::now();
    let claims = ConfirmClaims {
        confirm: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Check a confirmation token: signature, expiry, and that the embedded
/// id matches the presenting user. Every failure mode — malformed token,
/// bad signature, expiry, id mismatch — collapses to `false`; callers
/// never learn which one occurred.
pub fn verify_confirmation_token(secret: &str, token: &str, expected_user_id: Uuid) -> bool {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let Ok(data) = decode::<ConfirmClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    ) else {
        return false;
    };

    data.claims.confirm == expected_user_id
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn generate_then_verify_succeeds() {
        let user_id = Uuid::new_v4();
        let token = generate_confirmation_token(SECRET, user_id, CONFIRMATION_TOKEN_TTL_SECS).unwrap();
        assert!(verify_confirmation_token(SECRET, &token, user_id));
    }

    #[test]
    fn rejects_id_mismatch() {
        let token = generate_confirmation_token(SECRET, Uuid::new_v4(), 900).unwrap();
        assert!(!verify_confirmation_token(SECRET, &token, Uuid::new_v4()));
    }

    #[test]
    fn rejects_wrong_secret() {
        let user_id = Uuid::new_v4();
        let token = generate_confirmation_token(SECRET, user_id, 900).unwrap();
        assert!(!verify_confirmation_token("other-secret", &token, user_id));
    }

    #[test]
    fn rejects_expired_token() {
        let user_id = Uuid::new_v4();
        // Issued with a lifetime that ended two minutes ago.
        let token = generate_confirmation_token(SECRET, user_id, -120).unwrap();
        assert!(!verify_confirmation_token(SECRET, &token, user_id));
    }

    #[test]
    fn rejects_tampered_token() {
        let user_id = Uuid::new_v4();
        let token = generate_confirmation_token(SECRET, user_id, 900).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(!verify_confirmation_token(SECRET, &tampered, user_id));
        assert!(!verify_confirmation_token(SECRET, "not.a.jwt", user_id));
        assert!(!verify_confirmation_token(SECRET, "", user_id));
    }

    #[test]
    fn rejects_tokens_issued_for_another_intent() {
        // A session-style token signed with the same secret must not pass
        // as a confirmation token.
        #[derive(Serialize)]
        struct SessionClaims {
            sub: Uuid,
            username: String,
            exp: i64,
        }

        let user_id = Uuid::new_v4();
        let session = encode(
            &Header::default(),
            &SessionClaims {
                sub: user_id,
                username: "alice".into(),
                exp: (Utc::now() + Duration::seconds(900)).timestamp(),
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(!verify_confirmation_token(SECRET, &session, user_id));
    }
}
