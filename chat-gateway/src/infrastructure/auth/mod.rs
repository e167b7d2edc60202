//! WebSocket 握手认证（HMAC JWT）

use std::collections::HashSet;

use chat_core::error::{ChatError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::model::AuthenticatedUser;

/// Token Claims
#[derive(Debug, Deserialize)]
struct TokenClaims {
    /// 用户ID（字符串或数字）
    #[serde(rename = "_id")]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
}

/// JWT 认证器
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp 存在时校验，缺省时不强制
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// 校验 token 并提取用户身份
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser> {
        if token.is_empty() {
            return Err(ChatError::Unauthorized("token required".to_string()));
        }

        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ChatError::Unauthorized(format!("token validation failed: {e}")))?;

        let user_id = match token_data.claims.id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };
        if user_id.is_empty() {
            return Err(ChatError::Unauthorized("token has no user id".to_string()));
        }

        let display_name = token_data.claims.name.unwrap_or_default();
        debug!(user_id = %user_id, "Token authenticated");

        Ok(AuthenticatedUser {
            user_id,
            display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn extracts_identity_from_claims() {
        let auth = JwtAuthenticator::new("secret");
        let token = sign(json!({"_id": "u-1", "name": "Alice"}), "secret");

        let user = auth.authenticate(&token).unwrap();
        assert_eq!(user.user_id, "u-1");
        assert_eq!(user.display_name, "Alice");
    }

    #[test]
    fn numeric_id_is_stringified() {
        let auth = JwtAuthenticator::new("secret");
        let token = sign(json!({"_id": 42}), "secret");

        assert_eq!(auth.authenticate(&token).unwrap().user_id, "42");
    }

    #[test]
    fn rejects_bad_signature_expired_and_missing_id() {
        let auth = JwtAuthenticator::new("secret");

        let forged = sign(json!({"_id": "u-1"}), "other");
        assert!(matches!(auth.authenticate(&forged), Err(ChatError::Unauthorized(_))));

        let expired = sign(json!({"_id": "u-1", "exp": 1_000}), "secret");
        assert!(auth.authenticate(&expired).is_err());

        let anonymous = sign(json!({"name": "nobody"}), "secret");
        assert!(auth.authenticate(&anonymous).is_err());

        assert!(auth.authenticate("").is_err());
    }
}
