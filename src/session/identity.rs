use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::error::AppError;

const NURSE_ROLE: &str = "nurse";

/// Who this agent registers as on the live socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nurse_id: String,
    pub token: String,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    role: Option<String>,
}

impl Identity {
    /// Reads the nurse id out of a JWT payload. The signature is not checked
    /// here; the backend does that on every request.
    pub fn from_token(token: &str) -> Result<Self, AppError> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| AppError::Unauthorized("malformed token".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| AppError::Unauthorized(format!("malformed token payload: {err}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|err| AppError::Unauthorized(format!("malformed token claims: {err}")))?;

        if claims.role.as_deref() != Some(NURSE_ROLE) {
            return Err(AppError::Unauthorized("token is not a nurse token".to_string()));
        }

        let nurse_id = match claims.id {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => return Err(AppError::Unauthorized("token carries no nurse id".to_string())),
        };

        Ok(Self {
            nurse_id,
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_token(id: &str, role: &str) -> String {
    let claims = serde_json::json!({ "id": id, "role": role }).to_string();
    format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}

#[cfg(test)]
mod tests {
    use super::{test_token, Identity};
    use crate::error::AppError;

    #[test]
    fn extracts_nurse_id() {
        let token = test_token("N7", "nurse");
        let identity = Identity::from_token(&token).unwrap();

        assert_eq!(identity.nurse_id, "N7");
        assert_eq!(identity.token, token);
    }

    #[test]
    fn rejects_other_roles() {
        let token = test_token("C1", "client");
        assert!(matches!(
            Identity::from_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Identity::from_token("not-a-jwt").is_err());
        assert!(Identity::from_token("a.!!!.c").is_err());
    }
}
