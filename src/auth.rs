use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::errors::AppError;
use crate::models::{ActorType, AuditContext, UnknownVariant};

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Staff => "STAFF",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "STAFF" => Ok(Role::Staff),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

pub const BOOKING_ROLES: &[Role] = &[Role::Admin, Role::Staff];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// An authenticated back-office user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

fn sign(secret: &str, payload: &[u8]) -> Result<HmacSha1, AuthError> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(payload);
    Ok(mac)
}

/// Token format: `base64url(id:username:ROLE).base64url(hmac_sha1(secret, payload))`.
pub fn issue_token(secret: &str, actor_id: &str, username: &str, role: Role) -> anyhow::Result<String> {
    anyhow::ensure!(
        !actor_id.contains(':') && !username.contains(':'),
        "actor id and username must not contain ':'"
    );
    let payload = format!("{actor_id}:{username}:{role}");
    let mac = sign(secret, payload.as_bytes())?;
    let signature = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Actor, AuthError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(AuthError::Malformed)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| AuthError::Malformed)?;
    let signature = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| AuthError::Malformed)?;

    sign(secret, &payload)?
        .verify_slice(&signature)
        .map_err(|_| AuthError::BadSignature)?;

    let payload = String::from_utf8(payload).map_err(|_| AuthError::Malformed)?;
    let mut parts = payload.splitn(3, ':');
    let (Some(id), Some(username), Some(role)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::Malformed);
    };
    if id.is_empty() {
        return Err(AuthError::Malformed);
    }
    let role = role.parse::<Role>().map_err(|_| AuthError::Malformed)?;

    Ok(Actor {
        id: id.to_string(),
        username: username.to_string(),
        role,
    })
}

pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Actor, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    Ok(verify_token(secret, token)?)
}

impl Actor {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(actor_id = %self.id, role = %self.role, "role not permitted");
            Err(AppError::Forbidden)
        }
    }

    pub fn audit_context(&self, meta: &RequestMeta) -> AuditContext {
        AuditContext {
            actor_type: ActorType::Admin,
            actor_id: Some(self.id.clone()),
            actor_name: Some(self.username.clone()),
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
        }
    }
}

/// Client metadata copied into audit records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"));

        Self {
            ip,
            user_agent: header("user-agent"),
        }
    }

    /// Context for unauthenticated customer requests.
    pub fn customer_context(&self) -> AuditContext {
        AuditContext {
            actor_type: ActorType::Customer,
            actor_id: None,
            actor_name: None,
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}
