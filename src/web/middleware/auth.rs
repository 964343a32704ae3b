use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

/// Viewer role, from the token's `role` claim. Anything unrecognized is a
/// plain user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Vendor,
    User,
}

impl Role {
    fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some("admin") => Self::Admin,
            Some("vendor") => Self::Vendor,
            _ => Self::User,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: String,
    pub role: Role,
    /// Raw access token, forwarded on every backend call so the backend can
    /// apply its row-level rules.
    pub token: String,
}

#[derive(Deserialize)]
struct JwtPayload {
    sub: String,
    role: Option<String>,
}

/// Decodes the JWT payload without verifying the signature. The backend
/// verifies the same token on every proxied request; this layer only needs
/// the claims to pick a scope.
fn parse_token(token: &str) -> Option<(String, Role)> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let payload: JwtPayload = serde_json::from_slice(&payload_bytes).ok()?;
    Some((payload.sub, Role::from_claim(payload.role.as_deref())))
}

fn token_from_cookies(cookies: &str) -> Option<&str> {
    cookies
        .split("; ")
        .find_map(|c| c.strip_prefix("access_token="))
}

pub async fn require_auth(mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|hv| hv.to_str().ok())
        .and_then(token_from_cookies)
        .map(|t| t.to_string());

    if let Some(token) = token {
        if let Some((id, role)) = parse_token(&token) {
            request
                .extensions_mut()
                .insert(AuthenticatedUser { id, role, token });
            return next.run(request).await;
        }
    }

    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .body(axum::body::Body::from("Unauthorized - Please login"))
        .unwrap()
}
