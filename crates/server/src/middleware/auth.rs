use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::COOKIE, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{
    services::tokens::{self, TOKEN_TYPE_ACCESS},
    AppState,
};

/// The authenticated caller, attached to the request by the auth
/// middleware and handed explicitly to every operation.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Pulls the access token from the Authorization header or the
/// `access_token` cookie.
fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    headers
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == "access_token").then(|| value.to_string())
            })
        })
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<AuthUser> {
    let token = extract_access_token(headers)?;
    let claims = tokens::verify_token(&state.config, &token).ok()?;
    if claims.token_type != TOKEN_TYPE_ACCESS {
        return None;
    }
    Some(AuthUser {
        id: claims.id,
        email: claims.sub,
        role: claims.role,
    })
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = authenticate(&state, request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// Extractor for the authenticated caller: the middleware-inserted
// extension when present, otherwise the request's own credentials.
#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        authenticate(state, &parts.headers).ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// For routes that are public but behave differently for authenticated
/// callers (the review listing). Invalid or absent credentials simply
/// yield an anonymous caller.
#[derive(Clone, Debug)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(MaybeAuthUser(Some(user.clone())));
        }
        Ok(MaybeAuthUser(authenticate(state, &parts.headers)))
    }
}
