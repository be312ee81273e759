use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::{cookie::time::Duration, Cookie, Cookies};

use crate::{
    config::Config,
    crypto::cookie::{DecodeError, Decoded},
    error::AppError,
    models::user::Principal,
    services::auth::Verdict,
    state::AppState,
};

/// The authenticated principal of the current request.
///
/// Present in request extensions only after [`authenticate`] verified a
/// session. As an extractor it rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

/// The principal of the current request, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<CurrentUser>().map(|user| user.0.clone()),
        ))
    }
}

/// Creates the session cookie for an encoded claim.
///
/// Its lifetime matches the absolute session lifetime; the server enforces
/// both expiry clocks regardless.
pub fn session_cookie(config: &Config, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.cookie_name.clone(), value);
    cookie.set_http_only(true);
    cookie.set_secure(config.cookie_secure);
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(config.absolute_ttl.num_seconds()));
    cookie.set_path("/");
    cookie
}

/// Builds the removal cookie for the session cookie.
///
/// Path must match the one used at login or browsers keep the original.
pub fn removal_cookie(name: &str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_owned(), "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookie
}

/// Decodes the session cookie, clearing it when it is unusable.
fn read_claim(state: &AppState, cookies: &Cookies) -> Option<Decoded> {
    let name = state.codec.cookie_name();
    let cookie = cookies.get(name)?;

    match state.codec.decode_value(cookie.value()) {
        Ok(decoded) => Some(decoded),
        Err(DecodeError::Forged) => {
            tracing::warn!("❌ Forged session cookie presented, treating request as anonymous");
            cookies.remove(removal_cookie(name));
            None
        }
        Err(e) => {
            tracing::debug!("Discarding session cookie: {}", e);
            cookies.remove(removal_cookie(name));
            None
        }
    }
}

/// Attaches the verified principal to every request that carries a live session.
///
/// Requests without one proceed anonymously; only guards deny. A session
/// store failure is answered as a server fault and never downgraded to
/// anonymous. Cookies still signed under the previous key generation are
/// re-issued under the current one.
pub async fn authenticate(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let decoded = read_claim(&state, &cookies);

    match state.auth.verify(decoded.as_ref().map(|d| &d.claim)).await {
        Ok(Verdict::Authenticated(principal)) => {
            tracing::debug!("🔑 Request authenticated as: {}", principal.identifier);
            request.extensions_mut().insert(CurrentUser(principal));
            if let Some(decoded) = decoded {
                if decoded.stale {
                    reissue(&state, &cookies, &decoded);
                }
                request.extensions_mut().insert(decoded.claim);
            }
        }
        Ok(Verdict::Unauthenticated(reason)) => {
            if reason.clears_cookie() {
                tracing::debug!("Clearing session cookie: {:?}", reason);
                cookies.remove(removal_cookie(state.codec.cookie_name()));
            }
        }
        Err(e) => {
            tracing::error!("❌ Session verification failed: {}", e);
            return e.into_response();
        }
    }

    next.run(request).await
}

/// Re-encodes a claim under the current key generation.
///
/// A failure keeps the old cookie, which stays valid until the next rotation.
fn reissue(state: &AppState, cookies: &Cookies, decoded: &Decoded) {
    match state.codec.encode(&decoded.claim) {
        Ok(value) => {
            tracing::debug!("🔑 Re-issuing session cookie under current keys");
            cookies.add(session_cookie(&state.config, value));
        }
        Err(e) => tracing::error!("❌ Failed to re-issue session cookie: {}", e),
    }
}

/// Page guard: anonymous requests are redirected to the login page.
pub async fn require_user(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<CurrentUser>().is_some() {
        return next.run(request).await;
    }

    tracing::debug!(
        "Anonymous request to {}, redirecting to login",
        request.uri().path()
    );
    (
        StatusCode::FOUND,
        [(header::LOCATION, state.config.login_path.clone())],
    )
        .into_response()
}

/// API guard: anonymous requests get 401.
pub async fn require_user_api(request: Request<Body>, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_some() {
        return next.run(request).await;
    }
    AppError::Unauthenticated.into_response()
}
