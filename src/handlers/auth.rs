use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension, Form, Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tower_cookies::Cookies;

use crate::{
    error::Result,
    middleware_layer::{
        auth::{removal_cookie, session_cookie, CurrentUser, MaybeUser},
        rate_limit::client_ip,
    },
    models::{session::SessionClaim, user::Principal},
    state::AppState,
    validation::auth::*,
};

/// The form payload for login.
#[derive(Deserialize)]
pub struct LoginForm {
    pub identifier: String,
    pub password: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for revoking every session.
#[derive(Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub revoked: u64,
}

/// Where a request came from, as stored on the session row.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub remote_addr: String,
    pub user_agent: String,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        Ok(ClientInfo {
            remote_addr: client_ip(&parts.extensions),
            user_agent,
        })
    }
}

/// Serves a minimal login form.
pub async fn login_page() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<title>Sign in</title>
<form method="post" action="/login">
  <input name="identifier" autocomplete="username">
  <input name="password" type="password" autocomplete="current-password">
  <button type="submit">Sign in</button>
</form>
"#,
    )
}

/// Handles login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientInfo,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    validate_identifier(&form.identifier)?;
    validate_password(&form.password)?;
    tracing::info!("🔐 Login attempt for: {}", form.identifier);

    let issued = state
        .auth
        .login(
            &form.identifier,
            &form.password,
            &client.remote_addr,
            &client.user_agent,
        )
        .await?;

    let value = state.codec.encode(&issued.claim())?;
    cookies.add(session_cookie(&state.config, value));

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles logout of the current session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(claim): Extension<SessionClaim>,
    cookies: Cookies,
) -> Result<Response> {
    state.auth.logout(&claim).await?;
    cookies.remove(removal_cookie(state.codec.cookie_name()));

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Ends every session of the current principal, this one included.
#[axum::debug_handler]
pub async fn revoke_all(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    cookies: Cookies,
) -> Result<Response> {
    let revoked = state.auth.logout_everywhere(principal.id).await?;
    cookies.remove(removal_cookie(state.codec.cookie_name()));

    Ok((StatusCode::OK, Json(RevokeResponse { success: true, revoked })).into_response())
}

/// Returns the current principal.
pub async fn me(CurrentUser(principal): CurrentUser) -> Json<Principal> {
    Json(principal)
}

/// A page only signed-in principals can reach.
pub async fn account(CurrentUser(principal): CurrentUser) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<title>Account</title>\n<p>Signed in as {}</p>\n",
        escape_html(&principal.identifier)
    ))
}

/// Public landing page.
pub async fn index(MaybeUser(principal): MaybeUser) -> String {
    match principal {
        Some(principal) => format!("Hello, {}!", principal.identifier),
        None => "Hello, anonymous!".to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tower_cookies::cookie::time::Duration;

    #[test]
    fn session_cookie_attributes_follow_config() {
        let config = Config {
            cookie_secure: true,
            ..Config::default()
        };
        let cookie = session_cookie(&config, "v1.a.b".to_string());
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));
    }

    #[test]
    fn identifiers_are_escaped_in_pages() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}
