use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{Extensions, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::{aio::ConnectionManager, FromRedisValue};
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Extracts the peer IP address from the request extensions.
///
/// # Returns
///
/// The IP address as a string, or "unknown" when the server was not started
/// with connect info.
pub fn client_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// What a finished login response does to the client's failure counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// A failed attempt: bump the counter and restart its window.
    Increment,
    /// A successful login: forget earlier failures.
    Reset,
    /// Anything else leaves the counter alone.
    Keep,
}

/// Whether a request is subject to the limiter at all.
pub fn is_counted(method: &Method) -> bool {
    *method == Method::POST
}

/// Whether the stored failure count already blocks the client.
///
/// A missing count, or one Redis could not return, never blocks.
pub fn is_locked_out(count: Option<u32>, max_attempts: u32) -> bool {
    count.is_some_and(|attempts| attempts >= max_attempts)
}

/// Maps a login response status to its counter update.
pub fn counter_update(status: StatusCode) -> CounterUpdate {
    if status.is_client_error() {
        CounterUpdate::Increment
    } else if status.is_success() {
        CounterUpdate::Reset
    } else {
        CounterUpdate::Keep
    }
}

/// Runs one Redis command, logging and swallowing failures.
///
/// The limiter fails open: an unreachable Redis must never block logins.
async fn query<T: FromRedisValue>(conn: &ConnectionManager, cmd: &mut redis::Cmd) -> Option<T> {
    match cmd.query_async(&mut conn.clone()).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("⚠️  Login rate limiter unavailable: {}", e);
            None
        }
    }
}

/// A middleware that rate limits failed login attempts per client address.
///
/// Only `POST` requests are counted. Client-error responses increment the
/// counter; a successful login resets it.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The downstream `Response`, or a 429 once the limit is reached.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(conn) = state.redis.as_ref() else {
        return next.run(req).await;
    };
    if !is_counted(req.method()) {
        return next.run(req).await;
    }

    let key = format!("rate_limit:login:{}", client_ip(req.extensions()));
    let max_attempts = state.config.login_max_attempts;

    let count: Option<u32> = query::<Option<u32>>(conn, redis::cmd("GET").arg(&key))
        .await
        .flatten();

    if is_locked_out(count, max_attempts) {
        let ttl: i64 = query(conn, redis::cmd("TTL").arg(&key)).await.unwrap_or(0);
        return AppError::RateLimitExceeded(format!(
            "Too many failed login attempts. Try again in {} minutes",
            ttl.max(60) / 60
        ))
        .into_response();
    }

    let response = next.run(req).await;

    match counter_update(response.status()) {
        CounterUpdate::Increment => {
            let _: Option<()> = query(conn, redis::cmd("INCR").arg(&key)).await;
            let _: Option<()> = query(
                conn,
                redis::cmd("EXPIRE")
                    .arg(&key)
                    .arg(state.config.login_window.as_secs()),
            )
            .await;
        }
        CounterUpdate::Reset => {
            let _: Option<()> = query(conn, redis::cmd("DEL").arg(&key)).await;
        }
        CounterUpdate::Keep => {}
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_falls_back_without_connect_info() {
        assert_eq!(client_ip(&Extensions::new()), "unknown");
    }

    #[test]
    fn client_ip_uses_peer_address() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 4567))));
        assert_eq!(client_ip(&extensions), "10.1.2.3");
    }

    #[test]
    fn only_posts_are_counted() {
        assert!(is_counted(&Method::POST));
        assert!(!is_counted(&Method::GET));
        assert!(!is_counted(&Method::HEAD));
    }

    #[test]
    fn lockout_starts_at_the_limit() {
        assert!(!is_locked_out(None, 5));
        assert!(!is_locked_out(Some(0), 5));
        assert!(!is_locked_out(Some(4), 5));
        assert!(is_locked_out(Some(5), 5));
        assert!(is_locked_out(Some(9), 5));
    }

    #[test]
    fn failures_increment_and_successes_reset() {
        assert_eq!(counter_update(StatusCode::UNAUTHORIZED), CounterUpdate::Increment);
        assert_eq!(counter_update(StatusCode::BAD_REQUEST), CounterUpdate::Increment);
        assert_eq!(counter_update(StatusCode::OK), CounterUpdate::Reset);
        assert_eq!(counter_update(StatusCode::FOUND), CounterUpdate::Keep);
        assert_eq!(counter_update(StatusCode::SERVICE_UNAVAILABLE), CounterUpdate::Keep);
    }
}
