use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{error::panic_response, handlers, middleware_layer, state::AppState};

/// Builds the application router.
///
/// Every route sits behind `authenticate`; page routes add the redirecting
/// guard and API routes the 401 guard.
pub fn router(state: AppState) -> Router {
    let login_routes = Router::new()
        .route(
            "/login",
            get(handlers::auth::login_page).post(handlers::auth::login),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_login,
        ));

    let page_routes = Router::new()
        .route("/account", get(handlers::auth::account))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_user,
        ));

    let api_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route("/logout", post(handlers::auth::logout))
        .route("/sessions/revoke-all", post(handlers::auth::revoke_all))
        .route_layer(from_fn(middleware_layer::auth::require_user_api));

    let routes = Router::new()
        .route("/", get(handlers::auth::index))
        .merge(login_routes)
        .merge(page_routes)
        .merge(api_routes);

    with_outer_layers(routes, state)
}

/// Wraps routes in the layers every request passes through.
///
/// From the inside out: session authentication, the cookie jar, panic
/// recovery, security headers and request tracing.
pub fn with_outer_layers(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::authenticate,
        ))
        .layer(CookieManagerLayer::new())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(middleware_layer::headers::security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .with_state(state)
}
