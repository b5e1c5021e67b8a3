pub mod access;
pub mod credentials;
pub mod files;
pub mod monitoring;
pub mod sessions;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use tower_http::cors::CorsLayer;

use crate::error::BrokerError;
use crate::AppState;

pub const ACCESS_COOKIE: &str = "broker_session";

pub fn router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/api/credentials", get(credentials::list).post(credentials::create))
        .route("/api/credentials/:id", get(credentials::get_one).delete(credentials::remove))
        .route("/api/credentials/:id/exists", get(credentials::exists))
        .route("/api/sessions", get(sessions::list).post(sessions::create))
        .route("/api/sessions/:id", delete(sessions::remove))
        .route("/api/sessions/:id/status", get(sessions::status))
        .route("/api/sessions/:id/disconnect", post(sessions::disconnect_beacon))
        .route(
            "/api/sessions/:id/files",
            get(files::list)
                .post(files::create_entry)
                .put(files::rename)
                .delete(files::delete_entry),
        )
        .route(
            "/api/sessions/:id/files/content",
            get(files::read_content).put(files::write_content),
        )
        .route("/api/sessions/:id/files/exists", get(files::exists))
        .route("/api/sessions/:id/files/upload", post(files::upload))
        .route("/api/sessions/:id/files/download", get(files::download))
        .route("/api/sessions/:id/monitor", get(monitoring::snapshot))
        .route(
            "/api/sessions/:id/monitor/top-processes",
            get(monitoring::top_processes),
        )
        .route(
            "/api/sessions/:id/monitor/login-history",
            get(monitoring::login_history),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_access));

    Router::new()
        .route("/api/access/check", get(access::check))
        .route("/api/access/verify", post(access::verify))
        .route("/api/access/logout", post(access::logout))
        .route("/ws", get(crate::ws::shell_ws_handler))
        .merge(guarded)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_access(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, BrokerError> {
    let cookie = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let result = state.access_gate.check(cookie.as_deref());
    if result.required && !result.verified {
        return Err(BrokerError::AccessDenied);
    }
    Ok(next.run(request).await)
}
