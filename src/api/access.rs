//! `/api/access/*` — the Access Gate's HTTP surface (spec §4.B / §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::api::ACCESS_COOKIE;
use crate::AppState;

#[derive(Serialize)]
pub struct CheckResponse {
    required: bool,
    verified: bool,
}

pub async fn check(State(state): State<AppState>, jar: CookieJar) -> Json<CheckResponse> {
    let cookie = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let result = state.access_gate.check(cookie.as_deref());
    Json(CheckResponse {
        required: result.required,
        verified: result.verified,
    })
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    password: String,
    #[serde(default)]
    remember: bool,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    success: bool,
}

/// `{success:true}` / 200 on a verified password, `{success:false}` / 401
/// otherwise (spec §6, §7 `ACCESS_DENIED` → 401) so a caller can tell a
/// wrong password apart from a network-level success by status code
/// alone.
pub async fn verify(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<VerifyRequest>,
) -> (StatusCode, CookieJar, Json<VerifyResponse>) {
    match state.access_gate.verify(&req.password, req.remember) {
        Some(Some(token)) => {
            let cookie = build_cookie(token, state.config.secure_cookies);
            (
                StatusCode::OK,
                jar.add(cookie),
                Json(VerifyResponse { success: true }),
            )
        }
        Some(None) => (StatusCode::OK, jar, Json(VerifyResponse { success: true })),
        None => (
            StatusCode::UNAUTHORIZED,
            jar,
            Json(VerifyResponse { success: false }),
        ),
    }
}

#[derive(Serialize)]
pub struct LogoutResponse {
    success: bool,
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    (
        jar.remove(Cookie::from(ACCESS_COOKIE)),
        Json(LogoutResponse { success: true }),
    )
}

fn build_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(ACCESS_COOKIE, token)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .permanent()
        .finish()
}
