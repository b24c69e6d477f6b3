use crate::domain_model::RefreshToken;
use std::time::Duration;

pub const REFRESH_COOKIE: &str = "refresh_token";
/// The refresh cookie is only ever sent to the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

pub fn refresh_cookie(token: &RefreshToken, max_age: Duration, secure: bool) -> String {
    build(token.as_str(), max_age.as_secs(), secure)
}

pub fn cleared_refresh_cookie(secure: bool) -> String {
    build("", 0, secure)
}

fn build(value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path={}; HttpOnly; SameSite=Strict",
        REFRESH_COOKIE, value, max_age, REFRESH_COOKIE_PATH
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
