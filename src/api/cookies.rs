//! Auth cookie helpers.
//!
//! Three cookies travel together: the access token (HttpOnly, `/api`), the
//! refresh token (HttpOnly, `/api/auth`) and the CSRF token (readable by
//! scripts, `/`). Clearing must use the same paths or browsers keep them.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::{SameSitePolicy, ServerConfig};
use crate::services::IssuedSession;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";

const ACCESS_PATH: &str = "/api";
const REFRESH_PATH: &str = "/api/auth";
const CSRF_PATH: &str = "/";

const fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::None => SameSite::None,
    }
}

fn build(
    server: &ServerConfig,
    name: &'static str,
    value: String,
    path: &'static str,
    http_only: bool,
    max_age: time::Duration,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(path)
        .http_only(http_only)
        .secure(server.cookies_secure())
        .same_site(same_site(server.same_site))
        .max_age(max_age)
        .build()
}

fn to_time(duration: chrono::Duration) -> time::Duration {
    time::Duration::seconds(duration.num_seconds())
}

/// Adds all three auth cookies for a freshly issued session.
#[must_use]
pub fn set_session_cookies(
    jar: CookieJar,
    server: &ServerConfig,
    session: &IssuedSession,
) -> CookieJar {
    jar.add(build(
        server,
        ACCESS_COOKIE,
        session.access_token.clone(),
        ACCESS_PATH,
        true,
        to_time(session.access_max_age),
    ))
    .add(build(
        server,
        REFRESH_COOKIE,
        session.refresh_token.clone(),
        REFRESH_PATH,
        true,
        to_time(session.refresh_max_age),
    ))
    .add(build(
        server,
        CSRF_COOKIE,
        session.csrf_token.clone(),
        CSRF_PATH,
        false,
        to_time(session.refresh_max_age),
    ))
}

/// Expires all three auth cookies on the client.
#[must_use]
pub fn clear_session_cookies(jar: CookieJar, server: &ServerConfig) -> CookieJar {
    jar.add(build(
        server,
        ACCESS_COOKIE,
        String::new(),
        ACCESS_PATH,
        true,
        time::Duration::ZERO,
    ))
    .add(build(
        server,
        REFRESH_COOKIE,
        String::new(),
        REFRESH_PATH,
        true,
        time::Duration::ZERO,
    ))
    .add(build(
        server,
        CSRF_COOKIE,
        String::new(),
        CSRF_PATH,
        false,
        time::Duration::ZERO,
    ))
}

#[must_use]
pub fn cookie_value<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(Cookie::value).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> IssuedSession {
        IssuedSession {
            session_id: "sid".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            csrf_token: "csrf".to_string(),
            access_max_age: chrono::Duration::minutes(15),
            refresh_max_age: chrono::Duration::days(14),
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let server = ServerConfig::default();
        let jar = set_session_cookies(CookieJar::new(), &server, &session());

        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.path(), Some("/api"));
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.max_age(), Some(time::Duration::minutes(15)));

        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.path(), Some("/api/auth"));
        assert_eq!(refresh.max_age(), Some(time::Duration::days(14)));

        let csrf = jar.get(CSRF_COOKIE).unwrap();
        assert_eq!(csrf.path(), Some("/"));
        assert_eq!(csrf.http_only(), Some(false));
        assert_eq!(csrf.secure(), Some(true));
    }

    #[test]
    fn test_same_site_none_is_always_secure() {
        let server = ServerConfig {
            secure_cookies: false,
            same_site: SameSitePolicy::None,
            ..ServerConfig::default()
        };
        let jar = set_session_cookies(CookieJar::new(), &server, &session());
        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::None));
    }

    #[test]
    fn test_clear_keeps_paths() {
        let server = ServerConfig::default();
        let jar = clear_session_cookies(CookieJar::new(), &server);
        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.path(), Some("/api/auth"));
        assert_eq!(refresh.max_age(), Some(time::Duration::ZERO));
        assert!(cookie_value(&jar, REFRESH_COOKIE).is_none());
    }
}
