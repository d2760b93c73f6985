use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

const SECONDS_PER_DAY: i64 = 86_400;

/// Owns the attribute policy of the refresh-token cookie.
#[derive(Debug, Clone)]
pub struct SessionCookieManager {
    secure: bool,
}

impl SessionCookieManager {
    /// `Secure` is set everywhere except in development mode
    pub fn new(develop_mode: bool) -> Self {
        Self {
            secure: !develop_mode,
        }
    }

    pub fn set_refresh_cookie(&self, jar: CookieJar, token: &str, days: i64) -> CookieJar {
        jar.add(self.refresh_cookie(token, days))
    }

    /// Overwrite the cookie with an expired, empty one
    pub fn clear_refresh_cookie(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = Cookie::build((REFRESH_COOKIE_NAME, ""))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .build();
        cookie.make_removal();
        jar.add(cookie)
    }

    pub fn read_refresh_cookie(jar: &CookieJar) -> Option<String> {
        jar.get(REFRESH_COOKIE_NAME)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    fn refresh_cookie(&self, token: &str, days: i64) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE_NAME, token.to_string()))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::seconds(days.saturating_mul(SECONDS_PER_DAY)))
            .build()
    }
}
