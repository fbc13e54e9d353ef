use crate::server::CookiePolicy;
use cookie::{Cookie, SameSite};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// `Set-Cookie` value carrying a refresh token.
pub fn refresh_cookie(token: &str, policy: &CookiePolicy) -> String {
    let max_age = i64::try_from(policy.max_age.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((REFRESH_COOKIE, token.to_string()))
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .build()
        .to_string()
}

/// `Set-Cookie` value that makes the client drop its refresh token.
pub fn clear_refresh_cookie(policy: &CookiePolicy) -> String {
    Cookie::build((REFRESH_COOKIE, ""))
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(-1))
        .build()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(secure: bool) -> CookiePolicy {
        CookiePolicy {
            secure,
            max_age: Duration::from_secs(604800),
        }
    }

    #[test]
    fn refresh_cookie_attributes() {
        let header = refresh_cookie("abc", &policy(false));
        assert!(header.starts_with("refresh_token=abc"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=604800"));
        assert!(!header.contains("Secure"));

        assert!(refresh_cookie("abc", &policy(true)).contains("Secure"));
    }

    #[test]
    fn clearing_cookie_expires_immediately() {
        let header = clear_refresh_cookie(&policy(true));
        assert!(header.starts_with("refresh_token=;"));
        assert!(header.contains("Max-Age=-1"));
        assert!(header.contains("Secure"));
    }
}
