//! Token transports: how a token reaches the client and comes back

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite as CookieSameSite};
use serde::{Deserialize, Serialize};

use crate::config::{CookieConfig, SameSite};
use crate::error::{AuthError, AuthResult};

/// Which token a bearer transport hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
}

#[derive(Debug, Clone)]
pub struct BearerTransport {
    /// Where clients obtain tokens (documentation only)
    pub token_url: String,
    pub kind: BearerKind,
}

#[derive(Debug, Clone)]
pub struct CookieTransport {
    pub config: CookieConfig,
}

#[derive(Debug, Clone)]
pub enum Transport {
    Bearer(BearerTransport),
    Cookie(CookieTransport),
}

impl Transport {
    pub fn bearer(token_url: impl Into<String>, kind: BearerKind) -> Self {
        Self::Bearer(BearerTransport {
            token_url: token_url.into(),
            kind,
        })
    }

    pub fn cookie(config: CookieConfig) -> Self {
        Self::Cookie(CookieTransport { config })
    }

    /// Response delivering `token` to the client
    pub fn get_login_response(&self, token: &str) -> AuthResult<Response> {
        match self {
            Self::Bearer(b) => {
                let body = match b.kind {
                    BearerKind::Access => BearerResponse {
                        access_token: Some(token.to_string()),
                        refresh_token: None,
                        token_type: "bearer".to_string(),
                    },
                    BearerKind::Refresh => BearerResponse {
                        access_token: None,
                        refresh_token: Some(token.to_string()),
                        token_type: "bearer".to_string(),
                    },
                };
                Ok((StatusCode::OK, Json(body)).into_response())
            }
            Self::Cookie(c) => c.set_cookie_response(token, c.config.max_age.map(|d| d.as_secs() as i64)),
        }
    }

    /// Response clearing the client's credential. Bearer tokens live on the
    /// client only, so bearer reports [`AuthError::LogoutNotSupported`].
    pub fn get_logout_response(&self) -> AuthResult<Response> {
        match self {
            Self::Bearer(_) => Err(AuthError::LogoutNotSupported),
            Self::Cookie(c) => c.set_cookie_response("", Some(0)),
        }
    }

    /// Pull the raw token out of a request
    pub fn extract_token(&self, headers: &HeaderMap) -> Option<String> {
        match self {
            Self::Bearer(_) => extract_bearer(headers),
            Self::Cookie(c) => CookieJar::from_headers(headers)
                .get(&c.config.name)
                .map(|cookie| cookie.value().to_string())
                .filter(|v| !v.is_empty()),
        }
    }
}

impl CookieTransport {
    fn build_cookie(&self, value: &str, max_age_secs: Option<i64>) -> Cookie<'static> {
        let same_site = match self.config.samesite {
            SameSite::Lax => CookieSameSite::Lax,
            SameSite::Strict => CookieSameSite::Strict,
            SameSite::None => CookieSameSite::None,
        };
        let mut builder = Cookie::build((self.config.name.clone(), value.to_string()))
            .http_only(self.config.httponly)
            .secure(self.config.secure)
            .same_site(same_site)
            .path(self.config.path.clone());
        if let Some(domain) = &self.config.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(secs) = max_age_secs {
            builder = builder.max_age(time::Duration::seconds(secs));
        }
        builder.build()
    }

    fn set_cookie_response(&self, value: &str, max_age_secs: Option<i64>) -> AuthResult<Response> {
        let cookie = self.build_cookie(value, max_age_secs);
        let header_value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| AuthError::Internal(format!("Invalid cookie header: {}", e)))?;

        let mut response = StatusCode::NO_CONTENT.into_response();
        response.headers_mut().insert(header::SET_COOKIE, header_value);
        Ok(response)
    }
}

/// Token from `Authorization: Bearer <token>`
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
