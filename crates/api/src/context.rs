use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Extensions, header};

use keygate_audit::RequestMeta;

/// Source address and user agent of the current request, for audit entries.
///
/// `X-Forwarded-For` (first hop) wins over the socket peer address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta(pub RequestMeta);

impl ClientMeta {
    pub fn from_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self(RequestMeta {
            ip_address: forwarded.or(peer),
            user_agent,
        })
    }

    pub fn into_inner(self) -> RequestMeta {
        self.0
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.extensions))
    }
}
