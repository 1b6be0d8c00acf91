use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use keygate_auth::AuthError;
use keygate_core::DomainError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthenticated => unauthenticated(),
        DomainError::Forbidden => forbidden(),
        DomainError::Unavailable(msg) => {
            tracing::error!(error = %msg, "store unavailable");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "service temporarily unavailable",
            )
        }
    }
}

/// Login failures never say which factor was wrong.
pub fn login_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials | AuthError::InvalidToken => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid email or password",
        ),
        other => domain_error_to_response(other.into()),
    }
}

pub fn refresh_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials | AuthError::InvalidToken => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "invalid or expired refresh token",
        ),
        other => domain_error_to_response(other.into()),
    }
}

pub fn unauthenticated() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
}

pub fn forbidden() -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "required role not met")
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into an id newtype, answering 400 on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse().map_err(domain_error_to_response)
}
