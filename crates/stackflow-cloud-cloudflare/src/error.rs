//! Cloudflare provider error types

use stackflow_cloud::ClientError;
use thiserror::Error;

/// API error codes for "an identical record already exists"
const RECORD_EXISTS_CODES: &[i64] = &[81053, 81057, 81058];

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Cloudflare API error (HTTP {status}): {message}")]
    ApiError {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("DNS record has no id: {0}")]
    MissingRecordId(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudflareError>;

/// Map an HTTP status (and API error code) onto the normalized taxonomy
pub fn classify_status(status: u16, code: Option<i64>, message: String) -> ClientError {
    if code.is_some_and(|c| RECORD_EXISTS_CODES.contains(&c)) {
        return ClientError::AlreadyExists(message);
    }
    match status {
        401 | 403 => ClientError::PermissionDenied(message),
        404 => ClientError::NotFound(message),
        409 => ClientError::Conflict {
            expected_version: None,
            message,
        },
        429 | 500..=599 => ClientError::Transient(message),
        400..=499 => ClientError::InvalidArgument(message),
        _ => ClientError::Provider(message),
    }
}

impl From<CloudflareError> for ClientError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::ApiError {
                status,
                code,
                message,
            } => classify_status(status, code, message),
            CloudflareError::ZoneNotFound(zone) => ClientError::NotFound(zone),
            CloudflareError::MissingEnvVar(_) | CloudflareError::MissingRecordId(_) => {
                ClientError::InvalidArgument(err.to_string())
            }
            CloudflareError::HttpError(e) if e.is_timeout() || e.is_connect() => {
                ClientError::Transient(e.to_string())
            }
            other => ClientError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(401, None, "Invalid API Token".into()),
            ClientError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(403, None, "Authentication error".into()),
            ClientError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(404, Some(81044), "Record does not exist.".into()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(409, None, "conflict".into()),
            ClientError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(429, None, "rate limited".into()),
            ClientError::Transient(_)
        ));
        assert!(matches!(
            classify_status(502, None, "bad gateway".into()),
            ClientError::Transient(_)
        ));
        assert!(matches!(
            classify_status(400, Some(9005), "Content for A record is invalid.".into()),
            ClientError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_identical_record_is_already_exists() {
        assert!(matches!(
            classify_status(400, Some(81058), "An identical record already exists.".into()),
            ClientError::AlreadyExists(_)
        ));
    }
}
