//! AWS provider error types

use stackflow_cloud::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    AwsCliNotFound,

    #[error("aws command failed ({code}): {message}")]
    CommandFailed { code: String, message: String },

    #[error("Unexpected aws output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// Provider error code (e.g. `NoSuchBucket`), when the CLI reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::CommandFailed { code, .. } if !code.is_empty() => Some(code),
            _ => None,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    pub fn is_not_found(&self) -> bool {
        self.code()
            .is_some_and(|code| classify(code, "").is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Codes that mean "the resource (or sub-resource) does not exist"
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFoundException",
    "NotFoundException",
    "NotFound",
    "404",
];

const IN_USE_CODES: &[&str] = &[
    "OriginAccessControlInUse",
    "DistributionNotDisabled",
    "BucketNotEmpty",
    "ResourceInUseException",
    "HostedZoneNotEmpty",
];

const CONFLICT_CODES: &[&str] = &["PreconditionFailed", "InvalidIfMatchVersion", "412"];

const ALREADY_EXISTS_CODES: &[&str] = &[
    "BucketAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "OriginAccessControlAlreadyExists",
    "DistributionAlreadyExists",
    "InvalidationBatchAlreadyExists",
    "ResourceAlreadyExistsException",
];

const PERMISSION_CODES: &[&str] = &[
    "403",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
    "SignatureDoesNotMatch",
];

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
    "PriorRequestNotComplete",
    "TooManyInvalidationsInProgress",
    "SlowDown",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalError",
    "InternalFailure",
    "InternalServerError",
    "RequestTimeout",
];

const INVALID_ARGUMENT_CODES: &[&str] = &[
    "ValidationError",
    "ValidationException",
    "InvalidArgument",
    "InvalidParameterValue",
    "InvalidParameterException",
    "InvalidRequest",
    "InvalidInput",
    "InvalidChangeBatch",
    "IllegalUpdate",
    "MalformedPolicy",
    "MalformedXML",
    "InvalidDomainValidationOptionsException",
    "InvalidViewerCertificate",
    "CNAMEAlreadyExists",
    "400",
];

/// Map a provider error code and message onto the normalized taxonomy
pub fn classify(code: &str, message: &str) -> ClientError {
    let message = message.to_string();

    if code.starts_with("NoSuch") || NOT_FOUND_CODES.contains(&code) {
        return ClientError::NotFound(message);
    }
    if IN_USE_CODES.contains(&code) {
        return ClientError::InUse(message);
    }
    if CONFLICT_CODES.contains(&code) {
        return ClientError::Conflict {
            expected_version: None,
            message,
        };
    }
    if ALREADY_EXISTS_CODES.contains(&code) {
        return ClientError::AlreadyExists(message);
    }
    if code.starts_with("AccessDenied") || PERMISSION_CODES.contains(&code) {
        return ClientError::PermissionDenied(message);
    }
    if TRANSIENT_CODES.contains(&code) || (code.len() == 3 && code.starts_with('5')) {
        return ClientError::Transient(message);
    }
    if INVALID_ARGUMENT_CODES.contains(&code) {
        return ClientError::InvalidArgument(message);
    }
    if code.is_empty() {
        return classify_message(message);
    }
    ClientError::Provider(message)
}

/// Failures the CLI reports without a service error code
fn classify_message(message: String) -> ClientError {
    let lower = message.to_lowercase();
    if lower.contains("unable to locate credentials") || lower.contains("token has expired") {
        ClientError::PermissionDenied(message)
    } else if lower.contains("could not connect to the endpoint")
        || lower.contains("connect timeout")
        || lower.contains("read timeout")
    {
        ClientError::Transient(message)
    } else if lower.contains("could not be found") || lower.contains("invalid choice") {
        ClientError::InvalidArgument(message)
    } else {
        ClientError::Provider(message)
    }
}

impl From<AwsError> for ClientError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::CommandFailed { code, message } => classify(&code, &message),
            AwsError::AwsCliNotFound => ClientError::InvalidArgument(err.to_string()),
            other => ClientError::Provider(other.to_string()),
        }
    }
}
