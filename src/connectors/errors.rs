use std::fmt;

/// Failures talking to the proxy manager or the container host.
#[derive(Debug)]
pub enum ConnectorError {
    /// The remote answered with a status this controller has no better
    /// mapping for
    HttpError(String),
    /// Proxy-manager endpoint or daemon socket unreachable, or the call
    /// timed out
    ServiceUnavailable(String),
    /// Response body did not parse as the expected resource shape
    InvalidResponse(String),
    /// Token request rejected, or a cached token revoked server-side
    /// (401/403)
    Unauthorized(String),
    /// Resource id or endpoint gone (404)
    NotFound(String),
    /// The proxy manager rejected a duplicate domain or listening port
    Conflict(String),
    /// Connector-side failure that is not the remote's fault
    Internal(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError(msg) => write!(f, "unexpected HTTP response: {}", msg),
            Self::ServiceUnavailable(msg) => write!(f, "endpoint unreachable: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "unparseable response body: {}", msg),
            Self::Unauthorized(msg) => write!(f, "authentication rejected: {}", msg),
            Self::NotFound(msg) => write!(f, "no such resource: {}", msg),
            Self::Conflict(msg) => write!(f, "domain or port already taken: {}", msg),
            Self::Internal(msg) => write!(f, "connector failure: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl ConnectorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// reqwest only ever carries proxy-manager traffic here; the docker side
// goes through bollard below
impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ServiceUnavailable(format!("proxy manager did not answer in time: {}", err))
        } else if err.is_connect() {
            Self::ServiceUnavailable(format!("could not reach the proxy manager: {}", err))
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<bollard::errors::Error> for ConnectorError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => Self::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Self::HttpError(format!("container host returned {}: {}", status_code, message)),
            other => Self::ServiceUnavailable(format!("container host: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_side() {
        let err = ConnectorError::Conflict("e.test is already in use".to_string());
        assert!(format!("{err}").contains("already taken"));
        assert!(err.is_conflict());

        let err = ConnectorError::NotFound("proxy host 9".to_string());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_docker_404_maps_to_not_found() {
        let err = ConnectorError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_string(),
        });
        assert!(err.is_not_found());
    }
}
