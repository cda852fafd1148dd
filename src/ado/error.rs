use thiserror::Error;

/// What went wrong below the domain layer, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The service answered with a non-2xx status.
    Status { code: u16, body: String },
    /// No usable response: connect error, timeout, broken stream.
    Connection(String),
    /// A 2xx response whose payload could not be decoded.
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdoError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Authorization failed: {0}")]
    Authorization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Malformed query: {0}")]
    MalformedQuery(String),
    #[error("Parsing error: {0}")]
    Parsing(String),
    #[error("{}", transport_message(.code, .message))]
    Transport { code: Option<u16>, message: String },
}

fn transport_message(code: &Option<u16>, message: &str) -> String {
    match code {
        Some(code) => format!("Azure DevOps API error (HTTP {code}): {message}"),
        None => format!("Azure DevOps request failed: {message}"),
    }
}

impl AdoError {
    pub fn parsing(message: impl Into<String>) -> Self {
        AdoError::Parsing(message.into())
    }
}

/// Map a transport failure onto the domain taxonomy.
pub fn classify(failure: TransportFailure, project: &str) -> AdoError {
    match failure {
        TransportFailure::Status { code: 401, .. } => AdoError::Authentication(
            "personal access token is invalid or expired".into(),
        ),
        TransportFailure::Status { code: 403, .. } => AdoError::Authorization(
            "token lacks read permission for work items".into(),
        ),
        TransportFailure::Status { code: 404, .. } => {
            AdoError::NotFound(format!("project '{project}' not found or not accessible"))
        }
        TransportFailure::Status { code: 400, body } => AdoError::MalformedQuery(body),
        TransportFailure::Status { code, body } => AdoError::Transport {
            code: Some(code),
            message: body,
        },
        TransportFailure::Connection(message) => AdoError::Transport {
            code: None,
            message,
        },
        TransportFailure::Decode(message) => AdoError::Parsing(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, body: &str) -> TransportFailure {
        TransportFailure::Status {
            code,
            body: body.into(),
        }
    }

    #[test]
    fn auth_codes() {
        assert!(matches!(
            classify(status(401, ""), "Fabrikam"),
            AdoError::Authentication(_)
        ));
        assert!(matches!(
            classify(status(403, ""), "Fabrikam"),
            AdoError::Authorization(_)
        ));
    }

    #[test]
    fn not_found_names_the_project() {
        let err = classify(status(404, "gone"), "Fabrikam");
        assert!(matches!(err, AdoError::NotFound(_)));
        assert!(err.to_string().contains("Fabrikam"));
    }

    #[test]
    fn bad_request_carries_server_body() {
        let err = classify(status(400, "TF51005: The query references a field"), "P");
        assert_eq!(
            err,
            AdoError::MalformedQuery("TF51005: The query references a field".into())
        );
    }

    #[test]
    fn other_codes_are_generic_transport_errors() {
        let err = classify(status(503, "Service Unavailable"), "P");
        assert_eq!(
            err,
            AdoError::Transport {
                code: Some(503),
                message: "Service Unavailable".into()
            }
        );
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn connection_failure_has_no_code() {
        let err = classify(TransportFailure::Connection("timed out".into()), "P");
        assert!(matches!(err, AdoError::Transport { code: None, .. }));
    }

    #[test]
    fn decode_failure_is_parsing() {
        let err = classify(TransportFailure::Decode("expected value".into()), "P");
        assert!(matches!(err, AdoError::Parsing(_)));
    }
}
