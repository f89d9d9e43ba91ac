//! Provider errors.
//!
//! One error type serves the Google path (OAuth, token file, events API) and
//! the EFA path (stop finder, departure monitor). The code tells callers what
//! kind of failure happened; the credential manager only ever branches on
//! [`ProviderError::is_authentication`].

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Google rejected the credential or the refresh.
    AuthenticationFailed,
    /// The account may not read the calendar.
    AuthorizationFailed,
    /// No usable HTTP exchange: connect, timeout, body read.
    NetworkError,
    /// Non-success HTTP status other than 401/403.
    ServerError,
    /// Body is not JSON or has the wrong shape.
    InvalidResponse,
    /// Credentials file or settings unusable.
    ConfigurationError,
    /// No consent flow could reach the operator.
    Interaction,
    InternalError,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::ConfigurationError => "configuration_error",
            Self::Interaction => "interaction",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed provider call, optionally tagged with `"google"` or `"efa"`.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    provider: Option<&'static str>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn interaction(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Interaction, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Tags the error with the provider it came from. The first tag sticks.
    pub fn with_provider(mut self, provider: &'static str) -> Self {
        self.provider.get_or_insert(provider);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Maps a reqwest send failure to a network error.
    pub fn from_request(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            format!("request failed: {}", err)
        };
        Self::network(message).with_source(err)
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider
    }

    /// Whether Google rejected the credential.
    pub fn is_authentication(&self) -> bool {
        self.code == ProviderErrorCode::AuthenticationFailed
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_refresh_is_authentication() {
        let err = ProviderError::authentication("token refresh failed (400 Bad Request)");
        assert!(err.is_authentication());
        assert_eq!(err.code().as_str(), "authentication_failed");
        assert!(err.provider().is_none());
        assert!(!ProviderError::authorization("403").is_authentication());
    }

    #[test]
    fn display_carries_provider_and_code() {
        let err = ProviderError::invalid_response("XML_DM_REQUEST returned invalid JSON")
            .with_provider("efa");
        assert_eq!(
            err.to_string(),
            "[efa] invalid_response: XML_DM_REQUEST returned invalid JSON"
        );
    }

    #[test]
    fn first_provider_tag_sticks() {
        let err = ProviderError::network("timed out")
            .with_provider("efa")
            .with_provider("google");
        assert_eq!(err.provider(), Some("efa"));
    }

    #[test]
    fn source_is_kept() {
        use std::error::Error;
        let err = ProviderError::configuration("cannot write token.json")
            .with_source(std::io::Error::other("read-only file system"));
        assert_eq!(err.source().unwrap().to_string(), "read-only file system");
    }
}
