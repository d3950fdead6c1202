//! Error types for the Authentik adapter and the MCP server wrapper.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use axum::http::StatusCode;

/// Errors from the outbound HTTP client layer.
///
/// These only describe requests that failed before a response arrived. A
/// non-2xx response is returned to the caller as an ordinary
/// [`HttpResponse`](crate::client::HttpResponse).
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// HTTP transport error (connection, DNS, TLS, body read, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
}

/// Errors from the identity provider adapter.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The provider's OpenID configuration could not be retrieved.
    #[error("Failed to fetch OAuth configuration from Authentik: {0}")]
    Discovery(String),

    /// The token endpoint rejected a code or refresh exchange.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The userinfo call failed for a reason other than an invalid token.
    #[error("Failed to verify access token: {0}")]
    Verification(String),

    /// A login profile lacked an identifier or login name.
    #[error("Invalid profile data: {0}")]
    InvalidProfile(String),

    /// The user is not a member of any allowed group.
    #[error("User {user} not in allowed groups")]
    AccessDenied {
        /// Resolved user identifier
        user: String,
    },

    /// Dynamic registration was requested without a registration API token.
    #[error("Dynamic registration requires API token configuration")]
    RegistrationNotConfigured,

    /// The requested operation is a declared but unimplemented extension point.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The provider has not finished initializing.
    #[error("Auth system initializing")]
    NotInitialized,

    /// Provider configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    /// Create a discovery error.
    #[must_use]
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery(message.into())
    }

    /// Create a token exchange error.
    #[must_use]
    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchange(message.into())
    }

    /// Create a verification error.
    #[must_use]
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification(message.into())
    }

    /// Create an invalid profile error.
    #[must_use]
    pub fn invalid_profile(message: impl Into<String>) -> Self {
        Self::InvalidProfile(message.into())
    }

    /// Create an access denied error.
    #[must_use]
    pub fn access_denied(user: impl Into<String>) -> Self {
        Self::AccessDenied { user: user.into() }
    }

    /// HTTP status used when this error reaches an HTTP-facing route.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidProfile(_) | Self::AccessDenied { .. } => StatusCode::UNAUTHORIZED,
            Self::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message safe to show to an HTTP client.
    ///
    /// Never includes provider URLs or upstream response bodies.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "Authentication provider unavailable",
            Self::TokenExchange(_) => "Failed to exchange authorization code",
            Self::Verification(_) => "Failed to verify access token",
            Self::InvalidProfile(_) => "Invalid profile data",
            Self::AccessDenied { .. } => "User not in allowed groups",
            Self::RegistrationNotConfigured => {
                "Dynamic registration requires API token configuration"
            }
            Self::NotImplemented(_) => "Dynamic registration not yet implemented for this client",
            Self::NotInitialized => "Auth system initializing",
            Self::InvalidConfig(_) => "Authentication misconfigured",
        }
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal tool logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Convert to a user-friendly error message for MCP response.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            Self::NotFound(what) => format!("Not found: {what}"),
            _ => self.to_string(),
        }
    }
}

/// Errors from the MCP server lifecycle.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("No transports configured. Use use_transport() to add transports.")]
    NoTransports,

    #[error("Cannot add transport after server has started")]
    TransportAfterStart,

    #[error("Server already started")]
    AlreadyStarted,

    #[error("Server not started")]
    NotStarted,

    /// A tool, resource, or prompt with this name already exists.
    #[error("{kind} '{name}' is already registered")]
    DuplicateRegistration {
        /// "Tool", "Resource" or "Prompt"
        kind: &'static str,
        /// Registered name
        name: String,
    },

    /// A transport failed to start or stop.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Result type alias for adapter operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Result type alias for server lifecycle operations.
pub type ServerResult<T> = Result<T, ServerError>;
