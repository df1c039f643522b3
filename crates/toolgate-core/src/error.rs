//! Descriptor validation errors.

use thiserror::Error;

/// Errors raised while validating a [`crate::ServerDescriptor`].
///
/// Configuration parsing and persistence live outside this core; by the time
/// a descriptor reaches us it is structurally well-formed JSON, so the only
/// failures left are semantic ones.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The descriptor has an empty or whitespace-only name.
    #[error("Server name cannot be empty")]
    EmptyName,

    /// A stdio descriptor has no command to spawn.
    #[error("Stdio server '{0}' requires a command")]
    MissingCommand(String),

    /// A stdio command contains whitespace (flags belong in args).
    #[error(
        "Command for '{0}' must be an executable name/path only. \
         Put flags and arguments in the 'args' field."
    )]
    CommandWithArguments(String),

    /// An HTTP descriptor has no endpoint URL.
    #[error("HTTP server '{0}' requires a url")]
    MissingUrl(String),

    /// An HTTP endpoint is not an http(s) URL.
    #[error("HTTP server '{0}' has an invalid url: {1}")]
    InvalidUrl(String, String),

    /// The retry policy is unusable (zero attempts or zero backoff).
    #[error("Invalid retry policy for '{0}': {1}")]
    InvalidRetryPolicy(String, String),
}
