use thiserror::Error;

/// Errors raised by the hooks themselves, never by wrapped operations;
/// operation errors are arbitrary caller values and pass through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// A pending wait was abandoned via `cancel()`.
    #[error("cancelled before completion")]
    Cancelled,
    /// The hook was constructed or driven in an unsupported way.
    #[error("invalid usage: {0}")]
    Usage(String),
}
