use std::fmt;

/// Coarse classification shared by every error the core returns. Callers use
/// it to pick a user-facing message; the concrete error keeps the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced project or task does not exist.
    NotFound,
    /// Input violated a declared bound; nothing was written.
    ValidationFailure,
    /// The actor is not allowed to perform the operation.
    PermissionDenied,
    /// The text-generation backend answered with the wrong shape.
    SchemaViolation,
    /// The store or the text-generation backend failed or was unreachable.
    TransportFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::ValidationFailure => "validation failure",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::SchemaViolation => "schema violation",
            ErrorKind::TransportFailure => "transport failure",
        };
        f.write_str(label)
    }
}
