use std::fmt;

/// Machine-readable error codes for operators and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    StoreUnavailable,
    ObjectNotFound,
    UnsupportedFileType,
    OracleFailed,
    OracleResponseInvalid,
    IndexSyncFailed,
    LockContention,
    InvalidEvent,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::StoreUnavailable => "E2001",
            Self::ObjectNotFound => "E2002",
            Self::UnsupportedFileType => "E2003",
            Self::OracleFailed => "E3001",
            Self::OracleResponseInvalid => "E3002",
            Self::IndexSyncFailed => "E4001",
            Self::LockContention => "E5002",
            Self::InvalidEvent => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Shelf not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::StoreUnavailable => "Object store unavailable",
            Self::ObjectNotFound => "Object not found",
            Self::UnsupportedFileType => "Unsupported file type",
            Self::OracleFailed => "Oracle call failed",
            Self::OracleResponseInvalid => "Oracle response could not be used",
            Self::IndexSyncFailed => "Index sync failed",
            Self::LockContention => "Lock contention",
            Self::InvalidEvent => "Invalid compaction event",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `shelf init` to create .shelf/config.toml."),
            Self::ConfigParseError => Some("Fix syntax in .shelf/config.toml and retry."),
            Self::StoreUnavailable => Some("Check the store root path and its permissions."),
            Self::ObjectNotFound => None,
            Self::UnsupportedFileType => {
                Some("Ingest accepts .pdf, .docx, .txt, .md, and .csv files.")
            }
            Self::OracleFailed => Some("Check the oracle endpoint, model, and API key."),
            Self::OracleResponseInvalid => None,
            Self::IndexSyncFailed => Some("Check the index endpoint and data source ids."),
            Self::LockContention => {
                Some("Another compaction run holds the lock; retry after it finishes.")
            }
            Self::InvalidEvent => {
                Some("Pass a JSON object such as {\"trigger\":\"manual\",\"dry_run\":true}.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
