use std::collections::BTreeMap;
use std::fmt;

use crate::field_types::FieldType;

/// Failure to match a declared custom field against account metadata.
///
/// Binding errors are fatal for the entity type that declared the field: a
/// half-bound type must not be used until the account's field configuration
/// is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// No account field matched the descriptor's id, code, or name.
    NoMatch { field: String },
    /// More than one account field matched the descriptor's code or name.
    Ambiguous { field: String, matched: usize },
    /// Exactly one field matched, but its wire type differs from the
    /// declared one. Kept distinct from `NoMatch` so callers can tell a
    /// broken binding from a missing field.
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },
    /// Two descriptors on the same entity type resolved to the same
    /// account field.
    Duplicate { field: String, id: i64 },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::NoMatch { field } => {
                write!(f, "no matching account field for '{}'", field)
            }
            BindError::Ambiguous { field, matched } => {
                write!(f, "ambiguous binding for '{}': {} fields matched", field, matched)
            }
            BindError::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "field type mismatch for '{}': declared {:?}, account has {:?}",
                field, expected, actual
            ),
            BindError::Duplicate { field, id } => {
                write!(f, "descriptor '{}' re-binds already bound field {}", field, id)
            }
        }
    }
}

/// Per-action error breakdown of one batch submission, keyed by add index
/// or by entity id for updates and deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchErrors {
    pub add: BTreeMap<usize, String>,
    pub update: BTreeMap<i64, String>,
    pub delete: BTreeMap<i64, String>,
}

impl BatchErrors {
    pub fn total(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Aggregated mutation failure, raised only when the caller opted into
/// fail-fast mode. Partial results are already applied to the submitted
/// objects before this is returned; each failed object also carries its
/// message in `meta`.
#[derive(Debug, Clone)]
pub struct PostError {
    pub model: &'static str,
    pub message: String,
    pub errors: BatchErrors,
}

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "post failed for {}: {} ({} object errors)",
            self.model,
            self.message,
            self.errors.total()
        )
    }
}

/// Library error type.
#[derive(Debug)]
pub enum ApiError {
    /// Custom field metadata resolution failed.
    Bind(BindError),
    /// A wire value violates the expected envelope for its field type.
    Format(String),
    /// Container lookup for an id or name with no bound field.
    UnknownField(String),
    /// Container lookup by a name shared by more than one bound field.
    AmbiguousField(String),
    /// The response cannot be trusted (e.g. item count mismatch) and was
    /// not applied.
    Client(String),
    /// Aggregated per-object mutation failures (opt-in fail-fast).
    Post(PostError),
    /// Authentication failed or the session could not be re-established.
    Auth { ident: String, message: String },
    /// Any non-auth HTTP error, propagated unchanged.
    Http { status: u16, body: String },
    /// Connection-level failure from the HTTP client.
    Transport(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Bind(e) => write!(f, "custom field binding failed: {}", e),
            ApiError::Format(msg) => write!(f, "wire format error: {}", msg),
            ApiError::UnknownField(msg) => write!(f, "unknown custom field: {}", msg),
            ApiError::AmbiguousField(msg) => write!(f, "ambiguous custom field name: {}", msg),
            ApiError::Client(msg) => write!(f, "client error: {}", msg),
            ApiError::Post(e) => write!(f, "{}", e),
            ApiError::Auth { ident, message } => {
                write!(f, "authentication failed for {}: {}", ident, message)
            }
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<BindError> for ApiError {
    fn from(err: BindError) -> Self {
        ApiError::Bind(err)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}
