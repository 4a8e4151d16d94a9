use std::{
    error::Error as StdError,
    fmt::{self, Display},
};

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate's error type.
#[derive(Debug)]
pub enum Error {
    /// A `FieldId` that does not belong to the runtime it was used with.
    UnknownField(usize),
    IndexOutOfRange {
        field: String,
        index: usize,
        len: usize,
    },
    ShapeMismatch {
        field: String,
        got: usize,
        expected: usize,
    },
    EmptyField(String),
    /// A gradient was read or written on a field declared without one.
    MissingGrad(String),
    /// The tape loss must be a scalar field with a gradient.
    InvalidLoss(String),
    TapeActive,
    Diverged {
        iteration: usize,
        loss: f32,
    },
    InvalidConfig(String),
    Plot(String),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField(id) => write!(f, "unknown field id {id}"),
            Self::IndexOutOfRange { field, index, len } => {
                write!(f, "index {index} out of range for field `{field}` of length {len}")
            }
            Self::ShapeMismatch {
                field,
                got,
                expected,
            } => write!(
                f,
                "field `{field}` expects {expected} elements, got {got}"
            ),
            Self::EmptyField(name) => write!(f, "field `{name}` has no elements"),
            Self::MissingGrad(name) => {
                write!(f, "field `{name}` was declared without a gradient")
            }
            Self::InvalidLoss(name) => {
                write!(f, "loss field `{name}` must be a scalar with a gradient")
            }
            Self::TapeActive => write!(f, "a tape is already recording"),
            Self::Diverged { iteration, loss } => {
                write!(f, "loss diverged to {loss} at iteration {iteration}")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Plot(msg) => write!(f, "plotting failed: {msg}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
