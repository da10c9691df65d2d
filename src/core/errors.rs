use std::fmt;
use thiserror::Error;

/// Kind of access a module attempted on a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// Unified error type for the module system
#[derive(Debug, Error)]
pub enum RmsError {
    /// Requested element type is not in the supported set
    #[error("Unsupported element type: {dtype}")]
    UnsupportedType { dtype: String },

    /// A second producer tried to register on a gate
    #[error("Variable '{variable}' already has a producer")]
    DuplicateProducer { variable: String },

    /// Interface lookup by a name that is not present
    #[error("Unknown variable: {variable}")]
    UnknownVariable { variable: String },

    /// Malformed construction arguments
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Typed access with the wrong element type
    #[error("Type mismatch: expected {expected}, slot holds {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Scalar/array access on a slot of the other shape, or a wrong-length buffer
    #[error("Shape mismatch: expected {expected:?}, slot has {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Element index outside the slot's shape
    #[error("Index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    /// A module touched a variable it did not declare
    #[error("Module '{module}' did not declare {access} access to '{variable}'")]
    UndeclaredAccess {
        module: String,
        variable: String,
        access: Access,
    },

    /// Registration attempted after the gate started cycling
    #[error("Gate for '{variable}' is already running; registration is closed")]
    RegistrationClosed { variable: String },

    /// The wiring contains a circular wait that deadlocks on the first cycle
    #[error("Circular wait between modules: {}", cycle.join(" -> "))]
    CircularWait { cycle: Vec<String> },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Failure of the underlying signalling primitive or a worker join
    #[error("Concurrency error: {operation}")]
    Concurrency {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// User code in `setup`/`iterate` failed
    #[error("Module '{module}' failed")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// YAML/JSON configuration could not be parsed
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RmsError {
    pub fn unsupported_type<S: Into<String>>(dtype: S) -> Self {
        Self::UnsupportedType {
            dtype: dtype.into(),
        }
    }

    pub fn duplicate_producer<S: Into<String>>(variable: S) -> Self {
        Self::DuplicateProducer {
            variable: variable.into(),
        }
    }

    pub fn unknown_variable<S: Into<String>>(variable: S) -> Self {
        Self::UnknownVariable {
            variable: variable.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn undeclared<M: Into<String>, V: Into<String>>(module: M, variable: V, access: Access) -> Self {
        Self::UndeclaredAccess {
            module: module.into(),
            variable: variable.into(),
            access,
        }
    }

    pub fn registration_closed<S: Into<String>>(variable: S) -> Self {
        Self::RegistrationClosed {
            variable: variable.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a concurrency error
    pub fn concurrency<S: Into<String>>(operation: S) -> Self {
        Self::Concurrency {
            operation: operation.into(),
            source: None,
        }
    }

    /// Create a concurrency error with source
    pub fn concurrency_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        operation: S,
        source: E,
    ) -> Self {
        Self::Concurrency {
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn module<S: Into<String>>(module: S, source: anyhow::Error) -> Self {
        Self::Module {
            module: module.into(),
            source,
        }
    }

    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Setup-time errors are raised before any module cycles and mean the
    /// application wiring is wrong.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType { .. }
                | Self::DuplicateProducer { .. }
                | Self::UnknownVariable { .. }
                | Self::InvalidArgument { .. }
                | Self::RegistrationClosed { .. }
                | Self::CircularWait { .. }
                | Self::Configuration { .. }
                | Self::Serialization { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } => "unsupported_type",
            Self::DuplicateProducer { .. } => "duplicate_producer",
            Self::UnknownVariable { .. } => "unknown_variable",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::TypeMismatch { .. } | Self::ShapeMismatch { .. } | Self::IndexOutOfBounds { .. } => "slot_access",
            Self::UndeclaredAccess { .. } => "undeclared_access",
            Self::RegistrationClosed { .. } => "registration",
            Self::CircularWait { .. } => "wiring",
            Self::Configuration { .. } => "configuration",
            Self::Concurrency { .. } => "concurrency",
            Self::Module { .. } => "module",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RmsError>;

impl From<serde_yaml::Error> for RmsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<serde_json::Error> for RmsError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<tokio::sync::AcquireError> for RmsError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        Self::concurrency_with_source("semaphore_acquire", err)
    }
}
