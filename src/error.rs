//! Error types for the SSA-to-VIL translator
//!
//! Only fatal conditions are errors. Precision loss is never reported through
//! this type: it is recovered locally and routed through
//! [`Reporter`](crate::warnings::Reporter) instead.

use thiserror::Error;

/// Translation errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Structural errors
    /// A type whose size or alignment cannot be computed
    ///
    /// **Triggered by:** loading, storing or allocating a `void`, function or opaque type
    /// **Example:** `load opaque %T, ptr %p`
    #[error("Unknown layout for type {ty}")]
    UnknownLayout {
        /// Rendered source type
        ty: String,
    },

    /// The alias oracle returned no region for a real memory access site
    #[error("No region for access site {site}")]
    RegionOracleFailure {
        /// Rendered access site
        site: String,
    },

    /// An aggregate constant whose shape disagrees with its declared type
    ///
    /// **Triggered by:** a global of type `[4 x i32]` initialized with three elements
    #[error("Initializer of global {global} does not match its type: {reason}")]
    InitializerShapeMismatch {
        /// Global variable name
        global: String,
        /// What disagreed
        reason: String,
    },

    /// An operand that cannot appear where it was found
    #[error("Invalid operand in {context}: {reason}")]
    InvalidOperand {
        /// Function or global being translated
        context: String,
        /// Description of the problem
        reason: String,
    },

    /// A direct call to a name that is neither defined nor declared
    #[error("Call to unknown function {name}")]
    UnknownFunction {
        /// Callee name
        name: String,
    },

    /// One of the sentinel-carved address ranges ran into its neighbour
    #[error("Address space exhausted: {range} range crossed {limit}")]
    AddressSpaceExhausted {
        /// Which range overflowed
        range: &'static str,
        /// Address bound that was crossed
        limit: i128,
    },

    // Configuration errors
    /// Mutually exclusive options were requested
    #[error("Conflicting options: {0}")]
    ConfigConflict(String),

    /// Options could not be parsed
    #[error("Invalid configuration: {0}")]
    ConfigParse(String),
}

/// Error classification following the translation error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input program; aborts the enclosing translation unit
    Structural,
    /// Invalid options; detected before any instruction is translated
    Configuration,
}

impl Error {
    /// Create an invalid-operand error
    pub fn invalid_operand(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidOperand {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create a shape-mismatch error for a global initializer
    pub fn shape_mismatch(global: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InitializerShapeMismatch {
            global: global.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn classify(&self) -> ErrorKind {
        match self {
            Error::ConfigConflict(_) | Error::ConfigParse(_) => ErrorKind::Configuration,
            _ => ErrorKind::Structural,
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, Error>;
