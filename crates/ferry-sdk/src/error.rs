//! Error types shared by every ferry crate

/// Result type for interop operations
pub type InteropResult<T> = Result<T, InteropError>;

/// Errors raised while marshaling a call across the boundary.
///
/// At a generated thunk these are never returned to the caller directly;
/// they are handed to the calling runtime's throw primitive.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InteropError {
    /// Malformed packed argument data
    #[error("Malformed packed data: {0}")]
    Packed(#[from] PackedError),

    /// Registry lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Caller-supplied buffer cannot hold the result
    #[error("Buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        capacity: usize,
    },

    /// Payload longer than its wire length field can express
    #[error("Payload of {length} bytes exceeds the {limit}-byte wire limit")]
    TooLarge {
        /// Payload length
        length: usize,
        /// Largest length the wire carries
        limit: usize,
    },

    /// Operation the current runtime cannot perform
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Implementation panicked inside a thunk
    #[error("Function '{name}' panicked: {message}")]
    Panic {
        /// Export name
        name: &'static str,
        /// Panic payload rendered as text
        message: String,
    },

    /// Generic failure with a message
    #[error("{0}")]
    Message(String),
}

impl From<String> for InteropError {
    fn from(s: String) -> Self {
        InteropError::Message(s)
    }
}

impl From<&str> for InteropError {
    fn from(s: &str) -> Self {
        InteropError::Message(s.to_string())
    }
}

/// Errors from validated packed-array decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackedError {
    /// Buffer ended before the 4-byte count header
    #[error("missing count header ({len} bytes available)")]
    MissingHeader {
        /// Buffer length
        len: usize,
    },

    /// An entry's length prefix or body runs past the end of the buffer
    #[error("entry {index} at offset {offset} overruns buffer of {len} bytes")]
    Truncated {
        /// Entry index
        index: usize,
        /// Offset of the entry's length prefix
        offset: usize,
        /// Buffer length
        len: usize,
    },
}

/// Errors from the module/method registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No override and no default classpath for a module
    #[error("Classpath for module {module} was not registered")]
    ClasspathNotFound {
        /// Module name
        module: String,
    },

    /// Module has no registered methods
    #[error("Module {0} has no registered methods")]
    UnknownModule(String),
}

/// Log at error level and terminate the process.
///
/// Reserved for conditions the boundary has no calling convention to report:
/// allocation failure, missing required configuration, and errors raised in
/// flavors without an exception channel.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        $crate::__private::log::error!($($arg)*);
        ::std::process::abort()
    }};
}
