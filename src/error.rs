use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Builds an [`Error::Argument`] for the named parameter.
macro_rules! argument_error {
    ($param:expr, $msg:expr) => {
        crate::Error::Argument {
            param: $param,
            message: $msg.to_string(),
        }
    };

    ($param:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Argument {
            param: $param,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which covers every failure this library can return through
/// the `Err` channel.
///
/// Problems with the *program being compiled* (bad options, unresolved names, unreadable
/// resources) are never reported through this type. Those are
/// [`crate::diagnostics::Diagnostic`] values collected in a bag and handed back through
/// [`crate::emit::EmitResult`] or [`crate::Compilation::get_diagnostics`]. This enum is
/// reserved for caller bugs and for cooperative cancellation.
///
/// # Error Categories
///
/// ## Contract Violations
/// - [`Error::ArgumentNull`] - A required input was absent
/// - [`Error::Argument`] - A structurally invalid input (negative arity, mismatched lengths, foreign reference)
/// - [`Error::ArgumentOutOfRange`] - An index outside the valid range
/// - [`Error::InvalidOperation`] - The object is in a state that does not permit the call
///
/// ## Control
/// - [`Error::Cancelled`] - A [`crate::utils::CancellationToken`] was signalled
/// - [`Error::RecursionLimit`] - A tree walk exceeded the configured depth
///
/// ## Internal
/// - [`Error::Malformed`] - Internal data failed a structural check
/// - [`Error::LockError`] - A poisoned lock was observed
/// - [`Error::Io`] - I/O error from a caller-provided stream or file
///
/// # Examples
///
/// ```rust
/// use dotcompile::Error;
///
/// fn describe(err: &Error) -> &'static str {
///     match err {
///         Error::Cancelled => "operation abandoned",
///         Error::Argument { .. } | Error::ArgumentNull(_) => "caller bug",
///         _ => "other",
///     }
/// }
///
/// assert_eq!(describe(&Error::Cancelled), "operation abandoned");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was not provided.
    ///
    /// The payload names the parameter.
    #[error("Value cannot be null (parameter '{0}')")]
    ArgumentNull(&'static str),

    /// An argument was structurally invalid.
    ///
    /// # Fields
    ///
    /// * `param` - Name of the offending parameter
    /// * `message` - Description of what was wrong with it
    #[error("{message} (parameter '{param}')")]
    Argument {
        /// Name of the offending parameter
        param: &'static str,
        /// Description of the problem
        message: String,
    },

    /// An index was outside the bounds of a collection.
    #[error("Index {index} is out of range for length {len} (parameter '{param}')")]
    ArgumentOutOfRange {
        /// Name of the offending parameter
        param: &'static str,
        /// The rejected index
        index: usize,
        /// Length of the collection at the time of the call
        len: usize,
    },

    /// The call is not valid for the current state of the object.
    ///
    /// Used for state-machine misuse such as keying an unkeyable reference, writing to
    /// a frozen table, or asking a regular compilation for script-only data.
    #[error("Operation is not valid: {0}")]
    InvalidOperation(String),

    /// The operation was abandoned because cancellation was requested.
    ///
    /// This is neither a compile error nor a caller bug. Callers should treat the
    /// result as "not computed".
    #[error("The operation was cancelled")]
    Cancelled,

    /// A recursive traversal exceeded its depth guard.
    ///
    /// Raised by [`crate::operations::OperationWalker`] on pathologically deep trees
    /// instead of exhausting the stack.
    #[error("Reached the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Internal data failed a structural check.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Failed to lock a shared resource.
    #[error("Failed to lock target")]
    LockError,

    /// I/O error while reading or writing a caller-provided stream.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error signals cooperative cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
