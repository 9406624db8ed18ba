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

macro_rules! bailout {
    // Single string version
    ($msg:expr) => {
        crate::Error::Bailout {
            reason: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Bailout {
            reason: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two tiers. A [`Error::Bailout`] means that the method being compiled cannot
/// be handled by this pipeline (unsupported opcodes, size limits, malformed monitor usage) and
/// the caller should fall back to an interpreter or a simpler tier. All other variants describe
/// problems with the inputs handed to the collaborators (bytecode stream, constant pool,
/// signatures) or with the configuration.
///
/// Violations of the builder's own invariants are not represented here: they indicate a defect
/// in the compiler and abort through a panic carrying the offending node ids and bytecode index.
///
/// # Error Categories
///
/// ## Compilation Errors
/// - [`Error::Bailout`] - Compilation of this method was abandoned
///
/// ## Input Errors
/// - [`Error::Malformed`] - Corrupted or invalid bytecode, signature or handler table
/// - [`Error::Unresolved`] - A constant pool index has no entry
///
/// ## Setup Errors
/// - [`Error::Config`] - Invalid compiler configuration
///
/// ## Verification Errors
/// - [`Error::GraphError`] - A constructed graph failed a structural check
///
/// # Examples
///
/// ```rust,ignore
/// use bcgraph::{CompilerConfig, DefaultRuntime, Error, Ir};
///
/// match Ir::build(&method, &DefaultRuntime, &CompilerConfig::default()) {
///     Ok(ir) => println!("{} blocks", ir.stats().blocks),
///     Err(Error::Bailout { reason }) => eprintln!("not compilable: {reason}"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Compilation of the current method was abandoned.
    ///
    /// Raised for conditions that make compiling this particular method infeasible, for
    /// example `jsr`/`ret` subroutines, a monitor stack underflow, exceeding the configured
    /// instruction cap or an opcode the builder does not handle. The whole build unwinds and no
    /// partial graph is returned.
    ///
    /// # Fields
    ///
    /// * `reason` - Human readable abort reason
    #[error("Bailout - {reason}")]
    Bailout {
        /// The reason this compilation was abandoned
        reason: String,
    },

    /// The input is damaged and could not be decoded.
    ///
    /// Used by the bytecode stream, the block map and the signature parser. The error includes
    /// the source location where the malformation was detected for debugging purposes.
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

    /// A constant pool lookup referenced an index without an entry, or an entry of the wrong
    /// sort (for example a method reference where a field was expected).
    #[error("Unresolvable constant pool entry - {0}")]
    Unresolved(String),

    /// The compiler configuration is not usable.
    #[error("Invalid configuration - {0}")]
    Config(String),

    /// A structural check of a constructed graph failed.
    ///
    /// Reported by [`crate::ir::Graph::verify`] and [`crate::Ir::verify`], which tests and
    /// debugging sessions use to validate edge symmetry and frame state shapes.
    #[error("Graph verification failed - {0}")]
    GraphError(String),
}

impl Error {
    /// Returns `true` if this error is a bailout, i.e. the method is simply not compilable by
    /// this pipeline.
    #[must_use]
    pub fn is_bailout(&self) -> bool {
        matches!(self, Error::Bailout { .. })
    }

    /// Returns the bailout reason, if this is a bailout.
    #[must_use]
    pub fn bailout_reason(&self) -> Option<&str> {
        match self {
            Error::Bailout { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}
