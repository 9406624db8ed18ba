#![allow(unused_macros)]

/// Aborts the compilation with a diagnostic for a violated builder invariant
///
/// These conditions indicate a defect in the compiler itself (a node appended twice, mismatched
/// frame state shapes at a merge, an edge to a deleted node), never malformed user input, so
/// they are not turned into an [`crate::Error`].
///
/// ```rust, ignore
///  internal_error!("stack size mismatch at {} ({} vs {})", block, a, b);
/// ```
macro_rules! internal_error {
    ($msg:expr) => {
        panic!("internal compiler error: {} ({}:{})", $msg, file!(), line!())
    };

    ($fmt:expr, $($arg:tt)*) => {
        panic!(
            "internal compiler error: {} ({}:{})",
            format!($fmt, $($arg)*),
            file!(),
            line!()
        )
    };
}

/// Checks a builder invariant, aborting through [`internal_error!`] if it does not hold
///
/// ```rust, ignore
///  invariant!(node.successors.is_empty(), "deleting attached node {}", id);
/// ```
macro_rules! invariant {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            internal_error!($($arg)*);
        }
    };
}
