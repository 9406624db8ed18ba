//! The method under compilation.

use std::sync::Arc;

use crate::{
    meta::{ConstantPool, MethodRef, TypeRef},
    Result,
};

/// One row of a method's exception table.
///
/// Rows are kept in declaration order; that order decides which handler catches when ranges
/// overlap.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionHandlerEntry {
    /// First covered bci (inclusive)
    pub start_bci: i32,
    /// End of the covered range (exclusive)
    pub end_bci: i32,
    /// Entry bci of the handler code
    pub handler_bci: i32,
    /// Caught type, `None` for a catch-all (`finally`)
    pub catch_type: Option<TypeRef>,
}

impl ExceptionHandlerEntry {
    /// Creates a handler row.
    #[must_use]
    pub fn new(start_bci: i32, end_bci: i32, handler_bci: i32, catch_type: Option<TypeRef>) -> Self {
        ExceptionHandlerEntry {
            start_bci,
            end_bci,
            handler_bci,
            catch_type,
        }
    }

    /// Returns `true` if `bci` lies within `[start_bci, end_bci)`.
    #[must_use]
    #[inline]
    pub fn covers(&self, bci: i32) -> bool {
        self.start_bci <= bci && bci < self.end_bci
    }

    /// Returns `true` for handlers catching every exception.
    #[must_use]
    #[inline]
    pub fn is_catch_all(&self) -> bool {
        self.catch_type.is_none()
    }
}

/// Everything the graph builder needs to know about one method: its descriptor, bytecode,
/// frame sizes, exception table and the constant pool its instructions index into.
#[derive(Clone)]
pub struct MethodInfo {
    /// The method descriptor (holder, name, signature, access flags)
    pub method: MethodRef,
    /// Raw bytecode
    pub code: Vec<u8>,
    /// Number of local variable slots
    pub max_locals: usize,
    /// Maximum operand stack depth
    pub max_stack: usize,
    /// Exception table in declaration order
    pub handlers: Vec<ExceptionHandlerEntry>,
    /// The constant pool referenced by the bytecode
    pub pool: Arc<dyn ConstantPool>,
}

impl MethodInfo {
    /// Creates a method without exception handlers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the code is empty or the declared local count
    /// cannot hold the receiver and the arguments.
    pub fn new(
        method: MethodRef,
        code: Vec<u8>,
        max_locals: usize,
        max_stack: usize,
        pool: Arc<dyn ConstantPool>,
    ) -> Result<Self> {
        if code.is_empty() {
            return Err(malformed_error!(
                "Method {} has no code",
                method.qualified_name()
            ));
        }

        let needed = method.signature().argument_slots(!method.is_static());
        if needed > max_locals {
            return Err(malformed_error!(
                "Method {} needs {} local slots for its arguments, max_locals is {}",
                method.qualified_name(),
                needed,
                max_locals
            ));
        }

        Ok(MethodInfo {
            method,
            code,
            max_locals,
            max_stack,
            handlers: Vec::new(),
            pool,
        })
    }

    /// Appends an exception table row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the range is empty or any bci lies outside the
    /// code.
    pub fn with_handler(mut self, handler: ExceptionHandlerEntry) -> Result<Self> {
        let len = self.code_len();
        let in_code = |bci: i32| bci >= 0 && bci < len;
        if handler.start_bci >= handler.end_bci
            || !in_code(handler.start_bci)
            || handler.end_bci > len
            || !in_code(handler.handler_bci)
        {
            return Err(malformed_error!(
                "Invalid exception handler [{}, {}) -> {} in code of length {}",
                handler.start_bci,
                handler.end_bci,
                handler.handler_bci,
                len
            ));
        }
        self.handlers.push(handler);
        Ok(self)
    }

    /// Code length in bytes, as a bci.
    #[must_use]
    pub fn code_len(&self) -> i32 {
        i32::try_from(self.code.len()).unwrap_or(i32::MAX)
    }

    /// `"holder.name descriptor"` of the method.
    #[must_use]
    pub fn name(&self) -> String {
        self.method.qualified_name()
    }
}

impl std::fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInfo")
            .field("method", &self.method.qualified_name())
            .field("code_len", &self.code.len())
            .field("max_locals", &self.max_locals)
            .field("max_stack", &self.max_stack)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
