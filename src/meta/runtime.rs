//! Queries the graph builder asks the virtual machine.

use crate::meta::{Constant, JavaType, Kind, MethodRef, TypeRef};

/// Runtime services used during graph construction.
///
/// Implementations are shared between concurrent compilations and must be thread safe. Every
/// method has a default that answers conservatively, so an embedder only overrides what its
/// runtime actually knows.
pub trait Runtime: Send + Sync {
    /// Resolves the implementation of `method` invoked on a receiver whose runtime type is
    /// exactly `exact`. Returns `None` when the runtime cannot tell.
    ///
    /// The default finds the method only when `exact` is the method's own holder.
    fn resolve_method_impl(&self, exact: &TypeRef, method: &MethodRef) -> Option<MethodRef> {
        (exact.name() == method.holder().name() && !method.is_abstract()).then(|| method.clone())
    }

    /// Returns the runtime type of an object constant, if known.
    fn type_of_constant(&self, _constant: &Constant) -> Option<TypeRef> {
        None
    }

    /// Looks up the loaded type named by a field descriptor (`Ljava/lang/String;`, `[I`).
    ///
    /// The default knows only primitive arrays, which are always loaded and never subclassed.
    fn lookup_type(&self, descriptor: &str) -> Option<TypeRef> {
        match descriptor.as_bytes() {
            [b'[', element] if Kind::from_type_char(*element).is_some_and(Kind::is_primitive) => {
                Some(JavaType::class(descriptor).into_ref())
            }
            _ => None,
        }
    }

    /// Size in bytes of the on-stack lock record used by monitor operations. A non-zero size
    /// makes the builder materialize a `MonitorAddress` for every monitor operation.
    fn size_of_basic_object_lock(&self) -> usize {
        0
    }
}

/// A runtime without type information beyond the descriptors themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRuntime;

impl Runtime for DefaultRuntime {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{AccessFlags, JavaMethod, JavaType, Signature};

    #[test]
    fn test_default_resolution() {
        let holder = JavaType::class("A").into_ref();
        let other = JavaType::class("B").into_ref();
        let method = JavaMethod::new(
            holder.clone(),
            "m",
            Signature::parse("()V").unwrap(),
            AccessFlags::PUBLIC,
        )
        .into_ref();

        let rt = DefaultRuntime;
        assert!(rt.resolve_method_impl(&holder, &method).is_some());
        assert!(rt.resolve_method_impl(&other, &method).is_none());
        assert!(rt.type_of_constant(&Constant::Null).is_none());
        assert_eq!(rt.lookup_type("[I").map(|t| t.name().to_string()), Some("[I".to_string()));
        assert!(rt.lookup_type("[Ljava/lang/Object;").is_none());
        assert!(rt.lookup_type("Ljava/lang/String;").is_none());
        assert_eq!(rt.size_of_basic_object_lock(), 0);
    }
}
