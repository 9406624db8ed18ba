//! Runtime descriptors for types, fields and methods.
//!
//! These are the results of constant pool resolution. A descriptor may be *unresolved*: the
//! runtime knows its symbolic name but has not loaded or linked it yet. The graph builder
//! handles unresolved descriptors by emitting deferred `ResolveClass` nodes and attaching
//! frame state snapshots instead of folding constants.
//!
//! Descriptors are immutable and shared through [`Arc`] so that many concurrent method
//! compilations can reference the same runtime data.

use std::sync::Arc;

use bitflags::bitflags;

use crate::meta::{Constant, Kind, Signature};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    /// JVM access flags for classes, fields and methods
    pub struct AccessFlags : u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Method is synchronized (`ACC_SUPER` on classes)
        const SYNCHRONIZED = 0x0020;
        /// Field is volatile (`ACC_BRIDGE` on methods)
        const VOLATILE = 0x0040;
        /// Method is native
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Method uses strict floating point
        const STRICT = 0x0800;
    }
}

/// Shared handle to a type descriptor.
pub type TypeRef = Arc<JavaType>;
/// Shared handle to a field descriptor.
pub type FieldRef = Arc<JavaField>;
/// Shared handle to a method descriptor.
pub type MethodRef = Arc<JavaMethod>;

/// A class, interface, array or primitive type.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaType {
    name: String,
    kind: Kind,
    access: AccessFlags,
    resolved: bool,
    initialized: bool,
    super_name: Option<String>,
    has_finalizer: bool,
    has_finalizable_subclass: bool,
}

impl JavaType {
    /// Creates a resolved and initialized class type with no access flags.
    #[must_use]
    pub fn class(name: &str) -> Self {
        JavaType {
            name: name.to_string(),
            kind: Kind::Object,
            access: AccessFlags::empty(),
            resolved: true,
            initialized: true,
            super_name: Some("java/lang/Object".to_string()),
            has_finalizer: false,
            has_finalizable_subclass: false,
        }
    }

    /// Creates a symbolic reference to a type that has not been resolved yet.
    #[must_use]
    pub fn unresolved(name: &str) -> Self {
        JavaType {
            resolved: false,
            initialized: false,
            super_name: None,
            ..JavaType::class(name)
        }
    }

    /// Creates the type of a primitive kind.
    #[must_use]
    pub fn primitive(kind: Kind) -> Self {
        JavaType {
            kind,
            access: AccessFlags::PUBLIC | AccessFlags::FINAL,
            super_name: None,
            ..JavaType::class(&kind.to_string())
        }
    }

    /// Sets the access flags.
    #[must_use]
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Sets the super class name; `None` marks the root of the hierarchy.
    #[must_use]
    pub fn with_super(mut self, super_name: Option<&str>) -> Self {
        self.super_name = super_name.map(str::to_string);
        self
    }

    /// Marks the type resolved but not yet initialized.
    #[must_use]
    pub fn uninitialized(mut self) -> Self {
        self.initialized = false;
        self
    }

    /// Records finalizer information used by finalizer registration.
    #[must_use]
    pub fn with_finalizer(mut self, has_finalizer: bool, has_finalizable_subclass: bool) -> Self {
        self.has_finalizer = has_finalizer;
        self.has_finalizable_subclass = has_finalizable_subclass;
        self
    }

    /// Wraps the descriptor in a shared handle.
    #[must_use]
    pub fn into_ref(self) -> TypeRef {
        Arc::new(self)
    }

    /// Binary name, e.g. `java/lang/String`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of values of this type.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Access flags.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// `true` once the runtime has loaded and linked the type.
    #[must_use]
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// `true` once static initialization has run.
    #[must_use]
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.resolved && self.initialized
    }

    /// `true` for array types.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    /// `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    /// Super class name, `None` for `java/lang/Object`, interfaces of the root and primitives.
    #[must_use]
    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    /// Whether instances of exactly this type have a non-trivial finalizer.
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.has_finalizer
    }

    /// Whether this type or any subtype has a non-trivial finalizer.
    #[must_use]
    pub fn has_finalizable_subclass(&self) -> bool {
        self.has_finalizer || self.has_finalizable_subclass
    }

    /// Returns the type itself if no value of a static type `self` can have a different
    /// runtime type (final classes, arrays of primitives).
    #[must_use]
    pub fn exact_type(self: &Arc<Self>) -> Option<TypeRef> {
        if !self.resolved || self.is_interface() {
            return None;
        }
        let final_class = self.access.contains(AccessFlags::FINAL);
        let primitive_array = self.is_array() && self.name.len() == 2;
        (final_class || primitive_array).then(|| Arc::clone(self))
    }
}

/// An instance or static field.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaField {
    holder: TypeRef,
    name: String,
    kind: Kind,
    access: AccessFlags,
    resolved: bool,
    constant_value: Option<Constant>,
    declared_type: Option<TypeRef>,
}

impl JavaField {
    /// Creates a resolved field.
    #[must_use]
    pub fn new(holder: TypeRef, name: &str, kind: Kind, access: AccessFlags) -> Self {
        JavaField {
            holder,
            name: name.to_string(),
            kind,
            access,
            resolved: true,
            constant_value: None,
            declared_type: None,
        }
    }

    /// Marks the field unresolved.
    #[must_use]
    pub fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    /// Records the value of a static final field whose value is already known.
    #[must_use]
    pub fn with_constant(mut self, value: Constant) -> Self {
        self.constant_value = Some(value);
        self
    }

    /// Records the loaded type of a reference field.
    #[must_use]
    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.declared_type = Some(ty);
        self
    }

    /// Wraps the descriptor in a shared handle.
    #[must_use]
    pub fn into_ref(self) -> FieldRef {
        Arc::new(self)
    }

    /// Declaring type.
    #[must_use]
    pub fn holder(&self) -> &TypeRef {
        &self.holder
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind of the field.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Declared type of a reference field, when it is loaded.
    #[must_use]
    pub fn declared_type(&self) -> Option<&TypeRef> {
        self.declared_type.as_ref()
    }

    /// Access flags.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// `true` once the field has been linked.
    #[must_use]
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved && self.holder.is_resolved()
    }

    /// The known value of a resolved static final field.
    #[must_use]
    pub fn constant_value(&self) -> Option<&Constant> {
        if self.is_resolved()
            && self.access.contains(AccessFlags::STATIC | AccessFlags::FINAL)
            && self.holder.is_initialized()
        {
            self.constant_value.as_ref()
        } else {
            None
        }
    }
}

/// A method reference.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaMethod {
    holder: TypeRef,
    name: String,
    signature: Signature,
    access: AccessFlags,
    resolved: bool,
}

impl JavaMethod {
    /// Creates a resolved method.
    #[must_use]
    pub fn new(holder: TypeRef, name: &str, signature: Signature, access: AccessFlags) -> Self {
        JavaMethod {
            holder,
            name: name.to_string(),
            signature,
            access,
            resolved: true,
        }
    }

    /// Marks the method unresolved.
    #[must_use]
    pub fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    /// Wraps the descriptor in a shared handle.
    #[must_use]
    pub fn into_ref(self) -> MethodRef {
        Arc::new(self)
    }

    /// Declaring type.
    #[must_use]
    pub fn holder(&self) -> &TypeRef {
        &self.holder
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed descriptor.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Access flags.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// `true` once the method has been linked.
    #[must_use]
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved && self.holder.is_resolved()
    }

    /// `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// `true` for abstract and interface methods without a body.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// `true` for synchronized methods.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.access.contains(AccessFlags::SYNCHRONIZED)
    }

    /// `true` for strictfp methods.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.access.contains(AccessFlags::STRICT)
    }

    /// `true` for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Returns `true` if no override can exist: private, static or final methods, or
    /// methods declared in a final class.
    #[must_use]
    pub fn can_be_statically_bound(&self) -> bool {
        self.is_resolved()
            && (self
                .access
                .intersects(AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL)
                || self.holder.access().contains(AccessFlags::FINAL))
    }

    /// `"holder.name descriptor"`, used in trace output.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}{}",
            self.holder.name(),
            self.name,
            self.signature.descriptor()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_type() {
        let final_class = JavaType::class("java/lang/String")
            .with_access(AccessFlags::PUBLIC | AccessFlags::FINAL)
            .into_ref();
        assert!(final_class.exact_type().is_some());

        let open_class = JavaType::class("java/util/AbstractList").into_ref();
        assert!(open_class.exact_type().is_none());

        let int_array = JavaType::class("[I").into_ref();
        assert!(int_array.exact_type().is_some());

        let unresolved = JavaType::unresolved("Foo").into_ref();
        assert!(unresolved.exact_type().is_none());
        assert!(!unresolved.is_initialized());
    }

    #[test]
    fn test_static_binding() {
        let holder = JavaType::class("A").into_ref();
        let sig = Signature::parse("()V").unwrap();

        let virt = JavaMethod::new(holder.clone(), "m", sig.clone(), AccessFlags::PUBLIC);
        assert!(!virt.can_be_statically_bound());

        let fin = JavaMethod::new(holder.clone(), "m", sig.clone(), AccessFlags::FINAL);
        assert!(fin.can_be_statically_bound());

        let private = JavaMethod::new(holder, "m", sig.clone(), AccessFlags::PRIVATE).unresolved();
        assert!(!private.can_be_statically_bound());

        let final_holder = JavaType::class("B")
            .with_access(AccessFlags::FINAL)
            .into_ref();
        let in_final = JavaMethod::new(final_holder, "m", sig, AccessFlags::PUBLIC);
        assert!(in_final.can_be_statically_bound());
        assert_eq!(in_final.qualified_name(), "B.m()V");
    }

    #[test]
    fn test_field_constant_value() {
        let holder = JavaType::class("A").into_ref();
        let field = JavaField::new(
            holder.clone(),
            "MAX",
            Kind::Int,
            AccessFlags::STATIC | AccessFlags::FINAL,
        )
        .with_constant(Constant::Int(10));
        assert_eq!(field.constant_value(), Some(&Constant::Int(10)));

        let not_final = JavaField::new(holder, "x", Kind::Int, AccessFlags::STATIC)
            .with_constant(Constant::Int(1));
        assert_eq!(not_final.constant_value(), None);

        let lazy_holder = JavaType::class("B").uninitialized().into_ref();
        let lazy = JavaField::new(
            lazy_holder,
            "MAX",
            Kind::Int,
            AccessFlags::STATIC | AccessFlags::FINAL,
        )
        .with_constant(Constant::Int(10));
        assert_eq!(lazy.constant_value(), None);
    }
}
