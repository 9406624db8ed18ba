//! Compile-time constant values.

use std::{fmt, sync::Arc};

use crate::meta::Kind;

/// How a type is materialized when it is used as a value.
///
/// Class literals (`ldc` of a class) need the `java.lang.Class` mirror, type checks need the
/// object hub, and static field accesses need the holder's static field block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Representation {
    /// The `java.lang.Class` mirror
    JavaClass,
    /// The hub (class pointer) used for type checks and allocation
    ObjectHub,
    /// The container of the type's static fields
    StaticFields,
}

/// A constant value known at compile time.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    /// 32-bit integer (also used for `boolean`, `byte`, `short`, `char`)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit IEEE float
    Float(f32),
    /// 64-bit IEEE float
    Double(f64),
    /// The `null` reference
    Null,
    /// An interned string literal
    String(Arc<str>),
    /// The encoding of a resolved type in the given representation
    Type {
        /// Binary name of the type, e.g. `java/lang/String`
        name: Arc<str>,
        /// Which runtime structure the constant denotes
        representation: Representation,
    },
}

impl Constant {
    /// Returns the kind of this constant.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Constant::Int(_) => Kind::Int,
            Constant::Long(_) => Kind::Long,
            Constant::Float(_) => Kind::Float,
            Constant::Double(_) => Kind::Double,
            Constant::Null | Constant::String(_) | Constant::Type { .. } => Kind::Object,
        }
    }

    /// Returns the integer value of an `Int` constant.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Constant::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for the `null` constant.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Constant::Null)
    }

    /// Creates a string constant.
    #[must_use]
    pub fn string(value: &str) -> Self {
        Constant::String(Arc::from(value))
    }

    /// Creates the encoding of a type in the given representation.
    #[must_use]
    pub fn type_encoding(name: &str, representation: Representation) -> Self {
        Constant::Type {
            name: Arc::from(name),
            representation,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v}f"),
            Constant::Double(v) => write!(f, "{v}d"),
            Constant::Null => write!(f, "null"),
            Constant::String(s) => write!(f, "\"{s}\""),
            Constant::Type {
                name,
                representation,
            } => write!(f, "{name}.{representation:?}"),
        }
    }
}
