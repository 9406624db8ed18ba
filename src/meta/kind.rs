//! Value kinds of the JVM type system as seen by the abstract interpreter.

use strum::{EnumCount, EnumIter};

/// The kind of a value flowing through the operand stack, locals or a node.
///
/// Sub-int kinds (`Boolean`, `Byte`, `Short`, `Char`) only appear as field, array element and
/// signature kinds; on the operand stack they are widened to `Int` (see
/// [`Kind::stack_kind`]). `Long` and `Double` occupy two stack and local slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, EnumCount, strum::Display)]
pub enum Kind {
    /// `boolean`, descriptor `Z`
    #[strum(serialize = "boolean")]
    Boolean,
    /// `byte`, descriptor `B`
    #[strum(serialize = "byte")]
    Byte,
    /// `short`, descriptor `S`
    #[strum(serialize = "short")]
    Short,
    /// `char`, descriptor `C`
    #[strum(serialize = "char")]
    Char,
    /// `int`, descriptor `I`
    #[strum(serialize = "int")]
    Int,
    /// `float`, descriptor `F`
    #[strum(serialize = "float")]
    Float,
    /// `long`, descriptor `J`
    #[strum(serialize = "long")]
    Long,
    /// `double`, descriptor `D`
    #[strum(serialize = "double")]
    Double,
    /// Any reference, descriptors `L...;` and `[...`
    #[strum(serialize = "object")]
    Object,
    /// No value (method returns, pure control nodes)
    #[strum(serialize = "void")]
    Void,
    /// Not a valid value kind (bogus slots)
    #[strum(serialize = "illegal")]
    Illegal,
}

impl Kind {
    /// Returns the kind a value of this kind has on the operand stack.
    #[must_use]
    pub const fn stack_kind(self) -> Kind {
        match self {
            Kind::Boolean | Kind::Byte | Kind::Short | Kind::Char => Kind::Int,
            other => other,
        }
    }

    /// Returns `true` for kinds that occupy two slots.
    #[must_use]
    #[inline]
    pub const fn is_double_word(self) -> bool {
        matches!(self, Kind::Long | Kind::Double)
    }

    /// Number of stack or local slots a value of this kind occupies.
    #[must_use]
    pub const fn slots(self) -> usize {
        match self {
            Kind::Long | Kind::Double => 2,
            Kind::Void | Kind::Illegal => 0,
            _ => 1,
        }
    }

    /// Returns `true` for `Float` and `Double`.
    #[must_use]
    pub const fn is_float_or_double(self) -> bool {
        matches!(self, Kind::Float | Kind::Double)
    }

    /// Returns `true` for all non-reference value kinds.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, Kind::Object | Kind::Void | Kind::Illegal)
    }

    /// The descriptor character of a primitive kind, `None` for `Object`, `Void` and `Illegal`.
    #[must_use]
    pub const fn type_char(self) -> Option<char> {
        Some(match self {
            Kind::Boolean => 'Z',
            Kind::Byte => 'B',
            Kind::Short => 'S',
            Kind::Char => 'C',
            Kind::Int => 'I',
            Kind::Float => 'F',
            Kind::Long => 'J',
            Kind::Double => 'D',
            _ => return None,
        })
    }

    /// Maps a descriptor character to its kind (`L` and `[` map to `Object`).
    #[must_use]
    pub const fn from_type_char(c: u8) -> Option<Kind> {
        Some(match c {
            b'Z' => Kind::Boolean,
            b'B' => Kind::Byte,
            b'S' => Kind::Short,
            b'C' => Kind::Char,
            b'I' => Kind::Int,
            b'F' => Kind::Float,
            b'J' => Kind::Long,
            b'D' => Kind::Double,
            b'L' | b'[' => Kind::Object,
            b'V' => Kind::Void,
            _ => return None,
        })
    }

    /// Maps the `atype` operand of `newarray` to the element kind.
    #[must_use]
    pub const fn from_array_type_code(code: u8) -> Option<Kind> {
        Some(match code {
            4 => Kind::Boolean,
            5 => Kind::Char,
            6 => Kind::Float,
            7 => Kind::Double,
            8 => Kind::Byte,
            9 => Kind::Short,
            10 => Kind::Int,
            11 => Kind::Long,
            _ => return None,
        })
    }
}
