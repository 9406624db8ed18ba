//! Constant pool access.
//!
//! The graph builder never decodes class files. It asks a [`ConstantPool`] for the meaning of
//! the constant pool index carried by an instruction. [`ConstantTable`] is a simple in-memory
//! implementation, sufficient for tests, benchmarks and embedders that resolve pools
//! up front.

use crate::{
    meta::{Constant, FieldRef, MethodRef, TypeRef},
    Error, Result,
};

/// The result of looking up an `ldc` operand.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolConstant {
    /// A numeric or string value
    Value(Constant),
    /// A class literal; needs to be materialized as a `java.lang.Class` mirror
    Type(TypeRef),
}

/// One entry of a [`ConstantTable`].
#[derive(Clone, Debug, PartialEq)]
pub enum PoolEntry {
    /// Numeric or string constant
    Value(Constant),
    /// Class reference
    Type(TypeRef),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
}

/// Resolves constant pool indices of one class.
///
/// `opcode` is the instruction that references the index; implementations that resolve lazily
/// can use it to decide how far resolution must go (e.g. `new` needs an initialized class,
/// `checkcast` only a loaded one). Lookups report unresolved descriptors through their
/// `is_resolved` flags rather than failing.
pub trait ConstantPool: Send + Sync {
    /// Looks up an `ldc`/`ldc_w`/`ldc2_w` operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unresolved`] if the index has no loadable constant.
    fn lookup_constant(&self, cpi: u16) -> Result<PoolConstant>;

    /// Looks up a class reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unresolved`] if the index is not a class reference.
    fn lookup_type(&self, cpi: u16, opcode: u8) -> Result<TypeRef>;

    /// Looks up a field reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unresolved`] if the index is not a field reference.
    fn lookup_field(&self, cpi: u16, opcode: u8) -> Result<FieldRef>;

    /// Looks up a method reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unresolved`] if the index is not a method reference.
    fn lookup_method(&self, cpi: u16, opcode: u8) -> Result<MethodRef>;
}

/// A fully materialized constant pool.
///
/// Entries are numbered from 1 like class file constant pools; index 0 is never valid.
#[derive(Clone, Debug, Default)]
pub struct ConstantTable {
    entries: Vec<PoolEntry>,
}

impl ConstantTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns its index.
    pub fn add(&mut self, entry: PoolEntry) -> u16 {
        self.entries.push(entry);
        u16::try_from(self.entries.len()).unwrap_or(u16::MAX)
    }

    /// Appends a value constant and returns its index.
    pub fn add_constant(&mut self, value: Constant) -> u16 {
        self.add(PoolEntry::Value(value))
    }

    /// Appends a class reference and returns its index.
    pub fn add_type(&mut self, ty: TypeRef) -> u16 {
        self.add(PoolEntry::Type(ty))
    }

    /// Appends a field reference and returns its index.
    pub fn add_field(&mut self, field: FieldRef) -> u16 {
        self.add(PoolEntry::Field(field))
    }

    /// Appends a method reference and returns its index.
    pub fn add_method(&mut self, method: MethodRef) -> u16 {
        self.add(PoolEntry::Method(method))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, cpi: u16) -> Result<&PoolEntry> {
        usize::from(cpi)
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| Error::Unresolved(format!("no constant pool entry #{cpi}")))
    }
}

impl ConstantPool for ConstantTable {
    fn lookup_constant(&self, cpi: u16) -> Result<PoolConstant> {
        match self.entry(cpi)? {
            PoolEntry::Value(c) => Ok(PoolConstant::Value(c.clone())),
            PoolEntry::Type(t) => Ok(PoolConstant::Type(t.clone())),
            other => Err(Error::Unresolved(format!(
                "entry #{cpi} is not loadable: {other:?}"
            ))),
        }
    }

    fn lookup_type(&self, cpi: u16, _opcode: u8) -> Result<TypeRef> {
        match self.entry(cpi)? {
            PoolEntry::Type(t) => Ok(t.clone()),
            other => Err(Error::Unresolved(format!(
                "entry #{cpi} is not a class: {other:?}"
            ))),
        }
    }

    fn lookup_field(&self, cpi: u16, _opcode: u8) -> Result<FieldRef> {
        match self.entry(cpi)? {
            PoolEntry::Field(f) => Ok(f.clone()),
            other => Err(Error::Unresolved(format!(
                "entry #{cpi} is not a field: {other:?}"
            ))),
        }
    }

    fn lookup_method(&self, cpi: u16, _opcode: u8) -> Result<MethodRef> {
        match self.entry(cpi)? {
            PoolEntry::Method(m) => Ok(m.clone()),
            other => Err(Error::Unresolved(format!(
                "entry #{cpi} is not a method: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{AccessFlags, JavaField, JavaType, Kind};

    #[test]
    fn test_indices_start_at_one() {
        let mut table = ConstantTable::new();
        let c = table.add_constant(Constant::Int(42));
        assert_eq!(c, 1);
        assert_eq!(
            table.lookup_constant(1).unwrap(),
            PoolConstant::Value(Constant::Int(42))
        );
        assert!(matches!(table.lookup_constant(0), Err(Error::Unresolved(_))));
        assert!(matches!(table.lookup_constant(2), Err(Error::Unresolved(_))));
    }

    #[test]
    fn test_entry_sorts_are_checked() {
        let mut table = ConstantTable::new();
        let ty = JavaType::class("A").into_ref();
        let t = table.add_type(ty.clone());
        let f = table.add_field(JavaField::new(ty, "x", Kind::Int, AccessFlags::empty()).into_ref());

        assert!(matches!(table.lookup_constant(t), Ok(PoolConstant::Type(_))));
        assert!(table.lookup_type(t, 0).is_ok());
        assert!(table.lookup_field(t, 0).is_err());
        assert!(table.lookup_field(f, 0).is_ok());
        assert!(table.lookup_method(f, 0).is_err());
        assert!(table.lookup_constant(f).is_err());
        assert_eq!(table.len(), 2);
    }
}
