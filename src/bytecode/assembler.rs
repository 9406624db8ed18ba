//! A small label-resolving bytecode assembler.
//!
//! [`BytecodeAssembler`] writes JVM bytecode with symbolic branch targets. Every method returns
//! `Result<&mut Self>` so instruction sequences can be chained with `?`:
//!
//! ```rust,ignore
//! use bcgraph::bytecode::BytecodeAssembler;
//!
//! let mut asm = BytecodeAssembler::new();
//! asm.iload(0)?
//!     .ifeq("else")?
//!     .iconst(1)?
//!     .goto("end")?
//!     .label("else")?
//!     .iconst(2)?
//!     .label("end")?
//!     .ireturn()?;
//! let code = asm.finish()?;
//! ```
//!
//! Branch offsets are resolved in [`BytecodeAssembler::finish`]. Two-byte branch operands that
//! cannot reach their label are reported as errors rather than widened.

use rustc_hash::FxHashMap;

use crate::{bytecode::opcodes, meta::Kind, Result};

struct Fixup {
    label: String,
    /// bci of the branching instruction
    base: usize,
    /// position of the offset operand
    at: usize,
    wide: bool,
}

/// Assembles JVM bytecode with named labels.
#[derive(Default)]
pub struct BytecodeAssembler {
    code: Vec<u8>,
    labels: FxHashMap<String, usize>,
    fixups: Vec<Fixup>,
}

impl BytecodeAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bci the next instruction will be written at.
    #[must_use]
    pub fn position(&self) -> i32 {
        i32::try_from(self.code.len()).unwrap_or(i32::MAX)
    }

    /// Defines `name` at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the label is already defined.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.insert(name.to_string(), self.code.len()).is_some() {
            return Err(malformed_error!("Label '{}' defined twice", name));
        }
        Ok(self)
    }

    /// Emits an operand-less instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` takes operands.
    pub fn op(&mut self, opcode: u8) -> Result<&mut Self> {
        if opcodes::length_of(opcode) != Some(1) {
            return Err(malformed_error!(
                "Opcode {} is not a single byte instruction",
                opcode
            ));
        }
        self.code.push(opcode);
        Ok(self)
    }

    /// Emits an instruction with a one byte operand.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` does not take a single byte operand.
    pub fn op_u8(&mut self, opcode: u8, operand: u8) -> Result<&mut Self> {
        if opcodes::length_of(opcode) != Some(2) {
            return Err(malformed_error!("Opcode {} does not take a byte operand", opcode));
        }
        self.code.extend_from_slice(&[opcode, operand]);
        Ok(self)
    }

    /// Emits an instruction with a two byte operand (constant pool index or immediate).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` does not take a two byte operand.
    pub fn op_u16(&mut self, opcode: u8, operand: u16) -> Result<&mut Self> {
        if opcodes::length_of(opcode) != Some(3) {
            return Err(malformed_error!("Opcode {} does not take a short operand", opcode));
        }
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_be_bytes());
        Ok(self)
    }

    /// Pushes an int constant using the shortest encoding without the constant pool.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the value needs the constant pool.
    pub fn iconst(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1..=5 => {
                let op = (i32::from(opcodes::ICONST_0) + value) as u8;
                self.op(op)
            }
            -128..=127 => self.op_u8(opcodes::BIPUSH, value as i8 as u8),
            -32768..=32767 => self.op_u16(opcodes::SIPUSH, value as i16 as u16),
            _ => Err(malformed_error!(
                "Constant {} needs a constant pool entry",
                value
            )),
        }
    }

    /// Loads a local of the given kind, using the `_0`..`_3` forms and `wide` as needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for kinds that have no load instruction.
    pub fn load(&mut self, kind: Kind, index: u16) -> Result<&mut Self> {
        let (base, short) = match kind.stack_kind() {
            Kind::Int => (opcodes::ILOAD, opcodes::ILOAD_0),
            Kind::Long => (opcodes::LLOAD, opcodes::LLOAD_0),
            Kind::Float => (opcodes::FLOAD, opcodes::FLOAD_0),
            Kind::Double => (opcodes::DLOAD, opcodes::DLOAD_0),
            Kind::Object => (opcodes::ALOAD, opcodes::ALOAD_0),
            other => return Err(malformed_error!("Cannot load a local of kind {}", other)),
        };
        self.local_op(base, short, index)
    }

    /// Stores into a local of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for kinds that have no store instruction.
    pub fn store(&mut self, kind: Kind, index: u16) -> Result<&mut Self> {
        let (base, short) = match kind.stack_kind() {
            Kind::Int => (opcodes::ISTORE, opcodes::ISTORE_0),
            Kind::Long => (opcodes::LSTORE, opcodes::LSTORE_0),
            Kind::Float => (opcodes::FSTORE, opcodes::FSTORE_0),
            Kind::Double => (opcodes::DSTORE, opcodes::DSTORE_0),
            Kind::Object => (opcodes::ASTORE, opcodes::ASTORE_0),
            other => return Err(malformed_error!("Cannot store a local of kind {}", other)),
        };
        self.local_op(base, short, index)
    }

    fn local_op(&mut self, base: u8, short: u8, index: u16) -> Result<&mut Self> {
        match index {
            0..=3 => self.op(short + index as u8),
            4..=255 => self.op_u8(base, index as u8),
            _ => {
                self.code.extend_from_slice(&[opcodes::WIDE, base]);
                self.code.extend_from_slice(&index.to_be_bytes());
                Ok(self)
            }
        }
    }

    /// `iload`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn iload(&mut self, index: u16) -> Result<&mut Self> {
        self.load(Kind::Int, index)
    }

    /// `istore`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn istore(&mut self, index: u16) -> Result<&mut Self> {
        self.store(Kind::Int, index)
    }

    /// `aload`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn aload(&mut self, index: u16) -> Result<&mut Self> {
        self.load(Kind::Object, index)
    }

    /// `astore`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn astore(&mut self, index: u16) -> Result<&mut Self> {
        self.store(Kind::Object, index)
    }

    /// `iinc`, widened when index or increment do not fit a byte.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn iinc(&mut self, index: u16, increment: i16) -> Result<&mut Self> {
        if index <= 255 && (-128..=127).contains(&increment) {
            self.code
                .extend_from_slice(&[opcodes::IINC, index as u8, increment as i8 as u8]);
        } else {
            self.code.extend_from_slice(&[opcodes::WIDE, opcodes::IINC]);
            self.code.extend_from_slice(&index.to_be_bytes());
            self.code.extend_from_slice(&increment.to_be_bytes());
        }
        Ok(self)
    }

    /// `iadd`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn iadd(&mut self) -> Result<&mut Self> {
        self.op(opcodes::IADD)
    }

    /// `ireturn`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ireturn(&mut self) -> Result<&mut Self> {
        self.op(opcodes::IRETURN)
    }

    /// `areturn`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn areturn(&mut self) -> Result<&mut Self> {
        self.op(opcodes::ARETURN)
    }

    /// `return`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn vreturn(&mut self) -> Result<&mut Self> {
        self.op(opcodes::RETURN)
    }

    /// `athrow`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn athrow(&mut self) -> Result<&mut Self> {
        self.op(opcodes::ATHROW)
    }

    /// Emits a branch with a 16-bit offset (`if*`, `goto`, `jsr`) to `label`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` is not a 16-bit branch.
    pub fn branch(&mut self, opcode: u8, label: &str) -> Result<&mut Self> {
        let wide = match opcode {
            opcodes::GOTO_W | opcodes::JSR_W => true,
            opcodes::GOTO | opcodes::JSR => false,
            op if opcodes::is_conditional_branch(op) => false,
            other => return Err(malformed_error!("Opcode {} is not a branch", other)),
        };
        let base = self.code.len();
        self.code.push(opcode);
        self.fixups.push(Fixup {
            label: label.to_string(),
            base,
            at: base + 1,
            wide,
        });
        let width = if wide { 4 } else { 2 };
        self.code.extend(std::iter::repeat(0).take(width));
        Ok(self)
    }

    /// `goto label`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn goto(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(opcodes::GOTO, label)
    }

    /// `ifeq label`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ifeq(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(opcodes::IFEQ, label)
    }

    /// `ifne label`
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn ifne(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(opcodes::IFNE, label)
    }

    fn switch_padding(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    fn switch_target(&mut self, base: usize, label: &str) {
        self.fixups.push(Fixup {
            label: label.to_string(),
            base,
            at: self.code.len(),
            wide: true,
        });
        self.code.extend_from_slice(&[0; 4]);
    }

    /// Emits a `tableswitch` whose case `i` (key `low + i`) jumps to `cases[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if there are no cases.
    pub fn tableswitch(&mut self, low: i32, cases: &[&str], default: &str) -> Result<&mut Self> {
        if cases.is_empty() {
            return Err(malformed_error!("tableswitch needs at least one case"));
        }
        let high = low + i32::try_from(cases.len()).unwrap_or(i32::MAX) - 1;

        let base = self.code.len();
        self.code.push(opcodes::TABLESWITCH);
        self.switch_padding();
        self.switch_target(base, default);
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for case in cases {
            self.switch_target(base, case);
        }
        Ok(self)
    }

    /// Emits a `lookupswitch`; pairs are sorted by key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on duplicate keys.
    pub fn lookupswitch(&mut self, pairs: &[(i32, &str)], default: &str) -> Result<&mut Self> {
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(malformed_error!("lookupswitch has duplicate keys"));
        }

        let base = self.code.len();
        self.code.push(opcodes::LOOKUPSWITCH);
        self.switch_padding();
        self.switch_target(base, default);
        let count = i32::try_from(sorted.len()).unwrap_or(i32::MAX);
        self.code.extend_from_slice(&count.to_be_bytes());
        for (key, label) in sorted {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.switch_target(base, label);
        }
        Ok(self)
    }

    /// Emits an instruction taking a constant pool index (`ldc_w`, `getfield`, `new`, ...).
    /// `invokeinterface` gets its count and zero bytes appended; `ldc` is emitted with a byte
    /// index when it fits.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `opcode` does not take a pool index.
    pub fn cpi(&mut self, opcode: u8, cpi: u16) -> Result<&mut Self> {
        match opcode {
            opcodes::LDC => match u8::try_from(cpi) {
                Ok(small) => self.op_u8(opcodes::LDC, small),
                Err(_) => self.op_u16(opcodes::LDC_W, cpi),
            },
            opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => {
                self.code.push(opcode);
                self.code.extend_from_slice(&cpi.to_be_bytes());
                self.code.extend_from_slice(&[1, 0]);
                Ok(self)
            }
            opcodes::LDC_W
            | opcodes::LDC2_W
            | opcodes::GETSTATIC..=opcodes::INVOKESTATIC
            | opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF => self.op_u16(opcode, cpi),
            other => Err(malformed_error!(
                "Opcode {} does not take a constant pool index",
                other
            )),
        }
    }

    /// `multianewarray cpi dimensions`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for zero dimensions.
    pub fn multianewarray(&mut self, cpi: u16, dimensions: u8) -> Result<&mut Self> {
        if dimensions == 0 {
            return Err(malformed_error!("multianewarray needs at least one dimension"));
        }
        self.code.push(opcodes::MULTIANEWARRAY);
        self.code.extend_from_slice(&cpi.to_be_bytes());
        self.code.push(dimensions);
        Ok(self)
    }

    /// Appends raw bytes, e.g. for deliberately malformed code.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn raw(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.code.extend_from_slice(bytes);
        Ok(self)
    }

    /// Resolves all label references and returns the code.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a referenced label is undefined or a 16-bit
    /// branch cannot reach its label.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        for fixup in std::mem::take(&mut self.fixups) {
            let Some(&target) = self.labels.get(&fixup.label) else {
                return Err(malformed_error!("Undefined label '{}'", fixup.label));
            };
            let offset = target as i64 - fixup.base as i64;
            if fixup.wide {
                let offset = i32::try_from(offset)
                    .map_err(|_| malformed_error!("Branch to '{}' out of range", fixup.label))?;
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&offset.to_be_bytes());
            } else {
                let offset = i16::try_from(offset)
                    .map_err(|_| malformed_error!("Branch to '{}' out of range", fixup.label))?;
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
            }
        }
        Ok(std::mem::take(&mut self.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{opcodes::*, BytecodeStream};

    #[test]
    fn test_diamond_encoding() {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)
            .unwrap()
            .ifeq("else")
            .unwrap()
            .iconst(1)
            .unwrap()
            .goto("end")
            .unwrap()
            .label("else")
            .unwrap()
            .iconst(2)
            .unwrap()
            .label("end")
            .unwrap()
            .ireturn()
            .unwrap();

        assert_eq!(
            asm.finish().unwrap(),
            vec![ILOAD_0, IFEQ, 0, 7, ICONST_1, GOTO, 0, 4, ICONST_2, IRETURN]
        );
    }

    #[test]
    fn test_constant_forms() {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(-1).unwrap();
        asm.iconst(100).unwrap();
        asm.iconst(-300).unwrap();
        assert!(asm.iconst(100_000).is_err());
        assert_eq!(
            asm.finish().unwrap(),
            vec![ICONST_M1, BIPUSH, 100, SIPUSH, 0xfe, 0xd4]
        );
    }

    #[test]
    fn test_local_forms() {
        let mut asm = BytecodeAssembler::new();
        asm.load(Kind::Long, 2).unwrap();
        asm.store(Kind::Object, 7).unwrap();
        asm.iload(300).unwrap();
        asm.iinc(1, 1000).unwrap();
        assert!(asm.load(Kind::Void, 0).is_err());
        assert_eq!(
            asm.finish().unwrap(),
            vec![LLOAD_2, ASTORE, 7, WIDE, ILOAD, 1, 44, WIDE, IINC, 0, 1, 0x03, 0xe8]
        );
    }

    #[test]
    fn test_switch_round_trips_through_stream() {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)
            .unwrap()
            .tableswitch(0, &["a", "b"], "d")
            .unwrap()
            .label("a")
            .unwrap()
            .label("b")
            .unwrap()
            .label("d")
            .unwrap()
            .vreturn()
            .unwrap();
        let code = asm.finish().unwrap();

        let mut stream = BytecodeStream::new(&code).unwrap();
        stream.next().unwrap();
        let table = stream.read_table_switch().unwrap();
        let end = stream.next_bci();
        assert_eq!(table.dests, vec![end, end]);
        assert_eq!(table.default_dest, end);
    }

    #[test]
    fn test_label_errors() {
        let mut asm = BytecodeAssembler::new();
        asm.label("x").unwrap();
        assert!(asm.label("x").is_err());
        asm.goto("missing").unwrap();
        assert!(asm.finish().is_err());
        assert!(BytecodeAssembler::new().branch(IADD, "x").is_err());
        assert!(BytecodeAssembler::new().op(BIPUSH).is_err());
    }
}
