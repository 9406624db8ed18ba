//! Sequential and random-access bytecode decoding.
//!
//! [`BytecodeStream`] decodes one instruction at a time. The opcode and the instruction length
//! are validated when the stream is positioned on an instruction, so the operand accessors only
//! fail on reads beyond the instruction the caller is looking at.
//!
//! # Examples
//!
//! ```rust,ignore
//! use bcgraph::bytecode::{opcodes, BytecodeStream};
//!
//! let code = [opcodes::ICONST_1, opcodes::IRETURN];
//! let mut stream = BytecodeStream::new(&code)?;
//! while let Some(op) = stream.current_bc() {
//!     println!("{} {}", stream.current_bci(), opcodes::name_of(op).unwrap_or("?"));
//!     stream.next()?;
//! }
//! ```

use crate::{bytecode::opcodes, Result};

/// Operands of a `tableswitch`, destinations resolved to absolute bcis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSwitch {
    /// Key of the first case
    pub low_key: i32,
    /// Key of the last case
    pub high_key: i32,
    /// Destination of the default case
    pub default_dest: i32,
    /// Destination per case, `dests[i]` handles key `low_key + i`
    pub dests: Vec<i32>,
}

impl TableSwitch {
    /// Number of non-default cases.
    #[must_use]
    pub fn number_of_cases(&self) -> usize {
        self.dests.len()
    }
}

/// Operands of a `lookupswitch`, destinations resolved to absolute bcis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupSwitch {
    /// Match keys, sorted ascending
    pub keys: Vec<i32>,
    /// Destination per key
    pub dests: Vec<i32>,
    /// Destination of the default case
    pub default_dest: i32,
}

/// Cursor over a method's bytecode.
pub struct BytecodeStream<'a> {
    code: &'a [u8],
    opcode: Option<u8>,
    cur_bci: i32,
    next_bci: i32,
    wide: bool,
}

impl<'a> BytecodeStream<'a> {
    /// Creates a stream positioned at bci 0.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the first instruction is truncated.
    pub fn new(code: &'a [u8]) -> Result<Self> {
        let mut stream = BytecodeStream {
            code,
            opcode: None,
            cur_bci: 0,
            next_bci: 0,
            wide: false,
        };
        stream.set_bci(0)?;
        Ok(stream)
    }

    /// Positions the stream on the instruction at `bci`.
    ///
    /// Positioning at or beyond the end of the code is allowed; [`Self::current_bc`] then
    /// returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `bci` is negative or the instruction is
    /// truncated.
    pub fn set_bci(&mut self, bci: i32) -> Result<()> {
        if bci < 0 {
            return Err(malformed_error!("Negative bci {}", bci));
        }

        self.cur_bci = bci;
        self.wide = false;
        if bci >= self.end_bci() {
            self.opcode = None;
            self.next_bci = bci;
            return Ok(());
        }

        let mut opcode = self.byte_at(bci)?;
        let length = match opcodes::length_of(opcode) {
            // undefined opcodes decode as one byte; the builder reports them
            None => 1,
            Some(0) => match opcode {
                opcodes::WIDE => {
                    opcode = self.byte_at(bci + 1)?;
                    self.wide = true;
                    match opcode {
                        opcodes::IINC => 6,
                        opcodes::ILOAD..=opcodes::ALOAD
                        | opcodes::ISTORE..=opcodes::ASTORE
                        | opcodes::RET => 4,
                        other => {
                            return Err(malformed_error!(
                                "Opcode {} cannot follow wide at bci {}",
                                other,
                                bci
                            ))
                        }
                    }
                }
                opcodes::TABLESWITCH => {
                    let base = Self::align(bci + 1);
                    let low = self.i32_at(base + 4)?;
                    let high = self.i32_at(base + 8)?;
                    if high < low {
                        return Err(malformed_error!(
                            "tableswitch at bci {} has low {} > high {}",
                            bci,
                            low,
                            high
                        ));
                    }
                    let cases = i64::from(high) - i64::from(low) + 1;
                    Self::length_to(bci, i64::from(base) + 12 + cases * 4)?
                }
                _ => {
                    let base = Self::align(bci + 1);
                    let pairs = self.i32_at(base + 4)?;
                    if pairs < 0 {
                        return Err(malformed_error!(
                            "lookupswitch at bci {} has negative pair count",
                            bci
                        ));
                    }
                    Self::length_to(bci, i64::from(base) + 8 + i64::from(pairs) * 8)?
                }
            },
            Some(len) => i32::try_from(len).unwrap_or(1),
        };

        self.next_bci = bci + length;
        if self.next_bci > self.end_bci() {
            return Err(malformed_error!(
                "Instruction {} at bci {} is truncated",
                opcodes::name_of(opcode).unwrap_or("?"),
                bci
            ));
        }
        self.opcode = Some(opcode);
        Ok(())
    }

    /// Advances to the next instruction and returns its opcode.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the next instruction is truncated.
    pub fn next(&mut self) -> Result<Option<u8>> {
        self.set_bci(self.next_bci)?;
        Ok(self.opcode)
    }

    /// The opcode at the current position, with the `wide` prefix already stripped.
    #[must_use]
    pub fn current_bc(&self) -> Option<u8> {
        self.opcode
    }

    /// The bci of the current instruction.
    #[must_use]
    pub fn current_bci(&self) -> i32 {
        self.cur_bci
    }

    /// The bci following the current instruction.
    #[must_use]
    pub fn next_bci(&self) -> i32 {
        self.next_bci
    }

    /// One past the last valid bci.
    #[must_use]
    pub fn end_bci(&self) -> i32 {
        i32::try_from(self.code.len()).unwrap_or(i32::MAX)
    }

    /// `true` if the current instruction carries a `wide` prefix.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Reads an unsigned byte at `offset` from the current bci.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_u8(&self, offset: i32) -> Result<u8> {
        self.byte_at(self.cur_bci + offset)
    }

    /// Reads a signed byte at `offset` from the current bci.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_i8(&self, offset: i32) -> Result<i8> {
        Ok(i8::from_be_bytes([self.read_u8(offset)?]))
    }

    /// Reads a big-endian `u16` at `offset` from the current bci.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_u16(&self, offset: i32) -> Result<u16> {
        Ok(u16::from_be_bytes([
            self.read_u8(offset)?,
            self.read_u8(offset + 1)?,
        ]))
    }

    /// Reads a big-endian `i16` at `offset` from the current bci.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_i16(&self, offset: i32) -> Result<i16> {
        Ok(i16::from_be_bytes([
            self.read_u8(offset)?,
            self.read_u8(offset + 1)?,
        ]))
    }

    /// Reads a big-endian `i32` at `offset` from the current bci.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_i32(&self, offset: i32) -> Result<i32> {
        self.i32_at(self.cur_bci + offset)
    }

    /// Reads the constant pool index operand (one byte for `ldc`, two otherwise).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_cpi(&self) -> Result<u16> {
        if self.opcode == Some(opcodes::LDC) {
            Ok(u16::from(self.read_u8(1)?))
        } else {
            self.read_u16(1)
        }
    }

    /// Reads the local variable index of a load, store, `iinc` or `ret`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_local_index(&self) -> Result<usize> {
        if self.wide {
            Ok(usize::from(self.read_u16(2)?))
        } else {
            Ok(usize::from(self.read_u8(1)?))
        }
    }

    /// Reads the increment of an `iinc`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_iinc_increment(&self) -> Result<i32> {
        if self.wide {
            Ok(i32::from(self.read_i16(4)?))
        } else {
            Ok(i32::from(self.read_i8(2)?))
        }
    }

    /// Reads the absolute destination of a branch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_branch_dest(&self) -> Result<i32> {
        let offset = match self.opcode {
            Some(opcodes::GOTO_W | opcodes::JSR_W) => self.read_i32(1)?,
            _ => i32::from(self.read_i16(1)?),
        };
        Ok(self.cur_bci + offset)
    }

    /// Decodes the operands of the current `tableswitch`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_table_switch(&self) -> Result<TableSwitch> {
        let base = Self::align(self.cur_bci + 1);
        let default_dest = self.cur_bci + self.i32_at(base)?;
        let low_key = self.i32_at(base + 4)?;
        let high_key = self.i32_at(base + 8)?;

        let cases = high_key.wrapping_sub(low_key).wrapping_add(1);
        let mut dests = Vec::with_capacity(usize::try_from(cases).unwrap_or(0));
        for i in 0..cases {
            dests.push(self.cur_bci + self.i32_at(base + 12 + i * 4)?);
        }

        Ok(TableSwitch {
            low_key,
            high_key,
            default_dest,
            dests,
        })
    }

    /// Decodes the operands of the current `lookupswitch`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when reading past the code.
    pub fn read_lookup_switch(&self) -> Result<LookupSwitch> {
        let base = Self::align(self.cur_bci + 1);
        let default_dest = self.cur_bci + self.i32_at(base)?;
        let pairs = self.i32_at(base + 4)?;

        let mut keys = Vec::new();
        let mut dests = Vec::new();
        for i in 0..pairs {
            let at = base + 8 + i * 8;
            keys.push(self.i32_at(at)?);
            dests.push(self.cur_bci + self.i32_at(at + 4)?);
        }

        Ok(LookupSwitch {
            keys,
            dests,
            default_dest,
        })
    }

    fn align(bci: i32) -> i32 {
        (bci + 3) & !3
    }

    fn length_to(bci: i32, end: i64) -> Result<i32> {
        i32::try_from(end - i64::from(bci))
            .map_err(|_| malformed_error!("Switch at bci {} is too large", bci))
    }

    fn byte_at(&self, bci: i32) -> Result<u8> {
        usize::try_from(bci)
            .ok()
            .and_then(|i| self.code.get(i).copied())
            .ok_or_else(|| malformed_error!("Read past end of code at bci {}", bci))
    }

    fn i32_at(&self, bci: i32) -> Result<i32> {
        Ok(i32::from_be_bytes([
            self.byte_at(bci)?,
            self.byte_at(bci + 1)?,
            self.byte_at(bci + 2)?,
            self.byte_at(bci + 3)?,
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::*;

    #[test]
    fn test_sequential_decoding() {
        let code = [ICONST_1, ISTORE, 3, IINC, 3, 0xff, ILOAD_3, IRETURN];
        let mut s = BytecodeStream::new(&code).unwrap();

        assert_eq!(s.current_bc(), Some(ICONST_1));
        assert_eq!(s.next().unwrap(), Some(ISTORE));
        assert_eq!(s.read_local_index().unwrap(), 3);
        assert_eq!(s.next().unwrap(), Some(IINC));
        assert_eq!(s.current_bci(), 3);
        assert_eq!(s.read_iinc_increment().unwrap(), -1);
        assert_eq!(s.next().unwrap(), Some(ILOAD_3));
        assert_eq!(s.next().unwrap(), Some(IRETURN));
        assert_eq!(s.next().unwrap(), None);
        assert_eq!(s.current_bci(), 8);
    }

    #[test]
    fn test_wide_prefix() {
        let code = [WIDE, IINC, 0x01, 0x00, 0x80, 0x00, WIDE, ALOAD, 0x01, 0x02, RETURN];
        let mut s = BytecodeStream::new(&code).unwrap();
        assert_eq!(s.current_bc(), Some(IINC));
        assert!(s.is_wide());
        assert_eq!(s.read_local_index().unwrap(), 256);
        assert_eq!(s.read_iinc_increment().unwrap(), -32768);
        assert_eq!(s.next_bci(), 6);

        assert_eq!(s.next().unwrap(), Some(ALOAD));
        assert_eq!(s.read_local_index().unwrap(), 0x0102);
        assert_eq!(s.next().unwrap(), Some(RETURN));
        assert!(!s.is_wide());

        assert!(BytecodeStream::new(&[WIDE, IADD, 0, 0]).is_err());
    }

    #[test]
    fn test_branch_destinations() {
        let code = [NOP, GOTO, 0xff, 0xff, GOTO_W, 0, 0, 0, 5, RETURN];
        let mut s = BytecodeStream::new(&code).unwrap();
        s.next().unwrap();
        assert_eq!(s.read_branch_dest().unwrap(), 0);
        s.next().unwrap();
        assert_eq!(s.read_branch_dest().unwrap(), 9);
    }

    #[test]
    fn test_table_switch_alignment() {
        // tableswitch at bci 1, operands start at 4
        let mut code = vec![ILOAD_0, TABLESWITCH, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes()); // default
        code.extend_from_slice(&1i32.to_be_bytes()); // low
        code.extend_from_slice(&2i32.to_be_bytes()); // high
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&24i32.to_be_bytes());
        code.extend_from_slice(&[RETURN, RETURN, RETURN, RETURN]);

        let mut s = BytecodeStream::new(&code).unwrap();
        assert_eq!(s.next().unwrap(), Some(TABLESWITCH));
        assert_eq!(s.next_bci(), 24);
        let table = s.read_table_switch().unwrap();
        assert_eq!(table.low_key, 1);
        assert_eq!(table.high_key, 2);
        assert_eq!(table.default_dest, 21);
        assert_eq!(table.dests, vec![24, 25]);
        assert_eq!(table.number_of_cases(), 2);
    }

    #[test]
    fn test_lookup_switch() {
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&(-5i32).to_be_bytes());
        code.extend_from_slice(&21i32.to_be_bytes());
        code.extend_from_slice(&[RETURN, RETURN]);

        let s = BytecodeStream::new(&code).unwrap();
        assert_eq!(s.next_bci(), 20);
        let lookup = s.read_lookup_switch().unwrap();
        assert_eq!(lookup.keys, vec![-5]);
        assert_eq!(lookup.dests, vec![21]);
        assert_eq!(lookup.default_dest, 20);
    }

    #[test]
    fn test_truncated_instruction() {
        let mut s = BytecodeStream::new(&[NOP, SIPUSH, 1]).unwrap();
        assert!(s.next().is_err());
        assert!(BytecodeStream::new(&[TABLESWITCH, 0, 0]).is_err());
        assert!(s.set_bci(-1).is_err());
    }

    #[test]
    fn test_undefined_opcode_decodes() {
        let s = BytecodeStream::new(&[0xfe, RETURN]).unwrap();
        assert_eq!(s.current_bc(), Some(0xfe));
        assert_eq!(s.next_bci(), 1);
    }
}
