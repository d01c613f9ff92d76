//! Decoding of method bytecode.
//!
//! Instructions are decoded on demand from the raw code array. The array
//! itself is only ever patched in place, so branch offsets, exception
//! ranges and stack map frames stay valid.

use super::bytes::{ClassReader, ClassWriter};
use super::{Attribute, ClassError};
use super::constant_pool::ConstantPool;

/// Opcodes the remapper inspects.
#[allow(missing_docs)]
pub mod opcodes {
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_5: u8 = 0x08;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const ALOAD_0: u8 = 0x2A;
    pub const RETURN: u8 = 0xB1;
    pub const GETSTATIC: u8 = 0xB2;
    pub const INVOKESPECIAL: u8 = 0xB7;
    pub const INVOKESTATIC: u8 = 0xB8;
    pub const INVOKEINTERFACE: u8 = 0xB9;
    pub const INVOKEDYNAMIC: u8 = 0xBA;
    pub const NEW: u8 = 0xBB;
    pub const ANEWARRAY: u8 = 0xBD;
    pub const CHECKCAST: u8 = 0xC0;
    pub const INSTANCEOF: u8 = 0xC1;
    pub const WIDE: u8 = 0xC4;
    pub const MULTIANEWARRAY: u8 = 0xC5;
    pub const TABLESWITCH: u8 = 0xAA;
    pub const LOOKUPSWITCH: u8 = 0xAB;
    pub const IINC: u8 = 0x84;
}

use opcodes::*;

/// A `Code` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    /// Maximum operand stack depth.
    pub max_stack: u16,
    /// Number of local variable slots.
    pub max_locals: u16,
    /// The raw bytecode.
    pub code: Vec<u8>,
    /// Exception handlers.
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes such as `LineNumberTable`.
    pub attributes: Vec<Attribute>,
}

/// An entry of the exception table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range.
    pub start_pc: u16,
    /// End of the protected range, exclusive.
    pub end_pc: u16,
    /// Start of the handler.
    pub handler_pc: u16,
    /// Caught class, or 0 for any.
    pub catch_type: u16,
}

/// A decoded instruction borrowing its operands from the code array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction<'c> {
    /// Offset of the opcode in the code array.
    pub offset: usize,
    /// The opcode.
    pub opcode: u8,
    /// The operand bytes, including switch padding.
    pub operands: &'c [u8],
}

impl Instruction<'_> {
    /// The constant pool index this instruction refers to, if any.
    pub fn constant_index(&self) -> Option<u16> {
        match (self.opcode, self.operands) {
            (LDC, [index, ..]) => Some(*index as u16),
            (opcode, [high, low, ..]) if has_u2_constant(opcode) => {
                Some(u16::from_be_bytes([*high, *low]))
            }
            _ => None,
        }
    }

    /// Whether this is `ldc` or `ldc_w`.
    pub fn is_ldc(&self) -> bool {
        matches!(self.opcode, LDC | LDC_W)
    }
}

impl Code {
    pub(crate) fn parse(
        reader: &mut ClassReader<'_>,
        pool: &ConstantPool,
    ) -> Result<Self, ClassError> {
        let max_stack = reader.read_u2()?;
        let max_locals = reader.read_u2()?;
        let code_length = reader.read_u4()? as usize;
        let code = reader.read_slice(code_length)?.to_vec();

        let handlers = reader.read_u2()?;
        let exception_table = (0..handlers)
            .map(|_| {
                Ok(ExceptionHandler {
                    start_pc: reader.read_u2()?,
                    end_pc: reader.read_u2()?,
                    handler_pc: reader.read_u2()?,
                    catch_type: reader.read_u2()?,
                })
            })
            .collect::<Result<_, ClassError>>()?;

        let attributes = Attribute::parse_all(reader, pool)?;

        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub(crate) fn write(&self, writer: &mut ClassWriter) -> Result<(), ClassError> {
        writer.write_u2(self.max_stack);
        writer.write_u2(self.max_locals);
        writer.write_blob(&self.code, "code")?;
        writer.write_count(self.exception_table.len(), "exception table")?;
        for handler in &self.exception_table {
            writer.write_u2(handler.start_pc);
            writer.write_u2(handler.end_pc);
            writer.write_u2(handler.handler_pc);
            writer.write_u2(handler.catch_type);
        }
        Attribute::write_all(&self.attributes, writer)
    }

    /// Iterates over the instructions of the code array.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            code: &self.code,
            offset: 0,
        }
    }

    /// Rewrites the constant pool operand of the instruction at `offset`.
    ///
    /// `offset` must be an instruction boundary. Returns `false` without
    /// touching the code if the instruction has no constant operand or if
    /// `index` does not fit an `ldc` operand.
    pub fn set_constant_index(&mut self, offset: usize, index: u16) -> bool {
        match self.code.get(offset).copied() {
            Some(LDC) => match (u8::try_from(index), self.code.get_mut(offset + 1)) {
                (Ok(index), Some(slot)) => {
                    *slot = index;
                    true
                }
                _ => false,
            },
            Some(opcode) if has_u2_constant(opcode) => {
                match self.code.get_mut(offset + 1..offset + 3) {
                    Some(slot) => {
                        slot.copy_from_slice(&index.to_be_bytes());
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }
}

/// Iterator over the instructions of a [`Code`] attribute.
#[derive(Clone, Debug)]
pub struct Instructions<'c> {
    code: &'c [u8],
    offset: usize,
}

impl<'c> Iterator for Instructions<'c> {
    type Item = Result<Instruction<'c>, ClassError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let opcode = *self.code.get(offset)?;
        let result = instruction_length(self.code, offset).and_then(|length| {
            self.code
                .get(offset + 1..offset + length)
                .ok_or(ClassError::UnexpectedEof)
                .map(|operands| (length, operands))
        });
        match result {
            Ok((length, operands)) => {
                self.offset += length;
                Some(Ok(Instruction {
                    offset,
                    opcode,
                    operands,
                }))
            }
            Err(err) => {
                self.offset = self.code.len();
                Some(Err(err))
            }
        }
    }
}

/// Opcodes whose first operand is a two byte constant pool index.
fn has_u2_constant(opcode: u8) -> bool {
    matches!(
        opcode,
        LDC_W
            | LDC2_W
            | GETSTATIC..=INVOKEDYNAMIC
            | NEW
            | ANEWARRAY
            | CHECKCAST
            | INSTANCEOF
            | MULTIANEWARRAY
    )
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, ClassError> {
    let bytes = code.get(at..at + 4).ok_or(ClassError::UnexpectedEof)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Length of the instruction at `offset`, opcode included.
fn instruction_length(code: &[u8], offset: usize) -> Result<usize, ClassError> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0F => 1,
        BIPUSH => 2,
        SIPUSH => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1A..=0x35 => 1,
        0x36..=0x3A => 2,
        0x3B..=0x83 => 1,
        IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xA8 => 3,
        0xA9 => 2,
        TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return Err(ClassError::InvalidOpcode { opcode, offset });
            }
            let cases = (high as i64 - low as i64 + 1) as usize;
            base - offset + 12 + cases * 4
        }
        LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let pairs = read_i32(code, base + 4)?;
            let pairs = usize::try_from(pairs)
                .map_err(|_| ClassError::InvalidOpcode { opcode, offset })?;
            base - offset + 8 + pairs * 8
        }
        0xAC..=0xB1 => 1,
        GETSTATIC..=INVOKESTATIC => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        0xBC => 2,
        ANEWARRAY => 3,
        0xBE | 0xBF => 1,
        CHECKCAST | INSTANCEOF => 3,
        0xC2 | 0xC3 => 1,
        WIDE => match code.get(offset + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(ClassError::UnexpectedEof),
        },
        MULTIANEWARRAY => 4,
        0xC6 | 0xC7 => 3,
        0xC8 | 0xC9 => 5,
        _ => return Err(ClassError::InvalidOpcode { opcode, offset }),
    };
    Ok(length)
}

/// Switch operands start at the next multiple of four.
fn padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(bytes: &[u8]) -> Code {
        Code {
            max_stack: 4,
            max_locals: 1,
            code: bytes.to_vec(),
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_decode_simple() {
        let code = code(&[
            ALOAD_0,
            LDC,
            7,
            LDC_W,
            0x01,
            0x02,
            ICONST_M1,
            INVOKESPECIAL,
            0,
            9,
            RETURN,
        ]);
        let instructions: Vec<_> = code.instructions().collect::<Result<_, _>>().unwrap();
        let offsets: Vec<_> = instructions.iter().map(|insn| insn.offset).collect();
        assert_eq!(offsets, [0, 1, 3, 6, 7, 10]);
        assert_eq!(instructions[1].constant_index(), Some(7));
        assert_eq!(instructions[2].constant_index(), Some(0x0102));
        assert_eq!(instructions[4].constant_index(), Some(9));
        assert_eq!(instructions[3].constant_index(), None);
        assert!(instructions[1].is_ldc() && instructions[2].is_ldc());
    }

    #[test]
    fn test_decode_switches() {
        // offset 0: iload_0, offset 1: tableswitch padded to offset 4
        let mut bytes = vec![0x1A, TABLESWITCH, 0, 0];
        bytes.extend_from_slice(&20i32.to_be_bytes()); // default
        bytes.extend_from_slice(&1i32.to_be_bytes()); // low
        bytes.extend_from_slice(&2i32.to_be_bytes()); // high
        bytes.extend_from_slice(&[0; 8]);
        // offset 24: lookupswitch padded to offset 28
        bytes.extend_from_slice(&[LOOKUPSWITCH, 0, 0, 0]);
        bytes.extend_from_slice(&8i32.to_be_bytes()); // default
        bytes.extend_from_slice(&1i32.to_be_bytes()); // npairs
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[WIDE, IINC, 0, 1, 0, 1, WIDE, 0x15, 0, 1, RETURN]);

        let code = code(&bytes);
        let offsets: Vec<_> = code
            .instructions()
            .map(|insn| insn.map(|insn| insn.offset))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(offsets, [0, 1, 24, 44, 50, 54]);
    }

    #[test]
    fn test_decode_truncated() {
        let code = code(&[LDC_W, 0]);
        let mut instructions = code.instructions();
        assert_eq!(instructions.next(), Some(Err(ClassError::UnexpectedEof)));
        assert_eq!(instructions.next(), None);

        let code = self::code(&[0xFE]);
        assert!(matches!(
            code.instructions().next(),
            Some(Err(ClassError::InvalidOpcode { opcode: 0xFE, offset: 0 }))
        ));
    }

    #[test]
    fn test_set_constant_index() {
        let mut code = code(&[LDC, 3, LDC_W, 0, 4, RETURN]);
        assert!(code.set_constant_index(0, 200));
        assert!(!code.set_constant_index(0, 300));
        assert!(code.set_constant_index(2, 300));
        assert!(!code.set_constant_index(5, 1));
        assert_eq!(code.code, [LDC, 200, LDC_W, 0x01, 0x2C, RETURN]);
    }
}
