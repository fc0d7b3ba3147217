use strum_macros::{Display, EnumString, FromRepr};

use crate::value::{Value, ValueArray};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, FromRepr)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Pop,
    Dup,
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    JumpIfFalse,
    Jump,
    Loop,
    Call,
    Return,
}

impl OpCode {
    #[inline(always)]
    pub fn from_byte(byte: u8) -> Option<Self> {
        OpCode::from_repr(byte)
    }

    #[inline(always)]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<usize>,
    pub constants: ValueArray,
}

impl Chunk {
    pub fn new() -> Chunk {
        Chunk {
            code: vec![],
            lines: vec![],
            constants: vec![],
        }
    }

    pub fn write(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line)
    }

    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.write(op.to_byte(), line)
    }

    /// Appends `value` to the constant pool and returns its index. The caller
    /// is responsible for rejecting indices that do not fit an operand byte.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Index of an existing constant that is interchangeable with `value`:
    /// the same object, or a number with the same bit pattern.
    pub fn find_constant(&self, value: Value) -> Option<usize> {
        self.constants.iter().position(|constant| match (constant, value) {
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Object(a), Value::Object(b)) => *a == b,
            _ => false,
        })
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[inline(always)]
    pub fn read_from_offset(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    pub fn read_line_from_offset(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    #[inline(always)]
    pub fn get_constant(&self, index: usize) -> Option<Value> {
        self.constants.get(index).copied()
    }
}
