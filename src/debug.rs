use std::fmt::Write;

use crate::chunk::{Chunk, OpCode};
use crate::objects::object_manager::ObjectManager;

pub fn disassemble_chunk(chunk: &Chunk, name: &str, objects: &ObjectManager) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", name);

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset, objects, &mut out);
    }
    out
}

/// Appends one instruction's listing to `out` and returns the offset of the next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, objects: &ObjectManager, out: &mut String) -> usize {
    let _ = write!(out, "{:08} ", offset);
    let line = chunk.read_line_from_offset(offset);
    if offset > 0 && line == chunk.read_line_from_offset(offset - 1) {
        out.push_str("       | ");
    } else {
        let _ = write!(out, "{:8} ", line.unwrap_or(0));
    }

    let byte = match chunk.read_from_offset(offset) {
        Some(byte) => byte,
        None => {
            out.push_str("<end of chunk>\n");
            return offset + 1;
        }
    };

    match OpCode::from_byte(byte) {
        Some(
            op @ (OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal),
        ) => constant_instruction(op, chunk, offset, objects, out),
        Some(op @ (OpCode::GetLocal | OpCode::SetLocal | OpCode::Call)) => {
            byte_instruction(op, chunk, offset, out)
        }
        Some(op @ (OpCode::Jump | OpCode::JumpIfFalse)) => jump_instruction(op, 1, chunk, offset, out),
        Some(op @ OpCode::Loop) => jump_instruction(op, -1, chunk, offset, out),
        Some(op) => simple_instruction(op, offset, out),
        None => {
            let _ = writeln!(out, "Unknown opcode {}", byte);
            offset + 1
        }
    }
}

fn jump_instruction(op: OpCode, sign: isize, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let (Some(high), Some(low)) = (chunk.read_from_offset(offset + 1), chunk.read_from_offset(offset + 2)) else {
        let _ = writeln!(out, "{:<16} <truncated>", op.to_string());
        return chunk.len();
    };

    let jump = u16::from_be_bytes([high, low]) as isize;
    let target = offset as isize + 3 + sign * jump;
    let _ = writeln!(out, "{:<16} {:>4} -> {}", op.to_string(), offset, target);
    offset + 3
}

fn constant_instruction(op: OpCode, chunk: &Chunk, offset: usize, objects: &ObjectManager, out: &mut String) -> usize {
    let Some(constant) = chunk.read_from_offset(offset + 1) else {
        let _ = writeln!(out, "{:<16} <truncated>", op.to_string());
        return chunk.len();
    };

    let _ = write!(out, "{:<16} {:>4} '", op.to_string(), constant);
    match chunk.get_constant(constant as usize) {
        Some(value) => {
            let _ = write!(out, "{}", value.display(objects));
        }
        None => out.push_str("<missing>"),
    }
    out.push_str("'\n");
    offset + 2
}

fn simple_instruction(op: OpCode, offset: usize, out: &mut String) -> usize {
    let _ = writeln!(out, "{}", op);
    offset + 1
}

fn byte_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let Some(slot) = chunk.read_from_offset(offset + 1) else {
        let _ = writeln!(out, "{:<16} <truncated>", op.to_string());
        return chunk.len();
    };

    let _ = writeln!(out, "{:<16} {:>4}", op.to_string(), slot);
    offset + 2
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{table::Table, value::Value};

    #[test]
    fn test_disassemble_chunk() {
        let mut objects = ObjectManager::new();
        let mut strings = Table::new();
        let name = objects.copy_string(&mut strings, "answer");

        let mut chunk = Chunk::new();
        let number = chunk.add_constant(Value::Number(42.0)) as u8;
        let global = chunk.add_constant(Value::Object(name.object)) as u8;
        chunk.write_op(OpCode::Constant, 1);
        chunk.write(number, 1);
        chunk.write_op(OpCode::DefineGlobal, 1);
        chunk.write(global, 1);
        chunk.write_op(OpCode::GetLocal, 2);
        chunk.write(1, 2);
        chunk.write_op(OpCode::JumpIfFalse, 2);
        chunk.write(0, 2);
        chunk.write(1, 2);
        chunk.write_op(OpCode::Pop, 2);
        chunk.write_op(OpCode::Loop, 3);
        chunk.write(0, 3);
        chunk.write(13, 3);
        chunk.write(250, 3);

        let listing = disassemble_chunk(&chunk, "test", &objects);
        let expected = [
            "== test ==",
            "00000000        1 Constant            0 '42'",
            "00000002        | DefineGlobal        1 'answer'",
            "00000004        2 GetLocal            1",
            "00000006        | JumpIfFalse         6 -> 10",
            "00000009        | Pop",
            "00000010        3 Loop               10 -> 0",
            "00000013        | Unknown opcode 250",
            "",
        ]
        .join("\n");
        assert_eq!(listing, expected);
    }

    #[test]
    fn test_truncated_operand() {
        let objects = ObjectManager::new();
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write(0, 1);

        let listing = disassemble_chunk(&chunk, "cut", &objects);
        assert!(listing.ends_with("Jump             <truncated>\n"));
    }
}
