use std::io::{self, Stderr, Stdout, Write};

use crate::{
    call_frame::CallFrame,
    chunk::{Chunk, OpCode},
    compiler,
    constants::{MAX_FRAMES_SIZE, MAX_STACK_SIZE},
    debug,
    error::{InterpretError, RuntimeError, TraceLine},
    objects::{
        object::{NativeObject, ObjectRef, ObjectType},
        object_function::ObjectFunction,
        object_manager::ObjectManager,
        object_string::{hash_string, StringKey},
    },
    std_mod::time::ClockTime,
    table::Table,
    value::{format_number, Value},
};

/// A bytecode virtual machine.
///
/// Globals and interned strings outlive each `interpret` call, so one VM can
/// run a REPL session line by line. Program output goes to `out`, diagnostics
/// to `err`.
pub struct VM<O: Write = Stdout, E: Write = Stderr> {
    frames: Vec<CallFrame>,
    stack: Box<[Value]>,
    stack_top_pos: usize,
    object_manager: ObjectManager,
    intern_strings: Table,
    globals: Table,
    out: O,
    err: E,
}

impl VM {
    pub fn new() -> Self {
        VM::with_writers(io::stdout(), io::stderr())
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Write, E: Write> VM<O, E> {
    pub fn with_writers(out: O, err: E) -> Self {
        let mut vm = VM {
            frames: Vec::with_capacity(MAX_FRAMES_SIZE),
            stack: vec![Value::Nil; MAX_STACK_SIZE].into_boxed_slice(),
            stack_top_pos: 0,
            object_manager: ObjectManager::new(),
            intern_strings: Table::new(),
            globals: Table::new(),
            out,
            err,
        };
        vm.setup_standards();
        vm
    }

    fn setup_standards(&mut self) {
        self.define_native("clock", 0, ClockTime::new());
    }

    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = self.compile(source)?;
        self.execute(function)
    }

    /// Compiles `source` and returns its disassembly without running it.
    pub fn disassemble(&mut self, source: &str) -> Result<String, InterpretError> {
        let function = self.compile(source)?;
        match self.object_manager.as_function(function) {
            Some(function) => Ok(debug::disassemble_chunk(&function.chunk, "<script>", &self.object_manager)),
            None => Err(self.runtime_error(RuntimeError::InvalidBytecode("frame does not hold a function"))),
        }
    }

    fn compile(&mut self, source: &str) -> Result<ObjectRef, InterpretError> {
        match compiler::compile(source, &mut self.object_manager, &mut self.intern_strings) {
            Ok(function) => Ok(function),
            Err(error) => {
                for diagnostic in &error.diagnostics {
                    let _ = writeln!(self.err, "{}", diagnostic);
                }
                Err(error.into())
            }
        }
    }

    fn execute(&mut self, function: ObjectRef) -> Result<(), InterpretError> {
        self.reset_stack();
        self.start(function).map_err(|error| self.runtime_error(error))
    }

    fn start(&mut self, function: ObjectRef) -> Result<(), RuntimeError> {
        // The script occupies slot zero of its own frame.
        self.push(Value::Object(function))?;
        self.call_function(function, 0)?;
        self.run()
    }

    /// Installs a host function as the global `name`.
    pub fn define_native<T: NativeObject + 'static>(&mut self, name: &str, arity: u8, native: T) {
        let key = self.object_manager.copy_string(&mut self.intern_strings, name);
        let native = self.object_manager.alloc_native_function(name.to_string(), arity, native);
        self.globals.set(key, Value::Object(native));
    }

    /// Installs a bytecode function built by the host as the global `name`.
    pub fn define_function(&mut self, name: &str, arity: u8, chunk: Chunk) -> ObjectRef {
        let key = self.object_manager.copy_string(&mut self.intern_strings, name);
        let function = self
            .object_manager
            .alloc_function(ObjectFunction::with_chunk(arity, Some(key.object), chunk));
        self.globals.set(key, Value::Object(function));
        function
    }

    /// The interned string value for `chars`, for building host chunks.
    pub fn intern(&mut self, chars: &str) -> Value {
        let key = self.object_manager.copy_string(&mut self.intern_strings, chars);
        Value::Object(key.object)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        let object = self
            .intern_strings
            .find_string(&self.object_manager, name, hash_string(name))?;
        let key = self.object_manager.string_key(object)?;
        self.globals.get(key)
    }

    pub fn object_count(&self) -> usize {
        self.object_manager.len()
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    pub fn errors(&self) -> &E {
        &self.err
    }

    fn reset_stack(&mut self) {
        self.stack_top_pos = 0;
        self.frames.clear();
    }

    fn runtime_error(&mut self, error: RuntimeError) -> InterpretError {
        let _ = writeln!(self.err, "{}", error);

        let trace: Vec<TraceLine> = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.object_manager.as_function(frame.function());
                let line = function
                    .and_then(|function| {
                        function
                            .chunk
                            .read_line_from_offset(frame.current_ip().saturating_sub(1))
                    })
                    .unwrap_or(0);
                let name = function
                    .and_then(|function| function.name)
                    .and_then(|name| self.object_manager.as_string(name))
                    .map(|name| name.as_str().to_string());
                TraceLine { line, function: name }
            })
            .collect();
        for line in &trace {
            let _ = writeln!(self.err, "{}", line);
        }

        self.reset_stack();
        InterpretError::Runtime { error, trace }
    }

    #[inline(always)]
    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack_top_pos >= MAX_STACK_SIZE {
            return Err(RuntimeError::OperandStackOverflow);
        }

        self.stack[self.stack_top_pos] = value;
        self.stack_top_pos += 1;
        Ok(())
    }

    #[inline(always)]
    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.stack_top_pos == 0 {
            return Err(RuntimeError::StackUnderflow);
        }

        self.stack_top_pos -= 1;
        Ok(self.stack[self.stack_top_pos])
    }

    #[inline(always)]
    fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        if distance >= self.stack_top_pos {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack[self.stack_top_pos - distance - 1])
    }

    fn current_frame(&mut self) -> Result<&mut CallFrame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or(RuntimeError::InvalidBytecode("no active call frame"))
    }

    fn function_chunk(&self, function: ObjectRef) -> Result<&Chunk, RuntimeError> {
        self.object_manager
            .as_function(function)
            .map(ObjectFunction::chunk)
            .ok_or(RuntimeError::InvalidBytecode("frame does not hold a function"))
    }

    fn current_chunk(&self) -> Result<&Chunk, RuntimeError> {
        let frame = self
            .frames
            .last()
            .ok_or(RuntimeError::InvalidBytecode("no active call frame"))?;
        self.function_chunk(frame.function())
    }

    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(RuntimeError::InvalidBytecode("no active call frame"))?;
        let function = self
            .object_manager
            .as_function(frame.function())
            .ok_or(RuntimeError::InvalidBytecode("frame does not hold a function"))?;
        let byte = function
            .chunk
            .read_from_offset(frame.current_ip())
            .ok_or(RuntimeError::UnexpectedEnd)?;
        *frame.ip() += 1;
        Ok(byte)
    }

    fn read_short(&mut self) -> Result<usize, RuntimeError> {
        let high = self.read_byte()?;
        let low = self.read_byte()?;
        Ok(u16::from_be_bytes([high, low]) as usize)
    }

    fn read_constant(&mut self) -> Result<Value, RuntimeError> {
        let index = self.read_byte()? as usize;
        self.current_chunk()?
            .get_constant(index)
            .ok_or(RuntimeError::InvalidBytecode("constant index out of range"))
    }

    fn read_string(&mut self) -> Result<StringKey, RuntimeError> {
        let constant = self.read_constant()?;
        constant
            .as_object()
            .and_then(|object| self.object_manager.string_key(object))
            .ok_or(RuntimeError::InvalidBytecode("expected a string constant"))
    }

    fn local_index(&mut self) -> Result<usize, RuntimeError> {
        let slot = self.read_byte()? as usize;
        let index = self.current_frame()?.slot_base() + slot;
        if index >= self.stack_top_pos {
            return Err(RuntimeError::InvalidBytecode("local slot out of range"));
        }
        Ok(index)
    }

    fn string_text(&self, key: StringKey) -> String {
        self.object_manager
            .as_string(key.object)
            .map(|string| string.as_str().to_string())
            .unwrap_or_default()
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            debug_feature::trace_instruction(&*self);

            let byte = self.read_byte()?;
            let instruction = OpCode::from_byte(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            match instruction {
                OpCode::Constant => {
                    let constant = self.read_constant()?;
                    self.push(constant)?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::Dup => {
                    let value = self.peek(0)?;
                    self.push(value)?;
                }
                OpCode::GetLocal => {
                    let index = self.local_index()?;
                    self.push(self.stack[index])?;
                }
                OpCode::SetLocal => {
                    let index = self.local_index()?;
                    self.stack[index] = self.peek(0)?;
                }
                OpCode::GetGlobal => {
                    let name = self.read_string()?;
                    match self.globals.get(name) {
                        Some(value) => self.push(value)?,
                        None => return Err(RuntimeError::UndefinedVariable(self.string_text(name))),
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string()?;
                    let value = self.peek(0)?;
                    self.globals.set(name, value);
                    self.pop()?;
                }
                OpCode::SetGlobal => {
                    let name = self.read_string()?;
                    let value = self.peek(0)?;
                    // Assignment never creates a global.
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        return Err(RuntimeError::UndefinedVariable(self.string_text(name)));
                    }
                }
                OpCode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater
                | OpCode::Less
                | OpCode::Subtract
                | OpCode::Multiply
                | OpCode::Divide => self.binary_op(instruction)?,
                OpCode::Add => self.add()?,
                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                OpCode::Negate => {
                    let number = self.peek(0)?.as_number().ok_or(RuntimeError::OperandMustBeNumber)?;
                    self.stack[self.stack_top_pos - 1] = Value::Number(-number);
                }
                OpCode::Print => {
                    let value = self.pop()?;
                    writeln!(self.out, "{}", value.display(&self.object_manager))?;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short()?;
                    if self.peek(0)?.is_falsey() {
                        *self.current_frame()?.ip() += offset;
                    }
                }
                OpCode::Jump => {
                    let offset = self.read_short()?;
                    *self.current_frame()?.ip() += offset;
                }
                OpCode::Loop => {
                    let offset = self.read_short()?;
                    let ip = self.current_frame()?.ip();
                    *ip = ip
                        .checked_sub(offset)
                        .ok_or(RuntimeError::InvalidBytecode("loop jumps before the chunk start"))?;
                }
                OpCode::Call => {
                    let argument_count = self.read_byte()?;
                    let callee = self.peek(argument_count as usize)?;
                    self.call_value(callee, argument_count)?;
                }
                OpCode::Return => {
                    let result = self.pop()?;
                    let frame = self.frames.pop().ok_or(RuntimeError::InvalidBytecode("no active call frame"))?;
                    self.stack_top_pos = frame.slot_base();
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result)?;
                }
            }
        }
    }

    fn binary_op(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let (Some(b), Some(a)) = (self.peek(0)?.as_number(), self.peek(1)?.as_number()) else {
            return Err(RuntimeError::OperandsMustBeNumbers);
        };

        let result = match op {
            OpCode::Greater => Value::from(a > b),
            OpCode::Less => Value::from(a < b),
            OpCode::Subtract => Value::from(a - b),
            OpCode::Multiply => Value::from(a * b),
            OpCode::Divide => Value::from(a / b),
            _ => return Err(RuntimeError::InvalidBytecode("not a binary operator")),
        };
        self.stack_top_pos -= 2;
        self.push(result)
    }

    fn add(&mut self) -> Result<(), RuntimeError> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;

        if let (Some(a), Some(b)) = (a.as_number(), b.as_number()) {
            self.stack_top_pos -= 2;
            return self.push(Value::Number(a + b));
        }

        // At least one side is a string here, or the operands are invalid.
        let mut combined = String::new();
        if !self.append_text(a, &mut combined) || !self.append_text(b, &mut combined) {
            return Err(RuntimeError::InvalidAddOperands);
        }

        self.stack_top_pos -= 2;
        let key = self.object_manager.take_string(&mut self.intern_strings, combined);
        self.push(Value::Object(key.object))
    }

    /// Appends the concatenation text of a string or number operand.
    fn append_text(&self, value: Value, buffer: &mut String) -> bool {
        match value {
            Value::Number(number) => buffer.push_str(&format_number(number)),
            _ => match self.object_manager.string_value(&value) {
                Some(string) => buffer.push_str(string.as_str()),
                None => return false,
            },
        }
        true
    }

    fn call_value(&mut self, callee: Value, argument_count: u8) -> Result<(), RuntimeError> {
        let object = callee.as_object().ok_or(RuntimeError::NotCallable)?;
        match self.object_manager.obj_type(object) {
            Some(ObjectType::ObjFunction) => self.call_function(object, argument_count),
            Some(ObjectType::ObjNativeFunction) => self.call_native(object, argument_count),
            _ => Err(RuntimeError::NotCallable),
        }
    }

    fn call_function(&mut self, function: ObjectRef, argument_count: u8) -> Result<(), RuntimeError> {
        let arity = self
            .object_manager
            .as_function(function)
            .ok_or(RuntimeError::NotCallable)?
            .arity;
        if arity != argument_count {
            return Err(RuntimeError::ArityMismatch {
                expected: arity,
                got: argument_count,
            });
        }

        if self.frames.len() >= MAX_FRAMES_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        let slot_base = self
            .stack_top_pos
            .checked_sub(argument_count as usize + 1)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.frames.push(CallFrame::new(function, slot_base));
        Ok(())
    }

    fn call_native(&mut self, native: ObjectRef, argument_count: u8) -> Result<(), RuntimeError> {
        let native = self
            .object_manager
            .as_native_function(native)
            .ok_or(RuntimeError::NotCallable)?;
        if native.arity != argument_count {
            return Err(RuntimeError::ArityMismatch {
                expected: native.arity,
                got: argument_count,
            });
        }

        let args_start = self.stack_top_pos - argument_count as usize;
        let result = native
            .invoke(&self.stack[args_start..self.stack_top_pos])
            .map_err(|message| RuntimeError::Native {
                name: native.name.clone(),
                message,
            })?;

        // Drop the callee along with its arguments.
        self.stack_top_pos = args_start - 1;
        self.push(result)
    }
}

#[cfg(feature = "debug_trace_execution")]
mod debug_feature {
    use super::*;

    pub fn trace_instruction<O: Write, E: Write>(vm: &VM<O, E>) {
        let Some(frame) = vm.frames.last() else {
            return;
        };
        let Ok(chunk) = vm.function_chunk(frame.function()) else {
            return;
        };

        let mut trace = String::from("          ");
        for value in &vm.stack[..vm.stack_top_pos] {
            trace.push_str(&format!("[ {} ]", value.display(&vm.object_manager)));
        }
        trace.push('\n');
        debug::disassemble_instruction(chunk, frame.current_ip(), &vm.object_manager, &mut trace);
        eprint!("{}", trace);
    }
}

#[cfg(not(feature = "debug_trace_execution"))]
mod debug_feature {
    use super::*;

    #[inline(always)]
    pub fn trace_instruction<O: Write, E: Write>(_vm: &VM<O, E>) {}
}
