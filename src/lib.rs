pub mod call_frame;
pub mod chunk;
pub mod compiler;
pub mod constants;
pub mod debug;
pub mod error;
pub mod memory;
pub mod objects;
pub mod scanner;
pub mod std_mod;
pub mod table;
pub mod value;
pub mod vm;

pub use chunk::{Chunk, OpCode};
pub use error::{CompileError, Diagnostic, InterpretError, RuntimeError, TraceLine};
pub use objects::object::NativeObject;
pub use value::Value;
pub use vm::VM;
