use std::fmt;

use thiserror::Error;

/// Where in the source a syntax error points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    End,
    /// The lexer produced the error; there is no lexeme to quote.
    Lexer,
    Lexeme(String),
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLocation::End => f.write_str(" at end"),
            ErrorLocation::Lexer => Ok(()),
            ErrorLocation::Lexeme(lexeme) => write!(f, " at '{}'", lexeme),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct Diagnostic {
    pub line: usize,
    pub location: ErrorLocation,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compilation failed with {} error(s)", .diagnostics.len())]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn messages(&self) -> Vec<&str> {
        self.diagnostics
            .iter()
            .map(|diagnostic| diagnostic.message.as_str())
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: u8, got: u8 },
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Operand stack overflow.")]
    OperandStackOverflow,
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("{name}: {message}")]
    Native { name: String, message: String },
    #[error("Unknown opcode {0}.")]
    UnknownOpcode(u8),
    #[error("Unexpected end of bytecode.")]
    UnexpectedEnd,
    #[error("Invalid bytecode: {0}.")]
    InvalidBytecode(&'static str),
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of a runtime error's call-stack report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub line: usize,
    /// `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{error}")]
    Runtime { error: RuntimeError, trace: Vec<TraceLine> },
}

impl InterpretError {
    /// Process exit status for this failure (sysexits: EX_DATAERR / EX_SOFTWARE).
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretError::Compile(_) => 65,
            InterpretError::Runtime { .. } => 70,
        }
    }
}
