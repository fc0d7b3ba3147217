use crate::{
    chunk::{Chunk, OpCode},
    constants::{MAX_ARGUMENTS, MAX_CONSTANTS, MAX_LOCALS},
    error::{CompileError, Diagnostic, ErrorLocation},
    objects::{object::ObjectRef, object_function::ObjectFunction, object_manager::ObjectManager},
    scanner::{Scanner, Token, TokenType},
    table::Table,
    value::Value,
};

/// Compiles `source` into the top-level script function.
///
/// Identifiers and string literals are interned into `intern_strings` even when
/// compilation fails; no function object is allocated in that case.
pub fn compile(
    source: &str,
    object_manager: &mut ObjectManager,
    intern_strings: &mut Table,
) -> Result<ObjectRef, CompileError> {
    let mut compiler = Compiler::new(source, object_manager, intern_strings);
    compiler.advance();

    while !compiler.match_token(TokenType::Eof) {
        compiler.declaration();
    }

    compiler.end_compiler()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserMode {
    Normal,
    /// An error was reported; further errors are dropped until the next statement boundary.
    Recovering,
}

struct Parser<'src> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    mode: ParserMode,
    diagnostics: Vec<Diagnostic>,
}

struct Local<'src> {
    name: Token<'src>,
    /// `None` while the initializer is being compiled.
    depth: Option<usize>,
}

struct Compiler<'src, 'heap> {
    parser: Parser<'src>,
    locals: Vec<Local<'src>>,
    scope_depth: usize,
    /// Name of the global whose initializer is being compiled.
    initializing_global: Option<&'src str>,
    function: ObjectFunction,
    object_manager: &'heap mut ObjectManager,
    intern_strings: &'heap mut Table,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefixRule {
    Grouping,
    Unary,
    Number,
    String,
    Literal,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfixRule {
    Binary,
    And,
    Or,
    Call,
}

#[derive(Debug, Clone, Copy)]
struct ParseRule {
    prefix: Option<PrefixRule>,
    infix: Option<InfixRule>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<PrefixRule>, infix: Option<InfixRule>, precedence: Precedence) -> Self {
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }
}

const fn get_rule(token_type: TokenType) -> ParseRule {
    use InfixRule as I;
    use PrefixRule as P;

    match token_type {
        TokenType::LeftParen => ParseRule::new(Some(P::Grouping), Some(I::Call), Precedence::Call),
        TokenType::Minus => ParseRule::new(Some(P::Unary), Some(I::Binary), Precedence::Term),
        TokenType::Plus => ParseRule::new(None, Some(I::Binary), Precedence::Term),
        TokenType::Slash | TokenType::Star => ParseRule::new(None, Some(I::Binary), Precedence::Factor),
        TokenType::Bang => ParseRule::new(Some(P::Unary), None, Precedence::None),
        TokenType::BangEqual | TokenType::EqualEqual => {
            ParseRule::new(None, Some(I::Binary), Precedence::Equality)
        }
        TokenType::Greater | TokenType::GreaterEqual | TokenType::Less | TokenType::LessEqual => {
            ParseRule::new(None, Some(I::Binary), Precedence::Comparison)
        }
        TokenType::Identifier => ParseRule::new(Some(P::Variable), None, Precedence::None),
        TokenType::String => ParseRule::new(Some(P::String), None, Precedence::None),
        TokenType::Number => ParseRule::new(Some(P::Number), None, Precedence::None),
        TokenType::False | TokenType::True | TokenType::Nil => {
            ParseRule::new(Some(P::Literal), None, Precedence::None)
        }
        TokenType::And => ParseRule::new(None, Some(I::And), Precedence::And),
        TokenType::Or => ParseRule::new(None, Some(I::Or), Precedence::Or),
        _ => ParseRule::new(None, None, Precedence::None),
    }
}

impl<'src, 'heap> Compiler<'src, 'heap> {
    fn new(
        source: &'src str,
        object_manager: &'heap mut ObjectManager,
        intern_strings: &'heap mut Table,
    ) -> Compiler<'src, 'heap> {
        let eof = Token {
            token_type: TokenType::Eof,
            value: "",
            line: 0,
        };

        Compiler {
            parser: Parser {
                scanner: Scanner::new(source),
                current: eof,
                previous: eof,
                mode: ParserMode::Normal,
                diagnostics: vec![],
            },
            // Slot zero holds the function being called.
            locals: vec![Local {
                name: Token::synthetic(""),
                depth: Some(0),
            }],
            scope_depth: 0,
            initializing_global: None,
            function: ObjectFunction::new(0, None),
            object_manager,
            intern_strings,
        }
    }

    fn advance(&mut self) {
        self.parser.previous = self.parser.current;
        loop {
            self.parser.current = self.parser.scanner.scan_token();
            if self.parser.current.token_type != TokenType::Error {
                break;
            }

            self.error_at_current(self.parser.current.value);
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }

        self.advance();
        true
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.parser.current.token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType, message: &str) {
        if self.parser.current.token_type == token_type {
            self.advance();
            return;
        }

        self.error_at_current(message);
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.parser.previous.line;
        self.current_chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.to_byte());
    }

    fn emit_ops(&mut self, op1: OpCode, op2: OpCode) {
        self.emit_op(op1);
        self.emit_op(op2);
    }

    fn emit_with_operand(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_with_operand(OpCode::Constant, index);
    }

    fn emit_return(&mut self) {
        self.emit_ops(OpCode::Nil, OpCode::Return);
    }

    fn end_compiler(mut self) -> Result<ObjectRef, CompileError> {
        self.emit_return();

        if !self.parser.diagnostics.is_empty() {
            return Err(CompileError {
                diagnostics: self.parser.diagnostics,
            });
        }

        debug_feature::disassemble_chunk(&self);
        Ok(self.object_manager.alloc_function(self.function))
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if let Some(index) = self.current_chunk().find_constant(value) {
            return index as u8;
        }

        let constant_index = self.current_chunk().add_constant(value);
        if constant_index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        constant_index as u8
    }

    fn number(&mut self) {
        match self.parser.previous.value.parse::<f64>() {
            Ok(number) => self.emit_constant(Value::Number(number)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        // Trim the leading and trailing quotation marks.
        let lexeme = self.parser.previous.value;
        let content = &lexeme[1..lexeme.len() - 1];
        let key = self.object_manager.copy_string(self.intern_strings, content);
        self.emit_constant(Value::Object(key.object));
    }

    fn declaration(&mut self) {
        if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else if self.match_token(TokenType::Fun) {
            self.unsupported_declaration("Function declarations are not supported.");
        } else if self.match_token(TokenType::Class) {
            self.unsupported_declaration("Class declarations are not supported.");
        } else {
            self.statement();
        }

        if self.parser.mode == ParserMode::Recovering {
            self.synchronize();
        }
    }

    /// Reports the declaration and skips its header. A braced body is
    /// skipped whole; anything else is left to `synchronize`.
    fn unsupported_declaration(&mut self, message: &str) {
        self.error(message);

        while !matches!(
            self.parser.current.token_type,
            TokenType::LeftBrace | TokenType::RightBrace | TokenType::Semicolon | TokenType::Eof
        ) {
            self.advance();
        }
        if !self.check(TokenType::LeftBrace) {
            return;
        }

        let mut depth = 0usize;
        loop {
            match self.parser.current.token_type {
                TokenType::Eof => return,
                TokenType::LeftBrace => depth += 1,
                TokenType::RightBrace => depth -= 1,
                _ => {}
            }
            self.advance();
            if depth == 0 {
                break;
            }
        }
        self.parser.mode = ParserMode::Normal;
    }

    fn variable_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.scope_depth == 0 {
            self.initializing_global = Some(self.parser.previous.value);
        }
        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.initializing_global = None;
        self.consume(TokenType::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenType::Identifier, message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.parser.previous)
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }

        let variable_name = self.parser.previous;
        let duplicate = self
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.map_or(true, |depth| depth >= self.scope_depth))
            .any(|local| Self::identifier_equal(&variable_name, &local.name));
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(variable_name);
    }

    fn add_local(&mut self, variable_name: Token<'src>) {
        if self.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }

        self.locals.push(Local {
            name: variable_name,
            depth: None,
        });
    }

    fn identifier_constant(&mut self, name: Token) -> u8 {
        let key = self.object_manager.copy_string(self.intern_strings, name.value);
        self.make_constant(Value::Object(key.object))
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }

        self.emit_with_operand(OpCode::DefineGlobal, global);
    }

    fn mark_initialized(&mut self) {
        let scope_depth = self.scope_depth;
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(scope_depth);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.parser.previous, can_assign)
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let (get_op, set_op, operand) = match self.resolve_local(&name) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                if self.initializing_global == Some(name.value) {
                    self.error("Can't read global variable in its own initializer.");
                }
                let index = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, index)
            }
        };

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_with_operand(set_op, operand);
        } else {
            self.emit_with_operand(get_op, operand);
        }
    }

    fn resolve_local(&mut self, name: &Token) -> Option<u8> {
        let (index, initialized) = self
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| Self::identifier_equal(name, &local.name))
            .map(|(index, local)| (index, local.depth.is_some()))?;

        if !initialized {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(index as u8)
    }

    fn identifier_equal(left: &Token, right: &Token) -> bool {
        left.value == right.value
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);

        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let argument_count = self.argument_list();
        self.emit_with_operand(OpCode::Call, argument_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argument_count = 0usize;
        if !self.check(TokenType::RightParen) {
            loop {
                self.expression();
                if argument_count == MAX_ARGUMENTS {
                    self.error("Can't have more than 255 arguments.");
                }
                argument_count += 1;

                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen, "Expect ')' after arguments.");
        argument_count.min(MAX_ARGUMENTS) as u8
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::Print) {
            self.print_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop); // the condition
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    /// Emits `instruction` with a placeholder operand and returns the operand's offset.
    fn emit_jump(&mut self, instruction: OpCode) -> usize {
        self.emit_op(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // -2 to adjust for the bytecode for the jump offset itself.
        let jump = self.current_chunk().len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }

        let [high, low] = (jump as u16).to_be_bytes();
        let chunk = self.current_chunk();
        chunk.code[offset] = high;
        chunk.code[offset + 1] = low;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);

        // +2 to skip the operand of the 'Loop' instruction itself.
        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        let [high, low] = (offset.min(u16::MAX as usize) as u16).to_be_bytes();
        self.emit_byte(high);
        self.emit_byte(low);
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;

        while self
            .locals
            .last()
            .is_some_and(|local| local.depth.map_or(true, |depth| depth > self.scope_depth))
        {
            self.emit_op(OpCode::Pop);
            self.locals.pop();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn return_statement(&mut self) {
        // Only the top-level script is compiled, so there is never a function to return from.
        self.error("Can't return from top-level code.");

        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
        }
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();

        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);

        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenType::Var) {
            self.variable_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump = None;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");

            // Jump out of the loop if the condition is false.
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenType::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn unary(&mut self) {
        let operator_type = self.parser.previous.token_type;

        self.parse_precedence(Precedence::Unary);

        match operator_type {
            TokenType::Bang => self.emit_op(OpCode::Not),
            TokenType::Minus => self.emit_op(OpCode::Negate),
            _ => {}
        }
    }

    fn binary(&mut self) {
        let operator_type = self.parser.previous.token_type;
        let rule = get_rule(operator_type);
        self.parse_precedence(rule.precedence.next());

        match operator_type {
            TokenType::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenType::EqualEqual => self.emit_op(OpCode::Equal),
            TokenType::Greater => self.emit_op(OpCode::Greater),
            TokenType::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenType::Less => self.emit_op(OpCode::Less),
            TokenType::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            TokenType::Plus => self.emit_op(OpCode::Add),
            TokenType::Minus => self.emit_op(OpCode::Subtract),
            TokenType::Star => self.emit_op(OpCode::Multiply),
            TokenType::Slash => self.emit_op(OpCode::Divide),
            _ => {}
        }
    }

    fn literal(&mut self) {
        match self.parser.previous.token_type {
            TokenType::False => self.emit_op(OpCode::False),
            TokenType::True => self.emit_op(OpCode::True),
            TokenType::Nil => self.emit_op(OpCode::Nil),
            _ => {}
        }
    }

    fn apply_prefix(&mut self, rule: PrefixRule, can_assign: bool) {
        match rule {
            PrefixRule::Grouping => self.grouping(),
            PrefixRule::Unary => self.unary(),
            PrefixRule::Number => self.number(),
            PrefixRule::String => self.string(),
            PrefixRule::Literal => self.literal(),
            PrefixRule::Variable => self.variable(can_assign),
        }
    }

    fn apply_infix(&mut self, rule: InfixRule) {
        match rule {
            InfixRule::Binary => self.binary(),
            InfixRule::And => self.and(),
            InfixRule::Or => self.or(),
            InfixRule::Call => self.call(),
        }
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;
        match get_rule(self.parser.previous.token_type).prefix {
            Some(prefix) => self.apply_prefix(prefix, can_assign),
            None => {
                self.error("Expect expression.");
                return;
            }
        }

        while precedence <= get_rule(self.parser.current.token_type).precedence {
            self.advance();
            if let Some(infix) = get_rule(self.parser.previous.token_type).infix {
                self.apply_infix(infix);
            }
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn synchronize(&mut self) {
        self.parser.mode = ParserMode::Normal;
        while self.parser.current.token_type != TokenType::Eof {
            if self.parser.previous.token_type == TokenType::Semicolon {
                return;
            }

            match self.parser.current.token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => (),
            }

            self.advance()
        }
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.parser.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.parser.current, message);
    }

    fn error_at(&mut self, token: Token, message: &str) {
        if self.parser.mode == ParserMode::Recovering {
            return;
        }
        self.parser.mode = ParserMode::Recovering;

        let location = match token.token_type {
            TokenType::Eof => ErrorLocation::End,
            TokenType::Error => ErrorLocation::Lexer,
            _ => ErrorLocation::Lexeme(token.value.to_string()),
        };
        self.parser.diagnostics.push(Diagnostic {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }
}

#[cfg(feature = "debug_print_code")]
mod debug_feature {
    use super::*;
    use crate::debug;

    pub fn disassemble_chunk(compiler: &Compiler) {
        eprint!(
            "{}",
            debug::disassemble_chunk(&compiler.function.chunk, "<script>", &*compiler.object_manager)
        );
    }
}

#[cfg(not(feature = "debug_print_code"))]
mod debug_feature {
    use super::*;

    #[inline(always)]
    pub fn disassemble_chunk(_compiler: &Compiler) {}
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn compile_source(source: &str) -> (ObjectManager, Table, Result<ObjectRef, CompileError>) {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();
        let result = compile(source, &mut object_manager, &mut intern_strings);
        (object_manager, intern_strings, result)
    }

    fn compiled_code(source: &str) -> Vec<u8> {
        let (object_manager, _strings, result) = compile_source(source);
        let function = result.expect("source should compile");
        object_manager
            .as_function(function)
            .expect("compile returns a function")
            .chunk
            .code
            .clone()
    }

    fn error_messages(source: &str) -> Vec<String> {
        let (_objects, _strings, result) = compile_source(source);
        let error = result.expect_err("source should fail to compile");
        error.messages().into_iter().map(str::to_string).collect()
    }

    fn ops(ops: &[OpCode]) -> Vec<u8> {
        ops.iter().map(|op| op.to_byte()).collect()
    }

    #[test]
    fn test_compile() {
        let code = compiled_code("!(5 - 4 > 3 * 2 == !nil);");
        let expected = vec![
            OpCode::Constant.to_byte(), 0,
            OpCode::Constant.to_byte(), 1,
            OpCode::Subtract.to_byte(),
            OpCode::Constant.to_byte(), 2,
            OpCode::Constant.to_byte(), 3,
            OpCode::Multiply.to_byte(),
            OpCode::Greater.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Not.to_byte(),
            OpCode::Equal.to_byte(),
            OpCode::Not.to_byte(),
            OpCode::Pop.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Return.to_byte(),
        ];
        assert_eq!(code, expected);
    }

    #[test]
    fn test_precedence_and_associativity() {
        let code = compiled_code("1 - 2 - 3;");
        let expected = vec![
            OpCode::Constant.to_byte(), 0,
            OpCode::Constant.to_byte(), 1,
            OpCode::Subtract.to_byte(),
            OpCode::Constant.to_byte(), 2,
            OpCode::Subtract.to_byte(),
            OpCode::Pop.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Return.to_byte(),
        ];
        assert_eq!(code, expected);
    }

    #[test]
    fn test_comparison_lowering() {
        let code = compiled_code("1 <= 2; 1 >= 2;");
        let mut expected = vec![OpCode::Constant.to_byte(), 0, OpCode::Constant.to_byte(), 1];
        expected.extend(ops(&[OpCode::Greater, OpCode::Not, OpCode::Pop]));
        expected.extend([OpCode::Constant.to_byte(), 0, OpCode::Constant.to_byte(), 1]);
        expected.extend(ops(&[OpCode::Less, OpCode::Not, OpCode::Pop, OpCode::Nil, OpCode::Return]));
        assert_eq!(code, expected);
    }

    #[test]
    fn test_intern_strings() {
        let mut object_manager = ObjectManager::new();
        let mut intern_strings = Table::new();

        let result = compile("\"this is a test string\";", &mut object_manager, &mut intern_strings);
        assert!(result.is_ok());
        let result = compile("\"this is a test string\";", &mut object_manager, &mut intern_strings);
        assert!(result.is_ok());

        assert_eq!(intern_strings.len(), 1);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let (object_manager, _strings, result) = compile_source("var a = 1; a = a + 1; print a;");
        let function = result.expect("source should compile");
        let chunk = &object_manager.as_function(function).expect("function").chunk;
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn test_locals_use_slots() {
        let code = compiled_code("{ var a = 1; var b = a; b = 2; }");
        let expected = vec![
            OpCode::Constant.to_byte(), 0,
            OpCode::GetLocal.to_byte(), 1,
            OpCode::Constant.to_byte(), 1,
            OpCode::SetLocal.to_byte(), 2,
            OpCode::Pop.to_byte(),
            OpCode::Pop.to_byte(),
            OpCode::Pop.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Return.to_byte(),
        ];
        assert_eq!(code, expected);
    }

    #[test]
    fn test_globals_use_name_constants() {
        let code = compiled_code("var a; a = 1; print a;");
        let expected = vec![
            OpCode::Nil.to_byte(),
            OpCode::DefineGlobal.to_byte(), 0,
            OpCode::Constant.to_byte(), 1,
            OpCode::SetGlobal.to_byte(), 0,
            OpCode::Pop.to_byte(),
            OpCode::GetGlobal.to_byte(), 0,
            OpCode::Print.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Return.to_byte(),
        ];
        assert_eq!(code, expected);
    }

    #[test]
    fn test_if_else_jump_offsets() {
        let code = compiled_code("if (true) print 1; else print 2;");
        let expected = vec![
            OpCode::True.to_byte(),
            OpCode::JumpIfFalse.to_byte(), 0, 7,
            OpCode::Pop.to_byte(),
            OpCode::Constant.to_byte(), 0,
            OpCode::Print.to_byte(),
            OpCode::Jump.to_byte(), 0, 4,
            OpCode::Pop.to_byte(),
            OpCode::Constant.to_byte(), 1,
            OpCode::Print.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Return.to_byte(),
        ];
        assert_eq!(code, expected);
    }

    #[test]
    fn test_while_loop_offset() {
        let code = compiled_code("while (false) print 1;");
        let expected = vec![
            OpCode::False.to_byte(),
            OpCode::JumpIfFalse.to_byte(), 0, 7,
            OpCode::Pop.to_byte(),
            OpCode::Constant.to_byte(), 0,
            OpCode::Print.to_byte(),
            OpCode::Loop.to_byte(), 0, 11,
            OpCode::Pop.to_byte(),
            OpCode::Nil.to_byte(),
            OpCode::Return.to_byte(),
        ];
        assert_eq!(code, expected);
    }

    #[test]
    fn test_self_reference_is_compile_error() {
        assert_eq!(
            error_messages("{ var a = a; }"),
            vec!["Can't read local variable in its own initializer."]
        );
        assert_eq!(
            error_messages("var a = a;"),
            vec!["Can't read global variable in its own initializer."]
        );
        assert_eq!(
            error_messages("{ { var b = 1 + b; } }"),
            vec!["Can't read local variable in its own initializer."]
        );
        // The guard is by name, so a redeclared global can't read its old value either.
        assert_eq!(
            error_messages("var a = 1; var a = a + 1;"),
            vec!["Can't read global variable in its own initializer."]
        );
    }

    #[test]
    fn test_shadowing_outer_in_initializer_is_error() {
        assert_eq!(
            error_messages("var a = 1; { var a = a; }"),
            vec!["Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn test_duplicate_local() {
        assert_eq!(
            error_messages("{ var a = 1; var a = 2; }"),
            vec!["Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_invalid_assignment_targets() {
        for source in ["a + b = c;", "-a = 1;", "(a) = 1;", "1 = 2;", "a * b = 3;"] {
            assert_eq!(error_messages(source), vec!["Invalid assignment target."], "{}", source);
        }
        assert!(compile_source("var a; var b; a = b = 3;").2.is_ok());
    }

    #[test]
    fn test_diagnostic_locations() {
        let (_objects, _strings, result) = compile_source("print 1 +;\nprint");
        let error = result.expect_err("should fail");
        let lines: Vec<String> = error.diagnostics.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "[line 1] Error at ';': Expect expression.",
                "[line 2] Error at end: Expect expression.",
            ]
        );
    }

    #[test]
    fn test_lexer_error_has_no_location() {
        let (_objects, _strings, result) = compile_source("print @;");
        let error = result.expect_err("should fail");
        assert_eq!(error.diagnostics[0].to_string(), "[line 1] Error: Unexpected character.");
    }

    #[test]
    fn test_panic_mode_suppresses_cascades() {
        // One error per broken statement, not one per bad token.
        assert_eq!(
            error_messages("print (1 + ; var x = 1; print x x x; print 2;"),
            vec!["Expect expression.", "Expect ';' after value."]
        );
    }

    #[test]
    fn test_unsupported_declarations() {
        assert_eq!(
            error_messages("fun f(a) { print a; } print 1;"),
            vec!["Function declarations are not supported."]
        );
        assert_eq!(
            error_messages("class A { m() { return 1; } } print 1;"),
            vec!["Class declarations are not supported."]
        );
        assert_eq!(
            error_messages("fun f;\nprint 1 +;\nvar = 2;"),
            vec![
                "Function declarations are not supported.",
                "Expect expression.",
                "Expect variable name.",
            ]
        );
        assert_eq!(
            error_messages("{ fun f; }\nprint 2;"),
            vec!["Function declarations are not supported."]
        );
        assert_eq!(
            error_messages("{ class A { } print 3; }"),
            vec!["Class declarations are not supported."]
        );
    }

    #[test]
    fn test_return_at_top_level() {
        assert_eq!(error_messages("return 1;"), vec!["Can't return from top-level code."]);
    }

    #[test]
    fn test_too_many_locals() {
        let declarations: String = (0..255).map(|i| format!("var a{} = nil;", i)).collect();
        assert!(compile_source(&format!("{{ {} }}", declarations)).2.is_ok());

        let declarations: String = (0..256).map(|i| format!("var a{} = nil;", i)).collect();
        assert_eq!(
            error_messages(&format!("{{ {} }}", declarations)),
            vec!["Too many local variables in function."]
        );
    }

    #[test]
    fn test_too_many_constants() {
        let statements: String = (0..256).map(|i| format!("print {};", i)).collect();
        assert!(compile_source(&statements).2.is_ok());

        let statements: String = (0..257).map(|i| format!("print {};", i)).collect();
        assert_eq!(error_messages(&statements), vec!["Too many constants in one chunk."]);
    }

    #[test]
    fn test_jump_too_large() {
        let body = "print 1;".repeat(22_000);
        assert_eq!(
            error_messages(&format!("if (true) {{ {} }}", body)),
            vec!["Too much code to jump over."]
        );
        assert_eq!(
            error_messages(&format!("while (false) {{ {} }}", body)),
            vec!["Loop body too large."]
        );
    }

    #[test]
    fn test_too_many_arguments() {
        let arguments = vec!["1"; 256].join(", ");
        assert_eq!(
            error_messages(&format!("f({});", arguments)),
            vec!["Can't have more than 255 arguments."]
        );
    }

    #[test]
    fn test_failed_compile_allocates_no_function() {
        let (object_manager, _strings, result) = compile_source("print \"a\" +;");
        assert!(result.is_err());
        assert!(object_manager.iter().all(|(_, object)| object.obj_type()
            == crate::objects::object::ObjectType::ObjString));
    }
}
