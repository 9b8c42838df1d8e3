//! Recursive-descent parser with Pratt-style binary precedence.
//!
//! The parser consumes the token stream produced by the lexer and builds the
//! AST. It halts at the first mismatch with a `ParseError` naming what was
//! expected and what was found; there is no error recovery.
//!
//! The AI-native forms (`knowledge`, `listen`, `say`, `get_trait`,
//! `optimize_self`, `personality`, `voice`) look like calls or blocks but are
//! recognised by keyword and parsed into their dedicated nodes.

use std::rc::Rc;

use crate::{
    ast::{
        AssignTarget, BinaryOp, Block, Expr, ExprKind, FunctionDecl, NamedArg, Param, Program, Stmt, StmtKind,
        TraitEntry, UnaryOp,
    },
    error::Exception,
    lexer::Lexer,
    token::{CodeLoc, Token, TokenKind},
};

/// Maximum nesting depth for expressions and blocks.
///
/// Prevents stack overflow from pathologically nested sources like
/// `((((...x...))))` before the Rust call stack is exhausted.
#[cfg(not(debug_assertions))]
const MAX_NESTING_DEPTH: u16 = 200;
/// Debug builds use much larger stack frames, so the guard kicks in earlier.
#[cfg(debug_assertions)]
const MAX_NESTING_DEPTH: u16 = 64;

/// Binary operator precedence, lowest (1) to highest.
///
/// Unary, call, index, and member binding are handled outside this table.
fn binary_precedence(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::NotEq => (BinaryOp::NotEq, 3),
        TokenKind::Lt => (BinaryOp::Lt, 4),
        TokenKind::LtEq => (BinaryOp::LtEq, 4),
        TokenKind::Gt => (BinaryOp::Gt, 4),
        TokenKind::GtEq => (BinaryOp::GtEq, 4),
        TokenKind::Plus => (BinaryOp::Add, 6),
        TokenKind::Minus => (BinaryOp::Sub, 6),
        TokenKind::Star => (BinaryOp::Mul, 7),
        TokenKind::Slash => (BinaryOp::Div, 7),
        TokenKind::Percent => (BinaryOp::Mod, 7),
        _ => return None,
    };
    Some(entry)
}

/// Precedence slot of the non-associative range operator.
const RANGE_PRECEDENCE: u8 = 5;

/// Parses a complete source string into a [`Program`].
pub fn parse(source: &str) -> Result<Program, Exception> {
    let tokens = Lexer::tokenize(source)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u16,
    loop_depth: u32,
    fn_depth: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            loop_depth: 0,
            fn_depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    fn loc(&self) -> CodeLoc {
        self.peek().loc
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, Exception> {
        if self.peek_kind() == kind {
            return Ok(self.advance());
        }
        Err(self.unexpected(kind.describe()))
    }

    fn unexpected(&self, expected: &str) -> Exception {
        let found = self.peek();
        Exception::parse(
            format!("expected {expected}, found {}", found.kind.describe()),
            found.loc,
        )
    }

    fn enter_nesting(&mut self, loc: CodeLoc) -> Result<(), Exception> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(Exception::parse("source nesting is too deep", loc));
        }
        Ok(())
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }

    fn skip_separators(&mut self) {
        while self.eat(TokenKind::Semi) {}
    }

    // === Statements ===

    fn parse_program(mut self) -> Result<Program, Exception> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek_kind() != TokenKind::Eof {
            stmts.push(self.parse_stmt()?);
            self.skip_separators();
        }
        Ok(Program { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, Exception> {
        let loc = self.loc();
        let kind = match self.peek_kind() {
            TokenKind::Personality => self.parse_personality()?,
            TokenKind::Let => self.parse_declaration(false)?,
            TokenKind::Const => self.parse_declaration(true)?,
            TokenKind::Fn => self.parse_fn_decl()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Return => {
                if self.fn_depth == 0 {
                    return Err(Exception::parse("'return' outside of a function", loc));
                }
                self.parse_return()?
            }
            TokenKind::Break => {
                if self.loop_depth == 0 {
                    return Err(Exception::parse("'break' outside of a loop", loc));
                }
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(Exception::parse("'continue' outside of a loop", loc));
                }
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Voice => {
                self.advance();
                StmtKind::Voice(self.parse_block()?)
            }
            TokenKind::Say => self.parse_say()?,
            TokenKind::OptimizeSelf => self.parse_optimize_self()?,
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => self.parse_assign_or_expr()?,
        };
        Ok(Stmt { kind, loc })
    }

    fn parse_block(&mut self) -> Result<Block, Exception> {
        let loc = self.loc();
        self.enter_nesting(loc)?;
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek_kind() != TokenKind::RBrace {
            if self.peek_kind() == TokenKind::Eof {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.parse_stmt()?);
            self.skip_separators();
        }
        self.expect(TokenKind::RBrace)?;
        self.exit_nesting();
        Ok(Block { stmts, loc })
    }

    fn parse_declaration(&mut self, constant: bool) -> Result<StmtKind, Exception> {
        self.advance(); // let / const
        let name = self.expect(TokenKind::Ident)?.lexeme;
        let type_hint = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_hint()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq)?;
        let init = self.parse_expr()?;
        Ok(if constant {
            StmtKind::Const { name, type_hint, init }
        } else {
            StmtKind::Let { name, type_hint, init }
        })
    }

    fn parse_type_hint(&mut self) -> Result<String, Exception> {
        Ok(self.expect(TokenKind::Ident)?.lexeme)
    }

    fn parse_fn_decl(&mut self) -> Result<StmtKind, Exception> {
        let loc = self.loc();
        self.advance(); // fn
        let name = self.expect(TokenKind::Ident)?.lexeme;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;
        let return_hint = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type_hint()?)
        } else {
            None
        };
        // Loop context does not cross the function boundary: a `break` in a
        // function body must target a loop inside that body.
        let outer_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.fn_depth += 1;
        let body = self.parse_block()?;
        self.fn_depth -= 1;
        self.loop_depth = outer_loop_depth;
        Ok(StmtKind::FunctionDecl(Rc::new(FunctionDecl {
            name,
            params,
            return_hint,
            body,
            loc,
        })))
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, Exception> {
        let mut params: Vec<Param> = Vec::new();
        let mut seen_default = false;
        if self.peek_kind() == TokenKind::RParen {
            return Ok(params);
        }
        loop {
            let loc = self.loc();
            let name = self.expect(TokenKind::Ident)?.lexeme;
            if params.iter().any(|param| param.name == name) {
                return Err(Exception::parse(format!("duplicate parameter '{name}'"), loc));
            }
            let type_hint = if self.eat(TokenKind::Colon) {
                Some(self.parse_type_hint()?)
            } else {
                None
            };
            let default = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            if default.is_some() {
                seen_default = true;
            } else if seen_default {
                return Err(Exception::parse(
                    format!("parameter '{name}' without a default follows a parameter with one"),
                    loc,
                ));
            }
            params.push(Param {
                name,
                type_hint,
                default,
                loc,
            });
            if !self.eat(TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    fn parse_if(&mut self) -> Result<StmtKind, Exception> {
        self.advance(); // if
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_block = if self.eat(TokenKind::Else) {
            if self.peek_kind() == TokenKind::If {
                // `else if` chains become a single-statement else block.
                let loc = self.loc();
                let nested = self.parse_stmt()?;
                Some(Block {
                    stmts: vec![nested],
                    loc,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_while(&mut self) -> Result<StmtKind, Exception> {
        self.advance(); // while
        let cond = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block()?;
        self.loop_depth -= 1;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind, Exception> {
        self.advance(); // for
        let binding = self.expect(TokenKind::Ident)?.lexeme;
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block()?;
        self.loop_depth -= 1;
        Ok(StmtKind::For {
            binding,
            iterable,
            body,
        })
    }

    fn parse_return(&mut self) -> Result<StmtKind, Exception> {
        self.advance(); // return
        let value = match self.peek_kind() {
            TokenKind::RBrace | TokenKind::Semi | TokenKind::Eof => None,
            _ => Some(self.parse_expr()?),
        };
        Ok(StmtKind::Return(value))
    }

    fn parse_personality(&mut self) -> Result<StmtKind, Exception> {
        self.advance(); // personality
        self.expect(TokenKind::LBrace)?;
        let mut entries: Vec<TraitEntry> = Vec::new();
        if self.peek_kind() != TokenKind::RBrace {
            loop {
                let name = self.expect(TokenKind::Ident)?.lexeme;
                self.expect(TokenKind::Colon)?;
                let value_loc = self.loc();
                let value = self.parse_trait_number()?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(Exception::parse(
                        format!("personality trait '{name}' must be in [0.0, 1.0], got {value}"),
                        value_loc,
                    ));
                }
                if entries.iter().any(|entry| entry.name == name) {
                    return Err(Exception::parse(
                        format!("duplicate personality trait '{name}'"),
                        value_loc,
                    ));
                }
                entries.push(TraitEntry {
                    name,
                    value,
                    loc: value_loc,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.peek_kind() == TokenKind::RBrace {
                    break; // trailing comma
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StmtKind::Personality(entries))
    }

    fn parse_trait_number(&mut self) -> Result<f64, Exception> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int | TokenKind::Float => token
                .lexeme
                .parse::<f64>()
                .map_err(|_| Exception::parse("malformed number literal", token.loc)),
            _ => Err(Exception::parse(
                format!("expected number literal, found {}", token.kind.describe()),
                token.loc,
            )),
        }
    }

    fn parse_say(&mut self) -> Result<StmtKind, Exception> {
        self.advance(); // say
        self.expect(TokenKind::LParen)?;
        let text = self.parse_expr()?;
        let named = self.parse_trailing_named_args()?;
        self.expect(TokenKind::RParen)?;

        let mut emotion = None;
        let mut voice_id = None;
        let mut speed = None;
        for arg in named {
            let slot = match arg.name.as_str() {
                "emotion" => &mut emotion,
                "voice_id" => &mut voice_id,
                "speed" => &mut speed,
                other => {
                    return Err(Exception::parse(
                        format!("say does not accept an argument named '{other}'"),
                        arg.loc,
                    ));
                }
            };
            *slot = Some(arg.value);
        }
        Ok(StmtKind::Say {
            text,
            emotion,
            voice_id,
            speed,
        })
    }

    fn parse_optimize_self(&mut self) -> Result<StmtKind, Exception> {
        let loc = self.loc();
        self.advance(); // optimize_self
        self.expect(TokenKind::LParen)?;
        let mut named = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                named.push(self.parse_named_arg(&named)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let mut metric = None;
        let mut target = None;
        let mut strategy = None;
        for arg in named {
            let slot = match arg.name.as_str() {
                "metric" => &mut metric,
                "target" => &mut target,
                "strategy" => &mut strategy,
                other => {
                    return Err(Exception::parse(
                        format!("optimize_self does not accept an argument named '{other}'"),
                        arg.loc,
                    ));
                }
            };
            *slot = Some(arg.value);
        }
        let Some(metric) = metric else {
            return Err(Exception::parse("optimize_self requires a 'metric' argument", loc));
        };
        let Some(target) = target else {
            return Err(Exception::parse("optimize_self requires a 'target' argument", loc));
        };
        Ok(StmtKind::OptimizeSelf {
            metric,
            target,
            strategy,
        })
    }

    fn parse_assign_or_expr(&mut self) -> Result<StmtKind, Exception> {
        let expr = self.parse_expr()?;
        if self.peek_kind() != TokenKind::Eq {
            return Ok(StmtKind::Expr(expr));
        }
        let eq_loc = self.loc();
        self.advance(); // =
        let target = match expr.kind {
            ExprKind::Ident(name) => AssignTarget::Ident(name),
            ExprKind::Index { target, index } => AssignTarget::Index {
                target: *target,
                index: *index,
            },
            ExprKind::Member { target, name } => AssignTarget::Member {
                target: *target,
                name,
            },
            _ => {
                return Err(Exception::parse(
                    "assignment target must be a name, index, or member",
                    eq_loc,
                ));
            }
        };
        let value = self.parse_expr()?;
        Ok(StmtKind::Assign { target, value })
    }

    // === Expressions ===

    fn parse_expr(&mut self) -> Result<Expr, Exception> {
        let loc = self.loc();
        self.enter_nesting(loc)?;
        let expr = self.parse_binary(1)?;
        self.exit_nesting();
        Ok(expr)
    }

    /// Pratt loop over the binary precedence table.
    ///
    /// The range operator sits between comparison and additive precedence and
    /// is non-associative: `a..b..c` is rejected here.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, Exception> {
        let mut left = self.parse_unary()?;
        loop {
            if self.peek_kind() == TokenKind::DotDot && RANGE_PRECEDENCE >= min_prec {
                self.advance();
                let end = self.parse_binary(RANGE_PRECEDENCE + 1)?;
                if self.peek_kind() == TokenKind::DotDot {
                    return Err(Exception::parse("range expressions do not chain", self.loc()));
                }
                left = Expr {
                    loc: left.loc,
                    kind: ExprKind::Range {
                        start: Box::new(left),
                        end: Box::new(end),
                    },
                };
                continue;
            }
            let Some((op, prec)) = binary_precedence(self.peek_kind()) else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            left = Expr {
                loc: left.loc,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, Exception> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                // `-9223372036854775808` only fits i64 when the sign is part
                // of the literal, so negated integer literals parse as one.
                if self.peek_kind() == TokenKind::Int {
                    let token = self.advance();
                    let value = format!("-{}", token.lexeme)
                        .parse::<i64>()
                        .map_err(|_| Exception::parse("integer literal out of range", token.loc))?;
                    return Ok(Expr {
                        kind: ExprKind::IntLit(value),
                        loc,
                    });
                }
                let operand = self.parse_unary()?;
                Ok(Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    loc,
                })
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    loc,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, Exception> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let loc = expr.loc;
                    self.advance();
                    let (args, named) = self.parse_call_args()?;
                    self.expect(TokenKind::RParen)?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            named,
                        },
                        loc,
                    };
                }
                TokenKind::LBracket => {
                    let loc = expr.loc;
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                        loc,
                    };
                }
                TokenKind::Dot => {
                    let loc = expr.loc;
                    self.advance();
                    let name = self.expect(TokenKind::Ident)?.lexeme;
                    expr = Expr {
                        kind: ExprKind::Member {
                            target: Box::new(expr),
                            name,
                        },
                        loc,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Returns true when the upcoming tokens spell a named argument.
    fn at_named_arg(&self) -> bool {
        let name_like = matches!(
            self.peek_kind(),
            TokenKind::Ident | TokenKind::Emotion | TokenKind::Voice
        );
        name_like && self.peek_at(1) == TokenKind::Colon
    }

    fn parse_named_arg(&mut self, seen: &[NamedArg]) -> Result<NamedArg, Exception> {
        let token = self.advance();
        let loc = token.loc;
        let name = match token.kind {
            TokenKind::Ident | TokenKind::Emotion | TokenKind::Voice => token.lexeme,
            _ => {
                return Err(Exception::parse(
                    format!("expected argument name, found {}", token.kind.describe()),
                    loc,
                ));
            }
        };
        self.expect(TokenKind::Colon)?;
        if seen.iter().any(|arg| arg.name == name) {
            return Err(Exception::parse(format!("duplicate named argument '{name}'"), loc));
        }
        let value = self.parse_expr()?;
        Ok(NamedArg { name, value, loc })
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<NamedArg>), Exception> {
        let mut args = Vec::new();
        let mut named: Vec<NamedArg> = Vec::new();
        if self.peek_kind() == TokenKind::RParen {
            return Ok((args, named));
        }
        loop {
            if self.at_named_arg() {
                named.push(self.parse_named_arg(&named)?);
            } else {
                if !named.is_empty() {
                    return Err(Exception::parse(
                        "positional argument follows a named argument",
                        self.loc(),
                    ));
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(TokenKind::Comma) {
                return Ok((args, named));
            }
        }
    }

    /// Named arguments after a leading positional argument (`say`, `knowledge`).
    fn parse_trailing_named_args(&mut self) -> Result<Vec<NamedArg>, Exception> {
        let mut named: Vec<NamedArg> = Vec::new();
        while self.eat(TokenKind::Comma) {
            named.push(self.parse_named_arg(&named)?);
        }
        Ok(named)
    }

    fn parse_primary(&mut self) -> Result<Expr, Exception> {
        let loc = self.loc();
        let kind = match self.peek_kind() {
            TokenKind::Int => {
                let token = self.advance();
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| Exception::parse("integer literal out of range", token.loc))?;
                ExprKind::IntLit(value)
            }
            TokenKind::Float => {
                let token = self.advance();
                let value = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| Exception::parse("malformed float literal", token.loc))?;
                ExprKind::FloatLit(value)
            }
            TokenKind::Str => ExprKind::StringLit(self.advance().lexeme),
            TokenKind::True => {
                self.advance();
                ExprKind::BoolLit(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::BoolLit(false)
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::NullLit
            }
            TokenKind::Ident => ExprKind::Ident(self.advance().lexeme),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                inner.kind
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if self.peek_kind() != TokenKind::RBracket {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                        if self.peek_kind() == TokenKind::RBracket {
                            break; // trailing comma
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                ExprKind::Array(elements)
            }
            TokenKind::Knowledge => self.parse_knowledge()?,
            TokenKind::Listen => self.parse_listen()?,
            TokenKind::GetTrait => self.parse_get_trait()?,
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr { kind, loc })
    }

    fn parse_knowledge(&mut self) -> Result<ExprKind, Exception> {
        self.advance(); // knowledge
        self.expect(TokenKind::LParen)?;
        let query = self.parse_expr()?;
        let filters = self.parse_trailing_named_args()?;
        self.expect(TokenKind::RParen)?;
        Ok(ExprKind::Knowledge {
            query: Box::new(query),
            filters,
        })
    }

    fn parse_listen(&mut self) -> Result<ExprKind, Exception> {
        self.advance(); // listen
        self.expect(TokenKind::LParen)?;
        let mut named = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                named.push(self.parse_named_arg(&named)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let mut timeout = None;
        let mut language = None;
        for arg in named {
            let slot = match arg.name.as_str() {
                "timeout" => &mut timeout,
                "language" => &mut language,
                other => {
                    return Err(Exception::parse(
                        format!("listen does not accept an argument named '{other}'"),
                        arg.loc,
                    ));
                }
            };
            *slot = Some(Box::new(arg.value));
        }
        Ok(ExprKind::Listen { timeout, language })
    }

    fn parse_get_trait(&mut self) -> Result<ExprKind, Exception> {
        self.advance(); // get_trait
        self.expect(TokenKind::LParen)?;
        let name = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(ExprKind::GetTrait { name: Box::new(name) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_determinism() {
        let source = "fn f(a, b: int = 2) -> int { return a + b } let x = f(1, b: 3)";
        let first = parse(source).unwrap();
        let second = parse(source).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn range_is_non_associative() {
        let err = parse("let r = 1..2..3").unwrap_err();
        assert!(err.message().contains("range"));
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let program = parse("let x = 2 + 3 * 4").unwrap();
        let StmtKind::Let { init, .. } = &program.stmts[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op: BinaryOp::Add, right, .. } = &init.kind else {
            panic!("expected addition at the top, got {init:?}");
        };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn duplicate_named_argument_rejected() {
        let err = parse("say(\"hi\", emotion: \"calm\", emotion: \"loud\")").unwrap_err();
        assert!(err.message().contains("duplicate named argument"));
    }

    #[test]
    fn personality_value_out_of_range_is_a_parse_error() {
        let err = parse("personality { curiosity: 1.5 }").unwrap_err();
        assert!(err.message().contains("[0.0, 1.0]"));
        assert_eq!(err.loc().unwrap().col, 26);
    }

    #[test]
    fn default_params_must_trail() {
        let err = parse("fn f(a = 1, b) {}").unwrap_err();
        assert!(err.message().contains("without a default"));
    }
}
