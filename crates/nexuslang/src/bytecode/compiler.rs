//! AST to bytecode lowering.
//!
//! The compiler performs no optimisation; its job is faithful lowering and
//! compact encoding. Constants are de-duplicated by structural equality in
//! first-seen order, symbol ids are dense and assigned in first-seen order,
//! and nothing depends on hash iteration order — for a given (AST,
//! timestamp) pair the emitted module is byte-identical.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{AssignTarget, BinaryOp, Expr, ExprKind, NamedArg, Program, Stmt, StmtKind, UnaryOp},
    bytecode::{
        builder::{CodeBuilder, JumpPatch},
        module::{Constant, Module, SymbolEntry, SymbolKind},
        op::Opcode,
    },
    error::Exception,
    token::CodeLoc,
    value::Intrinsic,
};

/// Hashable identity of a pooled constant.
///
/// Floats key on their bit pattern, so `0.0` and `-0.0` pool separately and
/// NaN payloads are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(i64),
    Float(u64),
    Str(String),
    Null,
}

/// Function table entry, written into the module's metadata trailer.
#[derive(Debug, Clone, serde::Serialize)]
struct FunctionInfo {
    name: String,
    entry: u32,
    arity: u8,
    params: Vec<String>,
    /// Constant-pool id of each parameter's default, `null` when absent.
    defaults: Vec<Option<u16>>,
}

/// Pending jumps for the innermost enclosing loop.
struct LoopContext {
    continue_target: usize,
    break_patches: Vec<JumpPatch>,
}

/// Compiles one program into a self-contained [`Module`].
pub struct Compiler {
    builder: CodeBuilder,
    constants: Vec<Constant>,
    const_ids: AHashMap<ConstKey, u16>,
    symbols: IndexMap<String, SymbolKind>,
    functions: Vec<FunctionInfo>,
    loop_stack: Vec<LoopContext>,
}

impl Compiler {
    #[must_use]
    fn new() -> Self {
        Self {
            builder: CodeBuilder::new(),
            constants: Vec::new(),
            const_ids: AHashMap::new(),
            symbols: IndexMap::new(),
            functions: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    /// Lowers a program and packs the result.
    ///
    /// `timestamp_ms` becomes the header build timestamp; pass a fixed value
    /// to get reproducible bytes.
    pub fn compile(program: &Program, source_path: &str, timestamp_ms: u64) -> Result<Module, Exception> {
        let mut compiler = Self::new();
        for stmt in &program.stmts {
            compiler.compile_stmt(stmt)?;
        }
        // A module's code stream always ends by returning null.
        let null_id = compiler.const_id(Constant::Null, CodeLoc::new(0, 0))?;
        compiler.builder.emit_u16(Opcode::LoadConst, null_id);
        compiler.builder.emit(Opcode::Return);
        Ok(compiler.finish(source_path, timestamp_ms))
    }

    fn finish(self, source_path: &str, timestamp_ms: u64) -> Module {
        let (code, locations) = self.builder.build();
        let symbols = self
            .symbols
            .into_iter()
            .map(|(name, kind)| SymbolEntry { name, kind })
            .collect();

        let mut metadata = serde_json::Map::new();
        metadata.insert("source_path".to_owned(), serde_json::Value::String(source_path.to_owned()));
        metadata.insert(
            "compiler_version".to_owned(),
            serde_json::Value::String(env!("CARGO_PKG_VERSION").to_owned()),
        );
        metadata.insert(
            "functions".to_owned(),
            serde_json::to_value(&self.functions).expect("function table serialises"),
        );

        Module {
            code,
            constants: self.constants,
            symbols,
            debug: Some(locations),
            metadata: Some(metadata),
            timestamp_ms,
        }
    }

    // === Pools ===

    fn const_id(&mut self, constant: Constant, loc: CodeLoc) -> Result<u16, Exception> {
        let key = match &constant {
            Constant::Int(value) => ConstKey::Int(*value),
            Constant::Float(value) => ConstKey::Float(value.to_bits()),
            Constant::Str(value) => ConstKey::Str(value.clone()),
            Constant::Null => ConstKey::Null,
        };
        if let Some(id) = self.const_ids.get(&key) {
            return Ok(*id);
        }
        let id = u16::try_from(self.constants.len())
            .map_err(|_| Exception::compile("constant pool exceeds 65535 entries", loc))?;
        self.constants.push(constant);
        self.const_ids.insert(key, id);
        Ok(id)
    }

    fn sym_id(&mut self, name: &str, loc: CodeLoc) -> Result<u16, Exception> {
        if let Some(index) = self.symbols.get_index_of(name) {
            return Ok(index as u16);
        }
        let kind = if Intrinsic::from_name(name).is_some() {
            SymbolKind::Intrinsic
        } else {
            SymbolKind::User
        };
        if self.symbols.len() > usize::from(u16::MAX) {
            return Err(Exception::compile("symbol table exceeds 65536 entries", loc));
        }
        let (index, _) = self.symbols.insert_full(name.to_owned(), kind);
        Ok(index as u16)
    }

    /// Interns an intrinsic's name so the symbol table records the host
    /// dispatch surface, and returns the opcode-level id.
    fn intrinsic_id(&mut self, intrinsic: Intrinsic, loc: CodeLoc) -> Result<u8, Exception> {
        self.sym_id(intrinsic.name(), loc)?;
        Ok(intrinsic as u8)
    }

    // === Statements ===

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), Exception> {
        self.builder.set_location(stmt.loc);
        match &stmt.kind {
            StmtKind::Let { name, init, .. } => {
                self.compile_expr(init)?;
                let sym = self.sym_id(name, stmt.loc)?;
                self.builder.emit_u16_u8(Opcode::StoreNew, sym, 0);
            }
            StmtKind::Const { name, init, .. } => {
                self.compile_expr(init)?;
                let sym = self.sym_id(name, stmt.loc)?;
                self.builder.emit_u16_u8(Opcode::StoreNew, sym, 1);
            }
            StmtKind::Assign { target, value } => self.compile_assign(target, value, stmt.loc)?,
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.compile_expr(cond)?;
                let to_else = self.builder.emit_jump(Opcode::JumpIfFalse);
                self.compile_stmts(&then_block.stmts)?;
                match else_block {
                    Some(else_block) => {
                        let to_end = self.builder.emit_jump(Opcode::Jump);
                        self.builder.patch_jump(to_else);
                        self.compile_stmts(&else_block.stmts)?;
                        self.builder.patch_jump(to_end);
                    }
                    None => self.builder.patch_jump(to_else),
                }
            }
            StmtKind::While { cond, body } => {
                let head = self.builder.offset();
                self.compile_expr(cond)?;
                let exit = self.builder.emit_jump(Opcode::JumpIfFalse);
                self.loop_stack.push(LoopContext {
                    continue_target: head,
                    break_patches: Vec::new(),
                });
                self.compile_stmts(&body.stmts)?;
                self.builder.emit_jump_back(Opcode::Jump, head);
                let context = self.loop_stack.pop().expect("loop context pushed above");
                self.builder.patch_jump(exit);
                for patch in context.break_patches {
                    self.builder.patch_jump(patch);
                }
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                self.compile_expr(iterable)?;
                self.builder.emit(Opcode::IterNew);
                let head = self.builder.offset();
                let bound = self.sym_id(binding, stmt.loc)?;
                let exhausted = self.builder.emit_iter_next(bound);
                self.loop_stack.push(LoopContext {
                    continue_target: head,
                    break_patches: Vec::new(),
                });
                self.compile_stmts(&body.stmts)?;
                self.builder.emit_jump_back(Opcode::Jump, head);
                let context = self.loop_stack.pop().expect("loop context pushed above");
                self.builder.patch_jump(exhausted);
                for patch in context.break_patches {
                    self.builder.patch_jump(patch);
                }
                self.builder.emit(Opcode::IterDrop);
            }
            StmtKind::Break => {
                // Re-checked here: a function boundary between this statement
                // and the enclosing loop invalidates the parser's lexical
                // check.
                let patch = self.builder.emit_jump(Opcode::Jump);
                let Some(context) = self.loop_stack.last_mut() else {
                    return Err(Exception::compile("'break' outside of a loop", stmt.loc));
                };
                context.break_patches.push(patch);
            }
            StmtKind::Continue => {
                let Some(context) = self.loop_stack.last() else {
                    return Err(Exception::compile("'continue' outside of a loop", stmt.loc));
                };
                self.builder.emit_jump_back(Opcode::Jump, context.continue_target);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        let null_id = self.const_id(Constant::Null, stmt.loc)?;
                        self.builder.emit_u16(Opcode::LoadConst, null_id);
                    }
                }
                self.builder.emit(Opcode::Return);
            }
            StmtKind::Block(block) => self.compile_stmts(&block.stmts)?,
            StmtKind::FunctionDecl(decl) => {
                let skip = self.builder.emit_jump(Opcode::Jump);
                let entry = self.builder.offset() as u32;

                // Loop context does not survive the function boundary.
                let outer_loops = std::mem::take(&mut self.loop_stack);
                self.compile_stmts(&decl.body.stmts)?;
                let null_id = self.const_id(Constant::Null, decl.loc)?;
                self.builder.emit_u16(Opcode::LoadConst, null_id);
                self.builder.emit(Opcode::Return);
                self.loop_stack = outer_loops;

                self.builder.patch_jump(skip);

                let arity = u8::try_from(decl.params.len())
                    .map_err(|_| Exception::compile("functions take at most 255 parameters", decl.loc))?;
                let mut defaults = Vec::with_capacity(decl.params.len());
                for param in &decl.params {
                    let id = match &param.default {
                        Some(default) => Some(self.literal_const_id(default)?),
                        None => None,
                    };
                    defaults.push(id);
                }
                let fn_id = u16::try_from(self.functions.len())
                    .map_err(|_| Exception::compile("function table exceeds 65536 entries", decl.loc))?;
                self.functions.push(FunctionInfo {
                    name: decl.name.clone(),
                    entry,
                    arity,
                    params: decl.params.iter().map(|param| param.name.clone()).collect(),
                    defaults,
                });

                self.builder.emit_u16(Opcode::MakeClosure, fn_id);
                let sym = self.sym_id(&decl.name, decl.loc)?;
                self.builder.emit_u16_u8(Opcode::StoreNew, sym, 1);
            }
            StmtKind::Personality(entries) => {
                for entry in entries {
                    let name_sym = self.sym_id(&entry.name, entry.loc)?;
                    let value_id = self.const_id(Constant::Float(entry.value), entry.loc)?;
                    self.builder.emit_u16_u16(Opcode::SetTrait, name_sym, value_id);
                }
            }
            StmtKind::Voice(block) => self.compile_stmts(&block.stmts)?,
            StmtKind::Say {
                text,
                emotion,
                voice_id,
                speed,
            } => {
                self.compile_expr(text)?;
                self.compile_optional(emotion.as_ref(), stmt.loc)?;
                self.compile_optional(voice_id.as_ref(), stmt.loc)?;
                self.compile_optional(speed.as_ref(), stmt.loc)?;
                let id = self.intrinsic_id(Intrinsic::Say, stmt.loc)?;
                self.builder.emit_u8_u8(Opcode::CallIntrinsic, id, 4);
                self.builder.emit(Opcode::Pop);
            }
            StmtKind::OptimizeSelf {
                metric,
                target,
                strategy,
            } => {
                self.compile_expr(metric)?;
                self.compile_expr(target)?;
                self.compile_optional(strategy.as_ref(), stmt.loc)?;
                let id = self.intrinsic_id(Intrinsic::OptimizeSelf, stmt.loc)?;
                self.builder.emit_u8_u8(Opcode::CallIntrinsic, id, 3);
                self.builder.emit(Opcode::Pop);
            }
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.builder.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> Result<(), Exception> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_assign(&mut self, target: &AssignTarget, value: &Expr, loc: CodeLoc) -> Result<(), Exception> {
        match target {
            AssignTarget::Ident(name) => {
                self.compile_expr(value)?;
                let sym = self.sym_id(name, loc)?;
                self.builder.emit_u16(Opcode::Store, sym);
            }
            AssignTarget::Index { target, index } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.builder.emit(Opcode::SetIndex);
            }
            AssignTarget::Member { target, name } => {
                self.compile_expr(target)?;
                self.compile_expr(value)?;
                let sym = self.sym_id(name, loc)?;
                self.builder.emit_u16(Opcode::SetMember, sym);
            }
        }
        Ok(())
    }

    /// Lowers an optional slot of a fixed-shape intrinsic call; absent slots
    /// load null.
    fn compile_optional(&mut self, expr: Option<&Expr>, loc: CodeLoc) -> Result<(), Exception> {
        match expr {
            Some(expr) => self.compile_expr(expr),
            None => {
                let null_id = self.const_id(Constant::Null, loc)?;
                self.builder.emit_u16(Opcode::LoadConst, null_id);
                Ok(())
            }
        }
    }

    /// Default values in the function table must be pooled constants.
    fn literal_const_id(&mut self, expr: &Expr) -> Result<u16, Exception> {
        let constant = match &expr.kind {
            ExprKind::IntLit(value) => Constant::Int(*value),
            ExprKind::FloatLit(value) => Constant::Float(*value),
            ExprKind::StringLit(value) => Constant::Str(value.clone()),
            ExprKind::NullLit => Constant::Null,
            _ => {
                return Err(Exception::compile(
                    "parameter defaults must be int, float, string, or null literals in compiled modules",
                    expr.loc,
                ));
            }
        };
        self.const_id(constant, expr.loc)
    }

    // === Expressions ===

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), Exception> {
        match &expr.kind {
            ExprKind::IntLit(value) => {
                let id = self.const_id(Constant::Int(*value), expr.loc)?;
                self.builder.emit_u16(Opcode::LoadConst, id);
            }
            ExprKind::FloatLit(value) => {
                let id = self.const_id(Constant::Float(*value), expr.loc)?;
                self.builder.emit_u16(Opcode::LoadConst, id);
            }
            ExprKind::StringLit(value) => {
                let id = self.const_id(Constant::Str(value.clone()), expr.loc)?;
                self.builder.emit_u16(Opcode::LoadConst, id);
            }
            ExprKind::BoolLit(true) => self.builder.emit(Opcode::LoadTrue),
            ExprKind::BoolLit(false) => self.builder.emit(Opcode::LoadFalse),
            ExprKind::NullLit => {
                let id = self.const_id(Constant::Null, expr.loc)?;
                self.builder.emit_u16(Opcode::LoadConst, id);
            }
            ExprKind::Ident(name) => {
                let sym = self.sym_id(name, expr.loc)?;
                self.builder.emit_u16(Opcode::LoadSym, sym);
            }
            ExprKind::Array(elements) => {
                let count = u16::try_from(elements.len())
                    .map_err(|_| Exception::compile("array literal exceeds 65535 elements", expr.loc))?;
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.builder.emit_u16(Opcode::MakeArray, count);
            }
            ExprKind::Index { target, index } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.builder.emit(Opcode::GetIndex);
            }
            ExprKind::Member { target, name } => {
                self.compile_expr(target)?;
                let sym = self.sym_id(name, expr.loc)?;
                self.builder.emit_u16(Opcode::GetMember, sym);
            }
            ExprKind::Binary { op, left, right } => self.compile_binary(*op, left, right)?,
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.builder.emit(match op {
                    UnaryOp::Neg => Opcode::UopNeg,
                    UnaryOp::Not => Opcode::UopNot,
                });
            }
            ExprKind::Call { callee, args, named } => {
                self.compile_expr(callee)?;
                let nargs = u8::try_from(args.len())
                    .map_err(|_| Exception::compile("calls take at most 255 positional arguments", expr.loc))?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let nkwargs = self.compile_named_args(named, expr.loc)?;
                self.builder.emit_u8_u8(Opcode::Call, nargs, nkwargs);
            }
            ExprKind::Range { start, end } => {
                self.compile_expr(start)?;
                self.compile_expr(end)?;
                self.builder.emit(Opcode::MakeRange);
            }
            ExprKind::Knowledge { query, filters } => {
                self.compile_expr(query)?;
                let count = u16::from(self.compile_named_args(filters, expr.loc)?);
                self.builder.emit_u16(Opcode::MakeMapping, count);
                let id = self.intrinsic_id(Intrinsic::Knowledge, expr.loc)?;
                self.builder.emit_u8_u8(Opcode::CallIntrinsic, id, 2);
            }
            ExprKind::Listen { timeout, language } => {
                self.compile_optional(timeout.as_deref(), expr.loc)?;
                self.compile_optional(language.as_deref(), expr.loc)?;
                let id = self.intrinsic_id(Intrinsic::Listen, expr.loc)?;
                self.builder.emit_u8_u8(Opcode::CallIntrinsic, id, 2);
            }
            ExprKind::GetTrait { name } => {
                self.compile_expr(name)?;
                let id = self.intrinsic_id(Intrinsic::GetTrait, expr.loc)?;
                self.builder.emit_u8_u8(Opcode::CallIntrinsic, id, 1);
            }
        }
        Ok(())
    }

    /// Lowers named arguments as (name-string, value) pairs.
    fn compile_named_args(&mut self, named: &[NamedArg], loc: CodeLoc) -> Result<u8, Exception> {
        let count = u8::try_from(named.len())
            .map_err(|_| Exception::compile("calls take at most 255 named arguments", loc))?;
        for arg in named {
            let name_id = self.const_id(Constant::Str(arg.name.clone()), arg.loc)?;
            self.builder.emit_u16(Opcode::LoadConst, name_id);
            self.compile_expr(&arg.value)?;
        }
        Ok(count)
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<(), Exception> {
        // Short-circuit forms lower to conditional jumps around the right
        // operand; the determining operand stays on the stack.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            self.compile_expr(left)?;
            self.builder.emit(Opcode::Dup);
            let short = self.builder.emit_jump(match op {
                BinaryOp::And => Opcode::JumpIfFalse,
                _ => Opcode::JumpIfTrue,
            });
            self.builder.emit(Opcode::Pop);
            self.compile_expr(right)?;
            self.builder.patch_jump(short);
            return Ok(());
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        self.builder.emit(match op {
            BinaryOp::Add => Opcode::OpAdd,
            BinaryOp::Sub => Opcode::OpSub,
            BinaryOp::Mul => Opcode::OpMul,
            BinaryOp::Div => Opcode::OpDiv,
            BinaryOp::Mod => Opcode::OpMod,
            BinaryOp::Eq => Opcode::OpEq,
            BinaryOp::NotEq => Opcode::OpNeq,
            BinaryOp::Lt => Opcode::OpLt,
            BinaryOp::LtEq => Opcode::OpLeq,
            BinaryOp::Gt => Opcode::OpGt,
            BinaryOp::GtEq => Opcode::OpGeq,
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit forms handled above"),
        });
        Ok(())
    }
}
