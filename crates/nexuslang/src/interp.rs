//! Tree-walking interpreter.
//!
//! Single-threaded, eager, synchronous: every statement completes before the
//! next begins, and output order equals statement order. Control flow uses
//! internal [`Signal`] values for `break`/`continue`/`return`; these are
//! never observable to user code. All host effects go through the
//! capability object and the output sink.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    ast::{AssignTarget, BinaryOp, Block, Expr, ExprKind, NamedArg, Program, Stmt, StmtKind, UnaryOp},
    capability::{HostCapabilities, OptimizeRequest, PersonalityRecord, SayRequest},
    env::{AssignError, Frame},
    error::Exception,
    io::PrintWriter,
    resource::ResourceTracker,
    token::CodeLoc,
    value::{Closure, Intrinsic, Value},
};

/// Result of executing a statement.
enum Signal {
    /// Normal completion; carries the value of an expression statement so
    /// the REPL can report the final expression of a snippet.
    Normal(Option<Value>),
    Break,
    Continue,
    Return(Value),
}

/// Iterator state for `for` loops.
///
/// Arrays, mappings, and strings are snapshotted when the loop begins, so
/// mutating the source during iteration only becomes visible after the
/// loop. Ranges stay lazy.
enum ForIter {
    Values(std::vec::IntoIter<Value>),
    Range(i64, i64),
}

impl Iterator for ForIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Self::Values(values) => values.next(),
            Self::Range(next, end) => {
                if *next >= *end {
                    return None;
                }
                let value = Value::Int(*next);
                *next += 1;
                Some(value)
            }
        }
    }
}

/// The tree-walking evaluator.
///
/// Borrows the host capability object, resource tracker, output sink, and
/// personality record for the duration of one execution; holds no state of
/// its own beyond the call depth.
pub struct Interpreter<'a> {
    host: &'a mut dyn HostCapabilities,
    tracker: &'a mut dyn ResourceTracker,
    print: &'a mut dyn PrintWriter,
    personality: &'a mut PersonalityRecord,
    call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        host: &'a mut dyn HostCapabilities,
        tracker: &'a mut dyn ResourceTracker,
        print: &'a mut dyn PrintWriter,
        personality: &'a mut PersonalityRecord,
    ) -> Self {
        Self {
            host,
            tracker,
            print,
            personality,
            call_depth: 0,
        }
    }

    /// Populates a module frame with the host intrinsics visible as names.
    ///
    /// The AI-native intrinsics are keywords with dedicated syntax; only
    /// `print` and `now` are reachable through identifiers.
    pub fn seed_module_frame(env: &Rc<RefCell<Frame>>) {
        let mut frame = env.borrow_mut();
        let _ = frame.declare("print", Value::Intrinsic(Intrinsic::Print), false);
        let _ = frame.declare("now", Value::Intrinsic(Intrinsic::Now), false);
    }

    /// Executes top-level statements in order.
    ///
    /// Returns the value of the final top-level expression statement, or
    /// `None` when the program ends with any other statement kind (the REPL
    /// prints nothing in that case).
    pub fn run_program(&mut self, program: &Program, env: &Rc<RefCell<Frame>>) -> Result<Option<Value>, Exception> {
        let mut last = None;
        for stmt in &program.stmts {
            match self.exec_stmt(stmt, env)? {
                Signal::Normal(value) => last = value,
                // The parser rejects stray break/continue/return; a signal
                // reaching here would be an internal invariant violation.
                Signal::Break | Signal::Continue | Signal::Return(_) => break,
            }
        }
        Ok(last)
    }

    // === Statements ===

    fn exec_block(&mut self, block: &Block, env: &Rc<RefCell<Frame>>) -> Result<Signal, Exception> {
        let frame = Frame::child(env);
        self.exec_stmts(&block.stmts, &frame)
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Rc<RefCell<Frame>>) -> Result<Signal, Exception> {
        let mut last = Signal::Normal(None);
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                signal @ (Signal::Break | Signal::Continue | Signal::Return(_)) => return Ok(signal),
                signal => last = signal,
            }
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<RefCell<Frame>>) -> Result<Signal, Exception> {
        match &stmt.kind {
            StmtKind::Let { name, init, .. } => {
                let value = self.eval_expr(init, env)?;
                self.declare(env, name, value, true, stmt.loc)?;
                Ok(Signal::Normal(None))
            }
            StmtKind::Const { name, init, .. } => {
                let value = self.eval_expr(init, env)?;
                self.declare(env, name, value, false, stmt.loc)?;
                Ok(Signal::Normal(None))
            }
            StmtKind::Assign { target, value } => {
                self.exec_assign(target, value, env, stmt.loc)?;
                Ok(Signal::Normal(None))
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    self.exec_block(then_block, env)
                } else if let Some(else_block) = else_block {
                    self.exec_block(else_block, env)
                } else {
                    Ok(Signal::Normal(None))
                }
            }
            StmtKind::While { cond, body } => {
                loop {
                    self.check_cancel(stmt.loc)?;
                    if !self.eval_expr(cond, env)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(body, env)? {
                        Signal::Break => break,
                        Signal::Return(value) => return Ok(Signal::Return(value)),
                        Signal::Normal(_) | Signal::Continue => {}
                    }
                }
                Ok(Signal::Normal(None))
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let iterable_value = self.eval_expr(iterable, env)?;
                let iter = self.for_iterator(iterable_value, iterable.loc)?;
                for item in iter {
                    self.check_cancel(stmt.loc)?;
                    let frame = Frame::child(env);
                    // Fresh binding per iteration so closures capture the
                    // iteration's value, not the loop variable's last value.
                    let _ = frame.borrow_mut().declare(binding, item, true);
                    match self.exec_stmts(&body.stmts, &frame)? {
                        Signal::Break => break,
                        Signal::Return(value) => return Ok(Signal::Return(value)),
                        Signal::Normal(_) | Signal::Continue => {}
                    }
                }
                Ok(Signal::Normal(None))
            }
            StmtKind::Break => Ok(Signal::Break),
            StmtKind::Continue => Ok(Signal::Continue),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Null,
                };
                Ok(Signal::Return(value))
            }
            StmtKind::Block(block) => self.exec_block(block, env),
            StmtKind::FunctionDecl(decl) => {
                let closure = Value::Closure(Rc::new(Closure {
                    decl: Rc::clone(decl),
                    env: Rc::clone(env),
                }));
                self.declare(env, &decl.name, closure, false, decl.loc)?;
                Ok(Signal::Normal(None))
            }
            StmtKind::Personality(entries) => {
                for entry in entries {
                    if self.personality.set(&entry.name, entry.value).is_err() {
                        return Err(Exception::trait_range(
                            format!("trait '{}' must be in [0.0, 1.0], got {}", entry.name, entry.value),
                            entry.loc,
                        ));
                    }
                }
                Ok(Signal::Normal(None))
            }
            StmtKind::Voice(block) => self.exec_block(block, env),
            StmtKind::Say {
                text,
                emotion,
                voice_id,
                speed,
            } => {
                self.exec_say(text, emotion.as_ref(), voice_id.as_ref(), speed.as_ref(), env)?;
                Ok(Signal::Normal(None))
            }
            StmtKind::OptimizeSelf {
                metric,
                target,
                strategy,
            } => {
                let request = OptimizeRequest {
                    metric: self.eval_expr(metric, env)?,
                    target: self.eval_expr(target, env)?,
                    strategy: strategy.as_ref().map(|expr| self.eval_expr(expr, env)).transpose()?,
                };
                self.host.optimize_self(&request);
                Ok(Signal::Normal(None))
            }
            StmtKind::Expr(expr) => {
                let value = self.eval_expr(expr, env)?;
                Ok(Signal::Normal(Some(value)))
            }
        }
    }

    fn declare(
        &mut self,
        env: &Rc<RefCell<Frame>>,
        name: &str,
        value: Value,
        mutable: bool,
        loc: CodeLoc,
    ) -> Result<(), Exception> {
        env.borrow_mut()
            .declare(name, value, mutable)
            .map_err(|()| Exception::name(format!("name '{name}' is already defined in this scope"), loc))
    }

    fn exec_assign(
        &mut self,
        target: &AssignTarget,
        value: &Expr,
        env: &Rc<RefCell<Frame>>,
        loc: CodeLoc,
    ) -> Result<(), Exception> {
        match target {
            AssignTarget::Ident(name) => {
                let value = self.eval_expr(value, env)?;
                match env.borrow_mut().assign(name, &value) {
                    Ok(()) => Ok(()),
                    Err(AssignError::Unbound) => {
                        Err(Exception::name(format!("name '{name}' is not defined"), loc))
                    }
                    Err(AssignError::Immutable) => Err(Exception::type_error(
                        format!("cannot assign to constant '{name}'"),
                        loc,
                    )),
                }
            }
            AssignTarget::Index { target, index } => {
                let container = self.eval_expr(target, env)?;
                let index_value = self.eval_expr(index, env)?;
                let value = self.eval_expr(value, env)?;
                match container {
                    Value::Array(elements) => {
                        let slot = self.array_index(&elements.borrow(), &index_value, index.loc)?;
                        elements.borrow_mut()[slot] = value;
                        Ok(())
                    }
                    Value::Mapping(entries) => {
                        let Value::Str(key) = index_value else {
                            return Err(Exception::type_error(
                                format!("mapping keys are strings, not {}", index_value.type_name()),
                                index.loc,
                            ));
                        };
                        entries.borrow_mut().insert(key.to_string(), value);
                        Ok(())
                    }
                    other => Err(Exception::type_error(
                        format!("type '{}' does not support index assignment", other.type_name()),
                        target.loc,
                    )),
                }
            }
            AssignTarget::Member { target, name } => {
                let container = self.eval_expr(target, env)?;
                let value = self.eval_expr(value, env)?;
                match container {
                    Value::Mapping(entries) => {
                        entries.borrow_mut().insert(name.clone(), value);
                        Ok(())
                    }
                    other => Err(Exception::type_error(
                        format!("type '{}' does not support member assignment", other.type_name()),
                        target.loc,
                    )),
                }
            }
        }
    }

    fn exec_say(
        &mut self,
        text: &Expr,
        emotion: Option<&Expr>,
        voice_id: Option<&Expr>,
        speed: Option<&Expr>,
        env: &Rc<RefCell<Frame>>,
    ) -> Result<(), Exception> {
        let text_value = self.eval_expr(text, env)?;
        let emotion = self.eval_string_option(emotion, "say emotion", env)?;
        let voice_id = self.eval_string_option(voice_id, "say voice_id", env)?;
        let speed = self.eval_number_option(speed, "say speed", env)?;
        let request = SayRequest {
            text: text_value.to_string(),
            emotion,
            voice_id,
            speed,
        };
        if let Some(line) = self.host.say(&request) {
            self.print.write_str(&line)?;
            self.print.write_char('\n')?;
        }
        Ok(())
    }

    fn eval_string_option(
        &mut self,
        expr: Option<&Expr>,
        what: &str,
        env: &Rc<RefCell<Frame>>,
    ) -> Result<Option<String>, Exception> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval_expr(expr, env)? {
            Value::Str(text) => Ok(Some(text.to_string())),
            Value::Null => Ok(None),
            other => Err(Exception::type_error(
                format!("{what} must be a string, not {}", other.type_name()),
                expr.loc,
            )),
        }
    }

    fn eval_number_option(
        &mut self,
        expr: Option<&Expr>,
        what: &str,
        env: &Rc<RefCell<Frame>>,
    ) -> Result<Option<f64>, Exception> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval_expr(expr, env)? {
            Value::Int(value) => Ok(Some(value as f64)),
            Value::Float(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            other => Err(Exception::type_error(
                format!("{what} must be a number, not {}", other.type_name()),
                expr.loc,
            )),
        }
    }

    // === Expressions ===

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<RefCell<Frame>>) -> Result<Value, Exception> {
        match &expr.kind {
            ExprKind::IntLit(value) => Ok(Value::Int(*value)),
            ExprKind::FloatLit(value) => Ok(Value::Float(*value)),
            ExprKind::StringLit(value) => Ok(Value::str(value.as_str())),
            ExprKind::BoolLit(value) => Ok(Value::Bool(*value)),
            ExprKind::NullLit => Ok(Value::Null),
            ExprKind::Ident(name) => env
                .borrow()
                .lookup(name)
                .ok_or_else(|| Exception::name(format!("name '{name}' is not defined"), expr.loc)),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, env)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Index { target, index } => {
                let container = self.eval_expr(target, env)?;
                let index_value = self.eval_expr(index, env)?;
                match container {
                    Value::Array(elements) => {
                        let elements = elements.borrow();
                        let slot = self.array_index(&elements, &index_value, index.loc)?;
                        Ok(elements[slot].clone())
                    }
                    Value::Mapping(entries) => {
                        let Value::Str(key) = &index_value else {
                            return Err(Exception::type_error(
                                format!("mapping keys are strings, not {}", index_value.type_name()),
                                index.loc,
                            ));
                        };
                        entries.borrow().get(key.as_ref()).cloned().ok_or_else(|| {
                            Exception::key(format!("no such key '{key}'"), index.loc)
                        })
                    }
                    other => Err(Exception::type_error(
                        format!("type '{}' is not indexable", other.type_name()),
                        target.loc,
                    )),
                }
            }
            ExprKind::Member { target, name } => {
                let container = self.eval_expr(target, env)?;
                match container {
                    Value::Mapping(entries) => entries
                        .borrow()
                        .get(name)
                        .cloned()
                        .ok_or_else(|| Exception::key(format!("no such key '{name}'"), expr.loc)),
                    other => Err(Exception::type_error(
                        format!("type '{}' has no members", other.type_name()),
                        target.loc,
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, env),
            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(operand, env)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(value) => value.checked_neg().map(Value::Int).ok_or_else(|| {
                            Exception::arith("integer overflow", expr.loc)
                        }),
                        Value::Float(value) => Ok(Value::Float(-value)),
                        other => Err(Exception::type_error(
                            format!("cannot negate {}", other.type_name()),
                            operand.loc,
                        )),
                    },
                }
            }
            ExprKind::Call { callee, args, named } => self.eval_call(callee, args, named, env, expr.loc),
            ExprKind::Range { start, end } => {
                let start_value = self.eval_expr(start, env)?;
                let end_value = self.eval_expr(end, env)?;
                match (start_value, end_value) {
                    (Value::Int(start), Value::Int(end)) => Ok(Value::Range(start, end)),
                    (start, end) => Err(Exception::type_error(
                        format!(
                            "range bounds must be integers, not {} and {}",
                            start.type_name(),
                            end.type_name()
                        ),
                        expr.loc,
                    )),
                }
            }
            ExprKind::Knowledge { query, filters } => {
                let query_value = self.eval_expr(query, env)?;
                let mut filter_map = IndexMap::new();
                for filter in filters {
                    let value = self.eval_expr(&filter.value, env)?;
                    filter_map.insert(filter.name.clone(), value);
                }
                let records = self.host.knowledge(&query_value, &filter_map);
                Ok(Value::array(records.into_iter().map(Value::mapping).collect()))
            }
            ExprKind::Listen { timeout, language } => {
                let timeout = self.eval_number_option(timeout.as_deref(), "listen timeout", env)?;
                let language = self.eval_string_option(language.as_deref(), "listen language", env)?;
                match self.host.listen(timeout, language.as_deref()) {
                    Some(text) => Ok(Value::str(text)),
                    None => Ok(Value::Null),
                }
            }
            ExprKind::GetTrait { name } => {
                let name_value = self.eval_expr(name, env)?;
                let Value::Str(trait_name) = &name_value else {
                    return Err(Exception::type_error(
                        format!("get_trait takes a string, not {}", name_value.type_name()),
                        name.loc,
                    ));
                };
                Ok(match self.personality.get(trait_name) {
                    Some(value) => Value::Float(value),
                    None => Value::Null,
                })
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Rc<RefCell<Frame>>,
    ) -> Result<Value, Exception> {
        // Short-circuit forms return the determining operand uncoerced.
        if op == BinaryOp::And {
            let left_value = self.eval_expr(left, env)?;
            if !left_value.is_truthy() {
                return Ok(left_value);
            }
            return self.eval_expr(right, env);
        }
        if op == BinaryOp::Or {
            let left_value = self.eval_expr(left, env)?;
            if left_value.is_truthy() {
                return Ok(left_value);
            }
            return self.eval_expr(right, env);
        }

        let left_value = self.eval_expr(left, env)?;
        let right_value = self.eval_expr(right, env)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(left_value.structural_eq(&right_value))),
            BinaryOp::NotEq => Ok(Value::Bool(!left_value.structural_eq(&right_value))),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let Some(ordering) = left_value.partial_order(&right_value) else {
                    return Err(Exception::type_error(
                        format!(
                            "incomparable types '{}' and '{}'",
                            left_value.type_name(),
                            right_value.type_name()
                        ),
                        left.loc,
                    ));
                };
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                self.eval_arithmetic(op, left_value, right_value, left.loc, right.loc)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit forms handled above"),
        }
    }

    fn eval_arithmetic(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        loc: CodeLoc,
        right_loc: CodeLoc,
    ) -> Result<Value, Exception> {
        // String concatenation is the only non-numeric arithmetic form.
        if op == BinaryOp::Add
            && let (Value::Str(a), Value::Str(b)) = (&left, &right)
        {
            let mut text = String::with_capacity(a.len() + b.len());
            text.push_str(a);
            text.push_str(b);
            return Ok(Value::str(text));
        }

        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => {
                        if b == 0 {
                            return Err(Exception::arith("divide-by-zero", right_loc));
                        }
                        a.checked_div(b)
                    }
                    BinaryOp::Mod => {
                        if b == 0 {
                            return Err(Exception::arith("divide-by-zero", right_loc));
                        }
                        a.checked_rem(b)
                    }
                    _ => unreachable!("non-arithmetic op"),
                };
                result
                    .map(Value::Int)
                    .ok_or_else(|| Exception::arith("integer overflow", loc))
            }
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = match left {
                    Value::Int(value) => value as f64,
                    Value::Float(value) => value,
                    _ => unreachable!(),
                };
                let b = match right {
                    Value::Int(value) => value as f64,
                    Value::Float(value) => value,
                    _ => unreachable!(),
                };
                if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
                    return Err(Exception::arith("divide-by-zero", right_loc));
                }
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Mod => a % b,
                    _ => unreachable!("non-arithmetic op"),
                };
                Ok(Value::Float(result))
            }
            _ => Err(Exception::type_error(
                format!(
                    "unsupported operand types for '{}': '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ),
                loc,
            )),
        }
    }

    fn array_index(&self, elements: &[Value], index: &Value, loc: CodeLoc) -> Result<usize, Exception> {
        let Value::Int(index) = index else {
            return Err(Exception::type_error(
                format!("array indices are integers, not {}", index.type_name()),
                loc,
            ));
        };
        let index = *index;
        if index < 0 || index as usize >= elements.len() {
            return Err(Exception::index(
                format!("index {index} out of range for array of length {}", elements.len()),
                loc,
            ));
        }
        Ok(index as usize)
    }

    fn for_iterator(&mut self, value: Value, loc: CodeLoc) -> Result<ForIter, Exception> {
        match value {
            Value::Array(elements) => Ok(ForIter::Values(elements.borrow().clone().into_iter())),
            Value::Mapping(entries) => {
                let keys: Vec<Value> = entries.borrow().keys().map(|key| Value::str(key.as_str())).collect();
                Ok(ForIter::Values(keys.into_iter()))
            }
            Value::Str(text) => {
                let chars: Vec<Value> = text.chars().map(|ch| Value::str(ch.to_string())).collect();
                Ok(ForIter::Values(chars.into_iter()))
            }
            Value::Range(start, end) => Ok(ForIter::Range(start, end)),
            other => Err(Exception::type_error(
                format!("type '{}' is not iterable", other.type_name()),
                loc,
            )),
        }
    }

    fn check_cancel(&mut self, loc: CodeLoc) -> Result<(), Exception> {
        self.tracker.check_cancel().map_err(|err| err.into_exception(loc))
    }

    // === Calls ===

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        named: &[NamedArg],
        env: &Rc<RefCell<Frame>>,
        loc: CodeLoc,
    ) -> Result<Value, Exception> {
        let callee_value = self.eval_expr(callee, env)?;

        // Arguments evaluate left-to-right in source order.
        let mut positional: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len());
        for arg in args {
            positional.push(self.eval_expr(arg, env)?);
        }
        let mut named_values: SmallVec<[(String, Value); 4]> = SmallVec::with_capacity(named.len());
        for arg in named {
            let value = self.eval_expr(&arg.value, env)?;
            named_values.push((arg.name.clone(), value));
        }

        match callee_value {
            Value::Closure(closure) => self.call_closure(&closure, positional, named_values, loc),
            Value::Intrinsic(intrinsic) => self.call_intrinsic(intrinsic, positional, named_values, loc),
            other => Err(Exception::type_error(
                format!("type '{}' is not callable", other.type_name()),
                callee.loc,
            )),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Closure,
        positional: SmallVec<[Value; 4]>,
        named: SmallVec<[(String, Value); 4]>,
        loc: CodeLoc,
    ) -> Result<Value, Exception> {
        let decl = &closure.decl;
        self.check_cancel(loc)?;
        self.tracker
            .check_recursion_depth(self.call_depth)
            .map_err(|err| err.into_exception(loc))?;

        if positional.len() > decl.params.len() {
            return Err(Exception::arity(
                format!(
                    "{}() takes {} arguments but {} were given",
                    decl.name,
                    decl.params.len(),
                    positional.len()
                ),
                loc,
            ));
        }

        // The call frame's parent is the *captured* environment, not the
        // caller's: user functions are proper closures.
        let frame = Frame::child(&closure.env);
        let mut slots: Vec<Option<Value>> = positional.into_iter().map(Some).collect();
        slots.resize(decl.params.len(), None);

        for (name, value) in named {
            let Some(position) = decl.params.iter().position(|param| param.name == name) else {
                return Err(Exception::arity(
                    format!("{}() has no parameter named '{name}'", decl.name),
                    loc,
                ));
            };
            if slots[position].is_some() {
                return Err(Exception::arity(
                    format!("{}() got multiple values for parameter '{name}'", decl.name),
                    loc,
                ));
            }
            slots[position] = Some(value);
        }

        for (param, slot) in decl.params.iter().zip(slots.into_iter()) {
            let value = match slot {
                Some(value) => value,
                None => match &param.default {
                    // Defaults are evaluated at call time in the captured
                    // environment.
                    Some(default) => self.eval_expr(default, &closure.env)?,
                    None => {
                        return Err(Exception::arity(
                            format!("{}() missing required argument '{}'", decl.name, param.name),
                            loc,
                        ));
                    }
                },
            };
            let _ = frame.borrow_mut().declare(&param.name, value, true);
        }

        self.call_depth += 1;
        let result = self.exec_stmts(&decl.body.stmts, &frame);
        self.call_depth -= 1;

        match result {
            Ok(Signal::Return(value)) => Ok(value),
            // In scripts a function returns null unless it executes `return`.
            Ok(_) => Ok(Value::Null),
            Err(mut err) => {
                err.push_frame(&decl.name, loc);
                Err(err)
            }
        }
    }

    fn call_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        positional: SmallVec<[Value; 4]>,
        named: SmallVec<[(String, Value); 4]>,
        loc: CodeLoc,
    ) -> Result<Value, Exception> {
        if !named.is_empty() {
            return Err(Exception::arity(
                format!("{}() takes no named arguments", intrinsic.name()),
                loc,
            ));
        }
        match intrinsic {
            Intrinsic::Print => {
                for (i, value) in positional.iter().enumerate() {
                    if i > 0 {
                        self.print.write_char(' ')?;
                    }
                    self.print.write_str(&value.to_string())?;
                }
                self.print.write_char('\n')?;
                Ok(Value::Null)
            }
            Intrinsic::Now => {
                if !positional.is_empty() {
                    return Err(Exception::arity("now() takes no arguments", loc));
                }
                Ok(Value::Int(self.host.now_ms()))
            }
            // The remaining intrinsics have dedicated syntax and can never
            // appear as callable values.
            other => Err(Exception::type_error(
                format!("intrinsic '{}' requires its dedicated form", other.name()),
                loc,
            )),
        }
    }
}
