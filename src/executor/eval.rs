use std::cell::RefCell;
use std::rc::Rc;

use super::context::ContextKind;
use super::env::EnvId;
use super::value::{BuiltinFn, Closure, Promise, Value};
use super::{EvalResult, Interpreter};
use crate::error::Unwind;
use crate::parser::{BinaryOp, Block, Call, Expr, UnaryOp};

/// Deepest nesting of closure calls and promise forcing.
const MAX_EVAL_DEPTH: usize = 5000;
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// The stock compound-statement primitive.
pub(crate) fn do_begin(interp: &mut Interpreter, block: &Rc<Block>, env: EnvId) -> EvalResult {
    interp.eval_statements(block, env)
}

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expr, env: EnvId) -> EvalResult {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    /// Run `f` one level deeper, failing once recursion runs away.
    fn deeper<T>(&mut self, f: impl FnOnce(&mut Self) -> EvalResult<T>) -> EvalResult<T> {
        if self.eval_depth >= MAX_EVAL_DEPTH {
            return Err(self.signal_error("evaluation nested too deeply: infinite recursion"));
        }
        self.eval_depth += 1;
        let result = f(self);
        self.eval_depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr, env: EnvId) -> EvalResult {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Ident(name) => self.lookup(name, env),
            Expr::Assign { target, value } => {
                let value = self.eval(value, env)?;
                self.envs.define(env, target.clone(), value.clone());
                Ok(value)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                self.unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, env),
            Expr::Call(call) => self.eval_call(call, env),
            Expr::Function(def) => Ok(Value::Closure(Rc::new(Closure {
                def: def.clone(),
                env,
            }))),
            Expr::Block(block) => self.eval_block(block, env),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let value = self.eval(cond, env)?;
                if self.truthy(&value)? {
                    self.eval(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, env)
                } else {
                    Ok(Value::Null)
                }
            }
            Expr::While { cond, body } => {
                loop {
                    self.check_interrupt()?;
                    let value = self.eval(cond, env)?;
                    if !self.truthy(&value)? {
                        break;
                    }
                    match self.eval(body, env) {
                        Ok(_) | Err(Unwind::Next) => {}
                        Err(Unwind::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Null)
            }
            Expr::Break => Err(Unwind::Break),
            Expr::Next => Err(Unwind::Next),
        }
    }

    /// Evaluate free-standing expressions in order; the last value wins.
    pub(crate) fn eval_exprs(&mut self, exprs: &[Expr], env: EnvId) -> EvalResult {
        let mut value = Value::Null;
        for expr in exprs {
            value = self.eval(expr, env)?;
        }
        Ok(value)
    }

    /// A `{ ... }` block: compiled closure bodies run directly, everything
    /// else goes through the begin primitive.
    pub(crate) fn eval_block(&mut self, block: &Rc<Block>, env: EnvId) -> EvalResult {
        if self.compiled() {
            self.eval_statements(block, env)
        } else {
            (self.begin)(self, block, env)
        }
    }

    fn compiled(&self) -> bool {
        self.jit_level > 0
            && self
                .contexts
                .current_call()
                .map_or(false, |c| c.function().is_some())
    }

    pub(crate) fn eval_statements(&mut self, block: &Rc<Block>, env: EnvId) -> EvalResult {
        let mut value = Value::Null;
        for (index, stmt) in block.stmts.iter().enumerate() {
            self.current_srcref = block.srcref(index + 1);
            self.check_interrupt()?;
            value = self.eval(stmt, env)?;
        }
        self.current_srcref = None;
        Ok(value)
    }

    fn lookup(&mut self, name: &str, env: EnvId) -> EvalResult {
        match self.envs.lookup(env, name) {
            Some(Value::Promise(promise)) => self.force(&promise),
            Some(value) => Ok(value),
            None => Err(self.signal_error(format!("object '{}' not found", name))),
        }
    }

    fn force(&mut self, promise: &Rc<RefCell<Promise>>) -> EvalResult {
        let pending = {
            let mut p = promise.borrow_mut();
            if let Some(value) = &p.value {
                return Ok(value.clone());
            }
            if p.forcing {
                None
            } else {
                p.forcing = true;
                Some((p.expr.clone(), p.env))
            }
        };
        let Some((expr, env)) = pending else {
            return Err(self.signal_error(
                "promise already under evaluation: recursive default argument reference or earlier problems?",
            ));
        };

        let result = self.deeper(|interp| interp.eval(&expr, env));
        let mut p = promise.borrow_mut();
        p.forcing = false;
        let value = result?;
        p.value = Some(value.clone());
        Ok(value)
    }

    fn promise_for(&mut self, expr: &Expr, env: EnvId) -> EvalResult {
        if expr.is_constant() {
            return self.eval(expr, env);
        }
        Ok(Value::Promise(Rc::new(RefCell::new(Promise::new(
            expr.clone(),
            env,
        )))))
    }

    fn eval_call(&mut self, call: &Rc<Call>, env: EnvId) -> EvalResult {
        let callee = match &call.callee {
            Expr::Ident(name) => match self.envs.lookup(env, name) {
                Some(Value::Promise(promise)) => self.force(&promise)?,
                Some(value) => value,
                None => {
                    return Err(self.signal_error(format!("could not find function \"{}\"", name)))
                }
            },
            other => self.eval(other, env)?,
        };

        match callee {
            Value::Closure(closure) => self.apply_closure(&closure, call, env),
            Value::Builtin(builtin) => match builtin.func {
                BuiltinFn::Eager(func) => {
                    let args = call
                        .args
                        .iter()
                        .map(|arg| self.eval(&arg.value, env))
                        .collect::<EvalResult<Vec<_>>>()?;
                    func(self, args)
                }
                BuiltinFn::Special(func) => func(self, call, env),
            },
            _ => Err(self.signal_error("attempt to apply non-function")),
        }
    }

    fn apply_closure(&mut self, closure: &Rc<Closure>, call: &Rc<Call>, env: EnvId) -> EvalResult {
        let def = &closure.def;
        let Some(fenv) = self.envs.new_child(closure.env) else {
            return Err(self.signal_error("too many environments"));
        };
        let mut bound = vec![false; def.params.len()];
        let mut positional = Vec::new();

        for arg in &call.args {
            let value = self.promise_for(&arg.value, env)?;
            match &arg.name {
                Some(name) => {
                    let Some(index) = def.params.iter().position(|p| p.name == *name) else {
                        return Err(self.signal_error(format!("unused argument ({} = ...)", name)));
                    };
                    bound[index] = true;
                    self.envs.define(fenv, def.params[index].name.clone(), value);
                }
                None => positional.push(value),
            }
        }

        let mut positional = positional.into_iter();
        for (index, param) in def.params.iter().enumerate() {
            if bound[index] {
                continue;
            }
            if let Some(value) = positional.next() {
                bound[index] = true;
                self.envs.define(fenv, param.name.clone(), value);
            } else if let Some(default) = &param.default {
                let value = self.promise_for(default, fenv)?;
                self.envs.define(fenv, param.name.clone(), value);
            }
        }
        if positional.next().is_some() {
            return Err(self.signal_error(format!(
                "unused argument in call to {}",
                call.function_name()
            )));
        }

        self.check_interrupt()?;
        let kind = ContextKind::Call {
            call: call.clone(),
            function: Some(closure.clone()),
        };
        let result = self.deeper(|interp| {
            let id = interp.contexts.push(kind, fenv, interp.current_srcref);
            let result = interp.eval(&def.body, fenv);
            interp.current_srcref = interp.contexts.pop(id);
            result
        });

        match result {
            Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Break) | Err(Unwind::Next) => {
                Err(self.signal_error("no loop for break/next, jumping to top level"))
            }
            other => other,
        }
    }

    fn truthy(&mut self, value: &Value) -> EvalResult<bool> {
        match value {
            Value::Null => Err(self.signal_error("argument is of length zero")),
            other => other.as_logical().ok_or_else(|| {
                self.signal_error("argument is not interpretable as logical")
            }),
        }
    }

    fn unary(&mut self, op: UnaryOp, value: Value) -> EvalResult {
        match (op, &value) {
            (UnaryOp::Neg, Value::Num(n)) => Ok(Value::Num(-n)),
            (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Num(-(*b as u8 as f64))),
            (UnaryOp::Not, _) => match value.as_logical() {
                Some(b) => Ok(Value::Bool(!b)),
                None => Err(self.signal_error("invalid argument type")),
            },
            (UnaryOp::Neg, _) => Err(self.signal_error("invalid argument to unary operator")),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, env: EnvId) -> EvalResult {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let left = self.eval(lhs, env)?;
                let left = self.truthy(&left)?;
                if (op == BinaryOp::And) != left {
                    return Ok(Value::Bool(left));
                }
                let right = self.eval(rhs, env)?;
                Ok(Value::Bool(self.truthy(&right)?))
            }
            _ => {
                let left = self.eval(lhs, env)?;
                let right = self.eval(rhs, env)?;
                self.arith(op, &left, &right)
            }
        }
    }

    fn arith(&mut self, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
        if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
            return Ok(match op {
                BinaryOp::Add => Value::Num(a + b),
                BinaryOp::Sub => Value::Num(a - b),
                BinaryOp::Mul => Value::Num(a * b),
                BinaryOp::Div => Value::Num(a / b),
                BinaryOp::Eq => Value::Bool(a == b),
                BinaryOp::Ne => Value::Bool(a != b),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::Le => Value::Bool(a <= b),
                BinaryOp::Ge => Value::Bool(a >= b),
                BinaryOp::And => Value::Bool(a != 0.0 && b != 0.0),
                BinaryOp::Or => Value::Bool(a != 0.0 || b != 0.0),
            });
        }

        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            let result = match op {
                BinaryOp::Eq => Some(a == b),
                BinaryOp::Ne => Some(a != b),
                BinaryOp::Lt => Some(a < b),
                BinaryOp::Gt => Some(a > b),
                BinaryOp::Le => Some(a <= b),
                BinaryOp::Ge => Some(a >= b),
                _ => None,
            };
            if let Some(result) = result {
                return Ok(Value::Bool(result));
            }
        }

        Err(self.signal_error(format!(
            "non-numeric argument to binary operator ({} and {})",
            left.type_name(),
            right.type_name()
        )))
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Num(n) => Some(*n),
        Value::Bool(b) => Some(*b as u8 as f64),
        _ => None,
    }
}
