use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::env::EnvId;
use super::{EvalResult, Interpreter};
use crate::parser::{Call, Expr, FunctionDef};

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    /// Only ever stored in an environment; lookups force it.
    Promise(Rc<RefCell<Promise>>),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "logical",
            Value::Num(_) => "numeric",
            Value::Str(_) => "character",
            Value::Closure(_) | Value::Builtin(_) => "function",
            Value::Promise(_) => "promise",
        }
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Num(n) if !n.is_nan() => Some(*n != 0.0),
            Value::Str(s) => match &**s {
                "TRUE" | "true" | "T" | "True" => Some(true),
                "FALSE" | "false" | "F" | "False" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// The text `print()` writes for this value.
    pub fn printed(&self) -> String {
        match self {
            Value::Str(s) => format!("[1] {:?}", s),
            Value::Bool(_) | Value::Num(_) => format!("[1] {}", self),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Num(n) if n.is_nan() => f.write_str("NaN"),
            Value::Num(n) if n.is_infinite() => f.write_str(if *n > 0.0 { "Inf" } else { "-Inf" }),
            Value::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Num(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::Closure(closure) => {
                let params: Vec<&str> = closure.def.params.iter().map(|p| &*p.name).collect();
                write!(f, "function({})", params.join(", "))
            }
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Value::Promise(promise) => match &promise.borrow().value {
                Some(value) => write!(f, "{}", value),
                None => f.write_str("<promise>"),
            },
        }
    }
}

#[derive(Debug)]
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: EnvId,
}

/// A lazily evaluated argument.
#[derive(Debug)]
pub struct Promise {
    pub expr: Expr,
    pub env: EnvId,
    pub value: Option<Value>,
    pub forcing: bool,
}

impl Promise {
    pub fn new(expr: Expr, env: EnvId) -> Self {
        Self {
            expr,
            env,
            value: None,
            forcing: false,
        }
    }
}

pub type EagerFn = fn(&mut Interpreter, Vec<Value>) -> EvalResult;
pub type SpecialFn = fn(&mut Interpreter, &Rc<Call>, EnvId) -> EvalResult;

#[derive(Clone, Copy)]
pub enum BuiltinFn {
    /// Receives its arguments already forced.
    Eager(EagerFn),
    /// Receives the unevaluated call.
    Special(SpecialFn),
}

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_print_like_integers_when_whole() {
        assert_eq!(Value::Num(5.0).to_string(), "5");
        assert_eq!(Value::Num(2.5).to_string(), "2.5");
        assert_eq!(Value::Num(-3.0).printed(), "[1] -3");
    }

    #[test]
    fn test_printed_strings_are_quoted() {
        assert_eq!(Value::str("abc").printed(), "[1] \"abc\"");
        assert_eq!(Value::str("abc").to_string(), "abc");
        assert_eq!(Value::Null.printed(), "NULL");
        assert_eq!(Value::Bool(true).printed(), "[1] TRUE");
    }

    #[test]
    fn test_as_logical() {
        assert_eq!(Value::Bool(false).as_logical(), Some(false));
        assert_eq!(Value::Num(2.0).as_logical(), Some(true));
        assert_eq!(Value::str("TRUE").as_logical(), Some(true));
        assert_eq!(Value::str("maybe").as_logical(), None);
        assert_eq!(Value::Null.as_logical(), None);
    }
}
