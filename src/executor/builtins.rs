use std::rc::Rc;

use super::env::{EnvId, Environments};
use super::value::{Builtin, BuiltinFn, Value};
use super::{EvalResult, Interpreter};
use crate::error::Unwind;
use crate::parser::Call;

static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "print",
        func: BuiltinFn::Eager(print),
    },
    Builtin {
        name: "cat",
        func: BuiltinFn::Eager(cat),
    },
    Builtin {
        name: "message",
        func: BuiltinFn::Eager(message),
    },
    Builtin {
        name: "paste",
        func: BuiltinFn::Eager(paste),
    },
    Builtin {
        name: "stop",
        func: BuiltinFn::Eager(stop),
    },
    Builtin {
        name: "identity",
        func: BuiltinFn::Eager(identity),
    },
    Builtin {
        name: "is.null",
        func: BuiltinFn::Eager(is_null),
    },
    Builtin {
        name: "process_events",
        func: BuiltinFn::Eager(process_events),
    },
    Builtin {
        name: "return",
        func: BuiltinFn::Special(do_return),
    },
    Builtin {
        name: "try",
        func: BuiltinFn::Special(do_try),
    },
];

pub(super) fn install(envs: &mut Environments) {
    for builtin in BUILTINS {
        envs.define(EnvId::GLOBAL, Rc::from(builtin.name), Value::Builtin(builtin));
    }
}

fn joined(args: &[Value], sep: &str) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Null)
}

fn print(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    let value = first(args);
    interp.write_stdout(&format!("{}\n", value.printed()))?;
    Ok(value)
}

fn cat(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    interp.write_stdout(&joined(&args, " "))?;
    Ok(Value::Null)
}

fn message(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    interp.message(&joined(&args, ""), true)?;
    Ok(Value::Null)
}

fn paste(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    Ok(Value::str(joined(&args, " ")))
}

fn stop(interp: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    Err(interp.signal_error(joined(&args, "")))
}

fn identity(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    Ok(first(args))
}

fn is_null(_: &mut Interpreter, args: Vec<Value>) -> EvalResult {
    Ok(Value::Bool(matches!(first(args), Value::Null)))
}

fn process_events(interp: &mut Interpreter, _: Vec<Value>) -> EvalResult {
    interp.process_events();
    Ok(Value::Null)
}

fn do_return(interp: &mut Interpreter, call: &Rc<Call>, env: EnvId) -> EvalResult {
    let value = match call.args.first() {
        Some(arg) => interp.eval(&arg.value, env)?,
        None => Value::Null,
    };
    Err(Unwind::Return(value))
}

/// `try(expr)`: an error inside `expr` is reported and its message returned.
fn do_try(interp: &mut Interpreter, call: &Rc<Call>, env: EnvId) -> EvalResult {
    let Some(arg) = call.args.first() else {
        return Ok(Value::Null);
    };
    match interp.with_try(|interp| interp.eval(&arg.value, env)) {
        Err(Unwind::Error(err)) => {
            interp.message(&format!("Error : {}", err), true)?;
            Ok(Value::str(&err.message))
        }
        other => other,
    }
}
