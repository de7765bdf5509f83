use std::rc::Rc;

use log::trace;

use super::DebuggerCommand;
use crate::executor::{EnvId, EvalResult, Interpreter, Value};
use crate::parser::Block;
use crate::source::LocationResolver;

/// Begin primitive installed while the debugger is enabled. Behaves like the
/// stock primitive but consults the debugger before every statement.
pub(crate) fn debug_do_begin(interp: &mut Interpreter, block: &Rc<Block>, env: EnvId) -> EvalResult {
    let (function, frame_env, name) = match interp.contexts.current_call() {
        Some(context) => (
            context.function().cloned(),
            Some(context.env),
            context.call().map(|c| c.function_name()).unwrap_or_default(),
        ),
        None => (None, None, String::new()),
    };
    if let Some(function) = &function {
        interp.sources.resolve_for_function(&function.def, &name);
    }

    let head = block.srcref(0);
    interp.current_srcref = head;
    let physical = head.map_or(false, |h| interp.sources.is_physical(h));
    if let Some(head) = head.filter(|h| interp.sources.is_debug(*h)) {
        let breakpoint = interp.debugger.breakpoints.attached(head).cloned();
        interp.do_breakpoint(breakpoint, false, env)?;
    }

    let mut value = Value::Null;
    for (index, stmt) in block.stmts.iter().enumerate() {
        let srcref = block.srcref(index + 1);
        interp.current_srcref = srcref;
        interp.check_interrupt()?;

        let stop_here = match interp.debugger.command {
            DebuggerCommand::StepInto => physical,
            DebuggerCommand::ForceStepInto | DebuggerCommand::Pause | DebuggerCommand::Stop => true,
            DebuggerCommand::StepOver | DebuggerCommand::StepOut => {
                frame_env.map_or(false, |e| interp.envs.stop_here(e))
            }
            DebuggerCommand::Continue => false,
        };
        let flagged = srcref.map_or(false, |s| interp.sources.is_debug(s));

        if stop_here || flagged {
            trace!(
                "statement {:?}: stop_here={} flagged={}",
                srcref,
                stop_here,
                flagged
            );
            let breakpoint = srcref
                .filter(|_| flagged)
                .and_then(|s| interp.debugger.breakpoints.attached(s).cloned());
            interp.do_breakpoint(breakpoint, stop_here, env)?;
        }
        value = interp.eval(stmt, env)?;
    }
    interp.current_srcref = None;
    Ok(value)
}
