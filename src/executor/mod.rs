//! A small tree-walking evaluator for a lazy, R-like language: promises for
//! arguments, an arena of mutable environments and a linked chain of call
//! contexts the debugger can walk.

mod builtins;
mod context;
mod env;
mod eval;
mod value;

use std::io::{self, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

pub use context::{Context, ContextId, ContextKind, ContextStack};
pub use env::{EnvId, Environments};
pub(crate) use eval::do_begin;
pub use value::{Builtin, BuiltinFn, Closure, Promise, Value};

use crate::debugger::Debugger;
use crate::error::{Error, Result, RuntimeError, Unwind};
use crate::parser::{Block, Call};
use crate::source::SourceMap;

pub type EvalResult<T = Value> = std::result::Result<T, Unwind>;

/// The compound-statement primitive. The debugger swaps this out while it
/// is enabled.
pub type BeginFn = fn(&mut Interpreter, &Rc<Block>, EnvId) -> EvalResult;

/// Thread-safe handle for requesting a user interrupt.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

type EventHandler = Rc<dyn Fn(&mut Interpreter)>;

pub struct Interpreter {
    pub(crate) sources: SourceMap,
    pub(crate) envs: Environments,
    pub(crate) contexts: ContextStack,
    pub(crate) begin: BeginFn,
    pub(crate) jit_level: u32,
    /// Statement currently being executed.
    pub(crate) current_srcref: Option<crate::source::SrcRef>,
    pub(crate) debugger: Debugger,
    interrupt: InterruptHandle,
    try_depth: usize,
    eval_depth: usize,
    event_handler: Option<EventHandler>,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(io::stdout(), io::stderr())
    }

    /// An interpreter writing program output and messages to the given sinks.
    pub fn with_output(stdout: impl Write + 'static, stderr: impl Write + 'static) -> Self {
        let mut envs = Environments::new();
        builtins::install(&mut envs);
        Self {
            sources: SourceMap::new(),
            envs,
            contexts: ContextStack::new(),
            begin: do_begin,
            jit_level: 0,
            current_srcref: None,
            debugger: Debugger::new(),
            interrupt: InterruptHandle::default(),
            try_depth: 0,
            eval_depth: 0,
            event_handler: None,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }

    pub fn global_env(&self) -> EnvId {
        EnvId::GLOBAL
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn envs(&self) -> &Environments {
        &self.envs
    }

    pub fn contexts(&self) -> &ContextStack {
        &self.contexts
    }

    /// Set the compilation level and return the previous one. Closure bodies
    /// run compiled at any level above zero and never reach the begin
    /// primitive.
    pub fn compiler_enable_jit(&mut self, level: u32) -> u32 {
        std::mem::replace(&mut self.jit_level, level)
    }

    pub fn jit_level(&self) -> u32 {
        self.jit_level
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Install the callback `process_events()` runs.
    pub fn set_event_handler(&mut self, handler: impl Fn(&mut Interpreter) + 'static) {
        self.event_handler = Some(Rc::new(handler));
    }

    pub fn process_events(&mut self) {
        if let Some(handler) = self.event_handler.clone() {
            handler(self);
        }
    }

    /// Parse a physical source file and register its statements.
    pub fn load_source(&mut self, file: &str, text: &str) -> Result<Rc<Block>> {
        Ok(self.sources.load(file, text, true)?)
    }

    /// Evaluate a loaded file's top level in the global environment.
    pub fn run_source(&mut self, file: &str) -> Result<Value> {
        let program = self
            .sources
            .unit(file)
            .map(|unit| unit.program().clone())
            .ok_or_else(|| Error::Runtime(RuntimeError::new(format!("no source loaded for '{}'", file))))?;
        debug!("running {}", file);

        self.top_level(|interp| {
            let wrapper = ContextKind::Call {
                call: Call::synthetic("<source>"),
                function: None,
            };
            let id = interp.contexts.push(wrapper, EnvId::GLOBAL, interp.current_srcref);
            let result = interp.eval_block(&program, EnvId::GLOBAL);
            interp.current_srcref = interp.contexts.pop(id);
            result
        })
    }

    pub fn source(&mut self, file: &str, text: &str) -> Result<Value> {
        self.load_source(file, text)?;
        self.run_source(file)
    }

    /// Evaluate console input at the top level.
    pub fn evaluate(&mut self, text: &str) -> Result<Value> {
        let program = self.sources.load("<console>", text, false)?;
        self.top_level(|interp| interp.eval_block(&program, EnvId::GLOBAL))
    }

    /// Evaluate console input in `frame`, typically a frame of a halted stack.
    pub fn evaluate_in_frame(&mut self, text: &str, frame: EnvId) -> Result<Value> {
        let program = self.sources.load("<eval>", text, false)?;
        let wrapper_env = self
            .envs
            .new_child(frame)
            .ok_or_else(|| Error::Runtime(RuntimeError::new("too many environments")))?;
        self.envs.set_stack_bottom(wrapper_env, Some(frame));

        self.top_level(|interp| {
            let wrapper = ContextKind::Call {
                call: Call::synthetic("<eval>"),
                function: None,
            };
            let id = interp.contexts.push(wrapper, wrapper_env, interp.current_srcref);
            let result = interp.eval_block(&program, frame);
            interp.current_srcref = interp.contexts.pop(id);
            result
        })
    }

    fn top_level(&mut self, f: impl FnOnce(&mut Self) -> EvalResult) -> Result<Value> {
        let id = self
            .contexts
            .push(ContextKind::TopLevel, EnvId::GLOBAL, self.current_srcref);
        let result = f(self);
        self.current_srcref = self.contexts.pop(id);
        result.or_else(Error::from_unwind)
    }

    /// Raise a pending interrupt, if any.
    pub(crate) fn check_interrupt(&mut self) -> EvalResult<()> {
        if self.interrupt.take() {
            debug!("interrupt delivered");
            return Err(Unwind::Interrupt);
        }
        Ok(())
    }

    pub(crate) fn interrupt_pending(&self) -> bool {
        self.interrupt.is_pending()
    }

    /// Build an error unwind. Errors not caught by `try()` leave their stack
    /// behind for `last_error_stack()`.
    pub(crate) fn signal_error(&mut self, message: impl Into<String>) -> Unwind {
        if self.try_depth == 0 {
            self.record_last_error();
        }
        Unwind::Error(RuntimeError::new(message))
    }

    /// Run `f` with errors treated as handled.
    pub(crate) fn with_try<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.try_depth += 1;
        let result = f(self);
        self.try_depth -= 1;
        result
    }

    pub(crate) fn write_stdout(&mut self, text: &str) -> EvalResult<()> {
        self.stdout
            .write_all(text.as_bytes())
            .and_then(|_| self.stdout.flush())
            .map_err(|e| Unwind::error(e.to_string()))
    }

    /// Write a diagnostic message to the error stream.
    pub(crate) fn message(&mut self, text: &str, append_lf: bool) -> EvalResult<()> {
        let result = if append_lf {
            writeln!(self.stderr, "{}", text)
        } else {
            write!(self.stderr, "{}", text)
        };
        result
            .and_then(|_| self.stderr.flush())
            .map_err(|e| Unwind::error(e.to_string()))
    }
}
