//! Statement-level debugger for the interpreter: breakpoints, stepping and
//! call-stack reconstruction.
//!
//! The debugger is one lifecycle-managed object owned by the [`Interpreter`].
//! Enabling it swaps the interpreter's compound-statement primitive for the
//! interception hook; disabling it puts the saved primitive back.

mod breakpoints;
mod hook;
mod stack;
mod stepping;

use std::rc::Rc;

use log::debug;
use serde::Serialize;

pub use breakpoints::{BreakpointInfo, BreakpointRegistry};
pub use stack::{ContextDump, DumpedCall, StackFrame};
pub use stepping::{DebuggerCommand, UnknownCommand};

use crate::executor::{BeginFn, Interpreter};
use crate::source::{LocationResolver, SrcRef};

/// Called on every halt. Returns once a new command has been set.
pub trait PromptHandler {
    fn debug_prompt(&self, interp: &mut Interpreter);
}

/// Halt notification in the form a transport would send it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugPrompt {
    pub changed: bool,
    pub stack: Vec<StackFrame>,
}

pub struct Debugger {
    enabled: bool,
    saved_begin: Option<BeginFn>,
    saved_jit: u32,
    command: DebuggerCommand,
    run_to_position: Option<SrcRef>,
    breakpoints: BreakpointRegistry,
    muted: bool,
    stack: Vec<StackFrame>,
    last_error_dump: Vec<ContextDump>,
    prompt_handler: Option<Rc<dyn PromptHandler>>,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            enabled: false,
            saved_begin: None,
            saved_jit: 0,
            command: DebuggerCommand::Continue,
            run_to_position: None,
            breakpoints: BreakpointRegistry::new(),
            muted: false,
            stack: Vec::new(),
            last_error_dump: Vec::new(),
            prompt_handler: None,
        }
    }
}

impl Interpreter {
    /// Install the interception hook and switch compilation off. Calling it
    /// again while enabled does nothing.
    pub fn enable_debugger(&mut self) {
        if self.debugger.enabled {
            return;
        }
        self.debugger.enabled = true;
        self.debugger.saved_jit = self.compiler_enable_jit(0);
        self.debugger.saved_begin = Some(std::mem::replace(&mut self.begin, hook::debug_do_begin));
        debug!("debugger enabled");
    }

    /// Restore the saved begin primitive and compilation level.
    pub fn disable_debugger(&mut self) {
        if !self.debugger.enabled {
            return;
        }
        self.debugger.enabled = false;
        if let Some(begin) = self.debugger.saved_begin.take() {
            self.begin = begin;
        }
        self.compiler_enable_jit(self.debugger.saved_jit);
        debug!("debugger disabled");
    }

    pub fn is_debugger_enabled(&self) -> bool {
        self.debugger.enabled
    }

    /// Run `f` with the debugger switched on or off, restoring the previous
    /// state afterwards.
    pub fn with_debugger_enabled<T>(&mut self, enabled: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        let was_enabled = self.debugger.enabled;
        self.set_debugger_enabled(enabled);
        let result = f(self);
        self.set_debugger_enabled(was_enabled);
        result
    }

    fn set_debugger_enabled(&mut self, enabled: bool) {
        if enabled {
            self.enable_debugger();
        } else {
            self.disable_debugger();
        }
    }

    pub fn add_breakpoint(&mut self, file: &str, line: u32) -> &mut BreakpointInfo {
        self.debugger.breakpoints.add(&mut self.sources, file, line)
    }

    pub fn remove_breakpoint(&mut self, file: &str, line: u32) {
        let removed = self.debugger.breakpoints.remove(&mut self.sources, file, line);
        // The run-to-position target keeps its flag.
        if removed.is_some() && removed == self.debugger.run_to_position {
            if let Some(srcref) = removed {
                self.sources.set_debug(srcref, true);
            }
        }
    }

    pub fn refresh_breakpoint(&mut self, file: &str, line: u32) {
        self.debugger.breakpoints.refresh(&mut self.sources, file, line);
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.debugger.breakpoints
    }

    pub fn mute_breakpoints(&mut self, mute: bool) {
        debug!("breakpoints {}", if mute { "muted" } else { "unmuted" });
        self.debugger.muted = mute;
    }

    pub fn breakpoints_muted(&self) -> bool {
        self.debugger.muted
    }

    pub fn set_prompt_handler(&mut self, handler: Rc<dyn PromptHandler>) {
        self.debugger.prompt_handler = Some(handler);
    }

    /// Stack of the current (or most recent) halt, oldest frame first.
    pub fn stack(&self) -> &[StackFrame] {
        &self.debugger.stack
    }

    pub fn clear_stack(&mut self) {
        self.debugger.stack.clear();
    }

    pub fn debug_prompt_event(&self) -> DebugPrompt {
        DebugPrompt {
            changed: true,
            stack: self.debugger.stack.clone(),
        }
    }
}
