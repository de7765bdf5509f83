use std::rc::Rc;

use serde::Serialize;

use crate::executor::{Closure, EnvId, Interpreter};
use crate::parser::Call;
use crate::source::{LocationResolver, SrcRef};

#[derive(Debug, Clone)]
pub enum DumpedCall {
    Call(Rc<Call>),
    /// The statement executing when the dump was taken.
    Statement,
    /// Stands in for the frame that signalled an error.
    Signal,
}

impl DumpedCall {
    fn name(&self) -> String {
        match self {
            DumpedCall::Call(call) => call.function_name(),
            DumpedCall::Statement => String::new(),
            DumpedCall::Signal => "<signal>".to_string(),
        }
    }

    fn srcref(&self) -> Option<SrcRef> {
        match self {
            DumpedCall::Call(call) => call.srcref,
            _ => None,
        }
    }
}

/// Snapshot of one call context.
#[derive(Debug, Clone)]
pub struct ContextDump {
    pub call: DumpedCall,
    pub function: Option<Rc<Closure>>,
    /// Statement that was executing when the context was entered.
    pub srcref: Option<SrcRef>,
    pub env: Option<EnvId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    /// Environment to inspect for this frame; also its identity.
    pub frame: Option<EnvId>,
    pub function_name: String,
}

impl Interpreter {
    /// Snapshot of the live call contexts, oldest first, ending with an entry
    /// for the statement currently executing.
    pub fn context_dump(&self, current: DumpedCall) -> Vec<ContextDump> {
        let mut dump = vec![ContextDump {
            call: current,
            function: None,
            srcref: self.current_srcref,
            env: None,
        }];
        for context in self.contexts.calls() {
            if let Some(call) = context.call() {
                dump.push(ContextDump {
                    call: DumpedCall::Call(call.clone()),
                    function: context.function().cloned(),
                    srcref: context.srcref,
                    env: Some(context.env),
                });
            }
        }
        dump.reverse();
        dump
    }

    /// Turn a dump into display frames. Each frame reports where execution is
    /// inside the previous entry's function and takes its name from how that
    /// function was called. Nothing is shown until physical source has been
    /// seen, and a stack-bottom wrapper hides everything below it.
    pub fn build_stack(&mut self, dump: &[ContextDump]) -> Vec<StackFrame> {
        let mut stack: Vec<StackFrame> = Vec::new();
        let mut was_stack_bottom = false;
        let mut function_name = String::new();
        let mut frame = Some(EnvId::GLOBAL);
        let mut frame_function: Option<Rc<Closure>> = None;
        let mut function_srcref: Option<SrcRef> = None;

        for entry in dump {
            let srcref = entry
                .srcref
                .or_else(|| entry.call.srcref())
                .or(function_srcref);
            let below_bottom = frame.map_or(false, |f| self.envs.is_stack_bottom(f));

            if below_bottom && entry.env.is_some() {
                stack.clear();
                was_stack_bottom = true;
            } else {
                was_stack_bottom =
                    was_stack_bottom || srcref.map_or(false, |s| self.sources.is_physical(s));
                if was_stack_bottom {
                    let (file, line) = srcref
                        .map(|s| self.sources.position(s))
                        .unwrap_or_default();
                    if let Some(real) = frame.and_then(|f| self.envs.real_env(f)) {
                        frame = Some(real);
                    }
                    if stack.is_empty() && !self.is_physical_function(frame_function.as_deref()) {
                        function_name.clear();
                    }
                    stack.push(StackFrame {
                        file,
                        line,
                        frame,
                        function_name: function_name.clone(),
                    });
                }
            }

            function_name = entry.call.name();
            if let Some(function) = &entry.function {
                function_srcref = self.sources.resolve_for_function(&function.def, &function_name);
            }
            frame_function = entry.function.clone();
            frame = entry.env;
        }
        stack
    }

    fn is_physical_function(&self, function: Option<&Closure>) -> bool {
        function
            .and_then(|f| f.def.srcref)
            .map_or(false, |s| self.sources.is_physical(s))
    }

    pub(crate) fn record_last_error(&mut self) {
        let mut dump = self.context_dump(DumpedCall::Statement);
        dump.push(ContextDump {
            call: DumpedCall::Signal,
            function: None,
            srcref: None,
            env: None,
        });
        self.debugger.last_error_dump = dump;
    }

    /// Stack at the last uncaught error, without the signalling frame.
    pub fn last_error_stack(&mut self) -> Vec<StackFrame> {
        let dump = self.debugger.last_error_dump.clone();
        let mut stack = self.build_stack(&dump);
        stack.pop();
        stack
    }

    pub fn reset_last_error_stack(&mut self) {
        self.debugger.last_error_dump.clear();
    }
}
