use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::breakpoints::BreakpointInfo;
use super::stack::DumpedCall;
use crate::error::Unwind;
use crate::executor::{EnvId, EvalResult, Interpreter};
use crate::parser::parse_text;
use crate::source::LocationResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DebuggerCommand {
    Continue,
    StepInto,
    /// Step into synthetic code as well.
    ForceStepInto,
    StepOver,
    StepOut,
    Pause,
    /// Abort the running evaluation at the next statement.
    Stop,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown debugger command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for DebuggerCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" | "continue" => Ok(DebuggerCommand::Continue),
            "s" | "step" | "stepInto" => Ok(DebuggerCommand::StepInto),
            "fs" | "force" | "forceStepInto" => Ok(DebuggerCommand::ForceStepInto),
            "n" | "next" | "stepOver" => Ok(DebuggerCommand::StepOver),
            "o" | "out" | "stepOut" => Ok(DebuggerCommand::StepOut),
            "pause" => Ok(DebuggerCommand::Pause),
            "q" | "quit" | "stop" => Ok(DebuggerCommand::Stop),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for DebuggerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebuggerCommand::Continue => "continue",
            DebuggerCommand::StepInto => "stepInto",
            DebuggerCommand::ForceStepInto => "forceStepInto",
            DebuggerCommand::StepOver => "stepOver",
            DebuggerCommand::StepOut => "stepOut",
            DebuggerCommand::Pause => "pause",
            DebuggerCommand::Stop => "stop",
        };
        f.write_str(name)
    }
}

impl Interpreter {
    /// Change the stepping mode. Clears the run-to-position target and
    /// updates the stop-here marker of every live call frame.
    pub fn set_command(&mut self, command: DebuggerCommand) {
        debug!("debugger command: {}", command);
        self.debugger.command = command;
        self.reset_run_to_position_target();

        let mut innermost = true;
        for context in self.contexts.calls() {
            match command {
                DebuggerCommand::Continue | DebuggerCommand::StepInto => {
                    self.envs.set_stop_here(context.env, false)
                }
                DebuggerCommand::StepOver => self.envs.set_stop_here(context.env, true),
                DebuggerCommand::StepOut => self.envs.set_stop_here(context.env, !innermost),
                _ => {}
            }
            innermost = false;
        }
    }

    pub fn command(&self) -> DebuggerCommand {
        self.debugger.command
    }

    /// Continue until the statement at `file:line` is reached.
    pub fn set_run_to_position(&mut self, file: &str, line: u32) {
        self.set_command(DebuggerCommand::Continue);
        if let Some(srcref) = self.sources.resolve(file, line) {
            debug!("running to {}:{}", file, line);
            self.sources.set_debug(srcref, true);
            self.debugger.run_to_position = Some(srcref);
        }
    }

    fn reset_run_to_position_target(&mut self) {
        let Some(target) = self.debugger.run_to_position.take() else {
            return;
        };
        self.sources.set_debug(target, false);
        // A real breakpoint at the same place gets its flag back.
        let (file, line) = self.sources.position(target);
        self.debugger.breakpoints.refresh(&mut self.sources, &file, line);
    }

    fn stop_if_requested(&mut self) -> EvalResult<()> {
        if self.debugger.command == DebuggerCommand::Stop {
            self.set_command(DebuggerCommand::Continue);
            debug!("stop requested, interrupting");
            return Err(Unwind::Interrupt);
        }
        Ok(())
    }

    /// Decide whether to halt at the current statement and, if so, build the
    /// stack and hand control to the prompt handler.
    pub(crate) fn do_breakpoint(
        &mut self,
        breakpoint: Option<BreakpointInfo>,
        is_step_stop: bool,
        env: EnvId,
    ) -> EvalResult<()> {
        if !self.debugger.enabled || self.interrupt_pending() {
            return Ok(());
        }
        self.stop_if_requested()?;

        let srcref = self.current_srcref;
        let mut suspend =
            is_step_stop || (srcref.is_some() && srcref == self.debugger.run_to_position);

        if let Some(breakpoint) = breakpoint.filter(|_| !self.debugger.muted) {
            let outcome = self.check_condition(&breakpoint.condition, env).and_then(|hit| {
                if hit {
                    self.evaluate_and_log(&breakpoint.log_message, env)?;
                }
                Ok(hit)
            });
            self.current_srcref = srcref;
            match outcome {
                Ok(hit) => suspend |= hit && breakpoint.suspend,
                Err(unwind) => {
                    if self.debugger.command == DebuggerCommand::Stop {
                        self.set_command(DebuggerCommand::Continue);
                    }
                    return Err(unwind);
                }
            }
            // A stop may have been requested while the condition ran.
            self.stop_if_requested()?;
        }

        if !suspend {
            return Ok(());
        }
        self.set_command(DebuggerCommand::Continue);
        let dump = self.context_dump(DumpedCall::Statement);
        self.debugger.stack = self.build_stack(&dump);
        if let Some(top) = self.debugger.stack.last() {
            debug!("halted at {}:{}", top.file, top.line);
        }

        if let Some(handler) = self.debugger.prompt_handler.clone() {
            handler.debug_prompt(self);
        }
        self.current_srcref = srcref;
        Ok(())
    }

    /// Evaluate breakpoint text with the debugger off. Errors count as
    /// handled; interrupts pass through.
    fn evaluate_quietly(&mut self, text: &str, env: EnvId) -> EvalResult {
        let exprs = parse_text(text).map_err(|e| Unwind::error(e.to_string()))?;
        self.with_debugger_enabled(false, |interp| {
            interp.with_try(|interp| interp.eval_exprs(&exprs, env))
        })
    }

    fn check_condition(&mut self, condition: &str, env: EnvId) -> EvalResult<bool> {
        if condition.trim().is_empty() {
            return Ok(true);
        }
        match self.evaluate_quietly(condition, env) {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value.as_logical().unwrap_or(false)),
            Err(Unwind::Interrupt) => Err(Unwind::Interrupt),
            Err(err) => {
                warn!("breakpoint condition '{}' failed: {}", condition, err);
                Ok(false)
            }
        }
    }

    fn evaluate_and_log(&mut self, expression: &str, env: EnvId) -> EvalResult<()> {
        if expression.trim().is_empty() {
            return Ok(());
        }
        let text = match self.evaluate_quietly(expression, env) {
            Ok(value) | Err(Unwind::Return(value)) => format!("{}\n", value.printed()),
            Err(Unwind::Interrupt) => return Err(Unwind::Interrupt),
            Err(err) => {
                warn!("breakpoint log expression '{}' failed: {}", expression, err);
                format!("{}\n", err)
            }
        };
        if let Err(err) = self.message(&text, false) {
            warn!("cannot write breakpoint log: {}", err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("n".parse::<DebuggerCommand>(), Ok(DebuggerCommand::StepOver));
        assert_eq!("stepOut".parse::<DebuggerCommand>(), Ok(DebuggerCommand::StepOut));
        assert_eq!("fs".parse::<DebuggerCommand>(), Ok(DebuggerCommand::ForceStepInto));
        assert_eq!(
            "jump".parse::<DebuggerCommand>(),
            Err(UnknownCommand("jump".to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for command in [
            DebuggerCommand::Continue,
            DebuggerCommand::StepInto,
            DebuggerCommand::ForceStepInto,
            DebuggerCommand::StepOver,
            DebuggerCommand::StepOut,
            DebuggerCommand::Pause,
            DebuggerCommand::Stop,
        ] {
            assert_eq!(command.to_string().parse::<DebuggerCommand>(), Ok(command));
        }
    }
}
