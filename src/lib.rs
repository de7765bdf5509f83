//! A lazy, R-like scripting language with an in-process, statement-level
//! debugger: breakpoints with conditions and log messages, stepping, and
//! call-stack reconstruction.

pub mod config;
pub mod console;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod parser;
pub mod source;

pub use debugger::{BreakpointInfo, DebugPrompt, DebuggerCommand, PromptHandler, StackFrame};
pub use error::{Error, Result};
pub use executor::{EnvId, InterruptHandle, Interpreter, Value};
