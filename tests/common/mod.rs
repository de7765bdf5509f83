#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

use lazy_debugger::{DebuggerCommand, Interpreter, PromptHandler, StackFrame};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory sink that stays readable after the interpreter takes ownership.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

type HaltAction = Box<dyn FnMut(&mut Interpreter)>;

/// Prompt handler that records each halt and answers from a script.
/// Once the script runs out every halt continues.
#[derive(Default)]
pub struct ScriptedPrompt {
    commands: RefCell<VecDeque<DebuggerCommand>>,
    halts: RefCell<Vec<Vec<StackFrame>>>,
    on_halt: RefCell<Option<HaltAction>>,
}

impl ScriptedPrompt {
    pub fn install(interp: &mut Interpreter, commands: &[DebuggerCommand]) -> Rc<Self> {
        let prompt = Rc::new(Self {
            commands: RefCell::new(commands.iter().copied().collect()),
            ..Self::default()
        });
        interp.set_prompt_handler(prompt.clone());
        prompt
    }

    /// Run `action` on every halt, before the scripted command is applied.
    pub fn on_halt(&self, action: impl FnMut(&mut Interpreter) + 'static) {
        *self.on_halt.borrow_mut() = Some(Box::new(action));
    }

    pub fn halts(&self) -> Vec<Vec<StackFrame>> {
        self.halts.borrow().clone()
    }

    /// Innermost line of every halt.
    pub fn lines(&self) -> Vec<u32> {
        self.halts
            .borrow()
            .iter()
            .map(|stack| stack.last().map_or(0, |frame| frame.line))
            .collect()
    }
}

impl PromptHandler for ScriptedPrompt {
    fn debug_prompt(&self, interp: &mut Interpreter) {
        self.halts.borrow_mut().push(interp.stack().to_vec());
        let action = self.on_halt.borrow_mut().take();
        if let Some(mut action) = action {
            action(interp);
            self.on_halt.borrow_mut().get_or_insert(action);
        }
        let command = self
            .commands
            .borrow_mut()
            .pop_front()
            .unwrap_or(DebuggerCommand::Continue);
        interp.set_command(command);
    }
}

/// Interpreter with captured output and the debugger enabled.
pub fn debug_interpreter() -> (Interpreter, SharedBuffer, SharedBuffer) {
    init_logging();
    let stdout = SharedBuffer::default();
    let stderr = SharedBuffer::default();
    let mut interp = Interpreter::with_output(stdout.clone(), stderr.clone());
    interp.enable_debugger();
    (interp, stdout, stderr)
}

pub const NESTED: &str = "\
g <- function() {
  a <- 1
  a + 1
}
f <- function() {
  x <- g()
  y <- x * 2
  y
}
";

pub const SIMPLE: &str = "\
f <- function() {
  x <- 1
  y <- 2
  z <- 3
  w <- x + y
  w
}
";
