//! Line-oriented debugger prompt, used by the `lazydbg` binary.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};

use log::warn;

use crate::debugger::{DebuggerCommand, PromptHandler};
use crate::executor::{EnvId, Interpreter};

const HELP: &str = "\
Commands:
  c, continue          resume
  n, next              step over
  s, step              step into
  fs, force            step into, including generated code
  o, out               step out
  pause                halt at the next statement
  q, quit              abort the running program
  u FILE LINE          run to FILE:LINE
  b FILE LINE [COND] [LOG]
                       set a breakpoint
  tp FILE LINE LOG [COND]
                       set a tracepoint (log without halting)
  d FILE LINE          delete a breakpoint
  bl                   list breakpoints
  mute, unmute         mute or unmute all breakpoints
  bt, where            show the call stack
  locals               show variables of the current frame
  p EXPR               evaluate EXPR in the current frame
  json                 show the halt event as JSON
  help                 show this help";

enum Flow {
    Resume,
    Stay,
}

pub struct ConsolePrompt<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn say(&self, text: &str) -> io::Result<()> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{}", text)?;
        output.flush()
    }

    fn read_line(&self) -> io::Result<Option<String>> {
        {
            let mut output = self.output.borrow_mut();
            write!(output, "debug> ")?;
            output.flush()?;
        }
        let mut line = String::new();
        if self.input.borrow_mut().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn show_location(&self, interp: &Interpreter) -> io::Result<()> {
        let Some(top) = interp.stack().last() else {
            return self.say("\nStopped");
        };
        self.say(&format!("\nStopped at {}:{}", top.file, top.line))?;
        if let Some(text) = interp.sources().line_text(&top.file, top.line) {
            self.say(&format!("{:>5} | {}", top.line, text))?;
        }
        Ok(())
    }

    fn run(&self, interp: &mut Interpreter) -> io::Result<()> {
        self.show_location(interp)?;
        loop {
            let Some(line) = self.read_line()? else {
                interp.set_command(DebuggerCommand::Continue);
                return Ok(());
            };
            let Some(words) = shlex::split(&line) else {
                self.say("unbalanced quotes")?;
                continue;
            };
            if let Flow::Resume = self.execute(interp, &words)? {
                return Ok(());
            }
        }
    }

    fn execute(&self, interp: &mut Interpreter, words: &[String]) -> io::Result<Flow> {
        let Some((head, rest)) = words.split_first() else {
            interp.set_command(DebuggerCommand::StepInto);
            return Ok(Flow::Resume);
        };

        if let Ok(command) = head.parse::<DebuggerCommand>() {
            interp.set_command(command);
            return Ok(Flow::Resume);
        }

        match (head.as_str(), rest) {
            ("u", [file, line]) => match line.parse() {
                Ok(line) => {
                    interp.set_run_to_position(file, line);
                    return Ok(Flow::Resume);
                }
                Err(_) => self.say("invalid line number")?,
            },
            ("b", [file, line, extra @ ..]) if extra.len() <= 2 => match line.parse() {
                Ok(line) => {
                    let info = interp.add_breakpoint(file, line);
                    info.condition = extra.first().cloned().unwrap_or_default();
                    info.log_message = extra.get(1).cloned().unwrap_or_default();
                    info.suspend = true;
                    self.say(&format!("breakpoint set at {}:{}", file, line))?;
                }
                Err(_) => self.say("invalid line number")?,
            },
            ("tp", [file, line, log, extra @ ..]) if extra.len() <= 1 => match line.parse() {
                Ok(line) => {
                    let info = interp.add_breakpoint(file, line);
                    info.log_message = log.clone();
                    info.condition = extra.first().cloned().unwrap_or_default();
                    info.suspend = false;
                    self.say(&format!("tracepoint set at {}:{}", file, line))?;
                }
                Err(_) => self.say("invalid line number")?,
            },
            ("d", [file, line]) => match line.parse() {
                Ok(line) => {
                    interp.remove_breakpoint(file, line);
                    self.say(&format!("breakpoint removed from {}:{}", file, line))?;
                }
                Err(_) => self.say("invalid line number")?,
            },
            ("bl", []) => {
                if interp.breakpoints().is_empty() {
                    self.say("no breakpoints")?;
                }
                let listing: Vec<String> = interp
                    .breakpoints()
                    .iter()
                    .map(|(file, line, info)| {
                        let mut text = format!("{}:{}", file, line);
                        if !info.condition.is_empty() {
                            text.push_str(&format!(" if {}", info.condition));
                        }
                        if !info.log_message.is_empty() {
                            text.push_str(&format!(" log {}", info.log_message));
                        }
                        if !info.suspend {
                            text.push_str(" (no suspend)");
                        }
                        text
                    })
                    .collect();
                for text in listing {
                    self.say(&text)?;
                }
            }
            ("mute", []) => interp.mute_breakpoints(true),
            ("unmute", []) => interp.mute_breakpoints(false),
            ("bt" | "where", []) => {
                for (depth, frame) in interp.stack().iter().rev().enumerate() {
                    let name = if frame.function_name.is_empty() {
                        "<top level>"
                    } else {
                        frame.function_name.as_str()
                    };
                    self.say(&format!("#{} {} at {}:{}", depth, name, frame.file, frame.line))?;
                }
            }
            ("json", []) => match serde_json::to_string(&interp.debug_prompt_event()) {
                Ok(json) => self.say(&json)?,
                Err(err) => self.say(&format!("cannot encode event: {}", err))?,
            },
            ("locals", []) => {
                let frame = current_frame(interp);
                for (name, value) in interp.envs().bindings(frame) {
                    if !value.is_function() {
                        self.say(&format!("{} = {}", name, value))?;
                    }
                }
            }
            ("p", expr) if !expr.is_empty() => {
                let frame = current_frame(interp);
                match interp.evaluate_in_frame(&expr.join(" "), frame) {
                    Ok(value) => self.say(&value.printed())?,
                    Err(err) => self.say(&err.to_string())?,
                }
            }
            ("help", _) => self.say(HELP)?,
            _ => self.say(&format!("unknown command: {} (try 'help')", words.join(" ")))?,
        }
        Ok(Flow::Stay)
    }
}

fn current_frame(interp: &Interpreter) -> EnvId {
    interp
        .stack()
        .last()
        .and_then(|frame| frame.frame)
        .unwrap_or_else(|| interp.global_env())
}

impl<R: BufRead, W: Write> PromptHandler for ConsolePrompt<R, W> {
    fn debug_prompt(&self, interp: &mut Interpreter) {
        if let Err(err) = self.run(interp) {
            warn!("debug prompt failed: {}", err);
            interp.set_command(DebuggerCommand::Continue);
        }
    }
}
