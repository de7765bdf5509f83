use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::executor::Interpreter;

/// Launch configuration, as an IDE would send it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchConfig {
    pub program: Option<String>,
    pub stop_on_entry: bool,
    pub mute_breakpoints: bool,
    pub jit_level: Option<u32>,
    pub breakpoints: Vec<BreakpointSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSpec {
    /// Defaults to the program being launched.
    #[serde(default)]
    pub file: Option<String>,
    pub line: u32,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub log_message: String,
    #[serde(default = "default_suspend")]
    pub suspend: bool,
}

fn default_suspend() -> bool {
    true
}

impl BreakpointSpec {
    /// Parse a `FILE:LINE` command-line spec.
    pub fn parse(spec: &str) -> Option<Self> {
        let (file, line) = spec.rsplit_once(':')?;
        Some(Self {
            file: Some(file.to_string()).filter(|f| !f.is_empty()),
            line: line.trim().parse().ok()?,
            condition: String::new(),
            log_message: String::new(),
            suspend: true,
        })
    }
}

impl LaunchConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Register every configured breakpoint with `interp`. Files must already
    /// be loaded for the breakpoints to resolve.
    pub fn apply_breakpoints(&self, interp: &mut Interpreter) {
        for spec in &self.breakpoints {
            let Some(file) = spec.file.as_deref().or(self.program.as_deref()) else {
                log::warn!("breakpoint at line {} has no file", spec.line);
                continue;
            };
            let info = interp.add_breakpoint(file, spec.line);
            info.condition = spec.condition.clone();
            info.log_message = spec.log_message.clone();
            info.suspend = spec.suspend;
        }
        interp.mute_breakpoints(self.mute_breakpoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_spec_parse() {
        let spec = BreakpointSpec::parse("dir/a.src:12").unwrap();
        assert_eq!(spec.file.as_deref(), Some("dir/a.src"));
        assert_eq!(spec.line, 12);
        assert!(spec.suspend);

        assert_eq!(BreakpointSpec::parse(":3").unwrap().file, None);
        assert!(BreakpointSpec::parse("a.src").is_none());
        assert!(BreakpointSpec::parse("a.src:x").is_none());
    }

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let config = LaunchConfig::from_json(r#"{"breakpoints": [{"line": 4}]}"#).unwrap();
        assert_eq!(config.program, None);
        assert!(!config.stop_on_entry);
        assert_eq!(config.breakpoints[0].file, None);
        assert!(config.breakpoints[0].suspend);
    }
}
