use std::collections::BTreeMap;

use log::debug;
use rustc_hash::FxHashMap;

use crate::source::{LocationResolver, SrcRef};

/// User-facing breakpoint settings. The same instance lives as long as the
/// breakpoint does, across refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    /// Expression text; empty means "always".
    pub condition: String,
    /// Expression evaluated and printed on every hit that passes the condition.
    pub log_message: String,
    pub suspend: bool,
}

impl Default for BreakpointInfo {
    fn default() -> Self {
        Self {
            condition: String::new(),
            log_message: String::new(),
            suspend: true,
        }
    }
}

#[derive(Debug)]
struct Entry {
    /// `None` when no statement starts on the line; such entries never fire.
    srcref: Option<SrcRef>,
    info: BreakpointInfo,
}

/// Breakpoints by file and line, kept in lock-step with the debug flags of
/// the source references they resolve to.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    files: FxHashMap<String, BTreeMap<u32, Entry>>,
    attached: FxHashMap<SrcRef, (String, u32)>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<R: LocationResolver + ?Sized>(
        &mut self,
        resolver: &mut R,
        file: &str,
        line: u32,
    ) -> &mut BreakpointInfo {
        let attached = &mut self.attached;
        let entry = self
            .files
            .entry(file.to_string())
            .or_default()
            .entry(line)
            .or_insert_with(|| {
                let srcref = resolver.resolve(file, line);
                match srcref {
                    Some(srcref) => {
                        resolver.set_debug(srcref, true);
                        attached.insert(srcref, (file.to_string(), line));
                        debug!("breakpoint set at {}:{}", file, line);
                    }
                    None => debug!("no statement at {}:{}, breakpoint is inert", file, line),
                }
                Entry {
                    srcref,
                    info: BreakpointInfo::default(),
                }
            });
        &mut entry.info
    }

    /// Remove the breakpoint at `file:line`, returning the reference it was
    /// attached to.
    pub fn remove<R: LocationResolver + ?Sized>(
        &mut self,
        resolver: &mut R,
        file: &str,
        line: u32,
    ) -> Option<SrcRef> {
        let lines = self.files.get_mut(file)?;
        let entry = lines.remove(&line)?;
        if lines.is_empty() {
            self.files.remove(file);
        }
        debug!("breakpoint removed from {}:{}", file, line);

        let srcref = entry.srcref?;
        resolver.set_debug(srcref, false);
        self.attached.remove(&srcref);
        Some(srcref)
    }

    /// Re-resolve `file:line` after its source was reloaded, keeping the
    /// breakpoint's settings.
    pub fn refresh<R: LocationResolver + ?Sized>(&mut self, resolver: &mut R, file: &str, line: u32) {
        let Some(entry) = self.files.get_mut(file).and_then(|lines| lines.get_mut(&line)) else {
            return;
        };

        if let Some(old) = entry.srcref.take() {
            resolver.set_debug(old, false);
            self.attached.remove(&old);
        }
        entry.srcref = resolver.resolve(file, line);
        if let Some(srcref) = entry.srcref {
            resolver.set_debug(srcref, true);
            self.attached.insert(srcref, (file.to_string(), line));
        }
    }

    pub fn get(&self, file: &str, line: u32) -> Option<&BreakpointInfo> {
        self.files.get(file)?.get(&line).map(|e| &e.info)
    }

    /// The reference `file:line` is currently attached to.
    pub fn srcref(&self, file: &str, line: u32) -> Option<SrcRef> {
        self.files.get(file)?.get(&line)?.srcref
    }

    /// The breakpoint attached to `srcref`, if any.
    pub fn attached(&self, srcref: SrcRef) -> Option<&BreakpointInfo> {
        let (file, line) = self.attached.get(&srcref)?;
        self.get(file, *line)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, &BreakpointInfo)> + '_ {
        let mut files: Vec<_> = self.files.iter().collect();
        files.sort_by(|a, b| a.0.cmp(b.0));
        files.into_iter().flat_map(|(file, lines)| {
            lines
                .iter()
                .map(move |(line, entry)| (file.as_str(), *line, &entry.info))
        })
    }

    pub fn lines(&self, file: &str) -> Vec<u32> {
        self.files
            .get(file)
            .map(|lines| lines.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.files.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
