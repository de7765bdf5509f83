//! Source units and the statement-level source references the debugger
//! attaches breakpoints to.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::ParseError;
use crate::parser::{parse_program, Block, FunctionDef, SrcRefAllocator};

/// Opaque handle to a source span. Handles are never invalidated; a reparse
/// simply produces new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SrcRef(u32);

impl SrcRef {
    #[cfg(test)]
    pub(crate) fn from_index(index: u32) -> Self {
        SrcRef(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(u32);

#[derive(Debug, Clone)]
struct SrcRefData {
    unit: UnitId,
    first_line: u32,
    debug: bool,
}

#[derive(Debug)]
pub struct SourceUnit {
    file_id: String,
    /// Virtual file id under which a synthetic unit was published.
    alias: Option<String>,
    physical: bool,
    lines: Vec<String>,
    line_map: BTreeMap<u32, SrcRef>,
    program: Rc<Block>,
}

impl SourceUnit {
    pub fn file_id(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.file_id)
    }

    pub fn is_physical(&self) -> bool {
        self.physical
    }

    pub fn program(&self) -> &Rc<Block> {
        &self.program
    }
}

/// Maps `(file, line)` to statement source references and back.
pub trait LocationResolver {
    /// The outermost statement starting at exactly `line`, if any.
    fn resolve(&self, file: &str, line: u32) -> Option<SrcRef>;

    /// Declared source of `function`, cached per definition. Functions
    /// defined by synthetic code get their unit published as `<name>`.
    fn resolve_for_function(&mut self, function: &FunctionDef, suggested_name: &str)
        -> Option<SrcRef>;

    /// `(file, line)` of a reference; `("", 0)` for unknown handles.
    fn position(&self, srcref: SrcRef) -> (String, u32);

    fn is_physical(&self, srcref: SrcRef) -> bool;

    fn is_debug(&self, srcref: SrcRef) -> bool;

    fn set_debug(&mut self, srcref: SrcRef, debug: bool);
}

#[derive(Debug, Default)]
pub struct SourceMap {
    units: Vec<SourceUnit>,
    files: FxHashMap<String, UnitId>,
    srcrefs: Vec<SrcRefData>,
    functions: FxHashMap<u32, Option<SrcRef>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` into a new unit. Physical units are registered under
    /// `file_id` immediately, replacing any earlier unit with that id.
    pub fn load(&mut self, file_id: &str, text: &str, physical: bool) -> Result<Rc<Block>, ParseError> {
        let unit = UnitId(self.units.len() as u32);
        let mut builder = UnitBuilder {
            unit,
            base: self.srcrefs.len() as u32,
            srcrefs: Vec::new(),
            statements: BTreeMap::new(),
            heads: BTreeMap::new(),
        };
        let program = parse_program(text, Some(&mut builder))?;

        let UnitBuilder {
            srcrefs,
            statements: mut line_map,
            heads,
            ..
        } = builder;
        for (line, head) in heads {
            line_map.entry(line).or_insert(head);
        }
        self.srcrefs.extend(srcrefs);

        self.units.push(SourceUnit {
            file_id: file_id.to_string(),
            alias: None,
            physical,
            lines: text.lines().map(str::to_string).collect(),
            line_map,
            program: program.clone(),
        });
        if physical {
            self.files.insert(file_id.to_string(), unit);
        }
        debug!(
            "loaded {} ({} lines, physical: {})",
            file_id,
            text.lines().count(),
            physical
        );
        Ok(program)
    }

    pub fn unit(&self, file: &str) -> Option<&SourceUnit> {
        self.files.get(file).map(|id| &self.units[id.0 as usize])
    }

    pub fn line_text(&self, file: &str, line: u32) -> Option<&str> {
        let unit = self.unit(file)?;
        let index = line.checked_sub(1)? as usize;
        unit.lines.get(index).map(String::as_str)
    }

    /// Lines on which a breakpoint would resolve.
    pub fn breakable_lines(&self, file: &str) -> Vec<u32> {
        self.unit(file)
            .map(|unit| unit.line_map.keys().copied().collect())
            .unwrap_or_default()
    }

    fn data(&self, srcref: SrcRef) -> Option<&SrcRefData> {
        self.srcrefs.get(srcref.0 as usize)
    }

    fn unit_of(&self, srcref: SrcRef) -> Option<&SourceUnit> {
        self.data(srcref).map(|d| &self.units[d.unit.0 as usize])
    }
}

impl LocationResolver for SourceMap {
    fn resolve(&self, file: &str, line: u32) -> Option<SrcRef> {
        self.unit(file)?.line_map.get(&line).copied()
    }

    fn resolve_for_function(
        &mut self,
        function: &FunctionDef,
        suggested_name: &str,
    ) -> Option<SrcRef> {
        if let Some(cached) = self.functions.get(&function.id) {
            return *cached;
        }

        let srcref = function.srcref;
        if let Some(unit_id) = srcref.and_then(|s| self.data(s)).map(|d| d.unit) {
            let unit = &mut self.units[unit_id.0 as usize];
            if !unit.physical && unit.alias.is_none() && !suggested_name.is_empty() {
                let alias = format!("<{}>", suggested_name);
                debug!("publishing {} as {}", unit.file_id, alias);
                unit.alias = Some(alias.clone());
                self.files.insert(alias, unit_id);
            }
        }
        self.functions.insert(function.id, srcref);
        srcref
    }

    fn position(&self, srcref: SrcRef) -> (String, u32) {
        match (self.data(srcref), self.unit_of(srcref)) {
            (Some(data), Some(unit)) => (unit.file_id().to_string(), data.first_line),
            _ => (String::new(), 0),
        }
    }

    fn is_physical(&self, srcref: SrcRef) -> bool {
        self.unit_of(srcref).map_or(false, |u| u.physical)
    }

    fn is_debug(&self, srcref: SrcRef) -> bool {
        self.data(srcref).map_or(false, |d| d.debug)
    }

    fn set_debug(&mut self, srcref: SrcRef, debug: bool) {
        if let Some(data) = self.srcrefs.get_mut(srcref.0 as usize) {
            data.debug = debug;
        }
    }
}

struct UnitBuilder {
    unit: UnitId,
    base: u32,
    srcrefs: Vec<SrcRefData>,
    statements: BTreeMap<u32, SrcRef>,
    heads: BTreeMap<u32, SrcRef>,
}

impl SrcRefAllocator for UnitBuilder {
    fn alloc(&mut self, first_line: u32) -> SrcRef {
        let srcref = SrcRef(self.base + self.srcrefs.len() as u32);
        self.srcrefs.push(SrcRefData {
            unit: self.unit,
            first_line,
            debug: false,
        });
        srcref
    }

    fn mark_statement(&mut self, line: u32, srcref: SrcRef) {
        self.statements.entry(line).or_insert(srcref);
    }

    fn mark_block_head(&mut self, line: u32, srcref: SrcRef) {
        self.heads.entry(line).or_insert(srcref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Expr;

    const PROGRAM: &str = "\
f <- function(x) {
  y <- x + 1
  if (y > 2) { y <- 0 }

  y
}
f(1)
";

    #[test]
    fn test_resolve_is_exact_line() {
        let mut map = SourceMap::new();
        map.load("a.src", PROGRAM, true).unwrap();

        assert!(map.resolve("a.src", 2).is_some());
        assert!(map.resolve("a.src", 4).is_none());
        assert!(map.resolve("a.src", 99).is_none());
        assert!(map.resolve("b.src", 2).is_none());
        assert_eq!(map.breakable_lines("a.src"), vec![1, 2, 3, 5, 7]);
    }

    #[test]
    fn test_outermost_statement_wins_the_line() {
        let mut map = SourceMap::new();
        let program = map.load("a.src", PROGRAM, true).unwrap();

        let line3 = map.resolve("a.src", 3).unwrap();
        assert_eq!(map.position(line3), ("a.src".to_string(), 3));

        // The `if` statement of f's body, not the assignment nested inside it.
        let Expr::Assign { value, .. } = &program.stmts[0] else {
            panic!("expected an assignment");
        };
        let Expr::Function(def) = &**value else {
            panic!("expected a function");
        };
        let Expr::Block(body) = &def.body else {
            panic!("expected a block body");
        };
        assert_eq!(body.srcref(2), Some(line3));
    }

    #[test]
    fn test_multiline_statement_is_reported_at_its_first_line() {
        let mut map = SourceMap::new();
        let program = map
            .load("m.src", "x <- paste(\"a\",\n  \"b\")\ny <- 1\n", true)
            .unwrap();

        let first = program.srcref(1).unwrap();
        assert_eq!(map.position(first), ("m.src".to_string(), 1));
        assert_eq!(map.resolve("m.src", 1), Some(first));
        assert!(map.resolve("m.src", 2).is_none());
        assert_eq!(map.breakable_lines("m.src"), vec![1, 3]);
    }

    #[test]
    fn test_resolve_is_stable_and_reload_creates_new_references() {
        let mut map = SourceMap::new();
        map.load("a.src", PROGRAM, true).unwrap();
        let first = map.resolve("a.src", 2).unwrap();
        assert_eq!(map.resolve("a.src", 2), Some(first));

        map.set_debug(first, true);
        map.load("a.src", PROGRAM, true).unwrap();
        let second = map.resolve("a.src", 2).unwrap();
        assert_ne!(first, second);
        assert!(map.is_debug(first));
        assert!(!map.is_debug(second));
    }

    #[test]
    fn test_block_head_claims_only_free_lines() {
        let mut map = SourceMap::new();
        let program = map.load("a.src", "x <- 1\n{\n  x <- 2\n}\n", true).unwrap();
        let Expr::Block(block) = &program.stmts[1] else {
            panic!("expected a block");
        };
        // Line 2 is claimed by the block statement itself.
        assert_eq!(map.resolve("a.src", 2), program.srcref(2));
        assert_eq!(map.resolve("a.src", 3), block.srcref(1));
    }

    #[test]
    fn test_functions_in_synthetic_code_are_published() {
        let mut map = SourceMap::new();
        let program = map
            .load("<console>", "g <- function() {\n  1\n}", false)
            .unwrap();
        let Expr::Assign { value, .. } = &program.stmts[0] else {
            panic!("expected an assignment");
        };
        let Expr::Function(def) = &**value else {
            panic!("expected a function");
        };

        assert!(map.resolve("<g>", 2).is_none());
        let srcref = map.resolve_for_function(def, "g").unwrap();
        assert!(!map.is_physical(srcref));
        assert_eq!(map.position(srcref), ("<g>".to_string(), 1));
        assert!(map.resolve("<g>", 2).is_some());

        // Cached: a second name does not republish.
        map.resolve_for_function(def, "h");
        assert!(map.resolve("<h>", 2).is_none());
    }

    #[test]
    fn test_parse_failure_leaves_map_untouched() {
        let mut map = SourceMap::new();
        assert!(map.load("a.src", "f(", true).is_err());
        assert!(map.unit("a.src").is_none());
    }
}
