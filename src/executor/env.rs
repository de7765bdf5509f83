use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::value::Value;

/// Handle into the environment arena. Frame identity for the debugger is the
/// identity of this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EnvId(u32);

impl EnvId {
    pub const GLOBAL: EnvId = EnvId(0);
}

#[derive(Debug, Default)]
pub struct Environment {
    vars: FxHashMap<Rc<str>, Value>,
    parent: Option<EnvId>,
    /// Step-over/step-out marker.
    stop_here: bool,
    /// Frames below this one are hidden from reconstructed stacks.
    stack_bottom: bool,
    /// Environment to present instead of this one.
    real_env: Option<EnvId>,
}

/// Most environments one interpreter hands out; ids are 32-bit.
const MAX_ENVIRONMENTS: usize = u32::MAX as usize;

/// Arena of every environment created so far. Entries are never freed:
/// closures, promises and reported stack frames refer to them by id, so a
/// long-running loop of calls grows the arena by one entry per call.
#[derive(Debug)]
pub struct Environments {
    arena: Vec<Environment>,
    limit: usize,
}

impl Default for Environments {
    fn default() -> Self {
        Self::new()
    }
}

impl Environments {
    pub fn new() -> Self {
        Self::with_limit(MAX_ENVIRONMENTS)
    }

    fn with_limit(limit: usize) -> Self {
        Self {
            arena: vec![Environment::default()],
            limit,
        }
    }

    /// A fresh environment enclosed by `parent`, or `None` once the arena is
    /// full.
    pub fn new_child(&mut self, parent: EnvId) -> Option<EnvId> {
        if self.arena.len() >= self.limit {
            return None;
        }
        let id = EnvId(u32::try_from(self.arena.len()).ok()?);
        self.arena.push(Environment {
            parent: Some(parent),
            ..Environment::default()
        });
        Some(id)
    }

    fn get(&self, id: EnvId) -> &Environment {
        &self.arena[id.0 as usize]
    }

    fn get_mut(&mut self, id: EnvId) -> &mut Environment {
        &mut self.arena[id.0 as usize]
    }

    pub fn define(&mut self, id: EnvId, name: Rc<str>, value: Value) {
        self.get_mut(id).vars.insert(name, value);
    }

    /// Look `name` up along the parent chain, without forcing promises.
    pub fn lookup(&self, id: EnvId, name: &str) -> Option<Value> {
        let mut current = Some(id);
        while let Some(env_id) = current {
            let env = self.get(env_id);
            if let Some(value) = env.vars.get(name) {
                return Some(value.clone());
            }
            current = env.parent;
        }
        None
    }

    /// Bindings of one environment, sorted by name.
    pub fn bindings(&self, id: EnvId) -> Vec<(Rc<str>, Value)> {
        let mut vars: Vec<_> = self
            .get(id)
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    pub fn stop_here(&self, id: EnvId) -> bool {
        self.get(id).stop_here
    }

    pub fn set_stop_here(&mut self, id: EnvId, stop: bool) {
        self.get_mut(id).stop_here = stop;
    }

    pub fn is_stack_bottom(&self, id: EnvId) -> bool {
        self.get(id).stack_bottom
    }

    pub fn set_stack_bottom(&mut self, id: EnvId, real_env: Option<EnvId>) {
        let env = self.get_mut(id);
        env.stack_bottom = true;
        env.real_env = real_env;
    }

    pub fn real_env(&self, id: EnvId) -> Option<EnvId> {
        self.get(id).real_env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_see_parent_bindings() {
        let mut envs = Environments::new();
        envs.define(EnvId::GLOBAL, "a".into(), Value::Num(1.0));
        let child = envs.new_child(EnvId::GLOBAL).unwrap();
        envs.define(child, "b".into(), Value::Num(2.0));

        assert!(matches!(envs.lookup(child, "a"), Some(Value::Num(n)) if n == 1.0));
        assert!(envs.lookup(EnvId::GLOBAL, "b").is_none());
        assert_ne!(child, EnvId::GLOBAL);
    }

    #[test]
    fn test_full_arena_refuses_new_environments() {
        let mut envs = Environments::with_limit(3);
        let first = envs.new_child(EnvId::GLOBAL).unwrap();
        let second = envs.new_child(first).unwrap();
        assert_ne!(first, second);
        assert_eq!(envs.new_child(second), None);
        // Existing environments stay usable.
        envs.define(second, "x".into(), Value::Null);
        assert!(envs.lookup(second, "x").is_some());
    }
}
