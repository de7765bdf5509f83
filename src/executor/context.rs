use std::rc::Rc;

use slab::Slab;

use super::env::EnvId;
use super::value::Closure;
use crate::parser::Call;
use crate::source::SrcRef;

pub type ContextId = usize;

#[derive(Debug, Clone)]
pub enum ContextKind {
    TopLevel,
    Call {
        call: Rc<Call>,
        /// `None` for interpreter-generated wrappers such as `<source>`.
        function: Option<Rc<Closure>>,
    },
}

/// One record of the live execution chain.
#[derive(Debug)]
pub struct Context {
    pub kind: ContextKind,
    pub env: EnvId,
    /// Statement being executed when this context was entered.
    pub srcref: Option<SrcRef>,
    next: Option<ContextId>,
}

impl Context {
    pub fn is_call(&self) -> bool {
        matches!(self.kind, ContextKind::Call { .. })
    }

    pub fn function(&self) -> Option<&Rc<Closure>> {
        match &self.kind {
            ContextKind::Call { function, .. } => function.as_ref(),
            ContextKind::TopLevel => None,
        }
    }

    pub fn call(&self) -> Option<&Rc<Call>> {
        match &self.kind {
            ContextKind::Call { call, .. } => Some(call),
            ContextKind::TopLevel => None,
        }
    }
}

/// The context chain, linked innermost to outermost.
#[derive(Debug, Default)]
pub struct ContextStack {
    records: Slab<Context>,
    top: Option<ContextId>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ContextKind, env: EnvId, srcref: Option<SrcRef>) -> ContextId {
        let id = self.records.insert(Context {
            kind,
            env,
            srcref,
            next: self.top,
        });
        self.top = Some(id);
        id
    }

    /// Remove `id` and everything entered after it. Returns the srcref saved
    /// when `id` was entered.
    pub fn pop(&mut self, id: ContextId) -> Option<SrcRef> {
        while let Some(top) = self.top {
            let context = self.records.remove(top);
            self.top = context.next;
            if top == id {
                return context.srcref;
            }
        }
        None
    }

    /// Innermost first.
    pub fn iter(&self) -> impl Iterator<Item = &Context> + '_ {
        let mut current = self.top;
        std::iter::from_fn(move || {
            let context = self.records.get(current?)?;
            current = context.next;
            Some(context)
        })
    }

    pub fn calls(&self) -> impl Iterator<Item = &Context> + '_ {
        self.iter().filter(|c| c.is_call())
    }

    /// Innermost call context.
    pub fn current_call(&self) -> Option<&Context> {
        self.calls().next()
    }

    pub fn depth(&self) -> usize {
        self.records.len()
    }
}
