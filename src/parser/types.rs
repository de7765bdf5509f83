use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::source::SrcRef;

static NEXT_FUNCTION_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Ident(Rc<str>),
    Assign {
        target: Rc<str>,
        value: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call(Rc<Call>),
    Function(Rc<FunctionDef>),
    Block(Rc<Block>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Break,
    Next,
}

impl Expr {
    /// Literals can be bound directly instead of through a promise.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Expr::Null | Expr::Bool(_) | Expr::Num(_) | Expr::Str(_)
        )
    }
}

/// A call site. Call contexts keep a handle to it for the lifetime of the call.
#[derive(Debug)]
pub struct Call {
    pub callee: Expr,
    pub args: Vec<Arg>,
    pub srcref: Option<SrcRef>,
}

impl Call {
    /// Call sites fabricated by the interpreter itself (`<source>`, `<eval>`).
    pub fn synthetic(name: &str) -> Rc<Call> {
        Rc::new(Call {
            callee: Expr::Ident(name.into()),
            args: Vec::new(),
            srcref: None,
        })
    }

    /// Name of the called function as written at the call site.
    pub fn function_name(&self) -> String {
        match &self.callee {
            Expr::Ident(name) => name.to_string(),
            Expr::Function(_) => "<anonymous>".to_string(),
            Expr::Call(inner) => format!("{}()", inner.function_name()),
            _ => "<unknown>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Arg {
    pub name: Option<Rc<str>>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<str>,
    pub default: Option<Expr>,
}

#[derive(Debug)]
pub struct FunctionDef {
    /// Process-unique, used as the resolver's cache key.
    pub id: u32,
    pub params: Vec<Param>,
    pub body: Expr,
    pub srcref: Option<SrcRef>,
}

impl FunctionDef {
    pub fn new(params: Vec<Param>, body: Expr, srcref: Option<SrcRef>) -> Self {
        Self {
            id: NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed),
            params,
            body,
            srcref,
        }
    }
}

/// A compound statement. `srcrefs[0]` belongs to the block itself, `srcrefs[i]`
/// to `stmts[i - 1]`.
#[derive(Debug)]
pub struct Block {
    pub stmts: Vec<Expr>,
    pub srcrefs: Vec<Option<SrcRef>>,
}

impl Block {
    pub fn srcref(&self, index: usize) -> Option<SrcRef> {
        self.srcrefs.get(index).copied().flatten()
    }
}
