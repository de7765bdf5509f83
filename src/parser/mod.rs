mod grammar;
mod lexer;
mod types;

pub use grammar::{parse_program, parse_text, SrcRefAllocator};
pub use lexer::{tokenize, Spanned, Token};
pub use types::{Arg, BinaryOp, Block, Call, Expr, FunctionDef, Param, UnaryOp};
