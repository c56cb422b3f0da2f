//! The table transformation language: a small pandas-flavoured statement
//! language with no loops, function definitions or file access.

pub mod ast;
pub mod builtins;
pub mod groupby;
pub mod interp;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod series;
pub mod table_ops;
pub mod value;

pub use interp::{Interpreter, Outcome, RESULT_NAME};
pub use parser::parse_program;
pub use value::{Module, ScriptValue};
