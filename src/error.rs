//! Errors produced while generating code for a function.
//!
//! There are two disjoint kinds of failure. Problems with the input (an IR
//! construct this back end does not support, malformed IR text) are reported
//! as [`CodegenError`] values and handled by the driver. Broken pipeline
//! invariants are compiler bugs: they are raised with [`internal_error!`],
//! which panics, and are never meant to be caught.

use thiserror::Error;

/// A recoverable failure while compiling one function
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("unsupported feature: {construct}")]
    Unsupported { construct: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("register budget of {requested} is outside of 1..={available}")]
    RegisterBudget { requested: usize, available: usize },
}

impl CodegenError {
    pub fn unsupported(construct: impl Into<String>) -> Self {
        Self::Unsupported {
            construct: construct.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected}, found `{found}`")]
    Expected {
        expected: &'static str,
        found: String,
    },
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    #[error("unknown condition `{0}`")]
    UnknownCondition(String),
    #[error("label `{0}` is defined twice")]
    DuplicateLabel(String),
    #[error("label `{0}` is never defined")]
    UndefinedLabel(String),
    #[error("block `{0}` has no terminator")]
    MissingTerminator(String),
    #[error("statement outside of a block")]
    OutsideBlock,
    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// Failures of the reference interpreter
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("read of undefined {0}")]
    Undefined(String),
    #[error("jump to unknown label {0}")]
    UnknownLabel(String),
    #[error("no phi source for edge from {0}")]
    MissingPhiSource(String),
    #[error("execution exceeded {0} steps")]
    StepLimit(usize),
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
}

/// A violated pipeline invariant. Only ever constructed by [`internal_error!`].
#[derive(Debug, Error)]
#[error("internal compiler error: {0}")]
pub struct InternalError(pub String);

macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .expect("Short function name")
    }};
}

pub(crate) use function;

/// Aborts compilation on a broken invariant
macro_rules! internal_error {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);

        #[cfg(feature = "error-backtrace")]
        let message = format!(
            "{} (in {}::{} at {}:{}:{})",
            message,
            module_path!(),
            $crate::error::function!(),
            file!(),
            line!(),
            column!()
        );

        panic!("{}", $crate::error::InternalError(message))
    }};
}

pub(crate) use internal_error;
