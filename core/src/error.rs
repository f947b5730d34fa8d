//! Error taxonomy for the whole crate, grounded in `gdlk`'s
//! `crates/core/src/error.rs`: every error kind is a flat `thiserror` enum,
//! and every error kind that can be attributed to a span in the source file
//! is wrapped in [WithSource] for display and serialized as
//! `{type, message, span}` for API/tooling consumption.

use crate::span::{fmt_src_highlights, Span};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Implemented by every error enum that can be located at a span in the
/// source. Mirrors `gdlk`'s own trait of the same shape.
pub trait SourceError: std::error::Error {
    /// A short machine-stable label for this error's variant, used as the
    /// `type` field when serialized (e.g. `"duplicate-name"`).
    fn type_label(&self) -> &'static str;

    /// The human-readable message, without source context. Defaults to this
    /// error's `Display` impl.
    fn fmt_msg(&self) -> String {
        self.to_string()
    }
}

/// Pairs a [SourceError] with the span it occurred at and (optionally) the
/// source text, for pretty-printing a caret-annotated excerpt.
#[derive(Debug, Clone)]
pub struct WithSource<E> {
    pub error: E,
    pub span: Span,
}

impl<E> WithSource<E> {
    pub fn new(error: E, span: Span) -> Self {
        Self { error, span }
    }
}

impl<E: SourceError> WithSource<E> {
    /// Render the message plus a caret-annotated excerpt of `src` (the full
    /// original source text the span was taken from).
    pub fn fmt_with_source(&self, src: &str) -> String {
        let mut out = self.error.fmt_msg();
        let _ = fmt_src_highlights(&mut out, &self.span, src);
        out
    }
}

impl<E: SourceError> Display for WithSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error.fmt_msg())
    }
}

impl<E: SourceError + 'static> std::error::Error for WithSource<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<E: SourceError> Serialize for WithSource<E> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("WithSource", 3)?;
        s.serialize_field("type", self.error.type_label())?;
        s.serialize_field("message", &self.error.fmt_msg())?;
        s.serialize_field("span", &self.span)?;
        s.end()
    }
}

/// Convenience alias used throughout the AST/parse/validate stages: an error
/// together with the span that caused it.
pub type SourceErrorWrapper<E> = WithSource<E>;

/// Errors that can occur while building or mutating the AST: currently just
/// duplicate declarations within one scope. Distinct from [ParseError]
/// because this can also happen during programmatic tree construction (e.g.
/// desugaring), not only while parsing source text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("`{name}` is already declared in this scope")]
    DuplicateName {
        name: String,
        original: Span,
        span: Span,
    },
}

impl SourceError for CompileError {
    fn type_label(&self) -> &'static str {
        match self {
            CompileError::DuplicateName { .. } => "duplicate-name",
        }
    }
}

/// Errors produced while lexing/parsing source text into an AST.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("`{0}` is already declared in this scope")]
    DuplicateName(String),
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("array/matrix dimension {value} out of range {min}..={max}")]
    DimensionOutOfRange { value: i64, min: u32, max: u32 },
    #[error("invalid register name `{0}`")]
    InvalidRegister(String),
}

impl SourceError for ParseError {
    fn type_label(&self) -> &'static str {
        match self {
            ParseError::UnexpectedToken => "unexpected-token",
            ParseError::UnexpectedEof => "unexpected-eof",
            ParseError::DuplicateName(_) => "duplicate-name",
            ParseError::UnknownDirective(_) => "unknown-directive",
            ParseError::InvalidLiteral(_) => "invalid-literal",
            ParseError::DimensionOutOfRange { .. } => "dimension-out-of-range",
            ParseError::InvalidRegister(_) => "invalid-register",
        }
    }
}

/// A compile-time constant value fell outside the range its declared/target
/// data type can hold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverflowError {
    #[error("value {value} does not fit in {datatype} (range {min}..={max})")]
    OutOfRange {
        value: i64,
        datatype: crate::datatype::DataType,
        min: i64,
        max: i64,
    },
    #[error("float value {value} does not fit in platform float range")]
    FloatOutOfRange { value: f64 },
}

impl SourceError for OverflowError {
    fn type_label(&self) -> &'static str {
        match self {
            OverflowError::OutOfRange { .. } => "overflow",
            OverflowError::FloatOutOfRange { .. } => "float-overflow",
        }
    }
}

/// A static type-checking failure: operand/target data types are
/// incompatible, arity mismatches, undeclared names, and so on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("`{name}` is not declared")]
    UndeclaredName { name: String },
    #[error("cannot assign {value_type} to target of type {target_type}")]
    AssignmentMismatch {
        value_type: crate::datatype::DataType,
        target_type: crate::datatype::DataType,
    },
    #[error("operator `{op}` cannot be applied to {lhs_type} and {rhs_type}")]
    OperatorMismatch {
        op: String,
        lhs_type: crate::datatype::DataType,
        rhs_type: crate::datatype::DataType,
    },
    #[error("`{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("`{name}` is not callable")]
    NotCallable { name: String },
    #[error("`{name}` cannot be used as an assignment target")]
    NotAssignable { name: String },
    #[error("dereference of non-numeric type {datatype}")]
    InvalidDereference { datatype: crate::datatype::DataType },
    #[error("expression in constant context must be a compile-time constant")]
    NotConstant,
}

impl SourceError for TypeError {
    fn type_label(&self) -> &'static str {
        match self {
            TypeError::UndeclaredName { .. } => "undeclared-name",
            TypeError::AssignmentMismatch { .. } => "assignment-mismatch",
            TypeError::OperatorMismatch { .. } => "operator-mismatch",
            TypeError::ArityMismatch { .. } => "arity-mismatch",
            TypeError::NotCallable { .. } => "not-callable",
            TypeError::NotAssignable { .. } => "not-assignable",
            TypeError::InvalidDereference { .. } => "invalid-dereference",
            TypeError::NotConstant => "not-constant",
        }
    }
}

/// Not a failure: a program reaching `TERMINATE` (or falling off the end of
/// the top-level program) unwinds the interpreter loop through this
/// sentinel, the same way `gdlk`'s machine distinguishes a clean stop from
/// an execution error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("program terminated")]
pub struct TerminateExecution;

/// Runtime failures raised by the VM while executing a flattened program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("read from write-only memory address {address:#06x}")]
    WriteOnlyRead { address: u16 },
    #[error("write to read-only memory address {address:#06x}")]
    ReadOnlyWrite { address: u16 },
    #[error("division by zero")]
    DivisionByZero,
    #[error("call stack is empty at RETURN")]
    CallStackEmpty,
    #[error("jump target {0} does not exist")]
    InvalidJumpTarget(usize),
    #[error("program exceeded the maximum cycle count ({0})")]
    CycleLimitExceeded(usize),
    #[error("unsupported status jump on flag `{flag}`")]
    UnsupportedStatusJump { flag: char },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: crate::datatype::DataType,
        found: crate::datatype::DataType,
    },
    #[error("syscall `{0}` is not defined")]
    UnknownSyscall(String),
    #[error("cannot assign to const variable `{name}`")]
    ConstAssignment { name: String },
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
}

impl SourceError for ExecutionError {
    fn type_label(&self) -> &'static str {
        match self {
            ExecutionError::StackUnderflow => "stack-underflow",
            ExecutionError::StackOverflow => "stack-overflow",
            ExecutionError::WriteOnlyRead { .. } => "write-only-read",
            ExecutionError::ReadOnlyWrite { .. } => "read-only-write",
            ExecutionError::DivisionByZero => "division-by-zero",
            ExecutionError::CallStackEmpty => "call-stack-empty",
            ExecutionError::InvalidJumpTarget(_) => "invalid-jump-target",
            ExecutionError::CycleLimitExceeded(_) => "cycle-limit-exceeded",
            ExecutionError::UnsupportedStatusJump { .. } => {
                "unsupported-status-jump"
            }
            ExecutionError::TypeMismatch { .. } => "type-mismatch",
            ExecutionError::UnknownSyscall(_) => "unknown-syscall",
            ExecutionError::ConstAssignment { .. } => "const-assignment",
            ExecutionError::UndefinedVariable(_) => "undefined-variable",
            ExecutionError::UndefinedLabel(_) => "undefined-label",
        }
    }
}

/// The top-level error returned by the `Compiler` pipeline: one variant per
/// stage, each carrying a list since a single pass can surface more than one
/// problem (matching `gdlk`'s "report everything, don't stop at the first
/// error" style for parse/validate).
#[derive(Error, Debug, Clone)]
pub enum CompilerError {
    #[error("{} parse error(s)", .0.len())]
    Parse(Vec<WithSource<ParseError>>),
    #[error("{} type error(s)", .0.len())]
    Type(Vec<WithSource<TypeError>>),
    #[error("{} overflow error(s)", .0.len())]
    Overflow(Vec<WithSource<OverflowError>>),
    #[error(transparent)]
    Compile(#[from] WithSource<CompileError>),
}

impl CompilerError {
    pub fn parse(errors: Vec<WithSource<ParseError>>) -> Self {
        CompilerError::Parse(errors)
    }

    pub fn type_errors(errors: Vec<WithSource<TypeError>>) -> Self {
        CompilerError::Type(errors)
    }

    pub fn overflow(errors: Vec<WithSource<OverflowError>>) -> Self {
        CompilerError::Overflow(errors)
    }
}
