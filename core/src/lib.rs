//! Core implementation of the mos65 language: a typed-AST front end over a
//! hand-rolled lexer/parser, and a stack-based virtual machine the front
//! end does not itself generate code for (spec §1: the two subsystems are
//! independent collaborators, not a single compile-to-bytecode pipeline).
//!
//! ```
//! use mos65::{parse_and_check, vm::HardwareSpec, vm::ProgramSpec};
//!
//! let source = "
//! var byte counter = 0
//! sub main() ? {
//!     counter = counter + 1
//! }
//! ";
//! let (ast, _module) = parse_and_check(source, "example.mos").unwrap();
//! assert!(ast.check_parent_child_invariant());
//!
//! let hardware = HardwareSpec::default();
//! let _program_spec = ProgramSpec::default();
//! let mut memory = hardware.build_memory();
//! memory.write_byte(0x0000, 42).unwrap();
//! ```

pub mod arena;
pub mod ast;
pub mod constfold;
pub mod consts;
pub mod datatype;
pub mod error;
pub mod lexer;
pub mod parse;
pub mod scope;
pub mod span;
pub mod util;
pub mod validate;
pub mod vm;

use arena::NodeId;
use ast::{Ast, ScopeLevel};
use error::{CompilerError, WithSource};

/// Struct to contain all compiler pipeline steps. Each stage takes `self`
/// and returns a new `Compiler`, so pipeline stages can be chained in a
/// single expression; the wrapped value is deliberately private so a
/// `Compiler` can only be driven through this module's methods.
///
/// `T` tracks what state the pipeline is in -- a fresh `Compiler<&str>` can
/// only `.parse()`, the result of which can only `.validate()`, and so on.
#[derive(Debug)]
pub struct Compiler<T>(T);

impl<T: std::fmt::Debug> Compiler<T> {
    /// Print the current pipeline state if `DEBUG=true` is set (no-op in
    /// release builds). Mirrors the teacher's `Compiler::debug()`.
    pub fn debug(self) -> Self {
        debug!(println!("{:?}", &self.0));
        self
    }
}

impl<'a> Compiler<&'a str> {
    pub fn new(source: &'a str) -> Self {
        Compiler(source)
    }

    /// Tokenize and parse `self`'s source into an AST, then register the
    /// builtin syscall wrappers in the module's top scope (spec §9's
    /// resolution: builtins are pre-registered by the pipeline, not left to
    /// parser callers).
    pub fn parse(self, filename: &str) -> Result<Compiler<(Ast, NodeId)>, CompilerError> {
        let (mut ast, module) =
            parse::parse_module(self.0, filename).map_err(CompilerError::Parse)?;
        if let Some(scope) = ast.scope_of(module) {
            ast.register_builtins(scope)
                .map_err(|e| CompilerError::Compile(WithSource::new(e, ast.node(module).span)))?;
        }
        Ok(Compiler((ast, module)))
    }
}

impl Compiler<(Ast, NodeId)> {
    /// Run static validation over the whole tree (name resolution, call
    /// arity, assignment-target shape, dereference operand type).
    pub fn validate(self) -> Result<Self, CompilerError> {
        let (ast, module) = self.0;
        let errors = validate::validate(&ast, module);
        if errors.is_empty() {
            Ok(Compiler((ast, module)))
        } else {
            Err(CompilerError::Type(errors))
        }
    }

    /// The underlying AST and its root `Module` node.
    pub fn into_ast(self) -> (Ast, NodeId) {
        self.0
    }
}

/// Parse `source` and run static validation, returning the resulting AST.
/// The common-case entry point for a tool driver that only needs the front
/// end (e.g. an editor's live diagnostics).
pub fn parse_and_check(source: &str, filename: &str) -> Result<(Ast, NodeId), CompilerError> {
    Ok(Compiler::new(source)
        .debug()
        .parse(filename)?
        .debug()
        .validate()?
        .into_ast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_check_simple_program() {
        let source = "var byte x = 1\nsub main() ? {\n    x = x + 1\n}\n";
        let (ast, module) = parse_and_check(source, "t.mos").unwrap();
        assert!(ast.check_parent_child_invariant());
        assert_eq!(ast.node(module).kind.label(), "module");
    }

    #[test]
    fn test_parse_and_check_catches_undeclared_name() {
        let source = "sub main() ? {\n    missing = 1\n}\n";
        let result = parse_and_check(source, "t.mos");
        assert!(result.is_err());
    }

    #[test]
    fn test_builtins_registered_after_parse() {
        let source = "sub main() ? {\n}\n";
        let compiler = Compiler::new(source).parse("t.mos").unwrap();
        let (ast, module) = compiler.into_ast();
        let scope = ast.scope_of(module).unwrap();
        assert!(ast.resolve(scope, "printstr").is_some());
    }

    #[test]
    fn test_scope_level_reexport_usable() {
        let _ = ScopeLevel::Module;
    }
}
