//! End-to-end front-end tests: source text in, either a validated AST or a
//! typed error set out. Exercises `mos65::parse_and_check` the way a tool
//! driver would, rather than any one module in isolation.

use mos65::error::CompilerError;
use mos65::parse_and_check;

#[test]
fn accepts_a_small_well_formed_program() {
    let source = "\
var byte counter = 0
sub main() ? {
    counter = counter + 1
}
";
    let (ast, module) = parse_and_check(source, "ok.mos").unwrap();
    assert!(ast.check_parent_child_invariant());
    assert_eq!(ast.node(module).kind.label(), "module");
}

#[test]
fn rejects_use_of_an_undeclared_name() {
    let source = "\
sub main() ? {
    total = total + 1
}
";
    match parse_and_check(source, "undeclared.mos") {
        Err(CompilerError::Type(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected a type-error set, got {:?}", other),
    }
}

#[test]
fn rejects_a_call_with_the_wrong_argument_count() {
    let source = "\
sub add_one(byte n) ? {
    var byte y = 1
}
sub main() ? {
    add_one()
}
";
    match parse_and_check(source, "arity.mos") {
        Err(CompilerError::Type(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("expected an arity mismatch, got {:?}", other),
    }
}

#[test]
fn rejects_malformed_syntax_as_a_parse_error_not_a_panic() {
    let source = "sub main( ? {\n";
    match parse_and_check(source, "broken.mos") {
        Err(CompilerError::Parse(errors)) => assert!(!errors.is_empty()),
        other => panic!("expected a parse-error set, got {:?}", other),
    }
}
