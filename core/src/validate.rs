//! Static validation (spec.md §7's "TypeError — operator applied to wrong
//! data type, or invalid assignment"), bounded by the Non-goal that rules
//! out a full source-level type checker: this module checks name
//! resolution, call arity/callability, assignment-target shape, and
//! dereference operand type, the same checks the teacher's `validate.rs`
//! runs over its own AST (register/stack reference validity) adapted to
//! this language's symbol table instead of a hardware spec.

use crate::{
    arena::NodeId,
    ast::{Ast, NodeKind},
    error::{TypeError, WithSource},
};

/// Collect every [TypeError] reachable from `node`, recursing into its
/// children. Errors are accumulated rather than short-circuited, matching
/// spec.md §7's "report everything" style already used for parse errors.
pub fn validate(ast: &Ast, node: NodeId) -> Vec<WithSource<TypeError>> {
    let mut errors = Vec::new();
    validate_node(ast, node, &mut errors);
    for &child in &ast.node(node).children {
        errors.extend(validate(ast, child));
    }
    errors
}

fn validate_node(ast: &Ast, node: NodeId, errors: &mut Vec<WithSource<TypeError>>) {
    let span = ast.node(node).span;
    match &ast.node(node).kind {
        NodeKind::SymbolName { name } => {
            if ast.resolve(node, name).is_none() {
                errors.push(WithSource::new(
                    TypeError::UndeclaredName { name: name.clone() },
                    span,
                ));
            }
        }
        NodeKind::AddressOf { name } => {
            if ast.resolve(node, name).is_none() {
                errors.push(WithSource::new(
                    TypeError::UndeclaredName { name: name.clone() },
                    span,
                ));
            }
        }
        NodeKind::Dereference { datatype, .. } => {
            if !datatype.is_numeric_scalar() {
                errors.push(WithSource::new(
                    TypeError::InvalidDereference {
                        datatype: *datatype,
                    },
                    span,
                ));
            }
        }
        NodeKind::SubCall => {
            validate_sub_call(ast, node, span, errors);
        }
        NodeKind::AssignmentTargets => {
            for &target in &ast.node(node).children {
                validate_assignment_target(ast, target, errors);
            }
        }
        _ => {}
    }
}

/// Children of a `SubCall`: `[target, PreserveRegs, CallArguments]`. `target`
/// must resolve to a `Subroutine` or `BuiltinFunction`, and (for
/// `Subroutine`) the argument count must match the declared parameter count.
fn validate_sub_call(
    ast: &Ast,
    call: NodeId,
    span: crate::span::Span,
    errors: &mut Vec<WithSource<TypeError>>,
) {
    let children = &ast.node(call).children;
    let target = match children.first() {
        Some(&t) => t,
        None => return,
    };
    let name = match &ast.node(target).kind {
        NodeKind::SymbolName { name } => name.clone(),
        _ => return,
    };
    let resolved = match ast.resolve(target, &name) {
        Some(id) => id,
        None => return, // already reported by the SymbolName check above
    };
    let nargs = children
        .get(2)
        .map(|&args| ast.node(args).children.len())
        .unwrap_or(0);

    match &ast.node(resolved).kind {
        NodeKind::Subroutine { params, .. } => {
            if params.len() != nargs {
                errors.push(WithSource::new(
                    TypeError::ArityMismatch {
                        name,
                        expected: params.len(),
                        got: nargs,
                    },
                    span,
                ));
            }
        }
        NodeKind::BuiltinFunction { .. } => {}
        _ => {
            errors.push(WithSource::new(TypeError::NotCallable { name }, span));
        }
    }
}

/// A valid assignment target is a `SymbolName`, `Register`, or
/// `Dereference` node; anything else (a literal, an operator expression)
/// cannot receive an assignment.
fn validate_assignment_target(ast: &Ast, target: NodeId, errors: &mut Vec<WithSource<TypeError>>) {
    let span = ast.node(target).span;
    match &ast.node(target).kind {
        NodeKind::SymbolName { .. } | NodeKind::Register { .. } | NodeKind::Dereference { .. } => {}
        other => {
            errors.push(WithSource::new(
                TypeError::NotAssignable {
                    name: other.label().to_string(),
                },
                span,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{LiteralValue, NodeKind, ProgramFormat, ZpMode};
    use crate::datatype::{DataType, VarKind};
    use crate::span::Span;

    fn dummy_span() -> Span {
        Span::default()
    }

    #[test]
    fn test_undeclared_name_reported() {
        let mut ast = Ast::new();
        let module = ast.alloc(
            NodeKind::Module {
                filename: "t".into(),
                format: ProgramFormat::Raw,
                load_address: None,
                zp_mode: ZpMode::NoClobber,
            },
            dummy_span(),
        );
        let scope = ast.new_scope(crate::ast::ScopeLevel::Module, None, dummy_span());
        ast.add_child(module, scope).unwrap();

        let name_node = ast.alloc(
            NodeKind::SymbolName {
                name: "missing".into(),
            },
            dummy_span(),
        );
        ast.add_child(scope, name_node).unwrap();

        let errors = validate(&ast, module);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].error,
            TypeError::UndeclaredName { .. }
        ));
    }

    #[test]
    fn test_declared_name_passes() {
        let mut ast = Ast::new();
        let scope = ast.new_scope(crate::ast::ScopeLevel::Module, None, dummy_span());
        let var = ast.alloc(
            NodeKind::VarDef {
                name: "x".into(),
                kind: VarKind::Var,
                datatype: DataType::Byte,
                dimensions: vec![],
                zp_address: None,
            },
            dummy_span(),
        );
        ast.add_child(scope, var).unwrap();
        let name_node = ast.alloc(NodeKind::SymbolName { name: "x".into() }, dummy_span());
        ast.add_child(scope, name_node).unwrap();

        assert!(validate(&ast, scope).is_empty());
    }

    #[test]
    fn test_assignment_target_must_be_assignable() {
        let mut ast = Ast::new();
        let scope = ast.new_scope(crate::ast::ScopeLevel::Module, None, dummy_span());
        let targets = ast.alloc(NodeKind::AssignmentTargets, dummy_span());
        let literal = ast.alloc(
            NodeKind::LiteralValueNode {
                value: LiteralValue::Int(1),
            },
            dummy_span(),
        );
        ast.add_child(targets, literal).unwrap();
        ast.add_child(scope, targets).unwrap();

        let errors = validate(&ast, scope);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].error, TypeError::NotAssignable { .. }));
    }
}
