//! Compile-time constant folding and coercion (spec §4.3), operating
//! directly on `NodeId`s resolved through the `Ast` arena.

use crate::{
    arena::NodeId,
    ast::{Ast, LiteralValue, NodeKind, VarKind},
    consts::{
        BYTE_MAX, BYTE_MIN, FLOAT_MAX, FLOAT_MIN, SBYTE_MAX, SBYTE_MIN, SWORD_MAX,
        SWORD_MIN, WORD_MAX, WORD_MIN,
    },
    datatype::DataType,
    error::{OverflowError, ParseError, TypeError, WithSource},
    span::Span,
};

/// Is `expr` a compile-time constant? Per spec §4.3: true for LiteralValue,
/// and SymbolName resolving to a `const` VarDef; AddressOf is constant only
/// when it resolves to a memory-mapped VarDef with a known zero-page
/// address; everything else (Register, Dereference, SubCall,
/// ExpressionWithOperator) is not -- folding an operator expression happens
/// as a tree rewrite via `const_value`, not as a query here.
pub fn is_compile_constant(ast: &Ast, expr: NodeId) -> bool {
    match &ast.node(expr).kind {
        NodeKind::LiteralValueNode { .. } => true,
        NodeKind::SymbolName { name } => {
            match ast.resolve(expr, name) {
                Some(decl) => matches!(
                    &ast.node(decl).kind,
                    NodeKind::VarDef {
                        kind: VarKind::Const,
                        ..
                    }
                ),
                None => false,
            }
        }
        NodeKind::AddressOf { name } => match ast.resolve(expr, name) {
            Some(decl) => matches!(
                &ast.node(decl).kind,
                NodeKind::VarDef {
                    kind: VarKind::Memory,
                    zp_address: Some(_),
                    ..
                }
            ),
            None => false,
        },
        _ => false,
    }
}

/// Evaluate `expr` to a concrete value. Fails with a typed error if `expr`
/// isn't foldable at all, or if folding hits an operator error (division by
/// zero becomes a `ParseError`; anything else maps through `TypeError`).
pub fn const_value(
    ast: &Ast,
    expr: NodeId,
) -> Result<LiteralValue, WithSource<ParseError>> {
    let span = ast.node(expr).span;
    match &ast.node(expr).kind {
        NodeKind::LiteralValueNode { value } => Ok(value.clone()),
        NodeKind::SymbolName { name } => {
            let decl = ast.resolve(expr, name).ok_or_else(|| {
                WithSource::new(
                    ParseError::InvalidLiteral(format!("undefined symbol `{}`", name)),
                    span,
                )
            })?;
            match &ast.node(decl).kind {
                NodeKind::VarDef {
                    kind: VarKind::Const,
                    ..
                } => {
                    let init = ast
                        .node(decl)
                        .children
                        .first()
                        .copied()
                        .ok_or_else(|| {
                            WithSource::new(
                                ParseError::InvalidLiteral(
                                    "const has no initializer".into(),
                                ),
                                span,
                            )
                        })?;
                    const_value(ast, init)
                }
                _ => Err(WithSource::new(
                    ParseError::InvalidLiteral(format!("`{}` is not constant", name)),
                    span,
                )),
            }
        }
        NodeKind::AddressOf { name } => {
            let decl = ast.resolve(expr, name).ok_or_else(|| {
                WithSource::new(
                    ParseError::InvalidLiteral(format!("undefined symbol `{}`", name)),
                    span,
                )
            })?;
            match &ast.node(decl).kind {
                NodeKind::VarDef {
                    zp_address: Some(addr),
                    ..
                } => Ok(LiteralValue::Int(*addr as i64)),
                _ => Err(WithSource::new(
                    ParseError::InvalidLiteral(format!(
                        "`{}` has no known address",
                        name
                    )),
                    span,
                )),
            }
        }
        NodeKind::ExpressionWithOperator { op, .. } => {
            let children = ast.node(expr).children.clone();
            if children.len() == 2 {
                let lhs = const_value(ast, children[0])?;
                let rhs = const_value(ast, children[1])?;
                fold_binary(op, lhs, rhs, span)
            } else if children.len() == 1 {
                let operand = const_value(ast, children[0])?;
                fold_unary(op, operand, span)
            } else {
                Err(WithSource::new(ParseError::UnexpectedToken, span))
            }
        }
        _ => Err(WithSource::new(
            ParseError::InvalidLiteral("not a compile-time constant".into()),
            span,
        )),
    }
}

fn as_numeric(v: &LiteralValue) -> Option<f64> {
    match v {
        LiteralValue::Int(i) => Some(*i as f64),
        LiteralValue::Float(f) => Some(*f),
        LiteralValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        LiteralValue::Str(_) => None,
    }
}

fn is_float(v: &LiteralValue) -> bool {
    matches!(v, LiteralValue::Float(_))
}

/// Evaluate a folded binary operator. Integer division (`//`) floors;
/// plain `/` always produces a float, matching the design note in spec §9
/// that a reimplementation should define these explicitly rather than
/// inherit host-language semantics.
fn fold_binary(
    op: &str,
    lhs: LiteralValue,
    rhs: LiteralValue,
    span: Span,
) -> Result<LiteralValue, WithSource<ParseError>> {
    let (a, b) = match (as_numeric(&lhs), as_numeric(&rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(WithSource::new(
                ParseError::InvalidLiteral("operands must be numeric".into()),
                span,
            ))
        }
    };
    let float_result = is_float(&lhs) || is_float(&rhs);

    let make_int = |v: f64| LiteralValue::Int(v as i64);
    let make_num = |v: f64| {
        if float_result {
            LiteralValue::Float(v)
        } else {
            make_int(v)
        }
    };

    match op {
        "+" => Ok(make_num(a + b)),
        "-" => Ok(make_num(a - b)),
        "*" => Ok(make_num(a * b)),
        "/" => {
            if b == 0.0 {
                return Err(WithSource::new(
                    ParseError::InvalidLiteral("division by zero".into()),
                    span,
                ));
            }
            Ok(LiteralValue::Float(a / b))
        }
        "//" => {
            if b == 0.0 {
                return Err(WithSource::new(
                    ParseError::InvalidLiteral("division by zero".into()),
                    span,
                ));
            }
            Ok(make_int((a / b).floor()))
        }
        "%" => {
            if b == 0.0 {
                return Err(WithSource::new(
                    ParseError::InvalidLiteral("division by zero".into()),
                    span,
                ));
            }
            Ok(make_num(a.rem_euclid(b)))
        }
        "**" => Ok(make_num(a.powf(b))),
        "&" => Ok(make_int(((a as i64) & (b as i64)) as f64)),
        "|" => Ok(make_int(((a as i64) | (b as i64)) as f64)),
        "^" => Ok(make_int(((a as i64) ^ (b as i64)) as f64)),
        "<<" => Ok(make_int(((a as i64) << (b as i64)) as f64)),
        ">>" => Ok(make_int(((a as i64) >> (b as i64)) as f64)),
        "and" => Ok(LiteralValue::Bool(a != 0.0 && b != 0.0)),
        "or" => Ok(LiteralValue::Bool(a != 0.0 || b != 0.0)),
        "<" => Ok(LiteralValue::Bool(a < b)),
        ">" => Ok(LiteralValue::Bool(a > b)),
        "<=" => Ok(LiteralValue::Bool(a <= b)),
        ">=" => Ok(LiteralValue::Bool(a >= b)),
        "==" => Ok(LiteralValue::Bool(a == b)),
        "!=" => Ok(LiteralValue::Bool(a != b)),
        _ => Err(WithSource::new(ParseError::UnexpectedToken, span)),
    }
}

fn fold_unary(
    op: &str,
    operand: LiteralValue,
    span: Span,
) -> Result<LiteralValue, WithSource<ParseError>> {
    let a = as_numeric(&operand).ok_or_else(|| {
        WithSource::new(
            ParseError::InvalidLiteral("operand must be numeric".into()),
            span,
        )
    })?;
    match op {
        "-" => Ok(if is_float(&operand) {
            LiteralValue::Float(-a)
        } else {
            LiteralValue::Int(-(a as i64))
        }),
        "~" => Ok(LiteralValue::Int(!(a as i64))),
        "not" => Ok(LiteralValue::Bool(a == 0.0)),
        _ => Err(WithSource::new(ParseError::UnexpectedToken, span)),
    }
}

/// Coerce a folded literal to fit `datatype`, per spec §4.3. Returns
/// whether the value changed and the (possibly rewritten) literal.
pub fn coerce_constant_value(
    datatype: DataType,
    value: LiteralValue,
    span: Span,
) -> Result<(bool, LiteralValue), WithSource<OverflowError>> {
    match (&datatype, &value) {
        (dt, LiteralValue::Str(s)) if dt.is_numeric_scalar() && s.chars().count() == 1 => {
            let byte = s.chars().next().unwrap() as i64;
            Ok((true, LiteralValue::Int(byte)))
        }
        (dt, LiteralValue::Float(f)) if dt.is_numeric_scalar() && *dt != DataType::Float => {
            let truncated = f.trunc() as i64;
            check_int_range(datatype, truncated, span)?;
            Ok((true, LiteralValue::Int(truncated)))
        }
        (DataType::Float, LiteralValue::Float(f)) => {
            if *f < FLOAT_MIN || *f > FLOAT_MAX {
                return Err(WithSource::new(
                    OverflowError::FloatOutOfRange { value: *f },
                    span,
                ));
            }
            Ok((false, value))
        }
        (DataType::Float, LiteralValue::Int(i)) => {
            Ok((true, LiteralValue::Float(*i as f64)))
        }
        (dt, LiteralValue::Int(i)) if dt.is_numeric_scalar() => {
            check_int_range(datatype, *i, span)?;
            Ok((false, value))
        }
        (dt, LiteralValue::Bool(b)) if dt.is_numeric_scalar() => {
            Ok((true, LiteralValue::Int(if *b { 1 } else { 0 })))
        }
        _ => Ok((false, value)),
    }
}

fn check_int_range(
    datatype: DataType,
    value: i64,
    span: Span,
) -> Result<(), WithSource<OverflowError>> {
    let (min, max) = match datatype {
        DataType::Byte | DataType::ArrayByte | DataType::MatrixByte => {
            (BYTE_MIN, BYTE_MAX)
        }
        DataType::SByte | DataType::ArraySByte | DataType::MatrixSByte => {
            (SBYTE_MIN, SBYTE_MAX)
        }
        DataType::Word | DataType::ArrayWord => (WORD_MIN, WORD_MAX),
        DataType::SWord | DataType::ArraySWord => (SWORD_MIN, SWORD_MAX),
        DataType::Bool => (0, 1),
        DataType::Float => return Ok(()),
    };
    if value < min || value > max {
        return Err(WithSource::new(
            OverflowError::OutOfRange {
                value,
                datatype,
                min,
                max,
            },
            span,
        ));
    }
    Ok(())
}

/// Used by the validator when an assignment's source isn't a constant at
/// all and the target is numeric -- only LiteralValue, SymbolName, Register,
/// Dereference, and AddressOf are legal non-constant numeric assignment
/// sources per spec §4.3's last bullet.
pub fn check_assignable_numeric_source(
    ast: &Ast,
    source: NodeId,
) -> Result<(), WithSource<TypeError>> {
    let span = ast.node(source).span;
    match &ast.node(source).kind {
        NodeKind::LiteralValueNode { .. }
        | NodeKind::SymbolName { .. }
        | NodeKind::Register { .. }
        | NodeKind::Dereference { .. }
        | NodeKind::AddressOf { .. } => Ok(()),
        _ => Err(WithSource::new(TypeError::NotConstant, span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ScopeLevel;

    fn lit(ast: &mut Ast, value: LiteralValue) -> NodeId {
        ast.alloc(NodeKind::LiteralValueNode { value }, Span::default())
    }

    #[test]
    fn test_fold_idempotent() {
        let mut ast = Ast::new();
        let l = lit(&mut ast, LiteralValue::Int(5));
        assert_eq!(const_value(&ast, l).unwrap(), LiteralValue::Int(5));
    }

    #[test]
    fn test_fold_arithmetic_precedence_scenario() {
        // 2 + 3 * 4 == 14
        let mut ast = Ast::new();
        let two = lit(&mut ast, LiteralValue::Int(2));
        let three = lit(&mut ast, LiteralValue::Int(3));
        let four = lit(&mut ast, LiteralValue::Int(4));
        let mul = ast.alloc(
            NodeKind::ExpressionWithOperator {
                op: "*".into(),
                must_be_const: true,
            },
            Span::default(),
        );
        ast.add_child(mul, three).unwrap();
        ast.add_child(mul, four).unwrap();
        let add = ast.alloc(
            NodeKind::ExpressionWithOperator {
                op: "+".into(),
                must_be_const: true,
            },
            Span::default(),
        );
        ast.add_child(add, two).unwrap();
        ast.add_child(add, mul).unwrap();
        assert_eq!(const_value(&ast, add).unwrap(), LiteralValue::Int(14));
    }

    #[test]
    fn test_coerce_byte_range_error() {
        let err = coerce_constant_value(
            DataType::Byte,
            LiteralValue::Int(300),
            Span::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_coerce_roundtrip() {
        let (changed, value) =
            coerce_constant_value(DataType::Byte, LiteralValue::Int(42), Span::default())
                .unwrap();
        assert!(!changed);
        assert_eq!(value, LiteralValue::Int(42));
    }

    #[test]
    fn test_float_interning_shares_name() {
        let mut ast = Ast::new();
        let scope = ast.new_scope(ScopeLevel::Module, None, Span::default());
        let n1 = ast
            .intern_float_const(scope, 3.14, Span::default())
            .unwrap();
        let n2 = ast
            .intern_float_const(scope, 3.14, Span::default())
            .unwrap();
        assert_eq!(n1, n2);
    }
}
