//! All the different types that can appear in the AST. This module defines
//! the closed set of node kinds (§3.1 of the spec) as one tagged union,
//! `NodeKind`, with a uniform `(parent, children, span)` envelope,
//! `AstNode`, sitting on top per spec.md §9's design notes. There is no
//! functionality implemented on the variants themselves beyond small,
//! data-only helpers; tree mutation and symbol-table bookkeeping live on
//! [Ast], because those operations need to touch more than one node at a
//! time (e.g. removing a child also has to remove its entry from the
//! enclosing scope's symbol map).

use crate::{
    arena::{Arena, NodeId},
    consts::ZERO_PAGE_BLOCK_NAME,
    datatype::{DataType, RegisterName, VarKind},
    error::CompileError,
    span::Span,
};
use std::collections::HashMap;

/// The type of every scalar literal value in the language.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// `output` directive values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProgramFormat {
    Raw,
    Prg,
    BasicPrg,
}

/// `zp` directive values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZpMode {
    NoClobber,
    Clobber,
    ClobberRestore,
}

/// A `Scope`'s lexical level, per spec.md §3.1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeLevel {
    Module,
    Block,
    Sub,
}

/// One parameter in a subroutine's `param-spec`.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub datatype: DataType,
}

/// A subroutine's result spec: either a set of clobbered registers, or
/// nothing declared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSpec {
    /// `?` normalizes to clobbering A, X, and Y.
    pub clobbers: Vec<RegisterName>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AugOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IncrDecrOp {
    Incr,
    Decr,
}

/// The closed set of AST node kinds. Children are *not* stored here; they
/// live in [AstNode::children] and their positional meaning is documented
/// per variant (matching the table in spec.md §3.1).
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Children: `[Scope]` (level = Module).
    Module {
        filename: String,
        format: ProgramFormat,
        load_address: Option<u16>,
        zp_mode: ZpMode,
    },
    /// Children: `[Scope]`.
    Block {
        name: Option<String>,
        load_address: Option<u16>,
    },
    /// Children: declarations/statements, in source order.
    Scope {
        level: ScopeLevel,
        name: Option<String>,
        symbols: HashMap<String, NodeId>,
        float_consts: HashMap<u64, String>,
        save_registers: Option<bool>,
    },
    /// Children: `[]` or `[Scope]`.
    Subroutine {
        name: String,
        params: Vec<Param>,
        result: ResultSpec,
        address: Option<u16>,
    },
    /// Children: `[]`.
    Label { name: String },
    /// Children: `[]`.
    Directive {
        name: String,
        args: Vec<LiteralValue>,
    },
    /// Children: `[]` or `[Expression]` (initial value).
    VarDef {
        name: String,
        kind: VarKind,
        datatype: DataType,
        dimensions: Vec<u32>,
        zp_address: Option<u16>,
    },
    /// Children: `[]`.
    InlineAssembly { text: String },
    /// Children: `[]`. The callable handle is opaque at the AST level; it is
    /// resolved to an actual implementation by the VM/codegen backend, which
    /// is out of scope here.
    BuiltinFunction { name: String },
    /// Children: `[target, target, ...]` (1..N).
    AssignmentTargets,
    /// Children: `[AssignmentTargets, Expression]`.
    Assignment,
    /// Children: `[target, Expression]`.
    AugAssignment { op: AugOp },
    /// Children: `[target]`.
    IncrDecr { op: IncrDecrOp, amount: u32 },
    /// Children: 0..3 Expressions (A, X, Y registers).
    Return,
    /// Children: `[target]` or `[target, condition]`.
    Goto { has_if: bool },
    /// Children: `[target, PreserveRegs, CallArguments]`.
    SubCall,
    /// Children: `[CallArgument, ...]` (0..N).
    CallArguments,
    /// Children: `[Expression]`.
    CallArgument { param_name: Option<String> },
    /// Children: `[]`.
    PreserveRegs { registers: String },
    /// Children: `[Register, ...]` (1..N).
    TargetRegisters,
    /// Children: `[]`.
    Register { name: RegisterName },
    /// Children: `[]`.
    LiteralValueNode { value: LiteralValue },
    /// Children: `[]`. Possibly-dotted name.
    SymbolName { name: String },
    /// Children: `[]`.
    AddressOf { name: String },
    /// Children: `[operand]` (SymbolName, LiteralValueNode, or Register).
    Dereference {
        datatype: DataType,
        element_size: usize,
    },
    /// Children: 1 or 2 Expressions.
    ExpressionWithOperator { op: String, must_be_const: bool },
    /// Children: `[]`.
    DatatypeNode {
        type_name: String,
        dimensions: Option<Vec<u32>>,
    },
}

impl NodeKind {
    /// A short, human-readable label for this node kind, used in error
    /// messages and debug dumps.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Module { .. } => "module",
            NodeKind::Block { .. } => "block",
            NodeKind::Scope { .. } => "scope",
            NodeKind::Subroutine { .. } => "subroutine",
            NodeKind::Label { .. } => "label",
            NodeKind::Directive { .. } => "directive",
            NodeKind::VarDef { .. } => "variable definition",
            NodeKind::InlineAssembly { .. } => "inline assembly",
            NodeKind::BuiltinFunction { .. } => "builtin function",
            NodeKind::AssignmentTargets => "assignment targets",
            NodeKind::Assignment => "assignment",
            NodeKind::AugAssignment { .. } => "augmented assignment",
            NodeKind::IncrDecr { .. } => "increment/decrement",
            NodeKind::Return => "return",
            NodeKind::Goto { .. } => "goto",
            NodeKind::SubCall => "subroutine call",
            NodeKind::CallArguments => "call arguments",
            NodeKind::CallArgument { .. } => "call argument",
            NodeKind::PreserveRegs { .. } => "preserve-registers clause",
            NodeKind::TargetRegisters => "target registers",
            NodeKind::Register { .. } => "register",
            NodeKind::LiteralValueNode { .. } => "literal value",
            NodeKind::SymbolName { .. } => "symbol name",
            NodeKind::AddressOf { .. } => "address-of expression",
            NodeKind::Dereference { .. } => "dereference",
            NodeKind::ExpressionWithOperator { .. } => "expression",
            NodeKind::DatatypeNode { .. } => "datatype",
        }
    }

    /// Does this node kind get indexed into its enclosing scope's symbol
    /// map, and if so, under what name? Per spec.md §4.1: Labels, VarDefs,
    /// Subroutines, BuiltinFunctions, and named Blocks/Scopes.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            NodeKind::Label { name } => Some(name),
            NodeKind::VarDef { name, .. } => Some(name),
            NodeKind::Subroutine { name, .. } => Some(name),
            NodeKind::BuiltinFunction { name } => Some(name),
            NodeKind::Block {
                name: Some(name), ..
            } => Some(name),
            NodeKind::Scope {
                name: Some(name), ..
            } => Some(name),
            _ => None,
        }
    }
}

/// One node in the AST: a [NodeKind] plus the uniform envelope of parent,
/// children, and source span.
#[derive(Clone, Debug, PartialEq)]
pub struct AstNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: Span,
}

/// Owner of the whole AST arena. Every mutator that needs to keep a symbol
/// table in sync with the tree (insert, remove, replace a named child) lives
/// here rather than on [AstNode]/[NodeKind] directly, since the symbol map
/// lives on a *different* node (the enclosing [NodeKind::Scope]) than the
/// child being added or removed.
#[derive(Debug, Default)]
pub struct Ast {
    pub arena: Arena<AstNode>,
    pub root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new, parentless, childless node.
    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.arena.alloc(AstNode {
            kind,
            parent: None,
            children: Vec::new(),
            span,
        })
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        self.arena.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut AstNode {
        self.arena.get_mut(id)
    }

    /// Append `child` to the end of `parent`'s children, setting `child`'s
    /// parent pointer and indexing it into the enclosing scope if it is a
    /// declaration.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), CompileError> {
        let index = self.node(parent).children.len();
        self.insert_child(parent, index, child)
    }

    /// Insert `child` into `parent`'s children at `index`, same bookkeeping
    /// as [Self::add_child].
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), CompileError> {
        if let Some(name) = self.node(child).kind.declared_name() {
            let name = name.to_string();
            let child_span = self.node(child).span;
            if let Some(scope_span) =
                self.declare_in_nearest_scope(parent, &name, child, child_span)?
            {
                let _ = scope_span;
            }
        }
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.insert(index, child);
        Ok(())
    }

    /// Remove the child at `index` from `parent`, detaching it and cleaning
    /// up any symbol table entry it held.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        let child = self.node_mut(parent).children.remove(index);
        self.node_mut(child).parent = None;
        if let Some(name) = self.node(child).kind.declared_name().map(String::from)
        {
            self.undeclare_in_nearest_scope(parent, &name);
        }
        child
    }

    /// Replace the child at `index` of `parent` with `replacement`,
    /// preserving the index and updating the symbol table.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        index: usize,
        replacement: NodeId,
    ) -> Result<NodeId, CompileError> {
        let old = self.remove_child(parent, index);
        self.insert_child(parent, index, replacement)?;
        Ok(old)
    }

    /// `parent` is either a Scope itself, or a node whose first child is a
    /// Scope (Module/Block/Subroutine all carry `declared_name` children
    /// that must be indexed in the scope that *contains* `parent`, not a
    /// scope that `parent` owns). This walks up until it finds the nearest
    /// actual `Scope` node and inserts there.
    fn declare_in_nearest_scope(
        &mut self,
        parent: NodeId,
        name: &str,
        decl: NodeId,
        span: Span,
    ) -> Result<Option<Span>, CompileError> {
        let scope_id = self.nearest_scope_including(parent);
        let scope_id = match scope_id {
            Some(id) => id,
            None => return Ok(None),
        };
        if let NodeKind::Scope { symbols, .. } = &mut self.node_mut(scope_id).kind
        {
            if name == ZERO_PAGE_BLOCK_NAME {
                symbols.insert(name.to_string(), decl);
                return Ok(None);
            }
            if let Some(&existing) = symbols.get(name) {
                let original = self.node(existing).span;
                return Err(CompileError::DuplicateName {
                    name: name.to_string(),
                    original,
                    span,
                });
            }
            symbols.insert(name.to_string(), decl);
        }
        Ok(None)
    }

    fn undeclare_in_nearest_scope(&mut self, parent: NodeId, name: &str) {
        if let Some(scope_id) = self.nearest_scope_including(parent) {
            if let NodeKind::Scope { symbols, .. } =
                &mut self.node_mut(scope_id).kind
            {
                symbols.remove(name);
            }
        }
    }

    /// `node` itself if it is a Scope, else the Scope owned by `node` (if
    /// Module/Block/Subroutine), else `None`.
    fn nearest_scope_including(&self, node: NodeId) -> Option<NodeId> {
        match &self.node(node).kind {
            NodeKind::Scope { .. } => Some(node),
            NodeKind::Module { .. } | NodeKind::Block { .. } => {
                self.node(node).children.first().copied()
            }
            NodeKind::Subroutine { .. } => self.node(node).children.first().copied(),
            _ => None,
        }
    }

    /// The `Scope` node owned directly by a Module, Block, or Subroutine.
    /// Per spec.md §4.1: "lookup must descend through their `scope`
    /// accessor, not directly into their children" -- this is that accessor.
    pub fn scope_of(&self, node: NodeId) -> Option<NodeId> {
        match &self.node(node).kind {
            NodeKind::Module { .. } | NodeKind::Block { .. } => {
                self.node(node).children.first().copied()
            }
            NodeKind::Subroutine { .. } => self.node(node).children.first().copied(),
            NodeKind::Scope { .. } => Some(node),
            _ => None,
        }
    }

    /// Walk up from `node` to the nearest enclosing Scope (not including
    /// `node` itself unless it is already a Scope).
    pub fn enclosing_scope(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.node(node).parent;
        while let Some(id) = current {
            if matches!(self.node(id).kind, NodeKind::Scope { .. }) {
                return Some(id);
            }
            current = self.node(id).parent;
        }
        None
    }

    /// Verify the structural invariant from spec.md §8 property 1: every
    /// non-root node's parent's children list contains it, and vice versa.
    #[cfg(test)]
    pub fn check_parent_child_invariant(&self) -> bool {
        for (id, node) in self.arena.iter() {
            for &child in &node.children {
                if self.node(child).parent != Some(id) {
                    return false;
                }
            }
            if let Some(parent) = node.parent {
                if !self.node(parent).children.contains(&id) {
                    return false;
                }
            }
        }
        true
    }
}
