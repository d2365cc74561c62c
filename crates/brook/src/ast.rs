//! The resolved AST the suspension analysis operates on.
//!
//! Nodes live in per-kind arenas owned by [`Ast`] and reference each other
//! through integer handles ([`ExprId`], [`StmtId`], [`FunId`], [`VarId`],
//! [`ClassId`]). Back-references like a capture link's `parent_var` are
//! plain optional handles, so the shared-node graphs that closures produce
//! need no interior mutability and serialize cleanly.
//!
//! The resolution phase builds this structure and guarantees the contracts
//! documented on each field (identifiers linked to their binding `VarDecl`,
//! functions linked to descriptors, owner chains populated). The analysis
//! mutates only `may_suspend` flags and the per-function capture tables.

use indexmap::IndexMap;

use crate::{
    descriptor::{DescriptorId, DescriptorTable},
    diag::CodeRange,
    intern::{Interner, StringId},
};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect(concat!(stringify!($name), " overflowed u32")))
            }

            /// Returns the raw index value.
            #[inline]
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Handle for an expression node in the [`Ast`] arena.
    ExprId
);
arena_id!(
    /// Handle for a statement node in the [`Ast`] arena.
    StmtId
);
arena_id!(
    /// Handle for a function declaration in the [`Ast`] arena.
    FunId
);
arena_id!(
    /// Handle for a variable declaration in the [`Ast`] arena.
    VarId
);
arena_id!(
    /// Handle for a class declaration in the [`Ast`] arena.
    ClassId
);

/// Static type of an expression or declaration.
///
/// Brook is optionally typed: `Any` is the top of the lattice and is
/// assigned wherever resolution could not infer anything more precise. The
/// analysis only distinguishes `Any`, user-class instances, and the
/// container types whose implicit coercion into an instance invokes that
/// class's initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Type {
    /// Statically unknown; the universal type.
    #[default]
    Any,
    Bool,
    Int,
    Num,
    Str,
    List,
    Map,
    /// A first-class function or closure value.
    Function,
    /// An instance of a user-defined class.
    Instance(ClassId),
}

/// A literal constant in source.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Num(f64),
    /// An interned string literal.
    Str(StringId),
}

/// Binary operators. The analysis never evaluates these; they exist so the
/// walker can recurse into operand structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Target of a function call expression.
///
/// Host builtins are resolved to their descriptor during resolution and
/// never have an AST body; everything else is an arbitrary callee
/// expression (a name bound to a function, a closure literal, a call that
/// returns a function) that the call-target resolver inspects statically.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum Callee {
    /// A host-registered builtin, e.g. `sleep` or `checkpoint`.
    Builtin(DescriptorId),
    /// An expression evaluating to a callable.
    Expr(ExprId),
}

/// One entry in a map literal.
///
/// Named-argument invocation passes a single map literal whose keys are all
/// literal strings; the call-site classifier needs those keys statically,
/// so literal-string keys are kept distinct from computed key expressions.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum MapKey {
    /// A literal string key, e.g. `[name: expr]`.
    Str(StringId),
    /// A computed key expression, e.g. `[(prefix + k): expr]`.
    Expr(ExprId),
}

/// An expression node.
///
/// `may_suspend` defaults to false and is set by the analysis; `node_type`
/// is the declared/inferred type from resolution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Expr {
    pub position: CodeRange,
    pub node_type: Type,
    /// Set by the analysis when evaluating this expression may suspend.
    pub may_suspend: bool,
    pub kind: ExprKind,
}

/// Expression node kinds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    /// A placeholder expression (e.g. an omitted optional argument).
    Noop,
    /// An identifier, linked to its binding declaration by resolution.
    Name(VarId),
    /// Field access `object.field`, or `object.(expr)`-style dynamic access
    /// when `field` is `None`.
    ///
    /// `auto_create` is set on the left-hand path of an assignment like
    /// `a.b.c = v` where missing intermediate fields are created on the
    /// fly. When the created field is a user-class instance, that creation
    /// runs the class initializer.
    Field {
        object: ExprId,
        field: Option<StringId>,
        auto_create: bool,
    },
    Binary {
        left: ExprId,
        op: BinaryOp,
        right: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    /// Conditional expression `test ? if_true : if_false`.
    Ternary {
        test: ExprId,
        if_true: ExprId,
        if_false: ExprId,
    },
    /// Explicit cast `(Type)expr`.
    Cast {
        expr: ExprId,
        target: Type,
    },
    /// Regex match `target =~ pattern`.
    RegexMatch {
        target: ExprId,
        pattern: ExprId,
    },
    /// Regex substitution `target =~ s/pattern/replacement/`.
    RegexSubst {
        target: ExprId,
        pattern: ExprId,
        replacement: ExprId,
    },
    ListLit(Vec<ExprId>),
    MapLit(Vec<(MapKey, ExprId)>),
    /// Interpolated string; parts alternate literal and embedded expressions.
    InterpString(Vec<ExprId>),
    /// Indexed access `object[index]`.
    Index {
        object: ExprId,
        index: ExprId,
    },
    /// Length-of `object.size()` lowered form.
    Len {
        object: ExprId,
    },
    /// Function call through a callee expression or a builtin descriptor.
    Call {
        callee: Callee,
        args: Vec<ExprId>,
    },
    /// Method call `receiver.method(args)`.
    ///
    /// `descriptor` is `None` when resolution could not bind the method
    /// statically (dynamic dispatch); such calls are treated as worst-case
    /// by the analysis.
    MethodCall {
        receiver: ExprId,
        method: StringId,
        descriptor: Option<DescriptorId>,
        args: Vec<ExprId>,
    },
    /// Direct constructor invocation `new C(args)`.
    InvokeInit {
        class: ClassId,
        args: Vec<ExprId>,
    },
    /// Runtime evaluation of a source string. The evaluated script's
    /// asyncness is unknowable at compile time, so this always suspends.
    Eval {
        source: ExprId,
    },
    /// A closure literal; the inner function declaration holds the body.
    Closure(FunId),
    /// Assignment to a variable, `target = value`.
    VarAssign {
        target: VarId,
        value: ExprId,
    },
    /// Assignment to a field, `object.field = value`.
    ///
    /// `field_type` is the declared type of the assigned field (`Any` when
    /// unknown); assigning a structured literal to an instance-typed field
    /// coerces through the class initializer.
    FieldAssign {
        object: ExprId,
        field: Option<StringId>,
        field_type: Type,
        value: ExprId,
    },
    /// Coercion of a `Map`/`List` value into a class instance, emitted
    /// inside initializer wrappers. Always consults the target initializer.
    ConvertTo {
        source: ExprId,
        class: ClassId,
    },
    /// A bare type expression, e.g. in `instanceof` position.
    TypeRef(Type),
    /// A (possibly dotted) class reference.
    ClassPath(ClassId),
}

/// A statement node.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Stmt {
    pub position: CodeRange,
    /// Set by the analysis when executing this statement may suspend.
    pub may_suspend: bool,
    pub kind: StmtKind,
}

/// Statement node kinds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StmtKind {
    Expr(ExprId),
    /// A variable declaration; the declared [`VarDecl`] carries the
    /// initializer expression.
    VarDecl(VarId),
    /// A function declaration statement.
    FunDecl(FunId),
    Block(Vec<StmtId>),
    If {
        test: ExprId,
        then_block: Vec<StmtId>,
        else_block: Vec<StmtId>,
    },
    While {
        test: ExprId,
        body: Vec<StmtId>,
    },
    /// Return with an explicit expression (resolution inserts a null
    /// literal for bare `return`).
    Return(ExprId),
    Break,
    Continue,
    Switch {
        subject: ExprId,
        cases: Vec<SwitchCase>,
    },
}

/// One arm of a switch statement.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SwitchCase {
    pub patterns: Vec<Pattern>,
    pub body: Vec<StmtId>,
}

/// A switch-case pattern.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    /// Match against the value of an expression.
    Expr(ExprId),
    /// Destructuring constructor pattern `C(p1, p2, ...)`.
    Constructor { class: ClassId, fields: Vec<Pattern> },
    /// The `_` wildcard.
    Wildcard,
}

/// A variable declaration, including the synthetic capture-chain links the
/// analysis inserts into enclosing functions.
///
/// For an ordinary declaration only `initializer`/`bound_fun` are
/// interesting. A capture link has `origin_var` pointing at the defining
/// declaration and `parent_var` pointing one hop outward (the next link, or
/// the defining declaration itself from the outermost link).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VarDecl {
    pub position: CodeRange,
    pub name: StringId,
    /// Never reassigned after initialization (set by resolution).
    pub is_final: bool,
    pub declared_type: Type,
    pub initializer: Option<ExprId>,
    /// Set when the binding directly names a function declaration, e.g.
    /// `def f = { ... }` or a function-declaration statement's implicit
    /// binding.
    pub bound_fun: Option<FunId>,
    /// For capture links: the defining declaration this link gives access to.
    pub origin_var: Option<VarId>,
    /// For capture links: the next link up the nesting chain.
    pub parent_var: Option<VarId>,
    /// The function whose scope declares this variable.
    pub owner: FunId,
}

/// A function declaration.
///
/// Every user-visible function has two declarations: the real body, and a
/// `wrapper` adapter that implements varargs/named-argument/default-value
/// invocation by calling into the real body. The wrapper's body contains
/// the real declaration nested inside it, so walking the wrapper reaches
/// both.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunDecl {
    pub name: StringId,
    pub descriptor: DescriptorId,
    pub params: Vec<VarId>,
    pub return_type: Type,
    pub body: Vec<StmtId>,
    /// The varargs/named-args adapter, absent for wrappers themselves and
    /// for synthetic functions that are only ever called directly.
    pub wrapper: Option<FunId>,
    /// Lexical parent; `None` only for the top-level script body.
    pub owner: Option<FunId>,
    /// Variables closed over, keyed by the defining declaration and mapping
    /// to this function's local capture link. Ordered: codegen assigns
    /// capture slots in insertion order.
    pub captures: IndexMap<VarId, VarId>,
}

impl VarDecl {
    /// Creates a plain final declaration of type `Any` with no initializer;
    /// callers adjust fields for anything richer.
    #[must_use]
    pub fn new(position: CodeRange, name: StringId, owner: FunId) -> Self {
        Self {
            position,
            name,
            is_final: true,
            declared_type: Type::Any,
            initializer: None,
            bound_fun: None,
            origin_var: None,
            parent_var: None,
            owner,
        }
    }
}

impl FunDecl {
    /// Creates a declaration with an empty body and no wrapper; the body is
    /// filled in once its statements exist.
    #[must_use]
    pub fn new(name: StringId, descriptor: DescriptorId, owner: Option<FunId>) -> Self {
        Self {
            name,
            descriptor,
            params: Vec::new(),
            return_type: Type::Any,
            body: Vec::new(),
            wrapper: None,
            owner,
            captures: IndexMap::new(),
        }
    }
}

/// A class declaration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Class {
    pub name: StringId,
    /// Descriptor of the class initializer (a synthetic default when the
    /// source declares none).
    pub init_descriptor: DescriptorId,
    /// Methods, including the initializer and the top-level script body for
    /// the root class. Real declarations only: wrappers are reached through
    /// their function's `wrapper` link, never listed here.
    pub methods: Vec<FunId>,
    pub inner_classes: Vec<ClassId>,
}

/// Arena storage for all AST nodes of one compilation unit.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    funs: Vec<FunDecl>,
    vars: Vec<VarDecl>,
    classes: Vec<Class>,
}

impl Ast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expression with `may_suspend` unset.
    pub fn add_expr(&mut self, position: CodeRange, node_type: Type, kind: ExprKind) -> ExprId {
        let id = ExprId::new(self.exprs.len());
        self.exprs.push(Expr {
            position,
            node_type,
            may_suspend: false,
            kind,
        });
        id
    }

    /// Adds a statement with `may_suspend` unset.
    pub fn add_stmt(&mut self, position: CodeRange, kind: StmtKind) -> StmtId {
        let id = StmtId::new(self.stmts.len());
        self.stmts.push(Stmt {
            position,
            may_suspend: false,
            kind,
        });
        id
    }

    pub fn add_fun(&mut self, fun: FunDecl) -> FunId {
        let id = FunId::new(self.funs.len());
        self.funs.push(fun);
        id
    }

    pub fn add_var(&mut self, var: VarDecl) -> VarId {
        let id = VarId::new(self.vars.len());
        self.vars.push(var);
        id
    }

    pub fn add_class(&mut self, class: Class) -> ClassId {
        let id = ClassId::new(self.classes.len());
        self.classes.push(class);
        id
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    #[must_use]
    pub fn fun(&self, id: FunId) -> &FunDecl {
        &self.funs[id.index()]
    }

    pub fn fun_mut(&mut self, id: FunId) -> &mut FunDecl {
        &mut self.funs[id.index()]
    }

    #[must_use]
    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VarDecl {
        &mut self.vars[id.index()]
    }

    #[must_use]
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    /// Creates a capture-chain link in `owner` giving access to `origin`,
    /// with `parent` pointing one hop outward.
    ///
    /// Links copy the defining declaration's name, finality and type so the
    /// call-target resolver and arg classifier can follow chains without
    /// special cases.
    pub fn new_capture_link(&mut self, owner: FunId, origin: VarId, parent: VarId) -> VarId {
        let origin_decl = self.var(origin);
        let link = VarDecl {
            position: origin_decl.position,
            name: origin_decl.name,
            is_final: origin_decl.is_final,
            declared_type: origin_decl.declared_type,
            initializer: None,
            bound_fun: None,
            origin_var: Some(origin),
            parent_var: Some(parent),
            owner,
        };
        self.add_var(link)
    }

    /// Number of expression nodes (used by tests to assert the walker
    /// visited everything).
    #[must_use]
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    #[must_use]
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    /// Iterates over all statements with their ids.
    pub fn stmts(&self) -> impl Iterator<Item = (StmtId, &Stmt)> {
        self.stmts.iter().enumerate().map(|(i, s)| (StmtId::new(i), s))
    }

    /// Iterates over all expressions with their ids.
    pub fn exprs(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.exprs.iter().enumerate().map(|(i, e)| (ExprId::new(i), e))
    }

    /// Iterates over all function declarations with their ids.
    pub fn funs(&self) -> impl Iterator<Item = (FunId, &FunDecl)> {
        self.funs.iter().enumerate().map(|(i, f)| (FunId::new(i), f))
    }
}

/// A fully resolved compilation unit: the input contract of the analysis.
///
/// Owned by the compiler driver; the analysis borrows it mutably for the
/// duration of one run and mutates only suspension marks, descriptor
/// asyncness, and capture tables.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResolvedUnit {
    pub interner: Interner,
    pub descriptors: DescriptorTable,
    pub ast: Ast,
    /// The top-level class/script declaration the walker starts from.
    pub root_class: ClassId,
}
