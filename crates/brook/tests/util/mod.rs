//! Shared scaffolding for constructing resolved units in tests.
//!
//! The real toolchain's resolution phase produces [`ResolvedUnit`]s; tests
//! build equivalent structures directly so each scenario states exactly the
//! bindings, finality, and descriptor state it depends on.
#![allow(dead_code, reason = "shared across test binaries; each uses a subset")]

use brook::{
    Ast, Asyncness, Callee, Class, ClassId, CodeLoc, CodeRange, DescriptorId, DescriptorTable, ExprId, ExprKind,
    FunDecl, FunId, FunctionDescriptor, Interner, Literal, ResolvedUnit, StmtId, StmtKind, StringId, Type, VarDecl,
    VarId,
};

/// Builds one resolved unit. The top-level script body (`script`) exists
/// from the start and owns module-level bindings.
pub struct UnitBuilder {
    pub interner: Interner,
    pub descriptors: DescriptorTable,
    pub ast: Ast,
    pub script: FunId,
    filename: StringId,
    next_line: u32,
}

impl UnitBuilder {
    pub fn new() -> Self {
        let mut interner = Interner::new();
        let filename = interner.intern("test.brk");
        let mut descriptors = DescriptorTable::new();
        let mut ast = Ast::new();
        let script_name = interner.intern("<script>");
        let descriptor = descriptors.add(FunctionDescriptor::script(script_name, None, vec![]));
        let script = ast.add_fun(FunDecl::new(script_name, descriptor, None));
        Self {
            interner,
            descriptors,
            ast,
            script,
            filename,
            next_line: 1,
        }
    }

    /// A fresh single-line range; each call advances one line so every node
    /// gets a distinct, recognizable position.
    pub fn pos(&mut self) -> CodeRange {
        let line = self.next_line;
        self.next_line += 1;
        CodeRange::new(self.filename, CodeLoc::new(line, 0), CodeLoc::new(line, 40))
    }

    // ------------------------------------------------------------------
    // Descriptors and declarations

    pub fn builtin(&mut self, name: &str, asyncness: Asyncness, async_args: &[usize]) -> DescriptorId {
        let name = self.interner.intern(name);
        self.descriptors
            .add(FunctionDescriptor::builtin(name, asyncness, async_args.iter().copied()))
    }

    /// A builtin with parameter names, for named-argument invocation tests.
    pub fn builtin_with_params(
        &mut self,
        name: &str,
        asyncness: Asyncness,
        async_args: &[usize],
        params: &[&str],
    ) -> DescriptorId {
        let id = self.builtin(name, asyncness, async_args);
        let param_names: Vec<StringId> = params.iter().map(|p| self.interner.intern(p)).collect();
        self.descriptors.get_mut(id).param_names = param_names;
        id
    }

    /// Declares a script function (or closure) with an empty body.
    pub fn fun(&mut self, name: &str, owner: Option<FunId>) -> FunId {
        let name_id = self.interner.intern(name);
        let descriptor = self.descriptors.add(FunctionDescriptor::script(name_id, None, vec![]));
        self.ast.add_fun(FunDecl::new(name_id, descriptor, owner))
    }

    /// Declares a method owned by the named class.
    pub fn method(&mut self, name: &str, class_name: &str, owner: Option<FunId>) -> FunId {
        let name_id = self.interner.intern(name);
        let class_id = self.interner.intern(class_name);
        let descriptor = self
            .descriptors
            .add(FunctionDescriptor::script(name_id, Some(class_id), vec![]));
        self.ast.add_fun(FunDecl::new(name_id, descriptor, owner))
    }

    pub fn set_body(&mut self, fun: FunId, body: Vec<StmtId>) {
        self.ast.fun_mut(fun).body = body;
    }

    /// Adds a parameter declaration to a function (final, as resolution
    /// marks parameters that are never reassigned).
    pub fn param(&mut self, fun: FunId, name: &str, ty: Type) -> VarId {
        let position = self.pos();
        let name_id = self.interner.intern(name);
        let mut decl = VarDecl::new(position, name_id, fun);
        decl.declared_type = ty;
        let var = self.ast.add_var(decl);
        self.ast.fun_mut(fun).params.push(var);
        let descriptor = self.ast.fun(fun).descriptor;
        self.descriptors.get_mut(descriptor).param_names.push(name_id);
        var
    }

    /// A local variable declaration.
    pub fn var(&mut self, owner: FunId, name: &str, is_final: bool, ty: Type) -> VarId {
        let position = self.pos();
        let name_id = self.interner.intern(name);
        let mut decl = VarDecl::new(position, name_id, owner);
        decl.is_final = is_final;
        decl.declared_type = ty;
        self.ast.add_var(decl)
    }

    /// The final binding resolution creates for a function declaration, so
    /// calls by name resolve to the concrete declaration.
    pub fn fun_binding(&mut self, owner: FunId, fun: FunId) -> VarId {
        let position = self.pos();
        let name = self.ast.fun(fun).name;
        let mut decl = VarDecl::new(position, name, owner);
        decl.declared_type = Type::Function;
        decl.bound_fun = Some(fun);
        self.ast.add_var(decl)
    }

    /// Registers a direct lexical capture of `origin` in `fun`, the way
    /// resolution seeds capture tables before analysis threads them.
    pub fn capture(&mut self, fun: FunId, origin: VarId) -> VarId {
        let link = self.ast.new_capture_link(fun, origin, origin);
        self.ast.fun_mut(fun).captures.insert(origin, link);
        link
    }

    // ------------------------------------------------------------------
    // Expressions

    pub fn expr(&mut self, ty: Type, kind: ExprKind) -> ExprId {
        let position = self.pos();
        self.ast.add_expr(position, ty, kind)
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.expr(Type::Int, ExprKind::Literal(Literal::Int(value)))
    }

    pub fn null(&mut self) -> ExprId {
        self.expr(Type::Any, ExprKind::Literal(Literal::Null))
    }

    pub fn name(&mut self, var: VarId) -> ExprId {
        let ty = self.ast.var(var).declared_type;
        self.expr(ty, ExprKind::Name(var))
    }

    pub fn closure(&mut self, fun: FunId) -> ExprId {
        self.expr(Type::Function, ExprKind::Closure(fun))
    }

    pub fn call_builtin(&mut self, descriptor: DescriptorId, args: Vec<ExprId>) -> ExprId {
        self.expr(
            Type::Any,
            ExprKind::Call {
                callee: Callee::Builtin(descriptor),
                args,
            },
        )
    }

    pub fn call_name(&mut self, var: VarId, args: Vec<ExprId>) -> ExprId {
        let callee = self.name(var);
        self.expr(
            Type::Any,
            ExprKind::Call {
                callee: Callee::Expr(callee),
                args,
            },
        )
    }

    pub fn method_call(
        &mut self,
        receiver: ExprId,
        method: &str,
        descriptor: Option<DescriptorId>,
        args: Vec<ExprId>,
    ) -> ExprId {
        let method = self.interner.intern(method);
        self.expr(
            Type::Any,
            ExprKind::MethodCall {
                receiver,
                method,
                descriptor,
                args,
            },
        )
    }

    // ------------------------------------------------------------------
    // Statements

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let position = self.pos();
        self.ast.add_stmt(position, kind)
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn return_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Return(expr))
    }

    // ------------------------------------------------------------------
    // Classes and completion

    /// A class whose initializer is the given method (listed in `methods`).
    pub fn class_with_init(&mut self, name: &str, init: FunId, methods: Vec<FunId>) -> ClassId {
        let name = self.interner.intern(name);
        let init_descriptor = self.ast.fun(init).descriptor;
        self.ast.add_class(Class {
            name,
            init_descriptor,
            methods,
            inner_classes: vec![],
        })
    }

    /// A class with the synthetic do-nothing initializer.
    pub fn class(&mut self, name: &str, methods: Vec<FunId>) -> ClassId {
        let init_descriptor = self.builtin("init", Asyncness::Sync, &[]);
        let name = self.interner.intern(name);
        self.ast.add_class(Class {
            name,
            init_descriptor,
            methods,
            inner_classes: vec![],
        })
    }

    /// Builds the root class around the script body plus `methods`, with
    /// `inner` as nested class declarations.
    pub fn finish_with(mut self, methods: Vec<FunId>, inner: Vec<ClassId>) -> ResolvedUnit {
        let init_descriptor = self.builtin("init", Asyncness::Sync, &[]);
        let name = self.interner.intern("Script");
        let mut all_methods = vec![self.script];
        all_methods.extend(methods);
        let root_class = self.ast.add_class(Class {
            name,
            init_descriptor,
            methods: all_methods,
            inner_classes: inner,
        });
        ResolvedUnit {
            interner: self.interner,
            descriptors: self.descriptors,
            ast: self.ast,
            root_class,
        }
    }

    pub fn finish(self, methods: Vec<FunId>) -> ResolvedUnit {
        self.finish_with(methods, vec![])
    }
}

/// Asyncness of the descriptor behind a function declaration.
pub fn asyncness_of(unit: &ResolvedUnit, fun: FunId) -> Asyncness {
    unit.descriptors.get(unit.ast.fun(fun).descriptor).asyncness()
}

/// `may_suspend` of an expression node.
pub fn suspends(unit: &ResolvedUnit, expr: ExprId) -> bool {
    unit.ast.expr(expr).may_suspend
}
