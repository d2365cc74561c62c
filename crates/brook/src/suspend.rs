//! The suspension analysis: decides, for every function and call site,
//! whether execution may suspend.
//!
//! Call sites that may suspend are compiled with continuation-capture
//! scaffolding (operand state spilled into local slots), so over-marking
//! costs performance and under-marking breaks resumption. The analysis
//! therefore computes the exact answer the call-site rules define, as a
//! whole-program fixed point over the (possibly mutually recursive) call
//! graph.
//!
//! # Passes
//!
//! 1. **Collect**: a full depth-first walk of the root class. Everything
//!    directly provable is marked as it is found; calls to callees whose
//!    asyncness is still [`Asyncness::Unknown`] record a dependency edge
//!    instead of a verdict.
//! 2. **Fixed point**: recorded edges are iterated until no further call
//!    site can be marked, then every descriptor still undecided is
//!    finalized sync — no proof of suspension was found anywhere in its
//!    transitive reach.
//! 3. **Finalize**: a second full walk with all callee asyncness known,
//!    producing the final per-node `may_suspend` marks consumed by the
//!    code generator.
//!
//! Alongside the asyncness computation, the walk threads variables captured
//! by resolved callees through the caller's capture table and up the
//! lexical nesting chain, so every closure reference becomes an explicit
//! chain of single-hop indirections.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    ast::{
        Ast, Callee, ClassId, ExprId, ExprKind, FunId, Literal, MapKey, Pattern, ResolvedUnit, StmtId, StmtKind,
        SwitchCase, Type, VarId,
    },
    descriptor::{Asyncness, DescriptorId, DescriptorTable, FunctionDescriptor},
    diag::CompileError,
    intern::{Interner, StringId},
    tracer::{NoopTracer, SuspendTracer},
};

/// Name of the reserved stringification method.
///
/// Stringification is invoked from contexts that cannot capture a
/// continuation, so a `toString` body reaching a suspension point is a
/// compile error rather than a silent demotion.
pub const STRINGIFY_METHOD: &str = "toString";

/// Analysis configuration.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct AnalyzeOptions {
    /// Test hook: treat every call site as suspending and every analysed
    /// function as async, short-circuiting the dependency graph. Used for
    /// fault-injection tests of the continuation machinery. While set, the
    /// stringifier restriction is not enforced.
    pub force_all_async: bool,
    /// Allow field auto-creation paths (`a.b.c = v` creating missing
    /// intermediates) to run user-class initializers, which makes the
    /// auto-creating expression a potential suspension point.
    pub async_initializers_on_autocreate: bool,
}

/// Which of the two walks is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// First walk: mark direct origins, record dependency edges.
    Collect,
    /// Second walk: all callees decided, produce final marks.
    Finalize,
}

/// Why a node was marked as a direct suspension origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MarkReason {
    /// The callee could not be statically resolved; worst case assumed.
    UnresolvedCallee,
    /// The callee is known async (unconditionally).
    AsyncCallee,
    /// The callee is async-per-argument and an async argument was passed.
    AsyncArgument,
    /// Runtime evaluation of a source string.
    Eval,
    /// An implicitly invoked class initializer is async.
    InitMethod,
    /// Field auto-creation with a statically unknown field name or type.
    AutoCreate,
    /// The `force_all_async` test hook is set.
    Forced,
}

/// Counters returned by [`analyze`] so embedders and tests can observe
/// convergence without attaching a tracer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisSummary {
    /// Function bodies walked in the collect pass (wrappers included).
    pub functions_analyzed: usize,
    /// Nodes marked as direct suspension origins across both passes and
    /// the fixed point.
    pub sites_marked: usize,
    /// Rounds the fixed-point loop ran, including the final no-progress
    /// round.
    pub fixpoint_rounds: usize,
}

/// A forward-reference edge recorded in the collect pass: `site` cannot be
/// classified until `callee`'s asyncness is decided.
#[derive(Debug, Clone, Copy)]
struct DepEdge {
    site: ExprId,
    callee: DescriptorId,
}

/// Runs the analysis over a resolved unit with no tracing.
///
/// On success every reachable descriptor is decided, every expression and
/// statement carries its final `may_suspend` mark, and capture tables are
/// complete. The unit is left partially marked on error; compilation of
/// the unit must be abandoned.
pub fn analyze(unit: &mut ResolvedUnit, options: &AnalyzeOptions) -> Result<AnalysisSummary, CompileError> {
    analyze_traced(unit, options, &mut NoopTracer)
}

/// Runs the analysis with a caller-supplied trace sink.
///
/// Passing [`crate::tracer::StderrTracer`] gives a human-readable decision
/// log; [`crate::tracer::RecordingTracer`] captures events for tests.
pub fn analyze_traced<Tr: SuspendTracer>(
    unit: &mut ResolvedUnit,
    options: &AnalyzeOptions,
    tracer: &mut Tr,
) -> Result<AnalysisSummary, CompileError> {
    let root = unit.root_class;
    let fun_by_descriptor: AHashMap<DescriptorId, FunId> =
        unit.ast.funs().map(|(fun, decl)| (decl.descriptor, fun)).collect();
    let mut analyzer = Analyzer {
        ast: &mut unit.ast,
        descriptors: &mut unit.descriptors,
        interner: &unit.interner,
        options,
        tracer,
        pass: Pass::Collect,
        fun_stack: Vec::new(),
        expr_stack: Vec::new(),
        stmt_stack: Vec::new(),
        deps: AHashMap::new(),
        fun_by_descriptor,
        visited: Vec::new(),
        summary: AnalysisSummary::default(),
    };
    analyzer.run(root)
}

/// State machine for one analysis run over one compilation unit.
///
/// The stacks mirror the walk: `fun_stack`'s top is the function whose body
/// is being walked (the wrapper when a wrapper is analysed on behalf of its
/// real function), and the expression/statement stacks make upward
/// propagation of `may_suspend` constant-time.
struct Analyzer<'a, Tr: SuspendTracer> {
    ast: &'a mut Ast,
    descriptors: &'a mut DescriptorTable,
    interner: &'a Interner,
    options: &'a AnalyzeOptions,
    tracer: &'a mut Tr,
    pass: Pass,
    fun_stack: Vec<FunId>,
    expr_stack: Vec<ExprId>,
    stmt_stack: Vec<StmtId>,
    /// Caller -> unresolved (site, callee) edges, drained by the fixed point.
    deps: AHashMap<FunId, SmallVec<[DepEdge; 4]>>,
    /// Reverse lookup from a descriptor to its declaration, so method calls
    /// and constructor invocations (which carry only a descriptor) reach
    /// the callee's capture table for chaining. Builtins have no
    /// declaration and are absent.
    fun_by_descriptor: AHashMap<DescriptorId, FunId>,
    /// Function bodies walked during the collect pass, in visit order.
    visited: Vec<FunId>,
    summary: AnalysisSummary,
}

impl<Tr: SuspendTracer> Analyzer<'_, Tr> {
    fn run(&mut self, root: ClassId) -> Result<AnalysisSummary, CompileError> {
        self.pass = Pass::Collect;
        self.tracer.on_pass_begin(Pass::Collect);
        self.walk_class(root)?;
        self.summary.functions_analyzed = self.visited.len();
        self.resolve_fixpoint();
        self.pass = Pass::Finalize;
        self.tracer.on_pass_begin(Pass::Finalize);
        self.walk_class(root)?;
        Ok(self.summary)
    }

    fn walk_class(&mut self, class: ClassId) -> Result<(), CompileError> {
        let (methods, inner) = {
            let class = self.ast.class(class);
            (class.methods.clone(), class.inner_classes.clone())
        };
        for method in methods {
            self.visit_fun(method)?;
        }
        for class in inner {
            self.walk_class(class)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function declarations and the wrapper duality

    /// Visits a function declaration.
    ///
    /// When the function has a varargs/named-args wrapper and we are not
    /// already inside that wrapper, the wrapper's body is analysed instead;
    /// the wrapper body contains the real declaration nested inside it, so
    /// both bodies are reached. A wrapper proven async conservatively marks
    /// the real entry async as well: a sharper analysis could distinguish
    /// the two entry points, but any direct call to the real entry is then
    /// still treated as async.
    fn visit_fun(&mut self, fun: FunId) -> Result<(), CompileError> {
        let wrapper = self.ast.fun(fun).wrapper;
        match wrapper {
            Some(wrapper) if !self.fun_stack.contains(&wrapper) => {
                self.visit_fun_body(wrapper)?;
                if self.descriptor_of(wrapper).asyncness() == Asyncness::Async {
                    self.mark_fun_async(fun);
                }
                if self.pass == Pass::Finalize {
                    let descriptor = self.ast.fun(fun).descriptor;
                    if self.descriptors.get_mut(descriptor).finalize_sync() {
                        let name = self.interner.get_str(self.ast.fun(fun).name);
                        self.tracer.on_function_sync(name);
                    }
                }
                Ok(())
            }
            _ => self.visit_fun_body(fun),
        }
    }

    fn visit_fun_body(&mut self, fun: FunId) -> Result<(), CompileError> {
        if self.pass == Pass::Collect {
            self.visited.push(fun);
        }
        if self.options.force_all_async {
            self.mark_fun_async(fun);
        }
        self.fun_stack.push(fun);
        // fresh propagation stacks: suspension inside this body must not
        // leak to the enclosing expression (a closure literal never
        // suspends by being created)
        let saved_exprs = std::mem::take(&mut self.expr_stack);
        let saved_stmts = std::mem::take(&mut self.stmt_stack);
        let body = self.ast.fun(fun).body.clone();
        let result = body.into_iter().try_for_each(|stmt| self.visit_stmt(stmt));
        self.expr_stack = saved_exprs;
        self.stmt_stack = saved_stmts;
        self.fun_stack.pop();
        result?;
        if self.pass == Pass::Finalize {
            let descriptor = self.ast.fun(fun).descriptor;
            if self.descriptors.get_mut(descriptor).finalize_sync() {
                let name = self.interner.get_str(self.ast.fun(fun).name);
                self.tracer.on_function_sync(name);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statement walk

    fn visit_stmt(&mut self, stmt: StmtId) -> Result<(), CompileError> {
        self.stmt_stack.push(stmt);
        let result = self.dispatch_stmt(stmt);
        self.stmt_stack.pop();
        result
    }

    fn dispatch_stmt(&mut self, stmt: StmtId) -> Result<(), CompileError> {
        let kind = self.ast.stmt(stmt).kind.clone();
        match kind {
            StmtKind::Expr(expr) => self.visit_expr(expr),
            StmtKind::VarDecl(var) => self.visit_var_decl(var),
            StmtKind::FunDecl(fun) => self.visit_fun(fun),
            StmtKind::Block(stmts) => stmts.into_iter().try_for_each(|s| self.visit_stmt(s)),
            StmtKind::If {
                test,
                then_block,
                else_block,
            } => {
                self.visit_expr(test)?;
                then_block.into_iter().try_for_each(|s| self.visit_stmt(s))?;
                else_block.into_iter().try_for_each(|s| self.visit_stmt(s))
            }
            StmtKind::While { test, body } => {
                self.visit_expr(test)?;
                body.into_iter().try_for_each(|s| self.visit_stmt(s))
            }
            StmtKind::Return(expr) => {
                self.visit_expr(expr)?;
                self.check_return_coercion(expr)
            }
            StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::Switch { subject, cases } => {
                self.visit_expr(subject)?;
                cases.into_iter().try_for_each(|case| self.visit_switch_case(case))
            }
        }
    }

    fn visit_switch_case(&mut self, case: SwitchCase) -> Result<(), CompileError> {
        for pattern in case.patterns {
            self.visit_pattern(pattern)?;
        }
        case.body.into_iter().try_for_each(|s| self.visit_stmt(s))
    }

    fn visit_pattern(&mut self, pattern: Pattern) -> Result<(), CompileError> {
        match pattern {
            Pattern::Expr(expr) => self.visit_expr(expr),
            Pattern::Constructor { fields, .. } => fields.into_iter().try_for_each(|p| self.visit_pattern(p)),
            Pattern::Wildcard => Ok(()),
        }
    }

    /// Visits a variable declaration's initializer.
    ///
    /// Declaring an instance-typed variable with a non-null initializer
    /// behaves like an assignment: the implicit coercion consults the
    /// class initializer.
    fn visit_var_decl(&mut self, var: VarId) -> Result<(), CompileError> {
        let Some(init) = self.ast.var(var).initializer else {
            return Ok(());
        };
        self.visit_expr(init)?;
        if let Type::Instance(class) = self.ast.var(var).declared_type
            && !self.is_null_literal(init)
        {
            self.init_method_check(class, init)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expression walk

    /// Visits one expression, then propagates `may_suspend` to the parent
    /// expression (if any) and the innermost enclosing statement, and
    /// records the enclosing function as async.
    fn visit_expr(&mut self, expr: ExprId) -> Result<(), CompileError> {
        self.expr_stack.push(expr);
        let result = self.dispatch_expr(expr);
        self.expr_stack.pop();
        result?;
        if self.ast.expr(expr).may_suspend {
            if let Some(&parent) = self.expr_stack.last() {
                self.ast.expr_mut(parent).may_suspend = true;
            }
            if let Some(&stmt) = self.stmt_stack.last() {
                self.ast.stmt_mut(stmt).may_suspend = true;
            }
            if let Some(&fun) = self.fun_stack.last() {
                self.mark_fun_async(fun);
            }
        }
        Ok(())
    }

    fn dispatch_expr(&mut self, expr: ExprId) -> Result<(), CompileError> {
        let kind = self.ast.expr(expr).kind.clone();
        match kind {
            ExprKind::Literal(_)
            | ExprKind::Noop
            | ExprKind::Name(_)
            | ExprKind::TypeRef(_)
            | ExprKind::ClassPath(_) => Ok(()),
            ExprKind::Field {
                object,
                field,
                auto_create,
            } => {
                self.visit_expr(object)?;
                if auto_create && self.options.async_initializers_on_autocreate {
                    match self.ast.expr(expr).node_type {
                        Type::Instance(class) => self.init_method_check(class, expr)?,
                        // statically unknown field type: worst case
                        Type::Any => self.mark_origin(expr, MarkReason::AutoCreate),
                        _ => {}
                    }
                    if field.is_none() {
                        // statically unknown field name: worst case
                        self.mark_origin(expr, MarkReason::AutoCreate);
                    }
                }
                Ok(())
            }
            ExprKind::Binary { left, right, .. } => {
                self.visit_expr(left)?;
                self.visit_expr(right)
            }
            ExprKind::Unary { operand, .. } => self.visit_expr(operand),
            ExprKind::Ternary {
                test,
                if_true,
                if_false,
            } => {
                self.visit_expr(test)?;
                self.visit_expr(if_true)?;
                self.visit_expr(if_false)
            }
            ExprKind::Cast { expr: inner, .. } => self.visit_expr(inner),
            ExprKind::RegexMatch { target, pattern } => {
                self.visit_expr(target)?;
                self.visit_expr(pattern)
            }
            ExprKind::RegexSubst {
                target,
                pattern,
                replacement,
            } => {
                self.visit_expr(target)?;
                self.visit_expr(pattern)?;
                self.visit_expr(replacement)
            }
            ExprKind::ListLit(items) | ExprKind::InterpString(items) => {
                items.into_iter().try_for_each(|item| self.visit_expr(item))
            }
            ExprKind::MapLit(entries) => entries.into_iter().try_for_each(|(key, value)| {
                if let MapKey::Expr(key) = key {
                    self.visit_expr(key)?;
                }
                self.visit_expr(value)
            }),
            ExprKind::Index { object, index } => {
                self.visit_expr(object)?;
                self.visit_expr(index)
            }
            ExprKind::Len { object } => self.visit_expr(object),
            ExprKind::Call { callee, args } => self.handle_call(expr, callee, &args),
            ExprKind::MethodCall {
                receiver,
                descriptor,
                args,
                ..
            } => self.handle_method_call(expr, receiver, descriptor, &args),
            ExprKind::InvokeInit { class, args } => self.handle_invoke_init(expr, class, &args),
            ExprKind::Eval { source } => {
                self.visit_expr(source)?;
                // the evaluated script's asyncness is unknowable at compile time
                self.mark_origin(expr, MarkReason::Eval);
                Ok(())
            }
            ExprKind::Closure(fun) => self.visit_fun(fun),
            ExprKind::VarAssign { target, value } => {
                self.visit_expr(value)?;
                if let Type::Instance(class) = self.ast.var(target).declared_type
                    && !self.is_null_literal(value)
                {
                    self.init_method_check(class, expr)?;
                }
                Ok(())
            }
            ExprKind::FieldAssign {
                object,
                field_type,
                value,
                ..
            } => {
                self.visit_expr(object)?;
                self.visit_expr(value)?;
                if let Type::Instance(class) = field_type
                    && !self.is_null_literal(value)
                {
                    self.init_method_check(class, expr)?;
                }
                Ok(())
            }
            ExprKind::ConvertTo { source, class } => {
                self.visit_expr(source)?;
                self.init_method_check(class, expr)
            }
        }
    }

    // ------------------------------------------------------------------
    // Call-site classification

    /// Handles a function call: recurse into callee and arguments, resolve
    /// the static target, thread captures, classify.
    fn handle_call(&mut self, site: ExprId, callee: Callee, args: &[ExprId]) -> Result<(), CompileError> {
        if let Callee::Expr(callee) = callee {
            self.visit_expr(callee)?;
        }
        for &arg in args {
            self.visit_expr(arg)?;
        }
        let (descriptor, resolved) = match callee {
            Callee::Builtin(descriptor) => (Some(descriptor), None),
            Callee::Expr(callee) => match self.resolve_call_target(callee) {
                Some(fun) => (Some(self.ast.fun(fun).descriptor), Some(fun)),
                None => (None, None),
            },
        };
        if self.options.force_all_async {
            self.mark_origin(site, MarkReason::Forced);
        } else {
            self.classify_call(site, descriptor, None, args)?;
        }
        if let Some(fun) = resolved {
            self.chain_call_captures(site, fun, args)?;
        }
        Ok(())
    }

    /// Handles a method call. Resolution either bound a descriptor or left
    /// `None` for dynamic dispatch (worst case). The receiver is argument
    /// position 0 for async-per-arg callees.
    fn handle_method_call(
        &mut self,
        site: ExprId,
        receiver: ExprId,
        descriptor: Option<DescriptorId>,
        args: &[ExprId],
    ) -> Result<(), CompileError> {
        self.visit_expr(receiver)?;
        for &arg in args {
            self.visit_expr(arg)?;
        }
        if self.options.force_all_async {
            self.mark_origin(site, MarkReason::Forced);
        } else {
            self.classify_call(site, descriptor, Some(receiver), args)?;
        }
        if let Some(descriptor) = descriptor
            && let Some(&fun) = self.fun_by_descriptor.get(&descriptor)
        {
            self.chain_call_captures(site, fun, args)?;
        }
        Ok(())
    }

    /// Handles `new C(args)`: exactly a call to the class's init descriptor.
    fn handle_invoke_init(&mut self, site: ExprId, class: ClassId, args: &[ExprId]) -> Result<(), CompileError> {
        for &arg in args {
            self.visit_expr(arg)?;
        }
        let descriptor = self.ast.class(class).init_descriptor;
        if self.options.force_all_async {
            self.mark_origin(site, MarkReason::Forced);
        } else {
            self.classify_call(site, Some(descriptor), None, args)?;
        }
        if let Some(&fun) = self.fun_by_descriptor.get(&descriptor) {
            self.chain_call_captures(site, fun, args)?;
        }
        Ok(())
    }

    /// The call-site classifier: produces the verdict for one call site
    /// given the callee descriptor (or `None` when unresolved).
    fn classify_call(
        &mut self,
        site: ExprId,
        descriptor: Option<DescriptorId>,
        receiver: Option<ExprId>,
        args: &[ExprId],
    ) -> Result<(), CompileError> {
        let Some(descriptor) = descriptor else {
            // unresolvable target: must assume the worst
            return self.mark_call_site(site, MarkReason::UnresolvedCallee);
        };
        match self.descriptors.get(descriptor).asyncness() {
            Asyncness::Unknown => {
                if self.pass == Pass::Finalize {
                    return Err(CompileError::internal(
                        "call site reached an undecided callee after the fixed point",
                        self.ast.expr(site).position,
                    ));
                }
                self.record_dependency(site, descriptor)
            }
            Asyncness::Sync => Ok(()),
            Asyncness::Async => {
                let (indices, param_names) = {
                    let callee = self.descriptors.get(descriptor);
                    let mut indices: Vec<usize> = callee.async_arg_indices.iter().copied().collect();
                    indices.sort_unstable();
                    (indices, callee.param_names.clone())
                };
                if indices.is_empty() {
                    return self.mark_call_site(site, MarkReason::AsyncCallee);
                }
                for index in indices {
                    if let Some(arg) = self.arg_at(receiver, args, &param_names, index)
                        && self.arg_may_be_async(arg)
                    {
                        return self.mark_call_site(site, MarkReason::AsyncArgument);
                    }
                }
                Ok(())
            }
        }
    }

    /// Maps an async-arg index to the argument expression at that position.
    ///
    /// For method calls index 0 is the receiver and script arguments start
    /// at 1. In named-argument form (a single map literal whose keys are
    /// all literal strings), the parameter name at the position selects the
    /// expression; an absent name means the parameter defaults, which can
    /// never be async here.
    fn arg_at(
        &self,
        receiver: Option<ExprId>,
        args: &[ExprId],
        param_names: &[StringId],
        index: usize,
    ) -> Option<ExprId> {
        let position = if let Some(receiver) = receiver {
            if index == 0 {
                return Some(receiver);
            }
            index - 1
        } else {
            index
        };
        if let Some(named) = self.named_args_form(args) {
            let name = *param_names.get(position)?;
            return named.iter().find(|(key, _)| *key == name).map(|(_, value)| *value);
        }
        args.get(position).copied()
    }

    /// Recognizes named-argument invocation: a single map-literal argument
    /// whose keys are all literal strings.
    fn named_args_form(&self, args: &[ExprId]) -> Option<Vec<(StringId, ExprId)>> {
        let &[only] = args else { return None };
        let ExprKind::MapLit(entries) = &self.ast.expr(only).kind else {
            return None;
        };
        entries
            .iter()
            .map(|(key, value)| match key {
                MapKey::Str(name) => Some((*name, *value)),
                MapKey::Expr(_) => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Argument asyncness

    /// True when the argument expression might evaluate to an async
    /// function/closure value. Only consulted for async-per-arg callees.
    fn arg_may_be_async(&self, arg: ExprId) -> bool {
        let expr = self.ast.expr(arg);
        match &expr.kind {
            ExprKind::Literal(Literal::Null) | ExprKind::Noop => false,
            ExprKind::Name(var) => self.var_may_be_async(*var),
            ExprKind::Closure(fun) => self.descriptor_of(*fun).asyncness() == Asyncness::Async,
            // a call result's asyncness as a *value* is unknowable; reuse
            // the site's own verdict, which is the worst case already
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => expr.may_suspend,
            _ => expr.node_type == Type::Any,
        }
    }

    /// Classifies a binding declaration for argument asyncness.
    ///
    /// Non-final bindings are unknowable (true). Final bindings delegate to
    /// whichever of bound function, initializer, or capture origin resolves
    /// the question; the `Any`-typed fallback is conservative.
    fn var_may_be_async(&self, var: VarId) -> bool {
        let decl = self.ast.var(var);
        if !decl.is_final {
            return true;
        }
        if let Some(fun) = decl.bound_fun {
            return self.descriptor_of(fun).asyncness() == Asyncness::Async;
        }
        if let Some(init) = decl.initializer {
            return self.arg_may_be_async(init);
        }
        if let Some(origin) = decl.origin_var {
            return self.var_may_be_async(origin);
        }
        decl.declared_type == Type::Any
    }

    // ------------------------------------------------------------------
    // Call-target resolution

    /// Statically resolves a callee expression to a concrete function
    /// declaration, or `None` when the target cannot be proven.
    fn resolve_call_target(&self, callee: ExprId) -> Option<FunId> {
        match &self.ast.expr(callee).kind {
            ExprKind::Closure(fun) => Some(*fun),
            ExprKind::Name(var) => self.resolve_var_target(*var),
            _ => None,
        }
    }

    /// Follows a final-binding chain to a function declaration.
    ///
    /// Any non-final link aborts the walk: the binding could have been
    /// reassigned, so the call must be treated as potentially async.
    fn resolve_var_target(&self, var: VarId) -> Option<FunId> {
        let decl = self.ast.var(var);
        if !decl.is_final {
            return None;
        }
        if let Some(fun) = decl.bound_fun {
            return Some(fun);
        }
        if let Some(init) = decl.initializer {
            return self.resolve_call_target(init);
        }
        if let Some(parent) = decl.parent_var {
            return self.resolve_var_target(parent);
        }
        None
    }

    // ------------------------------------------------------------------
    // Implicit initializer invocation

    /// Consults a class initializer's asyncness for an operation that
    /// invokes it implicitly (auto-create, structured-literal coercion,
    /// return coercion, `ConvertTo`), marking `site` or recording a
    /// dependency edge.
    fn init_method_check(&mut self, class: ClassId, site: ExprId) -> Result<(), CompileError> {
        let descriptor = self.ast.class(class).init_descriptor;
        match self.descriptors.get(descriptor).asyncness() {
            Asyncness::Async => {
                self.mark_origin(site, MarkReason::InitMethod);
                Ok(())
            }
            Asyncness::Sync => Ok(()),
            Asyncness::Unknown => {
                if self.pass == Pass::Finalize {
                    return Err(CompileError::internal(
                        "implicit initializer invocation reached an undecided descriptor after the fixed point",
                        self.ast.expr(site).position,
                    ));
                }
                self.record_dependency(site, descriptor)
            }
        }
    }

    /// Return-statement coercion: a returned value whose type differs from
    /// an instance-typed declared return type, and is not itself castable
    /// (an instance of some class), coerces through the init method.
    fn check_return_coercion(&mut self, returned: ExprId) -> Result<(), CompileError> {
        let Some(&fun) = self.fun_stack.last() else {
            return Err(CompileError::internal(
                "return statement outside any function",
                self.ast.expr(returned).position,
            ));
        };
        let return_type = self.ast.fun(fun).return_type;
        let Type::Instance(class) = return_type else {
            return Ok(());
        };
        let value_type = self.ast.expr(returned).node_type;
        if value_type != return_type && !matches!(value_type, Type::Instance(_)) {
            self.init_method_check(class, returned)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Marking, dependencies, and the fixed point

    /// Marks a node as a direct suspension origin and propagates to the
    /// innermost enclosing statement and the current function.
    ///
    /// Parent-expression propagation is handled by [`Self::visit_expr`] on
    /// the way back up; this method also covers the post-hoc sites (return
    /// coercion, declaration initializers) that are no longer on the
    /// expression stack when the verdict lands.
    fn mark_origin(&mut self, site: ExprId, reason: MarkReason) {
        if !self.ast.expr(site).may_suspend {
            self.ast.expr_mut(site).may_suspend = true;
            self.summary.sites_marked += 1;
            if let Some(&fun) = self.fun_stack.last() {
                let name = self.interner.get_str(self.ast.fun(fun).name);
                self.tracer.on_site_marked(name, self.ast.expr(site).position, reason);
            }
        }
        if let Some(&stmt) = self.stmt_stack.last() {
            self.ast.stmt_mut(stmt).may_suspend = true;
        }
        if let Some(&fun) = self.fun_stack.last() {
            self.mark_fun_async(fun);
        }
    }

    /// Marks a call site, then enforces the stringifier restriction: a
    /// stringification method may not transitively suspend. The
    /// `force_all_async` test hook is exempt (every site would fail).
    fn mark_call_site(&mut self, site: ExprId, reason: MarkReason) -> Result<(), CompileError> {
        self.mark_origin(site, reason);
        let Some(&fun) = self.fun_stack.last() else {
            return Ok(());
        };
        let descriptor = self.descriptors.get(self.ast.fun(fun).descriptor);
        if descriptor.owner_class.is_some() && self.interner.get_str(descriptor.name) == STRINGIFY_METHOD {
            return Err(CompileError::async_stringifier(
                descriptor.name,
                self.ast.expr(site).position,
            ));
        }
        Ok(())
    }

    fn mark_fun_async(&mut self, fun: FunId) {
        let descriptor = self.ast.fun(fun).descriptor;
        if self.descriptors.get_mut(descriptor).mark_async() {
            let name = self.interner.get_str(self.ast.fun(fun).name);
            self.tracer.on_function_async(name);
        }
    }

    /// Records a forward-reference edge for the fixed point. Only legal in
    /// the collect pass.
    fn record_dependency(&mut self, site: ExprId, callee: DescriptorId) -> Result<(), CompileError> {
        let Some(&caller) = self.fun_stack.last() else {
            return Err(CompileError::internal(
                "dependency recorded outside any function",
                self.ast.expr(site).position,
            ));
        };
        self.deps.entry(caller).or_default().push(DepEdge { site, callee });
        let caller_name = self.interner.get_str(self.ast.fun(caller).name);
        let callee_name = self.interner.get_str(self.descriptors.get(callee).name);
        self.tracer.on_dependency_recorded(caller_name, callee_name);
        Ok(())
    }

    /// Iterates recorded dependency edges until no further call site can be
    /// marked async, then finalizes everything still undecided as sync.
    ///
    /// Termination: an edge is dropped as soon as its callee is decided,
    /// and a round with no decided callee makes no progress, so the loop
    /// runs at most one round per link in the longest chain of
    /// previously-unresolved callees. The closing sync-mark is sound
    /// because the surviving edges form a closed subgraph in which no
    /// function contains any directly provable suspension — the collect
    /// pass would have marked it otherwise.
    fn resolve_fixpoint(&mut self) {
        let mut round = 0;
        loop {
            round += 1;
            let mut progress = false;
            let mut marked = 0;
            let mut callers: Vec<FunId> = self.deps.keys().copied().collect();
            // deterministic drain order for stable traces
            callers.sort_unstable();
            for caller in callers {
                let Some(edges) = self.deps.remove(&caller) else { continue };
                let mut remaining: SmallVec<[DepEdge; 4]> = SmallVec::new();
                for edge in edges {
                    match self.descriptors.get(edge.callee).asyncness() {
                        Asyncness::Async => {
                            self.mark_fun_async(caller);
                            if !self.ast.expr(edge.site).may_suspend {
                                self.ast.expr_mut(edge.site).may_suspend = true;
                                self.summary.sites_marked += 1;
                                let name = self.interner.get_str(self.ast.fun(caller).name);
                                self.tracer
                                    .on_site_marked(name, self.ast.expr(edge.site).position, MarkReason::AsyncCallee);
                            }
                            progress = true;
                            marked += 1;
                        }
                        Asyncness::Sync => {}
                        Asyncness::Unknown => remaining.push(edge),
                    }
                }
                if !remaining.is_empty() {
                    self.deps.insert(caller, remaining);
                }
            }
            self.tracer.on_fixpoint_round(round, marked);
            self.summary.fixpoint_rounds = round;
            if !progress {
                break;
            }
        }
        // Close: any callee still undecided cannot be reached by a
        // suspension path.
        let leftover: Vec<DescriptorId> = {
            let mut callees: Vec<DescriptorId> = self.deps.values().flatten().map(|edge| edge.callee).collect();
            callees.sort_unstable();
            callees.dedup();
            callees
        };
        for callee in leftover {
            if self.descriptors.get_mut(callee).finalize_sync() {
                let name = self.interner.get_str(self.descriptors.get(callee).name);
                self.tracer.on_function_sync(name);
            }
        }
        self.deps.clear();
        // Wrapper asyncness resolved during the fixed point still implies
        // the real entry is async; apply before finalizing the rest.
        let visited = std::mem::take(&mut self.visited);
        for &fun in &visited {
            if let Some(wrapper) = self.ast.fun(fun).wrapper
                && self.descriptor_of(wrapper).asyncness() == Asyncness::Async
            {
                self.mark_fun_async(fun);
            }
        }
        // Totality: every function body walked in the collect pass is
        // decided before the finalize pass begins.
        for &fun in &visited {
            let descriptor = self.ast.fun(fun).descriptor;
            if self.descriptors.get_mut(descriptor).finalize_sync() {
                let name = self.interner.get_str(self.ast.fun(fun).name);
                self.tracer.on_function_sync(name);
            }
        }
        self.visited = visited;
    }

    // ------------------------------------------------------------------
    // Captured-variable chaining

    /// After resolving a call site (plain call, method call, or constructor
    /// invocation) to a concrete non-builtin callee, threads every variable
    /// the callee captures through the caller's capture table and up the
    /// nesting chain.
    ///
    /// Named-argument invocations go through the wrapper at runtime, so
    /// the wrapper's capture set is the one threaded in that case.
    fn chain_call_captures(&mut self, site: ExprId, callee: FunId, args: &[ExprId]) -> Result<(), CompileError> {
        if self.descriptors.get(self.ast.fun(callee).descriptor).is_builtin {
            return Ok(());
        }
        let target = if self.named_args_form(args).is_some() {
            self.ast.fun(callee).wrapper.unwrap_or(callee)
        } else {
            callee
        };
        let Some(&caller) = self.fun_stack.last() else {
            return Err(CompileError::internal(
                "call site outside any function",
                self.ast.expr(site).position,
            ));
        };
        if caller == target {
            return Ok(());
        }
        let origins: Vec<VarId> = self.ast.fun(target).captures.keys().copied().collect();
        for origin in origins {
            self.thread_capture(caller, origin, site)?;
        }
        Ok(())
    }

    /// Ensures `caller` (and every function between it and the defining
    /// scope) holds a capture link for `origin`, each link's `parent_var`
    /// pointing one hop outward and the outermost link pointing at the
    /// defining declaration or an existing link.
    fn thread_capture(&mut self, caller: FunId, origin: VarId, site: ExprId) -> Result<(), CompileError> {
        let origin_owner = self.ast.var(origin).owner;
        if origin_owner == caller || self.ast.fun(caller).captures.contains_key(&origin) {
            return Ok(());
        }
        let mut chain = vec![caller];
        let mut current = caller;
        let outer_target = loop {
            let Some(owner) = self.ast.fun(current).owner else {
                return Err(CompileError::internal(
                    "captured variable's defining function is not an ancestor of the caller",
                    self.ast.expr(site).position,
                ));
            };
            if owner == origin_owner {
                break origin;
            }
            if let Some(&link) = self.ast.fun(owner).captures.get(&origin) {
                break link;
            }
            chain.push(owner);
            current = owner;
        };
        let mut parent = outer_target;
        for &fun in chain.iter().rev() {
            let link = self.ast.new_capture_link(fun, origin, parent);
            self.ast.fun_mut(fun).captures.insert(origin, link);
            parent = link;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Small helpers

    fn descriptor_of(&self, fun: FunId) -> &FunctionDescriptor {
        self.descriptors.get(self.ast.fun(fun).descriptor)
    }

    fn is_null_literal(&self, expr: ExprId) -> bool {
        matches!(self.ast.expr(expr).kind, ExprKind::Literal(Literal::Null))
    }
}
