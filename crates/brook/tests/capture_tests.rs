//! Captured-variable chaining: calling a closure from a more deeply nested
//! function must thread the closure's captures through every function
//! between the caller and the defining scope, as single-hop `parent_var`
//! links.

mod util;

use brook::{analyze, AnalyzeOptions, Asyncness, ExprKind, MapKey, StmtKind, Type};
use util::UnitBuilder;

/// Calling a script-level closure from a doubly nested function inserts a
/// link in each intermediate function, chained outward to the defining
/// declaration.
#[test]
fn captures_thread_through_nesting_chain() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    // closure declared at script level, capturing x directly
    let closure = b.fun("<closure>", Some(script));
    let x_link = b.capture(closure, x);
    let x_ref = b.name(x_link);
    let closure_ret = b.return_stmt(x_ref);
    b.set_body(closure, vec![closure_ret]);
    let closure_binding = b.fun_binding(script, closure);

    // fun outer() { fun mid() { closure() } }
    let outer = b.fun("outer", Some(script));
    let mid = b.fun("mid", Some(outer));
    let call = b.call_name(closure_binding, vec![]);
    let call_stmt = b.expr_stmt(call);
    b.set_body(mid, vec![call_stmt]);
    let mid_stmt = b.stmt(StmtKind::FunDecl(mid));
    b.set_body(outer, vec![mid_stmt]);

    let mut unit = b.finish(vec![closure, outer]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    // outer holds a link pointing straight at the defining declaration
    let outer_link = *unit.ast.fun(outer).captures.get(&x).expect("outer missing link");
    assert_eq!(unit.ast.var(outer_link).origin_var, Some(x));
    assert_eq!(unit.ast.var(outer_link).parent_var, Some(x));

    // mid's link points one hop outward, at outer's link
    let mid_link = *unit.ast.fun(mid).captures.get(&x).expect("mid missing link");
    assert_eq!(unit.ast.var(mid_link).origin_var, Some(x));
    assert_eq!(unit.ast.var(mid_link).parent_var, Some(outer_link));

    // links copy name and finality from the defining declaration
    assert_eq!(unit.ast.var(mid_link).name, unit.ast.var(x).name);
    assert!(unit.ast.var(mid_link).is_final);
}

/// A caller that already owns the captured variable needs no link.
#[test]
fn owner_of_capture_needs_no_link() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    let closure = b.fun("<closure>", Some(script));
    let x_link = b.capture(closure, x);
    let x_ref = b.name(x_link);
    let closure_ret = b.return_stmt(x_ref);
    b.set_body(closure, vec![closure_ret]);
    let closure_binding = b.fun_binding(script, closure);

    // the script body itself calls the closure
    let call = b.call_name(closure_binding, vec![]);
    let call_stmt = b.expr_stmt(call);
    b.set_body(script, vec![call_stmt]);

    let mut unit = b.finish(vec![closure]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    assert!(unit.ast.fun(unit.ast.fun(closure).owner.unwrap()).captures.is_empty());
}

/// Two calls to the same closure create the chain once; the second call
/// finds the existing links and leaves them alone.
#[test]
fn chaining_is_idempotent() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    let closure = b.fun("<closure>", Some(script));
    let x_link = b.capture(closure, x);
    let x_ref = b.name(x_link);
    let closure_ret = b.return_stmt(x_ref);
    b.set_body(closure, vec![closure_ret]);
    let closure_binding = b.fun_binding(script, closure);

    let caller = b.fun("caller", Some(script));
    let first = b.call_name(closure_binding, vec![]);
    let second = b.call_name(closure_binding, vec![]);
    let first_stmt = b.expr_stmt(first);
    let second_stmt = b.expr_stmt(second);
    b.set_body(caller, vec![first_stmt, second_stmt]);

    let mut unit = b.finish(vec![closure, caller]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    assert_eq!(unit.ast.fun(caller).captures.len(), 1);
    let link = *unit.ast.fun(caller).captures.get(&x).unwrap();
    assert_eq!(unit.ast.var(link).parent_var, Some(x));
}

/// The analysed call graph is unchanged by chaining: the closure call is
/// still classified normally (sync here).
#[test]
fn chaining_does_not_affect_classification() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    let closure = b.fun("<closure>", Some(script));
    let x_link = b.capture(closure, x);
    let x_ref = b.name(x_link);
    let closure_ret = b.return_stmt(x_ref);
    b.set_body(closure, vec![closure_ret]);
    let closure_binding = b.fun_binding(script, closure);

    let caller = b.fun("caller", Some(script));
    let call = b.call_name(closure_binding, vec![]);
    let call_stmt = b.expr_stmt(call);
    b.set_body(caller, vec![call_stmt]);

    let mut unit = b.finish(vec![closure, caller]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    assert!(!unit.ast.expr(call).may_suspend);
    assert_eq!(
        unit.descriptors.get(unit.ast.fun(caller).descriptor).asyncness(),
        Asyncness::Sync
    );
}

/// Named-argument invocation goes through the wrapper at runtime, so the
/// wrapper's capture set is the one threaded to the caller. The positional
/// form goes straight to the real body, whose capture set is empty here.
#[test]
fn named_args_call_threads_wrapper_captures() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    // real body captures nothing; the wrapper does (a default-value
    // expression referencing x)
    let real = b.fun("greet", Some(script));
    let msg = b.param(real, "msg", Type::Str);
    let msg_ref = b.name(msg);
    let real_ret = b.return_stmt(msg_ref);
    b.set_body(real, vec![real_ret]);

    let wrapper = b.fun("greet", Some(script));
    b.ast.fun_mut(real).wrapper = Some(wrapper);
    b.capture(wrapper, x);
    let real_binding = b.fun_binding(script, real);
    let real_decl = b.stmt(StmtKind::FunDecl(real));
    let zero = b.int(0);
    let call_through = b.call_name(real_binding, vec![zero]);
    let wrapper_ret = b.return_stmt(call_through);
    b.set_body(wrapper, vec![real_decl, wrapper_ret]);

    // greet(msg: 42)
    let named_caller = b.fun("namedCaller", Some(script));
    let msg_name = b.interner.intern("msg");
    let value = b.int(42);
    let named = b.expr(Type::Map, ExprKind::MapLit(vec![(MapKey::Str(msg_name), value)]));
    let named_call = b.call_name(real_binding, vec![named]);
    let named_stmt = b.expr_stmt(named_call);
    b.set_body(named_caller, vec![named_stmt]);

    // greet(7)
    let positional_caller = b.fun("posCaller", Some(script));
    let seven = b.int(7);
    let positional_call = b.call_name(real_binding, vec![seven]);
    let positional_stmt = b.expr_stmt(positional_call);
    b.set_body(positional_caller, vec![positional_stmt]);

    let mut unit = b.finish(vec![real, named_caller, positional_caller]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    // the named-form caller received the wrapper's capture of x
    let link = *unit
        .ast
        .fun(named_caller)
        .captures
        .get(&x)
        .expect("wrapper capture not threaded to named-form caller");
    assert_eq!(unit.ast.var(link).origin_var, Some(x));
    assert_eq!(unit.ast.var(link).parent_var, Some(x));

    // the positional-form caller threaded the real body's (empty) set
    assert!(unit.ast.fun(positional_caller).captures.is_empty());
}

/// A method call resolved to a concrete declaration threads that
/// declaration's captures the same way a plain call does.
#[test]
fn method_call_threads_callee_captures() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    let helper = b.fun("helper", Some(script));
    let x_link = b.capture(helper, x);
    let x_ref = b.name(x_link);
    let helper_ret = b.return_stmt(x_ref);
    b.set_body(helper, vec![helper_ret]);
    let helper_descriptor = b.ast.fun(helper).descriptor;

    let caller = b.fun("caller", Some(script));
    let obj = b.param(caller, "obj", Type::Any);
    let receiver = b.name(obj);
    let call = b.method_call(receiver, "helper", Some(helper_descriptor), vec![]);
    let stmt = b.expr_stmt(call);
    b.set_body(caller, vec![stmt]);

    let mut unit = b.finish(vec![helper, caller]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    let link = *unit
        .ast
        .fun(caller)
        .captures
        .get(&x)
        .expect("method callee capture not threaded");
    assert_eq!(unit.ast.var(link).origin_var, Some(x));
    assert_eq!(unit.ast.var(link).parent_var, Some(x));
}

/// Direct constructor invocation threads the initializer's captures.
#[test]
fn invoke_init_threads_init_captures() {
    let mut b = UnitBuilder::new();
    let script = b.script;
    let x = b.var(script, "x", true, Type::Int);

    let init = b.method("init", "D", Some(script));
    let x_link = b.capture(init, x);
    let x_ref = b.name(x_link);
    let init_ret = b.return_stmt(x_ref);
    b.set_body(init, vec![init_ret]);
    let class = b.class_with_init("D", init, vec![init]);

    let caller = b.fun("caller", Some(script));
    let invoke = b.expr(Type::Instance(class), ExprKind::InvokeInit { class, args: vec![] });
    let stmt = b.expr_stmt(invoke);
    b.set_body(caller, vec![stmt]);

    let mut unit = b.finish_with(vec![caller], vec![class]);
    analyze(&mut unit, &AnalyzeOptions::default()).unwrap();

    let link = *unit
        .ast
        .fun(caller)
        .captures
        .get(&x)
        .expect("init capture not threaded");
    assert_eq!(unit.ast.var(link).origin_var, Some(x));
    assert_eq!(unit.ast.var(link).parent_var, Some(x));
}
