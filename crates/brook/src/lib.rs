#![doc = include_str!("../../../README.md")]

mod ast;
mod descriptor;
mod diag;
mod intern;
mod suspend;
pub mod tracer;

pub use crate::{
    ast::{
        Ast, BinaryOp, Callee, Class, ClassId, Expr, ExprId, ExprKind, FunDecl, FunId, Literal, MapKey, Pattern,
        ResolvedUnit, Stmt, StmtId, StmtKind, SwitchCase, Type, UnaryOp, VarDecl, VarId,
    },
    descriptor::{Asyncness, DescriptorId, DescriptorTable, FunctionDescriptor},
    diag::{CodeLoc, CodeRange, CompileError},
    intern::{Interner, StringId},
    suspend::{analyze, analyze_traced, AnalysisSummary, AnalyzeOptions, MarkReason, Pass, STRINGIFY_METHOD},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, SuspendTracer, TraceEvent},
};
