//! Analysis tracing infrastructure.
//!
//! Provides a trait-based tracing system for the suspension analysis with
//! zero-cost abstraction. When using [`NoopTracer`], all trace methods
//! compile away entirely via monomorphization.
//!
//! # Architecture
//!
//! The [`SuspendTracer`] trait defines hook points at key analysis events
//! (suspension marks, descriptor transitions, dependency recording,
//! fixed-point rounds). Concrete implementations collect different kinds of
//! data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable decision log to stderr |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem |
//!
//! The analysis is parameterized as `Analyzer<'_, Tr: SuspendTracer>`;
//! callers choose the tracer at the [`analyze_traced`](crate::suspend::analyze_traced)
//! entry point, and `debug_trace`-style behaviour is just passing
//! [`StderrTracer`] instead of [`NoopTracer`].

use crate::{
    diag::CodeRange,
    suspend::{MarkReason, Pass},
};

/// Trace event emitted during analysis.
///
/// Used by [`RecordingTracer`] to capture a full decision trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An analysis pass began.
    PassBegin { pass: Pass },
    /// A call site (or other direct suspension origin) was marked.
    SiteMarked {
        /// Name of the function whose body contains the site.
        fun: String,
        /// Source range of the marked node.
        site: CodeRange,
        /// Why the node was marked.
        reason: MarkReason,
    },
    /// A function descriptor transitioned to async.
    FunctionAsync { fun: String },
    /// A dependency edge on an undecided callee was recorded.
    DependencyRecorded { caller: String, callee: String },
    /// One round of the fixed-point loop completed.
    FixpointRound {
        round: usize,
        /// Call sites marked during this round.
        marked: usize,
    },
    /// A descriptor was finalized sync after the fixed point closed.
    FunctionSync { fun: String },
}

/// Trait for analysis tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`]
/// requires zero lines of code and compiles to zero instructions.
/// Implementations only override the hooks they care about.
pub trait SuspendTracer: std::fmt::Debug {
    /// Called when an analysis pass begins.
    #[inline(always)]
    fn on_pass_begin(&mut self, _pass: Pass) {}

    /// Called whenever a node is marked as a direct suspension origin.
    ///
    /// Upward propagation to parent expressions/statements is not traced;
    /// only the originating decision is.
    #[inline(always)]
    fn on_site_marked(&mut self, _fun: &str, _site: CodeRange, _reason: MarkReason) {}

    /// Called when a function descriptor transitions to async.
    #[inline(always)]
    fn on_function_async(&mut self, _fun: &str) {}

    /// Called when a dependency edge is recorded in pass 1.
    #[inline(always)]
    fn on_dependency_recorded(&mut self, _caller: &str, _callee: &str) {}

    /// Called after each round of the fixed-point loop.
    #[inline(always)]
    fn on_fixpoint_round(&mut self, _round: usize, _marked: usize) {}

    /// Called when the fixed-point close finalizes a descriptor as sync.
    #[inline(always)]
    fn on_function_sync(&mut self, _fun: &str) {}
}

/// The no-op tracer: all hooks compile away.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl SuspendTracer for NoopTracer {}

/// Writes one human-readable line per decision to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl SuspendTracer for StderrTracer {
    fn on_pass_begin(&mut self, pass: Pass) {
        eprintln!("[suspend] pass {pass:?}");
    }

    fn on_site_marked(&mut self, fun: &str, site: CodeRange, reason: MarkReason) {
        eprintln!("[suspend] {fun}: mark {}..{} ({reason})", site.start(), site.end());
    }

    fn on_function_async(&mut self, fun: &str) {
        eprintln!("[suspend] {fun}: async");
    }

    fn on_dependency_recorded(&mut self, caller: &str, callee: &str) {
        eprintln!("[suspend] {caller}: depends on undecided {callee}");
    }

    fn on_fixpoint_round(&mut self, round: usize, marked: usize) {
        eprintln!("[suspend] fixpoint round {round}: {marked} site(s) marked");
    }

    fn on_function_sync(&mut self, fun: &str) {
        eprintln!("[suspend] {fun}: sync (fixpoint close)");
    }
}

/// Records every event for deterministic replay or assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events in order.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer, returning the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl SuspendTracer for RecordingTracer {
    fn on_pass_begin(&mut self, pass: Pass) {
        self.events.push(TraceEvent::PassBegin { pass });
    }

    fn on_site_marked(&mut self, fun: &str, site: CodeRange, reason: MarkReason) {
        self.events.push(TraceEvent::SiteMarked {
            fun: fun.to_owned(),
            site,
            reason,
        });
    }

    fn on_function_async(&mut self, fun: &str) {
        self.events.push(TraceEvent::FunctionAsync { fun: fun.to_owned() });
    }

    fn on_dependency_recorded(&mut self, caller: &str, callee: &str) {
        self.events.push(TraceEvent::DependencyRecorded {
            caller: caller.to_owned(),
            callee: callee.to_owned(),
        });
    }

    fn on_fixpoint_round(&mut self, round: usize, marked: usize) {
        self.events.push(TraceEvent::FixpointRound { round, marked });
    }

    fn on_function_sync(&mut self, fun: &str) {
        self.events.push(TraceEvent::FunctionSync { fun: fun.to_owned() });
    }
}
