//! Per-function metadata records shared between compilation phases.
//!
//! A [`FunctionDescriptor`] is created by the resolution phase for every
//! function the compiler knows about: script functions, class methods and
//! their argument-adapter wrappers, class initializers, and host-registered
//! builtins. The suspension analysis reads most fields and writes exactly
//! one — the [`Asyncness`] cell — and only through the monotone transitions
//! enforced here.

use ahash::AHashSet;

use crate::intern::StringId;

/// Unique identifier for a function descriptor in the [`DescriptorTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DescriptorId(u32);

impl DescriptorId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("descriptor id overflowed u32"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether a function can suspend the script frame that calls it.
///
/// Starts at `Unknown` and moves through a monotone three-point lattice:
/// `Unknown` below both `Sync` and `Async`, with `Async` absorbing. Once a
/// descriptor is `Async` it never goes back; `Sync` is only assigned when
/// the fixed-point resolver has proven no suspension path exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Asyncness {
    /// Not yet decided; only legal while the first analysis pass and the
    /// fixed-point resolver are still running.
    #[default]
    Unknown,
    /// Proven to contain no reachable suspension point.
    Sync,
    /// May suspend: a suspension point is reachable from the body.
    Async,
}

impl Asyncness {
    /// True once the analysis has committed to a verdict.
    #[must_use]
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Metadata for one callable, populated by resolution and finalized by the
/// suspension analysis.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDescriptor {
    /// The function name (used for the stringifier check, traces, and errors).
    pub name: StringId,
    /// Owning class name for methods and initializers; `None` for free
    /// functions and closures.
    pub owner_class: Option<StringId>,
    /// True for host-registered functions with no script body.
    pub is_builtin: bool,
    /// True when `asyncness` was pre-set by the host (builtins, imports).
    /// The analysis treats such descriptors as immutable.
    pub is_async_predeclared: bool,
    /// Argument positions whose asyncness makes the callee itself async.
    ///
    /// Empty means "async unconditionally whenever `asyncness` is `Async`".
    /// For methods, position 0 is the receiver and script arguments start
    /// at 1.
    pub async_arg_indices: AHashSet<usize>,
    /// Parameter names in declaration order, used to map named arguments to
    /// positional indices.
    pub param_names: Vec<StringId>,
    asyncness: Asyncness,
}

impl FunctionDescriptor {
    /// Creates a descriptor for a script function with undecided asyncness.
    #[must_use]
    pub fn script(name: StringId, owner_class: Option<StringId>, param_names: Vec<StringId>) -> Self {
        Self {
            name,
            owner_class,
            is_builtin: false,
            is_async_predeclared: false,
            async_arg_indices: AHashSet::new(),
            param_names,
            asyncness: Asyncness::Unknown,
        }
    }

    /// Creates a descriptor for a host builtin with pre-declared asyncness.
    #[must_use]
    pub fn builtin(name: StringId, asyncness: Asyncness, async_arg_indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            name,
            owner_class: None,
            is_builtin: true,
            is_async_predeclared: true,
            async_arg_indices: async_arg_indices.into_iter().collect(),
            param_names: Vec::new(),
            asyncness,
        }
    }

    /// Current lattice element.
    #[must_use]
    pub fn asyncness(&self) -> Asyncness {
        self.asyncness
    }

    /// Transitions to `Async`.
    ///
    /// Idempotent, and a no-op on predeclared descriptors (their verdict is
    /// fixed by the host at registration time). Returns true when the call
    /// changed the state, so callers can detect fixed-point progress.
    pub fn mark_async(&mut self) -> bool {
        if self.is_async_predeclared || self.asyncness == Asyncness::Async {
            return false;
        }
        self.asyncness = Asyncness::Async;
        true
    }

    /// Transitions `Unknown` to `Sync`.
    ///
    /// Only the fixed-point close and the second-pass walker call this, once
    /// no suspension path can remain. Never demotes `Async`. Returns true
    /// when the call changed the state.
    pub fn finalize_sync(&mut self) -> bool {
        if self.asyncness == Asyncness::Unknown {
            self.asyncness = Asyncness::Sync;
            return true;
        }
        false
    }
}

/// Storage for all function descriptors of one compilation unit.
///
/// Descriptors are created by resolution and referenced by [`DescriptorId`]
/// from AST nodes. The table outlives the analysis.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct DescriptorTable {
    descriptors: Vec<FunctionDescriptor>,
}

impl DescriptorTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor, returning its id.
    pub fn add(&mut self, descriptor: FunctionDescriptor) -> DescriptorId {
        let id = DescriptorId::new(self.descriptors.len());
        self.descriptors.push(descriptor);
        id
    }

    #[must_use]
    pub fn get(&self, id: DescriptorId) -> &FunctionDescriptor {
        &self.descriptors[id.index()]
    }

    pub fn get_mut(&mut self, id: DescriptorId) -> &mut FunctionDescriptor {
        &mut self.descriptors[id.index()]
    }

    /// Iterates over all descriptors with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (DescriptorId, &FunctionDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (DescriptorId::new(i), d))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
