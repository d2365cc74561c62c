//! Source positions and compile-time diagnostics.
//!
//! The analysis reports exactly one user-visible error (a stringification
//! method that may suspend). Everything else that can go wrong indicates a
//! bug in an upstream phase and is surfaced as
//! [`CompileError::Internal`] rather than hidden or retried.

use std::{borrow::Cow, fmt};

use crate::intern::{Interner, StringId};

/// A single location in a source file: 1-indexed line, 0-indexed column.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source code location information for error reporting.
///
/// Contains the filename (as an interned [`StringId`]) and start/end
/// positions. To display the filename, the caller must provide access to the
/// string storage.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CodeRange {
    /// Interned filename ID - look up in the interner to get the actual string.
    pub filename: StringId,
    start: CodeLoc,
    end: CodeLoc,
}

/// Custom Debug implementation to make displaying code ranges much less verbose.
impl fmt::Debug for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CodeRange{{filename: {:?}, start: {}, end: {}}}",
            self.filename, self.start, self.end
        )
    }
}

impl CodeRange {
    /// Creates a new code range from filename and start/end locations.
    #[must_use]
    pub const fn new(filename: StringId, start: CodeLoc, end: CodeLoc) -> Self {
        Self { filename, start, end }
    }

    /// Returns the start position.
    #[must_use]
    pub fn start(&self) -> CodeLoc {
        self.start
    }

    /// Returns the end position.
    #[must_use]
    pub fn end(&self) -> CodeLoc {
        self.end
    }
}

/// Errors raised by the suspension analysis.
///
/// `AsyncStringifier` is the only error a correct toolchain can show to a
/// user; `Internal` means an upstream phase handed us an AST that violates
/// its contract (unlinked identifier, missing descriptor, broken owner
/// chain) and always indicates a compiler bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A stringification method reached a call site that may suspend.
    ///
    /// Stringification is invoked implicitly from contexts that cannot
    /// capture a continuation (string interpolation, debug output), so a
    /// suspending `toString` cannot be compiled.
    AsyncStringifier {
        /// Interned name of the offending method.
        method: StringId,
        /// The call site that may suspend.
        position: CodeRange,
    },
    /// An internal invariant was violated; upstream phase bug.
    Internal {
        msg: Cow<'static, str>,
        position: CodeRange,
    },
}

impl CompileError {
    pub(crate) fn async_stringifier(method: StringId, position: CodeRange) -> Self {
        Self::AsyncStringifier { method, position }
    }

    pub(crate) fn internal(msg: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self::Internal {
            msg: msg.into(),
            position,
        }
    }

    /// Returns the source range the error points at.
    #[must_use]
    pub fn position(&self) -> CodeRange {
        match self {
            Self::AsyncStringifier { position, .. } | Self::Internal { position, .. } => *position,
        }
    }

    /// Renders the error with names resolved through the interner.
    #[must_use]
    pub fn render(&self, interner: &Interner) -> String {
        match self {
            Self::AsyncStringifier { method, position } => format!(
                "{}:{}: stringification method '{}' may not invoke anything async",
                interner.get_str(position.filename),
                position.start(),
                interner.get_str(*method),
            ),
            Self::Internal { msg, position } => format!(
                "{}:{}: internal compiler invariant violated: {msg}",
                interner.get_str(position.filename),
                position.start(),
            ),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncStringifier { position, .. } => write!(
                f,
                "{}: stringification method may not invoke anything async",
                position.start()
            ),
            Self::Internal { msg, position } => {
                write!(f, "{}: internal compiler invariant violated: {msg}", position.start())
            }
        }
    }
}

impl std::error::Error for CompileError {}
