//! String interning for identifiers, method names, and filenames.
//!
//! Every name the analysis touches (function names, parameter names, field
//! names, class names, filenames) is stored once in an [`Interner`] and
//! referenced everywhere else by [`StringId`]. This keeps AST nodes and
//! descriptors `Copy`-friendly and makes name comparison an integer compare.
//!
//! The interner is populated by the resolution phase that builds the AST;
//! the analysis only ever reads it (for the stringifier-name check and for
//! trace/diagnostic output).

use ahash::AHashMap;

/// Index into the string interner's storage.
///
/// Uses `u32` to save space (4 bytes vs 8 bytes for `usize`). This limits us
/// to ~4 billion unique interns, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Deduplicating storage for interned strings.
///
/// Strings are stored in insertion order; [`StringId`]s are stable for the
/// lifetime of the interner. Interning the same string twice returns the
/// same id.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct Interner {
    strings: Vec<String>,
    #[serde(skip)]
    lookup: AHashMap<String, StringId>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning the existing id if it was seen before.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner overflowed u32 ids"));
        self.strings.push(s.to_owned());
        self.lookup.insert(s.to_owned(), id);
        id
    }

    /// Looks up the string for an id.
    ///
    /// # Panics
    /// Panics if the id did not come from this interner.
    #[must_use]
    pub fn get_str(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Returns the id for a string if it has been interned, without interning.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<StringId> {
        self.lookup.get(s).copied()
    }

    /// Rebuilds the lookup map after deserialization.
    ///
    /// The map is skipped during serialization since it duplicates `strings`.
    pub fn rebuild_lookup(&mut self) {
        self.lookup = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), StringId(u32::try_from(i).expect("interner overflowed u32 ids"))))
            .collect();
    }
}
