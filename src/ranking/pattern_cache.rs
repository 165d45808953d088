//! Bounded LRU cache of compiled phrase-boundary patterns.
//!
//! Purely a performance structure: any entry can be evicted and recompiled
//! without changing match results.

use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;

pub const DEFAULT_PATTERN_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => panic!("DEFAULT_PATTERN_CACHE_CAPACITY must be non-zero"),
};

/// Letters, digits and Latin-1 supplement letters. A phrase only matches when
/// neither neighbor is one of these.
const WORD_CLASS: &str = r"a-zA-Z0-9\x{00C0}-\x{00FF}";

/// Compile the boundary pattern for an already-normalized phrase. Every regex
/// metacharacter in the phrase is escaped.
pub fn boundary_pattern(phrase: &str) -> Result<Regex, regex::Error> {
    let pattern = format!(
        "(?:^|[^{WORD_CLASS}]){}(?:[^{WORD_CLASS}]|$)",
        regex::escape(phrase)
    );
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .unicode(true)
        .build()
}

pub struct PatternCache {
    patterns: LruCache<String, Regex>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_PATTERN_CACHE_CAPACITY);
        Self {
            patterns: LruCache::new(capacity),
        }
    }

    /// Return the compiled pattern for `phrase`, promoting it to most recently
    /// used, or compile and insert it (evicting the least recently used entry
    /// at capacity). Compilation failures are logged and yield `None`.
    pub fn get_or_compile(&mut self, phrase: &str) -> Option<Regex> {
        if let Some(re) = self.patterns.get(phrase) {
            return Some(re.clone());
        }

        match boundary_pattern(phrase) {
            Ok(re) => {
                self.patterns.put(phrase.to_string(), re.clone());
                Some(re)
            }
            Err(e) => {
                tracing::warn!(phrase, error = %e, "failed to compile trigger pattern");
                None
            }
        }
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.patterns.contains(phrase)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.patterns.cap().get()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE_CAPACITY.get())
    }
}
