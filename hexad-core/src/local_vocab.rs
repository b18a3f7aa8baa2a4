//! Query-scope string dictionary
//!
//! A `LocalVocab` holds strings created during query evaluation that are not
//! part of the persistent vocabulary (freshly minted literals, GROUP_CONCAT
//! results, delta-triple components unknown to the base index).
//!
//! The vocabulary is append-only while exclusively owned. Sharing it with
//! downstream results goes through [`SharedLocalVocab`], an immutable
//! reference-counted handle: sealing on share means no reader can ever
//! observe a mutation.

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Index into a `LocalVocab`.
pub type LocalVocabIndex = u64;

/// Append-only mapping from index to string, deduplicating on insert.
#[derive(Debug, Default)]
pub struct LocalVocab {
    words: Vec<Arc<str>>,
    index: FxHashMap<Arc<str>, LocalVocabIndex>,
}

impl LocalVocab {
    /// Create an empty vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an owned vocabulary whose indices extend a shared one.
    ///
    /// Word storage is `Arc<str>`, so this clones pointers, not strings.
    /// Indices of the source stay valid in the copy, which is what lets an
    /// operator append new words while passing through `Id`s minted by its
    /// child.
    pub fn extending(shared: &SharedLocalVocab) -> Self {
        let words = shared.0.words.clone();
        let index = shared.0.index.clone();
        Self { words, index }
    }

    /// Index of `word`, minting it if not yet present.
    pub fn get_index_and_add(&mut self, word: &str) -> LocalVocabIndex {
        if let Some(&existing) = self.index.get(word) {
            return existing;
        }
        let stored: Arc<str> = Arc::from(word);
        let index = self.words.len() as LocalVocabIndex;
        self.words.push(Arc::clone(&stored));
        self.index.insert(stored, index);
        index
    }

    /// Index of `word` if already present.
    pub fn lookup(&self, word: &str) -> Option<LocalVocabIndex> {
        self.index.get(word).copied()
    }

    /// The word stored at `index`.
    pub fn word(&self, index: LocalVocabIndex) -> Option<&str> {
        self.words.get(index as usize).map(|w| w.as_ref())
    }

    /// Number of stored words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Drop all words. Indices minted before the call are invalidated.
    pub fn clear(&mut self) {
        self.words.clear();
        self.index.clear();
    }

    /// Seal this vocabulary into an immutable shareable handle.
    pub fn into_shared(self) -> SharedLocalVocab {
        SharedLocalVocab(Arc::new(self))
    }

    /// Immutable snapshot of the current contents.
    ///
    /// The owner may keep appending afterwards; readers of the snapshot see
    /// the state at snapshot time. Pointer clones only.
    pub fn snapshot(&self) -> SharedLocalVocab {
        SharedLocalVocab(Arc::new(Self {
            words: self.words.clone(),
            index: self.index.clone(),
        }))
    }
}

/// Immutable shared handle to a sealed `LocalVocab`.
///
/// Cloning shares; the vocabulary lives as long as its longest-living
/// sharer. The default handle is an empty vocabulary.
#[derive(Clone, Debug, Default)]
pub struct SharedLocalVocab(Arc<LocalVocab>);

impl SharedLocalVocab {
    /// The word stored at `index`.
    pub fn word(&self, index: LocalVocabIndex) -> Option<&str> {
        self.0.word(index)
    }

    /// Number of stored words.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
