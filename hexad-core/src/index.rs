//! The base-index interface consumed by the execution core
//!
//! The on-disk permutation storage is an external collaborator. The core
//! only needs, per permutation: the block layout (first/last triple and row
//! count of every block), the decompressed rows of one block, and a point
//! lookup. `TripleIndex` captures exactly that.
//!
//! `MemoryIndex` is the in-memory reference implementation. It is what the
//! test suites of all three crates run against, and it doubles as the
//! executable definition of the block layout rules.

use crate::error::{CoreError, Result};
use crate::id::Id;
use crate::id_table::IdTable;
use crate::permutation::Permutation;
use crate::triple::{IdTriple, TurtleTriple};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

/// Lexical lookup into the persistent vocabulary.
pub trait Vocabulary: Send + Sync {
    /// The word stored at `index`.
    fn word(&self, index: u64) -> Option<&str>;

    /// The index of `word`, if interned.
    fn index_of(&self, word: &str) -> Option<u64>;

    /// Number of interned words.
    fn len(&self) -> usize;

    /// Whether the vocabulary is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Layout of one block within a permutation.
#[derive(Clone, Debug)]
pub struct BlockMetadata {
    /// First triple stored in the block.
    pub first: IdTriple,
    /// Last triple stored in the block.
    pub last: IdTriple,
    /// Number of rows in the block.
    pub num_rows: usize,
}

/// The immutable base index, as seen by the execution core.
///
/// Implementations must uphold, for every permutation:
/// - blocks partition the permutation's triples in sort order
/// - `block(p, i)` returns `metadata(p)[i].num_rows` rows, three columns in
///   the permutation's key order, sorted
pub trait TripleIndex: Send + Sync {
    /// The persistent vocabulary.
    fn vocab(&self) -> &dyn Vocabulary;

    /// Block layout of one permutation, in block order.
    fn block_metadata(&self, permutation: Permutation) -> &[BlockMetadata];

    /// The decompressed rows of one block (three columns, key order).
    fn block(&self, permutation: Permutation, block_index: usize) -> Result<IdTable>;

    /// Point lookup: whether the triple is part of the base index.
    fn contains(&self, triple: &IdTriple) -> bool;

    /// Total number of triples.
    fn num_triples(&self) -> usize;
}

/// Sorted in-memory vocabulary backing [`MemoryIndex`].
#[derive(Debug, Default)]
pub struct MemoryVocabulary {
    words: Vec<String>,
    index: FxHashMap<String, u64>,
}

impl MemoryVocabulary {
    fn from_sorted(words: Vec<String>) -> Self {
        let index = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as u64))
            .collect();
        Self { words, index }
    }
}

impl Vocabulary for MemoryVocabulary {
    fn word(&self, index: u64) -> Option<&str> {
        self.words.get(index as usize).map(|w| w.as_str())
    }

    fn index_of(&self, word: &str) -> Option<u64> {
        self.index.get(word).copied()
    }

    fn len(&self) -> usize {
        self.words.len()
    }
}

struct PermutationData {
    blocks: Vec<IdTable>,
    metadata: Vec<BlockMetadata>,
}

/// In-memory reference implementation of [`TripleIndex`].
///
/// Terms are interned into a lexicographically sorted vocabulary, so the
/// bitwise order of vocabulary `Id`s coincides with lexical order.
pub struct MemoryIndex {
    vocab: MemoryVocabulary,
    permutations: [PermutationData; 6],
    num_triples: usize,
}

impl MemoryIndex {
    /// Build an index over `triples` with `block_size` rows per block.
    ///
    /// Duplicate triples are stored once.
    pub fn build(triples: &[TurtleTriple], block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(CoreError::InvalidBlockSize(block_size));
        }

        // Sorted vocabulary over all distinct terms.
        let mut words: Vec<String> = triples
            .iter()
            .flat_map(|t| [t.subject.clone(), t.predicate.clone(), t.object.clone()])
            .collect();
        words.sort();
        words.dedup();
        let vocab = MemoryVocabulary::from_sorted(words);

        let mut interned: Vec<IdTriple> = triples
            .iter()
            .map(|t| {
                let term = |word: &str| -> Result<Id> {
                    vocab
                        .index_of(word)
                        .map(Id::from_vocab_index)
                        .ok_or_else(|| CoreError::UnknownWord(word.to_string()))
                };
                Ok(IdTriple::new(
                    term(&t.subject)?,
                    term(&t.predicate)?,
                    term(&t.object)?,
                ))
            })
            .collect::<Result<_>>()?;
        interned.sort_by(|a, b| Permutation::Spo.compare(a, b));
        interned.dedup();
        let num_triples = interned.len();

        let permutations = Permutation::ALL
            .map(|permutation| Self::build_permutation(permutation, &interned, block_size));

        tracing::debug!(
            triples = num_triples,
            words = vocab.len(),
            block_size,
            "built in-memory index"
        );

        Ok(Self {
            vocab,
            permutations,
            num_triples,
        })
    }

    fn build_permutation(
        permutation: Permutation,
        triples: &[IdTriple],
        block_size: usize,
    ) -> PermutationData {
        let mut sorted = triples.to_vec();
        sorted.sort_by(|a, b| permutation.compare(a, b));

        let mut blocks = Vec::new();
        let mut metadata = Vec::new();
        for chunk in sorted.chunks(block_size) {
            let mut table = IdTable::with_capacity(3, chunk.len());
            for triple in chunk {
                table.push_row(&permutation.key(triple));
            }
            blocks.push(table);
            metadata.push(BlockMetadata {
                first: chunk[0],
                last: chunk[chunk.len() - 1],
                num_rows: chunk.len(),
            });
        }
        PermutationData { blocks, metadata }
    }
}

impl TripleIndex for MemoryIndex {
    fn vocab(&self) -> &dyn Vocabulary {
        &self.vocab
    }

    fn block_metadata(&self, permutation: Permutation) -> &[BlockMetadata] {
        &self.permutations[permutation.index()].metadata
    }

    fn block(&self, permutation: Permutation, block_index: usize) -> Result<IdTable> {
        let data = &self.permutations[permutation.index()];
        data.blocks
            .get(block_index)
            .cloned()
            .ok_or(CoreError::BlockOutOfRange {
                permutation: permutation.label(),
                block_index,
                num_blocks: data.blocks.len(),
            })
    }

    fn contains(&self, triple: &IdTriple) -> bool {
        let permutation = Permutation::Spo;
        let data = &self.permutations[permutation.index()];
        let block_index = data.metadata.partition_point(|meta| {
            permutation.compare(&meta.last, triple) == Ordering::Less
        });
        let Some(meta) = data.metadata.get(block_index) else {
            return false;
        };
        if permutation.compare(&meta.first, triple) == Ordering::Greater {
            return false;
        }
        let key = permutation.key(triple);
        let block = &data.blocks[block_index];
        (0..block.num_rows()).any(|row| {
            [block.at(row, 0), block.at(row, 1), block.at(row, 2)] == key
        })
    }

    fn num_triples(&self) -> usize {
        self.num_triples
    }
}
