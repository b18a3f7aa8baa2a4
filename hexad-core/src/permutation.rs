//! The six triple permutations
//!
//! Every triple is stored six times, once per ordering of its components.
//! A permutation defines (a) how a triple maps to a three-`Id` sort key and
//! (b) the induced total order on triples. Blocks, scans and located delta
//! triples are always relative to one permutation.

use crate::id::Id;
use crate::triple::IdTriple;
use std::cmp::Ordering;
use std::fmt;

/// One of the six orderings of the triple store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Permutation {
    Pso,
    Pos,
    Spo,
    Sop,
    Osp,
    Ops,
}

impl Permutation {
    /// All six permutations, in the canonical order used for handle arrays.
    pub const ALL: [Permutation; 6] = [
        Permutation::Pso,
        Permutation::Pos,
        Permutation::Spo,
        Permutation::Sop,
        Permutation::Osp,
        Permutation::Ops,
    ];

    /// Dense index of this permutation within [`Permutation::ALL`].
    pub fn index(self) -> usize {
        match self {
            Permutation::Pso => 0,
            Permutation::Pos => 1,
            Permutation::Spo => 2,
            Permutation::Sop => 3,
            Permutation::Osp => 4,
            Permutation::Ops => 5,
        }
    }

    /// Upper-case label (`"PSO"`, ...), used in cache keys and diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            Permutation::Pso => "PSO",
            Permutation::Pos => "POS",
            Permutation::Spo => "SPO",
            Permutation::Sop => "SOP",
            Permutation::Osp => "OSP",
            Permutation::Ops => "OPS",
        }
    }

    /// The triple's components in this permutation's key order.
    pub fn key(self, triple: &IdTriple) -> [Id; 3] {
        let IdTriple {
            subject: s,
            predicate: p,
            object: o,
        } = *triple;
        match self {
            Permutation::Pso => [p, s, o],
            Permutation::Pos => [p, o, s],
            Permutation::Spo => [s, p, o],
            Permutation::Sop => [s, o, p],
            Permutation::Osp => [o, s, p],
            Permutation::Ops => [o, p, s],
        }
    }

    /// Rebuild an `IdTriple` from a key in this permutation's order.
    pub fn triple_from_key(self, key: [Id; 3]) -> IdTriple {
        let [k0, k1, k2] = key;
        match self {
            Permutation::Pso => IdTriple::new(k1, k0, k2),
            Permutation::Pos => IdTriple::new(k2, k0, k1),
            Permutation::Spo => IdTriple::new(k0, k1, k2),
            Permutation::Sop => IdTriple::new(k0, k2, k1),
            Permutation::Osp => IdTriple::new(k1, k2, k0),
            Permutation::Ops => IdTriple::new(k2, k1, k0),
        }
    }

    /// Column index of the subject within this permutation's key.
    pub fn subject_column(self) -> usize {
        match self {
            Permutation::Spo | Permutation::Sop => 0,
            Permutation::Pso | Permutation::Osp => 1,
            Permutation::Pos | Permutation::Ops => 2,
        }
    }

    /// Column index of the predicate within this permutation's key.
    pub fn predicate_column(self) -> usize {
        match self {
            Permutation::Pso | Permutation::Pos => 0,
            Permutation::Spo | Permutation::Ops => 1,
            Permutation::Sop | Permutation::Osp => 2,
        }
    }

    /// Column index of the object within this permutation's key.
    pub fn object_column(self) -> usize {
        match self {
            Permutation::Osp | Permutation::Ops => 0,
            Permutation::Pos | Permutation::Sop => 1,
            Permutation::Pso | Permutation::Spo => 2,
        }
    }

    /// Compare two triples under this permutation's order.
    pub fn compare(self, a: &IdTriple, b: &IdTriple) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: u64, p: u64, o: u64) -> IdTriple {
        IdTriple::new(
            Id::from_vocab_index(s),
            Id::from_vocab_index(p),
            Id::from_vocab_index(o),
        )
    }

    #[test]
    fn test_key_orders_components() {
        let t = triple(1, 2, 3);
        assert_eq!(
            Permutation::Pso.key(&t),
            [
                Id::from_vocab_index(2),
                Id::from_vocab_index(1),
                Id::from_vocab_index(3)
            ]
        );
        assert_eq!(
            Permutation::Ops.key(&t),
            [
                Id::from_vocab_index(3),
                Id::from_vocab_index(2),
                Id::from_vocab_index(1)
            ]
        );
    }

    #[test]
    fn test_key_roundtrip_all_permutations() {
        let t = triple(10, 20, 30);
        for permutation in Permutation::ALL {
            let key = permutation.key(&t);
            assert_eq!(permutation.triple_from_key(key), t, "{}", permutation);
        }
    }

    #[test]
    fn test_component_columns_are_consistent_with_key() {
        let t = triple(10, 20, 30);
        for permutation in Permutation::ALL {
            let key = permutation.key(&t);
            assert_eq!(key[permutation.subject_column()], t.subject);
            assert_eq!(key[permutation.predicate_column()], t.predicate);
            assert_eq!(key[permutation.object_column()], t.object);
        }
    }

    #[test]
    fn test_compare_uses_permutation_order() {
        // a < b by object, but a > b by subject.
        let a = triple(2, 1, 1);
        let b = triple(1, 1, 2);
        assert_eq!(Permutation::Ops.compare(&a, &b), Ordering::Less);
        assert_eq!(Permutation::Spo.compare(&a, &b), Ordering::Greater);
    }
}
