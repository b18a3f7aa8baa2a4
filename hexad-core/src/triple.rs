//! Triple records
//!
//! `TurtleTriple` is what the RDF parser hands the engine: three term
//! strings. `IdTriple` is the interned form used for delta-triple identity
//! and permutation positioning.
//!
//! `IdTriple` deliberately does not implement `Ord`: the ordering of triples
//! depends on the permutation, see [`crate::permutation::Permutation`].

use crate::id::Id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed triple as delivered by the turtle/N-Triples parser.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurtleTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl TurtleTriple {
    /// Create a triple from its three term strings.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for TurtleTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// An interned triple of `Id`s in (subject, predicate, object) order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdTriple {
    pub subject: Id,
    pub predicate: Id,
    pub object: Id,
}

impl IdTriple {
    /// Create a triple from its three components.
    pub fn new(subject: Id, predicate: Id, object: Id) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Debug for IdTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IdTriple({:?}, {:?}, {:?})",
            self.subject, self.predicate, self.object
        )
    }
}
