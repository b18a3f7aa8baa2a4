//! Tagged 64-bit identifiers
//!
//! Every value flowing through the engine is an `Id`: a 64-bit word whose
//! top four bits select a datatype and whose remaining 60 bits carry the
//! payload. Operators treat `Id`s as opaque: equality is bitwise and the
//! sort order used by all result invariants is the order of the raw bits.
//! Only the aggregation layer ever looks inside the tag.
//!
//! ## Tag layout
//!
//! | tag | payload                                    |
//! |-----|--------------------------------------------|
//! | 0   | undefined (payload zero)                   |
//! | 1   | index into the persistent vocabulary       |
//! | 2   | index into a query-scope `LocalVocab`      |
//! | 3   | small signed integer (60-bit two's compl.) |
//! | 4   | double with the four low mantissa bits cut |
//! | 5   | text record index                          |

use std::fmt;

/// Index into the persistent (base) vocabulary.
pub type VocabIndex = u64;

const TAG_SHIFT: u32 = 60;
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;

const TAG_UNDEFINED: u64 = 0;
const TAG_VOCAB: u64 = 1;
const TAG_LOCAL_VOCAB: u64 = 2;
const TAG_INT: u64 = 3;
const TAG_DOUBLE: u64 = 4;
const TAG_TEXT_RECORD: u64 = 5;

/// Smallest integer representable in the 60-bit payload.
pub const MIN_INT: i64 = -(1 << 59);
/// Largest integer representable in the 60-bit payload.
pub const MAX_INT: i64 = (1 << 59) - 1;

/// A tagged 64-bit identifier.
///
/// `Ord`/`Eq` compare the raw bits. This is the one total order the engine
/// relies on: permutation comparators, result sort checks and group-key
/// comparisons all reduce to it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id(u64);

impl Id {
    /// The `UNDEFINED` sentinel. Sorts before every defined `Id`.
    pub fn make_undefined() -> Self {
        Id(TAG_UNDEFINED << TAG_SHIFT)
    }

    /// Identifier for an entry of the persistent vocabulary.
    pub fn from_vocab_index(index: VocabIndex) -> Self {
        debug_assert!(index <= PAYLOAD_MASK);
        Id((TAG_VOCAB << TAG_SHIFT) | (index & PAYLOAD_MASK))
    }

    /// Identifier for an entry of a query-scope `LocalVocab`.
    pub fn from_local_vocab_index(index: u64) -> Self {
        debug_assert!(index <= PAYLOAD_MASK);
        Id((TAG_LOCAL_VOCAB << TAG_SHIFT) | (index & PAYLOAD_MASK))
    }

    /// Identifier carrying a small integer inline.
    ///
    /// Values outside `[MIN_INT, MAX_INT]` are clamped.
    pub fn from_int(value: i64) -> Self {
        let clamped = value.clamp(MIN_INT, MAX_INT);
        Id((TAG_INT << TAG_SHIFT) | (clamped as u64 & PAYLOAD_MASK))
    }

    /// Identifier carrying a double inline. The four low mantissa bits are
    /// dropped to make room for the tag.
    pub fn from_double(value: f64) -> Self {
        Id((TAG_DOUBLE << TAG_SHIFT) | (value.to_bits() >> 4))
    }

    /// Identifier for a text record of the fulltext index.
    pub fn from_text_record_index(index: u64) -> Self {
        debug_assert!(index <= PAYLOAD_MASK);
        Id((TAG_TEXT_RECORD << TAG_SHIFT) | (index & PAYLOAD_MASK))
    }

    /// The raw bits. Exposed for hashing and diagnostics only.
    pub fn bits(self) -> u64 {
        self.0
    }

    fn tag(self) -> u64 {
        self.0 >> TAG_SHIFT
    }

    fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    /// Whether this is the `UNDEFINED` sentinel.
    pub fn is_undefined(self) -> bool {
        self.tag() == TAG_UNDEFINED
    }

    /// The persistent-vocabulary index, if this `Id` carries one.
    pub fn vocab_index(self) -> Option<VocabIndex> {
        (self.tag() == TAG_VOCAB).then(|| self.payload())
    }

    /// The local-vocab index, if this `Id` carries one.
    pub fn local_vocab_index(self) -> Option<u64> {
        (self.tag() == TAG_LOCAL_VOCAB).then(|| self.payload())
    }

    /// The inline integer, if this `Id` carries one.
    pub fn int_value(self) -> Option<i64> {
        (self.tag() == TAG_INT).then(|| {
            // Sign-extend the 60-bit payload.
            ((self.payload() << 4) as i64) >> 4
        })
    }

    /// The inline double, if this `Id` carries one.
    pub fn double_value(self) -> Option<f64> {
        (self.tag() == TAG_DOUBLE).then(|| f64::from_bits(self.payload() << 4))
    }

    /// The text record index, if this `Id` carries one.
    pub fn text_record_index(self) -> Option<u64> {
        (self.tag() == TAG_TEXT_RECORD).then(|| self.payload())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            TAG_UNDEFINED => write!(f, "Id(undef)"),
            TAG_VOCAB => write!(f, "Id(vocab:{})", self.payload()),
            TAG_LOCAL_VOCAB => write!(f, "Id(local:{})", self.payload()),
            TAG_INT => write!(f, "Id(int:{})", self.int_value().unwrap_or(0)),
            TAG_DOUBLE => write!(f, "Id(double:{})", self.double_value().unwrap_or(0.0)),
            TAG_TEXT_RECORD => write!(f, "Id(text:{})", self.payload()),
            other => write!(f, "Id(tag{}:{})", other, self.payload()),
        }
    }
}
