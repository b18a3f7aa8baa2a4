//! Query variables and their column bindings

use rustc_hash::FxHashMap;
use std::fmt;

/// A SPARQL variable, including the leading `?`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Variable(String);

impl Variable {
    /// Create a variable from its name (e.g. `"?x"`).
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a column may contain `UNDEFINED`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Definedness {
    AlwaysDefined,
    PossiblyUndefined,
}

/// A variable's output column and its definedness annotation.
#[derive(Clone, Copy, Debug)]
pub struct ColumnIndexAndTypeInfo {
    pub column_index: usize,
    pub definedness: Definedness,
}

impl ColumnIndexAndTypeInfo {
    /// Column that never contains `UNDEFINED`.
    pub fn always_defined(column_index: usize) -> Self {
        Self {
            column_index,
            definedness: Definedness::AlwaysDefined,
        }
    }

    /// Column that may contain `UNDEFINED`.
    pub fn possibly_undefined(column_index: usize) -> Self {
        Self {
            column_index,
            definedness: Definedness::PossiblyUndefined,
        }
    }
}

/// Mapping from variable to output column.
pub type VariableToColumnMap = FxHashMap<Variable, ColumnIndexAndTypeInfo>;
