//! IdTable - the columnar tuple carrier
//!
//! An `IdTable` is a fixed-column-count matrix of `Id`s. Every operator
//! consumes and produces `IdTable`s (directly, or chunk-wise through a lazy
//! result).
//!
//! Column storage is behind `Arc`, so cloning a table is cheap and shares
//! the data; the first mutation of a shared table copies the affected
//! columns (`Arc::make_mut`).

use crate::id::Id;
use std::sync::Arc;

/// Row-addressable table of `Id`s with a fixed number of columns.
///
/// # Invariants
///
/// - Every column has exactly `num_rows` entries
/// - `push_row` takes exactly `num_columns` values
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdTable {
    columns: Vec<Arc<Vec<Id>>>,
    // Tracked separately so zero-column tables can still have rows.
    num_rows: usize,
}

impl IdTable {
    /// Create an empty table with the given column count.
    pub fn new(num_columns: usize) -> Self {
        Self {
            columns: (0..num_columns).map(|_| Arc::new(Vec::new())).collect(),
            num_rows: 0,
        }
    }

    /// Create an empty table with row capacity reserved in every column.
    pub fn with_capacity(num_columns: usize, rows: usize) -> Self {
        Self {
            columns: (0..num_columns)
                .map(|_| Arc::new(Vec::with_capacity(rows)))
                .collect(),
            num_rows: 0,
        }
    }

    /// Build a table from explicit rows. Handy in tests and small operators.
    ///
    /// # Panics
    ///
    /// Panics if any row does not have `num_columns` entries.
    pub fn from_rows(num_columns: usize, rows: &[Vec<Id>]) -> Self {
        let mut table = Self::with_capacity(num_columns, rows.len());
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Append one row.
    ///
    /// # Panics
    ///
    /// Panics if `row.len() != num_columns`.
    pub fn push_row(&mut self, row: &[Id]) {
        assert_eq!(
            row.len(),
            self.columns.len(),
            "row arity must match the table's column count"
        );
        for (column, &value) in self.columns.iter_mut().zip(row) {
            Arc::make_mut(column).push(value);
        }
        self.num_rows += 1;
    }

    /// The value at `(row, column)`.
    pub fn at(&self, row: usize, column: usize) -> Id {
        self.columns[column][row]
    }

    /// One full column as a slice.
    pub fn column(&self, column: usize) -> &[Id] {
        &self.columns[column]
    }

    /// Iterate over the values of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = Id> + '_ {
        self.columns.iter().map(move |column| column[row])
    }

    /// Collect one row into a vector.
    pub fn row_vec(&self, row: usize) -> Vec<Id> {
        self.row(row).collect()
    }

    /// Append all rows of `other`.
    ///
    /// # Panics
    ///
    /// Panics if the column counts differ.
    pub fn append(&mut self, other: &IdTable) {
        assert_eq!(
            self.num_columns(),
            other.num_columns(),
            "appended tables must have the same column count"
        );
        for (column, other_column) in self.columns.iter_mut().zip(&other.columns) {
            Arc::make_mut(column).extend_from_slice(other_column);
        }
        self.num_rows += other.num_rows;
    }

    /// Copy of the row window `[offset, offset + len)`, clamped to the table.
    pub fn window(&self, offset: usize, len: usize) -> IdTable {
        let start = offset.min(self.num_rows);
        let end = start.saturating_add(len).min(self.num_rows);
        let mut out = Self::with_capacity(self.num_columns(), end - start);
        for (column, source) in out.columns.iter_mut().zip(&self.columns) {
            Arc::make_mut(column).extend_from_slice(&source[start..end]);
        }
        out.num_rows = end - start;
        out
    }
}
