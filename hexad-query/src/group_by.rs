//! GROUP BY operator
//!
//! Consumes a child result sorted by the group-by columns and emits one row
//! per group: the group columns first (in planner order), then one column
//! per aggregate, sorted by output variable name.
//!
//! This is a **blocking** operator: the child stream is drained before any
//! output row exists. Group boundaries are found with a single scan over
//! the sorted input; each aggregate is then evaluated over the inclusive
//! row range `[block_start, block_end]` of its group.
//!
//! The boundary scan is monomorphized for key widths up to five columns
//! and falls back to a variable-width path above that. Both paths sit
//! behind one dispatch function and behave identically.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::operator::{BoxedOperation, Operation};
use crate::result::QueryResult;
use crate::variable::{ColumnIndexAndTypeInfo, Definedness, Variable, VariableToColumnMap};
use hexad_core::{Id, IdTable, LocalVocab, Vocabulary};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// The supported aggregate functions.
///
/// Options specific to one function travel inside its variant, like the
/// `GROUP_CONCAT` separator.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat { separator: String },
    Sample,
    First,
    Last,
}

impl AggregateKind {
    /// Parse an aggregate function name. `GROUP_CONCAT` starts out with the
    /// default single-space separator.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregateKind::Count),
            "SUM" => Ok(AggregateKind::Sum),
            "AVG" => Ok(AggregateKind::Avg),
            "MIN" => Ok(AggregateKind::Min),
            "MAX" => Ok(AggregateKind::Max),
            "GROUP_CONCAT" => Ok(AggregateKind::GroupConcat {
                separator: " ".to_string(),
            }),
            "SAMPLE" => Ok(AggregateKind::Sample),
            "FIRST" => Ok(AggregateKind::First),
            "LAST" => Ok(AggregateKind::Last),
            _ => Err(QueryError::UnknownAggregate(name.to_string())),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::GroupConcat { .. } => "GROUP_CONCAT",
            AggregateKind::Sample => "SAMPLE",
            AggregateKind::First => "FIRST",
            AggregateKind::Last => "LAST",
        }
    }
}

/// One aggregate of the query: function, DISTINCT flag, input and output
/// variable.
#[derive(Clone, Debug)]
pub struct AggregateAlias {
    pub kind: AggregateKind,
    pub distinct: bool,
    pub input: Variable,
    pub output: Variable,
}

impl AggregateAlias {
    pub fn new(kind: AggregateKind, distinct: bool, input: Variable, output: Variable) -> Self {
        Self {
            kind,
            distinct,
            input,
            output,
        }
    }
}

struct ResolvedAggregate {
    kind: AggregateKind,
    distinct: bool,
    input_column: usize,
}

/// The GROUP BY operation.
pub struct GroupBy {
    child: BoxedOperation,
    group_by_variables: Vec<Variable>,
    /// Sorted by output variable name; determines the aggregate columns.
    aliases: Vec<AggregateAlias>,
    variables: VariableToColumnMap,
    /// Set when an alias carried an unrecognized function name; evaluation
    /// then degrades to a warning and an empty result of the declared
    /// shape.
    unknown_aggregate: Option<String>,
}

impl GroupBy {
    /// Group `child` by `group_by_variables` (in planner order) and apply
    /// `aliases`.
    pub fn new(
        child: BoxedOperation,
        group_by_variables: Vec<Variable>,
        mut aliases: Vec<AggregateAlias>,
    ) -> Self {
        aliases.sort_by(|a, b| a.output.cmp(&b.output));

        let child_vars = child.variable_columns();
        let mut variables = VariableToColumnMap::default();
        let mut column = 0;
        for variable in &group_by_variables {
            let definedness = child_vars
                .get(variable)
                .map_or(Definedness::PossiblyUndefined, |info| info.definedness);
            variables.insert(
                variable.clone(),
                ColumnIndexAndTypeInfo {
                    column_index: column,
                    definedness,
                },
            );
            column += 1;
        }
        for alias in &aliases {
            let definedness = match alias.kind {
                AggregateKind::Count => Definedness::AlwaysDefined,
                _ => Definedness::PossiblyUndefined,
            };
            variables.insert(
                alias.output.clone(),
                ColumnIndexAndTypeInfo {
                    column_index: column,
                    definedness,
                },
            );
            column += 1;
        }

        Self {
            child,
            group_by_variables,
            aliases,
            variables,
            unknown_aggregate: None,
        }
    }

    /// Like [`GroupBy::new`], but with aggregate functions given by name,
    /// the way the parser delivers them. An unrecognized name keeps its
    /// output column in the schema and makes evaluation return an empty
    /// result with a warning.
    pub fn with_parsed_aliases(
        child: BoxedOperation,
        group_by_variables: Vec<Variable>,
        raw_aliases: Vec<(String, bool, Variable, Variable)>,
    ) -> Self {
        let mut unknown_aggregate = None;
        let aliases = raw_aliases
            .into_iter()
            .map(|(name, distinct, input, output)| {
                let kind = AggregateKind::parse(&name).unwrap_or_else(|_| {
                    unknown_aggregate.get_or_insert(name);
                    AggregateKind::Count
                });
                AggregateAlias::new(kind, distinct, input, output)
            })
            .collect();
        let mut group_by = Self::new(child, group_by_variables, aliases);
        group_by.unknown_aggregate = unknown_aggregate;
        group_by
    }

    fn empty_result(&self) -> Result<QueryResult> {
        QueryResult::materialized(
            IdTable::new(self.result_width()),
            (0..self.group_by_variables.len()).collect(),
            Default::default(),
        )
    }
}

impl Operation for GroupBy {
    fn compute_result(&self, ctx: &ExecutionContext) -> Result<QueryResult> {
        let span = tracing::debug_span!(
            "group_by",
            group_cols = self.group_by_variables.len(),
            aggregates = self.aliases.len(),
            input_rows = tracing::field::Empty,
            groups = tracing::field::Empty,
        );
        let _guard = span.enter();

        if let Some(name) = &self.unknown_aggregate {
            tracing::warn!(aggregate = %name, "unknown aggregate, returning an empty result");
            return self.empty_result();
        }

        let child_vars = self.child.variable_columns();
        let mut group_columns = Vec::with_capacity(self.group_by_variables.len());
        for variable in &self.group_by_variables {
            match child_vars.get(variable) {
                Some(info) => group_columns.push(info.column_index),
                None => {
                    let error = QueryError::MissingVariable(variable.name().to_string());
                    tracing::warn!(%error, "group-by variable, returning an empty result");
                    return self.empty_result();
                }
            }
        }
        let mut aggregates = Vec::with_capacity(self.aliases.len());
        for alias in &self.aliases {
            match child_vars.get(&alias.input) {
                Some(info) => aggregates.push(ResolvedAggregate {
                    kind: alias.kind.clone(),
                    distinct: alias.distinct,
                    input_column: info.column_index,
                }),
                None => {
                    let error = QueryError::MissingVariable(alias.input.name().to_string());
                    tracing::warn!(%error, "aggregate input, returning an empty result");
                    return self.empty_result();
                }
            }
        }

        // Blocking: drain the child before emitting anything.
        let mut child_result = self.child.compute_result(ctx)?;
        let child_vocab = child_result.get_shared_local_vocab();
        let input = if child_result.is_fully_materialized() {
            child_result.id_table()?.clone()
        } else {
            let mut accumulated = IdTable::new(self.child.result_width());
            for chunk in child_result.id_tables()? {
                ctx.check_cancelled()?;
                accumulated.append(&chunk?);
            }
            accumulated
        };
        span.record("input_rows", input.num_rows() as u64);

        // The output vocabulary extends the child's, so child-minted ids
        // pass through unchanged and GROUP_CONCAT can append.
        let mut local_vocab = LocalVocab::extending(&child_vocab);
        let vocab = ctx.index().vocab();
        let width = self.result_width();
        let mut output = IdTable::new(width);
        let mut distinct_set = FxHashSet::default();

        if input.is_empty() {
            if group_columns.is_empty() {
                // SPARQL aggregation: a single implicit group with the
                // aggregate identities.
                let mut row = Vec::with_capacity(width);
                for aggregate in &aggregates {
                    row.push(aggregate_identity(aggregate, &mut local_vocab));
                }
                output.push_row(&row);
            }
        } else {
            for_each_group(&input, &group_columns, |block_start, block_end| {
                ctx.check_cancelled()?;
                let mut row = Vec::with_capacity(width);
                for &column in &group_columns {
                    row.push(input.at(block_start, column));
                }
                for aggregate in &aggregates {
                    row.push(evaluate_aggregate(
                        aggregate,
                        &input,
                        block_start,
                        block_end,
                        vocab,
                        &mut local_vocab,
                        &mut distinct_set,
                    ));
                }
                output.push_row(&row);
                Ok(())
            })?;
        }
        span.record("groups", output.num_rows() as u64);

        QueryResult::materialized(
            output,
            (0..group_columns.len()).collect(),
            local_vocab.into_shared(),
        )
    }

    fn result_width(&self) -> usize {
        self.group_by_variables.len() + self.aliases.len()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        (0..self.group_by_variables.len()).collect()
    }

    fn variable_columns(&self) -> &VariableToColumnMap {
        &self.variables
    }

    fn size_estimate(&self) -> usize {
        if self.group_by_variables.is_empty() {
            1
        } else {
            self.child.size_estimate()
        }
    }

    fn cost_estimate(&self) -> usize {
        self.child.cost_estimate() + self.child.size_estimate()
    }

    fn as_string(&self, indent: usize) -> String {
        // Group variables are rendered sorted so the cache key is order
        // invariant; aggregates are already sorted by output variable.
        let mut group_names: Vec<&str> =
            self.group_by_variables.iter().map(Variable::name).collect();
        group_names.sort();
        let aggregates: Vec<String> = self
            .aliases
            .iter()
            .map(|alias| {
                format!(
                    "{}({}{}) AS {}",
                    alias.kind.label(),
                    if alias.distinct { "DISTINCT " } else { "" },
                    alias.input,
                    alias.output,
                )
            })
            .collect();
        format!(
            "{}GROUP_BY {} [{}]\n{}",
            " ".repeat(indent),
            group_names.join(", "),
            aggregates.join(", "),
            self.child.as_string(indent + 2),
        )
    }
}

/// Call `f(block_start, block_end)` (inclusive) for every maximal run of
/// rows sharing the same values on `group_columns`.
fn for_each_group<F>(table: &IdTable, group_columns: &[usize], mut f: F) -> Result<()>
where
    F: FnMut(usize, usize) -> Result<()>,
{
    if table.is_empty() {
        return Ok(());
    }
    match group_columns.len() {
        0 => f(0, table.num_rows() - 1),
        1 => scan_groups_fixed::<1, F>(table, group_columns, f),
        2 => scan_groups_fixed::<2, F>(table, group_columns, f),
        3 => scan_groups_fixed::<3, F>(table, group_columns, f),
        4 => scan_groups_fixed::<4, F>(table, group_columns, f),
        5 => scan_groups_fixed::<5, F>(table, group_columns, f),
        _ => scan_groups_dynamic(table, group_columns, f),
    }
}

/// Boundary scan monomorphized over the key width: the current key lives in
/// an array, no per-row allocation.
fn scan_groups_fixed<const N: usize, F>(
    table: &IdTable,
    group_columns: &[usize],
    mut f: F,
) -> Result<()>
where
    F: FnMut(usize, usize) -> Result<()>,
{
    let columns: [usize; N] = group_columns
        .try_into()
        .expect("dispatch matches the key width");
    let key_at = |row: usize| -> [Id; N] { columns.map(|column| table.at(row, column)) };

    let mut block_start = 0;
    let mut current = key_at(0);
    for row in 1..table.num_rows() {
        let key = key_at(row);
        if key != current {
            f(block_start, row - 1)?;
            block_start = row;
            current = key;
        }
    }
    f(block_start, table.num_rows() - 1)
}

/// Variable-width fallback for keys wider than the monomorphized paths.
fn scan_groups_dynamic<F>(table: &IdTable, group_columns: &[usize], mut f: F) -> Result<()>
where
    F: FnMut(usize, usize) -> Result<()>,
{
    let key_matches = |row: usize, key: &[Id]| {
        group_columns
            .iter()
            .zip(key)
            .all(|(&column, &value)| table.at(row, column) == value)
    };
    let key_at = |row: usize| -> Vec<Id> {
        group_columns
            .iter()
            .map(|&column| table.at(row, column))
            .collect()
    };

    let mut block_start = 0;
    let mut current = key_at(0);
    for row in 1..table.num_rows() {
        if !key_matches(row, &current) {
            f(block_start, row - 1)?;
            block_start = row;
            current = key_at(row);
        }
    }
    f(block_start, table.num_rows() - 1)
}

/// The value an aggregate takes over the empty group.
fn aggregate_identity(aggregate: &ResolvedAggregate, local_vocab: &mut LocalVocab) -> Id {
    match &aggregate.kind {
        AggregateKind::Count => Id::from_int(0),
        AggregateKind::Sum | AggregateKind::Avg => Id::from_double(0.0),
        AggregateKind::GroupConcat { .. } => {
            Id::from_local_vocab_index(local_vocab.get_index_and_add(""))
        }
        AggregateKind::Min
        | AggregateKind::Max
        | AggregateKind::Sample
        | AggregateKind::First
        | AggregateKind::Last => Id::make_undefined(),
    }
}

fn evaluate_aggregate(
    aggregate: &ResolvedAggregate,
    input: &IdTable,
    block_start: usize,
    block_end: usize,
    vocab: &dyn Vocabulary,
    local_vocab: &mut LocalVocab,
    distinct_set: &mut FxHashSet<Id>,
) -> Id {
    let column = aggregate.input_column;
    let group_size = block_end - block_start + 1;

    match &aggregate.kind {
        AggregateKind::Count => {
            if aggregate.distinct {
                distinct_set.clear();
                for row in block_start..=block_end {
                    distinct_set.insert(input.at(row, column));
                }
                let count = distinct_set.len();
                distinct_set.clear();
                Id::from_int(count as i64)
            } else {
                Id::from_int(group_size as i64)
            }
        }
        AggregateKind::Sum | AggregateKind::Avg => {
            distinct_set.clear();
            let mut sum = 0.0;
            for row in block_start..=block_end {
                let value = input.at(row, column);
                if aggregate.distinct && !distinct_set.insert(value) {
                    continue;
                }
                sum += numeric_value(value, vocab, local_vocab);
            }
            distinct_set.clear();
            if aggregate.kind == AggregateKind::Sum {
                Id::from_double(sum)
            } else {
                // AVG divides by the group size; DISTINCT only restricts
                // which values enter the sum.
                Id::from_double(sum / group_size as f64)
            }
        }
        AggregateKind::Min | AggregateKind::Max => {
            let mut best: Option<Id> = None;
            for row in block_start..=block_end {
                let value = input.at(row, column);
                if value.text_record_index().is_some() {
                    // Text records have no value comparison.
                    return Id::make_undefined();
                }
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let keep_value = match compare_values(value, current) {
                            Ordering::Less => aggregate.kind == AggregateKind::Min,
                            Ordering::Greater => aggregate.kind == AggregateKind::Max,
                            Ordering::Equal => false,
                        };
                        if keep_value {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            best.unwrap_or_else(Id::make_undefined)
        }
        AggregateKind::GroupConcat { separator } => {
            distinct_set.clear();
            let mut concatenated = String::new();
            let mut first = true;
            for row in block_start..=block_end {
                let value = input.at(row, column);
                if aggregate.distinct && !distinct_set.insert(value) {
                    continue;
                }
                if !first {
                    concatenated.push_str(separator);
                }
                concatenated.push_str(&display_word(value, vocab, local_vocab));
                first = false;
            }
            distinct_set.clear();
            Id::from_local_vocab_index(local_vocab.get_index_and_add(&concatenated))
        }
        // The input sort fixes the order within a group; SAMPLE picks the
        // first row like FIRST.
        AggregateKind::Sample | AggregateKind::First => input.at(block_start, column),
        AggregateKind::Last => input.at(block_end, column),
    }
}

/// Numeric coercion: inline integers and doubles directly, vocabulary
/// entries through their lexical form's numeric prefix, everything else
/// `NaN`.
fn numeric_value(id: Id, vocab: &dyn Vocabulary, local_vocab: &LocalVocab) -> f64 {
    if let Some(value) = id.int_value() {
        value as f64
    } else if let Some(value) = id.double_value() {
        value
    } else if let Some(index) = id.vocab_index() {
        vocab.word(index).map_or(f64::NAN, parse_numeric_prefix)
    } else if let Some(index) = id.local_vocab_index() {
        local_vocab
            .word(index)
            .map_or(f64::NAN, parse_numeric_prefix)
    } else {
        f64::NAN
    }
}

fn parse_numeric_prefix(word: &str) -> f64 {
    let trimmed = word.trim_start_matches(['"', '<']);
    let numeric_len = trimmed
        .bytes()
        .take_while(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        .count();
    trimmed[..numeric_len].parse::<f64>().unwrap_or(f64::NAN)
}

/// Type-aware comparison for MIN/MAX: numbers by value, everything else by
/// the identifier's total order.
fn compare_values(a: Id, b: Id) -> Ordering {
    let numeric = |id: Id| {
        id.int_value()
            .map(|v| v as f64)
            .or_else(|| id.double_value())
    };
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => a.cmp(&b),
    }
}

/// String form of an identifier for GROUP_CONCAT.
fn display_word(id: Id, vocab: &dyn Vocabulary, local_vocab: &LocalVocab) -> String {
    if let Some(value) = id.int_value() {
        value.to_string()
    } else if let Some(value) = id.double_value() {
        value.to_string()
    } else if let Some(index) = id.vocab_index() {
        vocab.word(index).unwrap_or_default().to_string()
    } else if let Some(index) = id.local_vocab_index() {
        local_vocab.word(index).unwrap_or_default().to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::PrecomputedOperation;
    use hexad_core::{MemoryIndex, TurtleTriple};
    use std::sync::Arc;

    fn int(v: i64) -> Id {
        Id::from_int(v)
    }

    /// Context whose base vocabulary holds the words used in the tests.
    fn context() -> ExecutionContext {
        let triples = vec![
            TurtleTriple::new("apple", "banana", "cherry"),
            TurtleTriple::new("10", "2.5", "20"),
        ];
        let index = MemoryIndex::build(&triples, 8).unwrap();
        ExecutionContext::new(Arc::new(index))
    }

    fn vocab_id(ctx: &ExecutionContext, word: &str) -> Id {
        Id::from_vocab_index(ctx.index().vocab().index_of(word).unwrap())
    }

    fn child_vars(names: &[&str]) -> VariableToColumnMap {
        let mut map = VariableToColumnMap::default();
        for (column, name) in names.iter().enumerate() {
            map.insert(
                Variable::new(*name),
                ColumnIndexAndTypeInfo::always_defined(column),
            );
        }
        map
    }

    fn var(name: &str) -> Variable {
        Variable::new(name)
    }

    fn alias(kind: AggregateKind, distinct: bool, input: &str, output: &str) -> AggregateAlias {
        AggregateAlias::new(kind, distinct, var(input), var(output))
    }

    fn child_from_rows(rows: &[Vec<Id>], names: &[&str]) -> BoxedOperation {
        let table = IdTable::from_rows(names.len(), rows);
        Box::new(PrecomputedOperation::materialized(
            table,
            vec![0],
            child_vars(names),
        ))
    }

    #[test]
    fn test_count_and_sum_per_group() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), int(10)],
                vec![int(1), int(20)],
                vec![int(2), int(30)],
            ],
            &["?a", "?b"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(AggregateKind::Count, false, "?b", "?count"),
                alias(AggregateKind::Sum, false, "?b", "?sum"),
            ],
        );

        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        // Group cols first, then aggregates sorted by output name
        // (?count < ?sum).
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.row_vec(0), vec![int(1), int(2), Id::from_double(30.0)]);
        assert_eq!(table.row_vec(1), vec![int(2), int(1), Id::from_double(30.0)]);
        assert_eq!(result.sorted_by(), &[0]);
    }

    #[test]
    fn test_output_columns_follow_alias_output_order() {
        let ctx = context();
        let child = child_from_rows(&[vec![int(1), int(5)]], &["?a", "?b"]);
        // Aliases handed over out of order: ?z before ?c.
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(AggregateKind::Max, false, "?b", "?z"),
                alias(AggregateKind::Min, false, "?b", "?c"),
            ],
        );
        let variables = group_by.variable_columns();
        assert_eq!(variables[&var("?a")].column_index, 0);
        assert_eq!(variables[&var("?c")].column_index, 1);
        assert_eq!(variables[&var("?z")].column_index, 2);

        let result = group_by.compute_result(&ctx).unwrap();
        assert_eq!(
            result.id_table().unwrap().row_vec(0),
            vec![int(1), int(5), int(5)]
        );
    }

    #[test]
    fn test_empty_input_without_group_columns_yields_identity_row() {
        let ctx = context();
        let child = child_from_rows(&[], &["?a", "?b"]);
        let group_by = GroupBy::new(
            child,
            vec![],
            vec![
                alias(AggregateKind::Count, false, "?b", "?count"),
                alias(AggregateKind::Max, false, "?b", "?max"),
                alias(AggregateKind::Sum, false, "?b", "?sum"),
            ],
        );

        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        assert_eq!(table.num_rows(), 1);
        // ?count, ?max, ?sum in output order.
        assert_eq!(table.at(0, 0), int(0));
        assert!(table.at(0, 1).is_undefined());
        assert_eq!(table.at(0, 2), Id::from_double(0.0));
    }

    #[test]
    fn test_empty_input_with_group_columns_yields_no_rows() {
        let ctx = context();
        let child = Box::new(PrecomputedOperation::materialized(
            IdTable::new(2),
            vec![],
            child_vars(&["?a", "?b"]),
        ));
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![alias(AggregateKind::Count, false, "?b", "?count")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        assert!(result.id_table().unwrap().is_empty());
        assert_eq!(group_by.result_width(), 2);
    }

    #[test]
    fn test_count_distinct() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), int(7)],
                vec![int(1), int(7)],
                vec![int(1), int(8)],
            ],
            &["?a", "?b"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(AggregateKind::Count, true, "?b", "?distinct"),
                alias(AggregateKind::Count, false, "?b", "?plain"),
            ],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        // ?distinct < ?plain alphabetically.
        assert_eq!(table.row_vec(0), vec![int(1), int(2), int(3)]);
    }

    #[test]
    fn test_avg_divisor_policy() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), int(10)],
                vec![int(1), int(10)],
                vec![int(1), int(20)],
            ],
            &["?a", "?b"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(AggregateKind::Avg, true, "?b", "?avg_distinct"),
                alias(AggregateKind::Avg, false, "?b", "?avg_plain"),
            ],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        // The divisor is the group size either way; DISTINCT only drops
        // the duplicate 10 from the sum: (10 + 20) / 3 vs (10 + 10 + 20) / 3.
        assert_eq!(table.at(0, 1), Id::from_double(10.0));
        assert_eq!(table.at(0, 2), Id::from_double(40.0 / 3.0));
    }

    #[test]
    fn test_sum_parses_vocabulary_entries() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), vocab_id(&ctx, "10")],
                vec![int(1), vocab_id(&ctx, "2.5")],
            ],
            &["?a", "?b"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![alias(AggregateKind::Sum, false, "?b", "?sum")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        assert_eq!(
            result.id_table().unwrap().at(0, 1),
            Id::from_double(12.5)
        );
    }

    #[test]
    fn test_sum_of_non_numeric_strings_is_nan() {
        let ctx = context();
        let child = child_from_rows(
            &[vec![int(1), vocab_id(&ctx, "apple")]],
            &["?a", "?b"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![alias(AggregateKind::Sum, false, "?b", "?sum")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let sum = result.id_table().unwrap().at(0, 1);
        assert!(sum.double_value().unwrap().is_nan());
    }

    #[test]
    fn test_min_max_numeric_and_vocab() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), int(5), vocab_id(&ctx, "banana")],
                vec![int(1), Id::from_double(2.5), vocab_id(&ctx, "apple")],
                vec![int(1), int(4), vocab_id(&ctx, "cherry")],
            ],
            &["?a", "?n", "?w"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(AggregateKind::Min, false, "?n", "?min_n"),
                alias(AggregateKind::Max, false, "?n", "?max_n"),
                alias(AggregateKind::Min, false, "?w", "?min_w"),
                alias(AggregateKind::Max, false, "?w", "?max_w"),
            ],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        let variables = group_by.variable_columns();
        let at = |name: &str| table.at(0, variables[&var(name)].column_index);
        // Mixed int/double compared by value.
        assert_eq!(at("?min_n"), Id::from_double(2.5));
        assert_eq!(at("?max_n"), int(5));
        // Vocabulary ids compare in lexical order (sorted interning).
        assert_eq!(at("?min_w"), vocab_id(&ctx, "apple"));
        assert_eq!(at("?max_w"), vocab_id(&ctx, "cherry"));
    }

    #[test]
    fn test_min_of_text_records_is_undefined() {
        let ctx = context();
        let child = child_from_rows(
            &[vec![int(1), Id::from_text_record_index(7)]],
            &["?a", "?t"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![alias(AggregateKind::Min, false, "?t", "?min")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        assert!(result.id_table().unwrap().at(0, 1).is_undefined());
    }

    #[test]
    fn test_group_concat_with_custom_separator_and_distinct() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), vocab_id(&ctx, "apple")],
                vec![int(1), vocab_id(&ctx, "apple")],
                vec![int(1), vocab_id(&ctx, "banana")],
            ],
            &["?a", "?w"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(
                    AggregateKind::GroupConcat {
                        separator: "; ".to_string(),
                    },
                    false,
                    "?w",
                    "?all",
                ),
                alias(
                    AggregateKind::GroupConcat {
                        separator: " ".to_string(),
                    },
                    true,
                    "?w",
                    "?distinct",
                ),
            ],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let vocab = result.get_shared_local_vocab();
        let table = result.id_table().unwrap();
        let word = |id: Id| vocab.word(id.local_vocab_index().unwrap()).unwrap().to_string();
        // ?all before ?distinct.
        assert_eq!(word(table.at(0, 1)), "apple; apple; banana");
        assert_eq!(word(table.at(0, 2)), "apple banana");
    }

    #[test]
    fn test_sample_first_last() {
        let ctx = context();
        let child = child_from_rows(
            &[
                vec![int(1), int(10)],
                vec![int(1), int(20)],
                vec![int(1), int(30)],
            ],
            &["?a", "?b"],
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(AggregateKind::First, false, "?b", "?first"),
                alias(AggregateKind::Last, false, "?b", "?last"),
                alias(AggregateKind::Sample, false, "?b", "?sample"),
            ],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        assert_eq!(table.row_vec(0), vec![int(1), int(10), int(30), int(10)]);
    }

    #[test]
    fn test_child_local_vocab_passes_through() {
        let ctx = context();
        let mut child_vocab = LocalVocab::new();
        let hello = Id::from_local_vocab_index(child_vocab.get_index_and_add("hello"));
        let table = IdTable::from_rows(2, &[vec![int(1), hello]]);
        let child = Box::new(
            PrecomputedOperation::materialized(table, vec![0], child_vars(&["?a", "?w"]))
                .with_local_vocab(child_vocab.into_shared()),
        );
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![
                alias(
                    AggregateKind::GroupConcat {
                        separator: " ".to_string(),
                    },
                    false,
                    "?w",
                    "?concat",
                ),
                alias(AggregateKind::Sample, false, "?w", "?sample"),
            ],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let vocab = result.get_shared_local_vocab();
        let table = result.id_table().unwrap();
        // GROUP_CONCAT rendered the child-minted word, and the sampled id
        // still resolves in the output vocabulary.
        let concat = table.at(0, 1);
        assert_eq!(vocab.word(concat.local_vocab_index().unwrap()), Some("hello"));
        assert_eq!(table.at(0, 2), hello);
        assert_eq!(vocab.word(hello.local_vocab_index().unwrap()), Some("hello"));
    }

    #[test]
    fn test_lazy_child_is_drained() {
        let ctx = context();
        let rows: Vec<Vec<Id>> = (0..10)
            .map(|v| vec![int(v / 5), int(v)])
            .collect();
        let table = IdTable::from_rows(2, &rows);
        let child = Box::new(PrecomputedOperation::lazy(
            table,
            vec![0],
            child_vars(&["?a", "?b"]),
            3,
        ));
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![alias(AggregateKind::Count, false, "?b", "?count")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.at(0, 1), int(5));
        assert_eq!(table.at(1, 1), int(5));
    }

    #[test]
    fn test_missing_group_variable_warns_and_returns_empty() {
        let ctx = context();
        let child = child_from_rows(&[vec![int(1), int(2)]], &["?a", "?b"]);
        let group_by = GroupBy::new(
            child,
            vec![var("?nope")],
            vec![alias(AggregateKind::Count, false, "?b", "?count")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        assert!(result.is_fully_materialized());
        let table = result.id_table().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.num_columns(), 2);
    }

    #[test]
    fn test_missing_aggregate_input_warns_and_returns_empty() {
        let ctx = context();
        let child = child_from_rows(&[vec![int(1), int(2)]], &["?a", "?b"]);
        let group_by = GroupBy::new(
            child,
            vec![var("?a")],
            vec![alias(AggregateKind::Sum, false, "?gone", "?sum")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        assert!(result.id_table().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_aggregate_name_degrades_to_empty() {
        assert!(matches!(
            AggregateKind::parse("MEDIAN"),
            Err(QueryError::UnknownAggregate(_))
        ));

        let ctx = context();
        let child = child_from_rows(&[vec![int(1), int(2)]], &["?a", "?b"]);
        let group_by = GroupBy::with_parsed_aliases(
            child,
            vec![var("?a")],
            vec![("MEDIAN".to_string(), false, var("?b"), var("?median"))],
        );
        assert_eq!(group_by.result_width(), 2);
        let result = group_by.compute_result(&ctx).unwrap();
        assert!(result.id_table().unwrap().is_empty());
    }

    #[test]
    fn test_parsed_aliases_accept_known_names() {
        let ctx = context();
        let child = child_from_rows(&[vec![int(1), int(2)]], &["?a", "?b"]);
        let group_by = GroupBy::with_parsed_aliases(
            child,
            vec![var("?a")],
            vec![("count".to_string(), false, var("?b"), var("?count"))],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        assert_eq!(result.id_table().unwrap().row_vec(0), vec![int(1), int(1)]);
    }

    #[test]
    fn test_wide_key_uses_dynamic_path() {
        let ctx = context();
        let names = ["?a", "?b", "?c", "?d", "?e", "?f", "?v"];
        // Six key columns: two groups of two rows each.
        let rows: Vec<Vec<Id>> = vec![
            vec![int(1), int(1), int(1), int(1), int(1), int(1), int(10)],
            vec![int(1), int(1), int(1), int(1), int(1), int(1), int(20)],
            vec![int(1), int(1), int(1), int(1), int(1), int(2), int(30)],
            vec![int(1), int(1), int(1), int(1), int(1), int(2), int(40)],
        ];
        let child = child_from_rows(&rows, &names);
        let group_vars: Vec<Variable> =
            names[..6].iter().map(|n| Variable::new(*n)).collect();
        let group_by = GroupBy::new(
            child,
            group_vars,
            vec![alias(AggregateKind::Sum, false, "?v", "?sum")],
        );
        let result = group_by.compute_result(&ctx).unwrap();
        let table = result.id_table().unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.at(0, 6), Id::from_double(30.0));
        assert_eq!(table.at(1, 6), Id::from_double(70.0));
    }

    #[test]
    fn test_as_string_cache_key_is_group_order_invariant() {
        let make = |group: Vec<Variable>| {
            let child = child_from_rows(&[vec![int(1), int(2), int(3)]], &["?a", "?b", "?v"]);
            GroupBy::new(
                child,
                group,
                vec![alias(AggregateKind::Count, false, "?v", "?count")],
            )
        };
        let one = make(vec![var("?a"), var("?b")]);
        let two = make(vec![var("?b"), var("?a")]);
        assert_eq!(one.as_string(0), two.as_string(0));
        assert!(one.as_string(0).contains("GROUP_BY ?a, ?b"));
        assert!(one.as_string(0).contains("COUNT(?v) AS ?count"));
    }
}
