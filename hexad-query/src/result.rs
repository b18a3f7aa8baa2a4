//! The result carrier produced by every operator
//!
//! A `QueryResult` is either fully materialized (one `IdTable`) or lazy (a
//! single-consumer sequence of `IdTable` chunks). Both variants carry the
//! columns the rows are sorted by and a shared local vocabulary.
//!
//! Invariants are verified where they are cheapest: at construction for
//! materialized results, per chunk (and across chunk boundaries) during
//! consumption for lazy ones. The per-row checks are gated by
//! [`crate::checks::expensive_checks_enabled`]; skipping them never changes
//! the emitted data.
//!
//! The lazy side composes by wrapping the underlying producer: limit/offset
//! windowing, limit assertion, definedness checking, consumption caching
//! and chunk callbacks each add one decorator. The finish callback of
//! [`QueryResult::run_on_new_chunk_computed`] fires exactly once per
//! result: on complete consumption, on an early stop (the consumer drops
//! the stream), or with `error = true` when the producer fails.

use crate::checks::expensive_checks_enabled;
use crate::chunks::{BoxedChunkProducer, ChunkProducer};
use crate::error::{QueryError, Result};
use crate::variable::{Definedness, VariableToColumnMap};
use hexad_core::{Id, IdTable, SharedLocalVocab};
use std::mem;
use std::time::{Duration, Instant};

/// A query's `LIMIT` / `OFFSET` clause. `limit: None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LimitOffsetClause {
    pub limit: Option<u64>,
    pub offset: u64,
}

impl LimitOffsetClause {
    /// Clause with the given limit and offset.
    pub fn new(limit: impl Into<Option<u64>>, offset: u64) -> Self {
        Self {
            limit: limit.into(),
            offset,
        }
    }
}

enum ResultData {
    Materialized(IdTable),
    Lazy(BoxedChunkProducer),
    Consumed,
}

/// Carrier of an operator's output: a materialized table or a one-shot
/// stream of chunks, plus sort metadata and the shared local vocabulary.
pub struct QueryResult {
    data: ResultData,
    sorted_by: Vec<usize>,
    local_vocab: SharedLocalVocab,
}

impl QueryResult {
    /// Result around an owned, fully computed table.
    ///
    /// Sort columns are checked against the column count; when expensive
    /// checks are enabled the rows are verified to be non-descending under
    /// the lexicographic comparison on `sorted_by`.
    pub fn materialized(
        table: IdTable,
        sorted_by: Vec<usize>,
        local_vocab: SharedLocalVocab,
    ) -> Result<Self> {
        check_sort_columns_in_range(&sorted_by, table.num_columns())?;
        if expensive_checks_enabled() {
            let mut previous: Option<Vec<Id>> = None;
            verify_chunk_sorted(&table, &sorted_by, &mut previous, 0)?;
        }
        Ok(Self::materialized_unchecked(table, sorted_by, local_vocab))
    }

    pub(crate) fn materialized_unchecked(
        table: IdTable,
        sorted_by: Vec<usize>,
        local_vocab: SharedLocalVocab,
    ) -> Self {
        Self {
            data: ResultData::Materialized(table),
            sorted_by,
            local_vocab,
        }
    }

    /// Result around a lazy chunk sequence.
    ///
    /// Checks are deferred: every consumed chunk is verified against the
    /// sort metadata, including across chunk boundaries.
    pub fn lazy(
        producer: impl ChunkProducer + 'static,
        sorted_by: Vec<usize>,
        local_vocab: SharedLocalVocab,
    ) -> Self {
        let checker = SortCheckProducer {
            inner: Box::new(producer),
            sorted_by: sorted_by.clone(),
            previous_row: None,
            rows_seen: 0,
        };
        Self {
            data: ResultData::Lazy(Box::new(checker)),
            sorted_by,
            local_vocab,
        }
    }

    /// Whether this result owns a fully computed table.
    pub fn is_fully_materialized(&self) -> bool {
        matches!(self.data, ResultData::Materialized(_))
    }

    /// The columns the rows are guaranteed to be sorted by.
    pub fn sorted_by(&self) -> &[usize] {
        &self.sorted_by
    }

    /// Shareable handle to the result's local vocabulary.
    pub fn get_shared_local_vocab(&self) -> SharedLocalVocab {
        self.local_vocab.clone()
    }

    /// Borrow the materialized table.
    pub fn id_table(&self) -> Result<&IdTable> {
        match &self.data {
            ResultData::Materialized(table) => Ok(table),
            _ => Err(QueryError::WrongVariant(
                "id_table requires a fully materialized result",
            )),
        }
    }

    /// Take the one-shot chunk stream of a lazy result.
    ///
    /// Fails with `WrongVariant` on a materialized result and with
    /// `AlreadyConsumed` on the second call.
    pub fn id_tables(&mut self) -> Result<ChunkStream> {
        match mem::replace(&mut self.data, ResultData::Consumed) {
            ResultData::Lazy(producer) => Ok(ChunkStream {
                producer: Some(producer),
            }),
            ResultData::Materialized(table) => {
                self.data = ResultData::Materialized(table);
                Err(QueryError::WrongVariant(
                    "id_tables requires a lazy result",
                ))
            }
            ResultData::Consumed => Err(QueryError::AlreadyConsumed),
        }
    }

    /// Register a per-chunk callback and a finish callback on a lazy
    /// result.
    ///
    /// `on_chunk` receives every yielded chunk together with the wall time
    /// since the previous yield (or since registration for the first
    /// chunk). `on_finish` fires exactly once: with `false` after complete
    /// consumption or an early stop, with `true` when the producer fails.
    pub fn run_on_new_chunk_computed(
        &mut self,
        on_chunk: impl FnMut(&IdTable, Duration) + Send + 'static,
        on_finish: impl FnOnce(bool) + Send + 'static,
    ) -> Result<()> {
        let inner = self.take_lazy()?;
        self.data = ResultData::Lazy(Box::new(CallbackProducer {
            inner,
            on_chunk: Box::new(on_chunk),
            on_finish: Some(Box::new(on_finish)),
            last_yield: Instant::now(),
        }));
        Ok(())
    }

    /// Restrict the result to the window described by `clause`, in place.
    ///
    /// Materialized results are sliced immediately and `on_chunk` fires
    /// once. Lazy results are wrapped so every downstream chunk is the
    /// next slice of the window and `on_chunk` fires per emitted chunk with
    /// the elapsed wall time. The sort metadata is unaffected.
    pub fn apply_limit_offset(
        &mut self,
        clause: LimitOffsetClause,
        mut on_chunk: impl FnMut(Duration, &IdTable) + Send + 'static,
    ) -> Result<()> {
        match &mut self.data {
            ResultData::Materialized(table) => {
                let started = Instant::now();
                let len = clause
                    .limit
                    .map_or(usize::MAX, |limit| limit.min(usize::MAX as u64) as usize);
                *table = table.window(clause.offset as usize, len);
                on_chunk(started.elapsed(), table);
                Ok(())
            }
            ResultData::Lazy(_) => {
                let inner = self.take_lazy()?;
                self.data = ResultData::Lazy(Box::new(LimitOffsetProducer {
                    inner,
                    remaining_offset: clause.offset,
                    remaining_limit: clause.limit.unwrap_or(u64::MAX),
                    on_chunk: Box::new(on_chunk),
                    last_yield: Instant::now(),
                    exhausted: false,
                }));
                Ok(())
            }
            ResultData::Consumed => Err(QueryError::AlreadyConsumed),
        }
    }

    /// Verify that the result emits at most `clause.limit` rows.
    ///
    /// Immediate for materialized results; lazy results are wrapped and the
    /// stream fails at the chunk that exceeds the limit.
    pub fn assert_that_limit_was_respected(&mut self, clause: LimitOffsetClause) -> Result<()> {
        let Some(limit) = clause.limit else {
            return Ok(());
        };
        match &mut self.data {
            ResultData::Materialized(table) => {
                let rows = table.num_rows() as u64;
                if rows > limit {
                    return Err(QueryError::LimitExceeded { limit, rows });
                }
                Ok(())
            }
            ResultData::Lazy(_) => {
                let inner = self.take_lazy()?;
                self.data = ResultData::Lazy(Box::new(LimitCheckProducer {
                    inner,
                    limit,
                    rows_seen: 0,
                }));
                Ok(())
            }
            ResultData::Consumed => Err(QueryError::AlreadyConsumed),
        }
    }

    /// Verify that no column declared `AlwaysDefined` in `var_to_col`
    /// contains `UNDEFINED`.
    ///
    /// Gated by the expensive-check switch. Immediate for materialized
    /// results; lazy results fail on the consumption step that observes
    /// the offending row.
    pub fn check_definedness(&mut self, var_to_col: &VariableToColumnMap) -> Result<()> {
        if !expensive_checks_enabled() {
            return Ok(());
        }
        let mut columns: Vec<(String, usize)> = var_to_col
            .iter()
            .filter(|(_, info)| info.definedness == Definedness::AlwaysDefined)
            .map(|(variable, info)| (variable.name().to_string(), info.column_index))
            .collect();
        columns.sort_by_key(|(_, column)| *column);
        if columns.is_empty() {
            return Ok(());
        }

        match &mut self.data {
            ResultData::Materialized(table) => verify_chunk_defined(table, &columns, 0),
            ResultData::Lazy(_) => {
                let inner = self.take_lazy()?;
                self.data = ResultData::Lazy(Box::new(DefinednessProducer {
                    inner,
                    columns,
                    rows_seen: 0,
                }));
                Ok(())
            }
            ResultData::Consumed => Err(QueryError::AlreadyConsumed),
        }
    }

    /// Accumulate the stream into a materialized aggregate while it is
    /// being consumed.
    ///
    /// `should_cache(aggregator_so_far, next_chunk)` is consulted per
    /// chunk; as long as it returns `true` the chunk is appended to the
    /// aggregator. When the stream completes without the predicate ever
    /// declining, `on_done` receives the materialized copy. A single
    /// `false` abandons caching for good; chunks keep flowing downstream
    /// unchanged either way.
    pub fn cache_during_consumption(
        &mut self,
        should_cache: impl FnMut(&Option<IdTable>, &IdTable) -> bool + Send + 'static,
        on_done: impl FnOnce(QueryResult) + Send + 'static,
    ) -> Result<()> {
        let inner = self.take_lazy()?;
        self.data = ResultData::Lazy(Box::new(CachingProducer {
            inner,
            aggregator: None,
            predicate: Some(Box::new(should_cache)),
            on_done: Some(Box::new(on_done)),
            sorted_by: self.sorted_by.clone(),
            local_vocab: self.local_vocab.clone(),
        }));
        Ok(())
    }

    fn take_lazy(&mut self) -> Result<BoxedChunkProducer> {
        match mem::replace(&mut self.data, ResultData::Consumed) {
            ResultData::Lazy(producer) => Ok(producer),
            ResultData::Materialized(table) => {
                self.data = ResultData::Materialized(table);
                Err(QueryError::WrongVariant(
                    "this operation requires a lazy result",
                ))
            }
            ResultData::Consumed => Err(QueryError::AlreadyConsumed),
        }
    }
}

/// The one-shot stream handed out by [`QueryResult::id_tables`].
///
/// Iteration yields `Result<IdTable>`; after an error or the natural end
/// the stream is fused. Dropping the stream early counts as an early stop
/// for any registered finish callback.
pub struct ChunkStream {
    producer: Option<BoxedChunkProducer>,
}

impl Iterator for ChunkStream {
    type Item = Result<IdTable>;

    fn next(&mut self) -> Option<Self::Item> {
        let producer = self.producer.as_mut()?;
        match producer.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.producer = None;
                None
            }
            Err(error) => {
                self.producer = None;
                Some(Err(error))
            }
        }
    }
}

fn check_sort_columns_in_range(sorted_by: &[usize], num_columns: usize) -> Result<()> {
    match sorted_by.iter().find(|&&column| column >= num_columns) {
        Some(&column) => Err(QueryError::InvalidSortColumn {
            column,
            num_columns,
        }),
        None => Ok(()),
    }
}

/// Check one chunk against the sort metadata, continuing from the last row
/// of the previous chunk. `row_offset` is the absolute index of the
/// chunk's first row, used for diagnostics.
fn verify_chunk_sorted(
    chunk: &IdTable,
    sorted_by: &[usize],
    previous_row: &mut Option<Vec<Id>>,
    row_offset: usize,
) -> Result<()> {
    if sorted_by.is_empty() {
        return Ok(());
    }
    for row in 0..chunk.num_rows() {
        if let Some(previous) = previous_row.as_deref() {
            let descending = sorted_by
                .iter()
                .map(|&column| (previous[column], chunk.at(row, column)))
                .find(|(a, b)| a != b)
                .is_some_and(|(a, b)| a > b);
            if descending {
                return Err(QueryError::SortOrderViolated {
                    row: row_offset + row,
                    columns: sorted_by.to_vec(),
                });
            }
        }
        *previous_row = Some(chunk.row_vec(row));
    }
    Ok(())
}

fn verify_chunk_defined(
    chunk: &IdTable,
    columns: &[(String, usize)],
    row_offset: usize,
) -> Result<()> {
    for row in 0..chunk.num_rows() {
        for (variable, column) in columns {
            if *column < chunk.num_columns() && chunk.at(row, *column).is_undefined() {
                return Err(QueryError::DefinednessViolated {
                    variable: variable.clone(),
                    row: row_offset + row,
                });
            }
        }
    }
    Ok(())
}

/// Innermost wrapper of every lazy result: bounds-checks the sort columns
/// against each chunk and, when expensive checks are enabled, verifies the
/// sort order within and across chunks.
struct SortCheckProducer {
    inner: BoxedChunkProducer,
    sorted_by: Vec<usize>,
    previous_row: Option<Vec<Id>>,
    rows_seen: usize,
}

impl ChunkProducer for SortCheckProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        let Some(chunk) = self.inner.next_chunk()? else {
            return Ok(None);
        };
        check_sort_columns_in_range(&self.sorted_by, chunk.num_columns())?;
        if expensive_checks_enabled() {
            verify_chunk_sorted(
                &chunk,
                &self.sorted_by,
                &mut self.previous_row,
                self.rows_seen,
            )?;
        }
        self.rows_seen += chunk.num_rows();
        Ok(Some(chunk))
    }
}

struct DefinednessProducer {
    inner: BoxedChunkProducer,
    columns: Vec<(String, usize)>,
    rows_seen: usize,
}

impl ChunkProducer for DefinednessProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        let Some(chunk) = self.inner.next_chunk()? else {
            return Ok(None);
        };
        verify_chunk_defined(&chunk, &self.columns, self.rows_seen)?;
        self.rows_seen += chunk.num_rows();
        Ok(Some(chunk))
    }
}

type OnChunk = Box<dyn FnMut(&IdTable, Duration) + Send>;
type OnFinish = Box<dyn FnOnce(bool) + Send>;

struct CallbackProducer {
    inner: BoxedChunkProducer,
    on_chunk: OnChunk,
    on_finish: Option<OnFinish>,
    last_yield: Instant,
}

impl ChunkProducer for CallbackProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        match self.inner.next_chunk() {
            Ok(Some(chunk)) => {
                (self.on_chunk)(&chunk, self.last_yield.elapsed());
                self.last_yield = Instant::now();
                Ok(Some(chunk))
            }
            Ok(None) => {
                if let Some(on_finish) = self.on_finish.take() {
                    on_finish(false);
                }
                Ok(None)
            }
            Err(error) => {
                if let Some(on_finish) = self.on_finish.take() {
                    on_finish(true);
                }
                Err(error)
            }
        }
    }
}

impl Drop for CallbackProducer {
    fn drop(&mut self) {
        // Early stop: the consumer went away before the stream ended.
        if let Some(on_finish) = self.on_finish.take() {
            on_finish(false);
        }
    }
}

struct LimitOffsetProducer {
    inner: BoxedChunkProducer,
    remaining_offset: u64,
    remaining_limit: u64,
    on_chunk: Box<dyn FnMut(Duration, &IdTable) + Send>,
    last_yield: Instant,
    exhausted: bool,
}

impl ChunkProducer for LimitOffsetProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        loop {
            if self.exhausted || self.remaining_limit == 0 {
                return Ok(None);
            }
            let Some(chunk) = self.inner.next_chunk()? else {
                self.exhausted = true;
                return Ok(None);
            };
            let rows = chunk.num_rows() as u64;
            if self.remaining_offset >= rows {
                self.remaining_offset -= rows;
                continue;
            }
            let start = self.remaining_offset as usize;
            self.remaining_offset = 0;
            let take = (rows - start as u64).min(self.remaining_limit);
            self.remaining_limit -= take;
            let window = chunk.window(start, take as usize);
            if window.is_empty() {
                continue;
            }
            (self.on_chunk)(self.last_yield.elapsed(), &window);
            self.last_yield = Instant::now();
            return Ok(Some(window));
        }
    }
}

struct LimitCheckProducer {
    inner: BoxedChunkProducer,
    limit: u64,
    rows_seen: u64,
}

impl ChunkProducer for LimitCheckProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        let Some(chunk) = self.inner.next_chunk()? else {
            return Ok(None);
        };
        self.rows_seen += chunk.num_rows() as u64;
        if self.rows_seen > self.limit {
            return Err(QueryError::LimitExceeded {
                limit: self.limit,
                rows: self.rows_seen,
            });
        }
        Ok(Some(chunk))
    }
}

type CachePredicate = Box<dyn FnMut(&Option<IdTable>, &IdTable) -> bool + Send>;
type OnCacheDone = Box<dyn FnOnce(QueryResult) + Send>;

struct CachingProducer {
    inner: BoxedChunkProducer,
    aggregator: Option<IdTable>,
    predicate: Option<CachePredicate>,
    on_done: Option<OnCacheDone>,
    sorted_by: Vec<usize>,
    local_vocab: SharedLocalVocab,
}

impl ChunkProducer for CachingProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        match self.inner.next_chunk() {
            Ok(Some(chunk)) => {
                if let Some(predicate) = self.predicate.as_mut() {
                    if predicate(&self.aggregator, &chunk) {
                        match self.aggregator.as_mut() {
                            Some(aggregator) => aggregator.append(&chunk),
                            None => self.aggregator = Some(chunk.clone()),
                        }
                    } else {
                        // Caching abandoned for good; the stream itself is
                        // unaffected.
                        self.predicate = None;
                        self.on_done = None;
                        self.aggregator = None;
                    }
                }
                Ok(Some(chunk))
            }
            Ok(None) => {
                if let (Some(on_done), Some(aggregator)) =
                    (self.on_done.take(), self.aggregator.take())
                {
                    on_done(QueryResult::materialized_unchecked(
                        aggregator,
                        self.sorted_by.clone(),
                        self.local_vocab.clone(),
                    ));
                }
                Ok(None)
            }
            Err(error) => {
                self.predicate = None;
                self.on_done = None;
                self.aggregator = None;
                Err(error)
            }
        }
    }
}
