//! Chunk producers
//!
//! A lazy result is backed by a `ChunkProducer`: an explicit object stepped
//! with `next_chunk`, yielding `Ok(Some(chunk))` until the stream ends with
//! `Ok(None)` or fails with an error. Producers compose by wrapping
//! (checking, windowing, caching, see `result.rs`); a producer that does
//! real work (block fetch, decompression, delta merge) can be moved to its
//! own OS thread with [`WorkerProducer`], which hands chunks to the single
//! consumer over a bounded channel and stops cooperatively through a
//! cancellation token checked between chunks.

use crate::error::{QueryError, Result};
use crossbeam_channel::{bounded, Receiver};
use hexad_core::{CancellationToken, IdTable};
use std::collections::VecDeque;

/// One step of a lazy chunk sequence.
pub trait ChunkProducer: Send {
    /// Produce the next chunk, `Ok(None)` at end of stream.
    ///
    /// After an error or `Ok(None)`, further calls must keep returning
    /// `Ok(None)`.
    fn next_chunk(&mut self) -> Result<Option<IdTable>>;
}

/// Boxed producer for dynamic composition.
pub type BoxedChunkProducer = Box<dyn ChunkProducer>;

impl<F> ChunkProducer for F
where
    F: FnMut() -> Result<Option<IdTable>> + Send,
{
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        self()
    }
}

/// Pass a closure through to pin down its producer signature.
///
/// Closures assigned to a variable first would otherwise leave the error
/// type of their `Result` unconstrained.
pub fn producer_fn<F>(f: F) -> F
where
    F: FnMut() -> Result<Option<IdTable>> + Send,
{
    f
}

/// Producer over a fixed list of tables. The degenerate case used by tests
/// and by operators that chunk an already computed result.
pub struct TableChunks {
    tables: VecDeque<IdTable>,
}

impl TableChunks {
    /// Produce `tables` in order.
    pub fn new(tables: Vec<IdTable>) -> Self {
        Self {
            tables: tables.into(),
        }
    }
}

impl ChunkProducer for TableChunks {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        Ok(self.tables.pop_front())
    }
}

enum WorkerMessage {
    Chunk(IdTable),
    Error(QueryError),
    Finished,
}

/// Runs a producer on its own OS thread.
///
/// Single-producer/single-consumer: the worker pushes into a bounded
/// channel (backpressure once the consumer lags by `capacity` chunks), the
/// consumer pulls through `next_chunk`. Dropping the consumer cancels the
/// token and closes the channel, which stops the worker at its next send
/// or cancellation check.
pub struct WorkerProducer {
    receiver: Receiver<WorkerMessage>,
    cancel: CancellationToken,
    done: bool,
}

impl WorkerProducer {
    /// Move `producer` to a worker thread, buffering up to `capacity`
    /// chunks.
    pub fn spawn(
        mut producer: BoxedChunkProducer,
        cancel: CancellationToken,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        let token = cancel.clone();
        std::thread::spawn(move || loop {
            if token.is_cancelled() {
                let _ = sender.send(WorkerMessage::Error(QueryError::Cancelled));
                return;
            }
            match producer.next_chunk() {
                Ok(Some(chunk)) => {
                    if sender.send(WorkerMessage::Chunk(chunk)).is_err() {
                        // Consumer is gone.
                        return;
                    }
                }
                Ok(None) => {
                    let _ = sender.send(WorkerMessage::Finished);
                    return;
                }
                Err(error) => {
                    let _ = sender.send(WorkerMessage::Error(error));
                    return;
                }
            }
        });
        Self {
            receiver,
            cancel,
            done: false,
        }
    }
}

impl ChunkProducer for WorkerProducer {
    fn next_chunk(&mut self) -> Result<Option<IdTable>> {
        if self.done {
            return Ok(None);
        }
        match self.receiver.recv() {
            Ok(WorkerMessage::Chunk(chunk)) => Ok(Some(chunk)),
            Ok(WorkerMessage::Finished) => {
                self.done = true;
                Ok(None)
            }
            Ok(WorkerMessage::Error(error)) => {
                self.done = true;
                Err(error)
            }
            Err(_) => {
                self.done = true;
                Err(QueryError::ProducerFailure(
                    "worker thread terminated without finishing its stream".to_string(),
                ))
            }
        }
    }
}

impl Drop for WorkerProducer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexad_core::Id;

    fn chunk(values: &[i64]) -> IdTable {
        let rows: Vec<Vec<Id>> = values.iter().map(|&v| vec![Id::from_int(v)]).collect();
        IdTable::from_rows(1, &rows)
    }

    #[test]
    fn test_table_chunks_yields_in_order_then_none() {
        let mut producer = TableChunks::new(vec![chunk(&[1]), chunk(&[2, 3])]);
        assert_eq!(producer.next_chunk().unwrap().unwrap().num_rows(), 1);
        assert_eq!(producer.next_chunk().unwrap().unwrap().num_rows(), 2);
        assert!(producer.next_chunk().unwrap().is_none());
        assert!(producer.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_closure_producer() {
        let mut remaining = 2i64;
        let mut producer = producer_fn(move || {
            if remaining == 0 {
                return Ok(None);
            }
            remaining -= 1;
            Ok(Some(chunk(&[remaining])))
        });
        assert!(producer.next_chunk().unwrap().is_some());
        assert!(producer.next_chunk().unwrap().is_some());
        assert!(producer.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_worker_producer_delivers_all_chunks() {
        let inner = Box::new(TableChunks::new(vec![chunk(&[1]), chunk(&[2]), chunk(&[3])]));
        let mut worker = WorkerProducer::spawn(inner, CancellationToken::new(), 2);
        let mut total = 0;
        while let Some(chunk) = worker.next_chunk().unwrap() {
            total += chunk.num_rows();
        }
        assert_eq!(total, 3);
        // Stream stays finished.
        assert!(worker.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_worker_producer_forwards_errors_once() {
        let mut first = true;
        let inner = Box::new(producer_fn(move || {
            if first {
                first = false;
                Ok(Some(chunk(&[1])))
            } else {
                Err(QueryError::ProducerFailure("boom".to_string()))
            }
        }));
        let mut worker = WorkerProducer::spawn(inner, CancellationToken::new(), 1);
        assert!(worker.next_chunk().unwrap().is_some());
        assert!(matches!(
            worker.next_chunk(),
            Err(QueryError::ProducerFailure(_))
        ));
        assert!(worker.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_worker_producer_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let inner = Box::new(TableChunks::new(vec![chunk(&[1])]));
        let mut worker = WorkerProducer::spawn(inner, cancel, 1);
        // The worker checks the token before producing anything.
        assert!(matches!(worker.next_chunk(), Err(QueryError::Cancelled)));
    }
}
