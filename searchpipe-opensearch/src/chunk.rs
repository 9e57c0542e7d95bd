//! Grouping operations into size-bounded bulk batches.

use crate::error::Result;
use crate::operation::Operation;
use futures::stream::{self, Stream, StreamExt};

/// Default maximum number of operations per batch.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default maximum serialized size of a batch (100 MiB).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 100 * 1024 * 1024;

/// Bounds applied while batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Maximum operations per batch.
    pub max_items: usize,
    /// Maximum serialized bytes per batch, newlines included.
    pub max_bytes: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_CHUNK_SIZE,
            max_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

impl ChunkLimits {
    /// Limits with the given bounds. A zero item bound is treated as one.
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            max_bytes,
        }
    }
}

/// An operation with its serialized bulk lines.
#[derive(Debug, Clone)]
pub struct BatchItem {
    operation: Operation,
    action_line: String,
    data_line: Option<String>,
}

impl BatchItem {
    /// Serialize an operation.
    pub fn new(operation: Operation) -> Result<Self> {
        let action_line = operation.action_line()?;
        let data_line = operation.data_line()?;
        Ok(Self {
            operation,
            action_line,
            data_line,
        })
    }

    /// The original operation.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Bytes this item adds to a bulk body, newlines included.
    pub fn byte_size(&self) -> usize {
        self.action_line.len() + 1 + self.data_line.as_ref().map_or(0, |d| d.len() + 1)
    }

    fn write_to(&self, body: &mut String) {
        body.push_str(&self.action_line);
        body.push('\n');
        if let Some(data) = &self.data_line {
            body.push_str(data);
            body.push('\n');
        }
    }
}

/// An ordered group of operations sent as one bulk request.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<BatchItem>,
    byte_size: usize,
}

impl Batch {
    /// Number of operations.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialized size, newlines included.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Items in order.
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Item at `index`.
    pub fn item(&self, index: usize) -> Option<&BatchItem> {
        self.items.get(index)
    }

    /// NDJSON body for the whole batch.
    pub fn body(&self) -> String {
        let mut body = String::with_capacity(self.byte_size);
        for item in &self.items {
            item.write_to(&mut body);
        }
        body
    }

    /// NDJSON body for a subset of items, in the order given.
    pub fn body_for(&self, positions: &[usize]) -> String {
        let mut body = String::new();
        for item in positions.iter().filter_map(|&p| self.items.get(p)) {
            item.write_to(&mut body);
        }
        body
    }

    fn push(&mut self, item: BatchItem) {
        self.byte_size += item.byte_size();
        self.items.push(item);
    }
}

/// Incremental batch builder shared by the iterator and stream chunkers.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    limits: ChunkLimits,
    current: Batch,
}

impl BatchBuilder {
    /// Builder with the given limits.
    pub fn new(limits: ChunkLimits) -> Self {
        Self {
            limits,
            current: Batch::default(),
        }
    }

    /// Add an item; returns the previous batch when the item does not fit.
    ///
    /// An item larger than `max_bytes` still becomes a batch on its own.
    pub fn push(&mut self, item: BatchItem) -> Option<Batch> {
        let full = !self.current.is_empty()
            && (self.current.byte_size + item.byte_size() > self.limits.max_bytes
                || self.current.len() >= self.limits.max_items);

        let flushed = if full {
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };

        self.current.push(item);
        flushed
    }

    /// Take the pending batch, if any.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Lazily groups an iterator of operations into batches.
pub struct Chunker<I> {
    operations: I,
    builder: BatchBuilder,
    done: bool,
}

impl<I> Chunker<I>
where
    I: Iterator<Item = Operation>,
{
    /// Wrap an operation iterator.
    pub fn new(operations: I, limits: ChunkLimits) -> Self {
        Self {
            operations,
            builder: BatchBuilder::new(limits),
            done: false,
        }
    }
}

impl<I> Iterator for Chunker<I>
where
    I: Iterator<Item = Operation>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        for operation in self.operations.by_ref() {
            let item = match BatchItem::new(operation) {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            if let Some(batch) = self.builder.push(item) {
                return Some(Ok(batch));
            }
        }

        self.done = true;
        self.builder.finish().map(Ok)
    }
}

/// Group a fallible stream of operations into batches.
///
/// The first error from the source (or from serialization) is yielded and
/// ends the stream.
pub fn chunk_stream<S>(operations: S, limits: ChunkLimits) -> impl Stream<Item = Result<Batch>>
where
    S: Stream<Item = Result<Operation>> + Unpin,
{
    stream::unfold(
        (operations, BatchBuilder::new(limits), false),
        |(mut operations, mut builder, done)| async move {
            if done {
                return None;
            }
            while let Some(next) = operations.next().await {
                let item = match next.and_then(BatchItem::new) {
                    Ok(item) => item,
                    Err(e) => return Some((Err(e), (operations, builder, true))),
                };
                if let Some(batch) = builder.push(item) {
                    return Some((Ok(batch), (operations, builder, false)));
                }
            }
            builder
                .finish()
                .map(|batch| (Ok(batch), (operations, builder, true)))
        },
    )
}
