use bytes::Bytes;

use crate::error::{ClientError, ClientResult};
use crate::op::{BatchKind, OperationBatch};

/// Default upper bound on an encoded batch payload.
pub const MAX_BATCH_SIZE: usize = 64 * 1024 * 1024;

const TAG_READ: u8 = 0x01;
const TAG_WRITE: u8 = 0x02;

/// A batch as handed to the [`Dispatcher`](crate::dispatch::Dispatcher).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedBatch {
    bytes: Bytes,
    kind: BatchKind,
    ops: usize,
}

impl EncodedBatch {
    /// The framed bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Number of sub-operations in the batch.
    pub fn op_count(&self) -> usize {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(&self) -> ClientResult<OperationBatch> {
        BatchCodec::decode(&self.bytes).map(|(batch, _)| batch)
    }
}

/// Codec for operation batches.
///
/// Frame layout: `[4 bytes len (big-endian)][1 byte kind tag][bincode payload]`,
/// where `len` counts the tag and the payload.
pub struct BatchCodec;

impl BatchCodec {
    /// Encode `batch`, rejecting payloads larger than `max_size`.
    pub fn encode(batch: &OperationBatch, max_size: usize) -> ClientResult<EncodedBatch> {
        let payload =
            bincode::serialize(batch).map_err(|e| ClientError::Codec(e.to_string()))?;
        if payload.len() > max_size {
            return Err(ClientError::BatchTooLarge {
                size: payload.len(),
                max: max_size,
            });
        }
        let len = u32::try_from(payload.len() + 1).map_err(|_| ClientError::BatchTooLarge {
            size: payload.len(),
            max: max_size,
        })?;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(tag(batch.kind()));
        buf.extend_from_slice(&payload);
        Ok(EncodedBatch {
            bytes: Bytes::from(buf),
            kind: batch.kind(),
            ops: batch.len(),
        })
    }

    /// Decode one framed batch. Returns the batch and the bytes consumed.
    pub fn decode(data: &[u8]) -> ClientResult<(OperationBatch, usize)> {
        if data.len() < 5 {
            return Err(ClientError::Codec("frame too short".into()));
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len < 1 {
            return Err(ClientError::Codec("zero-length frame".into()));
        }
        let total = 4 + len;
        if data.len() < total {
            return Err(ClientError::Codec(format!(
                "incomplete frame: have {}, need {total}",
                data.len()
            )));
        }
        let kind = match data[4] {
            TAG_READ => BatchKind::Read,
            TAG_WRITE => BatchKind::Write,
            other => return Err(ClientError::Codec(format!("unknown batch tag {other:#04x}"))),
        };
        let batch: OperationBatch = bincode::deserialize(&data[5..total])
            .map_err(|e| ClientError::Codec(e.to_string()))?;
        if batch.kind() != kind {
            return Err(ClientError::Codec("batch tag does not match payload".into()));
        }
        Ok((batch, total))
    }
}

fn tag(kind: BatchKind) -> u8 {
    match kind {
        BatchKind::Read => TAG_READ,
        BatchKind::Write => TAG_WRITE,
    }
}
