//! Name-paths, collab ids, and the wire codec for transaction/message frames
//!.

use crate::error::{CollabError, Result};
use crate::replica::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Ordered sequence of child-name strings locating a collab from the root.
/// The empty sequence denotes the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamePath(Vec<String>);

impl NamePath {
    /// The root name-path (empty sequence).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a name-path from an iterator of child names, root-to-leaf.
    pub fn from_segments(segments: impl IntoIterator<Item = String>) -> Self {
        Self(segments.into_iter().collect())
    }

    /// Return a new name-path with one more segment appended.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Split into the first segment (the top-level registered name) and the
    /// remaining suffix, used by the runtime to route one hop at a time.
    pub fn split_first(&self) -> Option<(&str, NamePath)> {
        let (head, rest) = self.0.split_first()?;
        Some((head.as_str(), NamePath(rest.to_vec())))
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments, root-to-leaf.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

/// Opaque reference to a collab, serialized as its name-path. Round-trips
/// to a live collab via `Runtime::resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollabId(NamePath);

impl CollabId {
    /// Wrap a name-path as a collab id.
    pub fn new(path: NamePath) -> Self {
        Self(path)
    }

    /// The underlying name-path.
    pub fn path(&self) -> &NamePath {
        &self.0
    }
}

// --- varint codec -----------------------------------------------------
//
// Unsigned LEB128: seven payload bits per byte, high bit set on every byte
// but the last. Groups are emitted most-significant-group-first so a
// byte-for-byte trace reads as a big-endian quantity once fully consumed.

/// Append `value` to `buf` as a varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    let mut groups = Vec::new();
    loop {
        groups.push((value & 0x7f) as u8);
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for (i, group) in groups.iter().rev().enumerate() {
        let is_last = i == groups.len() - 1;
        let byte = if is_last { *group } else { group | 0x80 };
        buf.push(byte);
    }
}

/// Decode a varint from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn read_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (consumed, byte) in bytes.iter().enumerate() {
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, consumed + 1));
        }
        if consumed >= 9 {
            return Err(CollabError::malformed("varint longer than 10 bytes"));
        }
    }
    Err(CollabError::malformed("truncated varint"))
}

/// A replica-id dictionary shared per transaction to avoid repeating full
/// 11-byte ids; indices are stable within a transaction only.
#[derive(Debug, Default)]
pub struct ReplicaDictionary {
    by_id: HashMap<ReplicaId, u32>,
    by_index: Vec<ReplicaId>,
}

impl ReplicaDictionary {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a replica id, returning its stable index in this dictionary.
    pub fn intern(&mut self, id: ReplicaId) -> u32 {
        if let Some(&idx) = self.by_id.get(&id) {
            return idx;
        }
        let idx = self.by_index.len() as u32;
        self.by_index.push(id);
        self.by_id.insert(id, idx);
        idx
    }

    /// Resolve a dictionary index back to a replica id.
    pub fn resolve(&self, index: u32) -> Result<ReplicaId> {
        self.by_index
            .get(index as usize)
            .copied()
            .ok_or_else(|| CollabError::malformed(format!("unknown replica index {index}")))
    }
}

/// One routed message: a name-path (popped one frame per hop by the
/// runtime) plus the primitive's opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Destination name-path, root-to-leaf.
    pub name_path: NamePath,
    /// Primitive-defined payload, opaque to the runtime.
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Construct a message addressed at `name_path` carrying `payload`.
    pub fn new(name_path: NamePath, payload: Vec<u8>) -> Self {
        Self { name_path, payload }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.name_path.segments().len() as u64);
        for segment in self.name_path.segments() {
            write_varint(buf, segment.len() as u64);
            buf.extend_from_slice(segment.as_bytes());
        }
        write_varint(buf, self.payload.len() as u64);
        buf.extend_from_slice(&self.payload);
    }

    fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let (frame_count, used) = read_varint(&bytes[offset..])?;
        offset += used;
        let mut segments = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let (len, used) = read_varint(&bytes[offset..])?;
            offset += used;
            let end = offset + len as usize;
            let s = std::str::from_utf8(
                bytes
                    .get(offset..end)
                    .ok_or_else(|| CollabError::malformed("truncated name frame"))?,
            )
            .map_err(|_| CollabError::malformed("non-utf8 name frame"))?
            .to_string();
            segments.push(s);
            offset = end;
        }
        let (payload_len, used) = read_varint(&bytes[offset..])?;
        offset += used;
        let end = offset + payload_len as usize;
        let payload = bytes
            .get(offset..end)
            .ok_or_else(|| CollabError::malformed("truncated payload"))?
            .to_vec();
        offset = end;
        Ok((
            WireMessage {
                name_path: NamePath::from_segments(segments),
                payload,
            },
            offset,
        ))
    }
}

/// One causal-metadata-stamped group of messages sharing a single
/// `senderCounter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireTransaction {
    /// The sending replica.
    pub sender: ReplicaId,
    /// This replica's per-message sequence number for the transaction.
    pub sender_counter: u64,
    /// Lamport timestamp, if requested by any emitting primitive.
    pub lamport: Option<u64>,
    /// Wall-clock milliseconds since epoch, if requested.
    pub wall_clock: Option<u64>,
    /// Causal dependency prefix: (replica, counter) pairs this transaction
    /// causally depends on.
    pub vc_prefix: Vec<(ReplicaId, u64)>,
    /// The messages committed in this transaction, in send order.
    pub messages: Vec<WireMessage>,
}

impl WireTransaction {
    /// Serialize to the canonical wire format: replica id, varint sender
    /// counter, optional lamport/wall-clock fields, varint-prefixed
    /// vc-prefix entries, then varint-prefixed messages.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.sender.as_bytes());
        write_varint(&mut buf, self.sender_counter);

        buf.push(u8::from(self.lamport.is_some()));
        if let Some(l) = self.lamport {
            write_varint(&mut buf, l);
        }
        buf.push(u8::from(self.wall_clock.is_some()));
        if let Some(w) = self.wall_clock {
            write_varint(&mut buf, w);
        }

        write_varint(&mut buf, self.vc_prefix.len() as u64);
        for (replica, counter) in &self.vc_prefix {
            buf.extend_from_slice(replica.as_bytes());
            write_varint(&mut buf, *counter);
        }

        write_varint(&mut buf, self.messages.len() as u64);
        for message in &self.messages {
            message.encode(&mut buf);
        }
        buf
    }

    /// Deserialize from bytes produced by [`WireTransaction::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let sender = read_replica_id(bytes, &mut offset)?;
        let (sender_counter, used) = read_varint(&bytes[offset..])?;
        offset += used;

        let has_lamport = *bytes
            .get(offset)
            .ok_or_else(|| CollabError::malformed("truncated transaction"))?
            != 0;
        offset += 1;
        let lamport = if has_lamport {
            let (v, used) = read_varint(&bytes[offset..])?;
            offset += used;
            Some(v)
        } else {
            None
        };

        let has_wall_clock = *bytes
            .get(offset)
            .ok_or_else(|| CollabError::malformed("truncated transaction"))?
            != 0;
        offset += 1;
        let wall_clock = if has_wall_clock {
            let (v, used) = read_varint(&bytes[offset..])?;
            offset += used;
            Some(v)
        } else {
            None
        };

        let (vc_count, used) = read_varint(&bytes[offset..])?;
        offset += used;
        let mut vc_prefix = Vec::with_capacity(vc_count as usize);
        for _ in 0..vc_count {
            let replica = read_replica_id(bytes, &mut offset)?;
            let (counter, used) = read_varint(&bytes[offset..])?;
            offset += used;
            vc_prefix.push((replica, counter));
        }

        let (message_count, used) = read_varint(&bytes[offset..])?;
        offset += used;
        let mut messages = Vec::with_capacity(message_count as usize);
        for _ in 0..message_count {
            let (message, used) = WireMessage::decode(&bytes[offset..])?;
            offset += used;
            messages.push(message);
        }

        Ok(WireTransaction {
            sender,
            sender_counter,
            lamport,
            wall_clock,
            vc_prefix,
            messages,
        })
    }
}

fn read_replica_id(bytes: &[u8], offset: &mut usize) -> Result<ReplicaId> {
    use crate::replica::REPLICA_ID_LEN;
    let end = *offset + REPLICA_ID_LEN;
    let slice = bytes
        .get(*offset..end)
        .ok_or_else(|| CollabError::malformed("truncated replica id"))?;
    let mut arr = [0u8; REPLICA_ID_LEN];
    arr.copy_from_slice(slice);
    *offset = end;
    Ok(ReplicaId::from_bytes(arr))
}

/// Frame one node's own save bytes together with its named children's
/// already-framed blobs persisted-state layout:
/// `(selfBytesLen, selfBytes, childCount, (nameLen, name, childBlob)*)`.
pub fn encode_framed_save(self_bytes: &[u8], children: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, self_bytes.len() as u64);
    buf.extend_from_slice(self_bytes);
    write_varint(&mut buf, children.len() as u64);
    for (name, blob) in children {
        write_varint(&mut buf, name.len() as u64);
        buf.extend_from_slice(name.as_bytes());
        write_varint(&mut buf, blob.len() as u64);
        buf.extend_from_slice(blob);
    }
    buf
}

/// Inverse of [`encode_framed_save`]. Saves are self-describing: a decoder
/// that doesn't recognize a child name is free to ignore it, which is how
/// older saves with missing fields load with defaults.
pub fn decode_framed_save(bytes: &[u8]) -> Result<(Vec<u8>, Vec<(String, Vec<u8>)>)> {
    let mut offset = 0;
    let (self_len, used) = read_varint(&bytes[offset..])?;
    offset += used;
    let end = offset + self_len as usize;
    let self_bytes = bytes
        .get(offset..end)
        .ok_or_else(|| CollabError::malformed("truncated self bytes"))?
        .to_vec();
    offset = end;

    let (child_count, used) = read_varint(&bytes[offset..])?;
    offset += used;
    let mut children = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        let (name_len, used) = read_varint(&bytes[offset..])?;
        offset += used;
        let end = offset + name_len as usize;
        let name = std::str::from_utf8(
            bytes
                .get(offset..end)
                .ok_or_else(|| CollabError::malformed("truncated child name"))?,
        )
        .map_err(|_| CollabError::malformed("non-utf8 child name"))?
        .to_string();
        offset = end;

        let (blob_len, used) = read_varint(&bytes[offset..])?;
        offset += used;
        let end = offset + blob_len as usize;
        let blob = bytes
            .get(offset..end)
            .ok_or_else(|| CollabError::malformed("truncated child blob"))?
            .to_vec();
        offset = end;

        children.push((name, blob));
    }
    Ok((self_bytes, children))
}
