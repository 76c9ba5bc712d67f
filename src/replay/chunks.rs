//! Chunked snapshot reassembly.
//!
//! Large snapshots are split into fragments sharing a group id. Fragments
//! may arrive in any order and interleaved with whole snapshots. Output
//! order follows the first appearance of each logical snapshot in the
//! input, not the order in which groups complete.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Marker field set on chunk fragments.
const CHUNKED_MARKER: &str = "chunked";
/// Marker field name used by older clients.
const LEGACY_CHUNKED_MARKER: &str = "posthog_chunked";

/// One fragment of a chunked snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotChunk {
    #[serde(alias = "snapshot_id")]
    pub group_id: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub chunk_data: String,
}

impl SnapshotChunk {
    fn is_chunk(value: &Value) -> bool {
        [CHUNKED_MARKER, LEGACY_CHUNKED_MARKER]
            .iter()
            .any(|marker| value.get(marker).and_then(Value::as_bool) == Some(true))
    }
}

/// Why a group produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkFailureKind {
    /// The stream ended before every index arrived.
    Incomplete { expected: usize, received: usize },
    /// The concatenated payload (or the fragment itself) did not decode.
    Malformed { message: String },
}

/// Per-group reassembly failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub group_id: String,
    #[serde(flatten)]
    pub kind: ChunkFailureKind,
}

/// Result of reassembling one stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reassembly {
    pub snapshots: Vec<Value>,
    pub failures: Vec<ChunkFailure>,
}

/// Fragments collected so far for one group.
#[derive(Debug)]
struct SnapshotCollector {
    expected: usize,
    fragments: BTreeMap<usize, String>,
}

impl SnapshotCollector {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            fragments: BTreeMap::new(),
        }
    }

    fn record(&mut self, index: usize, data: String) {
        self.fragments.insert(index, data);
    }

    fn is_complete(&self) -> bool {
        self.fragments.len() == self.expected
    }

    /// Concatenate by increasing index.
    fn assemble(self) -> String {
        self.fragments.into_values().collect()
    }
}

#[derive(Debug)]
enum Slot {
    Ready(Value),
    Pending,
    Dropped,
}

#[derive(Debug)]
enum GroupState {
    Collecting {
        slot: usize,
        collector: SnapshotCollector,
    },
    Resolved,
}

/// Stateful collector for one reconstruction.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    slots: Vec<Slot>,
    groups: HashMap<String, GroupState>,
    failures: Vec<ChunkFailure>,
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a whole stream.
    pub fn reassemble(stream: impl IntoIterator<Item = Value>) -> Reassembly {
        let mut reassembler = Self::new();
        for value in stream {
            reassembler.push(value);
        }
        reassembler.finish()
    }

    /// Feed the next stream element.
    pub fn push(&mut self, value: Value) {
        if !SnapshotChunk::is_chunk(&value) {
            self.slots.push(Slot::Ready(value));
            return;
        }

        match serde_json::from_value::<SnapshotChunk>(value.clone()) {
            Ok(chunk) => self.push_chunk(chunk),
            Err(e) => {
                let group_id = value
                    .get("group_id")
                    .or_else(|| value.get("snapshot_id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                warn!(group_id = %group_id, error = %e, "Malformed snapshot chunk");
                // A valid group with this id can still complete from its
                // other fragments.
                self.failures.push(ChunkFailure {
                    group_id,
                    kind: ChunkFailureKind::Malformed {
                        message: e.to_string(),
                    },
                });
            }
        }
    }

    fn push_chunk(&mut self, chunk: SnapshotChunk) {
        let state = match self.groups.entry(chunk.group_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.slots.push(Slot::Pending);
                entry.insert(GroupState::Collecting {
                    slot: self.slots.len() - 1,
                    collector: SnapshotCollector::new(chunk.chunk_count),
                })
            }
        };

        let GroupState::Collecting { slot, collector } = state else {
            debug!(group_id = %chunk.group_id, index = chunk.chunk_index, "Chunk for resolved group ignored");
            return;
        };

        if chunk.chunk_index >= collector.expected {
            debug!(
                group_id = %chunk.group_id,
                index = chunk.chunk_index,
                expected = collector.expected,
                "Chunk index out of range ignored"
            );
            return;
        }

        collector.record(chunk.chunk_index, chunk.chunk_data);
        if !collector.is_complete() {
            return;
        }

        let slot = *slot;
        let Some(GroupState::Collecting { collector, .. }) = self
            .groups
            .insert(chunk.group_id.clone(), GroupState::Resolved)
        else {
            return;
        };

        match serde_json::from_str::<Value>(&collector.assemble()) {
            Ok(payload) => self.slots[slot] = Slot::Ready(payload),
            Err(e) => {
                warn!(group_id = %chunk.group_id, error = %e, "Reassembled snapshot failed to decode");
                self.slots[slot] = Slot::Dropped;
                self.failures.push(ChunkFailure {
                    group_id: chunk.group_id,
                    kind: ChunkFailureKind::Malformed {
                        message: e.to_string(),
                    },
                });
            }
        }
    }

    /// End the stream. Groups still collecting are reported incomplete.
    pub fn finish(mut self) -> Reassembly {
        let mut incomplete: Vec<(usize, ChunkFailure)> = self
            .groups
            .drain()
            .filter_map(|(group_id, state)| match state {
                GroupState::Collecting { slot, collector } => Some((
                    slot,
                    ChunkFailure {
                        group_id,
                        kind: ChunkFailureKind::Incomplete {
                            expected: collector.expected,
                            received: collector.fragments.len(),
                        },
                    },
                )),
                GroupState::Resolved => None,
            })
            .collect();
        incomplete.sort_by_key(|(slot, _)| *slot);

        for (_, failure) in &incomplete {
            warn!(group_id = %failure.group_id, "Did not find all snapshot chunks");
        }
        self.failures
            .extend(incomplete.into_iter().map(|(_, failure)| failure));

        let snapshots = self
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Ready(value) => Some(value),
                Slot::Pending | Slot::Dropped => None,
            })
            .collect();

        Reassembly {
            snapshots,
            failures: self.failures,
        }
    }
}
