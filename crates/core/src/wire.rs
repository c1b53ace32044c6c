//! Worker-facing data-movement event wire format.
//!
//! These are the payloads carried inside a heartbeat's inbound/outbound
//! event lists. `CompositeDataMovementEvent` is the one variant that is not
//! routed directly — it is expanded at the consumer into `count` individual
//! `DataMovementEvent`s before routing, per §6.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMovementEvent {
    pub source_index: u32,
    pub target_index: u32,
    pub version: u32,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFailedEvent {
    pub source_index: u32,
    pub target_index: u32,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputReadErrorEvent {
    pub diagnostics: String,
    pub input_index: u32,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexManagerEvent {
    pub vertex_name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDataMovementEvent {
    pub source_index: u32,
    pub count: u32,
    pub payload: Vec<u8>,
}

impl CompositeDataMovementEvent {
    /// Expand into `count` `DataMovementEvent`s, `target_index` ranging
    /// over `[source_index, source_index + count)`, per §6/§8's round-trip
    /// law.
    pub fn expand(&self) -> Vec<DataMovementEvent> {
        (0..self.count)
            .map(|i| DataMovementEvent {
                source_index: self.source_index,
                target_index: self.source_index + i,
                version: 0,
                payload: self.payload.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdateEvent {
    pub progress: f32,
    pub counters: Option<TaskCounters>,
}

/// Placeholder counters payload; worker-side counter semantics are outside
/// this spec's scope, only the Writable-style framing matters here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCounters {
    pub records_read: u64,
    pub records_written: u64,
    pub bytes_written: u64,
}

/// The full `TezEvent` family carried in heartbeat event lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TezEvent {
    DataMovement(DataMovementEvent),
    InputFailed(InputFailedEvent),
    InputReadError(InputReadErrorEvent),
    VertexManager(VertexManagerEvent),
    CompositeDataMovement(CompositeDataMovementEvent),
    TaskStatusUpdate(TaskStatusUpdateEvent),
}

/// Encode a `TezEvent` to the binary wire form carried over the
/// length-prefixed RPC framing.
pub fn encode(event: &TezEvent) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(event)
}

/// Decode a `TezEvent` from its binary wire form.
pub fn decode(bytes: &[u8]) -> Result<TezEvent, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_failed_event_round_trips() {
        let original = TezEvent::InputFailed(InputFailedEvent {
            source_index: 3,
            target_index: 7,
            version: 2,
        });
        let bytes = encode(&original).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn composite_expansion_preserves_target_range() {
        let composite = CompositeDataMovementEvent { source_index: 5, count: 3, payload: vec![1, 2, 3] };
        let expanded = composite.expand();
        let targets: Vec<u32> = expanded.iter().map(|e| e.target_index).collect();
        assert_eq!(targets, vec![5, 6, 7]);
        for e in &expanded {
            assert_eq!(e.source_index, 5);
            assert_eq!(e.payload, vec![1, 2, 3]);
        }
    }

    #[test]
    fn composite_expansion_then_round_trip_matches_original() {
        let composite = CompositeDataMovementEvent { source_index: 10, count: 4, payload: vec![9] };
        let expanded = composite.expand();
        for (i, dme) in expanded.iter().enumerate() {
            let wire = TezEvent::DataMovement(dme.clone());
            let bytes = encode(&wire).unwrap();
            let decoded = decode(&bytes).unwrap();
            match decoded {
                TezEvent::DataMovement(d) => {
                    assert_eq!(d.source_index, 10);
                    assert_eq!(d.target_index, 10 + i as u32);
                }
                _ => panic!("wrong variant"),
            }
        }
    }

    #[test]
    fn task_status_update_with_no_counters_round_trips() {
        let event = TaskStatusUpdateEvent { progress: 0.42, counters: None };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: TaskStatusUpdateEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.progress, 0.42);
        assert!(decoded.counters.is_none());
    }
}
