//! Edge manager plugins: pure functions of cardinalities and indices that
//! route data-movement events between a producer vertex's task outputs and
//! a consumer vertex's task inputs.

use crate::wire::TezEvent;
use std::collections::HashMap;

/// Routing table: destination physical input index -> destination task
/// indices that should receive the event on that input slot.
pub type RouteMap = HashMap<u32, Vec<u32>>;

/// A producer/consumer routing policy. Every method is a pure function of
/// its arguments — no internal state, no side effects — so the same
/// `(event, src_task_index, num_dest_tasks)` always produces the same
/// route map (the determinism property required by the design).
pub trait EdgeManager: Send + Sync {
    fn num_destination_task_physical_inputs(&self, num_source_tasks: u32, dest_task_index: u32) -> u32;

    fn num_source_task_physical_outputs(&self, num_dest_tasks: u32, src_task_index: u32) -> u32;

    fn num_destination_consumer_tasks(&self, src_task_index: u32, num_dest_tasks: u32) -> u32;

    fn route_data_movement_event(
        &self,
        event: &TezEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> RouteMap;

    fn route_input_source_task_failed_event(&self, src_task_index: u32, num_dest_tasks: u32) -> RouteMap;

    fn route_input_error_event_to_source(&self, event: &TezEvent, dest_task_index: u32) -> u32;
}

/// Every source task's single output feeds the same-indexed destination
/// task's single input. Input read errors route back to the same index.
pub struct OneToOne;

impl EdgeManager for OneToOne {
    fn num_destination_task_physical_inputs(&self, num_source_tasks: u32, _dest_task_index: u32) -> u32 {
        if num_source_tasks == 0 { 0 } else { 1 }
    }

    fn num_source_task_physical_outputs(&self, num_dest_tasks: u32, _src_task_index: u32) -> u32 {
        if num_dest_tasks == 0 { 0 } else { 1 }
    }

    fn num_destination_consumer_tasks(&self, _src_task_index: u32, num_dest_tasks: u32) -> u32 {
        if num_dest_tasks == 0 { 0 } else { 1 }
    }

    fn route_data_movement_event(
        &self,
        _event: &TezEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> RouteMap {
        let mut map = RouteMap::new();
        if num_dest_tasks > 0 {
            map.insert(0, vec![src_task_index]);
        }
        map
    }

    fn route_input_source_task_failed_event(&self, src_task_index: u32, num_dest_tasks: u32) -> RouteMap {
        self.route_data_movement_event(&placeholder_event(), src_task_index, num_dest_tasks)
    }

    fn route_input_error_event_to_source(&self, _event: &TezEvent, dest_task_index: u32) -> u32 {
        dest_task_index
    }
}

/// Each source task produces `num_dest_tasks` partitions; each destination
/// task reads `num_source_tasks` inputs, one per source. A data-movement
/// event from source `src_task_index` addressed to destination `tgt_idx`
/// lands at destination task `tgt_idx`, physical input `src_task_index`.
pub struct ScatterGather {
    /// When true, every destination task is targeted regardless of the
    /// event's own target index — the BROADCAST variant.
    pub broadcast: bool,
}

impl ScatterGather {
    pub fn new() -> Self {
        Self { broadcast: false }
    }

    pub fn broadcast() -> Self {
        Self { broadcast: true }
    }
}

impl Default for ScatterGather {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeManager for ScatterGather {
    fn num_destination_task_physical_inputs(&self, num_source_tasks: u32, _dest_task_index: u32) -> u32 {
        num_source_tasks
    }

    fn num_source_task_physical_outputs(&self, num_dest_tasks: u32, _src_task_index: u32) -> u32 {
        num_dest_tasks
    }

    fn num_destination_consumer_tasks(&self, _src_task_index: u32, num_dest_tasks: u32) -> u32 {
        num_dest_tasks
    }

    fn route_data_movement_event(
        &self,
        event: &TezEvent,
        src_task_index: u32,
        num_dest_tasks: u32,
    ) -> RouteMap {
        let mut map = RouteMap::new();
        if self.broadcast {
            for dest in 0..num_dest_tasks {
                map.entry(src_task_index).or_default().push(dest);
            }
            return map;
        }
        if let TezEvent::DataMovement(dme) = event {
            if dme.target_index < num_dest_tasks {
                map.insert(src_task_index, vec![dme.target_index]);
            }
        }
        map
    }

    fn route_input_source_task_failed_event(&self, src_task_index: u32, num_dest_tasks: u32) -> RouteMap {
        let mut map = RouteMap::new();
        for dest in 0..num_dest_tasks {
            map.entry(src_task_index).or_default().push(dest);
        }
        map
    }

    fn route_input_error_event_to_source(&self, event: &TezEvent, _dest_task_index: u32) -> u32 {
        match event {
            TezEvent::InputReadError(e) => e.input_index,
            _ => 0,
        }
    }
}

fn placeholder_event() -> TezEvent {
    TezEvent::InputFailed(crate::wire::InputFailedEvent {
        source_index: 0,
        target_index: 0,
        version: 0,
    })
}

/// Instantiate a built-in edge manager by the name carried in the DAG
/// submission's `EdgeManagerDescriptor`.
pub fn by_name(name: &str) -> Option<Box<dyn EdgeManager>> {
    match name {
        "OneToOne" => Some(Box::new(OneToOne)),
        "ScatterGather" => Some(Box::new(ScatterGather::new())),
        "Broadcast" => Some(Box::new(ScatterGather::broadcast())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::DataMovementEvent;

    #[test]
    fn one_to_one_is_deterministic() {
        let mgr = OneToOne;
        let event = TezEvent::DataMovement(DataMovementEvent {
            source_index: 2,
            target_index: 2,
            version: 0,
            payload: vec![],
        });
        let a = mgr.route_data_movement_event(&event, 2, 4);
        let b = mgr.route_data_movement_event(&event, 2, 4);
        assert_eq!(a, b);
        assert_eq!(a.get(&0), Some(&vec![2]));
    }

    #[test]
    fn one_to_one_zero_tasks_is_permitted_and_empty() {
        let mgr = OneToOne;
        assert_eq!(mgr.num_destination_task_physical_inputs(0, 0), 0);
        assert_eq!(mgr.num_source_task_physical_outputs(0, 0), 0);
        assert_eq!(mgr.num_destination_consumer_tasks(0, 0), 0);
        let event = TezEvent::DataMovement(DataMovementEvent {
            source_index: 0,
            target_index: 0,
            version: 0,
            payload: vec![],
        });
        assert!(mgr.route_data_movement_event(&event, 0, 0).is_empty());
    }

    #[test]
    fn scatter_gather_routes_by_target_index() {
        let mgr = ScatterGather::new();
        let event = TezEvent::DataMovement(DataMovementEvent {
            source_index: 1,
            target_index: 3,
            version: 0,
            payload: vec![],
        });
        let routed = mgr.route_data_movement_event(&event, 1, 5);
        assert_eq!(routed.get(&1), Some(&vec![3]));
    }

    #[test]
    fn broadcast_targets_every_destination() {
        let mgr = ScatterGather::broadcast();
        let event = TezEvent::DataMovement(DataMovementEvent {
            source_index: 0,
            target_index: 0,
            version: 0,
            payload: vec![],
        });
        let routed = mgr.route_data_movement_event(&event, 0, 4);
        assert_eq!(routed.get(&0), Some(&vec![0, 1, 2, 3]));
    }

    #[test]
    fn input_error_routes_to_carried_source_index() {
        let mgr = ScatterGather::new();
        let event = TezEvent::InputReadError(crate::wire::InputReadErrorEvent {
            diagnostics: "boom".into(),
            input_index: 7,
            version: 0,
        });
        assert_eq!(mgr.route_input_error_event_to_source(&event, 2), 7);
    }
}
