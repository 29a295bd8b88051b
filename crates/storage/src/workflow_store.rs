//! Workflow store (spec §4.4): CRUD over workflow.json and instance.json,
//! plus the mutation helpers the engine drives an instance through.

use std::collections::HashMap;

use oj_core::{EdgeId, Instance, InstanceId, InstanceStatus, NodeId, NodeState, TaskId, Workflow};
use parking_lot::Mutex;

use crate::atomic::{read_json_opt, write_json};
use crate::error::{Result, StorageError};
use crate::paths::DataRoot;

/// Lazy `instanceId -> taskId` lookup. Advisory only: rebuilt by directory
/// scan on a miss, never relied on for correctness (spec §4.4).
#[derive(Default)]
struct InstanceIndex {
    map: HashMap<InstanceId, TaskId>,
}

pub struct WorkflowStore {
    root: DataRoot,
    instance_index: Mutex<InstanceIndex>,
}

impl WorkflowStore {
    pub fn new(root: DataRoot) -> Self {
        Self { root, instance_index: Mutex::new(InstanceIndex::default()) }
    }

    pub fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        write_json(&self.root.workflow_json(&workflow.task_id), workflow)
    }

    pub fn get_workflow(&self, task_id: &TaskId) -> Result<Option<Workflow>> {
        read_json_opt(&self.root.workflow_json(task_id))
    }

    /// Initialize a fresh [`Instance`] for `workflow`: all nodes pending,
    /// attempts 0, empty outputs/loopCounts, variables cloned from the
    /// workflow, status pending (spec §4.4 `createInstance`).
    pub fn create_instance(&self, task_id: &TaskId, workflow: &Workflow) -> Result<Instance> {
        let node_ids: Vec<NodeId> = workflow.nodes.iter().map(|n| n.id).collect();
        let instance = Instance::new(workflow.id, &node_ids, workflow.variables.clone());
        write_json(&self.root.instance_json(task_id), &instance)?;
        self.instance_index.lock().map.insert(instance.id, *task_id);
        Ok(instance)
    }

    pub fn get_instance(&self, task_id: &TaskId) -> Result<Option<Instance>> {
        read_json_opt(&self.root.instance_json(task_id))
    }

    /// Resolve the owning task for `instance_id`, rebuilding the advisory
    /// index by directory scan on a miss.
    pub fn task_id_for_instance(&self, instance_id: &InstanceId) -> Result<Option<TaskId>> {
        if let Some(task_id) = self.instance_index.lock().map.get(instance_id).copied() {
            return Ok(Some(task_id));
        }
        for task_id in self
            .root
            .scan_task_ids()
            .map_err(|e| StorageError::io(self.root.tasks_dir().display().to_string(), e))?
        {
            if let Some(instance) = self.get_instance(&task_id)? {
                let found = instance.id == *instance_id;
                self.instance_index.lock().map.insert(instance.id, task_id);
                if found {
                    return Ok(Some(task_id));
                }
            }
        }
        Ok(None)
    }

    fn load_instance(&self, task_id: &TaskId) -> Result<Instance> {
        self.get_instance(task_id)?
            .ok_or_else(|| StorageError::NotFound(format!("instance for task {task_id}")))
    }

    fn save_instance(&self, task_id: &TaskId, instance: &Instance) -> Result<()> {
        write_json(&self.root.instance_json(task_id), instance)
    }

    /// Update instance status, stamping `startedAt`/`completedAt` on the
    /// relevant transitions (spec §4.4).
    pub fn update_instance_status(
        &self,
        task_id: &TaskId,
        status: InstanceStatus,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<Instance> {
        let mut instance = self.load_instance(task_id)?;
        let was_running_before = instance.started_at_ms.is_some();
        instance.status = status;
        if status == InstanceStatus::Running && !was_running_before {
            instance.started_at_ms = Some(now_ms);
        }
        if status.is_terminal() {
            instance.completed_at_ms = Some(now_ms);
        }
        if error.is_some() {
            instance.error = error;
        }
        self.save_instance(task_id, &instance)?;
        Ok(instance)
    }

    pub fn update_node_state(
        &self,
        task_id: &TaskId,
        node_id: &NodeId,
        patch: impl FnOnce(&mut NodeState),
    ) -> Result<Instance> {
        let mut instance = self.load_instance(task_id)?;
        let state = instance.node_states.entry(*node_id).or_default();
        patch(state);
        self.save_instance(task_id, &instance)?;
        Ok(instance)
    }

    pub fn set_node_output(&self, task_id: &TaskId, node_id: &NodeId, value: serde_json::Value) -> Result<Instance> {
        let mut instance = self.load_instance(task_id)?;
        instance.outputs.insert(*node_id, value);
        self.save_instance(task_id, &instance)?;
        Ok(instance)
    }

    pub fn increment_loop_count(&self, task_id: &TaskId, edge_id: &EdgeId) -> Result<u32> {
        let mut instance = self.load_instance(task_id)?;
        let count = instance.loop_counts.entry(*edge_id).or_insert(0);
        *count += 1;
        let new_count = *count;
        self.save_instance(task_id, &instance)?;
        Ok(new_count)
    }

    /// Re-pend a node's state, resetting attempts to zero: a loop re-entry
    /// is not a retry (spec §4.4).
    pub fn reset_node_state(&self, task_id: &TaskId, node_id: &NodeId) -> Result<Instance> {
        self.update_node_state(task_id, node_id, |state| *state = NodeState::pending())
    }

    /// Merge dotted-path updates into `instance.variables` (spec §4.4
    /// `updateInstanceVariables`).
    pub fn update_instance_variables(
        &self,
        task_id: &TaskId,
        patch: &HashMap<String, serde_json::Value>,
    ) -> Result<Instance> {
        let mut instance = self.load_instance(task_id)?;
        for (path, value) in patch {
            instance.set_variable_path(path, value.clone());
        }
        self.save_instance(task_id, &instance)?;
        Ok(instance)
    }
}

#[cfg(test)]
#[path = "workflow_store_tests.rs"]
mod tests;
