use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use super::ExecutionId;

pub type TaskId = u64;

/// Open human task created by a user task activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub name: Option<String>,
    pub activity_id: String,
    pub execution: ExecutionId,
    pub process_instance: ExecutionId,
    pub assignee: Option<String>,
    pub candidate_users: Vec<String>,
    pub candidate_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a task before the store assigns an id.
#[derive(Debug, Clone, Default)]
pub(crate) struct NewTask {
    pub(crate) name: Option<String>,
    pub(crate) assignee: Option<String>,
    pub(crate) candidate_users: Vec<String>,
    pub(crate) candidate_groups: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct TaskStore {
    tasks: IndexMap<TaskId, Task>,
    next_id: TaskId,
}

impl TaskStore {
    pub(crate) fn create(
        &mut self,
        activity_id: &str,
        execution: ExecutionId,
        process_instance: ExecutionId,
        task: NewTask,
    ) -> TaskId {
        self.next_id += 1;
        let id = self.next_id;
        self.tasks.insert(
            id,
            Task {
                id,
                name: task.name,
                activity_id: activity_id.to_string(),
                execution,
                process_instance,
                assignee: task.assignee,
                candidate_users: task.candidate_users,
                candidate_groups: task.candidate_groups,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.shift_remove(&id)
    }

    /// Put back a task taken out with [`TaskStore::remove`], keeping its id and position.
    pub(crate) fn restore(&mut self, task: Task) {
        self.tasks.insert_sorted(task.id, task);
    }

    /// Drop every task owned by `execution`.
    pub(crate) fn remove_for_execution(&mut self, execution: ExecutionId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| task.execution != execution);
        before - self.tasks.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removing_an_execution_drops_its_tasks() {
        let mut store = TaskStore::default();
        let first = store.create("review", ExecutionId::from(2), ExecutionId::from(1), NewTask::default());
        store.create("review", ExecutionId::from(3), ExecutionId::from(1), NewTask::default());

        assert_eq!(store.remove_for_execution(ExecutionId::from(3)), 1);
        assert_eq!(store.iter().map(|task| task.id).collect::<Vec<_>>(), vec![first]);
        let removed = store.remove(first).expect("task");
        assert!(store.get(first).is_none());

        store.restore(removed);
        assert_eq!(store.get(first).map(|task| task.id), Some(first));
        let next = store.create("review", ExecutionId::from(4), ExecutionId::from(1), NewTask::default());
        assert!(next > first, "restored ids are never handed out again");
    }

    #[test]
    fn restored_task_keeps_its_place() {
        let mut store = TaskStore::default();
        let ids: Vec<_> = (2..5)
            .map(|execution| store.create("review", ExecutionId::from(execution), ExecutionId::from(1), NewTask::default()))
            .collect();

        let removed = store.remove(ids[0]).expect("task");
        store.restore(removed);
        assert_eq!(store.iter().map(|task| task.id).collect::<Vec<_>>(), ids);
    }
}
