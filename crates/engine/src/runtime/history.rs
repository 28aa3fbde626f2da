//! Audit trail of what happened while process instances ran.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ExecutionId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub process_instance: ExecutionId,
    #[serde(flatten)]
    pub kind: HistoryEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEventKind {
    ProcessStarted {
        definition_id: String,
    },
    ActivityEntered {
        activity_id: String,
        execution: ExecutionId,
        loop_counter: Option<usize>,
    },
    ActivityLeft {
        activity_id: String,
        execution: ExecutionId,
        loop_counter: Option<usize>,
    },
    /// A multi-instance child torn down before finishing.
    ChildCanceled {
        activity_id: String,
        execution: ExecutionId,
        loop_counter: Option<usize>,
    },
    MultiInstanceCompleted {
        activity_id: String,
        execution: ExecutionId,
        instances: usize,
        completed: usize,
        by_condition: bool,
    },
    ProcessEnded {
        definition_id: String,
    },
}

impl HistoryEventKind {
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::ActivityEntered { activity_id, .. }
            | Self::ActivityLeft { activity_id, .. }
            | Self::ChildCanceled { activity_id, .. }
            | Self::MultiInstanceCompleted { activity_id, .. } => Some(activity_id),
            Self::ProcessStarted { .. } | Self::ProcessEnded { .. } => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct HistoryLog {
    enabled: bool,
    events: Vec<HistoryEvent>,
}

impl HistoryLog {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, process_instance: ExecutionId, kind: HistoryEventKind) {
        if !self.enabled {
            return;
        }
        self.events.push(HistoryEvent {
            timestamp: Utc::now(),
            process_instance,
            kind,
        });
    }

    pub(crate) fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Forget events recorded after the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Drop every event of `process_instance`, returning how many were removed.
    pub(crate) fn remove_process_instance(&mut self, process_instance: ExecutionId) -> usize {
        let before = self.events.len();
        self.events.retain(|event| event.process_instance != process_instance);
        before - self.events.len()
    }
}
