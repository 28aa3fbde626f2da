use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::behavior::ActivityBehavior;

use super::ExecutionId;

/// Unit of work queued on the agenda and drained by the engine.
#[derive(Clone)]
pub(crate) enum Operation {
    /// Enter the activity the execution is positioned at.
    ContinueFlow(ExecutionId),
    /// Run `behavior` on the execution.
    ExecuteBehavior {
        execution: ExecutionId,
        behavior: Arc<dyn ActivityBehavior>,
    },
    /// The execution finished its step; hand control to the activity's behavior.
    Leave(ExecutionId),
    /// Resume an execution waiting in a wait state.
    Trigger { execution: ExecutionId, payload: Option<Value> },
    /// Move past the activity along its outgoing flow.
    TakeOutgoing(ExecutionId),
}

impl Operation {
    pub(crate) fn execution(&self) -> ExecutionId {
        match self {
            Self::ContinueFlow(execution)
            | Self::Leave(execution)
            | Self::TakeOutgoing(execution)
            | Self::ExecuteBehavior { execution, .. }
            | Self::Trigger { execution, .. } => *execution,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::ContinueFlow(_) => "continue_flow",
            Self::ExecuteBehavior { .. } => "execute_behavior",
            Self::Leave(_) => "leave",
            Self::Trigger { .. } => "trigger",
            Self::TakeOutgoing(_) => "take_outgoing",
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.execution())
    }
}

/// FIFO queue of pending operations.
#[derive(Debug, Default)]
pub(crate) struct Agenda {
    operations: VecDeque<Operation>,
}

impl Agenda {
    pub(crate) fn push(&mut self, operation: Operation) {
        self.operations.push_back(operation);
    }

    pub(crate) fn pop(&mut self) -> Option<Operation> {
        self.operations.pop_front()
    }

    /// Drop everything queued after the first `len` operations.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.operations.truncate(len);
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }
}
