//! Activity behaviors and the factory the parser builds them with.
//!
//! A behavior is invoked by the agenda: `execute` when an execution enters the
//! activity, `leave` when the execution finished its step, and `trigger` when
//! a waiting execution is resumed from outside.

pub mod multi_instance;
mod task;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use manifold_types::FlowNode;

use crate::error::ExecutionError;
use crate::parser::ActivityDefinition;
use crate::runtime::ExecutionContext;

pub use multi_instance::{
    CollectionSource, LoopSettings, MixedMultiInstanceBehavior, MultiInstanceStrategy, NUMBER_OF_ACTIVE_INSTANCES,
    NUMBER_OF_COMPLETED_INSTANCES, NUMBER_OF_INSTANCES, ParallelMultiInstanceBehavior, SequentialMultiInstanceBehavior,
};
pub use task::{ManualTaskBehavior, NoopHandler, ReceiveTaskBehavior, ServiceTaskBehavior, TaskHandler, UserTaskBehavior};

/// Runtime behavior of an activity.
pub trait ActivityBehavior: fmt::Debug + Send + Sync {
    /// Called when an execution enters the activity.
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError>;

    /// Called once the execution finished its step. Defaults to following the outgoing flow.
    fn leave(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let execution = context.execution_id();
        context.take_outgoing(execution);
        Ok(())
    }

    /// Called when a waiting execution is resumed.
    fn trigger(&self, context: &mut ExecutionContext<'_>, _payload: Option<Value>) -> Result<(), ExecutionError> {
        Err(ExecutionError::NotWaiting(context.execution_id()))
    }
}

/// Creates the behaviors attached to activity definitions while parsing.
pub trait ActivityBehaviorFactory: fmt::Debug + Send + Sync {
    fn create_user_task_behavior(&self, node: &FlowNode) -> Arc<dyn ActivityBehavior>;

    fn create_service_task_behavior(
        &self,
        node: &FlowNode,
        handler: &str,
        result_variable: Option<&str>,
    ) -> Arc<dyn ActivityBehavior>;

    fn create_manual_task_behavior(&self, node: &FlowNode) -> Arc<dyn ActivityBehavior>;

    fn create_receive_task_behavior(&self, node: &FlowNode) -> Arc<dyn ActivityBehavior>;

    fn create_parallel_multi_instance_behavior(
        &self,
        activity: &ActivityDefinition,
        inner: Arc<dyn ActivityBehavior>,
    ) -> ParallelMultiInstanceBehavior;

    fn create_sequential_multi_instance_behavior(
        &self,
        activity: &ActivityDefinition,
        inner: Arc<dyn ActivityBehavior>,
    ) -> SequentialMultiInstanceBehavior;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultActivityBehaviorFactory;

impl ActivityBehaviorFactory for DefaultActivityBehaviorFactory {
    fn create_user_task_behavior(&self, _node: &FlowNode) -> Arc<dyn ActivityBehavior> {
        Arc::new(UserTaskBehavior)
    }

    fn create_service_task_behavior(
        &self,
        _node: &FlowNode,
        handler: &str,
        result_variable: Option<&str>,
    ) -> Arc<dyn ActivityBehavior> {
        Arc::new(ServiceTaskBehavior::new(handler, result_variable))
    }

    fn create_manual_task_behavior(&self, _node: &FlowNode) -> Arc<dyn ActivityBehavior> {
        Arc::new(ManualTaskBehavior)
    }

    fn create_receive_task_behavior(&self, _node: &FlowNode) -> Arc<dyn ActivityBehavior> {
        Arc::new(ReceiveTaskBehavior)
    }

    fn create_parallel_multi_instance_behavior(
        &self,
        activity: &ActivityDefinition,
        inner: Arc<dyn ActivityBehavior>,
    ) -> ParallelMultiInstanceBehavior {
        ParallelMultiInstanceBehavior::new(activity.id(), inner)
    }

    fn create_sequential_multi_instance_behavior(
        &self,
        activity: &ActivityDefinition,
        inner: Arc<dyn ActivityBehavior>,
    ) -> SequentialMultiInstanceBehavior {
        SequentialMultiInstanceBehavior::new(activity.id(), inner)
    }
}
