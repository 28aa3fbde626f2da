use std::sync::Arc;

use tracing::debug;

use manifold_types::MultiInstanceMode;

use crate::behavior::ActivityBehavior;
use crate::error::ExecutionError;
use crate::runtime::{ExecutionContext, ExecutionId};

use super::{InstancePlan, LoopSettings, MultiInstanceStrategy, spawn_instance};

/// Runs every instance at once.
///
/// All children are created before any of them is executed, so every instance
/// is entered before the first one can complete.
#[derive(Debug, Clone)]
pub struct ParallelMultiInstanceBehavior {
    activity_id: String,
    inner: Arc<dyn ActivityBehavior>,
}

impl ParallelMultiInstanceBehavior {
    pub fn new(activity_id: &str, inner: Arc<dyn ActivityBehavior>) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            inner,
        }
    }
}

impl MultiInstanceStrategy for ParallelMultiInstanceBehavior {
    fn mode(&self) -> MultiInstanceMode {
        MultiInstanceMode::Parallel
    }

    fn create_instances(
        &self,
        context: &mut ExecutionContext<'_>,
        root: ExecutionId,
        settings: &LoopSettings,
        plan: &InstancePlan,
    ) -> Result<(), ExecutionError> {
        let mut children = Vec::with_capacity(plan.count);
        for index in 0..plan.count {
            children.push(spawn_instance(context, root, index, plan.element(index), settings, true)?);
        }
        for child in children {
            context.execute_behavior(child, self.inner.clone());
        }
        Ok(())
    }

    fn continue_after(
        &self,
        _context: &mut ExecutionContext<'_>,
        root: ExecutionId,
        loop_counter: usize,
        _settings: &LoopSettings,
    ) -> Result<(), ExecutionError> {
        debug!(activity_id = %self.activity_id, execution = %root, loop_counter, "waiting for remaining instances");
        Ok(())
    }
}
