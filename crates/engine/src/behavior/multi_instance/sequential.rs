use std::sync::Arc;

use manifold_types::MultiInstanceMode;

use crate::behavior::ActivityBehavior;
use crate::error::ExecutionError;
use crate::runtime::{ExecutionContext, ExecutionId};

use super::{InstancePlan, LoopSettings, MultiInstanceStrategy, NUMBER_OF_INSTANCES, resolve_collection, spawn_instance};

/// Runs instances one after another in index order.
///
/// The next child is created only after its predecessor completed, so it sees
/// the predecessor's writes. The collection is read again for every instance.
#[derive(Debug, Clone)]
pub struct SequentialMultiInstanceBehavior {
    activity_id: String,
    inner: Arc<dyn ActivityBehavior>,
}

impl SequentialMultiInstanceBehavior {
    pub fn new(activity_id: &str, inner: Arc<dyn ActivityBehavior>) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            inner,
        }
    }
}

impl MultiInstanceStrategy for SequentialMultiInstanceBehavior {
    fn mode(&self) -> MultiInstanceMode {
        MultiInstanceMode::Sequential
    }

    fn create_instances(
        &self,
        context: &mut ExecutionContext<'_>,
        root: ExecutionId,
        settings: &LoopSettings,
        plan: &InstancePlan,
    ) -> Result<(), ExecutionError> {
        let child = spawn_instance(context, root, 0, plan.element(0), settings, false)?;
        context.execute_behavior(child, self.inner.clone());
        Ok(())
    }

    fn continue_after(
        &self,
        context: &mut ExecutionContext<'_>,
        root: ExecutionId,
        loop_counter: usize,
        settings: &LoopSettings,
    ) -> Result<(), ExecutionError> {
        let next = loop_counter + 1;
        let instances = context
            .variable_local_of(root, NUMBER_OF_INSTANCES)
            .and_then(|value| value.as_u64())
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(0);

        let element = match &settings.collection {
            Some(source) => {
                let elements = resolve_collection(&self.activity_id, source, &context.scope_of(root))?;
                let Some(element) = elements.get(next).cloned() else {
                    return Err(ExecutionError::CardinalityExceedsCollection {
                        activity_id: self.activity_id.clone(),
                        cardinality: instances,
                        size: elements.len(),
                    });
                };
                Some(element)
            }
            None => None,
        };

        let child = spawn_instance(context, root, next, element.as_ref(), settings, false)?;
        context.execute_behavior(child, self.inner.clone());
        Ok(())
    }
}
