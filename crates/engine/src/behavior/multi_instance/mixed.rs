use std::sync::Arc;

use serde_json::Value;

use manifold_types::MultiInstanceMode;

use crate::behavior::ActivityBehavior;
use crate::error::ExecutionError;
use crate::expression::Expression;
use crate::runtime::ExecutionContext;

use super::{
    CollectionSource, LoopSettings, MultiInstanceStrategy, ParallelMultiInstanceBehavior, SequentialMultiInstanceBehavior,
    complete_instance, enter,
};

/// Effective behavior of a multi-instance activity.
///
/// Holds both strategies over the same inner behavior and hands every
/// activation to the one selected by the declared mode. Triggers are passed to
/// the inner behavior.
#[derive(Debug, Clone)]
pub struct MixedMultiInstanceBehavior {
    mode: MultiInstanceMode,
    parallel: ParallelMultiInstanceBehavior,
    sequential: SequentialMultiInstanceBehavior,
    inner: Arc<dyn ActivityBehavior>,
    settings: LoopSettings,
}

impl MixedMultiInstanceBehavior {
    pub fn new(
        mode: MultiInstanceMode,
        parallel: ParallelMultiInstanceBehavior,
        sequential: SequentialMultiInstanceBehavior,
        inner: Arc<dyn ActivityBehavior>,
    ) -> Self {
        Self {
            mode,
            parallel,
            sequential,
            inner,
            settings: LoopSettings::default(),
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn set_loop_cardinality_expression(&mut self, expression: Option<Expression>) {
        self.settings.loop_cardinality = expression;
    }

    pub fn set_completion_condition_expression(&mut self, expression: Option<Expression>) {
        self.settings.completion_condition = expression;
    }

    pub fn set_collection(&mut self, collection: Option<CollectionSource>) {
        self.settings.collection = collection;
    }

    pub fn set_element_variable(&mut self, element_variable: Option<String>) {
        self.settings.element_variable = element_variable;
    }

    fn strategy(&self) -> &dyn MultiInstanceStrategy {
        match self.mode {
            MultiInstanceMode::Sequential => &self.sequential,
            MultiInstanceMode::Parallel => &self.parallel,
        }
    }
}

impl ActivityBehavior for MixedMultiInstanceBehavior {
    fn execute(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        enter(self.strategy(), context, &self.settings)
    }

    fn leave(&self, context: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        complete_instance(self.strategy(), context, &self.settings)
    }

    fn trigger(&self, context: &mut ExecutionContext<'_>, payload: Option<Value>) -> Result<(), ExecutionError> {
        self.inner.trigger(context, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::ManualTaskBehavior;

    #[test]
    fn dispatches_on_declared_mode() {
        let inner: Arc<dyn ActivityBehavior> = Arc::new(ManualTaskBehavior);
        let build = |mode| {
            MixedMultiInstanceBehavior::new(
                mode,
                ParallelMultiInstanceBehavior::new("review", inner.clone()),
                SequentialMultiInstanceBehavior::new("review", inner.clone()),
                inner.clone(),
            )
        };

        assert_eq!(build(MultiInstanceMode::Sequential).strategy().mode(), MultiInstanceMode::Sequential);
        assert_eq!(build(MultiInstanceMode::Parallel).strategy().mode(), MultiInstanceMode::Parallel);
    }
}
