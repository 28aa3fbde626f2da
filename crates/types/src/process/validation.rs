//! Structural checks shared by every consumer of a process model.
//!
//! These routines only look at the shape of the model (identifiers and flow
//! references). Activity-specific rules, such as multi-instance validation,
//! are applied by the engine's parse handlers.

use std::collections::HashSet;

use crate::Problem;

use super::ProcessModel;

/// Collect structural problems in a process model.
///
/// - Node identifiers must be non-empty and unique.
/// - `outgoing` and `start` must reference existing nodes.
/// - A process must declare at least one node.
pub fn validate_structure(model: &ProcessModel) -> Vec<Problem> {
    let mut problems = Vec::new();

    if model.nodes.is_empty() {
        problems.push(Problem::new(format!("Process '{}' declares no flow nodes", model.id), None));
        return problems;
    }

    let mut seen = HashSet::new();
    for node in &model.nodes {
        if node.id.trim().is_empty() {
            problems.push(Problem::new("Flow node identifier cannot be empty", None));
            continue;
        }
        if !seen.insert(node.id.as_str()) {
            problems.push(Problem::new(format!("Duplicate flow node identifier '{}'", node.id), Some(&node.id)));
        }
    }

    for node in &model.nodes {
        if let Some(target) = node.outgoing.as_deref()
            && !seen.contains(target)
        {
            problems.push(Problem::new(
                format!("Node '{}' flows to unknown node '{}'", node.id, target),
                Some(&node.id),
            ));
        }
    }

    if let Some(start) = model.start.as_deref()
        && !seen.contains(start)
    {
        problems.push(Problem::new(format!("Start node '{}' does not exist", start), None));
    }

    problems
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::{FlowNode, FlowNodeKind};

    fn node(id: &str, outgoing: Option<&str>) -> FlowNode {
        FlowNode {
            id: id.to_string(),
            name: None,
            kind: FlowNodeKind::ManualTask,
            loop_characteristics: None,
            outgoing: outgoing.map(str::to_string),
        }
    }

    fn model(nodes: Vec<FlowNode>) -> ProcessModel {
        ProcessModel {
            id: "p".into(),
            name: None,
            start: None,
            nodes,
            properties: IndexMap::new(),
        }
    }

    #[test]
    fn well_formed_model_has_no_problems() {
        let problems = validate_structure(&model(vec![node("a", Some("b")), node("b", None)]));
        assert!(problems.is_empty(), "unexpected problems: {:?}", problems);
    }

    #[test]
    fn duplicate_and_dangling_references_are_reported() {
        let problems = validate_structure(&model(vec![node("a", Some("missing")), node("a", None)]));
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|problem| problem.message.contains("Duplicate")));
        assert!(problems.iter().any(|problem| problem.message.contains("unknown node 'missing'")));
    }

    #[test]
    fn empty_process_is_reported() {
        let problems = validate_structure(&model(vec![]));
        assert_eq!(problems.len(), 1);
    }
}
