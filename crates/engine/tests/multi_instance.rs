use std::sync::{Arc, Mutex};
use std::thread;

use indexmap::IndexMap;
use serde_json::{Value, json};

use manifold_engine::behavior::{NUMBER_OF_ACTIVE_INSTANCES, NUMBER_OF_COMPLETED_INSTANCES, NUMBER_OF_INSTANCES};
use manifold_engine::runtime::LOOP_COUNTER;
use manifold_engine::{
    EngineConfig, ExecutionError, HistoryEventKind, NoopHandler, ProcessEngine, VariableScope, parse_process_str,
};

fn deploy(engine: &mut ProcessEngine, yaml_text: &str) -> String {
    let model = parse_process_str(yaml_text).expect("parse process");
    engine.deploy(&model).expect("deploy process")
}

fn variables(value: Value) -> IndexMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => panic!("variables must be an object"),
    }
}

/// `(entered?, loop_counter)` for every instance-level enter/leave event of `activity`.
fn instance_trail(engine: &ProcessEngine, activity: &str) -> Vec<(&'static str, usize)> {
    engine
        .history()
        .iter()
        .filter_map(|event| match &event.kind {
            HistoryEventKind::ActivityEntered {
                activity_id,
                loop_counter: Some(counter),
                ..
            } if activity_id == activity => Some(("enter", *counter)),
            HistoryEventKind::ActivityLeft {
                activity_id,
                loop_counter: Some(counter),
                ..
            } if activity_id == activity => Some(("leave", *counter)),
            _ => None,
        })
        .collect()
}

fn completion_events(engine: &ProcessEngine) -> Vec<(usize, usize, bool)> {
    engine
        .history()
        .iter()
        .filter_map(|event| match &event.kind {
            HistoryEventKind::MultiInstanceCompleted {
                instances,
                completed,
                by_condition,
                ..
            } => Some((*instances, *completed, *by_condition)),
            _ => None,
        })
        .collect()
}

fn canceled_counters(engine: &ProcessEngine) -> Vec<usize> {
    engine
        .history()
        .iter()
        .filter_map(|event| match &event.kind {
            HistoryEventKind::ChildCanceled { loop_counter, .. } => *loop_counter,
            _ => None,
        })
        .collect()
}

#[test]
fn sequential_cardinality_runs_instances_in_index_order() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: sequential
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      sequential: true
      loop_cardinality: "3"
"#,
    );

    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    assert_eq!(
        instance_trail(&engine, "approve"),
        vec![("enter", 0), ("leave", 0), ("enter", 1), ("leave", 1), ("enter", 2), ("leave", 2)]
    );
    assert_eq!(completion_events(&engine), vec![(3, 3, false)]);
    assert!(engine.is_ended(instance));
}

#[test]
fn sequential_user_tasks_exist_one_at_a_time() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: sequential_review
nodes:
  - id: review
    type: user_task
    candidate_groups: ["reviewers"]
    multi_instance:
      sequential: true
      loop_cardinality: "${rounds}"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, variables(json!({"rounds": 3})))
        .expect("start process");

    for expected_counter in 0..3u64 {
        let tasks = engine.tasks();
        assert_eq!(tasks.len(), 1, "exactly one open task in round {expected_counter}");
        let task = &tasks[0];
        assert_eq!(task.candidate_groups, vec!["reviewers".to_string()]);
        let child = engine.execution(task.execution).expect("child execution");
        assert_eq!(child.variable_local(LOOP_COUNTER), Some(&json!(expected_counter)));
        engine.complete_task(task.id, IndexMap::new()).expect("complete task");
    }

    assert!(engine.tasks().is_empty());
    assert!(engine.is_ended(instance));
}

#[test]
fn parallel_collection_completes_early_on_condition() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: parallel_review
nodes:
  - id: review
    type: user_task
    multi_instance:
      collection: items
      element_variable: item
      completion_condition: "${item == 'b'}"
    outgoing: archive
  - id: archive
    type: receive_task
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, variables(json!({"items": ["a", "b", "c"]})))
        .expect("start process");

    let tasks = engine.tasks();
    let assignees: Vec<_> = tasks.iter().map(|task| task.assignee.clone().unwrap_or_default()).collect();
    assert_eq!(assignees, vec!["a", "b", "c"]);
    assert_eq!(
        instance_trail(&engine, "review"),
        vec![("enter", 0), ("enter", 1), ("enter", 2)],
        "all instances are entered before any completes"
    );

    let task_b = tasks.iter().find(|task| task.assignee.as_deref() == Some("b")).expect("task for b");
    engine.complete_task(task_b.id, IndexMap::new()).expect("complete b");

    assert!(engine.tasks().is_empty(), "remaining tasks are canceled");
    assert!(engine.executions_at("review").is_empty());
    assert_eq!(engine.executions_at("archive").len(), 1);
    assert_eq!(completion_events(&engine), vec![(3, 1, true)]);
    assert_eq!(canceled_counters(&engine), vec![0, 2]);
    assert!(!engine.is_ended(instance));
    assert!(matches!(
        engine.complete_task(tasks[0].id, IndexMap::new()),
        Err(ExecutionError::TaskNotFound(_))
    ));
}

#[test]
fn parallel_instances_complete_in_any_order() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: any_order
nodes:
  - id: sign
    type: user_task
    multi_instance:
      loop_cardinality: "3"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    let mut tasks = engine.tasks();
    tasks.reverse();
    for task in tasks {
        engine.complete_task(task.id, IndexMap::new()).expect("complete task");
    }

    assert_eq!(
        instance_trail(&engine, "sign"),
        vec![("enter", 0), ("enter", 1), ("enter", 2), ("leave", 2), ("leave", 1), ("leave", 0)]
    );
    assert_eq!(completion_events(&engine), vec![(3, 3, false)]);
    assert!(engine.is_ended(instance));
}

#[test]
fn zero_instances_complete_immediately() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: empty_loop
nodes:
  - id: review
    type: user_task
    multi_instance:
      collection: reviewers
    outgoing: done
  - id: done
    type: receive_task
"#,
    );
    engine
        .start_process_instance(&definition_id, variables(json!({"reviewers": []})))
        .expect("start process");

    assert!(engine.tasks().is_empty());
    assert!(instance_trail(&engine, "review").is_empty());
    assert_eq!(completion_events(&engine), vec![(0, 0, false)]);
    assert_eq!(engine.executions_at("done").len(), 1);
}

#[test]
fn each_instance_receives_its_element() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    let mut engine = ProcessEngine::default();
    engine.register_handler("record", move |_activity_id: &str, scope: &dyn VariableScope| -> anyhow::Result<Value> {
        let item = scope.variable("item").unwrap_or(Value::Null);
        let counter = scope.variable(LOOP_COUNTER).unwrap_or(Value::Null);
        recorder.lock().expect("recorder lock").push((item, counter));
        Ok(Value::Null)
    });
    let definition_id = deploy(
        &mut engine,
        r#"
id: elements
nodes:
  - id: call
    type: service_task
    handler: record
    multi_instance:
      collection: "${order.lines}"
      element_variable: item
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, variables(json!({"order": {"lines": ["x", "y", "z"]}})))
        .expect("start process");

    let seen = seen.lock().expect("seen lock").clone();
    assert_eq!(
        seen,
        vec![(json!("x"), json!(0)), (json!("y"), json!(1)), (json!("z"), json!(2))]
    );
    assert!(engine.is_ended(instance));
    assert_eq!(engine.variable(instance, "item"), None, "element variables stay local to instances");
}

#[test]
fn counters_stay_consistent_at_every_instance() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observer = Arc::clone(&observed);

    let mut engine = ProcessEngine::default();
    engine.register_handler("observe", move |_activity_id: &str, scope: &dyn VariableScope| -> anyhow::Result<Value> {
        let read = |name: &str| scope.variable(name).and_then(|value| value.as_u64()).unwrap_or(u64::MAX);
        observer.lock().expect("observer lock").push((
            read(NUMBER_OF_INSTANCES),
            read(NUMBER_OF_ACTIVE_INSTANCES),
            read(NUMBER_OF_COMPLETED_INSTANCES),
        ));
        Ok(Value::Null)
    });
    let definition_id = deploy(
        &mut engine,
        r#"
id: counters
nodes:
  - id: observe_each
    type: service_task
    handler: observe
    multi_instance:
      sequential: true
      loop_cardinality: "4"
"#,
    );
    engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    let observed = observed.lock().expect("observed lock").clone();
    assert_eq!(observed, vec![(4, 4, 0), (4, 3, 1), (4, 2, 2), (4, 1, 3)]);
    assert!(observed.iter().all(|(instances, active, completed)| active + completed == *instances));
}

#[test]
fn condition_on_counters_cancels_remaining_parallel_instances() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: quorum
nodes:
  - id: vote
    type: manual_task
    multi_instance:
      loop_cardinality: "4"
      completion_condition: "${numberOfCompletedInstances / numberOfInstances >= 0.5}"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    assert_eq!(completion_events(&engine), vec![(4, 2, true)]);
    assert_eq!(canceled_counters(&engine), vec![2, 3]);
    let left: Vec<_> = instance_trail(&engine, "vote")
        .into_iter()
        .filter(|(kind, _)| *kind == "leave")
        .collect();
    assert_eq!(left, vec![("leave", 0), ("leave", 1)]);
    assert!(engine.is_ended(instance));
}

#[test]
fn variables_written_by_instances_reach_the_process() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: approvals
nodes:
  - id: approve
    type: user_task
    multi_instance:
      sequential: true
      collection: approvers
      element_variable: approver
      completion_condition: "${rejected}"
"#,
    );
    let instance = engine
        .start_process_instance(
            &definition_id,
            variables(json!({"approvers": ["kermit", "gonzo", "fozzie"], "rejected": false})),
        )
        .expect("start process");

    let first = engine.tasks().remove(0);
    assert_eq!(first.assignee.as_deref(), Some("kermit"));
    engine
        .complete_task(first.id, variables(json!({"rejected": false})))
        .expect("approve");

    let second = engine.tasks().remove(0);
    assert_eq!(second.assignee.as_deref(), Some("gonzo"));
    engine
        .complete_task(second.id, variables(json!({"rejected": true})))
        .expect("reject");

    assert!(engine.is_ended(instance));
    assert_eq!(engine.variable(instance, "rejected"), Some(json!(true)));
    assert_eq!(completion_events(&engine), vec![(3, 2, true)]);
}

#[test]
fn receive_tasks_resume_individually() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: callbacks
nodes:
  - id: wait
    type: receive_task
    multi_instance:
      loop_cardinality: "2"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    let root = engine
        .executions_at("wait")
        .into_iter()
        .find(|execution| execution.is_scope() && !execution.is_process_instance())
        .map(|execution| execution.id())
        .expect("loop root");
    assert!(matches!(engine.signal(root, None), Err(ExecutionError::NotWaiting(_))));

    let waiting: Vec<_> = engine
        .executions_at("wait")
        .into_iter()
        .filter(|execution| execution.is_waiting())
        .map(|execution| execution.id())
        .collect();
    assert_eq!(waiting.len(), 2);

    engine.signal(waiting[1], Some(json!({"second": "done"}))).expect("signal second");
    assert!(!engine.is_ended(instance));
    assert!(engine.execution(waiting[0]).is_some_and(|execution| execution.is_waiting()));

    engine.signal(waiting[0], None).expect("signal first");
    assert!(engine.is_ended(instance));
    assert_eq!(engine.variable(instance, "second"), Some(json!("done")));
}

#[test]
fn shared_engine_joins_exactly_once_across_threads() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: threaded
nodes:
  - id: sign
    type: user_task
    multi_instance:
      loop_cardinality: "8"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");
    let task_ids: Vec<_> = engine.tasks().into_iter().map(|task| task.id).collect();

    let engine = Arc::new(Mutex::new(engine));
    let workers: Vec<_> = task_ids
        .into_iter()
        .map(|task_id| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine
                    .lock()
                    .expect("engine lock")
                    .complete_task(task_id, IndexMap::new())
                    .expect("complete task");
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let engine = engine.lock().expect("engine lock");
    assert!(engine.is_ended(instance));
    assert_eq!(completion_events(&engine), vec![(8, 8, false)]);
}

#[test]
fn negative_cardinality_fails_entry() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: negative
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      loop_cardinality: "${count}"
"#,
    );

    let error = engine
        .start_process_instance(&definition_id, variables(json!({"count": -2})))
        .expect_err("negative cardinality");
    assert!(matches!(error, ExecutionError::InvalidCardinality { ref value, .. } if value == "-2"));
    assert!(engine.tasks().is_empty());
}

#[test]
fn collection_errors_fail_entry() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: collections
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      collection: reviewers
"#,
    );

    let missing = engine.start_process_instance(&definition_id, IndexMap::new());
    assert!(matches!(missing, Err(ExecutionError::CollectionNotFound { ref variable, .. }) if variable == "reviewers"));

    let not_a_list = engine.start_process_instance(&definition_id, variables(json!({"reviewers": "kermit"})));
    assert!(matches!(not_a_list, Err(ExecutionError::NotACollection { found: "string", .. })));
}

#[test]
fn cardinality_cannot_exceed_collection() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: bounded
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      loop_cardinality: "3"
      collection: reviewers
      element_variable: reviewer
"#,
    );

    let error = engine
        .start_process_instance(&definition_id, variables(json!({"reviewers": ["kermit"]})))
        .expect_err("too few elements");
    assert!(matches!(
        error,
        ExecutionError::CardinalityExceedsCollection {
            cardinality: 3,
            size: 1,
            ..
        }
    ));

    let instance = engine
        .start_process_instance(&definition_id, variables(json!({"reviewers": ["kermit", "gonzo", "fozzie", "animal"]})))
        .expect("cardinality limits a longer collection");
    assert_eq!(completion_events(&engine), vec![(3, 3, false)]);
    assert!(engine.is_ended(instance));
}

#[test]
fn instance_limit_is_enforced() {
    let config = EngineConfig {
        max_instances: 5,
        ..EngineConfig::default()
    };
    let mut engine = ProcessEngine::new(config);
    let definition_id = deploy(
        &mut engine,
        r#"
id: runaway
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      loop_cardinality: "6"
"#,
    );

    let error = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect_err("limit exceeded");
    assert!(matches!(
        error,
        ExecutionError::TooManyInstances {
            requested: 6,
            limit: 5,
            ..
        }
    ));
}

#[test]
fn non_boolean_completion_condition_is_an_evaluation_error() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: odd_condition
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      loop_cardinality: "2"
      completion_condition: "${numberOfCompletedInstances}"
"#,
    );

    let error = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect_err("non boolean condition");
    assert!(matches!(
        error,
        ExecutionError::Evaluation {
            purpose: "completion condition",
            ..
        }
    ));
}

#[test]
fn failing_instance_leaves_siblings_running() {
    let mut engine = ProcessEngine::default();
    engine.register_handler("explode", |_activity_id: &str, scope: &dyn VariableScope| -> anyhow::Result<Value> {
        if scope.variable(LOOP_COUNTER) == Some(json!(0)) {
            anyhow::bail!("instance zero refuses to run");
        }
        Ok(Value::Null)
    });
    let definition_id = deploy(
        &mut engine,
        r#"
id: faulty
nodes:
  - id: call
    type: service_task
    handler: explode
    multi_instance:
      loop_cardinality: "3"
"#,
    );

    let error = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect_err("handler failure");
    assert!(matches!(error, ExecutionError::Handler { ref message, .. } if message.contains("refuses")));
    assert!(canceled_counters(&engine).is_empty());
    assert_eq!(
        instance_trail(&engine, "call"),
        vec![("enter", 1), ("enter", 2), ("leave", 1), ("leave", 2)]
    );

    let children: Vec<_> = engine
        .executions_at("call")
        .into_iter()
        .filter(|execution| execution.is_concurrent())
        .map(|execution| execution.variable_local(LOOP_COUNTER).cloned())
        .collect();
    assert_eq!(children, vec![Some(json!(0))]);
    let root = engine
        .executions_at("call")
        .into_iter()
        .find(|execution| execution.is_scope() && !execution.is_process_instance())
        .expect("loop root");
    assert_eq!(root.variable_local(NUMBER_OF_ACTIVE_INSTANCES), Some(&json!(1)));
    assert_eq!(root.variable_local(NUMBER_OF_COMPLETED_INSTANCES), Some(&json!(2)));
}

#[test]
fn failed_completion_condition_can_be_retried() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: retry_condition
nodes:
  - id: approve
    type: user_task
    multi_instance:
      sequential: true
      loop_cardinality: "2"
      completion_condition: "${approved}"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    let first = engine.tasks().remove(0);
    let error = engine
        .complete_task(first.id, IndexMap::new())
        .expect_err("condition needs a variable");
    assert!(matches!(
        error,
        ExecutionError::Evaluation {
            purpose: "completion condition",
            ..
        }
    ));

    let reopened = engine.task(first.id).expect("task stays open");
    assert_eq!(reopened.execution, first.execution);
    assert!(engine.execution(first.execution).is_some_and(|execution| execution.is_waiting()));
    let root = engine
        .executions_at("approve")
        .into_iter()
        .find(|execution| execution.is_scope() && !execution.is_process_instance())
        .expect("loop root");
    assert_eq!(root.variable_local(NUMBER_OF_INSTANCES), Some(&json!(2)));
    assert_eq!(root.variable_local(NUMBER_OF_ACTIVE_INSTANCES), Some(&json!(2)));
    assert_eq!(root.variable_local(NUMBER_OF_COMPLETED_INSTANCES), Some(&json!(0)));

    engine
        .complete_task(first.id, variables(json!({"approved": false})))
        .expect("retry with the variable set");
    let second = engine.tasks().remove(0);
    assert_ne!(second.id, first.id);
    let child = engine.execution(second.execution).expect("second instance");
    assert_eq!(child.variable_local(LOOP_COUNTER), Some(&json!(1)));

    engine
        .complete_task(second.id, variables(json!({"approved": true})))
        .expect("approve");
    assert!(engine.is_ended(instance));
    assert_eq!(
        instance_trail(&engine, "approve"),
        vec![("enter", 0), ("leave", 0), ("enter", 1), ("leave", 1)]
    );
    assert_eq!(completion_events(&engine), vec![(2, 2, true)]);
}

#[test]
fn shrunk_collection_blocks_the_next_instance_until_restored() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: shrinking
nodes:
  - id: review
    type: user_task
    multi_instance:
      sequential: true
      collection: reviewers
      element_variable: reviewer
"#,
    );
    engine
        .start_process_instance(&definition_id, variables(json!({"reviewers": ["kermit", "gonzo", "fozzie"]})))
        .expect("start process");

    let first = engine.tasks().remove(0);
    assert_eq!(first.assignee.as_deref(), Some("kermit"));
    let error = engine
        .complete_task(first.id, variables(json!({"reviewers": ["kermit"]})))
        .expect_err("collection shrank");
    assert!(matches!(
        error,
        ExecutionError::CardinalityExceedsCollection {
            cardinality: 3,
            size: 1,
            ..
        }
    ));
    assert_eq!(engine.tasks().len(), 1);

    engine
        .complete_task(first.id, variables(json!({"reviewers": ["kermit", "gonzo", "fozzie"]})))
        .expect("retry with the full collection");
    let second = engine.tasks().remove(0);
    assert_eq!(second.assignee.as_deref(), Some("gonzo"));
}

#[test]
fn failed_signal_leaves_the_execution_waiting() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: signal_retry
nodes:
  - id: wait
    type: receive_task
    multi_instance:
      loop_cardinality: "2"
      completion_condition: "${approved}"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    let waiting: Vec<_> = engine
        .executions_at("wait")
        .into_iter()
        .filter(|execution| execution.is_waiting())
        .map(|execution| execution.id())
        .collect();
    assert_eq!(waiting.len(), 2);

    assert!(matches!(
        engine.signal(waiting[0], None),
        Err(ExecutionError::Evaluation { .. })
    ));
    assert!(engine.execution(waiting[0]).is_some_and(|execution| execution.is_waiting()));
    assert!(!engine.is_ended(instance));

    engine
        .signal(waiting[0], Some(json!({"approved": true})))
        .expect("signal with approval");
    assert!(engine.is_ended(instance));
    assert_eq!(canceled_counters(&engine), vec![1]);
}

#[test]
fn parallel_counters_stay_consistent_when_completed_out_of_order() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: parallel_counters
nodes:
  - id: review
    type: user_task
    multi_instance:
      loop_cardinality: "4"
      completion_condition: "${numberOfActiveInstances + numberOfCompletedInstances != numberOfInstances}"
"#,
    );
    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");

    let counters = |engine: &ProcessEngine| {
        let root = engine
            .executions_at("review")
            .into_iter()
            .find(|execution| execution.is_scope() && !execution.is_process_instance())
            .expect("loop root");
        let read = |name: &str| root.variable_local(name).and_then(Value::as_u64).expect("counter");
        (
            read(NUMBER_OF_INSTANCES),
            read(NUMBER_OF_ACTIVE_INSTANCES),
            read(NUMBER_OF_COMPLETED_INSTANCES),
        )
    };
    assert_eq!(counters(&engine), (4, 4, 0));

    let mut tasks = engine.tasks();
    assert_eq!(tasks.len(), 4);
    tasks.reverse();
    let last = tasks.pop().expect("four tasks");
    let mut observed = Vec::new();
    for task in tasks {
        engine.complete_task(task.id, IndexMap::new()).expect("complete task");
        observed.push(counters(&engine));
    }
    assert_eq!(observed, vec![(4, 3, 1), (4, 2, 2), (4, 1, 3)]);

    engine.complete_task(last.id, IndexMap::new()).expect("complete last task");
    assert!(engine.is_ended(instance));
    assert_eq!(completion_events(&engine), vec![(4, 4, false)]);
    let left: Vec<_> = instance_trail(&engine, "review")
        .into_iter()
        .filter(|(kind, _)| *kind == "leave")
        .map(|(_, counter)| counter)
        .collect();
    assert_eq!(left, vec![3, 2, 1, 0]);
}

#[test]
fn pruning_forgets_an_ended_instance() {
    let mut engine = ProcessEngine::default();
    let definition_id = deploy(
        &mut engine,
        r#"
id: prunable
nodes:
  - id: approve
    type: manual_task
    multi_instance:
      loop_cardinality: "2"
"#,
    );
    let first = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start first");
    let second = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start second");
    assert!(engine.is_ended(first) && engine.is_ended(second));

    assert!(engine.prune_ended(first));
    assert!(!engine.prune_ended(first));
    assert!(!engine.is_ended(first));
    assert!(engine.history().iter().all(|event| event.process_instance == second));
    assert!(!engine.history().is_empty());
}

#[test]
fn noop_handler_result_is_stored() {
    let mut engine = ProcessEngine::default();
    engine.register_handler("noop", NoopHandler);
    let definition_id = deploy(
        &mut engine,
        r#"
id: noop
nodes:
  - id: call
    type: service_task
    handler: noop
    result_variable: outcome
"#,
    );

    let instance = engine
        .start_process_instance(&definition_id, IndexMap::new())
        .expect("start process");
    assert_eq!(engine.variable(instance, "outcome"), Some(json!({"activity_id": "call"})));
}
