use std::path::Path;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::{Level, debug, info};

use manifold_engine::{EngineConfig, ExecutionId, FlowNodeKind, NoopHandler, ProcessEngine, ProcessModel, parse_process_file};

/// Upper bound on auto-complete rounds so cyclic models cannot spin forever.
const MAX_AUTO_COMPLETE_ROUNDS: usize = 10_000;

fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("validate", sub)) => run_validate(sub),
        Some(("run", sub)) => run_process(sub),
        _ => {
            println!("Available subcommands: validate, run");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let file_arg = Arg::new("file")
        .required(true)
        .action(ArgAction::Set)
        .help("Path to a process model (YAML, or JSON with a .json extension)");

    Command::new("manifold")
        .about("Validate and run multi-instance process models")
        .subcommand(
            Command::new("validate")
                .about("Parse a model and report its problems")
                .arg(file_arg.clone()),
        )
        .subcommand(
            Command::new("run")
                .about("Deploy a model and start one process instance")
                .arg(file_arg)
                .arg(
                    Arg::new("var")
                        .long("var")
                        .action(ArgAction::Append)
                        .value_name("NAME=JSON")
                        .help("Start variable; values that are not valid JSON are taken as text"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .action(ArgAction::Set)
                        .help("Engine configuration file; defaults to the user configuration"),
                )
                .arg(
                    Arg::new("auto-complete")
                        .long("auto-complete")
                        .action(ArgAction::SetTrue)
                        .help("Complete every open task and signal every receive task until the instance ends"),
                ),
        )
}

fn run_validate(matches: &ArgMatches) -> Result<()> {
    let model = load_model(matches)?;
    let engine = ProcessEngine::default();
    let parsed = engine.validate(&model)?;

    if parsed.is_valid() {
        println!("{}: ok ({} activities)", model.id, parsed.definition.activities().count());
        return Ok(());
    }
    for problem in &parsed.problems {
        println!("{}", problem);
    }
    anyhow::bail!("process '{}' has {} problem(s)", model.id, parsed.problems.len())
}

fn run_process(matches: &ArgMatches) -> Result<()> {
    let model = load_model(matches)?;
    let config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::load_from(Path::new(path))?,
        None => EngineConfig::load()?,
    };
    let variables = parse_variables(matches.get_many::<String>("var").into_iter().flatten())?;

    let mut engine = ProcessEngine::new(config);
    for node in &model.nodes {
        if let FlowNodeKind::ServiceTask { handler, .. } = &node.kind {
            debug!(handler = %handler, "registering preview handler");
            engine.register_handler(handler.clone(), NoopHandler);
        }
    }

    let definition_id = engine.deploy(&model)?;
    let instance = engine.start_process_instance(&definition_id, variables)?;
    if matches.get_flag("auto-complete") {
        auto_complete(&mut engine, &model, instance)?;
    }

    let report = json!({
        "process_instance": instance,
        "ended": engine.is_ended(instance),
        "variables": engine.variables(instance),
        "open_tasks": engine.tasks(),
        "history": engine.history(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_model(matches: &ArgMatches) -> Result<ProcessModel> {
    let file = matches.get_one::<String>("file").context("expected a process file")?;
    parse_process_file(file)
}

fn parse_variables<'a>(raw: impl Iterator<Item = &'a String>) -> Result<IndexMap<String, Value>> {
    let mut variables = IndexMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .with_context(|| format!("variable '{}' must look like NAME=JSON", entry))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("variable '{}' has an empty name", entry);
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        variables.insert(name.to_string(), value);
    }
    Ok(variables)
}

fn auto_complete(engine: &mut ProcessEngine, model: &ProcessModel, instance: ExecutionId) -> Result<()> {
    for _ in 0..MAX_AUTO_COMPLETE_ROUNDS {
        if engine.is_ended(instance) {
            return Ok(());
        }
        if let Some(task) = engine.tasks().into_iter().next() {
            info!(task_id = task.id, activity_id = %task.activity_id, "auto-completing task");
            engine.complete_task(task.id, IndexMap::new())?;
            continue;
        }
        let Some(waiting) = waiting_receive_execution(engine, model) else {
            return Ok(());
        };
        info!(execution = %waiting, "auto-signaling receive task");
        engine.signal(waiting, None)?;
    }
    anyhow::bail!("process instance {} did not settle after {} rounds", instance, MAX_AUTO_COMPLETE_ROUNDS)
}

fn waiting_receive_execution(engine: &ProcessEngine, model: &ProcessModel) -> Option<ExecutionId> {
    model
        .nodes
        .iter()
        .filter(|node| matches!(node.kind, FlowNodeKind::ReceiveTask))
        .flat_map(|node| engine.executions_at(&node.id))
        .find(|execution| execution.is_waiting())
        .map(|execution| execution.id())
}
