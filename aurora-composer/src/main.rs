//! aurora - experiment composer command line
//!
//! Manages the sample and protocol inventories in the data folder and
//! submits composed experiments, one workflow per selected sample.

use anyhow::{anyhow, bail, Context, Result};
use aurora_common::config::{DataFolderInitializer, DataFolderResolver, TomlConfig};
use aurora_common::events::EventBus;
use aurora_composer::editor::{ProtocolEditor, DEFAULT_STEP_KIND};
use aurora_composer::import::robot_csv;
use aurora_composer::models::{Scalar, Settings, TechniqueKind};
use aurora_composer::query::{compute_facets, Predicate, Projection};
use aurora_composer::storage::JsonStorage;
use aurora_composer::submission::{DirectoryEngine, InMemoryEngine, WorkflowEngine};
use aurora_composer::{Composer, ProtocolInventory, SampleInventory, WriteOptions};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered events per subscriber
const EVENT_CAPACITY: usize = 64;

/// Command-line arguments for aurora
#[derive(Parser, Debug)]
#[command(name = "aurora")]
#[command(about = "Compose and submit battery cycling experiments")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "AURORA_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the inventory documents
    #[arg(long, global = true)]
    data_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Samples inventory
    #[command(subcommand)]
    Samples(SamplesCommand),

    /// Protocols inventory
    #[command(subcommand)]
    Protocols(ProtocolsCommand),

    /// Submit one workflow per selected sample
    Submit(SubmitArgs),
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Column condition, `column=value`; repeat a column to accept several values
    #[arg(long = "filter", value_name = "COLUMN=VALUE")]
    filters: Vec<String>,

    /// Only samples in this group
    #[arg(long)]
    group: Option<String>,

    /// Created on or after (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    from: Option<String>,

    /// Created on or before (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    to: Option<String>,
}

#[derive(Subcommand, Debug)]
enum SamplesCommand {
    /// List samples matching a filter
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Columns to show
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Import a robot CSV file as a new batch
    Import {
        csv: PathBuf,

        #[arg(long)]
        batch: String,
    },

    /// Assign a sub-batch label
    Subbatch { label: String, ids: Vec<u32> },

    /// Make the given samples exactly the members of a group
    Group { label: String, ids: Vec<u32> },

    /// Delete samples
    Delete { ids: Vec<u32> },

    /// Filter options with live counts
    Facets {
        fields: Vec<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ProtocolsCommand {
    /// List protocol names
    List,

    /// Print a protocol as JSON
    Show { name: String },

    /// Delete a protocol
    Delete { name: String },

    /// Create a protocol from steps, e.g. `--step ocv:time=3600 --step cc:current=0.001,time=7200`
    New {
        name: String,

        #[arg(long = "step", value_name = "KIND[:KEY=VALUE,...]")]
        steps: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    samples: Vec<u32>,

    /// Protocol names in execution order
    #[arg(long, value_delimiter = ',', required = true)]
    protocols: Vec<String>,

    /// JSON file mapping protocol name to settings
    #[arg(long)]
    settings: PathBuf,

    /// Release the cycler when the last protocol finishes
    #[arg(long)]
    unlock: bool,

    /// Group label recorded with every workflow
    #[arg(long)]
    group: String,

    /// Build and print the bundles without writing them anywhere
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

struct Workspace {
    config: TomlConfig,
    folder: PathBuf,
    events: EventBus,
    samples: SampleInventory,
    protocols: ProtocolInventory,
}

impl Workspace {
    fn open(config: TomlConfig, cli_folder: Option<PathBuf>) -> Result<Self> {
        let folder = DataFolderResolver::new(cli_folder, &config).resolve();
        let initializer = DataFolderInitializer::new(folder.clone(), &config);
        initializer
            .ensure_directory_exists()
            .context("Failed to initialize data folder")?;
        info!("Data folder: {}", folder.display());

        let events = EventBus::new(EVENT_CAPACITY);

        let samples_storage = Rc::new(JsonStorage::new(initializer.samples_path()));
        let mut samples = SampleInventory::new(samples_storage).with_events(events.clone());
        samples.init().context("Failed to create samples inventory")?;
        samples.load();

        let protocols_storage = Rc::new(JsonStorage::new(initializer.protocols_path()));
        let mut protocols = ProtocolInventory::new(protocols_storage).with_events(events.clone());
        protocols.init().context("Failed to create protocols inventory")?;
        protocols.load();

        Ok(Self {
            config,
            folder,
            events,
            samples,
            protocols,
        })
    }
}

fn filter_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(|v| v.is_number() || v.is_boolean())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn build_predicate(args: &FilterArgs) -> Result<Predicate> {
    let mut map = Map::new();
    for entry in &args.filters {
        let (column, raw) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("filter {:?} must look like column=value", entry))?;
        let value = filter_value(raw.trim());
        match map.get_mut(column.trim()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(column.trim().to_string(), value);
            }
        }
    }
    if let Some(group) = &args.group {
        map.insert("group".to_string(), Value::String(group.clone()));
    }
    if let Some(from) = &args.from {
        map.insert("from".to_string(), Value::String(from.clone()));
    }
    if let Some(to) = &args.to {
        map.insert("to".to_string(), Value::String(to.clone()));
    }
    Ok(Predicate::from_json(&Value::Object(map))?)
}

fn print_table(table: &aurora_composer::inventory::Table) {
    let columns: Vec<&String> = table.columns().iter().collect();
    println!("{}", columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join("\t"));
    for row in table.rows() {
        let cells: Vec<String> = columns.iter().map(|c| row.get(c).to_string()).collect();
        println!("{}", cells.join("\t"));
    }
    println!("({} rows)", table.len());
}

fn run_samples(ws: &mut Workspace, command: SamplesCommand) -> Result<()> {
    match command {
        SamplesCommand::List { filter, columns } => {
            let predicate = build_predicate(&filter)?;
            let columns = if columns.is_empty() {
                vec![
                    "id".to_string(),
                    "metadata.name".to_string(),
                    "metadata.subbatch".to_string(),
                    "specs.capacity.nominal".to_string(),
                ]
            } else {
                columns
            };
            let projection = Projection::from(columns);
            print_table(&ws.samples.query(&predicate, Some(&projection)));
        }
        SamplesCommand::Import { csv, batch } => {
            let text = std::fs::read_to_string(&csv)
                .with_context(|| format!("Failed to read {}", csv.display()))?;
            let ids = robot_csv::import_batch(
                &mut ws.samples,
                &text,
                &batch,
                WriteOptions::default(),
                Some(&ws.events),
            )?;
            println!("Imported {} samples: {:?}", ids.len(), ids);
        }
        SamplesCommand::Subbatch { label, ids } => {
            ws.samples.assign_subbatch(&ids, &label, WriteOptions::default())?;
            println!("Sub-batch {:?} assigned to {} samples", label, ids.len());
        }
        SamplesCommand::Group { label, ids } => {
            ws.samples.save_group(&ids, &label, WriteOptions::default())?;
            println!("Group {:?} now has {} samples", label, ids.len());
        }
        SamplesCommand::Delete { ids } => {
            let removed = ws.samples.delete_many(&ids, WriteOptions::default())?;
            println!("Deleted {} samples", removed.len());
        }
        SamplesCommand::Facets { fields, filter } => {
            let predicate = build_predicate(&filter)?;
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            for (field, options) in compute_facets(ws.samples.table(), &predicate, &fields) {
                println!("{}:", field);
                for option in options {
                    println!("  {} ({})", option.value, option.count);
                }
            }
        }
    }
    Ok(())
}

fn parse_step(raw_step: &str, editor: &mut ProtocolEditor, first: bool) -> Result<()> {
    let (kind, params) = match raw_step.split_once(':') {
        Some((kind, params)) => (kind, params),
        None => (raw_step, ""),
    };
    let kind: TechniqueKind = kind.parse().map_err(|e: String| anyhow!(e))?;

    if first {
        editor.select(0)?;
        editor.change_variant(kind)?;
        if kind != DEFAULT_STEP_KIND {
            editor.rename_step(&format!("{}_1", kind.short_name()))?;
        }
    } else {
        editor.add_step(kind);
    }

    for assignment in params.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter {:?} must look like key=value", assignment))?;
        let key = key.trim();
        let expected = editor
            .buffer()
            .and_then(|t| t.parameters.get(key))
            .map(|p| p.kind)
            .ok_or_else(|| anyhow!("{} has no parameter {:?}", kind.short_name(), key))?;
        editor.change_parameter(key, Scalar::parse_as(raw, expected)?)?;
    }
    editor.save_step()?;
    Ok(())
}

fn run_protocols(ws: &mut Workspace, command: ProtocolsCommand) -> Result<()> {
    match command {
        ProtocolsCommand::List => {
            for protocol in ws.protocols.protocols() {
                println!("{}\t{} techniques", protocol.name, protocol.method.len());
            }
        }
        ProtocolsCommand::Show { name } => {
            let protocol = ws
                .protocols
                .get(&name)
                .ok_or_else(|| anyhow!("protocol {:?} not found", name))?;
            println!("{}", serde_json::to_string_pretty(protocol)?);
        }
        ProtocolsCommand::Delete { name } => {
            ws.protocols.delete(&name, WriteOptions::default())?;
            println!("Deleted protocol {:?}", name);
        }
        ProtocolsCommand::New { name, steps } => {
            if steps.is_empty() {
                bail!("a protocol needs at least one --step");
            }
            let mut editor = ProtocolEditor::blank();
            for (i, step) in steps.iter().enumerate() {
                parse_step(step, &mut editor, i == 0)
                    .with_context(|| format!("step {} ({:?})", i + 1, step))?;
            }
            editor.set_name(&name);
            editor.save_protocol(&mut ws.protocols, WriteOptions::default())?;
            for technique in &editor.protocol().method {
                let missing = technique.missing_required();
                if !missing.is_empty() {
                    println!(
                        "note: {} still needs {} before it can be submitted",
                        technique.name,
                        missing.join(", ")
                    );
                }
            }
            println!("Saved protocol {:?}", name);
        }
    }
    Ok(())
}

fn load_settings(path: &Path) -> Result<BTreeMap<String, Settings>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid settings file {}", path.display()))
}

fn run_submit(ws: &mut Workspace, args: SubmitArgs) -> Result<()> {
    let settings = load_settings(&args.settings)?;

    let mut composer = Composer::new(ws.events.clone(), ws.config.engine.code_label.clone());
    composer.select_samples(&args.samples);
    composer.select_protocols(&args.protocols);
    for name in &args.protocols {
        if let Some(s) = settings.get(name) {
            composer.save_settings(name, s.clone())?;
        }
    }

    let verdict = composer.signal_preview();
    print!("{}", composer.preview(&ws.samples, &ws.protocols).render());
    if !verdict.is_valid() {
        bail!("selection is not submittable: {}", verdict.notice());
    }

    let mut engine: Box<dyn WorkflowEngine> = if args.dry_run {
        Box::new(InMemoryEngine::new())
    } else {
        let folder = ws
            .config
            .engine
            .workflows_folder
            .clone()
            .unwrap_or_else(|| ws.folder.join("workflows"));
        Box::new(DirectoryEngine::new(folder).context("Failed to open workflow folder")?)
    };

    let report = composer.submit(
        engine.as_mut(),
        &ws.samples,
        &ws.protocols,
        args.unlock,
        &args.group,
    )?;

    for done in &report.submitted {
        println!("{}\t{}\t{}", done.sample_id, done.handle, done.label);
        for warning in &done.warnings {
            println!("{}\tWARNING\t{}", done.sample_id, warning);
        }
    }
    for failure in &report.failures {
        println!("{}\tFAILED\t{}", failure.sample_id, failure.error);
    }
    if args.dry_run {
        println!("(dry run, nothing was written)");
    }
    if !report.is_complete() {
        bail!("{} of {} submissions failed", report.failures.len(), args.samples.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TomlConfig::load_or_default(cli.config.as_deref());
    init_tracing(&config)?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let mut ws = Workspace::open(config, cli.data_folder)?;

    match cli.command {
        Command::Samples(command) => run_samples(&mut ws, command),
        Command::Protocols(command) => run_protocols(&mut ws, command),
        Command::Submit(args) => run_submit(&mut ws, args),
    }
}
