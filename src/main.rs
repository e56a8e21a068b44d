//! crq CLI
//!
//! Entry point for the `crq` command-line tool.

use clap::{Parser, Subcommand};
use crq::config::{deep_merge, parse_override, CLUSTER_CONFIG_PATH, LOCAL_CONFIG_PATH};
use crq::state::parse_origin;
use crq::{ConfigError, DeploymentConfig, EffectiveConfig, MutationError, RequestService};
use crq_protocol::{ids, Actor, RequestState};
use crq_sim::{SimCluster, StaticCredentials};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;

#[derive(Parser)]
#[command(name = "crq")]
#[command(about = "Container request admission and lifecycle", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration with its sources
    Config {
        /// Local config file (default: crq.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override a config key, e.g. --set container_count_max=5
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Print the attributes a mutation may change
    Permits {
        /// Previous state, or "new" for creation
        #[arg(long)]
        from: String,

        /// Target state
        #[arg(long)]
        to: String,

        /// Evaluate for a privileged actor
        #[arg(long)]
        privileged: bool,
    },

    /// Run a request through an in-memory cluster
    Submit {
        /// JSON file with the request attributes
        request: PathBuf,

        /// Local config file (default: crq.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override a config key
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Complete the bound execution unit and finalize the request
        #[arg(long)]
        complete: bool,

        /// Manifest text the completed unit produces as output
        #[arg(long, requires = "complete")]
        output: Option<String>,

        /// Manifest text the completed unit produces as log
        #[arg(long, requires = "complete")]
        log: Option<String>,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { config, set } => run_config(config, &set),
        Commands::Permits { from, to, privileged } => run_permits(&from, &to, privileged),
        Commands::Submit {
            request,
            config,
            set,
            complete,
            output,
            log,
        } => run_submit(&request, config, &set, complete, output, log),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crq=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(local: Option<PathBuf>, set: &[String]) -> Result<EffectiveConfig, ConfigError> {
    let local = match local {
        Some(path) if !path.exists() => {
            return Err(ConfigError::IoError(format!("{}: not found", path.display())));
        }
        Some(path) => path,
        None => PathBuf::from(LOCAL_CONFIG_PATH),
    };

    let mut overrides: Option<Value> = None;
    for assignment in set {
        let layer = parse_override(assignment)?;
        overrides = Some(match overrides {
            Some(acc) => deep_merge(acc, layer),
            None => layer,
        });
    }

    EffectiveConfig::build(Some(Path::new(CLUSTER_CONFIG_PATH)), Some(local.as_path()), overrides)
}

fn load_deployment(local: Option<PathBuf>, set: &[String]) -> DeploymentConfig {
    let result = load_config(local, set).and_then(|effective| DeploymentConfig::from_effective(&effective));
    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_config(local: Option<PathBuf>, set: &[String]) {
    match load_config(local, set) {
        Ok(effective) => print_json(&effective),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn run_permits(from: &str, to: &str, privileged: bool) {
    let parsed = parse_origin(from).and_then(|previous| Ok((previous, to.parse::<RequestState>()?)));
    let (previous, target) = match parsed {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let actor = if privileged {
        Actor::admin(ids::generate("zzzzz", ids::USER_INFIX))
    } else {
        Actor::user(ids::generate("zzzzz", ids::USER_INFIX))
    };
    let fields: Vec<&str> = crq::state::permitted_fields(previous, target, &actor)
        .into_iter()
        .map(|f| f.as_str())
        .collect();
    print_json(&fields);
}

fn run_submit(
    path: &Path,
    local: Option<PathBuf>,
    set: &[String],
    complete: bool,
    output: Option<String>,
    log: Option<String>,
) {
    let config = load_deployment(local, set);
    let patch = match read_patch(path) {
        Ok(patch) => patch,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(1);
        }
    };

    let mut cluster = SimCluster::new(&config.cluster_id);
    cluster.credentials = StaticCredentials::accept_all();
    let service = RequestService::new(config.clone(), cluster.backends());
    let user = Actor::user(ids::generate(&config.cluster_id, ids::USER_INFIX));

    let mut record = match service.create(&patch, &user) {
        Ok(record) => record,
        Err(e) => exit_with(e),
    };
    debug!(request = %record.uuid, state = %record.state, "Submitted request");

    if complete {
        let Some(unit) = record.container_uuid.clone() else {
            eprintln!("Error: request {} is not bound to an execution unit", record.uuid);
            process::exit(1);
        };
        let output = output.map(|text| cluster.artifacts.put_manifest(&text));
        let log = log.map(|text| cluster.artifacts.put_manifest(&text));
        cluster.units.complete(&unit, output.as_deref(), log.as_deref(), 0);

        record = match service.finalize_if_needed(&record.uuid) {
            Ok(Some(finalized)) => finalized,
            Ok(None) => record,
            Err(e) => exit_with(e),
        };
    }

    print_json(&json!({
        "request": record.api_view(),
        "artifacts": cluster.artifacts.records(),
    }));
}

fn read_patch(path: &Path) -> Result<Map<String, Value>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    match serde_json::from_str::<Value>(&text).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        _ => Err("request must be a JSON object".to_string()),
    }
}

fn exit_with(error: MutationError) -> ! {
    match error.field_errors() {
        Some(errors) => print_json(&json!({ "errors": errors.by_field() })),
        None => eprintln!("Error: {}", error),
    }
    process::exit(error.exit_code());
}
