use std::fs::File;
use std::io;
use std::path::PathBuf;

use ck_context::errors::{ContextError, Result};
use ck_context::plan::{Configuration, Example, State};
use ck_context::source_repo::{self, GitRepoSource, RepoMetadataSource, StaticRepoMetadata};
use ck_context::{Context, ContextInputs, EnvironmentType};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// Naming and tagging context: derive name prefixes and tags, preview the
/// example configurations, and serve git metadata to terraform.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the derived outputs as JSON
    Eval {
        #[command(flatten)]
        vars: VarArgs,
        /// Prefix for output names, e.g. `primary_`
        #[arg(long, default_value = "")]
        prefix: String,
        /// Skip the git lookup and report no source metadata
        #[arg(long)]
        offline: bool,
    },
    /// Print the plan for one of the example configurations
    Plan {
        /// defaults, complete or subcontext
        #[arg(long, default_value = "complete")]
        example: Example,
        #[command(flatten)]
        vars: VarArgs,
        #[arg(long)]
        offline: bool,
    },
    /// External data source: read a JSON query on stdin, print git metadata on stdout
    GitRepo,
}

#[derive(Args, Debug)]
struct VarArgs {
    /// JSON file with context variables; flags override its values
    #[arg(long)]
    vars_file: Option<PathBuf>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    namespace: Option<String>,
    /// Display name, e.g. "QA Primary"
    #[arg(long)]
    environment_type: Option<EnvironmentType>,
    #[arg(long)]
    enabled: Option<bool>,
    #[arg(long)]
    source_repo_tags_enabled: Option<bool>,
    #[arg(long)]
    data_classification: Option<String>,
    #[arg(long)]
    retention_period: Option<String>,
    /// Extra tag as KEY=VALUE (repeatable)
    #[arg(long = "tag", value_parser = parse_key_val)]
    tags: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

impl VarArgs {
    fn into_inputs(self) -> Result<ContextInputs> {
        let mut inputs = match (&self.vars_file, &self.name) {
            (Some(path), _) => serde_json::from_reader::<_, ContextInputs>(File::open(path)?)?,
            (None, Some(name)) => ContextInputs::new(name.clone()),
            (None, None) => {
                return Err(ContextError::InvalidInput("--name or --vars-file is required".into()))
            }
        };
        if let Some(name) = self.name {
            inputs.name = name;
        }
        if let Some(namespace) = self.namespace {
            inputs.namespace = namespace;
        }
        if let Some(env) = self.environment_type {
            inputs.environment_type = env;
        }
        if let Some(enabled) = self.enabled {
            inputs.enabled = enabled;
        }
        if let Some(enabled) = self.source_repo_tags_enabled {
            inputs.source_repo_tags_enabled = enabled;
        }
        if let Some(c) = self.data_classification {
            inputs.data_classification = c;
        }
        if let Some(r) = self.retention_period {
            inputs.retention_period = r;
        }
        inputs.additional_tags.extend(self.tags);
        Ok(inputs)
    }
}

fn metadata_source(offline: bool) -> Result<Box<dyn RepoMetadataSource>> {
    if offline {
        return Ok(Box::new(StaticRepoMetadata::default()));
    }
    Ok(Box::new(GitRepoSource::new(std::env::current_dir()?)))
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // stdout belongs to the command output (and to terraform for git-repo)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Eval { vars, prefix, offline } => {
            let inputs = vars.into_inputs()?;
            let source = metadata_source(offline)?;
            let ctx = Context::evaluate(&inputs, source.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(ctx.outputs(&prefix)))?);
        }
        Cmd::Plan { example, vars, offline } => {
            let inputs = vars.into_inputs()?;
            let source = metadata_source(offline)?;
            let plan = Configuration::example(example, inputs).plan(&State::new(), source.as_ref())?;
            print!("{}", plan.render());
        }
        Cmd::GitRepo => {
            let query = source_repo::read_query(io::stdin().lock())?;
            let dir = match query.get("path") {
                Some(path) => PathBuf::from(path),
                None => std::env::current_dir()?,
            };
            let meta = GitRepoSource::new(dir).lookup()?;
            source_repo::write_result(io::stdout().lock(), &meta)?;
        }
    }
    Ok(())
}

fn main() {
    // Parse CLI arguments.
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
