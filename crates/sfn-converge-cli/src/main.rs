//! sfnctl - drive state machines to their declared state.
//!
//! This is the entry point for the `sfnctl` binary. Every command runs one
//! pass and prints its result as JSON on stdout; logs go to stderr.
//!
//! # Commands
//!
//! - `apply --file desired.json [--identity ARN]` - create or converge
//! - `destroy --identity ARN` - delete and wait until gone
//! - `show --identity ARN [--provider settings.json]` - read the resource and its tags
//!
//! Ctrl-C cancels the pass in progress.

mod input;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use sfn_converge_core::{ResourceIdentity, TagPolicy};
use sfn_converge_engine::{CancellationToken, EngineConfig, ReconcileError, Reconciler, StateMachineAdapter};
use sfn_converge_remote::{HttpClientConfig, HttpStateMachineClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use report::{to_json, ErrorReport};

/// sfnctl - drive state machines to their declared state.
#[derive(Parser, Debug)]
#[command(name = "sfnctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Control plane endpoint.
    #[arg(long, env = "SFN_CONVERGE_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Enable debug logging.
    #[arg(long, default_value = "false", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the state machine, or converge an existing one.
    Apply(ApplyArgs),
    /// Delete the state machine and wait until it is gone.
    Destroy {
        /// Identity (ARN) of the state machine.
        #[arg(long)]
        identity: ResourceIdentity,
    },
    /// Show the state machine and its tags.
    Show {
        /// Identity (ARN) of the state machine.
        #[arg(long)]
        identity: ResourceIdentity,

        #[command(flatten)]
        tags: TagPolicyArgs,
    },
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Desired state file (JSON).
    #[arg(long, short)]
    file: PathBuf,

    /// Identity returned by a previous apply.
    #[arg(long)]
    identity: Option<ResourceIdentity>,

    #[command(flatten)]
    tags: TagPolicyArgs,
}

/// Provider tag settings shared by commands that report tags.
#[derive(Args, Debug)]
struct TagPolicyArgs {
    /// Provider settings file with default tags and ignore rules (JSON).
    #[arg(long)]
    provider: Option<PathBuf>,

    /// Default tag applied to the resource, as key=value.
    #[arg(long = "default-tag", value_parser = input::parse_key_value)]
    default_tags: Vec<(String, String)>,

    /// Tag key to leave alone.
    #[arg(long = "ignore-tag-key")]
    ignore_tag_keys: Vec<String>,

    /// Tag key prefix to leave alone.
    #[arg(long = "ignore-tag-prefix")]
    ignore_tag_prefixes: Vec<String>,
}

impl TagPolicyArgs {
    fn load(&self) -> anyhow::Result<TagPolicy> {
        input::load_policy(
            self.provider.as_deref(),
            &self.default_tags,
            &self.ignore_tag_keys,
            &self.ignore_tag_prefixes,
        )
    }
}

type StateMachineReconciler = Reconciler<StateMachineAdapter<HttpStateMachineClient>>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.debug).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut client_config = HttpClientConfig::from_env();
    if let Some(endpoint) = cli.endpoint {
        client_config.endpoint = endpoint;
    }
    let engine_config = EngineConfig::from_env();
    tracing::debug!(
        endpoint = %client_config.endpoint,
        create_timeout = ?engine_config.create_timeout,
        poll_interval = ?engine_config.poll_interval,
        "Loaded configuration"
    );

    let client = Arc::new(HttpStateMachineClient::new(client_config)?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the current pass");
            on_interrupt.cancel();
        }
    });

    let result = match cli.command {
        Command::Apply(args) => {
            let desired = input::load_desired(&args.file)?;
            let policy = args.tags.load()?;
            let reconciler = reconciler(client, engine_config, policy);
            reconciler
                .reconcile(&desired, args.identity.as_ref(), &cancel)
                .await
                .map(|reconciled| to_json(&reconciled))
        }
        Command::Destroy { identity } => {
            let reconciler = reconciler(client, engine_config, TagPolicy::default());
            reconciler
                .destroy(&identity, &cancel)
                .await
                .map(|()| to_json(&serde_json::json!({ "deleted": identity })))
        }
        Command::Show { identity, tags } => {
            let reconciler = reconciler(client, engine_config, tags.load()?);
            reconciler
                .show(&identity, &cancel)
                .await
                .map(|shown| to_json(&shown))
        }
    };

    finish(result)
}

/// Log filter used when `RUST_LOG` is unset.
const fn default_filter(debug: bool) -> &'static str {
    if debug {
        "info,sfn_converge=debug"
    } else {
        "warn,sfn_converge_engine=info"
    }
}

fn reconciler(
    client: Arc<HttpStateMachineClient>,
    config: EngineConfig,
    policy: TagPolicy,
) -> StateMachineReconciler {
    Reconciler::new(StateMachineAdapter::new(client), config, policy)
}

/// Print the command's output, or its error report, and pick the exit code.
fn finish(result: Result<anyhow::Result<String>, ReconcileError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(output) => {
            println!("{}", output?);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            println!("{}", to_json(&ErrorReport::from(&error))?);
            Ok(ExitCode::FAILURE)
        }
    }
}
