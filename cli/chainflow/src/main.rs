//! Chainflow CLI

use anyhow::Context;
use chainflow_agent::AgentClient;
use chainflow_flow::{BackendCatalog, Settings, WorkflowEngine, WorkflowError};
use chainflow_protocol::WorkflowRequest;
use clap::{Parser, Subcommand};
use console::style;
use secrecy::SecretString;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chainflow")]
#[command(about = "Chain chat backends and remote agents into workflows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition
    Run {
        /// JSON file holding `{steps, input}`
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,

        /// Initial input, replacing the file's `input`
        #[arg(short, long)]
        input: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List known backends
    Backends,

    /// Connect to a remote agent, list its tools and send one prompt
    ProbeAgent {
        /// Agent identifier (e.g. turkyden/weather)
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Prompt to send
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// Credential for this call only
        #[arg(long)]
        api_key: Option<String>,

        /// JSON object of connection parameters (e.g. '{"units": "metric"}')
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Print the JSON schema of a workflow definition
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    match cli.command {
        Commands::Run {
            workflow,
            input,
            json,
        } => run_workflow(settings, workflow, input, json).await,
        Commands::Backends => list_backends(settings).await,
        Commands::ProbeAgent {
            agent_id,
            prompt,
            api_key,
            params,
        } => probe_agent(settings, agent_id, prompt, api_key, params).await,
        Commands::Schema => print_schema(),
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL`, defaulting to info
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level.to_lowercase())
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_request(path: &Path, input: Option<String>) -> anyhow::Result<WorkflowRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
    let mut value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Workflow file {} is not valid JSON", path.display()))?;

    if let Some(input) = input {
        let object = value
            .as_object_mut()
            .context("Workflow file must contain a JSON object")?;
        object.insert("input".to_string(), Value::String(input));
    }

    serde_json::from_value(value).context("Workflow file does not describe a workflow")
}

async fn run_workflow(
    settings: Arc<Settings>,
    path: PathBuf,
    input: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let request = load_request(&path, input)?;
    println!(
        "{}",
        style(format!("⛓️  Running workflow: {} step(s)", request.steps.len()))
            .bold()
            .cyan()
    );

    let engine = WorkflowEngine::from_settings(settings)?;
    let cancel = interrupted(tokio::signal::ctrl_c());

    let result = match engine.run_until(&request, cancel).await {
        Ok(result) => result,
        Err(err) => {
            report_failure(&err);
            return Err(err.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for (index, step) in result.results.iter().enumerate() {
        println!(
            "\n{} {} {}",
            style(format!("[{}]", index + 1)).dim(),
            style(&step.step_name).bold(),
            style(format!("via {}", step.backend_label)).dim()
        );
        println!("{}", step.continuation());
    }
    println!("\n{}", style("✅ Workflow completed").green().bold());
    Ok(())
}

/// Resolves once `signal` reports an interrupt; never resolves if listening failed
async fn interrupted<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Interrupt received, cancelling workflow"),
        Err(e) => {
            warn!("Cannot listen for interrupts: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn report_failure(err: &WorkflowError) {
    match (err.step_index(), err.step_name()) {
        (Some(index), Some(name)) => {
            let kind = err.failure().map(|f| f.kind()).unwrap_or("cancelled");
            println!(
                "\n{}",
                style(format!("❌ Step {} ('{}') failed [{}]", index + 1, name, kind))
                    .red()
                    .bold()
            );
            println!(
                "{}",
                style("   Resubmit the remaining steps with the last output as input to resume").dim()
            );
        }
        _ => println!("\n{}", style(format!("❌ {}", err)).red().bold()),
    }
}

async fn list_backends(settings: Arc<Settings>) -> anyhow::Result<()> {
    println!("{}", style("📋 Backends").bold());
    for backend in BackendCatalog::new(settings).list().await {
        println!("  {}", backend);
    }
    Ok(())
}

async fn probe_agent(
    settings: Arc<Settings>,
    agent_id: String,
    prompt: String,
    api_key: Option<String>,
    params: Option<String>,
) -> anyhow::Result<()> {
    let params: Option<Map<String, Value>> = params
        .map(|raw| serde_json::from_str(&raw).context("--params must be a JSON object"))
        .transpose()?;
    let credential = api_key
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::from);

    println!(
        "{}",
        style(format!("🧪 Probing agent: {}", agent_id)).bold()
    );

    let client = AgentClient::new(settings.agent_config());
    let outcome = client
        .probe(&agent_id, &prompt, params.as_ref(), credential.as_ref())
        .await?;

    println!("  Agent: {}", outcome.agent_id);
    println!("  Tools: {}", outcome.available_tools.join(", "));
    println!("\n{}", style("📝 Response:").bold().green());
    println!("{}", outcome.response);
    Ok(())
}

fn print_schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(WorkflowRequest);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn interrupt_completes_the_cancel_signal() {
        let signal = interrupted(async { Ok::<(), std::io::Error>(()) });
        assert!(tokio::time::timeout(Duration::from_secs(1), signal)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failed_signal_registration_never_cancels() {
        let signal = interrupted(async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"))
        });
        assert!(tokio::time::timeout(Duration::from_millis(100), signal)
            .await
            .is_err());
    }
}
