//! Strand CLI - assemble and run linear AI-agent pipelines

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use strand::{
    AgentCatalog, ApiKeyCatalog, Backend, CompatibilityFilter, CredentialSource, DataType,
    Dispatcher, Draft, FileInput, FixSuggestion, HttpBackend, Pipeline, RunInput, RunOptions,
    StrandError,
};

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Strand - linear AI-agent pipeline builder and runner")]
#[command(version)]
struct Cli {
    /// Path to the local draft file
    #[arg(long, global = true, default_value = "strand.draft.json")]
    draft: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List agents selectable as the next step
    Agents {
        /// Filter by input type (only applies while the draft is empty)
        #[arg(short, long)]
        input: Option<String>,

        /// Filter by output type
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List stored API keys (ids and providers only)
    Keys,

    /// Start a new draft pipeline
    New { name: String },

    /// Append an agent as the tail step
    Add { agent_id: String },

    /// Remove a step and re-link the chain
    Remove { step_id: String },

    /// Move a step one position towards the head
    Up { step_id: String },

    /// Move a step one position towards the tail
    Down { step_id: String },

    /// Print the draft pipeline
    Show,

    /// Bind an API key to a step
    Bind {
        step_id: String,

        /// Reference a key stored in the backend vault
        #[arg(long, conflicts_with = "literal", required_unless_present = "literal")]
        key_id: Option<String>,

        /// Forward a literal key value
        #[arg(long)]
        literal: Option<String>,
    },

    /// Deploy the draft as a service
    Save,

    /// Delete a deployed service
    Delete { service_id: String },

    /// Run the deployed service
    Run {
        /// Input text (required unless the pipeline is file-driven)
        #[arg(short, long)]
        input: Option<String>,

        /// File to process
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Ask transcription agents for word timestamps
        #[arg(long)]
        timestamps: bool,

        /// Source-language hint for transcription agents
        #[arg(long)]
        language: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<(), StrandError> {
    let draft_path = cli.draft;
    match cli.command {
        Commands::Agents { input, output } => list_agents(&draft_path, input, output).await,
        Commands::Keys => list_keys().await,
        Commands::New { name } => new_draft(&draft_path, name),
        Commands::Add { agent_id } => add_step(&draft_path, &agent_id).await,
        Commands::Remove { step_id } => remove_step(&draft_path, &step_id).await,
        Commands::Up { step_id } => move_step(&draft_path, &step_id, true).await,
        Commands::Down { step_id } => move_step(&draft_path, &step_id, false).await,
        Commands::Show => show(&draft_path),
        Commands::Bind {
            step_id,
            key_id,
            literal,
        } => bind(&draft_path, &step_id, key_id, literal),
        Commands::Save => save(&draft_path).await,
        Commands::Delete { service_id } => delete(&draft_path, &service_id).await,
        Commands::Run {
            input,
            file,
            timestamps,
            language,
        } => run(&draft_path, input, file, timestamps, language).await,
    }
}

fn parse_filter(value: Option<String>) -> Result<Option<DataType>, StrandError> {
    match value {
        None => Ok(None),
        Some(v) => DataType::parse(&v)
            .map(Some)
            .ok_or(StrandError::InvalidDataType { value: v }),
    }
}

async fn fetch_catalog(backend: &HttpBackend) -> Result<AgentCatalog, StrandError> {
    Ok(AgentCatalog::from_wire(backend.fetch_agents().await?))
}

async fn list_agents(
    draft_path: &Path,
    input: Option<String>,
    output: Option<String>,
) -> Result<(), StrandError> {
    let backend = HttpBackend::from_env();
    let catalog = fetch_catalog(&backend).await?;
    let pipeline = if draft_path.exists() {
        Draft::load(draft_path)?.pipeline
    } else {
        Pipeline::default()
    };

    if let Some(required) = pipeline.output_type() {
        println!(
            "{} next step must accept: {}",
            "→".cyan(),
            required.to_string().cyan().bold()
        );
    }

    let filter = CompatibilityFilter::new(&catalog);
    let offered = filter.selectable(&pipeline, parse_filter(input)?, parse_filter(output)?);
    if offered.is_empty() {
        println!("No selectable agents.");
        return Ok(());
    }
    for agent in offered {
        let key = if agent.requires_api_key { " [key]" } else { "" };
        println!(
            "  {}  {} ({} → {}) {}{}",
            agent.id.bold(),
            agent.name,
            agent.input_type,
            agent.output_type,
            agent.agent_type.dimmed(),
            key.yellow()
        );
    }
    Ok(())
}

async fn list_keys() -> Result<(), StrandError> {
    let backend = HttpBackend::from_env();
    let keys = backend.fetch_api_keys().await?;
    if keys.is_empty() {
        println!("No stored keys.");
        return Ok(());
    }
    for key in keys {
        println!("  {}  {}", key.id.bold(), key.provider);
    }
    Ok(())
}

fn new_draft(draft_path: &Path, name: String) -> Result<(), StrandError> {
    let draft = Draft::new(Pipeline::new(name)?);
    draft.store(draft_path)?;
    println!(
        "{} Draft '{}' created at {}",
        "✓".green(),
        draft.pipeline.name,
        draft_path.display()
    );
    Ok(())
}

async fn add_step(draft_path: &Path, agent_id: &str) -> Result<(), StrandError> {
    let mut draft = Draft::load(draft_path)?;
    let backend = HttpBackend::from_env();
    let catalog = fetch_catalog(&backend).await?;

    let step_id = draft.pipeline.add_step(&catalog, agent_id)?;
    draft.store(draft_path)?;
    println!("{} Added step {} ({})", "✓".green(), step_id.bold(), agent_id);
    Ok(())
}

async fn remove_step(draft_path: &Path, step_id: &str) -> Result<(), StrandError> {
    let mut draft = Draft::load(draft_path)?;
    let backend = HttpBackend::from_env();
    let catalog = fetch_catalog(&backend).await?;

    draft.pipeline.remove_step(&catalog, step_id)?;
    draft.bindings.unbind(step_id);
    draft.store(draft_path)?;
    println!("{} Removed step {}", "✓".green(), step_id.bold());
    Ok(())
}

async fn move_step(draft_path: &Path, step_id: &str, up: bool) -> Result<(), StrandError> {
    let mut draft = Draft::load(draft_path)?;
    let backend = HttpBackend::from_env();
    let catalog = fetch_catalog(&backend).await?;

    let moved = if up {
        draft.pipeline.move_up(&catalog, step_id)?
    } else {
        draft.pipeline.move_down(&catalog, step_id)?
    };
    if moved {
        draft.store(draft_path)?;
        println!("{} Moved step {}", "✓".green(), step_id.bold());
    } else {
        println!("Step {} is already at the boundary.", step_id.bold());
    }
    Ok(())
}

fn show(draft_path: &Path) -> Result<(), StrandError> {
    let draft = Draft::load(draft_path)?;
    let pipeline = &draft.pipeline;

    println!("{} {}", "Pipeline:".cyan().bold(), pipeline.name);
    if let Some(service_id) = &pipeline.service_id {
        println!("  deployed as: {}", service_id.bold());
    }
    match (pipeline.input_type(), pipeline.output_type()) {
        (Some(input), Some(output)) => println!("  types: {input} → {output}"),
        _ => println!("  types: (unset)"),
    }

    let seq = pipeline.ordered()?;
    if seq.is_empty() {
        println!("  (no steps)");
        return Ok(());
    }
    for (idx, step) in seq.iter().enumerate() {
        let bound = match draft.bindings.binding(&step.id) {
            Some(CredentialSource::Stored { id }) => format!(" key: {id}"),
            Some(CredentialSource::Literal { .. }) => " key: (literal)".to_string(),
            None => String::new(),
        };
        println!(
            "  {}. {}  agent={}{}",
            idx + 1,
            step.id.bold(),
            step.agent_id,
            bound.yellow()
        );
    }
    Ok(())
}

fn bind(
    draft_path: &Path,
    step_id: &str,
    key_id: Option<String>,
    literal: Option<String>,
) -> Result<(), StrandError> {
    let mut draft = Draft::load(draft_path)?;
    if draft.pipeline.get(step_id).is_none() {
        return Err(StrandError::UnknownStep {
            step_id: step_id.to_string(),
        });
    }

    let source = match (key_id, literal) {
        (Some(id), None) => CredentialSource::Stored { id },
        (None, Some(value)) => CredentialSource::Literal { value },
        _ => unreachable!("clap enforces exactly one source"),
    };
    draft.bindings.bind(step_id, source);
    draft.store(draft_path)?;
    println!("{} Bound credential to step {}", "✓".green(), step_id.bold());
    Ok(())
}

async fn save(draft_path: &Path) -> Result<(), StrandError> {
    let mut draft = Draft::load(draft_path)?;
    if draft.pipeline.is_empty() {
        return Err(StrandError::EmptyPipeline);
    }

    let backend = HttpBackend::from_env();
    let catalog = fetch_catalog(&backend).await?;
    if let Some(first) = draft.pipeline.type_breaks(&catalog)?.into_iter().next() {
        return Err(first.into_error());
    }

    let payload = draft.pipeline.to_service_payload()?;
    let record = backend.create_service(&payload).await?;
    let service_id = match record.get("id") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    draft.pipeline.service_id = service_id.clone();
    draft.store(draft_path)?;

    match service_id {
        Some(id) => println!("{} Service saved as {}", "✓".green(), id.bold()),
        None => println!("{} Service saved", "✓".green()),
    }
    Ok(())
}

async fn delete(draft_path: &Path, service_id: &str) -> Result<(), StrandError> {
    let backend = HttpBackend::from_env();
    backend.delete_service(service_id).await?;

    // Forget the deployment marker if this draft pointed at it.
    if draft_path.exists() {
        let mut draft = Draft::load(draft_path)?;
        if draft.pipeline.service_id.as_deref() == Some(service_id) {
            draft.pipeline.service_id = None;
            draft.store(draft_path)?;
        }
    }
    println!("{} Service {} deleted", "✓".green(), service_id.bold());
    Ok(())
}

async fn run(
    draft_path: &Path,
    input: Option<String>,
    file: Option<PathBuf>,
    timestamps: bool,
    language: Option<String>,
) -> Result<(), StrandError> {
    let draft = Draft::load(draft_path)?;
    let service_id = draft
        .pipeline
        .service_id
        .clone()
        .ok_or(StrandError::NotDeployed)?;

    let backend = HttpBackend::from_env();
    let catalog = fetch_catalog(&backend).await?;
    let keys = ApiKeyCatalog::new(backend.fetch_api_keys().await?);

    let run_input = RunInput {
        text: input,
        file: file.as_deref().map(FileInput::read).transpose()?,
        options: RunOptions {
            timestamps,
            language,
        },
    };

    let dispatcher = Dispatcher::new(backend);
    let outcome = dispatcher
        .run(
            &service_id,
            &draft.pipeline,
            &catalog,
            &draft.bindings,
            &keys,
            run_input,
        )
        .await?;

    println!(
        "{} Run complete ({}, display: {:?})",
        "✓".green(),
        outcome.strategy,
        outcome.display
    );
    if let Some(process_id) = &outcome.process_id {
        println!("  process: {process_id}");
    }
    if !outcome.text.is_empty() {
        println!("{}", "Output:".cyan().bold());
        println!("{}", outcome.text);
    }
    Ok(())
}
