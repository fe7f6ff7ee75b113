use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragkeep::chat::ChatSession;
use ragkeep::config::Settings;
use ragkeep::db::Database;
use ragkeep::models::*;
use ragkeep::update::{apply_llm_update, apply_project_update, UpdateOutcome};

#[derive(Parser)]
#[command(name = "ragkeep")]
#[command(about = "Manage RAG project configuration and chat session memory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the configuration database
    Migrate,
    /// Inspect and edit project configuration
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Inspect and edit LLM profiles
    Llm {
        #[command(subcommand)]
        command: LlmCommands,
    },
    /// Inspect and edit chat session memory
    Chat {
        #[command(subcommand)]
        command: ChatCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List all projects
    List,
    /// Show one project, with credentials masked
    Show { name: String },
    /// Create a project
    Create {
        name: String,
        /// Pipeline kind (rag, inference, router, ragsql, vision)
        #[arg(long = "type", default_value = "rag")]
        project_type: String,
        #[arg(long)]
        llm: String,
        #[arg(long)]
        embeddings: Option<String>,
        #[arg(long)]
        vectorstore: Option<String>,
        #[arg(long)]
        human_name: Option<String>,
    },
    /// Apply a JSON partial update read from a file, or stdin when omitted
    Edit {
        name: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Delete a project and its routing entrances
    Delete { name: String },
}

#[derive(Subcommand)]
enum LlmCommands {
    /// List all LLM profiles
    List,
    /// Register an LLM profile
    Create {
        name: String,
        #[arg(long)]
        class_name: String,
        /// Loader options as a JSON object
        #[arg(long, default_value = "{}")]
        options: String,
        #[arg(long, default_value = "private")]
        privacy: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "type", default_value = "chat")]
        llm_type: String,
    },
    /// Apply a JSON partial update read from a file, or stdin when omitted
    Edit {
        name: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Append a turn to a session, creating the session when no id is given
    Append {
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "user")]
        role: String,
        content: String,
    },
    /// Print the retained window of a session
    History { id: String },
    /// Forget a session's turns
    Clear { id: String },
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "ragkeep=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    let db = match &settings.database_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

fn read_json<T: DeserializeOwned>(file: Option<&PathBuf>) -> anyhow::Result<T> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    serde_json::from_str(&raw).context("Invalid JSON update")
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(kind: &str, name: &str, outcome: UpdateOutcome) -> anyhow::Result<()> {
    match outcome {
        UpdateOutcome::NotFound => anyhow::bail!("{} not found: {}", kind, name),
        UpdateOutcome::Unchanged => println!("{} {} unchanged", kind, name),
        UpdateOutcome::Committed { fields } => {
            println!("{} {} updated: {}", kind, name, fields.join(", "))
        }
    }
    Ok(())
}

fn run_project(settings: &Settings, command: ProjectCommands) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    match command {
        ProjectCommands::List => {
            let projects: Vec<_> = db
                .get_all_projects()?
                .iter()
                .map(ProjectConfig::redacted)
                .collect();
            print_json(&projects)?;
        }
        ProjectCommands::Show { name } => {
            let project = db
                .get_project_by_name(&name)?
                .ok_or_else(|| anyhow::anyhow!("Project not found: {}", name))?;
            print_json(&project.redacted())?;
        }
        ProjectCommands::Create {
            name,
            project_type,
            llm,
            embeddings,
            vectorstore,
            human_name,
        } => {
            let project = db.create_project(CreateProjectInput {
                name,
                project_type,
                llm,
                embeddings,
                vectorstore,
                human_name,
            })?;
            print_json(&project.redacted())?;
        }
        ProjectCommands::Edit { name, file } => {
            let update: ProjectUpdate = read_json(file.as_ref())?;
            report("Project", &name, apply_project_update(&db, &name, &update)?)?;
        }
        ProjectCommands::Delete { name } => {
            if !db.delete_project(&name)? {
                anyhow::bail!("Project not found: {}", name);
            }
            println!("Project {} deleted", name);
        }
    }
    Ok(())
}

fn run_llm(settings: &Settings, command: LlmCommands) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    match command {
        LlmCommands::List => print_json(&db.get_all_llms()?)?,
        LlmCommands::Create {
            name,
            class_name,
            options,
            privacy,
            description,
            llm_type,
        } => {
            let options: serde_json::Value =
                serde_json::from_str(&options).context("Invalid --options JSON")?;
            let privacy = LlmPrivacy::from_str(&privacy)
                .ok_or_else(|| anyhow::anyhow!("Privacy must be 'public' or 'private'"))?;
            let llm = db.create_llm(CreateLlmInput {
                name,
                class_name,
                options,
                privacy,
                description,
                llm_type,
            })?;
            print_json(&llm)?;
        }
        LlmCommands::Edit { name, file } => {
            let update: LlmUpdate = read_json(file.as_ref())?;
            report("LLM", &name, apply_llm_update(&db, &name, &update)?)?;
        }
    }
    Ok(())
}

fn run_chat(settings: &Settings, command: ChatCommands) -> anyhow::Result<()> {
    if !settings.chat_store.is_durable() {
        tracing::warn!("REDIS_HOST is not set; chat history will not outlive this command");
    }

    match command {
        ChatCommands::Append { id, role, content } => {
            let role = MessageRole::from_str(&role)
                .ok_or_else(|| anyhow::anyhow!("Unknown role: {}", role))?;
            let session = ChatSession::open(id.as_deref(), &settings.chat_store)?;
            session.memory().append_turn(role, content)?;
            println!("{}", session.id());
        }
        ChatCommands::History { id } => {
            let session = ChatSession::open(Some(&id), &settings.chat_store)?;
            print_json(&session.memory().read_window()?)?;
        }
        ChatCommands::Clear { id } => {
            let session = ChatSession::open(Some(&id), &settings.chat_store)?;
            session.clear_history()?;
            println!("Cleared history of {}", session.id());
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let settings = Settings::from_env();

    match cli.command {
        Commands::Migrate => {
            open_database(&settings)?;
            tracing::info!("Database is up to date");
        }
        Commands::Project { command } => run_project(&settings, command)?,
        Commands::Llm { command } => run_llm(&settings, command)?,
        Commands::Chat { command } => run_chat(&settings, command)?,
    }

    Ok(())
}
