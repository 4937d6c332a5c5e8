use std::path::PathBuf;

use anyhow::Context;
use bookshelf_app::{modules::books::schema::BookSchema, modules::books::schema::ValidationMode};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bookshelf-cli", version, about = "Operate the bookshelf service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Check a JSON book payload against the configured schema
    Validate {
        /// Path to the JSON payload
        file: PathBuf,
        /// Validate as a partial update instead of a create
        #[arg(long)]
        update: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = bookshelf_kernel::settings::Settings::load()
        .with_context(|| "failed to load bookshelf settings")?;
    bookshelf_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve => {
            let app = bookshelf_app::Application::bootstrap(settings).await?;
            app.serve().await
        }
        Command::Migrate => {
            let applied = bookshelf_app::app::migrate(&settings).await?;
            println!("applied {} migration(s)", applied);
            Ok(())
        }
        Command::Validate { file, update } => {
            let schema = BookSchema::load(settings.books.schema_path.as_deref())
                .with_context(|| "failed to load book schema")?;
            let document = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let payload: serde_json::Value = serde_json::from_str(&document)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;

            let mode = if update {
                ValidationMode::Update
            } else {
                ValidationMode::Create
            };
            let report = schema.validate(&payload, mode);

            if report.is_valid() {
                println!("{}: valid", file.display());
                return Ok(());
            }

            for error in report.errors() {
                eprintln!("{}", error);
            }
            anyhow::bail!(
                "{}: {} schema violation(s)",
                file.display(),
                report.errors().len()
            )
        }
    }
}
