//! Mentor application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open storage (SQLite: history, drafts, session slot)
//! 4. Build the HTTP backend and the conversation engine
//! 5. Run the interactive loop

mod cli;
mod repl;

use std::sync::Arc;

use clap::Parser;

use mentor_chat::{ConversationEngine, EngineDeps, HttpBackend, MentorBackend, StaticUser};
use mentor_core::config::MentorConfig;
use mentor_core::types::Language;
use mentor_storage::{Database, HistoryRepository, LocalStateRepository};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Tracing is not up yet, so a load failure is reported below.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match MentorConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (MentorConfig::default(), Some(e)),
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config.backend.base_url = args.resolve_backend_url(&config.backend.base_url);
    if let Some(ref language) = args.language {
        config.chat.default_language = Language::parse_lenient(language);
    }

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting mentor v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Using default configuration"
        ),
    }

    // Storage.
    let data_dir = cli::expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("mentor.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Backend.
    let backend: Arc<dyn MentorBackend> = Arc::new(HttpBackend::new(config.backend.clone())?);
    tracing::info!(base_url = %config.backend.base_url, "Backend configured");

    let user = config.user.current_user();
    if user.is_none() {
        tracing::info!("No user configured; history will not be saved");
    }

    let engine = ConversationEngine::new(
        &config,
        EngineDeps {
            backend,
            history: Arc::new(HistoryRepository::new(Arc::clone(&db))),
            users: Arc::new(StaticUser(user)),
            session_slot: Arc::new(LocalStateRepository::new(Arc::clone(&db))),
            drafts: Arc::new(LocalStateRepository::new(db)),
        },
    );
    let session_id = engine.mount();
    tracing::info!(session_id = %session_id, language = %engine.language(), "Conversation ready");

    repl::run(engine).await?;
    tracing::info!("Goodbye");
    Ok(())
}
