mod cli;

use mediamirror::{
    config::{self, persist, ResolvedConfig},
    images::{GenerationState, MediaService, SizeStatus, StatusReport},
    server::{self, AppContext},
};
use mediamirror_common::AttachmentId;
use mediamirror_db::pool::{init_pool, DbPool};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediamirror=trace,mediamirror_storage=trace,mediamirror_db=debug,mediamirror_common=debug,tower_http=debug".to_string()
        } else {
            "mediamirror=info,mediamirror_storage=info,mediamirror_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Validate { file } => {
            let path = file.or_else(|| cli.config.clone());
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediamirror {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => show_config(config_path),
            ConfigAction::Set { key, value } => set_config(config_path, &key, &value),
        },
        command => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(command, config_path))
        }
    }
}

fn load_resolved(config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let persisted = config::load_config_or_default(config_path)?;
    ResolvedConfig::from_env(persisted)
}

/// Open the catalog next to the config file, or in the working directory.
fn open_catalog(config_path: Option<&Path>) -> Result<DbPool> {
    let data_dir = config_path
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let db_path = data_dir.join("mediamirror.db");
    let db_path_str = db_path.to_string_lossy();
    tracing::debug!("Opening catalog at {}", db_path_str);
    Ok(init_pool(&db_path_str)?)
}

async fn run(command: Commands, config_path: Option<&Path>) -> Result<()> {
    let mut resolved = load_resolved(config_path)?;
    if let Commands::Start { host, port } = &command {
        resolved = resolved.with_listen_address(host.clone(), *port);
    }

    let pool = open_catalog(config_path)?;
    std::fs::create_dir_all(&resolved.config().local.base_dir).with_context(|| {
        format!(
            "Failed to create uploads directory {:?}",
            resolved.config().local.base_dir
        )
    })?;
    let media = MediaService::from_config(&resolved, pool).await;

    match command {
        Commands::Start { .. } => {
            let server = &resolved.config().server;
            tracing::info!("Starting mediamirror");
            tracing::info!("Server will listen on {}:{}", server.host, server.port);
            let ctx = AppContext::new(resolved, config_path.map(PathBuf::from), media);
            server::start_server(ctx).await
        }
        Commands::Import { file } => {
            if !file.exists() {
                anyhow::bail!("File does not exist: {:?}", file);
            }
            let ingested = media.import(&file).await?;
            println!(
                "Imported {} as attachment {}",
                ingested.attachment.file, ingested.attachment.id
            );
            print_report(&ingested.sizes);
            Ok(())
        }
        Commands::Status { id, size } => {
            let id = AttachmentId::from(id);
            match size {
                Some(size) => print_size(&media.size_status(id, &size)?),
                None => print_report(&media.status(id)?),
            }
            Ok(())
        }
        Commands::Generate { id, size } => {
            let id = AttachmentId::from(id);
            match size {
                Some(size) => print_size(&media.regenerate_size(id, &size).await?),
                None => print_report(&media.regenerate_all(id).await?),
            }
            Ok(())
        }
        Commands::RegenerateAll => {
            let entries = media.regenerate_library().await?;
            for entry in &entries {
                println!("Attachment {}", entry.id);
                print_report(&entry.status);
            }
            println!("Regenerated {} attachments", entries.len());
            Ok(())
        }
        Commands::Sync { id } => {
            let summary = media.sync_attachment(AttachmentId::from(id)).await?;
            if !summary.remote_enabled {
                println!("Remote storage is disabled, nothing to push");
                return Ok(());
            }
            for path in &summary.pushed {
                println!("✓ {}", path);
            }
            for failure in &summary.failed {
                println!("✗ {} ({})", failure.path, failure.error);
            }
            Ok(())
        }
        Commands::Delete { id } => {
            let summary = media.delete_attachment(AttachmentId::from(id)).await?;
            println!("Deleted attachment {} ({} files)", summary.id, summary.files.len());
            for warning in &summary.warnings {
                println!("  warning: {}", warning);
            }
            Ok(())
        }
        Commands::Config { .. } | Commands::Validate { .. } | Commands::Version => Ok(()),
    }
}

fn print_report(report: &StatusReport) {
    for status in report.values() {
        print_size(status);
    }
}

fn print_size(status: &SizeStatus) {
    let current = match (status.width, status.height) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        _ => "-".to_string(),
    };
    let mismatch = match status.preset_mismatch {
        Some(true) => " (mismatch)",
        _ => "",
    };

    print!(
        "  {:<14} preset {}x{}  current {}{}",
        status.name, status.preset_width, status.preset_height, current, mismatch
    );
    if !status.can_generate {
        print!("  [original too small]");
    }
    if let Some(ref generation) = status.generation {
        match generation.state {
            GenerationState::Done => print!("  ✓ generated"),
            GenerationState::Skipped => print!("  - skipped"),
            GenerationState::Failed => print!(
                "  ✗ {}",
                generation.error.as_deref().unwrap_or("failed")
            ),
        }
    }
    println!();

    if let Some(ref url) = status.url {
        println!("      {}", url);
    }
    if let Some(ref generation) = status.generation {
        for warning in &generation.warnings {
            println!("      warning: {}", warning);
        }
    }
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let resolved = load_resolved(config_path)?;

    println!("Provider: {}", match resolved.provider().as_str() {
        "" => "(none)",
        other => other,
    });
    for view in resolved.settings_report()? {
        let source = if view.env_locked {
            format!("  [env: {}]", view.env_var)
        } else {
            String::new()
        };
        println!("  {} = {}{}", view.key, view.value, source);
    }

    println!("Presets:");
    for preset in &resolved.config().presets {
        println!(
            "  {:<14} {}x{}{}",
            preset.name,
            preset.width,
            preset.height,
            if preset.crop { " crop" } else { "" }
        );
    }
    Ok(())
}

fn set_config(config_path: Option<&Path>, key: &str, value: &str) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(config::DEFAULT_PATHS[0]),
    };
    let resolved = load_resolved(config_path)?;
    persist::set_value(&path, key, value, &resolved)?;
    println!("✓ Set {} in {:?}", key, path);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            let resolved = ResolvedConfig::from_env(config)?;
            let config = resolved.config();
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Uploads: {:?}", config.local.base_dir);
            println!("  Provider: {}", resolved.provider().as_str());
            println!("  Presets: {}", config.presets.len());
            let locked: Vec<&str> = resolved.env_locked_keys().collect();
            if !locked.is_empty() {
                println!("  Overridden by environment: {}", locked.join(", "));
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
