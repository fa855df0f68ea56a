mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use cli::{BackupCommands, Cli, Commands, ConfigCommands, ScriptCommands};
use store_admin::core::config::is_sensitive_key;
use store_admin::core::{
    ActionResult, BackupManager, CancellationToken, ConfigManager, DumpResult, ScriptGateway,
};
use store_admin::utils::{format_bytes, get_env_file, mask_sensitive};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_file = get_env_file(cli.env_file.as_deref())?;
    // RUST_LOG and the web token may live in the same file
    let _ = dotenv::from_path(&env_file);
    init_tracing();

    let config = ConfigManager::load(&env_file)
        .with_context(|| format!("Failed to load {}", env_file.display()))?;

    match cli.command {
        Commands::Backup { command } => handle_backup(&config, command).await,
        Commands::Config { command } => handle_config(config, command),
        Commands::Script { command } => handle_script(&config, command).await,
        #[cfg(feature = "server")]
        Commands::Serve { port, host, cors } => {
            let manager = backup_manager(&config)?;
            let scripts = script_gateway(&config)?;
            store_admin::server::run(manager, scripts, config.web_token(), host, port, cors).await
        }
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn backup_manager(config: &ConfigManager) -> Result<BackupManager> {
    let settings = config.backup_settings()?;
    let database = config.database_config()?;
    Ok(BackupManager::new(settings, database)?)
}

fn script_gateway(config: &ConfigManager) -> Result<ScriptGateway> {
    let settings = config.backup_settings()?;
    Ok(ScriptGateway::new(config.maintenance_scripts()?, settings.tool_timeout))
}

/// Cancel running tools on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping...");
            trigger.cancel();
        }
    });
    token
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} Type 'yes' to continue: ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn print_action(result: &ActionResult) {
    if result.success {
        println!("✓ {}", result.message);
    } else {
        println!("✗ {}", result.message);
    }
    // Restore failures already carry the output in the message
    if let Some(output) = result.output.as_ref().filter(|o| !result.message.contains(o.as_str())) {
        println!("\n{}", output);
    }
}

fn exit_on_failure(success: bool) {
    if !success {
        std::process::exit(1);
    }
}

async fn handle_backup(config: &ConfigManager, command: BackupCommands) -> Result<()> {
    let manager = backup_manager(config)?;

    match command {
        BackupCommands::Create => {
            println!("Creating backup of {}...", manager.database().name);
            let result = DumpResult::from_outcome(manager.create_backup(&cancel_on_ctrl_c()).await);

            if result.success {
                println!("✓ {}", result.message);
                if let (Some(tables), Some(records)) = (result.table_count, result.record_count) {
                    println!("  {} tables, {} records", tables, records);
                }
            } else {
                println!("✗ {}", result.message);
            }
            exit_on_failure(result.success);
        }
        BackupCommands::List => {
            let artifacts = manager.list_backups()?;
            if artifacts.is_empty() {
                println!("No backups in {}", manager.settings().backup_dir.display());
                return Ok(());
            }

            println!("{:<45} {:>12}  {:<20} {}", "FILE", "SIZE", "CREATED", "KIND");
            for artifact in artifacts {
                println!(
                    "{:<45} {:>12}  {:<20} {}",
                    artifact.filename,
                    format_bytes(artifact.size_bytes),
                    artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
                    artifact.kind.as_str()
                );
            }
        }
        BackupCommands::Restore { file, yes } => {
            if !yes {
                let prompt = format!(
                    "⚠️  Restoring {} replaces the contents of database '{}'.",
                    file,
                    manager.database().name
                );
                if !confirm(&prompt)? {
                    println!("Restore cancelled");
                    return Ok(());
                }
            }

            println!("Restoring {}...", file);
            let result = ActionResult::from_restore(manager.restore_backup(&file, &cancel_on_ctrl_c()).await);
            print_action(&result);
            exit_on_failure(result.success);
        }
        BackupCommands::Delete { file } => {
            let result = ActionResult::from_delete(manager.delete_backup(&file).await);
            print_action(&result);
            exit_on_failure(result.success);
        }
        BackupCommands::Download { file, output } => {
            let mut download = match manager.open_backup(&file).await {
                Ok(download) => download,
                Err(e) => {
                    println!("✗ {}", e);
                    std::process::exit(1);
                }
            };

            let output = output.unwrap_or_else(|| PathBuf::from(&download.artifact.filename));
            copy_to(&mut download.file, &output).await?;
            println!(
                "✓ Saved {} ({}) to {}",
                download.artifact.filename,
                format_bytes(download.artifact.size_bytes),
                output.display()
            );
        }
    }

    Ok(())
}

async fn copy_to(source: &mut tokio::fs::File, output: &Path) -> Result<()> {
    let mut target = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    tokio::io::copy(source, &mut target)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    target
        .flush()
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

fn handle_config(mut config: ConfigManager, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::View => {
            println!("Configuration ({}):\n", config.env_file().display());
            for key in config.keys() {
                if let Some(value) = config.get(&key) {
                    let display_value = if is_sensitive_key(&key) {
                        mask_sensitive(value, 2)
                    } else {
                        value.to_string()
                    };
                    println!("{}: {}", key, display_value);
                }
            }
        }
        ConfigCommands::Validate => {
            let errors = config.validate();

            if errors.is_empty() {
                println!("✓ Configuration is valid");
            } else {
                println!("✗ Configuration errors:");
                for error in errors {
                    println!("  - {}", error);
                }
                std::process::exit(1);
            }
        }
        ConfigCommands::Set { key, value } => {
            config.set(key.as_str(), value.as_str());
            config.save()?;
            println!("✓ {} updated in {}", key, config.env_file().display());
        }
    }

    Ok(())
}

async fn handle_script(config: &ConfigManager, command: ScriptCommands) -> Result<()> {
    let gateway = script_gateway(config)?;

    match command {
        ScriptCommands::List => {
            let scripts = gateway.list();
            if scripts.is_empty() {
                println!("No maintenance scripts configured (MAINTENANCE_SCRIPTS)");
            }
            for script in scripts {
                let marker = if script.available { "✓" } else { "✗" };
                println!("{} {:<20} {}", marker, script.name, script.path.display());
            }
        }
        ScriptCommands::Run { name } => {
            let result = gateway.run_action("cli", &name, &cancel_on_ctrl_c()).await;
            print_action(&result);
            exit_on_failure(result.success);
        }
    }

    Ok(())
}
