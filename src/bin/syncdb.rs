use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use syncdb_lib::config::{AppConfig, AppPaths};
use syncdb_lib::logging::{LogCategory, LogManager, DEFAULT_MAX_LOG_LINES};
use syncdb_lib::sync_engine::{RcloneEngine, SyncCompleted, DEFAULT_TEST_TIMEOUT};
use syncdb_lib::AppState;

#[derive(Parser)]
#[command(name = "syncdb")]
#[command(version, about = "Push finished database dumps to an rclone remote", long_about = None)]
struct Cli {
    /// Config file (.json, .yaml or .yml). Defaults to config.json next to the executable.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding logs/ and the bundled rclone. Defaults to the executable's directory.
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    /// Echo log lines to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the backup directory and sync after each settled burst of dumps
    Watch(Overrides),
    /// Check that the remote is reachable (`rclone lsd`)
    Test {
        #[command(flatten)]
        overrides: Overrides,

        /// Seconds to wait before giving up
        #[arg(long, default_value_t = DEFAULT_TEST_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Copy the backup directory once, right now
    Sync(Overrides),
    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,
    /// Merge the given values into the config file
    Set(Overrides),
}

#[derive(Args, Clone)]
struct Overrides {
    #[arg(short, long)]
    backup: Option<PathBuf>,

    #[arg(short, long)]
    remote: Option<String>,

    #[arg(long)]
    ignore_existing: Option<bool>,

    #[arg(long)]
    quiet_secs: Option<u64>,

    /// File extension to react to; repeat for several
    #[arg(long = "ext")]
    extensions: Vec<String>,

    #[arg(long)]
    rclone: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(backup) = &self.backup {
            config.backup_path = backup.clone();
        }
        if let Some(remote) = &self.remote {
            config.remote_path = remote.clone();
        }
        if let Some(ignore) = self.ignore_existing {
            config.ignore_existing = ignore;
        }
        if let Some(secs) = self.quiet_secs {
            config.quiet_period_secs = secs;
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions.clone();
        }
        if let Some(rclone) = &self.rclone {
            config.rclone_binary = Some(rclone.clone());
        }
    }
}

fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_completed(done: &SyncCompleted) {
    let when = chrono::Local::now().format("%H:%M:%S");
    match done.exit_status {
        Some(0) => println!("✅ [{when}] Sync finished"),
        Some(code) => eprintln!("❌ [{when}] rclone exited with {code}: {}", done.log_text),
        None => eprintln!("❌ [{when}] {}", done.log_text),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.app_dir {
        Some(dir) => AppPaths::new(dir.clone()),
        None => AppPaths::from_current_exe()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = AppConfig::load(&config_path)?;

    paths.ensure_log_dir()?;
    let log_manager = LogManager::new(DEFAULT_MAX_LOG_LINES)
        .with_file(paths.app_log())
        .with_stderr(cli.verbose);
    let state = AppState::with_log_manager(paths.clone(), Arc::new(log_manager))
        .with_config_file(config_path.clone());
    state.log_manager.info(LogCategory::App, "App started");

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Set(overrides) => {
                overrides.apply(&mut config);
                config.save(&config_path)?;
                state.log_manager.info(LogCategory::Config, "Config saved");
                println!("💾 Saved {config_path:?}");
            }
        },
        Command::Test { overrides, timeout } => {
            overrides.apply(&mut config);
            let engine = RcloneEngine::new(config.resolve_rclone_binary(&paths));

            let pb = spinner(&format!("Listing {}", config.remote_path.trim()))?;
            let result = state
                .test_connection(&config, &engine, Duration::from_secs(timeout))
                .await;
            pb.finish_and_clear();

            match result {
                Ok(report) if report.is_success() => {
                    if report.stdout.trim().is_empty() {
                        println!("✅ Connection OK");
                    } else {
                        println!("✅ Connection OK\n{}", report.stdout.trim_end());
                    }
                }
                Ok(report) => {
                    eprintln!("❌ Connection failed:\n{}", report.stderr.trim_end());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ [{}] {e}", e.code());
                    std::process::exit(1);
                }
            }
        }
        Command::Sync(overrides) => {
            overrides.apply(&mut config);
            let engine = RcloneEngine::new(config.resolve_rclone_binary(&paths))
                .with_working_dir(paths.app_dir().to_path_buf());

            println!("🚀 Copying {:?} -> {}", config.backup_path, config.remote_path.trim());
            let pb = spinner("rclone copy")?;
            let result = state.run_sync_once(&config, &engine).await;
            pb.finish_and_clear();

            match result {
                Ok(done) => {
                    print_completed(&done);
                    if !done.is_success() {
                        std::process::exit(1);
                    }
                }
                Err(e) => anyhow::bail!("[{}] {e}", e.code()),
            }
        }
        Command::Watch(overrides) => {
            overrides.apply(&mut config);
            let engine = RcloneEngine::new(config.resolve_rclone_binary(&paths))
                .with_working_dir(paths.app_dir().to_path_buf());

            // Starting also saves the merged settings.
            if let Err(e) = state.start_watch(&config, Arc::new(engine)).await {
                anyhow::bail!("[{}] {e}", e.code());
            }

            let mut completed = state
                .subscribe()
                .await
                .ok_or_else(|| anyhow::anyhow!("watch session did not start"))?;

            println!("👀 Watching {:?}", config.backup_path);
            println!("   Remote: {}", config.remote_path.trim());
            println!("   Extensions: {}", config.extensions.join(", "));
            println!("   Quiet period: {}s", config.quiet_period_secs);
            println!("   Press Ctrl-C to stop.");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    msg = completed.recv() => match msg {
                        Ok(done) => print_completed(&done),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            eprintln!("⚠️  missed {n} sync result(s)");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            println!("⏹  Stopping (an in-flight sync is allowed to finish; Ctrl-C again to abort)...");
            tokio::select! {
                _ = state.stop_watch() => {}
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("❌ Aborted");
                    std::process::exit(130);
                }
            }
            while let Ok(done) = completed.try_recv() {
                print_completed(&done);
            }
            println!("✅ Stopped");
        }
    }

    Ok(())
}
