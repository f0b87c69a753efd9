use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sentinel_core::baseline::normalize_path;
use sentinel_core::hasher::Hasher;
use sentinel_core::models::Policy;
use sentinel_core::paths::{data_dir, sentinel_path, settings_path, store_path};
use sentinel_core::preflight::validate_environment;
use sentinel_core::probe::SystemProber;
use sentinel_core::remediation::cleanup_staging;
use sentinel_core::settings::{load_settings, save_settings, SentinelSettings};
use sentinel_core::{BaselineStore, Checker};
use sentinel_service::report::{self, FileDetails};
use sentinel_service::scheduler::{SchedulerConfig, WatchScheduler};
use sentinel_service::shutdown::{ShutdownSignal, ShutdownTrigger};
use sentinel_service::watcher::NotifyWatcher;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Configuration file integrity sentinel", long_about = None)]
struct Cli {
    /// Directory holding the store, settings and daemon sentinel file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the baseline store from a file listing one path per line
    Generate {
        list: PathBuf,
        #[arg(long)]
        auto_restore: Option<bool>,
        #[arg(long)]
        auto_email: Option<bool>,
    },
    /// Track one additional file
    Enroll {
        path: PathBuf,
        #[arg(long)]
        auto_restore: Option<bool>,
        #[arg(long)]
        auto_email: Option<bool>,
    },
    /// Recapture the baseline of a tracked file and clear its degraded flag
    Reenroll { path: PathBuf },
    /// Change the remediation policy of a tracked file
    Policy {
        path: PathBuf,
        #[arg(long)]
        auto_restore: Option<bool>,
        #[arg(long)]
        auto_email: Option<bool>,
    },
    /// Check every active file once
    CheckOnce {
        #[arg(long)]
        json: bool,
    },
    /// Run the event-driven monitor until stopped
    Daemon,
    /// Ask a running daemon to stop
    Stop,
    /// List tracked files and their policy
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show the baseline and check history of one file
    Show {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the check log
    Log {
        #[arg(long)]
        limit: Option<usize>,
        /// Include captured bad digests and metadata
        #[arg(long)]
        forensic: bool,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let data = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };

    match cli.command {
        Commands::Generate {
            list,
            auto_restore,
            auto_email,
        } => generate_command(&data, &list, auto_restore, auto_email),
        Commands::Enroll {
            path,
            auto_restore,
            auto_email,
        } => enroll_command(&data, &path, auto_restore, auto_email),
        Commands::Reenroll { path } => reenroll_command(&data, &path),
        Commands::Policy {
            path,
            auto_restore,
            auto_email,
        } => policy_command(&data, &path, auto_restore, auto_email),
        Commands::CheckOnce { json } => check_once_command(&data, json),
        Commands::Daemon => daemon_command(&data).await,
        Commands::Stop => stop_command(&data),
        Commands::Status { json } => status_command(&data, json),
        Commands::Show { path, json } => show_command(&data, &path, json),
        Commands::Log {
            limit,
            forensic,
            json,
        } => log_command(&data, limit, forensic, json),
    }
}

fn merge_policy(base: Policy, auto_restore: Option<bool>, auto_email: Option<bool>) -> Policy {
    Policy {
        auto_restore: auto_restore.unwrap_or(base.auto_restore),
        auto_email: auto_email.unwrap_or(base.auto_email),
    }
}

fn open_store(data: &Path) -> Result<BaselineStore> {
    Ok(BaselineStore::open(&store_path(data))?)
}

fn settings(data: &Path) -> Result<SentinelSettings> {
    let path = settings_path(data);
    load_settings(&path).with_context(|| format!("load settings from {}", path.display()))
}

fn generate_command(
    data: &Path,
    list: &Path,
    auto_restore: Option<bool>,
    auto_email: Option<bool>,
) -> Result<()> {
    create_private_dir(data)?;
    let settings = settings(data)?;
    if !settings_path(data).exists() {
        save_settings(&settings_path(data), &settings)?;
    }

    let listing = std::fs::read_to_string(list)
        .with_context(|| format!("read path list {}", list.display()))?;
    let paths: Vec<PathBuf> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        return Err(anyhow!("{} lists no paths", list.display()));
    }

    let policy = merge_policy(settings.policy, auto_restore, auto_email);
    let store = BaselineStore::bulk_generate(
        &store_path(data),
        &paths,
        policy,
        &Hasher::new(settings.hash_algorithm),
        &SystemProber,
    )?;
    println!(
        "Baseline generated: {} files in {}",
        store.list_all()?.len(),
        store_path(data).display()
    );
    Ok(())
}

fn enroll_command(
    data: &Path,
    path: &Path,
    auto_restore: Option<bool>,
    auto_email: Option<bool>,
) -> Result<()> {
    let settings = settings(data)?;
    let store = open_store(data)?;
    let policy = merge_policy(settings.policy, auto_restore, auto_email);
    let hasher = Hasher::new(store.hash_algorithm()?);
    let tracked = store.enroll(path, policy, &hasher, &SystemProber)?;
    println!("Enrolled {} ({})", tracked.path, tracked.good_digest);
    Ok(())
}

fn reenroll_command(data: &Path, path: &Path) -> Result<()> {
    let store = open_store(data)?;
    let hasher = Hasher::new(store.hash_algorithm()?);
    let tracked = store.reenroll(path, &hasher, &SystemProber)?;
    println!("Baseline refreshed for {} ({})", tracked.path, tracked.good_digest);
    Ok(())
}

fn policy_command(
    data: &Path,
    path: &Path,
    auto_restore: Option<bool>,
    auto_email: Option<bool>,
) -> Result<()> {
    let store = open_store(data)?;
    let key = normalize_path(path)?.display().to_string();
    let tracked = store
        .get_by_path(&key)?
        .ok_or_else(|| anyhow!("{key} is not tracked"))?;
    let policy = merge_policy(tracked.policy, auto_restore, auto_email);
    store.set_policy(tracked.id, policy)?;
    println!(
        "{key}: auto-restore={} auto-email={}",
        policy.auto_restore, policy.auto_email
    );
    Ok(())
}

fn build_checker(data: &Path) -> Result<(Checker, SentinelSettings)> {
    let settings = settings(data)?;
    validate_environment(data, &store_path(data), &settings)?;
    let store = open_store(data)?;
    let paths: Vec<PathBuf> = store
        .list_active()?
        .into_iter()
        .map(|f| PathBuf::from(f.path))
        .collect();
    cleanup_staging(&paths);
    let checker = Checker::new(store, &settings)?;
    Ok((checker, settings))
}

fn check_once_command(data: &Path, json: bool) -> Result<()> {
    let (checker, _) = build_checker(data)?;
    let results = checker.check_all()?;
    if json {
        let rows: Vec<_> = results
            .iter()
            .map(|(path, outcome)| serde_json::json!({ "path": path, "result": outcome }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (path, outcome) in &results {
            println!("{:<20} {}", outcome.label(), path);
        }
    }
    Ok(())
}

async fn daemon_command(data: &Path) -> Result<()> {
    let (checker, settings) = build_checker(data)?;
    let sentinel = sentinel_path(data);
    if sentinel.exists() {
        warn!(path = %sentinel.display(), "sentinel file already present; replacing");
    }
    std::fs::write(&sentinel, format!("pid {}\n", std::process::id()))
        .with_context(|| format!("write sentinel {}", sentinel.display()))?;

    let (trigger, shutdown) = ShutdownSignal::new(Some(sentinel.clone()));
    let signal_task = tokio::spawn(wait_for_signal(trigger));

    let config = SchedulerConfig::from(&settings.schedule);
    let scheduler_task = tokio::task::spawn_blocking(move || -> Result<()> {
        let watcher = NotifyWatcher::new()?;
        let mut scheduler = WatchScheduler::new(checker, watcher, config)?;
        scheduler.run(&shutdown)
    });

    info!(data_dir = %data.display(), "daemon started");
    let result = scheduler_task.await;
    signal_task.abort();
    if sentinel.exists() {
        let _ = std::fs::remove_file(&sentinel);
    }
    info!("daemon stopped");
    result.map_err(|e| anyhow!("scheduler task failed: {e}"))?
}

async fn wait_for_signal(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("stop signal received");
    trigger.trigger();
}

fn stop_command(data: &Path) -> Result<()> {
    let sentinel = sentinel_path(data);
    if !sentinel.exists() {
        println!("No daemon running");
        return Ok(());
    }
    std::fs::remove_file(&sentinel)
        .with_context(|| format!("remove sentinel {}", sentinel.display()))?;
    println!("Stop requested; the daemon exits within a second");
    Ok(())
}

fn status_command(data: &Path, json: bool) -> Result<()> {
    let store = open_store(data)?;
    let files = store.list_all()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else {
        print!("{}", report::render_status(&files));
        let running = sentinel_path(data).exists();
        println!("daemon: {}", if running { "running" } else { "stopped" });
    }
    Ok(())
}

fn show_command(data: &Path, path: &Path, json: bool) -> Result<()> {
    let store = open_store(data)?;
    let key = normalize_path(path)?.display().to_string();
    let file = store
        .get_by_path(&key)?
        .ok_or_else(|| anyhow!("{key} is not tracked"))?;
    let entries = store.logs_for_file(file.id)?;
    let log = report::collect_log(&store, entries, true)?;
    let details = FileDetails { file, log };
    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else {
        print!("{}", report::render_show(&details));
    }
    Ok(())
}

fn log_command(data: &Path, limit: Option<usize>, forensic: bool, json: bool) -> Result<()> {
    let store = open_store(data)?;
    let entries = store.logs(limit)?;
    let lines = report::collect_log(&store, entries, forensic)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        print!("{}", report::render_log(&lines));
    }
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
