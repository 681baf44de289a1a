use anyhow::{Context as _, Result};
use atelierd::{
    config::{ConfigWatcher, DaemonConfig},
    rpc::{
        auth,
        client::{read_auth_token, DaemonClient},
        event::EventBroadcaster,
    },
    storage::Storage,
    AppContext,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "atelierd",
    about = "Atelier — fit-out project management daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "ATELIERD_PORT")]
    port: Option<u16>,

    /// Data directory for config, auth token, and SQLite database
    #[arg(long, env = "ATELIERD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ATELIERD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "ATELIERD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "ATELIERD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs atelierd in the foreground.
    ///
    /// Examples:
    ///   atelierd serve
    ///   atelierd
    Serve,
    /// Query a running daemon and print its status.
    ///
    /// Examples:
    ///   atelierd status
    ///   atelierd status --json
    Status {
        /// Print the raw JSON response instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// View daemon log file.
    ///
    /// Prints the last N lines from the daemon log. Use --follow to tail live output.
    ///
    /// Examples:
    ///   atelierd logs
    ///   atelierd logs -f
    ///   atelierd logs --lines 100
    ///   atelierd logs --filter warn
    Logs {
        /// Follow log output in real time (like tail -f)
        #[arg(long, short)]
        follow: bool,
        /// Number of lines to show (0 = all)
        #[arg(long, short = 'n', default_value = "50")]
        lines: u64,
        /// Minimum log level to show: trace, debug, info, warn, error
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print the client auth token for this daemon's data directory.
    ///
    /// Clients present this token in the first WebSocket frame
    /// (`daemon.auth`) before any other call is accepted.
    Token,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("ATELIERD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let (_file_guard, log_reload) =
        setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        Some(Command::Status { json }) => {
            let config =
                DaemonConfig::new(args.port, args.data_dir, Some("error".to_string()), None);
            let exit_code = run_status(&config, json).await;
            std::process::exit(exit_code);
        }
        Some(Command::Logs { follow, lines, filter }) => {
            let config = DaemonConfig::new(None, args.data_dir, Some("error".to_string()), None);
            run_logs(&config, follow, lines, filter.as_deref())?;
        }
        Some(Command::Token) => {
            let config = DaemonConfig::new(None, args.data_dir, Some("error".to_string()), None);
            let token = auth::get_or_create_token(&config.data_dir)?;
            println!("{token}");
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address, log_reload).await?;
        }
    }

    Ok(())
}

/// Handle for swapping the active log filter at runtime (config hot-reload).
type LogReloadHandle =
    tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime,
/// plus a reload handle so the config watcher can change the level live.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> (
    Option<tracing_appender::non_blocking::WorkerGuard>,
    LogReloadHandle,
) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, reload, EnvFilter};

    let use_json = log_format == "json";
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(log_level));

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("atelierd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .init();
            }
            return (None, reload_handle);
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        (Some(guard), reload_handle)
    } else if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
        (None, reload_handle)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
        (None, reload_handle)
    }
}

/// Swap the active log filter. Called by the config watcher when `log`
/// changes in config.toml.
fn reload_log_filter(handle: &LogReloadHandle, level: &str) {
    match handle.reload(tracing_subscriber::EnvFilter::new(level)) {
        Ok(()) => info!(filter = level, "log level reloaded"),
        Err(e) => warn!(err = %e, "log level reload failed"),
    }
}

// ── atelierd logs ────────────────────────────────────────────────────────────

fn run_logs(
    config: &DaemonConfig,
    follow: bool,
    lines: u64,
    filter: Option<&str>,
) -> Result<()> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Resolve log path: ATELIERD_LOG_FILE env → default {data_dir}/atelierd.log
    let log_path = std::env::var("ATELIERD_LOG_FILE")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| config.data_dir.join("atelierd.log"));

    if !log_path.exists() {
        anyhow::bail!(
            "log file not found: {}\n  Start the daemon with --log-file: atelierd serve --log-file {}",
            log_path.display(),
            log_path.display()
        );
    }

    let content = std::fs::read_to_string(&log_path)
        .with_context(|| format!("cannot read log file: {}", log_path.display()))?;

    let all_lines: Vec<&str> = content.lines().collect();

    let min_level = filter.map(|f| f.to_ascii_lowercase());

    // Apply level filter (heuristic: check for level strings in each line)
    let filtered: Vec<&&str> = if let Some(ref level) = min_level {
        let levels = log_level_order(level);
        all_lines
            .iter()
            .filter(|line| {
                let l = line.to_ascii_lowercase();
                levels.iter().any(|lvl| l.contains(lvl))
            })
            .collect()
    } else {
        all_lines.iter().collect()
    };

    // Print last N lines (0 = all)
    let start = if lines == 0 || lines as usize >= filtered.len() {
        0
    } else {
        filtered.len() - lines as usize
    };

    for line in &filtered[start..] {
        println!("{line}");
    }

    if !follow {
        return Ok(());
    }

    // Follow mode: poll file every 250ms, print new content as it appears
    let mut file = File::open(&log_path)
        .with_context(|| format!("cannot open log file: {}", log_path.display()))?;
    let mut pos = file
        .seek(SeekFrom::End(0))
        .context("cannot seek log file")?;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(250));

        // Handle log rotation: if file shrunk, reopen from start
        let meta = std::fs::metadata(&log_path);
        let new_size = meta.map(|m| m.len()).unwrap_or(0);
        if new_size < pos {
            if let Ok(f) = File::open(&log_path) {
                file = f;
                pos = 0;
            }
        }

        file.seek(SeekFrom::Start(pos))
            .context("cannot seek log file")?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .context("cannot read log file")?;

        if !buf.is_empty() {
            let should_print = if let Some(ref level) = min_level {
                let levels = log_level_order(level);
                levels.iter().any(|lvl| buf.to_ascii_lowercase().contains(lvl))
            } else {
                true
            };
            if should_print {
                print!("{buf}");
            }
            pos += buf.len() as u64;
        }
    }
}

/// Return all log levels at or above `min_level` (for line filtering).
fn log_level_order(min_level: &str) -> Vec<&'static str> {
    match min_level {
        "error" => vec!["error"],
        "warn" | "warning" => vec!["warn", "error"],
        "info" => vec!["info", "warn", "error"],
        "debug" => vec!["debug", "info", "warn", "error"],
        _ => vec!["trace", "debug", "info", "warn", "error"],
    }
}

/// Ask a running daemon for its status over the RPC socket.
/// Returns the process exit code: 0 on success, 1 if the daemon is unreachable.
async fn run_status(config: &DaemonConfig, json: bool) -> i32 {
    let token = match read_auth_token(&config.data_dir) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: could not read auth token: {e:#}");
            eprintln!("is the daemon running? start it with: atelierd serve");
            return 1;
        }
    };
    let client = DaemonClient::new(config.port, token);
    match client.call_once("daemon.status", serde_json::json!({})).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else {
                let s = |k: &str| result.get(k).and_then(|v| v.as_str()).unwrap_or("?").to_string();
                let n = |k: &str| result.get(k).and_then(|v| v.as_u64()).unwrap_or(0);
                println!("atelierd {} (up {}s)", s("version"), n("uptime"));
                println!("  port:     {}", n("port"));
                println!("  projects: {}", n("projects"));
                println!("  users:    {}", n("users"));
            }
            0
        }
        Err(e) => {
            eprintln!("error: daemon not reachable on port {}: {e:#}", config.port);
            1
        }
    }
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
    log_reload: LogReloadHandle,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "atelierd starting");

    let config = DaemonConfig::new(port, data_dir, log, bind_address);
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        bind = %config.bind_address,
        "config loaded"
    );

    let storage = Storage::new_with_slow_query(
        &config.data_dir,
        config.observability.slow_query_threshold_ms,
    )
    .await?;

    let auth_token = match auth::get_or_create_token(&config.data_dir) {
        Ok(t) => {
            info!("auth token ready");
            t
        }
        Err(e) => {
            // The token gates every connection — without it the daemon is fully open.
            eprintln!("FATAL: failed to generate auth token: {e:#}");
            std::process::exit(1);
        }
    };

    // Watch config.toml so log level / retention changes apply without restart.
    // Hold the watcher for the process lifetime; None is non-fatal.
    let config_watcher = ConfigWatcher::start(&config.data_dir, move |hot| {
        reload_log_filter(&log_reload, &hot.log_level);
    });

    // ── Notification pruning + vacuum (daily, first run after 1 h) ───────────
    {
        let storage = storage.clone();
        let hot = config_watcher.as_ref().map(|w| w.hot.clone());
        let startup_days = config.notification_retention_days;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(60 * 60)).await;
            loop {
                let days = match &hot {
                    Some(hot) => hot.read().await.notification_retention_days,
                    None => startup_days,
                };
                match storage.prune_read_notifications(days).await {
                    Ok(n) if n > 0 => {
                        info!(pruned = n, days, "pruned read notifications");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(err = %e, "notification pruning failed");
                    }
                }
                if let Err(e) = storage.vacuum().await {
                    warn!(err = %e, "sqlite vacuum failed");
                }
                tokio::time::sleep(std::time::Duration::from_secs(24 * 60 * 60)).await;
            }
        });
    }

    let ctx = Arc::new(AppContext {
        config,
        storage,
        broadcaster: EventBroadcaster::new(),
        auth_token,
        started_at: std::time::Instant::now(),
    });

    atelierd::rpc::run(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_log_filter_swaps_active_filter() {
        use tracing_subscriber::{layer::SubscriberExt, reload, EnvFilter};

        let (layer, handle) = reload::Layer::new(EnvFilter::new("info"));
        // The layered subscriber owns the filter; keep it alive for the swap.
        let _subscriber = tracing_subscriber::registry().with(layer);

        reload_log_filter(&handle, "debug");
        handle
            .with_current(|f| assert_eq!(f.to_string(), "debug"))
            .unwrap();

        reload_log_filter(&handle, "warn,atelierd=trace");
        handle
            .with_current(|f| {
                let directives = f.to_string();
                assert!(directives.contains("warn"));
                assert!(directives.contains("atelierd=trace"));
            })
            .unwrap();
    }

    #[test]
    fn test_log_level_order() {
        assert_eq!(log_level_order("error"), vec!["error"]);
        assert_eq!(log_level_order("warn"), vec!["warn", "error"]);
        assert_eq!(log_level_order("info"), vec!["info", "warn", "error"]);
        assert_eq!(
            log_level_order("trace"),
            vec!["trace", "debug", "info", "warn", "error"]
        );
    }
}
