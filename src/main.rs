use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use windowlimit::config::LimiterConfig;
use windowlimit::ratelimit::{spawn_trimmer, RateLimiter, RateRule};

/// Feed `<id> [points]` lines from stdin through a sliding-window limiter.
#[derive(Parser, Debug)]
#[command(name = "windowlimit", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra rule as <window_ms>:<max_points>, may be repeated
    #[arg(short, long = "rule", value_parser = parse_rule)]
    rules: Vec<RateRule>,

    /// Run a trim pass at this interval, overriding the configuration
    #[arg(long)]
    trim_interval_ms: Option<u64>,

    /// Print decisions as JSON lines
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

/// One line of output.
#[derive(Debug, Serialize)]
struct Decision<'a> {
    id: &'a str,
    points: f64,
    allowed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    info!("Starting windowlimit");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => LimiterConfig::from_file(path)?,
        None => LimiterConfig::default(),
    };
    if let Some(interval_ms) = args.trim_interval_ms {
        config.trim.interval_ms = Some(interval_ms);
    }

    let mut rules = config.build_rules()?;
    rules.extend(args.rules.iter().cloned());
    if rules.is_empty() {
        warn!("No rules configured, every request will be allowed");
    }
    for rule in &rules {
        info!(rule = %rule, "Rule loaded");
    }

    let limiter = Arc::new(RateLimiter::new(rules));
    let trimmer = config
        .trim
        .interval()
        .map(|interval| spawn_trimmer(Arc::clone(&limiter), interval));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::pin!(terminate);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            installed = &mut ctrl_c => {
                installed?;
                info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = &mut terminate => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let (id, points) = match parse_line(&line) {
            Some(Ok(request)) => request,
            Some(Err(reason)) => {
                warn!(line = %line, reason = %reason, "Skipping malformed line");
                continue;
            }
            None => continue,
        };

        let decision = Decision {
            id,
            points,
            allowed: limiter.try_consume(id, points),
        };
        let mut output = if args.json {
            serde_json::to_string(&decision)?
        } else {
            let verdict = if decision.allowed { "allow" } else { "deny" };
            format!("{} {} {}", verdict, decision.id, decision.points)
        };
        output.push('\n');
        stdout.write_all(output.as_bytes()).await?;
        stdout.flush().await?;
    }

    if let Some(trimmer) = trimmer {
        trimmer.shutdown().await;
    }

    info!(
        tracked = limiter.record_count(),
        "Windowlimit stopped"
    );
    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parse a `--rule` argument.
fn parse_rule(arg: &str) -> Result<RateRule, String> {
    let (window_ms, max_points) = arg
        .split_once(':')
        .ok_or_else(|| "expected <window_ms>:<max_points>".to_string())?;
    let window_ms: i64 = window_ms
        .trim()
        .parse()
        .map_err(|e| format!("invalid window_ms: {}", e))?;
    let max_points: f64 = max_points
        .trim()
        .parse()
        .map_err(|e| format!("invalid max_points: {}", e))?;
    RateRule::new(window_ms, max_points).map_err(|e| e.to_string())
}

/// Parse an input line into an identifier and a point count.
///
/// Returns `None` for blank lines and `#` comments.
fn parse_line(line: &str) -> Option<Result<(&str, f64), String>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let id = fields.next()?;
    let points = match fields.next() {
        Some(raw) => match raw.parse::<f64>() {
            Ok(points) if points.is_finite() && points >= 0.0 => points,
            Ok(points) => {
                return Some(Err(format!(
                    "points must be finite and non-negative, got {}",
                    points
                )))
            }
            Err(e) => return Some(Err(format!("invalid points: {}", e))),
        },
        None => 1.0,
    };
    if fields.next().is_some() {
        return Some(Err("expected <id> [points]".to_string()));
    }

    Some(Ok((id, points)))
}
