// file: src/utils/logging.rs
// description: Tracing subscriber initialization with optional ANSI coloring

use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::models::SearchHit;

/// Installs the global subscriber. `RUST_LOG` wins over the verbosity flag.
///
/// Logs go to stderr so stdout stays clean for `--json` output and the MCP
/// stdio transport.
pub fn init_logger(colored_output: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .with_ansi(colored_output);

    // A second init (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

/// One ranked result line for terminal output.
pub fn format_hit(rank: usize, hit: &SearchHit) -> String {
    let score = format!("{:.3}", hit.score);
    let score = if hit.score >= 0.75 {
        score.green().bold()
    } else if hit.score >= 0.5 {
        score.yellow()
    } else {
        score.normal()
    };

    format!(
        "{} {} {} {}",
        format!("{:>2}.", rank).cyan().bold(),
        score,
        format!("[{}]", hit.entity_type).magenta(),
        hit.label()
    )
}
