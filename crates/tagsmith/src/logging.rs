//! Logging initialization.
//!
//! Log output goes to stderr; stdout is reserved for JSON results.
//! `RUST_LOG` overrides everything else.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// ONNX Runtime and the HTTP stack are chatty at debug.
const QUIET_TARGETS: &str = "ort=warn,hyper=warn,hyper_util=warn,reqwest=warn,tokenizers=warn";

/// Initialize the logging subsystem at `level`, as JSON or pretty text.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` section; CLI flags win.
pub fn init_from_config(
    config: &tagsmith_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let level = effective_level(&config.logging.level, verbose_override);
    let json_format = json_logs_override || config.logging.format == "json";
    init(level, json_format);
}

/// `--verbose` forces debug unless the config already asks for trace.
fn effective_level(configured: &str, verbose: bool) -> &'static str {
    let configured = LEVELS
        .iter()
        .copied()
        .find(|l| l.eq_ignore_ascii_case(configured.trim()))
        .unwrap_or("info");
    match (verbose, configured) {
        (true, "trace") => "trace",
        (true, _) => "debug",
        (false, level) => level,
    }
}

fn default_directives(level: &str) -> String {
    format!("{level},{QUIET_TARGETS}")
}
