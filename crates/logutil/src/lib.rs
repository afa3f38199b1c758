//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

impl LogFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "human" | "human_readable" => Some(LogFormat::HumanReadable),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Build the env filter, preferring `RUST_LOG` if it's set.
fn env_filter(default_level: Level) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    // Quiet down the http stack.
    for directive in ["hyper=info", "reqwest=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Configure the global logger.
///
/// Subsequent calls are no-ops since a global subscriber can only be set
/// once.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(writer);

    let _ = match format {
        LogFormat::HumanReadable => builder
            .with_file(true)
            .with_line_number(true)
            .try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Configure logging for tests, capturing output through the test writer.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_name() {
        assert_eq!(Some(LogFormat::Json), LogFormat::from_name("json"));
        assert_eq!(Some(LogFormat::HumanReadable), LogFormat::from_name("human"));
        assert_eq!(None, LogFormat::from_name("xml"));
    }

    #[test]
    fn init_twice() {
        init_test();
        init_test();
    }
}
