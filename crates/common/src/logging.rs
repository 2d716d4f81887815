//! Logging setup
//!
//! One general log stream (console, optionally a daily file) plus the
//! self-test diagnostic channel. Events emitted with target
//! [`SELF_TEST_TARGET`] go only to the diagnostic channel and never reach
//! the general stream, so gate decisions can be audited on their own.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, FilterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Target of the self-test diagnostic channel
pub const SELF_TEST_TARGET: &str = "canary::selftest";

const GENERAL_LOG_FILE: &str = "canary.log";
const SELF_TEST_LOG_FILE: &str = "self-test.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps background log writers alive; drop it last.
#[must_use]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Console output goes to stderr so it never mixes with machine-readable
/// command output on stdout.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<LogGuard> {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = vec![general_layer(
        std::io::stderr,
        config.json,
        true,
        &config.level,
        verbose,
    )];

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, GENERAL_LOG_FILE));
        guards.push(guard);
        layers.push(general_layer(writer, false, false, &config.level, verbose));

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, SELF_TEST_LOG_FILE));
        guards.push(guard);
        layers.push(diagnostic_layer(writer, false));
    } else {
        layers.push(diagnostic_layer(std::io::stderr, true));
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(LogGuard { _guards: guards })
}

/// General stream: RUST_LOG or the configured level, never the diagnostic target
fn general_layer<W>(writer: W, json: bool, ansi: bool, level: &str, verbose: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let filter = env.and(filter_fn(|meta| meta.target() != SELF_TEST_TARGET));

    if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

/// Diagnostic channel: only the self-test target
fn diagnostic_layer<W>(writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_ansi(ansi)
        .with_writer(writer)
        .with_filter(filter_fn(|meta| meta.target() == SELF_TEST_TARGET))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuf {
        type Writer = SharedBuf;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_self_test_events_stay_on_diagnostic_channel() {
        let general = SharedBuf::default();
        let diagnostic = SharedBuf::default();
        let subscriber = tracing_subscriber::registry().with(vec![
            general_layer(general.clone(), false, false, "info", true),
            diagnostic_layer(diagnostic.clone(), false),
        ]);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "canary::selftest", "Self-test PASS");
            tracing::info!("Running pytest tests/unit");
        });

        let general = general.contents();
        let diagnostic = diagnostic.contents();
        assert!(diagnostic.contains("Self-test PASS"));
        assert!(!diagnostic.contains("Running pytest"));
        assert!(general.contains("Running pytest"));
        assert!(!general.contains("Self-test PASS"));
    }

    #[test]
    fn test_json_general_layer_keeps_target() {
        let general = SharedBuf::default();
        let subscriber = tracing_subscriber::registry()
            .with(vec![general_layer(general.clone(), true, false, "info", true)]);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "canary_runner::engine", "Report missing");
        });

        let line = general.contents();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["target"], "canary_runner::engine");
        assert_eq!(value["fields"]["message"], "Report missing");
    }
}
