//! Construction of the diagnostic sink owned by each connection.

use crate::config::*;
use crate::error::ConfigError;

use tracing::Dispatch;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_core::LevelFilter;
use tracing_subscriber::{filter::filter_fn, prelude::*, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn build_layer(conf: &LogEntry) -> Result<BoxedLayer, ConfigError> {
    let layer = match &conf.target {
        LogTarget::File { dir, filename } => {
            if filename.as_os_str().is_empty() {
                return Err(ConfigError::MissingLogDestination);
            }
            let prefix = filename.to_string_lossy().into_owned();
            let appender = RollingBuilder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix(prefix)
                .build(dir)
                .map_err(|e| ConfigError::LogDestination(e.to_string(), dir.join(filename)))?;

            tracing_subscriber::fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .boxed()
        }
        LogTarget::Builtin(BuiltinLogTarget::Stdout) => {
            tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed()
        }
        LogTarget::Builtin(BuiltinLogTarget::Stderr) => {
            tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed()
        }
    };

    let level: LevelFilter = conf.level.map(Into::into).unwrap_or(LevelFilter::INFO);
    let modules = conf.modules.clone();

    let filter = filter_fn(move |metadata| {
        metadata.level() <= &level
            && (modules.is_empty()
                || match metadata.module_path() {
                    Some(module) => modules.iter().any(|m| module.starts_with(m)),
                    None => true,
                })
    });

    Ok(layer.with_filter(filter).boxed())
}

/// Build the diagnostic sink for a connection.
///
/// With no log entry configured, diagnostics are discarded.
pub fn build_dispatch(conf: Option<&LogEntry>) -> Result<Dispatch, ConfigError> {
    match conf {
        None => Ok(Dispatch::none()),
        Some(entry) => {
            let layer = build_layer(entry)?;
            Ok(Dispatch::new(tracing_subscriber::registry().with(layer)))
        }
    }
}
