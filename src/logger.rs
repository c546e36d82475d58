use std::fmt;

/// Severity of an engine log message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

/// Leveled log sink used by the execution loop.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Adapts a plain line formatter into a [`Logger`].
///
/// Each line is prefixed with its level, e.g. `[DEBUG] performing request`.
pub struct FnLogger<F>(pub F);

impl<F> Logger for FnLogger<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        (self.0)(&format!("[{level}] {args}"));
    }
}

/// Forwards engine messages to `tracing` under the `resilient_http` target.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

#[cfg(feature = "tracing")]
impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        match level {
            Level::Error => tracing::error!(target: "resilient_http", "{}", args),
            Level::Warn => tracing::warn!(target: "resilient_http", "{}", args),
            Level::Info => tracing::info!(target: "resilient_http", "{}", args),
            Level::Debug => tracing::debug!(target: "resilient_http", "{}", args),
        }
    }
}
