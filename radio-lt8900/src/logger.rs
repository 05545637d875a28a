use std::sync::Arc;

/// An injected log sink.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-severity log sinks, each independently optional.
#[derive(Clone, Default)]
pub struct LogConfig {
    pub debug: Option<LogFn>,
    pub info: Option<LogFn>,
    pub error: Option<LogFn>,
}

/// Logging policy resolved once from a [`LogConfig`].
///
/// A severity with no sink of its own borrows the next less severe sink
/// (error falls back to info, info to debug). Severities still unresolved
/// fall through to the `log` crate macros, which are no-ops unless the host
/// installs a logger.
#[derive(Clone, Default)]
pub struct LogPolicy {
    debug: Option<LogFn>,
    info: Option<LogFn>,
    error: Option<LogFn>,
}

impl LogPolicy {
    pub fn resolve(config: &LogConfig) -> Self {
        Self {
            debug: config.debug.clone(),
            info: config.info.clone().or_else(|| config.debug.clone()),
            error: config
                .error
                .clone()
                .or_else(|| config.info.clone())
                .or_else(|| config.debug.clone()),
        }
    }

    pub fn debug(&self, message: &str) {
        match &self.debug {
            Some(sink) => sink(message),
            None => log::debug!(target: "lt8900", "{}", message),
        }
    }

    pub fn info(&self, message: &str) {
        match &self.info {
            Some(sink) => sink(message),
            None => log::info!(target: "lt8900", "{}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match &self.error {
            Some(sink) => sink(message),
            None => log::error!(target: "lt8900", "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture() -> (LogFn, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink: LogFn = Arc::new(move |message: &str| {
            sink_lines.lock().unwrap().push(message.to_string());
        });
        (sink, lines)
    }

    #[test]
    fn test_severity_fallback_chain() {
        let (sink, lines) = capture();
        let policy = LogPolicy::resolve(&LogConfig {
            debug: Some(sink),
            info: None,
            error: None,
        });

        policy.debug("d");
        policy.info("i");
        policy.error("e");

        assert_eq!(*lines.lock().unwrap(), vec!["d", "i", "e"]);
    }

    #[test]
    fn test_error_prefers_its_own_sink() {
        let (info_sink, info_lines) = capture();
        let (error_sink, error_lines) = capture();
        let policy = LogPolicy::resolve(&LogConfig {
            debug: None,
            info: Some(info_sink),
            error: Some(error_sink),
        });

        policy.info("i");
        policy.error("e");

        assert_eq!(*info_lines.lock().unwrap(), vec!["i"]);
        assert_eq!(*error_lines.lock().unwrap(), vec!["e"]);
    }
}
