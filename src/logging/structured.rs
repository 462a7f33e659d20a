use std::collections::BTreeMap;
use tracing::{debug, error, info, trace, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "estimator", "persistence", "scheduler")
    pub component: String,
    /// Tracked device name
    pub device: Option<String>,
    /// Charging session ID
    pub session_id: Option<String>,
    /// Additional context fields
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            device: None,
            session_id: None,
            extra_fields: BTreeMap::new(),
        }
    }

    /// Set device name
    pub fn with_device(mut self, device: &str) -> Self {
        self.device = Some(device.to_string());
        self
    }

    /// Set session ID
    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    /// Create a new structured logger with context
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Same logger, bound to a charging session (or unbound with `None`)
    pub fn for_session(&self, session_id: Option<&str>) -> Self {
        let mut context = self.context.clone();
        context.session_id = session_id.map(str::to_string);
        Self { context }
    }

    /// Log an info message with context
    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }
    /// Log a warning message with context
    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }
    /// Log an error message with context
    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }
    /// Log a debug message with context
    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }
    /// Log a trace message with context
    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    /// Format context fields for logging
    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(ref device) = self.context.device {
            fields.push(format!("device={}", device));
        }
        if let Some(ref session_id) = self.context.session_id {
            fields.push(format!("session_id={}", session_id));
        }
        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{}={}", key, value));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let context = LogContext::new("test")
            .with_device("BMW CE-02")
            .with_session_id("session_123".to_string())
            .with_field("key", "value".to_string());

        assert_eq!(context.component, "test");
        assert_eq!(context.device.as_deref(), Some("BMW CE-02"));
        assert_eq!(context.session_id, Some("session_123".to_string()));
        assert_eq!(context.extra_fields.get("key"), Some(&"value".to_string()));
    }

    #[test]
    fn test_format_fields_order() {
        let logger = get_logger_with_context(
            LogContext::new("estimator")
                .with_device("CE-02")
                .with_field("mode", "fixed".to_string()),
        );
        assert_eq!(
            logger.format_fields(),
            "component=estimator,device=CE-02,mode=fixed"
        );

        let bound = logger.for_session(Some("abc"));
        assert_eq!(
            bound.format_fields(),
            "component=estimator,device=CE-02,session_id=abc,mode=fixed"
        );
        assert!(bound.for_session(None).context().session_id.is_none());
    }
}
