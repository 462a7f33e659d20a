use charge_tracker::config::LoggingConfig;
use charge_tracker::logging::{LogContext, get_logger_with_context, init_logging, parse_log_level};
use tracing::Level;

#[test]
fn parse_log_level_accepts_common_spellings() {
    assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
    assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("Error").unwrap(), Level::ERROR);
    assert!(parse_log_level("verbose").is_err());
}

#[test]
fn console_only_logging_initializes_once() {
    let config = LoggingConfig {
        file: String::new(),
        ..Default::default()
    };
    assert!(init_logging(&config).is_ok());
    assert!(init_logging(&config).is_ok());

    let logger = get_logger_with_context(
        LogContext::new("estimator")
            .with_device("BMW CE-02")
            .with_session_id("abc".to_string()),
    );
    logger.info("Charging started");
    assert_eq!(logger.context().session_id.as_deref(), Some("abc"));
}
