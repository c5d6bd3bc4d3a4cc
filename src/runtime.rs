use evlog::{LogEventConsolePrinter, Logger};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

fn console_logger() -> Logger {
    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    logger
}

/// Installs the process-wide logger. Only the first call takes effect.
pub fn set_logger(logger: Logger) {
    if LOGGER.set(logger).is_err() {
        get_logger().debug("Logger already installed; ignoring replacement.", None);
    }
}

/// Falls back to a console logger when nothing was installed, as in unit tests.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(console_logger)
}
