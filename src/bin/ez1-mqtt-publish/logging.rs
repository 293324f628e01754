use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};

/// Initialises the logger. Verbosity comes from `$LOG_LEVEL` (`INFO` unless set).
pub fn init_logger() {
    Builder::from_env(Env::default().filter_or("LOG_LEVEL", "info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}
