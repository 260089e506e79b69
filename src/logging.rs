use std::io::Write;
use std::sync::Once;

use chrono::Local;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Parses a configured level name, falling back to `Info`
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Installs the process logger once. `RUST_LOG` overrides `default_level`.
pub fn setup_logging(default_level: &str) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(parse_level(default_level).to_string());
        let result = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    Local::now().to_rfc3339(),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .try_init();

        match result {
            Ok(()) => log::info!("Logging initialized"),
            Err(e) => eprintln!("Failed to initialize logger: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_parsed_loosely() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level(" WARN "), LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), LevelFilter::Info);
    }
}
