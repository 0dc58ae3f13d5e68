use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` for
/// this crate when `verbose` is on.
pub fn init(verbose: bool) {
    tracing_subscriber::registry()
        .with(filter(verbose, std::env::var("RUST_LOG").ok()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn filter(verbose: bool, rust_log: Option<String>) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
        eprintln!("Warning: ignoring invalid RUST_LOG value: {directives}");
    }
    if verbose {
        EnvFilter::new("info,pentest_jobs=debug,tower_http=debug")
    } else {
        EnvFilter::new("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_verbose_filters() {
        assert_eq!(filter(false, None).to_string(), "info");
        assert!(filter(true, None).to_string().contains("pentest_jobs=debug"));
    }

    #[test]
    fn rust_log_takes_precedence() {
        assert_eq!(filter(true, Some("warn".into())).to_string(), "warn");
    }

    #[test]
    fn invalid_rust_log_falls_back() {
        assert_eq!(filter(false, Some("pentest_jobs=loudest".into())).to_string(), "info");
    }
}
