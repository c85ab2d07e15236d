use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MC_LOG";

/// Installs the stderr subscriber. `MC_LOG` wins over the flags.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "mcompare=debug,tower_http=debug,warn"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::default_directive;

    #[test]
    fn quiet_beats_verbose() {
        assert_eq!(default_directive(true, true), "error");
        assert_eq!(default_directive(false, false), "warn");
        assert!(default_directive(true, false).contains("mcompare=debug"));
    }
}
