use tracing_subscriber::EnvFilter;

#[derive(clap::Args, Debug, Clone, Default)]
#[group()]
pub struct LoggingArgs {
    /// Log every object decision, not just progress.
    #[arg(long, short, default_value_t = false, conflicts_with = "quiet", global = true)]
    pub verbose: bool,

    /// Only report errors.
    #[arg(long, short, default_value_t = false, global = true)]
    pub quiet: bool,
}

impl LoggingArgs {
    pub fn init(&self) {
        init_logging(self.verbose, self.quiet);
    }
}

/// The filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "info,deb_s3=debug,apt_repository=debug"
    } else {
        "info"
    }
}

pub fn init_logging(verbose: bool, quiet: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false, false), "info");
        assert_eq!(default_filter(false, true), "error");
        assert!(default_filter(true, false).contains("deb_s3=debug"));
    }
}
