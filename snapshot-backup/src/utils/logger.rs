//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Client crates whose request-level chatter is capped at `warn`.
const NOISY_CRATES: [&str; 4] = ["hyper", "reqwest", "rustls", "object_store"];

/// Directives for `level`: the level applies to this crate and everything
/// else, except the HTTP and object-store clients.
fn directives(level: &str) -> String {
    let level = level.trim();
    let mut directives = vec![level.to_string(), format!("snapshot_backup={}", level)];
    directives.extend(NOISY_CRATES.iter().map(|krate| format!("{}=warn", krate)));
    directives.join(",")
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(directives("info")))
}

/// Initialize logging to stderr. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_quiet_client_crates() {
        assert_eq!(
            directives(" debug "),
            "debug,snapshot_backup=debug,hyper=warn,reqwest=warn,rustls=warn,object_store=warn"
        );
    }

    #[test]
    fn test_directives_parse_as_filter() {
        assert!(EnvFilter::try_new(directives("trace")).is_ok());
    }
}
