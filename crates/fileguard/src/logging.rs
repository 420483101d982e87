use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for both crates at `level`; `RUST_LOG` takes precedence when set.
pub fn filter_directive(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    format!("fileguard={level},file_access_guard={level}")
}

/// Install the global subscriber. Logs go to stderr so stdout stays machine-readable.
pub fn init(level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_directive(level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_covers_both_crates() {
        assert_eq!(
            filter_directive("DEBUG"),
            "fileguard=debug,file_access_guard=debug"
        );
    }
}
