use std::path::PathBuf;

use tracing::warn;
use tracing_subscriber::EnvFilter;

const LIVELAB_TELEOP_CONFIG_ENV_NAME: &str = "LIVELAB_TELEOP_CONFIG_PATH";
const DEFAULT_LOG_FILTER: &str = "livelab=info";

/// Get teleop config from input or env LIVELAB_TELEOP_CONFIG_PATH
pub fn get_teleop_config_path(config: Option<PathBuf>) -> Option<PathBuf> {
    if config.is_some() {
        config
    } else {
        std::env::var(LIVELAB_TELEOP_CONFIG_ENV_NAME)
            .map(|s| {
                warn!("### ENV VAR {} is used ###", s);
                PathBuf::from(s)
            })
            .ok()
    }
}

/// Installs the global tracing subscriber, filtered by `RUST_LOG`.
///
/// Targets match by prefix, so the default filter covers every livelab crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_teleop_config_path() {
        let path = get_teleop_config_path(Some(PathBuf::from("a.toml")));
        assert_eq!(path.unwrap(), PathBuf::from("a.toml"));

        std::env::set_var(LIVELAB_TELEOP_CONFIG_ENV_NAME, "b.toml");
        let path = get_teleop_config_path(Some(PathBuf::from("a.toml")));
        assert_eq!(path.unwrap(), PathBuf::from("a.toml"));
        let path = get_teleop_config_path(None);
        assert_eq!(path.unwrap(), PathBuf::from("b.toml"));
        std::env::remove_var(LIVELAB_TELEOP_CONFIG_ENV_NAME);

        assert!(get_teleop_config_path(None).is_none());
    }

    #[test]
    fn test_default_log_filter() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
