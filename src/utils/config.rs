use ini::Ini;
use log::warn;
use serde::Serialize;

use crate::utils::constants::{LIVENESS_TIMEOUT_MILLIS, SLIST_SIZE, STABILIZE_SLEEP_MILLIS};

/// Runtime configuration, loaded from an optional ini file. Anything not
/// present in the file keeps its default from `constants`.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// successor list length R
    pub slist_size: usize,
    /// maintenance tick period
    pub stabilize_interval_millis: u64,
    /// how long the liveness probe waits before declaring a peer dead
    pub liveness_timeout_millis: u64,
    /// enables debugging RPCs such as the node summary
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slist_size: SLIST_SIZE,
            stabilize_interval_millis: STABILIZE_SLEEP_MILLIS,
            liveness_timeout_millis: LIVENESS_TIMEOUT_MILLIS,
            dev_mode: false,
        }
    }
}

impl Config {
    pub fn load(path_option: Option<&str>) -> Result<Config, ini::Error> {
        let mut config = Config::default();
        let path = match path_option {
            Some(path) => path,
            None => return Ok(config),
        };
        let file = Ini::load_from_file(path)?;
        if let Some(section) = file.section(Some("node")) {
            if let Some(value) = section.get("slist_size") {
                config.slist_size = parse_or(value, config.slist_size, "slist_size");
            }
            if let Some(value) = section.get("stabilize_interval_millis") {
                config.stabilize_interval_millis =
                    parse_or(value, config.stabilize_interval_millis, "stabilize_interval_millis");
            }
            if let Some(value) = section.get("liveness_timeout_millis") {
                config.liveness_timeout_millis =
                    parse_or(value, config.liveness_timeout_millis, "liveness_timeout_millis");
            }
            if let Some(value) = section.get("dev_mode") {
                config.dev_mode = parse_or(value, config.dev_mode, "dev_mode");
            }
        }
        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr + Copy>(value: &str, default: T, key: &str) -> T {
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("ignoring unparsable config value {}={}", key, value);
            default
        }
    }
}
