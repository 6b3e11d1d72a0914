use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

const CONFIG_DIR_NAME: &str = "PingerClient";
const CONFIG_FILE_NAME: &str = "config.json";

/// Client-side tunables. Everything but the threshold and the log directory
/// is forwarded to the server when a run is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ClientConfig {
    pub stop_pinger_sec: u64,
    pub interval_millisec: u64,
    pub timeout_millisec: u64,
    pub statistics_counts_num: u64,
    pub statistics_interval_sec: u64,
    pub count_rate_threshold: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_log_output_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stop_pinger_sec: 3600 * 4,
            interval_millisec: 1000,
            timeout_millisec: 1000,
            statistics_counts_num: 10,
            statistics_interval_sec: 1,
            count_rate_threshold: 80,
            count_log_output_path: None,
        }
    }
}

impl ClientConfig {
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Builds the effective configuration: defaults, then the config file,
    /// then the inline JSON overlay. Later layers override only the keys
    /// they name.
    pub fn load(config_path: Option<&Path>, overlay_json: &str) -> ClientResult<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let file_path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_config_path().filter(|path| path.exists()),
        };
        if let Some(path) = file_path {
            log::debug!("loading config file {}", path.display());
            let content = fs::read_to_string(&path).map_err(|e| {
                ClientError::config(format!("can not read {}: {e}", path.display()))
            })?;
            merge_layer(&mut merged, &content)?;
        }

        merge_layer(&mut merged, overlay_json)?;

        let config: ClientConfig = serde_json::from_value(merged)
            .map_err(|e| ClientError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        let positive = [
            ("StopPingerSec", self.stop_pinger_sec),
            ("IntervalMillisec", self.interval_millisec),
            ("TimeoutMillisec", self.timeout_millisec),
            ("StatisticsCountsNum", self.statistics_counts_num),
            ("StatisticsIntervalSec", self.statistics_interval_sec),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ClientError::config(format!("{name} must be greater than zero")));
            }
        }
        if self.count_rate_threshold > 100 {
            return Err(ClientError::config(format!(
                "CountRateThreshold must be a percentage (0-100), got {}",
                self.count_rate_threshold
            )));
        }
        Ok(())
    }

    pub fn to_pretty_json(&self) -> ClientResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn merge_layer(merged: &mut Value, content: &str) -> ClientResult<()> {
    let layer: Value =
        serde_json::from_str(content).map_err(|e| ClientError::config(e.to_string()))?;
    let Value::Object(layer) = layer else {
        return Err(ClientError::config("config must be a JSON object"));
    };
    if let Value::Object(base) = merged {
        for (key, value) in layer {
            base.insert(key, value);
        }
    }
    Ok(())
}
