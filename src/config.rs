use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "/config/tankmon.yaml";

/// Top-level configuration for the tankmon service.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "AppConfig::default_site")]
    pub site: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub alerts: AlertThresholds,
    #[serde(default)]
    pub sensors: SensorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl AppConfig {
    fn default_site() -> String {
        "local".to_string()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: Self::default_site(),
            http: HttpConfig::default(),
            alerts: AlertThresholds::default(),
            sensors: SensorConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
    /// Allowed CORS origins; `"*"` allows any origin.
    #[serde(default = "HttpConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl HttpConfig {
    fn default_bind() -> String {
        "0.0.0.0:5000".to_string()
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            cors_origins: Self::default_cors_origins(),
        }
    }
}

/// Anomaly thresholds. Levels are percent of capacity, flows are L/min.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "AlertThresholds::default_overflow_level")]
    pub overflow_level: f64,
    #[serde(default = "AlertThresholds::default_high_level")]
    pub high_level: f64,
    #[serde(default = "AlertThresholds::default_low_level")]
    pub low_level: f64,
    #[serde(default = "AlertThresholds::default_critical_level")]
    pub critical_level: f64,
    #[serde(default = "AlertThresholds::default_leakage_flow")]
    pub leakage_flow: f64,
    #[serde(default = "AlertThresholds::default_normal_max_flow")]
    pub normal_max_flow: f64,
    #[serde(default = "AlertThresholds::default_high_flow")]
    pub high_flow: f64,
}

impl AlertThresholds {
    const fn default_overflow_level() -> f64 {
        95.0
    }

    const fn default_high_level() -> f64 {
        85.0
    }

    const fn default_low_level() -> f64 {
        20.0
    }

    const fn default_critical_level() -> f64 {
        10.0
    }

    const fn default_leakage_flow() -> f64 {
        0.5
    }

    const fn default_normal_max_flow() -> f64 {
        15.0
    }

    const fn default_high_flow() -> f64 {
        20.0
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            overflow_level: Self::default_overflow_level(),
            high_level: Self::default_high_level(),
            low_level: Self::default_low_level(),
            critical_level: Self::default_critical_level(),
            leakage_flow: Self::default_leakage_flow(),
            normal_max_flow: Self::default_normal_max_flow(),
            high_flow: Self::default_high_flow(),
        }
    }
}

/// Sensor feed freshness.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "SensorConfig::default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

impl SensorConfig {
    const fn default_stale_after() -> Duration {
        Duration::from_secs(300)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            stale_after: Self::default_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub seed_sample_data: bool,
}

/// Load configuration from a YAML file, falling back to defaults + env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let target_path = if let Some(path) = path {
        path.to_path_buf()
    } else if let Ok(env_path) = env::var("TANKMON_CONFIG") {
        PathBuf::from(env_path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut config = match try_parse_file(&target_path)? {
        Some(cfg) => {
            info!(path = %target_path.display(), "loaded configuration");
            cfg
        }
        None => {
            warn!(path = %target_path.display(), "config file not found; using built-in defaults");
            AppConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    validate_thresholds(&config.alerts)?;
    Ok(config)
}

fn try_parse_file(path: &Path) -> Result<Option<AppConfig>> {
    match fs::read_to_string(path) {
        Ok(raw) => parse_yaml(&raw)
            .with_context(|| format!("failed to parse YAML config at {}", path.display()))
            .map(Some),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    }
}

pub fn parse_yaml(raw: &str) -> Result<AppConfig> {
    Ok(serde_yaml::from_str(raw)?)
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Ok(site) = env::var("TANKMON_SITE") {
        if !site.is_empty() {
            config.site = site;
        }
    }

    if let Ok(bind) = env::var("TANKMON_BIND") {
        if !bind.trim().is_empty() {
            config.http.bind = bind;
        }
    }

    match env::var("TANKMON_SEED_SAMPLE_DATA") {
        Ok(raw) => {
            config.simulation.seed_sample_data = parse_flag(&raw).with_context(|| {
                format!("TANKMON_SEED_SAMPLE_DATA must be true/false, got {raw:?}")
            })?;
        }
        Err(env::VarError::NotPresent) => {}
        Err(err) => return Err(err.into()),
    }

    Ok(())
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("unrecognised flag value"),
    }
}

/// Reject threshold sets whose bands overlap; the detector assumes ordering.
pub fn validate_thresholds(t: &AlertThresholds) -> Result<()> {
    if !(t.critical_level < t.low_level
        && t.low_level < t.high_level
        && t.high_level < t.overflow_level)
    {
        bail!(
            "alert levels must satisfy critical_level < low_level < high_level < overflow_level (got {} / {} / {} / {})",
            t.critical_level,
            t.low_level,
            t.high_level,
            t.overflow_level
        );
    }
    if t.leakage_flow >= t.normal_max_flow / 2.0 {
        bail!(
            "alerts.leakage_flow ({}) must be below half of alerts.normal_max_flow ({})",
            t.leakage_flow,
            t.normal_max_flow
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg = parse_yaml("{}").expect("parse");
        assert_eq!(cfg.site, "local");
        assert_eq!(cfg.http.bind, "0.0.0.0:5000");
        assert_eq!(cfg.http.cors_origins, vec!["*".to_string()]);
        assert_eq!(cfg.alerts.overflow_level, 95.0);
        assert_eq!(cfg.sensors.stale_after, Duration::from_secs(300));
        assert!(!cfg.simulation.seed_sample_data);
    }

    #[test]
    fn yaml_overrides_nested_fields() {
        let cfg = parse_yaml(
            r#"
site: rooftop
http:
  bind: 127.0.0.1:8080
alerts:
  high_flow: 25.0
sensors:
  stale_after: 90s
simulation:
  seed_sample_data: true
"#,
        )
        .expect("parse");
        assert_eq!(cfg.site, "rooftop");
        assert_eq!(cfg.http.bind, "127.0.0.1:8080");
        assert_eq!(cfg.alerts.high_flow, 25.0);
        assert_eq!(cfg.alerts.low_level, 20.0);
        assert_eq!(cfg.sensors.stale_after, Duration::from_secs(90));
        assert!(cfg.simulation.seed_sample_data);
    }

    #[test]
    fn default_thresholds_are_consistent() {
        assert!(validate_thresholds(&AlertThresholds::default()).is_ok());
    }

    #[test]
    fn overlapping_levels_are_rejected() {
        let thresholds = AlertThresholds {
            low_level: 90.0,
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&thresholds).is_err());

        let thresholds = AlertThresholds {
            leakage_flow: 8.0,
            ..AlertThresholds::default()
        };
        assert!(validate_thresholds(&thresholds).is_err());
    }

    #[test]
    fn flag_parsing_accepts_common_spellings() {
        assert!(parse_flag("TRUE").expect("flag"));
        assert!(!parse_flag(" off ").expect("flag"));
        assert!(parse_flag("maybe").is_err());
    }
}
