use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::color::{ColorPolicy, Palette};
use crate::stations::{StationError, StationRegistry};

pub const DEFAULT_API_SERVICE_BASE: &str = "https://api.checkwx.com";
pub const DEFAULT_PIXEL_COUNT: usize = 50;
pub const DEFAULT_INACTIVE_MINUTES: u32 = 90;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Station error: {0}")]
    Stations(#[from] StationError),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every field is optional so files and CLI
/// flags layer over each other; accessors supply the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub weather: Option<WeatherConfig>,
    pub pixel_count: Option<usize>,
    /// ICAO code -> pixel index
    pub airports: Option<BTreeMap<String, usize>>,
    pub visualizer: Option<usize>,
    pub brightness: Option<f64>,       // 0.0-1.0
    pub metar_station_inactive_minutes: Option<u32>,
    pub palette: Option<Palette>,
    pub policy: Option<ColorPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeatherConfig {
    pub api_service_base: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub cache_ttl_minutes: Option<i64>,
    pub metar_lifespan_minutes: Option<i64>,
    pub rate_limit_secs: Option<i64>,
}

impl WeatherConfig {
    pub fn api_service_base(&self) -> &str {
        self.api_service_base.as_deref().unwrap_or(DEFAULT_API_SERVICE_BASE)
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(15))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(5 * 60))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_ttl_minutes.unwrap_or(crate::weather::cache::DEFAULT_CACHE_TTL_MINUTES))
    }

    pub fn metar_lifespan(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.metar_lifespan_minutes.unwrap_or(crate::weather::service::DEFAULT_METAR_LIFESPAN_MINUTES),
        )
    }

    pub fn rate_limit(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rate_limit_secs.unwrap_or(crate::weather::cache::DEFAULT_RATE_LIMIT_SECS))
    }
}

impl Config {
    pub fn weather(&self) -> WeatherConfig {
        self.weather.clone().unwrap_or_default()
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count.unwrap_or(DEFAULT_PIXEL_COUNT)
    }

    pub fn airport_configs(&self) -> BTreeMap<String, usize> {
        self.airports.clone().unwrap_or_default()
    }

    pub fn visualizer_index(&self) -> usize {
        self.visualizer.unwrap_or(0)
    }

    pub fn brightness_proportion(&self) -> f64 {
        self.brightness.unwrap_or(1.0)
    }

    pub fn metar_station_inactive_minutes(&self) -> u32 {
        self.metar_station_inactive_minutes.unwrap_or(DEFAULT_INACTIVE_MINUTES)
    }

    pub fn palette(&self) -> Palette {
        self.palette.clone().unwrap_or_default()
    }

    pub fn policy(&self) -> ColorPolicy {
        self.policy.clone().unwrap_or_default()
    }

    pub fn station_registry(&self) -> Result<StationRegistry, ConfigError> {
        Ok(StationRegistry::with_pixel_count(&self.airport_configs(), self.pixel_count())?)
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            visualizer_index: self.visualizer_index(),
            brightness: self.brightness_proportion(),
            inactive_minutes: self.metar_station_inactive_minutes(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "MetarLights", version, about = "METAR sectional map lights", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable debug log level
    #[arg(long, short = 'v', alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub pixel_count: Option<usize>,
    #[arg(long)]
    pub visualizer: Option<usize>,
    #[arg(long)]
    pub brightness: Option<f64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Explicit `--config` path, or the first file found on the search path.
pub fn resolve_path(cli: &Cli) -> Result<Option<PathBuf>, ConfigError> {
    match cli.config.as_ref() {
        Some(p) if p.exists() => Ok(Some(p.clone())),
        Some(p) => Err(ConfigError::Validation(format!(
            "Config file not found: {}",
            p.display()
        ))),
        None => Ok(find_config_file()),
    }
}

/// Public entry point: read YAML, merge CLI, validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = resolve_path(cli)? {
        debug!("Reading config from {}", p.display());
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/metarlights/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/metarlights/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/metarlights.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["metarlights.yaml", "config.yaml", "config/metarlights.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

pub fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()      { dst.log_level = src.log_level; }
    if src.pixel_count.is_some()    { dst.pixel_count = src.pixel_count; }
    if src.airports.is_some()       { dst.airports = src.airports; }
    if src.visualizer.is_some()     { dst.visualizer = src.visualizer; }
    if src.brightness.is_some()     { dst.brightness = src.brightness; }
    if src.metar_station_inactive_minutes.is_some() {
        dst.metar_station_inactive_minutes = src.metar_station_inactive_minutes;
    }
    if src.palette.is_some()        { dst.palette = src.palette; }
    if src.policy.is_some()         { dst.policy = src.policy; }
    // weather
    match (&mut dst.weather, src.weather) {
        (None, Some(w)) => dst.weather = Some(w),
        (Some(d), Some(s)) => merge_weather(d, s),
        _ => {}
    }
}

fn merge_weather(dst: &mut WeatherConfig, src: WeatherConfig) {
    if src.api_service_base.is_some()     { dst.api_service_base = src.api_service_base; }
    if src.api_key.is_some()              { dst.api_key = src.api_key; }
    if src.request_timeout_secs.is_some() { dst.request_timeout_secs = src.request_timeout_secs; }
    if src.poll_interval_secs.is_some()   { dst.poll_interval_secs = src.poll_interval_secs; }
    if src.cache_ttl_minutes.is_some()    { dst.cache_ttl_minutes = src.cache_ttl_minutes; }
    if src.metar_lifespan_minutes.is_some() { dst.metar_lifespan_minutes = src.metar_lifespan_minutes; }
    if src.rate_limit_secs.is_some()      { dst.rate_limit_secs = src.rate_limit_secs; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()   { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                 { cfg.log_level = Some("debug".into()); }
    if cli.pixel_count.is_some() { cfg.pixel_count = cli.pixel_count; }
    if cli.visualizer.is_some()  { cfg.visualizer = cli.visualizer; }
    if cli.brightness.is_some()  { cfg.brightness = cli.brightness; }
    if cli.api_key.is_some() {
        cfg.weather.get_or_insert_with(WeatherConfig::default).api_key = cli.api_key.clone();
    }
}

fn validate_brightness(brightness: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&brightness) {
        return Err(ConfigError::Validation("brightness must be 0.0..=1.0".into()));
    }
    Ok(())
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    validate_brightness(cfg.brightness_proportion())?;
    if cfg.pixel_count() == 0 {
        return Err(ConfigError::Validation("pixel_count must be > 0".into()));
    }
    let registry = cfg.station_registry()?;
    if !registry.is_empty() && cfg.weather().api_key().trim().is_empty() {
        return Err(ConfigError::Validation("weather.api_key is required when airports are configured".into()));
    }
    let weather = cfg.weather();
    if weather.cache_ttl() <= chrono::Duration::zero() || weather.rate_limit() < chrono::Duration::zero() {
        return Err(ConfigError::Validation("cache_ttl_minutes must be > 0 and rate_limit_secs >= 0".into()));
    }
    Ok(())
}

/// Values the render loop reads every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeSettings {
    pub visualizer_index: usize,
    pub brightness: f64,
    pub inactive_minutes: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Config::default().runtime_settings()
    }
}

/// Publisher side of the runtime settings. Readers take one snapshot per
/// tick from a `watch::Receiver`, so a tick never sees half an update.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<RuntimeSettings>,
}

impl SettingsHandle {
    pub fn new(initial: RuntimeSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<RuntimeSettings> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> RuntimeSettings {
        *self.tx.borrow()
    }

    /// Returns true when the value actually changed.
    pub fn publish(&self, settings: RuntimeSettings) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == settings {
                false
            } else {
                *current = settings;
                true
            }
        })
    }

    pub fn set_visualizer(&self, index: usize) -> bool {
        self.publish(RuntimeSettings { visualizer_index: index, ..self.current() })
    }

    pub fn set_brightness(&self, brightness: f64) -> Result<bool, ConfigError> {
        validate_brightness(brightness)?;
        Ok(self.publish(RuntimeSettings { brightness, ..self.current() }))
    }
}

/// Runtime values from a freshly read file, keeping the current value for
/// anything the file leaves out.
fn reloaded_settings(file: &Config, current: RuntimeSettings) -> Result<RuntimeSettings, ConfigError> {
    let settings = RuntimeSettings {
        visualizer_index: file.visualizer.unwrap_or(current.visualizer_index),
        brightness: file.brightness.unwrap_or(current.brightness),
        inactive_minutes: file.metar_station_inactive_minutes.unwrap_or(current.inactive_minutes),
    };
    validate_brightness(settings.brightness)?;
    Ok(settings)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Watches the config file and republishes the runtime values whenever its
/// modification time changes.
pub struct ConfigWatcher {
    stop_sender: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    pub fn start(path: PathBuf, settings: SettingsHandle, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut last_modified = modified(&path);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let now_modified = modified(&path);
                        if now_modified == last_modified {
                            continue;
                        }
                        last_modified = now_modified;
                        match read_yaml(&path).and_then(|cfg| reloaded_settings(&cfg, settings.current())) {
                            Ok(new) => {
                                if settings.publish(new) {
                                    info!("Runtime settings reloaded from {}: {:?}", path.display(), new);
                                }
                            }
                            Err(e) => warn!("Ignoring config change in {}: {}", path.display(), e),
                        }
                    }
                    _ = stop_rx.recv() => {
                        info!("Config watcher received stop signal. Exiting.");
                        break;
                    }
                }
            }
        });

        Self { stop_sender: Some(stop_tx), handle: Some(handle) }
    }

    pub async fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            if let Err(e) = sender.send(()).await {
                error!("Failed to send stop signal to config watcher: {}", e);
            }
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap_or_else(|e| error!("Config watcher failed to join: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log_level: debug
weather:
  api_key: abc123
  poll_interval_secs: 120
pixel_count: 10
airports:
  KDWH: 0
  kiah: 4
visualizer: 1
brightness: 0.5
policy:
  lightning: false
  precipitation: blend
"#;

    #[test]
    fn test_parse_and_accessors() {
        let cfg = parse_yaml(SAMPLE).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.weather().api_key(), "abc123");
        assert_eq!(cfg.weather().poll_interval(), Duration::from_secs(120));
        assert_eq!(cfg.weather().api_service_base(), DEFAULT_API_SERVICE_BASE);
        assert_eq!(cfg.visualizer_index(), 1);
        assert_eq!(cfg.brightness_proportion(), 0.5);
        assert_eq!(cfg.metar_station_inactive_minutes(), DEFAULT_INACTIVE_MINUTES);
        assert!(!cfg.policy().lightning);
        assert_eq!(cfg.station_registry().unwrap().pixel_for("KIAH"), Some(4));
    }

    #[test]
    fn test_cli_overrides_yaml() {
        let mut cfg = parse_yaml(SAMPLE).unwrap();
        let cli = Cli { brightness: Some(0.25), api_key: Some("xyz".into()), ..Default::default() };
        apply_cli_overrides(&mut cfg, &cli);
        assert_eq!(cfg.brightness_proportion(), 0.25);
        assert_eq!(cfg.weather().api_key(), "xyz");
        assert_eq!(cfg.weather().poll_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut dst = parse_yaml(SAMPLE).unwrap();
        merge(&mut dst, parse_yaml("weather:\n  request_timeout_secs: 3\n").unwrap());
        assert_eq!(dst.weather().api_key(), "abc123");
        assert_eq!(dst.weather().request_timeout(), Duration::from_secs(3));
        assert_eq!(dst.pixel_count(), 10);
    }

    #[test]
    fn test_validation_failures() {
        let cfg = parse_yaml("brightness: 1.5\n").unwrap();
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation(_))));

        let cfg = parse_yaml("pixel_count: 2\nweather:\n  api_key: k\nairports:\n  KDWH: 2\n").unwrap();
        assert!(matches!(validate(&cfg), Err(ConfigError::Stations(StationError::PixelOutOfRange { .. }))));

        let cfg = parse_yaml("airports:\n  KDWH: 0\n").unwrap();
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_settings_handle_publishes_snapshots() {
        let handle = SettingsHandle::new(RuntimeSettings::default());
        let mut rx = handle.subscribe();

        assert!(handle.set_visualizer(2));
        assert!(!handle.set_visualizer(2));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().visualizer_index, 2);

        assert!(handle.set_brightness(1.2).is_err());
        assert_eq!(handle.current().brightness, 1.0);
    }

    #[test]
    fn test_reloaded_settings_keep_missing_values() {
        let current = RuntimeSettings { visualizer_index: 2, brightness: 0.4, inactive_minutes: 30 };
        let file = parse_yaml("brightness: 0.8\n").unwrap();
        let new = reloaded_settings(&file, current).unwrap();
        assert_eq!(new, RuntimeSettings { visualizer_index: 2, brightness: 0.8, inactive_minutes: 30 });
    }

    #[tokio::test]
    async fn test_watcher_republishes_on_change() {
        let path = std::env::temp_dir().join(format!("metarlights-watch-{}.yaml", std::process::id()));
        fs::write(&path, "visualizer: 0\n").unwrap();

        let handle = SettingsHandle::new(RuntimeSettings::default());
        let mut rx = handle.subscribe();
        let mut watcher = ConfigWatcher::start(path.clone(), handle.clone(), Duration::from_millis(20));

        // mtime granularity can be coarse, make sure the write lands later
        tokio::time::sleep(Duration::from_millis(1100)).await;
        fs::write(&path, "visualizer: 2\nbrightness: 0.3\n").unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed()).await.unwrap().unwrap();
        assert_eq!(rx.borrow().visualizer_index, 2);
        assert_eq!(rx.borrow().brightness, 0.3);

        watcher.stop().await;
        let _ = fs::remove_file(&path);
    }
}
