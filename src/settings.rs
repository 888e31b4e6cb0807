//! Settings persistence using TOML
//!
//! Stores settings in ~/.config/blockbattle/settings.toml (or platform equivalent)

use crate::bot::Weights;
use crate::game::GameConfig;
use crate::battle::SessionConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Lower bound for poll and push intervals
pub const MIN_SYNC_INTERVAL_MS: u64 = 400;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Game settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Keybindings
    pub keys: KeyBindings,
    /// Visual settings
    pub visual: VisualSettings,
    /// Gameplay settings
    pub gameplay: GameplaySettings,
    /// Room server and traffic pacing
    pub network: NetworkSettings,
    pub bot: BotSettings,
}

/// Key bindings (stored as strings for easy editing)
/// Each action can have one or more keys bound to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub move_left: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub move_right: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub soft_drop: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub hard_drop: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub rotate: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub hold: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub ready: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub toggle_bot: Vec<String>,
    #[serde(deserialize_with = "deserialize_keys", serialize_with = "serialize_keys")]
    pub quit: Vec<String>,
}

/// Deserialize keys as either a single string or array of strings
fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct KeysVisitor;

    impl<'de> Visitor<'de> for KeysVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut keys = Vec::new();
            while let Some(key) = seq.next_element::<String>()? {
                keys.push(key);
            }
            Ok(keys)
        }
    }

    deserializer.deserialize_any(KeysVisitor)
}

/// Serialize keys: single key as string, multiple as array
fn serialize_keys<S>(keys: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;

    if let [key] = keys {
        serializer.serialize_str(key)
    } else {
        let mut seq = serializer.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(key)?;
        }
        seq.end()
    }
}

/// Visual settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualSettings {
    /// Ghost piece visibility
    pub show_ghost: bool,
    /// Block style: "solid", "bracket", "round"
    pub block_style: String,
}

/// Gameplay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplaySettings {
    /// Gravity step in milliseconds
    pub fall_interval_ms: u64,
    /// Delayed Auto Shift in milliseconds
    pub das_ms: u64,
    /// Auto Repeat Rate in milliseconds
    pub arr_ms: u64,
    /// Repeat rate of a held soft drop in milliseconds
    pub soft_drop_interval_ms: u64,
    pub countdown_secs: f64,
    /// Seconds between walker drops
    pub walker_spawn_secs: f64,
    pub walkers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Root of the realtime database
    pub base_url: String,
    /// Room name, both players must use the same one
    pub room: String,
    pub poll_interval_ms: u64,
    pub push_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Minutes without writes before a room or slot may be reclaimed
    pub stale_after_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Milliseconds between bot actions
    pub tick_ms: u64,
    pub weights: Weights,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            move_left: vec!["Left".to_string(), "a".to_string()],
            move_right: vec!["Right".to_string(), "d".to_string()],
            soft_drop: vec!["Down".to_string(), "s".to_string()],
            hard_drop: vec!["Space".to_string()],
            rotate: vec!["Up".to_string(), "w".to_string()],
            hold: vec!["c".to_string(), "Shift".to_string()],
            ready: vec!["Enter".to_string(), "r".to_string()],
            toggle_bot: vec!["b".to_string()],
            quit: vec!["q".to_string(), "Esc".to_string()],
        }
    }
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            show_ghost: true,
            block_style: "solid".to_string(),
        }
    }
}

impl Default for GameplaySettings {
    fn default() -> Self {
        Self {
            fall_interval_ms: 800,
            das_ms: 170,
            arr_ms: 50,
            soft_drop_interval_ms: 50,
            countdown_secs: 3.0,
            walker_spawn_secs: 9.0,
            walkers: true,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            room: "arena".to_string(),
            poll_interval_ms: 700,
            push_interval_ms: 500,
            request_timeout_ms: 5000,
            stale_after_minutes: 60,
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            weights: Weights::default(),
        }
    }
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "blockbattle", "blockbattle")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.toml"))
    }

    /// Load settings from `path`, or the default location if None. Writes
    /// the defaults out when no file exists yet.
    pub fn load_or_init(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or(SettingsError::NoConfigDir)?,
        };
        if path.exists() {
            return Ok(Self::load_from(&path));
        }
        let settings = Self::default();
        settings.save_to(&path)?;
        Ok(settings)
    }

    /// Load settings from `path`. A missing or unparsable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(contents: &str) -> Self {
        toml::from_str(contents).unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn game_config(&self) -> GameConfig {
        let defaults = GameplaySettings::default();
        GameConfig {
            fall_interval: Duration::from_millis(self.gameplay.fall_interval_ms),
            walker_spawn_interval: seconds_or(
                self.gameplay.walker_spawn_secs.max(0.1),
                defaults.walker_spawn_secs,
            ),
            walkers_enabled: self.gameplay.walkers,
        }
    }

    /// Room traffic never runs faster than `MIN_SYNC_INTERVAL_MS`
    pub fn session_config(&self) -> SessionConfig {
        let defaults = GameplaySettings::default();
        SessionConfig {
            countdown: seconds_or(self.gameplay.countdown_secs.max(0.0), defaults.countdown_secs),
            poll_interval: Duration::from_millis(self.network.poll_interval_ms.max(MIN_SYNC_INTERVAL_MS)),
            push_interval: Duration::from_millis(self.network.push_interval_ms.max(MIN_SYNC_INTERVAL_MS)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.network.stale_after_minutes.saturating_mul(60))
    }
}

/// Seconds as a Duration, `fallback` when the value is not representable
fn seconds_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

impl VisualSettings {
    /// Get the block characters based on style
    pub fn block_chars(&self) -> (&'static str, &'static str) {
        match self.block_style.as_str() {
            "bracket" => ("[]", ".."),
            "round" => ("()", ".."),
            _ => ("██", "░░"), // "solid" or default
        }
    }
}
