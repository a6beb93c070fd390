// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Runtime settings
//!
//! Settings come from an optional JSON file and are then overridden by
//! `LABELSCOPE_*` environment variables. Missing keys take the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "LABELSCOPE_";

/// Core settings of the server and the evaluation CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// MongoDB connection string
    pub database_uri: String,
    /// Database holding the `datasets` collection
    pub database_name: String,
    /// JSON catalog fixture; when set, it is served instead of the database
    pub fixture: Option<PathBuf>,
    /// Address the GraphQL server binds to
    pub bind_address: String,
    /// Timezone reported to the app (IANA name or "local"/"utc")
    pub timezone: Option<String>,
    pub do_not_track: bool,
    /// Report a development build regardless of the package version
    pub dev: bool,
    /// Teams submission marker file
    pub teams_path: PathBuf,
    /// Persistent user id file
    pub uid_path: PathBuf,
    /// Settings forwarded to the app
    pub app: AppSettings,
}

/// Display settings exposed through the `config` query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Named colorscale; empty disables the `colorscale` query
    pub colorscale: String,
    pub color_pool: Vec<String>,
    pub grid_zoom: i32,
    pub loop_videos: bool,
    pub notebook_height: i32,
    pub show_confidence: bool,
    pub show_index: bool,
    pub show_label: bool,
    pub show_tooltip: bool,
    pub use_frame_number: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            colorscale: "viridis".to_string(),
            color_pool: [
                "#ee0000", "#ee6600", "#993300", "#996633", "#999900", "#009900", "#003300",
                "#009999", "#000099", "#0066ff", "#6600ff", "#cc33cc", "#777799",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            grid_zoom: 5,
            loop_videos: false,
            notebook_height: 800,
            show_confidence: true,
            show_index: true,
            show_label: true,
            show_tooltip: true,
            use_frame_number: false,
        }
    }
}

/// Per-user state directory (`$HOME/.labelscope`)
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".labelscope")
}

impl Default for Settings {
    fn default() -> Self {
        let home = home_dir();
        Self {
            database_uri: "mongodb://localhost:27017".to_string(),
            database_name: "labelscope".to_string(),
            fixture: None,
            bind_address: "127.0.0.1:5151".to_string(),
            timezone: None,
            do_not_track: false,
            dev: false,
            teams_path: home.join("var").join("teams.json"),
            uid_path: home.join("var").join("uid"),
            app: AppSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if it exists) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!("Settings file {} not found, using defaults", path.display());
                Self::default()
            }
            None => {
                let default_path = home_dir().join("config.json");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_env(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Apply overrides from a variable lookup (keys without the prefix)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_URI") {
            self.database_uri = v;
        }
        if let Some(v) = lookup("DATABASE_NAME") {
            self.database_name = v;
        }
        if let Some(v) = lookup("FIXTURE") {
            self.fixture = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = lookup("TIMEZONE") {
            self.timezone = Some(v);
        }
        if let Some(v) = lookup("DO_NOT_TRACK") {
            self.do_not_track = parse_bool("DO_NOT_TRACK", &v)?;
        }
        if let Some(v) = lookup("DEV") {
            self.dev = parse_bool("DEV", &v)?;
        }
        if let Some(v) = lookup("COLORSCALE") {
            self.app.colorscale = v;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("Invalid boolean for {}{}: {}", ENV_PREFIX, key, other),
    }
}
