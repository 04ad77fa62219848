use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::components::tools::{DEFAULT_BRUSH_WIDTH, MAX_BRUSH_WIDTH, MIN_BRUSH_WIDTH};
use crate::ops::ai::MAX_SUGGESTIONS;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not read settings '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write settings '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Sketch session settings, stored as a plain `key = value` file.
#[derive(Clone, Debug, PartialEq)]
pub struct SketchSettings {
    /// Initial stroke width in pixels
    pub brush_width: f32,
    /// Quiet period before a finished edit is sent for synthesis
    pub synthesis_debounce_ms: u64,
    /// Quiet period after typing before brushes are requested
    pub suggestion_debounce_ms: u64,
    /// Shorter scene descriptions never request brushes
    pub min_prompt_chars: usize,
    /// Cap on brushes accepted from one suggestion batch
    pub max_suggestions: usize,
    /// Default file name for exported results
    pub export_file_name: String,
    /// Scene description a new session starts with
    pub default_prompt: String,
}

impl Default for SketchSettings {
    fn default() -> Self {
        Self {
            brush_width: DEFAULT_BRUSH_WIDTH,
            synthesis_debounce_ms: 800,
            suggestion_debounce_ms: 1500,
            min_prompt_chars: 4,
            max_suggestions: MAX_SUGGESTIONS,
            export_file_name: "sketch-gen.png".to_string(),
            default_prompt: "A cozy cottage in the woods".to_string(),
        }
    }
}

impl SketchSettings {
    pub fn synthesis_delay(&self) -> Duration {
        Duration::from_millis(self.synthesis_debounce_ms)
    }

    pub fn suggestion_delay(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }

    /// `$XDG_CONFIG_HOME/semsketch/semsketch_settings.cfg` and the platform
    /// equivalents.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        let base = PathBuf::from(
            std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?,
        );
        #[cfg(target_os = "macos")]
        let base = PathBuf::from(std::env::var("HOME").ok()?)
            .join("Library")
            .join("Application Support");
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let base = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
        };
        Some(base.join("semsketch").join("semsketch_settings.cfg"))
    }

    /// Load from the default location; a missing or unreadable file yields defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        match Self::load_from(&path) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.to_config_string()).map_err(write_err)
    }

    /// Parse `key = value` lines. Unknown keys, comments and malformed values
    /// are skipped, leaving the default in place.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "brush_width" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                    {
                        s.brush_width = v.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH);
                    }
                }
                "synthesis_debounce_ms" => {
                    if let Ok(v) = val.parse() {
                        s.synthesis_debounce_ms = v;
                    }
                }
                "suggestion_debounce_ms" => {
                    if let Ok(v) = val.parse() {
                        s.suggestion_debounce_ms = v;
                    }
                }
                "min_prompt_chars" => {
                    if let Ok(v) = val.parse() {
                        s.min_prompt_chars = v;
                    }
                }
                "max_suggestions" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_suggestions = v.min(MAX_SUGGESTIONS);
                    }
                }
                "export_file_name" => {
                    if !val.is_empty() {
                        s.export_file_name = val.to_string();
                    }
                }
                "default_prompt" => {
                    s.default_prompt = val.to_string();
                }
                _ => log::debug!("Ignoring unknown setting '{}'", key),
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "brush_width = {}\n\
             synthesis_debounce_ms = {}\n\
             suggestion_debounce_ms = {}\n\
             min_prompt_chars = {}\n\
             max_suggestions = {}\n\
             export_file_name = {}\n\
             default_prompt = {}\n",
            self.brush_width,
            self.synthesis_debounce_ms,
            self.suggestion_debounce_ms,
            self.min_prompt_chars,
            self.max_suggestions,
            self.export_file_name,
            self.default_prompt,
        )
    }
}
