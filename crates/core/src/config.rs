//! Editor configuration
//!
//! Configuration can be loaded from a TOML file, overridden from environment
//! variables, or created programmatically with the `with_*` builders. Every
//! field has a default, so a config file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::Color;
use crate::scene::FontDescriptor;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {0}")]
    InvalidValue(String),
}

/// Current tool styling, shared by every drawing tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub stroke_color: Color,
    pub fill_color: Option<Color>,
    pub stroke_width: f32,
    /// 0.0 to 1.0, also applied to inserted signatures and stamps
    pub opacity: f32,
    pub text_color: Color,
    pub font: FontDescriptor,
    pub note_color: Color,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            stroke_color: Color::rgb(0x3b, 0x82, 0xf6),
            fill_color: None,
            stroke_width: 2.0,
            opacity: 1.0,
            text_color: Color::BLACK,
            font: FontDescriptor::default(),
            note_color: crate::tools::note::NOTE_COLORS[0],
        }
    }
}

/// Configuration for an editor session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo entries kept per page, oldest evicted first
    pub history_capacity: usize,
    pub zoom_min: f32,
    pub zoom_max: f32,
    /// Zoom applied when a document is opened, in percent
    pub default_zoom: f32,
    /// Margin subtracted from the container by fit-to-screen, in pixels
    pub fit_margin: f32,
    pub fit_max_scale: f32,
    pub fit_min_scale: f32,
    /// Pointer slop for hit testing, in points
    pub hit_tolerance: f32,
    pub note_collapse_delay_ms: u64,
    pub image_max_dimension: f32,
    pub signature_default_width: f32,
    pub highlighter_color: Color,
    pub highlighter_width: f32,
    /// Directories scanned for `.ttf`/`.otf` files
    pub font_dirs: Vec<PathBuf>,
    /// Draw "n / total" at the bottom of exported pages
    pub page_labels: bool,
    /// Memory budget of the page raster store
    pub raster_budget_mb: usize,
    pub tools: ToolSettings,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            zoom_min: 25.0,
            zoom_max: 400.0,
            default_zoom: 100.0,
            fit_margin: 60.0,
            fit_max_scale: 2.0,
            fit_min_scale: 0.5,
            hit_tolerance: 4.0,
            note_collapse_delay_ms: 2000,
            image_max_dimension: 300.0,
            signature_default_width: 200.0,
            highlighter_color: Color::rgba(255, 255, 0, 102),
            highlighter_width: 20.0,
            font_dirs: Vec::new(),
            page_labels: false,
            raster_budget_mb: 256,
            tools: ToolSettings::default(),
        }
    }
}

impl EditorConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    pub fn with_default_zoom(mut self, percent: f32) -> Self {
        self.default_zoom = percent;
        self
    }

    pub fn with_note_collapse_delay(mut self, delay: Duration) -> Self {
        self.note_collapse_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_font_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.font_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_page_labels(mut self, enabled: bool) -> Self {
        self.page_labels = enabled;
        self
    }

    pub fn with_tool_settings(mut self, tools: ToolSettings) -> Self {
        self.tools = tools;
        self
    }

    pub fn note_collapse_delay(&self) -> Duration {
        Duration::from_millis(self.note_collapse_delay_ms)
    }

    /// Clamp a zoom percentage into the configured range
    pub fn clamp_zoom(&self, percent: f32) -> f32 {
        percent.clamp(self.zoom_min, self.zoom_max)
    }

    /// Loads configuration from a TOML file.
    ///
    /// ```toml
    /// history_capacity = 100
    /// default_zoom = 150.0
    /// font_dirs = ["/usr/share/fonts/truetype"]
    ///
    /// [tools]
    /// stroke_color = "#ef4444"
    /// stroke_width = 3.0
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = toml::from_str(contents)?;
        config.validate()
    }

    /// Defaults overridden from environment variables.
    ///
    /// - `PDF_ANNOTATOR_HISTORY`: undo capacity per page
    /// - `PDF_ANNOTATOR_ZOOM`: default zoom percentage
    /// - `PDF_ANNOTATOR_FONT_DIR`: extra font directory
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply environment overrides on top of this configuration
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("PDF_ANNOTATOR_HISTORY") {
            self.history_capacity = val
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("PDF_ANNOTATOR_HISTORY".to_string()))?;
        }

        if let Ok(val) = std::env::var("PDF_ANNOTATOR_ZOOM") {
            self.default_zoom = val
                .trim()
                .parse::<f32>()
                .map_err(|_| ConfigError::InvalidValue("PDF_ANNOTATOR_ZOOM".to_string()))?;
        }

        if let Ok(val) = std::env::var("PDF_ANNOTATOR_FONT_DIR") {
            self.font_dirs.push(PathBuf::from(val));
        }

        self.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidValue("history_capacity".to_string()));
        }
        if !(self.zoom_min > 0.0 && self.zoom_min <= self.zoom_max) {
            return Err(ConfigError::InvalidValue("zoom_min".to_string()));
        }
        if !self.default_zoom.is_finite() || self.default_zoom <= 0.0 {
            return Err(ConfigError::InvalidValue("default_zoom".to_string()));
        }
        if !(0.0..=1.0).contains(&self.tools.opacity) {
            return Err(ConfigError::InvalidValue("tools.opacity".to_string()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        std::env::remove_var("PDF_ANNOTATOR_HISTORY");
        std::env::remove_var("PDF_ANNOTATOR_ZOOM");
        std::env::remove_var("PDF_ANNOTATOR_FONT_DIR");
    }

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.zoom_min, 25.0);
        assert_eq!(config.zoom_max, 400.0);
        assert_eq!(config.note_collapse_delay(), Duration::from_secs(2));
        assert_eq!(config.tools.stroke_color.to_hex(), "#3b82f6");
        assert_eq!(config.tools.fill_color, None);
        assert_eq!(config.tools.font.family, "Arial");
        assert_eq!(config.tools.font.size, 16.0);
    }

    #[test]
    fn test_builder() {
        let config = EditorConfig::default()
            .with_history_capacity(0)
            .with_default_zoom(150.0)
            .with_note_collapse_delay(Duration::from_millis(500))
            .with_page_labels(true);

        assert_eq!(config.history_capacity, 1);
        assert_eq!(config.default_zoom, 150.0);
        assert_eq!(config.note_collapse_delay_ms, 500);
        assert!(config.page_labels);
    }

    #[test]
    fn test_clamp_zoom() {
        let config = EditorConfig::default();
        assert_eq!(config.clamp_zoom(10.0), 25.0);
        assert_eq!(config.clamp_zoom(1000.0), 400.0);
        assert_eq!(config.clamp_zoom(120.0), 120.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EditorConfig::from_toml_str(
            r##"
            history_capacity = 10
            page_labels = true

            [tools]
            stroke_color = "#ef4444"
            "##,
        )
        .unwrap();

        assert_eq!(config.history_capacity, 10);
        assert!(config.page_labels);
        assert_eq!(config.tools.stroke_color, Color::rgb(0xef, 0x44, 0x44));
        assert_eq!(config.tools.stroke_width, 2.0);
        assert_eq!(config.zoom_max, 400.0);
    }

    #[test]
    fn test_invalid_toml_values() {
        assert!(matches!(
            EditorConfig::from_toml_str("history_capacity = 0"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            EditorConfig::from_toml_str("history_capacity = \"many\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(EditorConfig::from_toml_str("[tools]\nstroke_color = \"blue-ish\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_zoom = 75.0").unwrap();
        writeln!(file, "hit_tolerance = 8.0").unwrap();

        let config = EditorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_zoom, 75.0);
        assert_eq!(config.hit_tolerance, 8.0);
    }

    #[test]
    fn test_missing_file() {
        let result = EditorConfig::from_file("/nonexistent/pdf-annotator.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("PDF_ANNOTATOR_HISTORY", "20");
        std::env::set_var("PDF_ANNOTATOR_ZOOM", "150");
        std::env::set_var("PDF_ANNOTATOR_FONT_DIR", "/opt/fonts");

        let config = EditorConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.default_zoom, 150.0);
        assert_eq!(config.font_dirs, vec![PathBuf::from("/opt/fonts")]);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        clear_env();
        std::env::set_var("PDF_ANNOTATOR_HISTORY", "lots");

        let result = EditorConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "PDF_ANNOTATOR_HISTORY"));
    }
}
