//! Editor configuration
//!
//! Defaults mirror the stock toolbar. A JSON file may override any subset of
//! fields and `PDF_MARKUP_*` environment variables override both.

use crate::annotation::{Color, RectStyle, TextBackground, TextLayout, TextProperties};
use crate::tool::ToolSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors raised while building an [`EditorConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Defaults pre-filled into the text dialog
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextDefaults {
    pub font_size: f32,
    pub padding: f32,
    pub background_color: TextBackground,
}

impl Default for TextDefaults {
    fn default() -> Self {
        Self { font_size: 16.0, padding: 4.0, background_color: TextBackground::Solid(Color::WHITE) }
    }
}

/// Tunables for an editor instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Pixels per PDF point for page rendering and the overlay
    pub render_scale: f32,
    /// 1-based page shown after load
    pub start_page: u32,
    /// Smallest width and height a drawn shape may have
    pub min_draw_size: f32,
    /// Smallest width and height reachable by resizing
    pub min_resize_size: f32,
    pub resize_handle_size: f32,
    pub tools: ToolSettings,
    pub text: TextDefaults,
    pub text_layout: TextLayout,
    /// How long hosts wait for outstanding saves before exiting
    pub save_timeout_secs: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.5,
            start_page: 1,
            min_draw_size: 10.0,
            min_resize_size: 20.0,
            resize_handle_size: 10.0,
            tools: ToolSettings::default(),
            text: TextDefaults::default(),
            text_layout: TextLayout::default(),
            save_timeout_secs: 30,
        }
    }
}

impl EditorConfig {
    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    pub fn with_start_page(mut self, page: u32) -> Self {
        self.start_page = page;
        self
    }

    pub fn with_tools(mut self, tools: ToolSettings) -> Self {
        self.tools = tools;
        self
    }

    /// Read a JSON config file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    ///
    /// Environment variables:
    /// - `PDF_MARKUP_SCALE`: render scale (default: 1.5)
    /// - `PDF_MARKUP_COLOR`: shape color as `#rrggbb` (default: #ff0000)
    /// - `PDF_MARKUP_OPACITY`: shape opacity in [0, 1] (default: 0.3)
    /// - `PDF_MARKUP_RECT_STYLE`: `outline`, `fill` or `both` (default: outline)
    /// - `PDF_MARKUP_BORDER_WIDTH`: rectangle border width (default: 2)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PDF_MARKUP_SCALE") {
            self.render_scale = parse_value("PDF_MARKUP_SCALE", &value)?;
        }
        if let Some(value) = lookup("PDF_MARKUP_COLOR") {
            self.tools.color = parse_value("PDF_MARKUP_COLOR", &value)?;
        }
        if let Some(value) = lookup("PDF_MARKUP_OPACITY") {
            self.tools.opacity = parse_value("PDF_MARKUP_OPACITY", &value)?;
        }
        if let Some(value) = lookup("PDF_MARKUP_RECT_STYLE") {
            self.tools.rect_style = parse_value::<RectStyle>("PDF_MARKUP_RECT_STYLE", &value)?;
        }
        if let Some(value) = lookup("PDF_MARKUP_BORDER_WIDTH") {
            self.tools.border_width = parse_value("PDF_MARKUP_BORDER_WIDTH", &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the editor cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| ConfigError::InvalidValue { key: key.to_owned(), value };

        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(invalid("renderScale", self.render_scale.to_string()));
        }
        if !(0.0..=1.0).contains(&self.tools.opacity) {
            return Err(invalid("opacity", self.tools.opacity.to_string()));
        }
        for (key, value) in [
            ("minDrawSize", self.min_draw_size),
            ("minResizeSize", self.min_resize_size),
            ("resizeHandleSize", self.resize_handle_size),
            ("borderWidth", self.tools.border_width),
            ("padding", self.text.padding),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(key, value.to_string()));
            }
        }
        if !(self.text.font_size.is_finite() && self.text.font_size > 0.0) {
            return Err(invalid("fontSize", self.text.font_size.to_string()));
        }
        Ok(())
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_secs)
    }

    /// Dialog pre-fill for a new text annotation
    pub fn default_text_properties(&self) -> TextProperties {
        TextProperties {
            text: String::new(),
            font_size: self.text.font_size,
            color: self.tools.text_color,
            background_color: self.text.background_color,
            padding: self.text.padding,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = EditorConfig::default();
        assert_eq!(config.render_scale, 1.5);
        assert_eq!(config.min_draw_size, 10.0);
        assert_eq!(config.min_resize_size, 20.0);
        assert_eq!(config.tools.color, Color::RED);
        assert_eq!(config.tools.opacity, 0.3);
        assert_eq!(config.text.font_size, 16.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply() {
        let config = EditorConfig::default()
            .with_overrides(lookup(&[
                ("PDF_MARKUP_SCALE", "2"),
                ("PDF_MARKUP_COLOR", "#00ff00"),
                ("PDF_MARKUP_RECT_STYLE", "both"),
            ]))
            .unwrap();

        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.tools.color, Color::rgb(0, 255, 0));
        assert_eq!(config.tools.rect_style, RectStyle::Both);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let result = EditorConfig::default().with_overrides(lookup(&[("PDF_MARKUP_OPACITY", "lots")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "PDF_MARKUP_OPACITY"));

        let result = EditorConfig::default().with_overrides(lookup(&[("PDF_MARKUP_OPACITY", "1.5")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.json");
        std::fs::write(&path, r##"{"renderScale": 2.0, "tools": {"color": "#0000ff"}}"##).unwrap();

        let config = EditorConfig::load(&path).unwrap();
        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.tools.color, Color::rgb(0, 0, 255));
        assert_eq!(config.tools.opacity, 0.3);
        assert_eq!(config.min_draw_size, 10.0);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(EditorConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
