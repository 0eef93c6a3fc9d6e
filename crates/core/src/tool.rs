//! Tool modes and the settings applied to newly drawn shapes

use crate::annotation::{Color, RectStyle};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Active interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Highlight,
    #[serde(alias = "rect")]
    Rectangle,
    Text,
}

/// Cursor affordance shown over the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cursor {
    Pointer,
    Text,
    Crosshair,
}

impl Tool {
    pub fn cursor(self) -> Cursor {
        match self {
            Tool::Select => Cursor::Pointer,
            Tool::Text => Cursor::Text,
            Tool::Highlight | Tool::Rectangle => Cursor::Crosshair,
        }
    }

    /// Tools that create shapes by dragging
    pub fn is_drawing(self) -> bool {
        matches!(self, Tool::Highlight | Tool::Rectangle)
    }

    pub fn name(self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Highlight => "highlight",
            Tool::Rectangle => "rectangle",
            Tool::Text => "text",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Tool::Select),
            "highlight" => Ok(Tool::Highlight),
            "rectangle" | "rect" => Ok(Tool::Rectangle),
            "text" => Ok(Tool::Text),
            other => Err(ValidationError::Malformed(format!("unknown tool `{other}`"))),
        }
    }
}

/// Style applied to shapes created by the drawing tools
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    pub color: Color,
    pub text_color: Color,
    pub opacity: f32,
    pub rect_style: RectStyle,
    pub border_width: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            color: Color::RED,
            text_color: Color::BLACK,
            opacity: 0.3,
            rect_style: RectStyle::Outline,
            border_width: 2.0,
        }
    }
}

/// Current tool plus its settings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolState {
    tool: Tool,
    settings: ToolSettings,
}

impl ToolState {
    pub fn new(settings: ToolSettings) -> Self {
        Self { tool: Tool::Select, settings }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// Switch tools, returning the new cursor when the tool actually changed
    pub fn set_tool(&mut self, tool: Tool) -> Option<Cursor> {
        if self.tool == tool {
            return None;
        }
        tracing::debug!(from = %self.tool, to = %tool, "tool changed");
        self.tool = tool;
        Some(tool.cursor())
    }

    pub fn set_color(&mut self, color: Color) {
        self.settings.color = color;
    }

    pub fn set_text_color(&mut self, color: Color) {
        self.settings.text_color = color;
    }

    pub fn set_opacity(&mut self, opacity: f32) -> Result<(), ValidationError> {
        if !(opacity.is_finite() && (0.0..=1.0).contains(&opacity)) {
            return Err(ValidationError::OpacityOutOfRange(opacity));
        }
        self.settings.opacity = opacity;
        Ok(())
    }

    pub fn set_rect_style(&mut self, style: RectStyle) {
        self.settings.rect_style = style;
    }

    pub fn set_border_width(&mut self, width: f32) -> Result<(), ValidationError> {
        if !width.is_finite() {
            return Err(ValidationError::NonFinite { field: "borderWidth" });
        }
        if width < 0.0 {
            return Err(ValidationError::Negative { field: "borderWidth", value: width });
        }
        self.settings.border_width = width;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_per_tool() {
        assert_eq!(Tool::Select.cursor(), Cursor::Pointer);
        assert_eq!(Tool::Text.cursor(), Cursor::Text);
        assert_eq!(Tool::Highlight.cursor(), Cursor::Crosshair);
        assert_eq!(Tool::Rectangle.cursor(), Cursor::Crosshair);
    }

    #[test]
    fn test_only_shape_tools_draw() {
        assert!(Tool::Highlight.is_drawing());
        assert!(Tool::Rectangle.is_drawing());
        assert!(!Tool::Select.is_drawing());
        assert!(!Tool::Text.is_drawing());
    }

    #[test]
    fn test_style_setters_update_settings() {
        let mut state = ToolState::default();
        state.set_color(Color::YELLOW);
        state.set_text_color(Color::RED);
        state.set_rect_style(RectStyle::Both);

        let settings = state.settings();
        assert_eq!(settings.color, Color::YELLOW);
        assert_eq!(settings.text_color, Color::RED);
        assert_eq!(settings.rect_style, RectStyle::Both);
        assert_eq!(settings.opacity, ToolSettings::default().opacity);
    }

    #[test]
    fn test_parse_accepts_rect_alias() {
        assert_eq!("rect".parse::<Tool>(), Ok(Tool::Rectangle));
        assert_eq!("Highlight".parse::<Tool>(), Ok(Tool::Highlight));
        assert!("lasso".parse::<Tool>().is_err());
    }

    #[test]
    fn test_set_tool_reports_cursor_only_on_change() {
        let mut state = ToolState::default();
        assert_eq!(state.set_tool(Tool::Select), None);
        assert_eq!(state.set_tool(Tool::Text), Some(Cursor::Text));
        assert_eq!(state.tool(), Tool::Text);
    }

    #[test]
    fn test_settings_validation() {
        let mut state = ToolState::default();
        assert!(state.set_opacity(1.2).is_err());
        assert!(state.set_border_width(-1.0).is_err());
        state.set_opacity(0.8).unwrap();
        assert_eq!(state.settings().opacity, 0.8);
    }
}
