//! Scripted editing sessions
//!
//! A script is a JSON array of steps replayed against a live [`Editor`].
//! Pointer coordinates are overlay-local: the overlay is placed at the
//! viewport origin and sized to the current page at the render scale.

use anyhow::{bail, Context, Result};
use pdf_engine::OpenDocument;
use pdf_markup_core::{
    Annotation, AnnotationId, Color, Editor, EditorEffect, Key, Notification, PageSource,
    PointerButton, PointerEvent, Rect, RectStyle, TextBackground, TextProperties, Tool,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Step {
    Tool { tool: Tool },
    /// Change the settings used for new shapes; omitted fields are left alone
    Style(StyleStep),
    Down(PointerStep),
    Move(PointerStep),
    Up(PointerStep),
    Key { key: Key },
    /// Confirm the open text dialog; omitted fields keep the dialog's values
    Text(TextStep),
    CancelText,
    Select { id: AnnotationId },
    Delete,
    Page { page: u32 },
    NextPage,
    PreviousPage,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerStep {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub button: PointerButton,
    #[serde(default = "single_click")]
    pub click_count: u32,
}

fn single_click() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStep {
    pub text: String,
    pub font_size: Option<f32>,
    pub color: Option<Color>,
    pub background_color: Option<TextBackground>,
    pub padding: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleStep {
    pub color: Option<Color>,
    pub text_color: Option<Color>,
    pub opacity: Option<f32>,
    pub rect_style: Option<RectStyle>,
    pub border_width: Option<f32>,
}

/// Final editor state after a replay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub current_page: u32,
    pub tool: Tool,
    pub selection: Option<AnnotationId>,
    pub annotations: Vec<Annotation>,
    pub artifact: Option<String>,
    pub notifications: Vec<Notification>,
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse script {}", path.display()))
}

/// Drive `editor` through `steps`, rendering pages from `document`
pub fn replay(editor: &mut Editor, document: &OpenDocument, steps: &[Step]) -> Result<ReplayOutcome> {
    let mut notifications = Vec::new();

    let effects = editor.start();
    collect(editor, document, effects, &mut notifications);

    for (index, step) in steps.iter().enumerate() {
        let effects = apply(editor, document, step).with_context(|| format!("step {} ({step:?}) failed", index + 1))?;
        collect(editor, document, effects, &mut notifications);
    }

    let effects = editor.wait_for_persistence(editor.config().save_timeout());
    collect(editor, document, effects, &mut notifications);

    Ok(ReplayOutcome {
        current_page: editor.current_page(),
        tool: editor.tool(),
        selection: editor.selection().cloned(),
        annotations: editor.store().snapshot(),
        artifact: editor.latest_artifact().map(ToString::to_string),
        notifications,
    })
}

fn apply(editor: &mut Editor, document: &OpenDocument, step: &Step) -> Result<Vec<EditorEffect>> {
    let effects = match step {
        Step::Tool { tool } => editor.set_tool(*tool),
        Step::Style(style) => {
            apply_style(editor, style)?;
            Vec::new()
        }
        Step::Down(pointer) => editor.handle_pointer_down(&pointer_event(editor, document, pointer)?),
        Step::Move(pointer) => editor.handle_pointer_move(&pointer_event(editor, document, pointer)?),
        Step::Up(pointer) => editor.handle_pointer_up(&pointer_event(editor, document, pointer)?),
        Step::Key { key } => editor.handle_key(key),
        Step::Text(text) => {
            let Some(dialog) = editor.pending_dialog() else {
                bail!("no text dialog is open");
            };
            let initial = dialog.initial.clone();
            editor.confirm_text(Some(TextProperties {
                text: text.text.clone(),
                font_size: text.font_size.unwrap_or(initial.font_size),
                color: text.color.unwrap_or(initial.color),
                background_color: text.background_color.unwrap_or(initial.background_color),
                padding: text.padding.unwrap_or(initial.padding),
            }))?
        }
        Step::CancelText => editor.cancel_text()?,
        Step::Select { id } => editor.select(id)?,
        Step::Delete => editor.delete_selected()?,
        Step::Page { page } => editor.go_to_page(*page)?,
        Step::NextPage => editor.next_page()?,
        Step::PreviousPage => editor.previous_page()?,
        Step::Save => {
            editor.save().context("save needs --out-dir or --endpoint")?;
            Vec::new()
        }
    };
    Ok(effects)
}

fn apply_style(editor: &mut Editor, style: &StyleStep) -> Result<()> {
    let tools = editor.tool_state_mut();
    if let Some(color) = style.color {
        tools.set_color(color);
    }
    if let Some(color) = style.text_color {
        tools.set_text_color(color);
    }
    if let Some(rect_style) = style.rect_style {
        tools.set_rect_style(rect_style);
    }
    if let Some(opacity) = style.opacity {
        tools.set_opacity(opacity)?;
    }
    if let Some(width) = style.border_width {
        tools.set_border_width(width)?;
    }
    Ok(())
}

fn pointer_event(editor: &Editor, document: &OpenDocument, pointer: &PointerStep) -> Result<PointerEvent> {
    let size = document.page_size(editor.current_page())?;
    let (width, height) = size.scaled(editor.config().render_scale);

    Ok(PointerEvent::new(pointer.x, pointer.y, Rect::new(0.0, 0.0, width, height))
        .with_button(pointer.button)
        .with_click_count(pointer.click_count))
}

fn collect(
    editor: &mut Editor,
    document: &OpenDocument,
    effects: Vec<EditorEffect>,
    notifications: &mut Vec<Notification>,
) {
    let mut needs_render = false;
    for effect in effects {
        match effect {
            EditorEffect::RenderPage(_) => needs_render = true,
            EditorEffect::Notify(notification) => notifications.push(notification),
            EditorEffect::Redraw | EditorEffect::OpenTextDialog(_) | EditorEffect::CursorChanged(_) => {}
        }
    }

    if needs_render {
        let rendered = editor.run_renders(document);
        collect(editor, document, rendered, notifications);
    }

    notifications.extend(editor.poll_persistence().into_iter().filter_map(|effect| match effect {
        EditorEffect::Notify(notification) => Some(notification),
        _ => None,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tagged_steps() {
        let steps: Vec<Step> = serde_json::from_str(
            r##"[
                {"action": "tool", "tool": "rect"},
                {"action": "style", "color": "#0000ff", "rectStyle": "both"},
                {"action": "down", "x": 10, "y": 20},
                {"action": "up", "x": 60, "y": 70, "button": "secondary"},
                {"action": "key", "key": "escape"},
                {"action": "key", "key": "F5"},
                {"action": "text", "text": "note", "fontSize": 12},
                {"action": "nextPage"},
                {"action": "save"}
            ]"##,
        )
        .expect("script should parse");

        assert_eq!(steps[0], Step::Tool { tool: Tool::Rectangle });
        assert_eq!(
            steps[1],
            Step::Style(StyleStep {
                color: Some(Color::rgb(0, 0, 255)),
                rect_style: Some(RectStyle::Both),
                ..StyleStep::default()
            })
        );
        assert_eq!(
            steps[3],
            Step::Up(PointerStep { x: 60.0, y: 70.0, button: PointerButton::Secondary, click_count: 1 })
        );
        assert_eq!(steps[4], Step::Key { key: Key::Escape });
        assert_eq!(steps[5], Step::Key { key: Key::Other("F5".to_owned()) });
        assert!(matches!(&steps[6], Step::Text(TextStep { font_size: Some(size), .. }) if *size == 12.0));
        assert_eq!(steps[8], Step::Save);
    }

    #[test]
    fn test_rejects_unknown_action() {
        let result: Result<Vec<Step>, _> = serde_json::from_str(r#"[{"action": "lasso"}]"#);
        assert!(result.is_err());
    }
}
