use anyhow::Result;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::models::{NutritionPanel, Preview};
use crate::services::nutrition::format_amount;

pub const NO_FOOD_MESSAGE: &str = "No food detected";
pub const TOTALS_HEADING: &str = "Total Nutritional Values";

/// Where the analyze flow shows its results
pub trait ResultView: Send + Sync {
    /// Blocking, user-facing message
    fn alert(&self, message: &str);
    fn show_preview(&self, preview: &Preview);
    /// Replaces whatever the nutrition panel showed before
    fn show_nutrition(&self, panel: &NutritionPanel);
}

/// Plain-text rendering of the panel
pub fn format_panel(panel: &NutritionPanel) -> String {
    let mut out = String::new();

    match panel {
        NutritionPanel::NoFoodDetected => {
            out.push_str(NO_FOOD_MESSAGE);
            out.push('\n');
        }
        NutritionPanel::Items { items, totals } => {
            for item in items {
                let _ = writeln!(out, "🍽️ {} {}(s)", format_amount(item.count), item.name);
                for line in &item.lines {
                    let _ = writeln!(
                        out,
                        "   • {}: {}{}",
                        line.nutrient,
                        format_amount(line.amount),
                        line.unit
                    );
                }
                out.push('\n');
            }

            if !totals.is_empty() {
                let _ = writeln!(out, "📊 {}", TOTALS_HEADING);
                for total in totals {
                    let _ = writeln!(
                        out,
                        "   • {}: {}{}",
                        total.nutrient,
                        format_amount(total.value),
                        total.unit
                    );
                }
            }
        }
    }

    out
}

pub struct TerminalView;

impl ResultView for TerminalView {
    fn alert(&self, message: &str) {
        eprintln!("\n⚠️  {}\n", message);
    }

    fn show_preview(&self, preview: &Preview) {
        match preview {
            Preview::Inline { file_name, data_url } => {
                println!("🖼️  Preview: {} ({} byte data URL)", file_name, data_url.len());
            }
            Preview::LiveCamera { device } => {
                println!("📷 Camera {} is live, taking a photo shortly...", device);
            }
            Preview::Remote { url } => {
                println!("🖼️  Analyzed image: {}", url);
            }
        }
    }

    fn show_nutrition(&self, panel: &NutritionPanel) {
        println!("\n━━━━━━━━━━ Nutrition ━━━━━━━━━━");
        print!("{}", format_panel(panel));
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Default)]
struct PageState {
    preview: Option<Preview>,
    panel: Option<NutritionPanel>,
}

/// Keeps an HTML snapshot of the result page on disk, rewritten after every change
pub struct HtmlView {
    path: PathBuf,
    state: Mutex<PageState>,
}

impl HtmlView {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(PageState::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut PageState)) {
        let html = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            apply(&mut state);
            render_page(&state)
        };

        if let Err(e) = self.write(&html) {
            log::error!("❌ Failed to write HTML snapshot {}: {}", self.path.display(), e);
        }
    }

    fn write(&self, html: &str) -> Result<()> {
        std::fs::write(&self.path, html)?;
        log::debug!("📝 HTML snapshot written to {}", self.path.display());
        Ok(())
    }
}

impl ResultView for HtmlView {
    fn alert(&self, message: &str) {
        log::debug!("Alert not persisted to HTML snapshot: {}", message);
    }

    fn show_preview(&self, preview: &Preview) {
        let preview = preview.clone();
        self.update(|state| state.preview = Some(preview));
    }

    fn show_nutrition(&self, panel: &NutritionPanel) {
        let panel = panel.clone();
        self.update(|state| state.panel = Some(panel));
    }
}

fn render_page(state: &PageState) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Nutrition</title></head>\n<body>\n",
    );

    html.push_str("<div id=\"previewBox\">");
    match &state.preview {
        Some(Preview::Inline { data_url, .. }) => {
            let _ = write!(html, "<img src=\"{}\" class=\"preview-img\">", escape_html(data_url));
        }
        Some(Preview::Remote { url }) => {
            let _ = write!(html, "<img src=\"{}\" class=\"preview-img\">", escape_html(url));
        }
        Some(Preview::LiveCamera { device }) => {
            let _ = write!(html, "<p class=\"live-camera\">Camera {} is live</p>", escape_html(device));
        }
        None => {}
    }
    html.push_str("</div>\n");

    match &state.panel {
        None => html.push_str("<div id=\"nutritionBox\" class=\"hidden\"></div>\n"),
        Some(panel) => {
            html.push_str("<div id=\"nutritionBox\" class=\"show\">\n<div id=\"nutritionContent\">\n");
            match panel {
                NutritionPanel::NoFoodDetected => {
                    let _ = writeln!(
                        html,
                        "<p style=\"text-align:center; color:#666; font-style:italic;\">{}</p>",
                        NO_FOOD_MESSAGE
                    );
                    html.push_str("</div>\n");
                }
                NutritionPanel::Items { items, totals } => {
                    for item in items {
                        let _ = write!(
                            html,
                            "<div class=\"nutrition-item\">\n<strong>{} {}(s)</strong>\n<ul>",
                            format_amount(item.count),
                            escape_html(&item.name)
                        );
                        for line in &item.lines {
                            let _ = write!(
                                html,
                                "<li>{}: {}{}</li>",
                                escape_html(&line.nutrient),
                                format_amount(line.amount),
                                escape_html(&line.unit)
                            );
                        }
                        html.push_str("</ul>\n</div>\n");
                    }
                    html.push_str("</div>\n");

                    if !totals.is_empty() {
                        let _ = write!(
                            html,
                            "<div class=\"nutrition-total\"><h3>{}</h3><ul>",
                            TOTALS_HEADING
                        );
                        for total in totals {
                            let _ = write!(
                                html,
                                "<li><strong>{}</strong>: {}{}</li>",
                                escape_html(&total.nutrient),
                                format_amount(total.value),
                                escape_html(&total.unit)
                            );
                        }
                        html.push_str("</ul></div>\n");
                    }
                }
            }
            html.push_str("</div>\n");
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Sends every update to several views, e.g. the terminal and an HTML snapshot
pub struct FanoutView {
    views: Vec<Arc<dyn ResultView>>,
}

impl FanoutView {
    pub fn new(views: Vec<Arc<dyn ResultView>>) -> Self {
        Self { views }
    }
}

impl ResultView for FanoutView {
    fn alert(&self, message: &str) {
        self.views.iter().for_each(|v| v.alert(message));
    }

    fn show_preview(&self, preview: &Preview) {
        self.views.iter().for_each(|v| v.show_preview(preview));
    }

    fn show_nutrition(&self, panel: &NutritionPanel) {
        self.views.iter().for_each(|v| v.show_nutrition(panel));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NutrientLine, NutrientTotal, RenderedItem};

    fn sample_panel() -> NutritionPanel {
        NutritionPanel::Items {
            items: vec![RenderedItem {
                name: "egg".to_string(),
                count: 2.0,
                lines: vec![NutrientLine {
                    nutrient: "protein".to_string(),
                    amount: 10.0,
                    unit: "g".to_string(),
                }],
            }],
            totals: vec![NutrientTotal {
                nutrient: "protein".to_string(),
                value: 10.0,
                unit: "g".to_string(),
            }],
        }
    }

    #[test]
    fn test_format_panel_items() {
        let text = format_panel(&sample_panel());

        assert!(text.contains("2 egg(s)"));
        assert!(text.contains("protein: 10g"));
        assert!(text.contains(TOTALS_HEADING));
    }

    #[test]
    fn test_format_panel_no_food() {
        assert_eq!(format_panel(&NutritionPanel::NoFoodDetected), "No food detected\n");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"fish & chips\"</b>"), "&lt;b&gt;&quot;fish &amp; chips&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_html_snapshot_follows_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.html");
        let view = HtmlView::new(&path);

        view.show_preview(&Preview::Remote {
            url: "/static/output/a.jpg?t=1".to_string(),
        });
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<img src=\"/static/output/a.jpg?t=1\" class=\"preview-img\">"));
        assert!(html.contains("class=\"hidden\""));

        view.show_nutrition(&sample_panel());
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<strong>2 egg(s)</strong>"));
        assert!(html.contains("<li>protein: 10g</li>"));
        assert!(html.contains("class=\"nutrition-total\""));
        assert!(html.contains("/static/output/a.jpg?t=1"));
    }

    #[test]
    fn test_html_escapes_item_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.html");
        let view = HtmlView::new(&path);

        view.show_nutrition(&NutritionPanel::Items {
            items: vec![RenderedItem {
                name: "<script>".to_string(),
                count: 1.0,
                lines: vec![NutrientLine {
                    nutrient: "Fat".to_string(),
                    amount: 1.0,
                    unit: "g".to_string(),
                }],
            }],
            totals: vec![],
        });

        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("&lt;script&gt;(s)"));
        assert!(!html.contains("<script>"));
        assert!(!html.contains("nutrition-total"));
    }
}
