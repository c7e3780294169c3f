// EPUB parsing and text extraction

use crate::error::{ConvertError, Result};
use crate::text::{TextUnit, clean_text};
use html2text::render::text_renderer::TrivialDecorator;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Wide enough that html2text never wraps prose.
const RENDER_WIDTH: usize = 10_000;

/// Elements whose content is never narrated.
const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "svg", "audio", "video", "object", "iframe", "noscript",
];

/// Text content of an EPUB, in reading order
#[derive(Debug)]
pub struct Document {
    pub title: String,
    pub author: Option<String>,
    pub units: Vec<TextUnit>,
}

impl Document {
    /// Total word count across all units (approximate)
    pub fn total_words(&self) -> usize {
        self.units
            .iter()
            .map(|u| u.text.split_whitespace().count())
            .sum()
    }
}

/// Extract narratable text from an EPUB, one unit per spine item with text
pub fn extract(path: &Path) -> Result<Document> {
    let is_epub = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
    if !is_epub {
        return Err(ConvertError::DocumentFormat(format!(
            "{} does not have an .epub extension",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(ConvertError::DocumentFormat(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let mut doc = epub::doc::EpubDoc::new(path).map_err(|e| {
        ConvertError::DocumentFormat(format!("failed to open {}: {}", path.display(), e))
    })?;

    let title = doc
        .mdata("title")
        .map(|m| m.value.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Unknown".to_string());
    let author = doc.mdata("creator").map(|m| m.value.trim().to_string());

    let mut units = Vec::new();
    let spine = doc.spine.clone();

    for spine_item in spine.iter() {
        let Some((content_bytes, mime)) = doc.get_resource(&spine_item.idref) else {
            log::debug!("Spine item '{}' has no resource", spine_item.idref);
            continue;
        };
        if !mime.contains("html") {
            log::debug!("Skipping non-HTML spine item '{}' ({})", spine_item.idref, mime);
            continue;
        }

        let html = String::from_utf8_lossy(&content_bytes);
        let text = html_to_text(&html);
        if text.is_empty() {
            log::debug!("Spine item '{}' has no text", spine_item.idref);
            continue;
        }

        units.push(TextUnit::new(units.len(), extract_title_from_html(&html), text));
    }

    if units.is_empty() {
        return Err(ConvertError::DocumentEmpty);
    }

    Ok(Document {
        title,
        author,
        units,
    })
}

fn skipped_elements_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // No backreferences in `regex`, so each element gets its own branch
        let paired: Vec<String> = SKIPPED_ELEMENTS
            .iter()
            .map(|tag| format!(r"<{tag}\b[^>]*/>|<{tag}\b.*?</{tag}\s*>"))
            .collect();
        let pattern = format!(r"(?is){}|<img\b[^>]*>", paired.join("|"));
        Regex::new(&pattern).expect("valid regex")
    })
}

fn heading_re(level: u8) -> &'static Regex {
    static H1: OnceLock<Regex> = OnceLock::new();
    static H2: OnceLock<Regex> = OnceLock::new();
    let cell = if level == 1 { &H1 } else { &H2 };
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?is)<h{level}\b[^>]*>(.*?)</h{level}\s*>")).expect("valid regex")
    })
}

/// Extract title from HTML content (first h1, else first h2)
fn extract_title_from_html(html: &str) -> Option<String> {
    let body = skipped_elements_re().replace_all(html, "");
    [1, 2].into_iter().find_map(|level| {
        let inner = heading_re(level).captures(&body)?.get(1)?.as_str();
        let title = render(inner)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!title.is_empty()).then_some(title)
    })
}

fn render(html: &str) -> String {
    html2text::from_read_with_decorator(html.as_bytes(), RENDER_WIDTH, TrivialDecorator::new())
}

/// Convert HTML to clean narration text
fn html_to_text(html: &str) -> String {
    let stripped = skipped_elements_re().replace_all(html, "");
    let text = clean_text(&render(&stripped));
    join_wrapped_lines(&text)
}

/// Join lines within a paragraph, keeping blank lines as paragraph breaks
fn join_wrapped_lines(text: &str) -> String {
    let mut result = String::new();
    let mut prev_was_newline = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if !prev_was_newline && !result.is_empty() {
                result.push_str("\n\n");
                prev_was_newline = true;
            }
            continue;
        }

        prev_was_newline = false;

        if !result.is_empty() && !result.ends_with('\n') {
            result.push(' ');
        }

        result.push_str(trimmed);
    }

    result.trim_end().to_string()
}
