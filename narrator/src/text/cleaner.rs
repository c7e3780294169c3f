//! Text cleanup so extracted prose reads well when spoken.

use regex::Regex;
use std::sync::OnceLock;

/// Plain-text stand-in for characters that synthesizers mispronounce or choke on.
///
/// `None` keeps the character as is.
fn plain_form(c: char) -> Option<&'static str> {
    let plain = match c {
        '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => "'",
        '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{00ab}' | '\u{00bb}' => "\"",
        '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => "-",
        '\u{2026}' => "...",
        '\u{00a0}' | '\u{2009}' | '\u{202f}' => " ",
        '\u{200b}'..='\u{200d}' | '\u{00ad}' | '\u{feff}' => "",
        '\u{fb00}' => "ff",
        '\u{fb01}' => "fi",
        '\u{fb02}' => "fl",
        '\u{fb03}' => "ffi",
        '\u{fb04}' => "ffl",
        '\n' | '\t' => return None,
        c if c.is_control() => "",
        _ => return None,
    };
    Some(plain)
}

fn missing_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([.!?]["')\]]?)([A-Z])"#).expect("valid regex"))
}

/// Clean extracted text for narration.
///
/// Typographic quotes, dashes and ligatures become plain ASCII; control and
/// zero-width characters disappear. Lines holding only a page number are
/// dropped, whitespace inside a line collapses to single spaces and blank
/// lines collapse to one paragraph break. Finally `end.Next` gets its
/// missing space.
pub fn clean_text(text: &str) -> String {
    let plain: String = text
        .chars()
        .fold(String::with_capacity(text.len()), |mut out, c| {
            match plain_form(c) {
                Some(replacement) => out.push_str(replacement),
                None => out.push(c),
            }
            out
        });

    let tidy = tidy_lines(&plain);
    missing_space_re().replace_all(&tidy, "$1 $2").into_owned()
}

fn is_page_number(words: &[&str]) -> bool {
    matches!(words, [word] if word.chars().all(|c| c.is_ascii_digit()))
}

/// Rebuild the text line by line: single spaces inside lines, at most one
/// blank line between paragraphs, no page-number lines.
fn tidy_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut paragraph_break = false;

    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            paragraph_break = !out.is_empty();
            continue;
        }
        if is_page_number(&words) {
            continue;
        }

        if !out.is_empty() {
            out.push_str(if paragraph_break { "\n\n" } else { "\n" });
        }
        paragraph_break = false;
        out.push_str(&words.join(" "));
    }

    out
}
