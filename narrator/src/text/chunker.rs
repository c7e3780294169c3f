//! Splitting unit text into bounded chunks.
//!
//! Units are joined with a paragraph break and scanned left to right. When
//! the remaining text no longer fits, the chunk is closed at the last
//! sentence end inside the window, then the last clause mark, then the last
//! whitespace. A single token longer than the limit is never split: it
//! becomes one over-length chunk of its own.

use super::{Chunk, TextUnit};
use crate::error::{ConvertError, Result};

/// Separator placed between consecutive units.
pub const UNIT_SEPARATOR: &str = "\n\n";

const SENTENCE_TERMINALS: &[char] = &['.', '!', '?', '\u{2026}'];
const CLAUSE_MARKS: &[char] = &[',', ';', ':'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201d}', '\u{2019}'];

/// Split units into chunks of at most `max` characters, except for chunks
/// holding a single over-long token.
pub fn chunk(units: &[TextUnit], max: usize) -> Result<Vec<Chunk>> {
    if max == 0 {
        return Err(ConvertError::InvalidConfig(
            "chunk size must be greater than 0".into(),
        ));
    }

    let mut chars: Vec<char> = Vec::new();
    let mut unit_starts = Vec::with_capacity(units.len());
    for (i, unit) in units.iter().enumerate() {
        if i > 0 {
            chars.extend(UNIT_SEPARATOR.chars());
        }
        unit_starts.push(chars.len());
        chars.extend(unit.text.chars());
    }

    let spans = split_spans(&chars, max);

    let chunks = spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let unit = unit_starts
                .partition_point(|&s| s <= start)
                .saturating_sub(1);
            Chunk {
                index,
                text: chars[start..end].iter().collect(),
                unit_index: units.get(unit).map_or(unit, |u| u.index),
            }
        })
        .collect();

    Ok(chunks)
}

/// Character ranges of each chunk, with whitespace at cuts excluded.
fn split_spans(chars: &[char], max: usize) -> Vec<(usize, usize)> {
    let n = chars.len();
    let mut spans = Vec::new();
    let mut start = skip_whitespace(chars, 0);

    while start < n {
        let cut = if n - start <= max {
            n
        } else {
            // No whitespace in the window: the token runs past the limit
            find_cut(chars, start, max).unwrap_or_else(|| token_end(chars, start))
        };

        let mut end = cut;
        while end > start && chars[end - 1].is_whitespace() {
            end -= 1;
        }
        spans.push((start, end));
        start = skip_whitespace(chars, cut);
    }

    spans
}

/// Best whitespace cut in `(start, start + max]`, by boundary strength.
fn find_cut(chars: &[char], start: usize, max: usize) -> Option<usize> {
    let mut clause = None;
    let mut space = None;

    for c in (start + 1..=start + max).rev() {
        if !chars[c].is_whitespace() {
            continue;
        }
        if is_sentence_boundary(chars, start, c) {
            return Some(c);
        }
        if clause.is_none() && CLAUSE_MARKS.contains(&chars[c - 1]) {
            clause = Some(c);
        }
        if space.is_none() {
            space = Some(c);
        }
    }

    clause.or(space)
}

/// Whitespace at `c` ends a sentence or starts a paragraph break.
fn is_sentence_boundary(chars: &[char], start: usize, c: usize) -> bool {
    if chars[c] == '\n' && chars.get(c + 1) == Some(&'\n') {
        return true;
    }

    let mut p = c - 1;
    while p > start && CLOSERS.contains(&chars[p]) {
        p -= 1;
    }
    SENTENCE_TERMINALS.contains(&chars[p])
}

fn token_end(chars: &[char], start: usize) -> usize {
    (start..chars.len())
        .find(|&i| chars[i].is_whitespace())
        .unwrap_or(chars.len())
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}
