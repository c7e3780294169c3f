//! Kokoro voice and language catalog.
//!
//! Kokoro voice ids look like `af_heart`: the first letter is the language
//! code, the second the speaker gender, then an underscore and a name.
//! Voices can be blended by joining ids with commas.

use crate::error::{EngineError, Result};

/// Language codes understood by Kokoro's phonemizer
pub const LANGUAGES: &[(&str, &str)] = &[
    ("a", "American English"),
    ("b", "British English"),
    ("e", "Spanish"),
    ("f", "French"),
    ("h", "Hindi"),
    ("i", "Italian"),
    ("j", "Japanese"),
    ("p", "Brazilian Portuguese"),
    ("z", "Mandarin Chinese"),
];

/// Human-readable name for a language code
pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Check that every voice in a (possibly blended) voice id belongs to `language`.
pub fn validate(voice: &str, language: &str) -> Result<()> {
    if language_name(language).is_none() {
        return Err(EngineError::UnsupportedLanguage(language.to_string()));
    }

    let unsupported = || EngineError::UnsupportedVoice {
        voice: voice.to_string(),
        language: language.to_string(),
    };

    if voice.trim().is_empty() {
        return Err(unsupported());
    }

    for part in voice.split(',') {
        let (prefix, name) = part.trim().split_once('_').ok_or_else(unsupported)?;
        let mut prefix_chars = prefix.chars();
        let (Some(lang), Some(gender), None) =
            (prefix_chars.next(), prefix_chars.next(), prefix_chars.next())
        else {
            return Err(unsupported());
        };

        let name_ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric());
        if !language.starts_with(lang) || !matches!(gender, 'f' | 'm') || !name_ok {
            return Err(unsupported());
        }
    }

    Ok(())
}
