//! FFMETADATA1 documents: book tags plus M4B chapter markers.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

/// Title, author and chapter starts of the narrated book
#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub title: String,
    pub author: Option<String>,
    /// (chapter title, position of its first segment)
    pub chapters: Vec<(String, usize)>,
}

/// Where one chapter sits on the output timeline, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSpan {
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl BookMetadata {
    /// Chapter spans given each segment's length in samples.
    ///
    /// Boundaries come from the running sample count, so rounding to whole
    /// milliseconds never accumulates. Starts beyond the last segment are
    /// clamped; chapters that end up covering no segment are left out.
    pub fn chapter_spans(
        &self,
        segment_lengths: &[usize],
        sample_rate: u32,
    ) -> Vec<ChapterSpan> {
        let rate = u64::from(sample_rate.max(1));
        // offsets[i] is where segment i starts; the final entry is the total
        let offsets: Vec<u64> = std::iter::once(0)
            .chain(segment_lengths.iter().scan(0u64, |acc, &len| {
                *acc += len as u64;
                Some(*acc)
            }))
            .map(|samples| samples * 1000 / rate)
            .collect();
        let count = segment_lengths.len();

        self.chapters
            .iter()
            .enumerate()
            .filter_map(|(i, (title, first))| {
                let first = (*first).min(count);
                let last = self
                    .chapters
                    .get(i + 1)
                    .map_or(count, |(_, next)| (*next).min(count));
                (first < last).then(|| ChapterSpan {
                    title: title.clone(),
                    start_ms: offsets[first],
                    end_ms: offsets[last],
                })
            })
            .collect()
    }

    /// Render as an FFMETADATA1 document
    pub fn to_ffmetadata(&self, chapters: &[ChapterSpan]) -> String {
        let title = escape(&self.title);
        let artist = escape(self.author.as_deref().unwrap_or("Unknown"));

        let mut doc = format!(
            ";FFMETADATA1\ntitle={title}\nartist={artist}\nalbum={title}\ngenre=Audiobook\n"
        );
        for chapter in chapters {
            // Writing into a String cannot fail
            let _ = write!(
                doc,
                "\n[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
                chapter.start_ms,
                chapter.end_ms,
                escape(&chapter.title)
            );
        }
        doc
    }

    pub fn write_ffmetadata(&self, chapters: &[ChapterSpan], path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_ffmetadata(chapters))
    }
}

/// Backslash-escape `= ; # \` and turn newlines into `\n`
fn escape(value: &str) -> String {
    value
        .chars()
        .filter(|&c| c != '\r')
        .fold(String::with_capacity(value.len()), |mut out, c| {
            match c {
                '\n' => out.push_str("\\n"),
                '=' | ';' | '#' | '\\' => {
                    out.push('\\');
                    out.push(c);
                }
                _ => out.push(c),
            }
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(title: &str, start_ms: u64, end_ms: u64) -> ChapterSpan {
        ChapterSpan {
            title: title.to_string(),
            start_ms,
            end_ms,
        }
    }

    fn book(chapters: &[(&str, usize)]) -> BookMetadata {
        BookMetadata {
            title: "Moby Dick".to_string(),
            author: Some("Herman Melville".to_string()),
            chapters: chapters
                .iter()
                .map(|(title, first)| (title.to_string(), *first))
                .collect(),
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain words"), "plain words");
        assert_eq!(escape("a=b;c#d"), "a\\=b\\;c\\#d");
        assert_eq!(escape("back\\slash"), "back\\\\slash");
        assert_eq!(escape("two\r\nlines"), "two\\nlines");
    }

    #[test]
    fn test_document_layout() {
        let doc = book(&[]).to_ffmetadata(&[span("Loomings", 0, 1500), span("The Carpet-Bag", 1500, 4000)]);

        assert!(doc.starts_with(";FFMETADATA1\ntitle=Moby Dick\nartist=Herman Melville\n"));
        assert_eq!(doc.matches("[CHAPTER]").count(), 2);
        assert!(doc.contains("START=1500\nEND=4000\ntitle=The Carpet-Bag\n"));
    }

    #[test]
    fn test_missing_author() {
        let mut metadata = book(&[]);
        metadata.author = None;
        assert!(metadata.to_ffmetadata(&[]).contains("artist=Unknown\n"));
    }

    #[test]
    fn test_write_ffmetadata() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chapters.txt");
        let metadata = book(&[]);

        metadata.write_ffmetadata(&[span("Loomings", 0, 10)], &path).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            metadata.to_ffmetadata(&[span("Loomings", 0, 10)])
        );
    }

    #[test]
    fn test_chapter_spans() {
        let metadata = book(&[("One", 0), ("Two", 2), ("Three", 4)]);

        let spans = metadata.chapter_spans(&[100, 200, 300, 400, 500], 1000);

        assert_eq!(
            spans,
            vec![span("One", 0, 300), span("Two", 300, 1000), span("Three", 1000, 1500)]
        );
    }

    #[test]
    fn test_empty_chapters_left_out() {
        let metadata = book(&[("Front", 0), ("Body", 0), ("Beyond", 9)]);
        assert_eq!(metadata.chapter_spans(&[250, 250], 1000), vec![span("Body", 0, 500)]);
    }

    #[test]
    fn test_chapter_offsets_do_not_drift() {
        // 10.5 ms per segment: truncating each one would lose 0.5 ms every time
        let metadata = book(&[("One", 0), ("Two", 100), ("Three", 200)]);

        let spans = metadata.chapter_spans(&[252; 300], 24_000);

        assert_eq!(
            spans,
            vec![span("One", 0, 1050), span("Two", 1050, 2100), span("Three", 2100, 3150)]
        );
    }

    #[test]
    fn test_chapter_offsets_use_sample_rate() {
        let metadata = book(&[("One", 0), ("Two", 2)]);
        assert_eq!(
            metadata.chapter_spans(&[1001, 1001, 1001], 1000),
            vec![span("One", 0, 2002), span("Two", 2002, 3003)]
        );
    }
}
