//! Shared fixtures for unit tests

use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

/// Builds small but valid EPUB files
pub struct EpubBuilder {
    title: String,
    author: Option<String>,
    chapters: Vec<(String, String)>,
    spine: Option<Vec<String>>,
}

impl EpubBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            author: None,
            chapters: Vec::new(),
            spine: None,
        }
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    /// Add an XHTML chapter; manifest order follows call order
    pub fn chapter(mut self, id: &str, body: &str) -> Self {
        self.chapters.push((id.to_string(), body.to_string()));
        self
    }

    /// Reading order, when it should differ from manifest order
    pub fn spine_order(mut self, ids: &[&str]) -> Self {
        self.spine = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn write(&self, path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let stored =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", stored).unwrap();
        zip.write_all(CONTAINER_XML.as_bytes()).unwrap();

        zip.start_file("OEBPS/content.opf", stored).unwrap();
        zip.write_all(self.opf().as_bytes()).unwrap();

        zip.start_file("OEBPS/toc.ncx", stored).unwrap();
        zip.write_all(self.ncx().as_bytes()).unwrap();

        for (id, body) in &self.chapters {
            zip.start_file(format!("OEBPS/{id}.xhtml"), stored).unwrap();
            zip.write_all(xhtml(id, body).as_bytes()).unwrap();
        }

        zip.finish().unwrap();
    }

    fn spine_ids(&self) -> Vec<String> {
        match &self.spine {
            Some(ids) => ids.clone(),
            None => self.chapters.iter().map(|(id, _)| id.clone()).collect(),
        }
    }

    fn opf(&self) -> String {
        let creator = self
            .author
            .as_ref()
            .map(|a| format!("    <dc:creator>{a}</dc:creator>\n"))
            .unwrap_or_default();
        let manifest: String = self
            .chapters
            .iter()
            .map(|(id, _)| {
                format!(
                    "    <item id=\"{id}\" href=\"{id}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
                )
            })
            .collect();
        let spine: String = self
            .spine_ids()
            .iter()
            .map(|id| format!("    <itemref idref=\"{id}\"/>\n"))
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
{creator}    <dc:identifier id="bookid">urn:uuid:00000000-0000-0000-0000-000000000000</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
            title = self.title,
        )
    }

    fn ncx(&self) -> String {
        let points: String = self
            .spine_ids()
            .iter()
            .enumerate()
            .map(|(i, id)| {
                format!(
                    "    <navPoint id=\"nav-{id}\" playOrder=\"{order}\">\n      <navLabel><text>{id}</text></navLabel>\n      <content src=\"{id}.xhtml\"/>\n    </navPoint>\n",
                    order = i + 1
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:00000000-0000-0000-0000-000000000000"/></head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
            title = self.title,
        )
    }
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn xhtml(id: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{id}</title><style>body {{ margin: 0; }}</style></head>
<body>{body}</body>
</html>
"#
    )
}
