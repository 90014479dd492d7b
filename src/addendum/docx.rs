//! Minimal WordprocessingML writer
//!
//! Produces a `.docx` with a single default style (Times New Roman 12pt,
//! single spacing, no paragraph spacing) and paragraphs made of bold and
//! italic runs, tabs, line breaks and page breaks.

use anyhow::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Times New Roman" w:hAnsi="Times New Roman" w:cs="Times New Roman" w:eastAsia="Times New Roman"/><w:sz w:val="24"/><w:szCs w:val="24"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:before="0" w:after="0" w:line="240" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style></w:styles>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_CLOSE: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    /// Line break after the text
    pub line_break: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
            ..Default::default()
        }
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn with_break(mut self) -> Self {
        self.line_break = true;
        self
    }

    fn to_xml(&self, out: &mut String) {
        out.push_str("<w:r>");
        if self.bold || self.italic {
            out.push_str("<w:rPr>");
            if self.bold {
                out.push_str("<w:b/>");
            }
            if self.italic {
                out.push_str("<w:i/>");
            }
            out.push_str("</w:rPr>");
        }
        for (i, piece) in self.text.split('\t').enumerate() {
            if i > 0 {
                out.push_str("<w:tab/>");
            }
            if !piece.is_empty() {
                out.push_str("<w:t xml:space=\"preserve\">");
                out.push_str(&escape_xml(piece));
                out.push_str("</w:t>");
            }
        }
        if self.line_break {
            out.push_str("<w:br/>");
        }
        out.push_str("</w:r>");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Vec<TextRun>),
    PageBreak,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_paragraph(&mut self, runs: Vec<TextRun>) {
        self.blocks.push(Block::Paragraph(runs));
    }

    pub fn add_page_break(&mut self) {
        self.blocks.push(Block::PageBreak);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Text content, one line per paragraph, for logs and tests
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph(runs) => {
                    for run in runs {
                        out.push_str(&run.text);
                        if run.line_break {
                            out.push('\n');
                        }
                    }
                    out.push('\n');
                }
                Block::PageBreak => out.push('\x0c'),
            }
        }
        out
    }

    pub fn document_xml(&self) -> String {
        let mut out = String::from(DOCUMENT_OPEN);
        for block in &self.blocks {
            match block {
                Block::Paragraph(runs) => {
                    out.push_str("<w:p>");
                    for run in runs {
                        run.to_xml(&mut out);
                    }
                    out.push_str("</w:p>");
                }
                Block::PageBreak => out.push_str("<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>"),
            }
        }
        out.push_str(DOCUMENT_CLOSE);
        out
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut zip = ZipWriter::new(File::create(path)?);
        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
            ("word/styles.xml", STYLES.to_string()),
            ("word/document.xml", self.document_xml()),
        ];
        for (name, content) in parts {
            zip.start_file::<_, ()>(name, FileOptions::default())?;
            zip.write_all(content.as_bytes())?;
        }
        zip.finish()?;
        tracing::debug!(file = %path.display(), blocks = self.blocks.len(), "wrote docx");
        Ok(())
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_run_xml() {
        let mut out = String::new();
        TextRun::bold("\t--\tPOSITIVE FOR ").to_xml(&mut out);
        assert_eq!(
            out,
            "<w:r><w:rPr><w:b/></w:rPr><w:tab/><w:t xml:space=\"preserve\">--</w:t><w:tab/><w:t xml:space=\"preserve\">POSITIVE FOR </w:t></w:r>"
        );

        let mut out = String::new();
        TextRun::bold("KRAS").italic().with_break().to_xml(&mut out);
        assert!(out.contains("<w:b/><w:i/>"));
        assert!(out.ends_with("<w:br/></w:r>"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_save_docx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        let mut doc = Document::new();
        doc.add_paragraph(vec![TextRun::plain("first page")]);
        doc.add_page_break();
        doc.add_paragraph(vec![TextRun::bold("second page")]);
        doc.save(&path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("first page"));
        assert!(xml.contains("<w:br w:type=\"page\"/>"));
        assert!(archive.by_name("word/styles.xml").is_ok());
        assert_eq!(doc.plain_text(), "first page\n\x0csecond page\n");
    }
}
