//! Minimal WordprocessingML package.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Block, RenderError, ReportData};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' => {}
            c => out.push(c),
        }
    }
    out
}

/// A run; `size` is in half-points.
fn run(text: &str, bold: bool, size: u32) -> String {
    format!(
        r#"<w:r><w:rPr>{}<w:sz w:val="{}"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
        if bold { "<w:b/>" } else { "" },
        size,
        escape(text)
    )
}

fn paragraph(runs: &[String], indent: Option<u32>) -> String {
    let props = match indent {
        Some(twips) => format!(r#"<w:pPr><w:ind w:left="{}"/></w:pPr>"#, twips),
        None => String::new(),
    };
    format!("<w:p>{}{}</w:p>", props, runs.concat())
}

fn document_xml(data: &ReportData) -> String {
    let mut body = String::new();
    for block in data.blocks() {
        let p = match block {
            Block::Title(text) => paragraph(&[run(&text, true, 36)], None),
            Block::Heading(text) => paragraph(&[run(&text, true, 26)], None),
            Block::Field(label, value) => paragraph(
                &[run(&format!("{}: ", label), true, 21), run(&value, false, 21)],
                None,
            ),
            Block::Paragraph(text) => {
                // Preserve explicit line breaks from notes.
                let runs: Vec<String> = text
                    .lines()
                    .enumerate()
                    .map(|(i, line)| {
                        let r = run(line, false, 21);
                        if i == 0 {
                            r
                        } else {
                            format!("<w:r><w:br/></w:r>{}", r)
                        }
                    })
                    .collect();
                paragraph(&runs, None)
            }
            Block::Bullet(text) => paragraph(&[run(&format!("\u{2022} {}", text), false, 21)], Some(360)),
            Block::Spacer => "<w:p/>".to_string(),
        };
        body.push_str(&p);
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1080" w:right="1080" w:bottom="1080" w:left="1080" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
        body
    )
}

fn docx_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Docx(e.to_string())
}

pub fn render(data: &ReportData) -> Result<Vec<u8>, RenderError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, contents) in [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("word/document.xml", document_xml(data)),
    ] {
        zip.start_file(name, options).map_err(docx_err)?;
        zip.write_all(contents.as_bytes()).map_err(docx_err)?;
    }

    let cursor = zip.finish().map_err(docx_err)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::super::tests::sample;
    use super::*;

    #[test]
    fn test_render_produces_word_package() {
        let bytes = render(&sample(2)).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("[Content_Types].xml").is_ok());
        assert!(archive.by_name("_rels/.rels").is_ok());

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("Riverside Tower &amp; Garage"));
        assert!(xml.contains("Serious: 2"));
        assert!(xml.contains("Foreman notified"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&apos;&amp;&apos;&lt;/a&gt;");
        assert_eq!(escape("bell\u{7}"), "bell");
    }
}
