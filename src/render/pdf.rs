//! PDF output using the standard Helvetica fonts.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::{wrap, Block, RenderError, ReportData};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 54.0;
const BODY_SIZE: f32 = 10.5;

/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

struct PageWriter {
    pages: Vec<Vec<u8>>,
    current: Vec<u8>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN + 20.0 {
            self.break_page();
        }
    }

    fn text(&mut self, font: &str, size: f32, x: f32, text: &str) {
        let leading = size * 1.35;
        self.ensure_space(leading);
        self.y -= leading;
        self.current.extend_from_slice(
            format!("BT /{} {} Tf {} {} Td (", font, size, x, self.y).as_bytes(),
        );
        self.current.extend(encode_text(text));
        self.current.extend_from_slice(b") Tj ET\n");
    }

    fn wrapped(&mut self, font: &str, size: f32, x: f32, text: &str) {
        let width = ((PAGE_WIDTH - MARGIN - x) / (size * AVG_GLYPH_WIDTH)) as usize;
        for line in wrap(text, width) {
            self.text(font, size, x, &line);
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn finish(mut self) -> Vec<Vec<u8>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Escape a string for a PDF literal and map it onto WinAnsi bytes.
fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            '\u{2018}' | '\u{2019}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' => out.push(b'"'),
            '\u{2013}' | '\u{2014}' => out.push(b'-'),
            '\u{2026}' => out.extend_from_slice(b"..."),
            '\u{2022}' => out.push(0x95),
            c if (c as u32) < 0x20 => out.push(b' '),
            c if (c as u32) < 0x100 => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

fn layout(data: &ReportData) -> Vec<Vec<u8>> {
    let mut w = PageWriter::new();
    for block in data.blocks() {
        match block {
            Block::Title(text) => w.wrapped("F2", 18.0, MARGIN, &text),
            Block::Heading(text) => {
                w.ensure_space(40.0);
                w.gap(4.0);
                w.wrapped("F2", 13.0, MARGIN, &text);
            }
            Block::Field(label, value) => {
                w.wrapped("F1", BODY_SIZE, MARGIN, &format!("{}: {}", label, value));
            }
            Block::Paragraph(text) => w.wrapped("F1", BODY_SIZE, MARGIN, &text),
            Block::Bullet(text) => w.wrapped("F1", BODY_SIZE, MARGIN + 14.0, &format!("\u{2022} {}", text)),
            Block::Spacer => w.gap(8.0),
        }
    }
    w.finish()
}

pub fn render(data: &ReportData) -> Result<Vec<u8>, RenderError> {
    let pages = layout(data);
    let total = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(total);
    for (i, mut content) in pages.into_iter().enumerate() {
        let footer = format!(
            "BT /F1 8 Tf {} {} Td (Page {} of {}) Tj ET\n",
            MARGIN,
            MARGIN / 2.0,
            i + 1,
            total
        );
        content.extend_from_slice(footer.as_bytes());

        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::super::tests::sample;
    use super::*;

    #[test]
    fn test_render_produces_loadable_pdf() {
        let bytes = render(&sample(1)).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_long_reports_break_pages() {
        let bytes = render(&sample(60)).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn test_encode_text_escapes_and_maps() {
        assert_eq!(encode_text("a(b)\\"), b"a\\(b\\)\\\\".to_vec());
        assert_eq!(encode_text("68°F"), vec![b'6', b'8', 0xB0, b'F']);
        assert_eq!(encode_text("\u{2014}\u{4e2d}"), b"-?".to_vec());
    }
}
