//! A4 table documents with an optional letterhead, written with lopdf using the built-in Helvetica
//! fonts.

use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, ObjectId, Stream,
};
use std::path::PathBuf;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 36.0;
const LOGO_BOX: f32 = 100.0;
const TABLE_FONT_SIZE: f32 = 9.0;
const ROW_HEIGHT: f32 = 18.0;
const CELL_PADDING: f32 = 4.0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PDF encoding failed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("PDF write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Printed above the table. Every part is optional.
#[derive(Clone, Debug, Default)]
pub struct Letterhead {
    pub org_name: Option<String>,
    pub logo_path: Option<PathBuf>,
    pub address: Option<String>,
}

/// A table whose column widths are fractions of the printable width.
pub struct Table<'a> {
    pub headers: &'a [&'a str],
    pub widths: &'a [f32],
    pub rows: &'a [Vec<String>],
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

struct Logo {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

/// Reads the logo, or logs and returns `None` when it cannot be read or decoded.
fn load_logo(path: &std::path::Path) -> Option<Logo> {
    match image::open(path) {
        Ok(image) => {
            let rgb = image.to_rgb8();
            Some(Logo {
                width: rgb.width(),
                height: rgb.height(),
                rgb: rgb.into_raw(),
            })
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "logo skipped");
            None
        }
    }
}

struct Writer {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    operations: Vec<Operation>,
    y: f32,
}

impl Writer {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Writer {
            doc,
            pages_id,
            kids: Vec::new(),
            operations: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn centred(&mut self, font: Font, size: f32, text: &str) {
        let width = text_width(text, font, size);
        self.y -= size;
        self.text(font, size, (PAGE_WIDTH - width) / 2.0, self.y, text);
        self.y -= size * 0.5;
    }

    fn logo(&mut self, name: &str, logo: &Logo) {
        let scale = (LOGO_BOX / logo.width as f32).min(LOGO_BOX / logo.height as f32);
        let (width, height) = (logo.width as f32 * scale, logo.height as f32 * scale);
        self.y -= height + 6.0;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0_i64.into(),
                    0_i64.into(),
                    height.into(),
                    ((PAGE_WIDTH - width) / 2.0).into(),
                    self.y.into(),
                ],
            ),
            Operation::new("Do", vec![name.into()]),
            Operation::new("Q", vec![]),
        ]);
        self.y -= 6.0;
    }

    fn row(&mut self, table: &Table, cells: &[&str], font: Font) {
        let printable = PAGE_WIDTH - 2.0 * MARGIN;
        let bottom = self.y - ROW_HEIGHT;
        let mut x = MARGIN;
        if matches!(font, Font::Bold) {
            self.operations.extend([
                Operation::new("g", vec![0.9_f32.into()]),
                Operation::new(
                    "re",
                    vec![MARGIN.into(), bottom.into(), printable.into(), ROW_HEIGHT.into()],
                ),
                Operation::new("f", vec![]),
                Operation::new("g", vec![0_i64.into()]),
            ]);
        }
        for (cell, fraction) in cells.iter().zip(table.widths) {
            let width = printable * fraction;
            self.operations.push(Operation::new(
                "re",
                vec![x.into(), bottom.into(), width.into(), ROW_HEIGHT.into()],
            ));
            let text = fit(cell, font, TABLE_FONT_SIZE, width - 2.0 * CELL_PADDING);
            self.text(
                font,
                TABLE_FONT_SIZE,
                x + CELL_PADDING,
                bottom + (ROW_HEIGHT - TABLE_FONT_SIZE) / 2.0 + 1.5,
                &text,
            );
            x += width;
        }
        self.operations.push(Operation::new("S", vec![]));
        self.y = bottom;
    }

    fn finish_page(&mut self) -> Result<(), Error> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        self.y = PAGE_HEIGHT - MARGIN;
        Ok(())
    }

    fn finish(mut self, logo: Option<Logo>) -> Result<Vec<u8>, Error> {
        let regular_id = self.doc.add_object(font_dictionary("Helvetica"));
        let bold_id = self.doc.add_object(font_dictionary("Helvetica-Bold"));
        let mut resources = dictionary! {
            "Font" => dictionary! {
                "F1" => regular_id,
                "F2" => bold_id,
            },
        };
        if let Some(logo) = logo {
            let image_id = self.doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(logo.width),
                    "Height" => i64::from(logo.height),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8_i64,
                },
                logo.rgb,
            ));
            resources.set("XObject", dictionary! { "Logo" => image_id });
        }
        let resources_id = self.doc.add_object(resources);
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0_i64.into(), 0_i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();
        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn font_dictionary(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Renders the letterhead followed by the table, starting a new page with a repeated header row
/// whenever the current one is full.
pub fn render(letterhead: &Letterhead, table: &Table) -> Result<Vec<u8>, Error> {
    let mut writer = Writer::new();
    if let Some(org_name) = letterhead.org_name.as_deref().filter(|n| !n.trim().is_empty()) {
        writer.centred(Font::Bold, 16.0, org_name.trim());
    }
    let logo = letterhead.logo_path.as_deref().and_then(load_logo);
    if let Some(logo) = &logo {
        writer.logo("Logo", logo);
    }
    if let Some(address) = letterhead.address.as_deref().filter(|a| !a.trim().is_empty()) {
        writer.centred(Font::Regular, 10.0, address.trim());
    }
    writer.y -= ROW_HEIGHT;

    writer.row(table, table.headers, Font::Bold);
    for row in table.rows {
        if writer.y - ROW_HEIGHT < MARGIN {
            writer.finish_page()?;
            writer.row(table, table.headers, Font::Bold);
        }
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        writer.row(table, &cells, Font::Regular);
    }
    writer.finish_page()?;
    writer.finish(logo)
}

/// Latin-1 bytes, with anything outside it replaced by `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Helvetica advance widths for ASCII 32..=126, in thousandths of the font size.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match u32::from(c) {
            code @ 32..=126 => u32::from(HELVETICA_WIDTHS[(code - 32) as usize]),
            _ => 556,
        })
        .sum();
    // Helvetica-Bold runs a little wider.
    let factor = match font {
        Font::Regular => 1.0,
        Font::Bold => 1.07,
    };
    units as f32 / 1000.0 * size * factor
}

/// Cuts the text and appends `...` until it fits in `width`.
fn fit(text: &str, font: Font, size: f32, width: f32) -> String {
    if text_width(text, font, size) <= width {
        return text.to_owned();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "...";
        if text_width(&candidate, font, size) <= width {
            return candidate;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 2] = ["ID", "Name"];
    const WIDTHS: [f32; 2] = [0.2, 0.8];

    fn rows(count: usize) -> Vec<Vec<String>> {
        (1..=count)
            .map(|i| vec![i.to_string(), format!("Applicant {i}")])
            .collect()
    }

    #[test]
    fn long_tables_continue_on_new_pages() {
        let rows = rows(120);
        let table = Table {
            headers: &HEADERS,
            widths: &WIDTHS,
            rows: &rows,
        };
        let bytes = render(&Letterhead::default(), &table).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn unreadable_logo_is_skipped() {
        let rows = rows(1);
        let table = Table {
            headers: &HEADERS,
            widths: &WIDTHS,
            rows: &rows,
        };
        let letterhead = Letterhead {
            org_name: Some("County Social Protection Office".into()),
            logo_path: Some(PathBuf::from("/nonexistent/logo.png")),
            address: Some("P.O. Box 1, Kisumu".into()),
        };
        let bytes = render(&letterhead, &table).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn logo_is_embedded() {
        let path = std::env::temp_dir().join(format!("logo-{}.png", uuid::Uuid::new_v4()));
        image::DynamicImage::new_rgb8(400, 200).save(&path).unwrap();
        let logo = load_logo(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!((logo.width, logo.height), (400, 200));
        assert_eq!(logo.rgb.len(), 400 * 200 * 3);
    }

    #[test]
    fn cells_are_cut_to_fit() {
        let text = "Wanjiru Nyambura Kamau-Odhiambo";
        let cut = fit(text, Font::Regular, 9.0, 60.0);
        assert!(cut.ends_with("..."));
        assert!(text_width(&cut, Font::Regular, 9.0) <= 60.0);
        assert_eq!(fit("42", Font::Regular, 9.0, 60.0), "42");
        assert_eq!(win_ansi("Zoë ✓"), vec![b'Z', b'o', 0xEB, b' ', b'?']);
    }
}
