//! Markdown-to-PDF page rendering.
//!
//! Renders the prompt-pack markdown as a plain monospaced document: each
//! source line is word-wrapped to a fixed column count and laid out top to
//! bottom on US Letter pages using the built-in Courier font, so no font
//! files need to be embedded. Markdown syntax is printed verbatim.

mod wrap;

use std::fmt::Write as _;

use tracing::{debug, instrument};

pub use wrap::wrap_line;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Points per inch.
const INCH: f32 = 72.0;

/// Page layout in PDF points.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub left_margin: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
    pub font_size: f32,
    pub leading: f32,
    pub wrap_columns: usize,
}

impl Default for PageLayout {
    /// US Letter, 0.75in side/top margins, 1in bottom margin, Courier 10/14.
    fn default() -> Self {
        Self {
            width: 8.5 * INCH,
            height: 11.0 * INCH,
            left_margin: 0.75 * INCH,
            top_margin: 0.75 * INCH,
            bottom_margin: 1.0 * INCH,
            font_size: 10.0,
            leading: 14.0,
            wrap_columns: 100,
        }
    }
}

impl PageLayout {
    /// How many text lines fit between the top and bottom margins.
    pub fn lines_per_page(&self) -> usize {
        let top = self.height - self.top_margin;
        let usable = top - self.bottom_margin;
        if usable < 0.0 || self.leading <= 0.0 {
            return 1;
        }
        (usable / self.leading).floor() as usize + 1
    }
}

/// Options for one rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Document title stored in the PDF info dictionary.
    pub title: String,
    pub layout: PageLayout,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Render markdown text into a complete PDF file.
#[instrument(skip_all, fields(title = %opts.title, bytes = markdown.len()))]
pub fn render_pdf(markdown: &str, opts: &RenderOptions) -> Vec<u8> {
    let layout = &opts.layout;
    let lines: Vec<String> = markdown
        .lines()
        .flat_map(|line| wrap_line(line, layout.wrap_columns))
        .collect();

    let per_page = layout.lines_per_page().max(1);
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(per_page).collect()
    };

    debug!(lines = lines.len(), pages = pages.len(), "laid out document");

    let mut pdf = PdfWriter::new();

    // Fixed objects: 1 catalog, 2 page tree, 3 font, 4 info. Pages follow in pairs.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 5 + 2 * i).collect();

    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    pdf.object(
        2,
        &format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
    );

    pdf.object(
        3,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier /Encoding /WinAnsiEncoding >>",
    );

    let mut info = b"<< /Title (".to_vec();
    info.extend(encode_text(&opts.title));
    info.extend(b") /Producer (weeklypack) >>");
    pdf.object_bytes(4, &info);

    for (page, page_id) in pages.iter().zip(&page_ids) {
        let content_id = page_id + 1;
        pdf.object(
            *page_id,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>",
                fmt_num(layout.width),
                fmt_num(layout.height),
            ),
        );
        pdf.stream(content_id, &page_content(page, layout));
    }

    pdf.finish(1, 4)
}

/// Build the content stream for one page.
fn page_content(lines: &[String], layout: &PageLayout) -> Vec<u8> {
    let mut out = Vec::new();
    let mut header = String::new();
    let _ = write!(
        header,
        "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
        fmt_num(layout.font_size),
        fmt_num(layout.leading),
        fmt_num(layout.left_margin),
        fmt_num(layout.height - layout.top_margin),
    );
    out.extend(header.as_bytes());

    for line in lines {
        out.push(b'(');
        out.extend(encode_text(line));
        out.extend(b") Tj T*\n");
    }

    out.extend(b"ET\n");
    out
}

/// Encode text for a PDF literal string in WinAnsi, escaping delimiters
/// and writing non-ASCII bytes as octal escapes.
fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(ch as u8);
            }
            '\u{2192}' => out.extend(b"->"),
            _ => match winansi(ch) {
                Some(b) if (0x20..0x7f).contains(&b) => out.push(b),
                Some(b) => out.extend(format!("\\{b:03o}").as_bytes()),
                None => out.push(b'?'),
            },
        }
    }
    out
}

/// Map a character to its WinAnsiEncoding byte.
fn winansi(ch: char) -> Option<u8> {
    let byte = match ch {
        '\u{20}'..='\u{7e}' => ch as u8,
        '\u{a0}'..='\u{ff}' => ch as u8,
        '\u{20ac}' => 0x80,
        '\u{2026}' => 0x85,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        _ => return None,
    };
    Some(byte)
}

/// Format a number without a trailing `.0`.
fn fmt_num(n: f32) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n:.2}")
    }
}

// ---------------------------------------------------------------------------
// Low-level object writer
// ---------------------------------------------------------------------------

/// Accumulates numbered objects and tracks their byte offsets for the xref table.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &str) {
        self.object_bytes(id, body.as_bytes());
    }

    fn object_bytes(&mut self, id: usize, body: &[u8]) {
        self.offsets.push((id, self.buf.len()));
        self.buf.extend(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend(body);
        self.buf.extend(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, data: &[u8]) {
        let mut body = format!("<< /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend(data);
        body.extend(b"\nendstream");
        self.object_bytes(id, &body);
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        self.offsets.sort_by_key(|(id, _)| *id);
        let size = self.offsets.last().map(|(id, _)| id + 1).unwrap_or(1);
        let xref_at = self.buf.len();

        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        let mut next = 1;
        for (id, offset) in &self.offsets {
            // Unused ids are written as free entries.
            while next < *id {
                xref.push_str("0000000000 65535 f \n");
                next += 1;
            }
            let _ = writeln!(xref, "{offset:010} 00000 n ");
            next += 1;
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
        );
        self.buf.extend(xref.as_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(pdf: &[u8]) -> String {
        String::from_utf8_lossy(pdf).into_owned()
    }

    #[test]
    fn letter_layout_fits_48_lines() {
        assert_eq!(PageLayout::default().lines_per_page(), 48);
    }

    #[test]
    fn renders_a_valid_skeleton() {
        let opts = RenderOptions {
            title: "Week 39 Pack".into(),
            ..Default::default()
        };
        let pdf = as_text(&render_pdf("# Title\n\nBody (with parens)", &opts));

        assert!(pdf.starts_with("%PDF-1.4"));
        assert!(pdf.trim_end().ends_with("%%EOF"));
        assert!(pdf.contains("/BaseFont /Courier"));
        assert!(pdf.contains("/Count 1"));
        assert!(pdf.contains("(# Title) Tj"));
        assert!(pdf.contains("(Body \\(with parens\\)) Tj"));
        assert!(pdf.contains("/Title (Week 39 Pack)"));
    }

    #[test]
    fn long_documents_paginate() {
        let md = (0..100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let pdf = as_text(&render_pdf(&md, &RenderOptions::default()));
        // 100 lines at 48 per page.
        assert!(pdf.contains("/Count 3"));
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let pdf = as_text(&render_pdf("", &RenderOptions::default()));
        assert!(pdf.contains("/Count 1"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = render_pdf("hello", &RenderOptions::default());
        let text = as_text(&pdf);
        let xref_pos = text.rfind("xref\n").unwrap();
        let entries: Vec<&str> = text[xref_pos..].lines().skip(3).take(6).collect();
        for (i, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            let expected = format!("{} 0 obj", i + 1);
            assert!(
                pdf[offset..].starts_with(expected.as_bytes()),
                "object {} not at offset {offset}",
                i + 1
            );
        }
    }

    #[test]
    fn encodes_typographic_characters() {
        assert_eq!(encode_text("a — b"), b"a \\227 b".to_vec());
        assert_eq!(encode_text("x → y"), b"x -> y".to_vec());
        assert_eq!(encode_text("日"), b"?".to_vec());
        assert_eq!(encode_text("a\\b"), b"a\\\\b".to_vec());
    }
}
