//! Markdown → `.docx` exporter.
//!
//! Markdown is parsed as strict CommonMark (no extensions) with
//! `pulldown-cmark` and written through `docx-rs`. Local PNG images are
//! embedded; anything unreadable degrades to its alt text.

use std::fs::File;
use std::path::Path;

use docx_rs::{
    BreakType, Docx, Hyperlink, HyperlinkType, Paragraph, Pic, Run, RunFonts, Style, StyleType,
};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use tracing::{debug, info, instrument, warn};

use autoblog_shared::{AutoblogError, Result};

const MONO_FONT: &str = "Courier New";
const LINK_COLOR: &str = "0563C1";

/// Twips of indentation per list/quote nesting level.
const INDENT_STEP: i32 = 720;

/// 96 dpi pixels to EMU.
const EMU_PER_PX: u64 = 9525;
/// Six inches, the usable width of a default Letter page.
const MAX_IMAGE_WIDTH_EMU: u64 = 5_486_400;

/// Render `markdown` into a `.docx` file at `output`.
///
/// Parent directories are created as needed. Converter failures are returned
/// as [`AutoblogError::Export`].
#[instrument(skip(markdown), fields(output = %output.display()))]
pub fn export_docx(markdown: &str, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AutoblogError::io(parent, e))?;
    }

    let docx = render(markdown);
    let file = File::create(output).map_err(|e| AutoblogError::io(output, e))?;
    docx.build()
        .pack(file)
        .map_err(|e| AutoblogError::Export(format!("failed to write docx: {e}")))?;

    info!(bytes = markdown.len(), "document exported");
    Ok(())
}

/// Build the in-memory document for `markdown`.
fn render(markdown: &str) -> Docx {
    let mut writer = DocxWriter::new();
    for event in Parser::new_ext(markdown, Options::empty()) {
        writer.handle(event);
    }
    writer.finish()
}

// ---------------------------------------------------------------------------
// Writer state
// ---------------------------------------------------------------------------

struct PendingLink {
    url: String,
    runs: Vec<Run>,
}

struct PendingImage {
    path: String,
    alt: String,
}

struct DocxWriter {
    docx: Docx,
    current: Option<Paragraph>,
    heading: Option<HeadingLevel>,
    /// One entry per open list; `Some(n)` is the next ordinal of an ordered list.
    lists: Vec<Option<u64>>,
    /// The open paragraph holds only a list marker so far.
    item_fresh: bool,
    quote_depth: i32,
    in_code_block: bool,
    strong: u32,
    emphasis: u32,
    link: Option<PendingLink>,
    image: Option<PendingImage>,
    /// Text events since the last tag, written as one run.
    pending_text: String,
}

impl DocxWriter {
    fn new() -> Self {
        let mut docx = Docx::new();
        for (level, size) in [(1, 32), (2, 28), (3, 24), (4, 22), (5, 22), (6, 22)] {
            docx = docx.add_style(
                Style::new(&format!("Heading{level}"), StyleType::Paragraph)
                    .name(&format!("Heading {level}"))
                    .size(size)
                    .bold(),
            );
        }

        Self {
            docx,
            current: None,
            heading: None,
            lists: Vec::new(),
            item_fresh: false,
            quote_depth: 0,
            in_code_block: false,
            strong: 0,
            emphasis: 0,
            link: None,
            image: None,
            pending_text: String::new(),
        }
    }

    fn finish(mut self) -> Docx {
        self.flush_text();
        self.flush();
        self.docx
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => self.text(&text),
            Event::SoftBreak => self.text(" "),
            other => {
                self.flush_text();
                self.handle_structure(other);
            }
        }
    }

    fn handle_structure(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Code(code) => {
                let run = self.styled_run(&code).fonts(mono());
                self.push_run(run);
            }
            Event::HardBreak => self.push_run(Run::new().add_break(BreakType::TextWrapping)),
            Event::Rule => {
                self.flush();
                self.docx = std::mem::take(&mut self.docx)
                    .add_paragraph(Paragraph::new().add_run(Run::new().add_text("* * *")));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                if self.item_fresh {
                    self.item_fresh = false;
                } else {
                    self.flush();
                }
            }
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(level);
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code_block = true;
            }
            Tag::List(first) => {
                self.flush();
                self.item_fresh = false;
                self.lists.push(first);
            }
            Tag::Item => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "\u{2022} ".to_string(),
                };
                self.current = Some(self.new_paragraph().add_run(Run::new().add_text(marker)));
                self.item_fresh = true;
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Link { dest_url, .. } => {
                self.link = Some(PendingLink {
                    url: dest_url.to_string(),
                    runs: Vec::new(),
                });
            }
            Tag::Image { dest_url, .. } => {
                self.image = Some(PendingImage {
                    path: dest_url.to_string(),
                    alt: String::new(),
                });
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Item => {
                self.item_fresh = false;
                self.flush();
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.heading = None;
            }
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = (self.quote_depth - 1).max(0);
            }
            TagEnd::CodeBlock => {
                self.flush();
                self.in_code_block = false;
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Link => {
                if let Some(link) = self.link.take() {
                    let mut hyperlink = Hyperlink::new(&link.url, HyperlinkType::External);
                    for run in link.runs {
                        hyperlink = hyperlink.add_run(run);
                    }
                    let paragraph = self.take_paragraph().add_hyperlink(hyperlink);
                    self.current = Some(paragraph);
                }
            }
            TagEnd::Image => {
                if let Some(image) = self.image.take() {
                    let run = image_run(&image);
                    self.push_run(run);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        match self.image.as_mut() {
            Some(image) => image.alt.push_str(text),
            None => self.pending_text.push_str(text),
        }
    }

    /// Write buffered text as a single run in the current style.
    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending_text);

        if self.in_code_block {
            let body = text.strip_suffix('\n').unwrap_or(&text);
            let mut run = Run::new().fonts(mono());
            for (i, line) in body.split('\n').enumerate() {
                if i > 0 {
                    run = run.add_break(BreakType::TextWrapping);
                }
                run = run.add_text(line);
            }
            self.push_run(run);
            return;
        }

        let run = self.styled_run(&text);
        self.push_run(run);
    }

    fn styled_run(&self, text: &str) -> Run {
        let mut run = Run::new().add_text(text);
        if self.strong > 0 {
            run = run.bold();
        }
        if self.emphasis > 0 {
            run = run.italic();
        }
        if self.link.is_some() {
            run = run.color(LINK_COLOR).underline("single");
        }
        run
    }

    fn push_run(&mut self, run: Run) {
        if let Some(link) = self.link.as_mut() {
            link.runs.push(run);
            return;
        }
        let paragraph = self.take_paragraph().add_run(run);
        self.current = Some(paragraph);
    }

    fn take_paragraph(&mut self) -> Paragraph {
        match self.current.take() {
            Some(p) => p,
            None => self.new_paragraph(),
        }
    }

    /// A fresh paragraph styled for the current block context.
    fn new_paragraph(&self) -> Paragraph {
        let mut paragraph = Paragraph::new();
        if let Some(level) = self.heading {
            paragraph = paragraph.style(&format!("Heading{}", heading_number(level)));
        }
        let depth = self.quote_depth + self.lists.len() as i32;
        if depth > 0 {
            paragraph = paragraph.indent(Some(depth * INDENT_STEP), None, None, None);
        }
        paragraph
    }

    fn flush(&mut self) {
        if let Some(paragraph) = self.current.take() {
            self.docx = std::mem::take(&mut self.docx).add_paragraph(paragraph);
        }
    }
}

fn mono() -> RunFonts {
    RunFonts::new().ascii(MONO_FONT).hi_ansi(MONO_FONT)
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Embed a local PNG, or fall back to an italic alt-text run.
fn image_run(image: &PendingImage) -> Run {
    match std::fs::read(&image.path) {
        Ok(bytes) => match png_dimensions(&bytes) {
            Some((width, height)) => {
                let (cx, cy) = fit_width(width, height);
                debug!(path = %image.path, width, height, "embedding image");
                Run::new().add_image(Pic::new_with_dimensions(bytes, width, height).size(cx, cy))
            }
            None => {
                warn!(path = %image.path, "not a PNG image, using alt text");
                alt_run(&image.alt)
            }
        },
        Err(e) => {
            warn!(path = %image.path, error = %e, "image unreadable, using alt text");
            alt_run(&image.alt)
        }
    }
}

fn alt_run(alt: &str) -> Run {
    Run::new().add_text(format!("[Image: {alt}]")).italic()
}

/// Width and height from a PNG IHDR chunk.
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.len() < 24 || !bytes.starts_with(SIGNATURE) || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    (width > 0 && height > 0).then_some((width, height))
}

/// EMU extents scaled down to the page width, preserving aspect ratio.
fn fit_width(width_px: u32, height_px: u32) -> (u32, u32) {
    let cx = u64::from(width_px) * EMU_PER_PX;
    let cy = u64::from(height_px) * EMU_PER_PX;
    if cx <= MAX_IMAGE_WIDTH_EMU {
        return (cx as u32, cy as u32);
    }
    let scaled_cy = cy * MAX_IMAGE_WIDTH_EMU / cx;
    (MAX_IMAGE_WIDTH_EMU as u32, scaled_cy as u32)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    /// A valid 1x1 RGBA PNG.
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn archive_entries(path: &Path) -> Vec<String> {
        let file = File::open(path).expect("open docx");
        let archive = zip::ZipArchive::new(file).expect("zip archive");
        archive.file_names().map(String::from).collect()
    }

    fn document_xml(path: &Path) -> String {
        let file = File::open(path).expect("open docx");
        let mut archive = zip::ZipArchive::new(file).expect("zip archive");
        let mut entry = archive.by_name("word/document.xml").expect("document.xml");
        let mut xml = String::new();
        entry.read_to_string(&mut xml).expect("read xml");
        xml
    }

    #[test]
    fn exports_headings_lists_and_links() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("nested").join("post.docx");
        let md = "# Scaling Reads\n\nSome **bold** and *soft* text with `code`.\n\n\
                  ## Steps\n\n1. first\n2. second\n\n- bullet\n\n\
                  See [the docs](https://docs.example.com/reads).\n\n\
                  ```\nSELECT 1;\nSELECT 2;\n```\n";

        export_docx(md, &out).expect("export");

        let xml = document_xml(&out);
        assert!(xml.contains("Scaling Reads"));
        assert!(xml.contains("Heading1"));
        assert!(xml.contains("Heading2"));
        assert!(xml.contains("1. "));
        assert!(xml.contains("2. "));
        assert!(xml.contains("\u{2022} "));
        assert!(xml.contains("the docs"));
        assert!(xml.contains("SELECT 2;"));
        assert!(xml.contains(MONO_FONT));
    }

    #[test]
    fn failure_markers_render_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("post.docx");
        export_docx(
            "Intro\n\n*[Image generation failed: quota exceeded]*\n",
            &out,
        )
        .expect("export");

        let xml = document_xml(&out);
        assert!(xml.contains("[Image generation failed: quota exceeded]"));
    }

    #[test]
    fn soft_breaks_join_lines_into_one_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("post.docx");
        export_docx("first line\nsecond [line]\n", &out).expect("export");

        assert!(document_xml(&out).contains("first line second [line]"));
    }

    #[test]
    fn embeds_local_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let img = dir.path().join("blog_image_1.png");
        std::fs::write(&img, TINY_PNG).expect("write png");
        let out = dir.path().join("post.docx");

        export_docx(&format!("![A diagram...]({})\n", img.display()), &out).expect("export");

        assert!(
            archive_entries(&out)
                .iter()
                .any(|name| name.starts_with("word/media/"))
        );
        assert!(!document_xml(&out).contains("[Image: "));
    }

    #[test]
    fn missing_image_falls_back_to_alt_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("post.docx");
        export_docx("![Cluster layout...](does/not/exist.png)\n", &out).expect("export");

        assert!(document_xml(&out).contains("[Image: Cluster layout...]"));
    }

    #[test]
    fn png_dimensions_reads_ihdr() {
        assert_eq!(png_dimensions(TINY_PNG), Some((1, 1)));
        assert_eq!(png_dimensions(b"GIF89a not a png at all"), None);
    }

    #[test]
    fn wide_images_are_scaled_to_page_width() {
        assert_eq!(fit_width(100, 50), (952_500, 476_250));
        let (cx, cy) = fit_width(1152, 576);
        assert_eq!(cx, 5_486_400);
        assert_eq!(cy, 2_743_200);
    }
}
