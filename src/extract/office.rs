//! Text runs of Office Open XML documents (DOCX and PPTX).

use std::io::{Cursor, Read};
use zip::ZipArchive;

const DOCX_BODY: &str = "word/document.xml";
const SLIDE_PREFIX: &str = "ppt/slides/slide";

/// Paragraph text of a word-processor document, one paragraph per line.
pub(super) fn read_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open(bytes)?;
    let xml = read_entry(&mut archive, DOCX_BODY)?;
    Ok(xml_text(&xml, "w:t", "w:p"))
}

/// Text of every slide in slide order, one shape paragraph per line.
pub(super) fn read_pptx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open(bytes)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name.strip_prefix(SLIDE_PREFIX)?.strip_suffix(".xml")?;
            Some((number.parse().ok()?, name.to_string()))
        })
        .collect();
    slides.sort();

    let mut text = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_entry(&mut archive, &name)?;
        text.push(xml_text(&xml, "a:t", "a:p"));
    }
    Ok(text.join("\n"))
}

fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, String> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("not an Office Open XML package: {}", e))
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| format!("missing {}: {}", name, e))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| format!("failed to read {}: {}", name, e))?;
    Ok(xml)
}

/// Concatenate the character data of `text_tag` elements, ending a line at
/// every closing `para_tag`.
fn xml_text(xml: &str, text_tag: &str, para_tag: &str) -> String {
    let mut out = String::new();
    let mut in_text = false;
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        if in_text {
            out.push_str(&unescape(&rest[..open]));
        }
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let tag = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        let self_closing = tag.ends_with('/');
        let (closing, tag) = match tag.strip_prefix('/') {
            Some(name) => (true, name),
            None => (false, tag),
        };
        let name = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");

        if name == text_tag && !self_closing {
            in_text = !closing;
        } else if name == para_tag && closing {
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
