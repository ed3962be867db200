use crate::models::{ClippingEntry, ClippingKind, Library, ParsedClipping};

/// Line the Kindle firmware writes between two clippings.
pub const ENTRY_DELIMITER: &str = "==========";

const DATE_MARKER: &str = "Added on";
const PAGE_MARKER: &str = "page";
const LOCATION_MARKER: &str = "location";

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    MalformedEntry(String),
    UnrecognizedMetadata(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedEntry(details) => {
                write!(f, "Malformed clipping: {}", details)
            }
            ParseError::UnrecognizedMetadata(line) => {
                write!(f, "Unrecognized clipping metadata: '{}'", line)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Receives the entries the aggregator drops.
pub trait ParseListener {
    fn skipped(&mut self, entry: &ClippingEntry<'_>, error: &ParseError);

    fn bookmark(&mut self, _entry: &ClippingEntry<'_>) {}
}

pub struct NoopListener;

impl ParseListener for NoopListener {
    fn skipped(&mut self, _entry: &ClippingEntry<'_>, _error: &ParseError) {}
}

/// Forwards dropped entries to the `log` facade.
pub struct LogListener;

impl ParseListener for LogListener {
    fn skipped(&mut self, entry: &ClippingEntry<'_>, error: &ParseError) {
        log::warn!("Skipping clipping #{}: {}", entry.ordinal + 1, error);
    }

    fn bookmark(&mut self, entry: &ClippingEntry<'_>) {
        log::debug!("Ignoring bookmark at clipping #{}", entry.ordinal + 1);
    }
}

pub fn parse_clippings(text: &str) -> Library {
    parse_clippings_with(text, &mut NoopListener)
}

pub fn parse_clippings_with(text: &str, listener: &mut dyn ParseListener) -> Library {
    let mut library = Library::new();

    for entry in split_entries(text) {
        match parse_clipping(entry.text) {
            Ok(Some(clipping)) => library.add(clipping),
            Ok(None) => listener.bookmark(&entry),
            Err(e) => listener.skipped(&entry, &e),
        }
    }

    library
}

/// Splits the export on the delimiter line, dropping blank blocks.
/// Ordinals count the raw blocks, so they stay stable across blanks.
pub fn split_entries(text: &str) -> Vec<ClippingEntry<'_>> {
    text.split(ENTRY_DELIMITER)
        .enumerate()
        .filter(|(_, block)| !block.trim().is_empty())
        .map(|(ordinal, text)| ClippingEntry { ordinal, text })
        .collect()
}

/// Parses one block. `Ok(None)` means the block is a bookmark.
pub fn parse_clipping(block: &str) -> Result<Option<ParsedClipping>, ParseError> {
    // Only the line break left by the delimiter is dropped; a blank first
    // line means the title is missing.
    let block = block
        .strip_prefix("\r\n")
        .or_else(|| block.strip_prefix('\n'))
        .unwrap_or(block);
    let lines: Vec<&str> = block.trim_end().lines().collect();

    if lines.len() < 2 {
        return Err(ParseError::MalformedEntry(format!(
            "expected a title and a metadata line, found {} line(s)",
            lines.len()
        )));
    }

    let (title, author) = split_title_and_author(lines[0]);
    if title.is_empty() {
        return Err(ParseError::MalformedEntry("empty title line".to_string()));
    }

    if lines[1].trim().is_empty() {
        return Err(ParseError::MalformedEntry("missing metadata line".to_string()));
    }

    let metadata = lines[1].trim().trim_start_matches('-').trim();
    let segments: Vec<&str> = metadata
        .split(|c: char| c == '|' || c == '·')
        .map(str::trim)
        .collect();

    let kind = match classify(segments[0]) {
        Some(Kind::Bookmark) => return Ok(None),
        Some(Kind::Highlight) => ClippingKind::Highlight,
        Some(Kind::Note) => ClippingKind::Note,
        None => return Err(ParseError::UnrecognizedMetadata(metadata.to_string())),
    };

    let mut page = None;
    let mut location = None;
    let mut date_added = None;
    let mut date_seen = false;

    for segment in &segments {
        if let Some(pos) = find_ignore_case(segment, DATE_MARKER) {
            if !date_seen {
                date_added = non_empty(&segment[pos + DATE_MARKER.len()..]);
                date_seen = true;
            }
            continue;
        }
        if page.is_none() {
            page = value_after(segment, PAGE_MARKER);
        }
        if location.is_none() {
            location = value_after(segment, LOCATION_MARKER);
        }
    }

    let body = lines[2..].join("\n").trim().to_string();

    Ok(Some(ParsedClipping {
        title,
        author,
        kind,
        page,
        location,
        date_added,
        body,
    }))
}

enum Kind {
    Highlight,
    Note,
    Bookmark,
}

fn classify(segment: &str) -> Option<Kind> {
    if find_ignore_case(segment, "highlight").is_some() {
        Some(Kind::Highlight)
    } else if find_ignore_case(segment, "note").is_some() {
        Some(Kind::Note)
    } else if find_ignore_case(segment, "bookmark").is_some() {
        Some(Kind::Bookmark)
    } else {
        None
    }
}

/// "Title (Author)" -> ("Title", Some("Author")). Splits on the last '(',
/// so parenthesised series names stay in the title.
fn split_title_and_author(line: &str) -> (String, Option<String>) {
    let line = line.trim_start_matches('\u{feff}').trim();

    if line.ends_with(')') {
        if let Some(open) = line.rfind('(') {
            let title = line[..open].trim().to_string();
            let author = non_empty(&line[open + 1..line.len() - 1]);
            return (title, author);
        }
    }

    (line.to_string(), None)
}

fn value_after(segment: &str, marker: &str) -> Option<String> {
    let pos = find_ignore_case(segment, marker)?;
    non_empty(&segment[pos + marker.len()..])
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// Markers are ASCII, so any match offset is a char boundary.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
