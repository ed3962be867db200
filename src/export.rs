use crate::db::{Block, BlockKind, BookUpdate, DbError, DocumentStore, NewBook};
use crate::models::{parse_added_on, BookAggregate, Highlight, Library};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::path::Path;

const LOCATION_LABEL: &str = "Location: ";

#[derive(Debug)]
pub enum ExportError {
    Store(DbError),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Store(e) => write!(f, "Store error: {}", e),
            ExportError::Io(e) => write!(f, "Failed to write export: {}", e),
            ExportError::Json(e) => write!(f, "Failed to serialize clippings: {}", e),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Store(e) => Some(e),
            ExportError::Io(e) => Some(e),
            ExportError::Json(e) => Some(e),
        }
    }
}

impl From<DbError> for ExportError {
    fn from(e: DbError) -> Self {
        ExportError::Store(e)
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub enable_location: bool,
    pub enable_highlight_date: bool,
    pub separate_blocks: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            enable_location: true,
            enable_highlight_date: true,
            separate_blocks: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    Created(usize),
    Updated(usize),
    Unchanged,
}

#[derive(Debug, Default, PartialEq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub highlights_added: usize,
}

impl SyncStats {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Created(n) => {
                self.created += 1;
                self.highlights_added += n;
            }
            SyncOutcome::Updated(n) => {
                self.updated += 1;
                self.highlights_added += n;
            }
            SyncOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Renders one highlight the way it is stored in a book's content blocks.
pub fn format_highlight(highlight: &Highlight, options: &ExportOptions) -> String {
    let mut out = String::new();

    if highlight.is_note {
        out.push_str("> NOTE: \n");
    }
    out.push_str(&highlight.text);
    out.push('\n');

    let mut details = Vec::new();
    if options.enable_location {
        if let Some(page) = &highlight.page {
            details.push(format!("Page: {}", page));
        }
        if let Some(location) = &highlight.location {
            details.push(format!("{}{}", LOCATION_LABEL, location));
        }
    }
    if options.enable_highlight_date {
        if let Some(date) = &highlight.date_added {
            details.push(format!("Date Added: {}", date));
        }
    }
    out.push_str(&details.join(", "));

    format!("{}\n\n", out.trim())
}

/// The date string with the most recent timestamp. Dates that don't parse are ignored.
pub fn latest_date(highlights: &[Highlight]) -> Option<&str> {
    highlights
        .iter()
        .filter_map(|h| Some((h.added_on()?, h.date_added.as_deref()?)))
        .max_by_key(|(when, _)| *when)
        .map(|(_, raw)| raw)
}

/// Location string of a formatted highlight, used as its identity when syncing.
pub fn location_of(formatted: &str) -> Option<String> {
    formatted.lines().find_map(|line| {
        let start = line.find(LOCATION_LABEL)? + LOCATION_LABEL.len();
        let loc = line[start..].split(',').next().unwrap_or("").trim();
        Some(loc.to_string())
    })
}

fn stored_locations(texts: &[String]) -> HashSet<String> {
    texts
        .iter()
        .flat_map(|text| text.split("\n\n"))
        .filter_map(location_of)
        .collect()
}

fn to_blocks(formatted: &[String], options: &ExportOptions) -> Vec<Block> {
    if options.separate_blocks {
        formatted
            .iter()
            .map(|f| Block {
                kind: BlockKind::Quote,
                content: f.trim().to_string(),
            })
            .collect()
    } else {
        vec![Block {
            kind: BlockKind::Paragraph,
            content: formatted.concat(),
        }]
    }
}

fn last_highlighted_at(book: &BookAggregate, now: NaiveDateTime) -> NaiveDateTime {
    match latest_date(&book.highlights) {
        Some(date) => parse_added_on(date).unwrap_or(now),
        None => {
            if book.highlights.iter().any(|h| h.date_added.is_some()) {
                log::warn!("Invalid date format for '{}', using current date instead", book.title);
            }
            now
        }
    }
}

pub fn sync_book(
    store: &mut dyn DocumentStore,
    book: &BookAggregate,
    options: &ExportOptions,
    now: NaiveDateTime,
) -> Result<SyncOutcome, ExportError> {
    let existing = store.find_book(&book.title)?;

    if let Some(stored) = &existing {
        if stored.highlights == book.len() as i64 {
            log::info!("{} ({}): nothing to add", book.title, stored.author);
            return Ok(SyncOutcome::Unchanged);
        }
    }

    let known = match &existing {
        Some(stored) => match store.block_texts(stored.id) {
            Ok(texts) => stored_locations(&texts),
            Err(e) => {
                log::warn!("Could not retrieve existing highlights for '{}': {}", book.title, e);
                HashSet::new()
            }
        },
        None => HashSet::new(),
    };

    let fresh: Vec<String> = book
        .highlights
        .iter()
        .map(|h| format_highlight(h, options))
        .filter(|f| location_of(f).map_or(true, |loc| !known.contains(&loc)))
        .collect();

    log::info!("{} ({})", book.title, book.author_or_empty());

    if fresh.is_empty() {
        return Ok(SyncOutcome::Unchanged);
    }

    let blocks = to_blocks(&fresh, options);
    let last_highlighted = last_highlighted_at(book, now);

    match existing {
        None => {
            // The count is written only once the blocks are stored, so a
            // failed append is retried on the next run.
            let id = store.create_book(&NewBook {
                title: &book.title,
                author: book.author_or_empty(),
                highlights: 0,
                last_highlighted,
                last_synced: now,
            })?;
            store.append_blocks(id, &blocks)?;
            store.update_book(
                id,
                &BookUpdate {
                    highlights: book.len(),
                    last_highlighted,
                    last_synced: now,
                },
            )?;
            Ok(SyncOutcome::Created(fresh.len()))
        }
        Some(stored) => {
            store.append_blocks(stored.id, &blocks)?;
            store.update_book(
                stored.id,
                &BookUpdate {
                    highlights: book.len(),
                    last_highlighted,
                    last_synced: now,
                },
            )?;
            Ok(SyncOutcome::Updated(fresh.len()))
        }
    }
}

/// Syncs every book in title order. A failing book is logged and the run goes on.
pub fn export_library(
    store: &mut dyn DocumentStore,
    library: &Library,
    options: &ExportOptions,
    now: NaiveDateTime,
) -> SyncStats {
    log::info!("Initiating transfer of {} book(s)...", library.len());

    let mut stats = SyncStats::default();

    for book in library {
        match sync_book(store, book, options, now) {
            Ok(outcome) => {
                if let SyncOutcome::Created(n) | SyncOutcome::Updated(n) = outcome {
                    log::info!("{} notes/highlights added to '{}'", n, book.title);
                }
                stats.record(outcome);
            }
            Err(e) => {
                log::error!("Error processing book '{}': {}", book.title, e);
                stats.failed += 1;
            }
        }
    }

    stats
}

pub fn dump_json(library: &Library, path: &Path) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(library)?;
    std::fs::write(path, json)?;
    Ok(())
}
