use chrono::NaiveDateTime;
use serde::ser::{SerializeMap, SerializeStruct, SerializeTuple};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Date layouts written by Kindle firmware after "Added on".
const DATE_FORMATS: [&str; 2] = [
    "%A, %d %B %Y %I:%M:%S %p",
    "%A, %B %d, %Y %I:%M:%S %p",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClippingKind {
    Highlight,
    Note,
}

/// One raw block of the export, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippingEntry<'a> {
    pub ordinal: usize,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClipping {
    pub title: String,
    pub author: Option<String>,
    pub kind: ClippingKind,
    pub page: Option<String>,
    pub location: Option<String>,
    pub date_added: Option<String>,
    pub body: String,
}

impl ParsedClipping {
    pub fn is_note(&self) -> bool {
        self.kind == ClippingKind::Note
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub text: String,
    pub page: Option<String>,
    pub location: Option<String>,
    pub date_added: Option<String>,
    pub is_note: bool,
}

impl Highlight {
    pub fn added_on(&self) -> Option<NaiveDateTime> {
        self.date_added.as_deref().and_then(parse_added_on)
    }
}

impl From<ParsedClipping> for Highlight {
    fn from(clipping: ParsedClipping) -> Self {
        let is_note = clipping.is_note();
        Highlight {
            text: clipping.body,
            page: clipping.page,
            location: clipping.location,
            date_added: clipping.date_added,
            is_note,
        }
    }
}

pub fn parse_added_on(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookAggregate {
    pub title: String,
    pub author: Option<String>,
    pub highlights: Vec<Highlight>,
}

impl BookAggregate {
    pub fn len(&self) -> usize {
        self.highlights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty()
    }

    pub fn author_or_empty(&self) -> &str {
        self.author.as_deref().unwrap_or("")
    }
}

/// Books keyed by title, iterated in the order titles first appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    books: Vec<BookAggregate>,
    index: HashMap<String, usize>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the book with the same title; the first author seen wins.
    pub fn add(&mut self, clipping: ParsedClipping) {
        let idx = match self.index.get(&clipping.title) {
            Some(&idx) => idx,
            None => {
                let idx = self.books.len();
                self.books.push(BookAggregate {
                    title: clipping.title.clone(),
                    author: clipping.author.clone(),
                    highlights: Vec::new(),
                });
                self.index.insert(clipping.title.clone(), idx);
                idx
            }
        };

        self.books[idx].highlights.push(Highlight::from(clipping));
    }

    pub fn get(&self, title: &str) -> Option<&BookAggregate> {
        self.index.get(title).map(|&idx| &self.books[idx])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BookAggregate> {
        self.books.iter()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn highlight_count(&self) -> usize {
        self.books.iter().map(BookAggregate::len).sum()
    }
}

impl<'a> IntoIterator for &'a Library {
    type Item = &'a BookAggregate;
    type IntoIter = std::slice::Iter<'a, BookAggregate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// The JSON dump keeps the export's historical layout: a title-keyed object
// whose highlights are positional arrays with "" for missing fields.
impl Serialize for Highlight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(5)?;
        tuple.serialize_element(&self.text)?;
        tuple.serialize_element(self.page.as_deref().unwrap_or(""))?;
        tuple.serialize_element(self.location.as_deref().unwrap_or(""))?;
        tuple.serialize_element(self.date_added.as_deref().unwrap_or(""))?;
        tuple.serialize_element(&self.is_note)?;
        tuple.end()
    }
}

impl Serialize for BookAggregate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BookAggregate", 2)?;
        state.serialize_field("author", self.author_or_empty())?;
        state.serialize_field("highlights", &self.highlights)?;
        state.end()
    }
}

impl Serialize for Library {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.books.len()))?;
        for book in &self.books {
            map.serialize_entry(&book.title, book)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn clipping(title: &str, author: Option<&str>, body: &str) -> ParsedClipping {
        ParsedClipping {
            title: title.to_string(),
            author: author.map(String::from),
            kind: ClippingKind::Highlight,
            page: None,
            location: Some("10-12".to_string()),
            date_added: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_parse_added_on_day_month_year() {
        let parsed = parse_added_on("Monday, 1 January 2024 12:00:00 AM").unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_added_on_us_layout() {
        let parsed = parse_added_on("Sunday, March 3, 2024 9:15:42 PM").unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 3, 3)
            .unwrap()
            .and_hms_opt(21, 15, 42)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_added_on_garbage() {
        assert_eq!(parse_added_on("sometime last week"), None);
    }

    #[test]
    fn test_library_keeps_first_author() {
        let mut library = Library::new();
        library.add(clipping("Dune", Some("Frank Herbert"), "one"));
        library.add(clipping("Dune", Some("F. Herbert"), "two"));

        let book = library.get("Dune").unwrap();
        assert_eq!(book.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(book.len(), 2);
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_library_preserves_title_order() {
        let mut library = Library::new();
        library.add(clipping("B", None, "1"));
        library.add(clipping("A", None, "2"));
        library.add(clipping("B", None, "3"));

        let titles: Vec<&str> = library.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
        assert_eq!(library.highlight_count(), 3);
    }

    #[test]
    fn test_library_json_layout() {
        let mut library = Library::new();
        library.add(clipping("Dune", None, "Fear is the mind-killer."));

        let json = serde_json::to_value(&library).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "Dune": {
                    "author": "",
                    "highlights": [["Fear is the mind-killer.", "", "10-12", "", false]]
                }
            })
        );
    }
}
