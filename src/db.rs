use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug)]
pub enum DbError {
    ConnectionFailed(String),
    QueryFailed(String),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::ConnectionFailed(e) => write!(f, "Failed to connect to database: {}", e),
            DbError::QueryFailed(e) => write!(f, "Query failed: {}", e),
        }
    }
}

impl std::error::Error for DbError {}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::QueryFailed(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Quote,
}

impl BlockKind {
    fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Quote => "quote",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredBook {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub highlights: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBook<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub highlights: usize,
    pub last_highlighted: NaiveDateTime,
    pub last_synced: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub highlights: usize,
    pub last_highlighted: NaiveDateTime,
    pub last_synced: NaiveDateTime,
}

/// A database of book documents, each holding an ordered list of content blocks.
pub trait DocumentStore {
    fn find_book(&self, title: &str) -> Result<Option<StoredBook>, DbError>;

    fn block_texts(&self, book_id: i64) -> Result<Vec<String>, DbError>;

    fn create_book(&mut self, book: &NewBook<'_>) -> Result<i64, DbError>;

    fn append_blocks(&mut self, book_id: i64, blocks: &[Block]) -> Result<(), DbError>;

    fn update_book(&mut self, book_id: i64, update: &BookUpdate) -> Result<(), DbError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                author TEXT NOT NULL,
                highlights INTEGER NOT NULL DEFAULT 0,
                last_highlighted TEXT NOT NULL,
                last_synced TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blocks (
                id INTEGER PRIMARY KEY,
                book_id INTEGER NOT NULL REFERENCES books(id),
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                position INTEGER NOT NULL
            );",
        )?;

        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DocumentStore for SqliteStore {
    fn find_book(&self, title: &str) -> Result<Option<StoredBook>, DbError> {
        let book = self
            .conn
            .query_row(
                "SELECT id, title, author, highlights FROM books WHERE title = ?1",
                params![title],
                |row| {
                    Ok(StoredBook {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        author: row.get(2)?,
                        highlights: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(book)
    }

    fn block_texts(&self, book_id: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT content FROM blocks WHERE book_id = ?1 ORDER BY position")?;

        let texts = stmt
            .query_map(params![book_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(texts)
    }

    fn create_book(&mut self, book: &NewBook<'_>) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO books (title, author, highlights, last_highlighted, last_synced)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                book.title,
                book.author,
                book.highlights as i64,
                book.last_highlighted.format(TIMESTAMP_FORMAT).to_string(),
                book.last_synced.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn append_blocks(&mut self, book_id: i64, blocks: &[Block]) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;

        let mut next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM blocks WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )?;

        for block in blocks {
            tx.execute(
                "INSERT INTO blocks (book_id, kind, content, position) VALUES (?1, ?2, ?3, ?4)",
                params![book_id, block.kind.as_str(), block.content, next],
            )?;
            next += 1;
        }

        tx.commit()?;
        Ok(())
    }

    fn update_book(&mut self, book_id: i64, update: &BookUpdate) -> Result<(), DbError> {
        let rows = self.conn.execute(
            "UPDATE books SET highlights = ?1, last_highlighted = ?2, last_synced = ?3
             WHERE id = ?4",
            params![
                update.highlights as i64,
                update.last_highlighted.format(TIMESTAMP_FORMAT).to_string(),
                update.last_synced.format(TIMESTAMP_FORMAT).to_string(),
                book_id,
            ],
        )?;

        if rows == 0 {
            return Err(DbError::QueryFailed(format!("no book with id {}", book_id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn new_book(title: &str) -> NewBook<'_> {
        NewBook {
            title,
            author: "Frank Herbert",
            highlights: 2,
            last_highlighted: at(1),
            last_synced: at(2),
        }
    }

    fn paragraph(content: &str) -> Block {
        Block {
            kind: BlockKind::Paragraph,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_open_creates_tables() {
        let store = SqliteStore::open(Path::new(":memory:")).unwrap();

        let count: i32 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('books', 'blocks')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 2);
    }

    #[test]
    fn test_create_and_find_book() {
        let mut store = SqliteStore::open(Path::new(":memory:")).unwrap();

        let id = store.create_book(&new_book("Dune")).unwrap();
        let found = store.find_book("Dune").unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.author, "Frank Herbert");
        assert_eq!(found.highlights, 2);
        assert_eq!(store.find_book("Emma").unwrap(), None);
    }

    #[test]
    fn test_duplicate_title_rejected() {
        let mut store = SqliteStore::open(Path::new(":memory:")).unwrap();

        store.create_book(&new_book("Dune")).unwrap();
        let second = store.create_book(&new_book("Dune"));

        assert!(matches!(second, Err(DbError::QueryFailed(_))));
    }

    #[test]
    fn test_append_blocks_keeps_order() {
        let mut store = SqliteStore::open(Path::new(":memory:")).unwrap();
        let id = store.create_book(&new_book("Dune")).unwrap();

        store.append_blocks(id, &[paragraph("one"), paragraph("two")]).unwrap();
        store
            .append_blocks(
                id,
                &[Block {
                    kind: BlockKind::Quote,
                    content: "three".to_string(),
                }],
            )
            .unwrap();

        assert_eq!(store.block_texts(id).unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_update_book() {
        let mut store = SqliteStore::open(Path::new(":memory:")).unwrap();
        let id = store.create_book(&new_book("Dune")).unwrap();

        store
            .update_book(
                id,
                &BookUpdate {
                    highlights: 5,
                    last_highlighted: at(3),
                    last_synced: at(4),
                },
            )
            .unwrap();

        let found = store.find_book("Dune").unwrap().unwrap();
        assert_eq!(found.highlights, 5);

        let synced: String = store
            .connection()
            .query_row("SELECT last_synced FROM books WHERE id = ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(synced, "2024-01-04T10:30:00");
    }

    #[test]
    fn test_update_missing_book() {
        let mut store = SqliteStore::open(Path::new(":memory:")).unwrap();

        let result = store.update_book(
            42,
            &BookUpdate {
                highlights: 1,
                last_highlighted: at(1),
                last_synced: at(1),
            },
        );

        assert!(matches!(result, Err(DbError::QueryFailed(_))));
    }
}
