//! Descriptive metadata source.
//!
//! Metadata arrives as CSV with up to three header rows (the FMA
//! `tracks.csv` layout). Header levels are flattened into single column
//! names, then each logical field is resolved through an alias list.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tunesense_core::{Error, Result, TrackId, TrackMetadata};

/// Maximum number of header rows in a metadata file.
pub const MAX_HEADER_ROWS: usize = 3;

/// Split CSV text into records (RFC 4180 quoting, `\n` or `\r\n` line ends).
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(Error::MalformedMetadata(format!(
            "unterminated quoted field in record {}",
            records.len() + 1
        )));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Blank lines carry no data
    records.retain(|r| !(r.len() == 1 && r[0].trim().is_empty()));
    Ok(records)
}

/// Flatten hierarchical header rows into one lowercase name per column.
///
/// Non-empty levels are joined with `_`.
pub fn flatten_header(rows: &[Vec<String>]) -> Vec<String> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join("_")
                .to_lowercase()
        })
        .collect()
}

/// Metadata file before column resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMetadata {
    /// Flattened column names
    pub columns: Vec<String>,
    /// Data records, one cell per column (short records are padded)
    pub rows: Vec<Vec<String>>,
}

impl RawMetadata {
    /// Parse CSV text, detecting 1–3 header rows.
    ///
    /// The first record is always a header. Hierarchical headers leave the
    /// first cell empty on every level but the last, so a further record
    /// (up to three in total) counts as a header only while the previous
    /// level's first cell is empty and its own is not a track identifier.
    /// Every other record is data; unreadable identifiers are dropped later.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let records = parse_csv(text)?;
        if records.is_empty() {
            return Err(Error::MalformedMetadata("metadata file is empty".to_string()));
        }

        // A header level with an empty first cell has not named the id
        // column yet, so the next record continues the header unless it
        // starts with an identifier.
        let first_cell_empty = |r: &Vec<String>| r.first().map_or(true, |cell| cell.trim().is_empty());
        let mut header_rows = 1;
        while header_rows < MAX_HEADER_ROWS.min(records.len())
            && first_cell_empty(&records[header_rows - 1])
            && records[header_rows]
                .first()
                .map_or(true, |cell| TrackId::coerce(cell).is_none())
        {
            header_rows += 1;
        }

        let columns = flatten_header(&records[..header_rows]);
        let rows = records[header_rows..]
            .iter()
            .map(|r| {
                let mut row = r.clone();
                row.resize(columns.len().max(r.len()), String::new());
                row
            })
            .collect();

        debug!(header_rows, columns = columns.len(), "Parsed metadata header");
        Ok(Self { columns, rows })
    }

    /// Read a CSV file.
    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_csv_str(&text)
    }
}

/// Candidate column keywords for one logical field, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAliases {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
}

impl FieldAliases {
    /// First column containing the earliest alias that matches any column.
    pub fn resolve(&self, columns: &[String]) -> Option<usize> {
        self.aliases
            .iter()
            .find_map(|alias| columns.iter().position(|c| c.contains(alias)))
    }
}

pub const ID_ALIASES: FieldAliases = FieldAliases {
    field: "id",
    aliases: &["track_id", "id"],
};
pub const TITLE_ALIASES: FieldAliases = FieldAliases {
    field: "title",
    aliases: &["track_title", "title"],
};
pub const ARTIST_ALIASES: FieldAliases = FieldAliases {
    field: "artist",
    aliases: &["artist_name", "artist"],
};
pub const GENRE_ALIASES: FieldAliases = FieldAliases {
    field: "genre",
    aliases: &["genre_top", "top_genre", "genre"],
};

/// Resolved positions of the logical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub id: usize,
    pub title: usize,
    pub artist: usize,
    pub genre: usize,
}

impl ColumnMapping {
    /// Resolve every field once. The identifier falls back to the first column.
    pub fn resolve(columns: &[String]) -> Result<Self> {
        let title = TITLE_ALIASES.resolve(columns);
        let artist = ARTIST_ALIASES.resolve(columns);
        let genre = GENRE_ALIASES.resolve(columns);

        match (title, artist, genre) {
            (Some(title), Some(artist), Some(genre)) => Ok(Self {
                id: ID_ALIASES.resolve(columns).unwrap_or(0),
                title,
                artist,
                genre,
            }),
            _ => {
                let unresolved = [(&TITLE_ALIASES, title), (&ARTIST_ALIASES, artist), (&GENRE_ALIASES, genre)]
                    .iter()
                    .filter(|(_, found)| found.is_none())
                    .map(|(aliases, _)| aliases.field.to_string())
                    .collect();
                Err(Error::SchemaResolution {
                    unresolved,
                    available: columns.to_vec(),
                })
            }
        }
    }
}

/// Counts from resolving a metadata source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReport {
    /// Records kept
    pub rows: usize,
    /// Records dropped because the identifier could not be coerced
    pub dropped: usize,
    /// Later records repeating an identifier (first one wins)
    pub duplicates: usize,
}

/// Identifier → descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataTable {
    entries: BTreeMap<TrackId, TrackMetadata>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve columns and coerce identifiers.
    pub fn resolve(raw: &RawMetadata) -> Result<(Self, MetadataReport)> {
        let mapping = ColumnMapping::resolve(&raw.columns)?;
        info!(
            id = %raw.columns[mapping.id],
            title = %raw.columns[mapping.title],
            artist = %raw.columns[mapping.artist],
            genre = %raw.columns[mapping.genre],
            "Resolved metadata columns"
        );

        let mut table = Self::new();
        let mut report = MetadataReport::default();
        let cell = |row: &[String], col: usize| row.get(col).map(|s| s.trim().to_string()).unwrap_or_default();

        for row in &raw.rows {
            let Some(track_id) = row.get(mapping.id).and_then(|id| TrackId::coerce(id)) else {
                report.dropped += 1;
                continue;
            };
            if table.entries.contains_key(&track_id) {
                report.duplicates += 1;
                continue;
            }
            table.entries.insert(
                track_id,
                TrackMetadata::new(
                    cell(row, mapping.title),
                    cell(row, mapping.artist),
                    cell(row, mapping.genre),
                ),
            );
        }

        report.rows = table.len();
        if report.dropped > 0 {
            warn!(dropped = report.dropped, "Dropped metadata rows with unreadable identifiers");
        }
        if report.duplicates > 0 {
            warn!(duplicates = report.duplicates, "Ignored repeated metadata identifiers");
        }
        Ok((table, report))
    }

    /// Read and resolve a CSV file.
    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<(Self, MetadataReport)> {
        Self::resolve(&RawMetadata::from_csv_file(path)?)
    }

    pub fn insert(&mut self, track_id: TrackId, metadata: TrackMetadata) {
        self.entries.insert(track_id, metadata);
    }

    pub fn get(&self, track_id: TrackId) -> Option<&TrackMetadata> {
        self.entries.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &TrackMetadata)> {
        self.entries.iter().map(|(id, m)| (*id, m))
    }
}
