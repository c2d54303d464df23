//! Sortable index construction and page extraction.
//!
//! Indexes are rebuilt from the live record map on every query and never
//! maintained incrementally, so a query always reflects current state.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// A sortable index key with explicit open-range sentinels.
///
/// Total order: `Min < Number(_) < String(_) < Max`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IndexKey {
    Min,
    Number(f64),
    String(String),
    Max,
}

impl IndexKey {
    fn rank(&self) -> u8 {
        match self {
            Self::Min => 0,
            Self::Number(_) => 1,
            Self::String(_) => 2,
            Self::Max => 3,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => collate(a, b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for IndexKey {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for IndexKey {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Min,
            Value::Bool(b) => Self::Number(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => n.as_f64().map_or(Self::Min, Self::Number),
            Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

/// Locale-style string collation.
///
/// Primary: case-folded text. Tertiary: at the first position differing
/// only by case, lowercase sorts first. Code-point order breaks any
/// remaining tie so the order stays total.
pub fn collate(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded
        .then_with(|| case_order(a, b))
        .then_with(|| a.cmp(b))
}

fn case_order(a: &str, b: &str) -> Ordering {
    for (x, y) in a.chars().zip(b.chars()) {
        if x == y {
            continue;
        }
        match (x.is_lowercase(), y.is_lowercase()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    /// Compare two keys in this direction's sort order.
    pub fn compare(self, a: &IndexKey, b: &IndexKey) -> Ordering {
        match self {
            Self::Ascending => a.cmp(b),
            Self::Descending => b.cmp(a),
        }
    }

    fn open_bounds(self) -> (IndexKey, IndexKey) {
        match self {
            Self::Ascending => (IndexKey::Min, IndexKey::Max),
            Self::Descending => (IndexKey::Max, IndexKey::Min),
        }
    }
}

/// One row of an index. A key index has one per record; a view index has
/// whatever the view's map function emitted.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: IndexKey,
    pub value: Option<Value>,
    pub document_key: String,
}

/// One row of a query result, optionally hydrated with its source record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexItem<R> {
    pub key: IndexKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub document_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<R>,
}

/// A page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage<R> {
    pub items: Vec<IndexItem<R>>,
    /// Where the next page starts, or `None` when nothing further matches.
    pub exclusive_end_index: Option<usize>,
    /// Size of the index the page was cut from.
    pub total_rows: usize,
}

impl<R> QueryPage<R> {
    /// Keys of the returned items that are plain strings.
    pub fn keys(&self) -> Vec<&str> {
        self.items.iter().filter_map(|item| item.key.as_str()).collect()
    }
}

pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Query parameters shared by key and view queries.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Exact-match key. Overrides `start_key`/`end_key` when set.
    pub key: Option<IndexKey>,
    pub start_key: Option<IndexKey>,
    pub end_key: Option<IndexKey>,
    pub limit: usize,
    pub inclusive_start_index: usize,
    pub descending: bool,
    pub include_documents: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            key: None,
            start_key: None,
            end_key: None,
            limit: DEFAULT_QUERY_LIMIT,
            inclusive_start_index: 0,
            descending: false,
            include_documents: false,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<IndexKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn start_key(mut self, key: impl Into<IndexKey>) -> Self {
        self.start_key = Some(key.into());
        self
    }

    pub fn end_key(mut self, key: impl Into<IndexKey>) -> Self {
        self.end_key = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn starting_at(mut self, index: usize) -> Self {
        self.inclusive_start_index = index;
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn include_documents(mut self, include: bool) -> Self {
        self.include_documents = include;
        self
    }

    pub fn direction(&self) -> Direction {
        if self.descending {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }

    /// Effective inclusive `[start, end]` bounds in query direction.
    pub fn bounds(&self) -> (IndexKey, IndexKey) {
        if let Some(key) = &self.key {
            return (key.clone(), key.clone());
        }
        let (open_start, open_end) = self.direction().open_bounds();
        (
            self.start_key.clone().unwrap_or(open_start),
            self.end_key.clone().unwrap_or(open_end),
        )
    }
}

/// Sort an index in place for the given direction.
pub fn sort_index(index: &mut [IndexEntry], direction: Direction) {
    index.sort_by(|a, b| direction.compare(&a.key, &b.key));
}

/// Entries selected for one page plus the resume position.
#[derive(Debug, Clone)]
pub struct IndexSlice {
    pub entries: Vec<IndexEntry>,
    pub exclusive_end_index: Option<usize>,
}

/// Scan a sorted index forward from `inclusive_start_index`, collecting up
/// to `limit` entries whose key lies within `[start, end]`.
///
/// An entry past `end` stops the scan, since nothing after it can match.
pub fn get_index_items_left_to_right(
    index: &[IndexEntry],
    inclusive_start_index: usize,
    limit: usize,
    start: &IndexKey,
    end: &IndexKey,
    direction: Direction,
) -> IndexSlice {
    // A zero limit can never advance, so it offers no continuation.
    if limit == 0 || inclusive_start_index >= index.len() {
        return IndexSlice {
            entries: Vec::new(),
            exclusive_end_index: None,
        };
    }

    let past_end = |entry: &IndexEntry| direction.compare(&entry.key, end) == Ordering::Greater;
    let mut entries = Vec::new();
    let mut cursor = inclusive_start_index;
    while cursor < index.len() && entries.len() < limit {
        let entry = &index[cursor];
        if past_end(entry) {
            return IndexSlice {
                entries,
                exclusive_end_index: None,
            };
        }
        if direction.compare(start, &entry.key) != Ordering::Greater {
            entries.push(entry.clone());
        }
        cursor += 1;
    }

    let exclusive_end_index = match index.get(cursor) {
        Some(next) if !past_end(next) => Some(cursor),
        _ => None,
    };
    IndexSlice {
        entries,
        exclusive_end_index,
    }
}
