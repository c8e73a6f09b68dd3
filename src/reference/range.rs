//! A1 cell and range references.
//!
//! Columns are 0-indexed internally (`A` = 0); rows keep their 1-based A1
//! numbering. A range's end row may be open (`D2:D`, `F:F`), meaning "to
//! the last used row", which the executor resolves against live data.

use std::fmt;

use crate::error::RangeParseError;

pub const MAX_COLS: u32 = 16_384;
pub const MAX_ROWS: u32 = 1_048_576;

/// Column index → letters (`0` → `A`, `27` → `AB`).
pub fn col_to_name(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

/// Column letters → index, case-insensitive.
pub fn name_to_col(name: &str) -> Result<u32, RangeParseError> {
    if name.is_empty() {
        return Err(RangeParseError::InvalidColumn(name.to_string()));
    }
    let mut col: u32 = 0;
    for b in name.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(RangeParseError::InvalidColumn(name.to_string()));
        }
        let v = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .filter(|c| *c <= MAX_COLS)
            .ok_or_else(|| RangeParseError::InvalidColumn(name.to_string()))?;
    }
    Ok(col - 1)
}

/// Split `Sheet!A1:B2` into its optional sheet and the local reference.
pub fn split_sheet(reference: &str) -> (Option<&str>, &str) {
    match reference.rsplit_once('!') {
        Some((sheet, local)) => (Some(sheet.trim_matches('\'')), local),
        None => (None, reference),
    }
}

// ---------------------------------------------------------------------------
// CellRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub col: u32,
    pub row: u32,
}

impl CellRef {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// Parse `A1` or `$A$1`.
    pub fn parse(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        match parse_part(s)? {
            (col, Some(row)) => Ok(Self { col, row }),
            (_, None) => Err(RangeParseError::InvalidRow(s.to_string())),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_name(self.col), self.row)
    }
}

/// `$?LETTERS$?DIGITS?` → (column, optional row).
fn parse_part(s: &str) -> Result<(u32, Option<u32>), RangeParseError> {
    if s.is_empty() {
        return Err(RangeParseError::Empty);
    }
    let s = s.strip_prefix('$').unwrap_or(s);
    let letters_end = s
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let col = name_to_col(&s[..letters_end])?;

    let rest = &s[letters_end..];
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    if rest.is_empty() {
        return Ok((col, None));
    }
    if !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeParseError::Malformed(s.to_string()));
    }
    let row: u32 = rest
        .parse()
        .map_err(|_| RangeParseError::InvalidRow(s.to_string()))?;
    if row == 0 || row > MAX_ROWS {
        return Err(RangeParseError::InvalidRow(s.to_string()));
    }
    Ok((col, Some(row)))
}

// ---------------------------------------------------------------------------
// CellRange
// ---------------------------------------------------------------------------

/// Inclusive rectangular range, normalized so start ≤ end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start_col: u32,
    pub end_col: u32,
    pub start_row: u32,
    /// `None` = open to the last row.
    pub end_row: Option<u32>,
}

impl CellRange {
    pub fn new(start: CellRef, end: CellRef) -> Self {
        Self {
            start_col: start.col.min(end.col),
            end_col: start.col.max(end.col),
            start_row: start.row.min(end.row),
            end_row: Some(start.row.max(end.row)),
        }
    }

    /// Single column from `start_row` to the last row (`D2:D`).
    pub fn column_from(col: u32, start_row: u32) -> Self {
        Self {
            start_col: col,
            end_col: col,
            start_row,
            end_row: None,
        }
    }

    /// Row `row`, columns `0..width` (`A1:C1`).
    pub fn row_span(row: u32, width: u32) -> Self {
        Self::new(CellRef::new(0, row), CellRef::new(width.saturating_sub(1), row))
    }

    /// Parse `A1`, `A2:C10`, `F:F`, `D2:D`, optionally sheet-qualified.
    pub fn parse(reference: &str) -> Result<Self, RangeParseError> {
        let (_, local) = split_sheet(reference.trim());
        let local = local.trim();
        if local.is_empty() {
            return Err(RangeParseError::Empty);
        }

        let Some((left, right)) = local.split_once(':') else {
            let cell = CellRef::parse(local)?;
            return Ok(Self::new(cell, cell));
        };

        let (c1, r1) = parse_part(left.trim())?;
        let (c2, r2) = parse_part(right.trim())?;
        let (start_row, end_row) = match (r1, r2) {
            (Some(a), Some(b)) => (a.min(b), Some(a.max(b))),
            (Some(a), None) => (a, None),
            (None, None) => (1, None),
            (None, Some(_)) => return Err(RangeParseError::Malformed(local.to_string())),
        };
        Ok(Self {
            start_col: c1.min(c2),
            end_col: c1.max(c2),
            start_row,
            end_row,
        })
    }

    pub fn is_bounded(&self) -> bool {
        self.end_row.is_some()
    }

    pub fn width(&self) -> u32 {
        self.end_col - self.start_col + 1
    }

    pub fn row_count(&self) -> Option<u32> {
        self.end_row.map(|end| end - self.start_row + 1)
    }

    pub fn cell_count(&self) -> Option<u64> {
        self.row_count()
            .map(|rows| u64::from(rows) * u64::from(self.width()))
    }

    fn last_row(&self) -> u32 {
        self.end_row.unwrap_or(MAX_ROWS)
    }

    /// Whether the two ranges share at least one cell.
    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.start_col <= other.end_col
            && other.start_col <= self.end_col
            && self.start_row <= other.last_row()
            && other.start_row <= self.last_row()
    }

    /// Split into at most `parts` contiguous row bands, top to bottom.
    ///
    /// Open ranges cannot be split and come back whole.
    pub fn split_rows(&self, parts: u32) -> Vec<CellRange> {
        let Some(rows) = self.row_count() else {
            return vec![*self];
        };
        let parts = parts.clamp(1, rows);
        let base = rows / parts;
        let extra = rows % parts;

        let mut out = Vec::with_capacity(parts as usize);
        let mut start = self.start_row;
        for i in 0..parts {
            let len = base + u32::from(i < extra);
            out.push(CellRange {
                start_row: start,
                end_row: Some(start + len - 1),
                ..*self
            });
            start += len;
        }
        out
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c1 = col_to_name(self.start_col);
        let c2 = col_to_name(self.end_col);
        match self.end_row {
            Some(end) if self.start_col == self.end_col && self.start_row == end => {
                write!(f, "{c1}{end}")
            }
            Some(end) => write!(f, "{c1}{}:{c2}{end}", self.start_row),
            None if self.start_row == 1 => write!(f, "{c1}:{c2}"),
            None => write!(f, "{c1}{}:{c2}", self.start_row),
        }
    }
}

impl std::str::FromStr for CellRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
