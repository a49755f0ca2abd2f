//! Layout heuristics for locating tabular financial data in document text.
//!
//! Annual-report statements arrive as label-then-columns rows ("Total revenue
//! 61,858 51,728"). Rows are recognized by a textual label followed by at
//! least one numeric column; statement windows are anchored on section
//! keywords. When a window yields no parseable rows the caller falls back to
//! the LLM normalizer with the window's raw text.

use crate::document::DocumentText;

/// A statement of the report, extracted independently so one statement's
/// failure cannot sink the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    Income,
    BalanceSheet,
    CashFlow,
    Segments,
    Geographic,
}

impl Statement {
    pub const ALL: [Statement; 5] = [
        Statement::Income,
        Statement::BalanceSheet,
        Statement::CashFlow,
        Statement::Segments,
        Statement::Geographic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Statement::Income => "income statement",
            Statement::BalanceSheet => "balance sheet",
            Statement::CashFlow => "cash flow statement",
            Statement::Segments => "segment information",
            Statement::Geographic => "geographic information",
        }
    }

    /// Section anchors searched case-insensitively.
    fn anchors(&self) -> &'static [&'static str] {
        match self {
            Statement::Income => &[
                "consolidated statements of operations",
                "consolidated statements of income",
                "income statement",
                "statement of operations",
                "results of operations",
            ],
            Statement::BalanceSheet => &[
                "consolidated balance sheet",
                "balance sheet",
                "statement of financial position",
            ],
            Statement::CashFlow => &[
                "consolidated statements of cash flows",
                "statement of cash flows",
                "cash flow statement",
                "cash flows",
            ],
            Statement::Segments => &["segment revenue", "business segments", "operating segments", "segment information"],
            Statement::Geographic => &[
                "geographic revenue",
                "revenue by geography",
                "revenue by region",
                "geographic information",
            ],
        }
    }
}

/// One parsed row of a tabular region: a label plus the numeric columns in
/// their original order (current year first in virtually all filings).
#[derive(Debug, Clone)]
pub struct TableRow {
    pub label: String,
    pub values: Vec<f64>,
}

impl TableRow {
    pub fn current(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn previous(&self) -> Option<f64> {
        self.values.get(1).copied()
    }
}

/// A statement-local tabular region with its scale already applied.
#[derive(Debug, Clone, Default)]
pub struct TableRegion {
    pub rows: Vec<TableRow>,
    /// Raw text of the window, kept for the LLM fallback path.
    pub raw_window: String,
}

impl TableRegion {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row whose label contains any of the given needles.
    pub fn find_row(&self, needles: &[&str]) -> Option<&TableRow> {
        self.rows.iter().find(|row| {
            let label = row.label.to_lowercase();
            needles.iter().any(|n| label.contains(n))
        })
    }
}

/// Multiplier declared near a table ("in millions", "in thousands").
fn detect_scale(window: &str) -> f64 {
    let lower = window.to_lowercase();
    if lower.contains("in billions") || lower.contains("$ billions") {
        1_000_000_000.0
    } else if lower.contains("in millions") || lower.contains("$ millions") {
        1_000_000.0
    } else if lower.contains("in thousands") || lower.contains("$ thousands") {
        1_000.0
    } else {
        1.0
    }
}

/// Locates the statement's tabular region across the document's pages.
///
/// The window starts at the strongest anchor hit and runs until the next
/// blank-heavy break or a fixed line budget, whichever comes first.
pub fn locate_statement(doc: &DocumentText, statement: Statement) -> Option<TableRegion> {
    for page in &doc.pages {
        let lines: Vec<&str> = page.lines().collect();
        let lower_lines: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();

        for (idx, lower) in lower_lines.iter().enumerate() {
            if !statement.anchors().iter().any(|a| lower.contains(a)) {
                continue;
            }

            let end = (idx + 60).min(lines.len());
            let window = lines[idx..end].join("\n");
            // The scale marker often sits in the page header rather than
            // inside the statement itself.
            let scale = match detect_scale(&window) {
                s if s != 1.0 => s,
                _ => detect_scale(page),
            };

            let rows: Vec<TableRow> = lines[idx..end]
                .iter()
                .filter_map(|line| parse_row(line, scale))
                .collect();

            return Some(TableRegion {
                rows,
                raw_window: window,
            });
        }
    }
    None
}

/// Parses "Label  123,456  (7,890)" into a labelled numeric row. Requires a
/// non-numeric label of at least three characters and at least one numeric
/// column, which is what separates table rows from prose.
pub fn parse_row(line: &str, scale: f64) -> Option<TableRow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return None;
    }

    // Numeric columns cluster at the right edge of the row.
    let mut values_rev = Vec::new();
    let mut split = tokens.len();
    for (i, token) in tokens.iter().enumerate().rev() {
        match parse_money(token) {
            Some(v) => {
                values_rev.push(v * scale);
                split = i;
            }
            None => break,
        }
    }

    if values_rev.is_empty() || split == 0 {
        return None;
    }

    let label = tokens[..split].join(" ");
    if label.len() < 3 || label.chars().all(|c| !c.is_alphabetic()) {
        return None;
    }

    // Per-share figures are printed at face value even when the statement is
    // "in millions, except per share data".
    let lower_label = label.to_lowercase();
    if lower_label.contains("per share") || lower_label.contains("eps") {
        for v in values_rev.iter_mut() {
            *v /= scale;
        }
    }

    // Year headers ("2023 2022") masquerade as rows; discard columns that
    // look like a run of years with no magnitude.
    let values: Vec<f64> = values_rev.into_iter().rev().collect();
    if values.iter().all(|v| (1900.0..2100.0).contains(v)) && values.len() >= 2 && scale == 1.0 {
        return None;
    }

    Some(TableRow { label, values })
}

/// Parses a single monetary token: currency anchors, thousands separators,
/// parenthesised negatives, trailing percent signs.
pub fn parse_money(token: &str) -> Option<f64> {
    let mut s = token.trim();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    let s = s
        .trim_start_matches(['$', '€', '£', '¥'])
        .trim_end_matches('%');
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }

    // Reject tokens with stray alphabetics ("FY2023", "Note4").
    if cleaned.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    let parsed: f64 = cleaned.parse().ok()?;
    Some(if negative { -parsed } else { parsed })
}
