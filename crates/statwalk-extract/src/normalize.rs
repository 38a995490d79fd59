//! Turning one selected HTML table into a typed, rectangular record set.

use std::collections::{BTreeSet, HashSet};

use scraper::{Html, Node, Selector};
use serde::{Deserialize, Serialize};
use statwalk_core::{Column, NormalizedTable, Value};
use tracing::debug;

use crate::grid::{expand_spans, GridCell, RawRow, RawTable};
use crate::infer::infer_column;
use crate::{ExtractError, TableSelector};

const PLACEHOLDER_PREFIX: &str = "Unnamed:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizeOptions {
    pub include_commented: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderColumn {
    pub label: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    pub source_index: usize,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Aggregate,
    RepeatedHeader,
}

/// Link targets per original body row and column, built before any row is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkGrid {
    rows: Vec<Vec<Option<String>>>,
    has_links: Vec<bool>,
}

impl LinkGrid {
    fn from_rows(rows: &[ExtractedRow], width: usize) -> Self {
        let mut has_links = vec![false; width];
        let rows = rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .enumerate()
                    .map(|(col, cell)| {
                        if cell.link.is_some() {
                            has_links[col] = true;
                        }
                        cell.link.clone()
                    })
                    .collect()
            })
            .collect();
        Self { rows, has_links }
    }

    pub fn link(&self, source_index: usize, column: usize) -> Option<&str> {
        self.rows
            .get(source_index)
            .and_then(|row| row.get(column))
            .and_then(|link| link.as_deref())
    }

    pub fn column_has_links(&self, column: usize) -> bool {
        self.has_links.get(column).copied().unwrap_or(false)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTable {
    pub columns: Vec<HeaderColumn>,
    pub header_labels: BTreeSet<String>,
    pub rows: Vec<ExtractedRow>,
}

impl ExtractedTable {
    pub fn from_raw(raw: &RawTable, table_index: usize) -> Result<Self, ExtractError> {
        if raw.header_rows.is_empty() {
            return Err(ExtractError::MissingHeader { index: table_index });
        }
        let (labels, header_labels) = flatten_header(&raw.header_rows);
        if labels.is_empty() {
            return Err(ExtractError::MissingHeader { index: table_index });
        }

        let names = dedupe_names(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let name = to_snake_case(label);
                    if name.is_empty() {
                        format!("unnamed_{i}")
                    } else {
                        name
                    }
                })
                .collect(),
        );
        let columns = labels
            .into_iter()
            .zip(names)
            .map(|(label, name)| HeaderColumn { label, name })
            .collect::<Vec<_>>();

        let width = columns.len();
        let rows = expand_spans(&raw.body_rows)
            .into_iter()
            .enumerate()
            .map(|(source_index, mut cells)| {
                cells.resize(width, GridCell::default());
                ExtractedRow {
                    source_index,
                    cells,
                }
            })
            .collect();

        Ok(Self {
            columns,
            header_labels,
            rows,
        })
    }

    pub fn link_grid(&self) -> LinkGrid {
        LinkGrid::from_rows(&self.rows, self.columns.len())
    }

    pub fn drop_reason(&self, row: &ExtractedRow) -> Option<DropReason> {
        if row
            .cells
            .iter()
            .any(|cell| cell.text.to_lowercase().contains("total"))
        {
            return Some(DropReason::Aggregate);
        }
        let first = row.cells.first().map(|c| c.text.trim()).unwrap_or("");
        if !first.is_empty() && self.header_labels.contains(first) {
            return Some(DropReason::RepeatedHeader);
        }
        None
    }

    pub fn retained_rows(&self) -> Vec<&ExtractedRow> {
        self.rows
            .iter()
            .filter(|row| self.drop_reason(row).is_none())
            .collect()
    }

    /// `<name>_link` column name for each column that carries links anywhere in the original grid.
    pub fn link_column_names(&self, links: &LinkGrid) -> Vec<Option<String>> {
        let mut used = self
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<HashSet<_>>();
        self.columns
            .iter()
            .enumerate()
            .map(|(col, header)| {
                if !links.column_has_links(col) {
                    return None;
                }
                let base = format!("{}_link", header.name);
                let mut candidate = base.clone();
                let mut n = 2;
                while used.contains(&candidate) {
                    candidate = format!("{base}_{n}");
                    n += 1;
                }
                used.insert(candidate.clone());
                Some(candidate)
            })
            .collect()
    }

    pub fn to_normalized(&self) -> Result<NormalizedTable, ExtractError> {
        let retained = self.retained_rows();
        let links = self.link_grid();
        let link_names = self.link_column_names(&links);
        debug!(
            total_rows = self.rows.len(),
            retained = retained.len(),
            columns = self.columns.len(),
            "filtered table rows"
        );

        let mut columns = Vec::new();
        let mut column_values: Vec<Vec<Value>> = Vec::new();
        for (col, header) in self.columns.iter().enumerate() {
            let texts = retained
                .iter()
                .map(|row| row.cells[col].text.as_str())
                .collect::<Vec<_>>();
            let (kind, values) = infer_column(&texts);
            columns.push(Column::new(header.name.clone(), kind));
            column_values.push(values);

            if let Some(link_name) = &link_names[col] {
                let values = retained
                    .iter()
                    .map(|row| Value::text(links.link(row.source_index, col).unwrap_or_default()))
                    .collect();
                columns.push(Column::text(link_name.clone()));
                column_values.push(values);
            }
        }

        let rows = (0..retained.len())
            .map(|r| column_values.iter().map(|values| values[r].clone()).collect())
            .collect();
        Ok(NormalizedTable::new(columns, rows)?)
    }
}

fn flatten_header(header_rows: &[RawRow]) -> (Vec<String>, BTreeSet<String>) {
    let levels = expand_spans(header_rows);
    let width = levels.iter().map(Vec::len).max().unwrap_or(0);
    let mut all_labels = BTreeSet::new();
    let mut flattened = Vec::with_capacity(width);

    for col in 0..width {
        let mut parts: Vec<&str> = Vec::new();
        for level in &levels {
            let label = level.get(col).map(|c| c.text.trim()).unwrap_or("");
            if is_placeholder(label) {
                continue;
            }
            all_labels.insert(label.to_string());
            if parts.last() == Some(&label) {
                continue;
            }
            parts.push(label);
        }
        let joined = parts.join("_");
        if !joined.is_empty() {
            all_labels.insert(joined.clone());
        }
        flattened.push(joined);
    }
    (flattened, all_labels)
}

fn is_placeholder(label: &str) -> bool {
    label.is_empty() || label.starts_with(PLACEHOLDER_PREFIX)
}

pub fn to_snake_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.trim().to_lowercase().chars() {
        let ch = if ch.is_whitespace() || ch == '/' { '_' } else { ch };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }
    out
}

fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{name}_{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}

pub(crate) fn commented_fragments(document: &Html) -> Vec<Html> {
    document
        .tree
        .values()
        .filter_map(Node::as_comment)
        .filter(|comment| comment.contains("<table"))
        .map(|comment| Html::parse_fragment(comment))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TableNormalizer {
    selector: TableSelector,
    options: NormalizeOptions,
}

impl TableNormalizer {
    pub fn new(selector: TableSelector) -> Self {
        Self {
            selector,
            options: NormalizeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn selector(&self) -> &TableSelector {
        &self.selector
    }

    pub fn extract(&self, raw_html: &str, table_index: usize) -> Result<ExtractedTable, ExtractError> {
        let table_sel = self.selector.compile()?;
        let link_sel = Selector::parse("a[href]").map_err(|e| ExtractError::InvalidSelector {
            selector: "a[href]".to_string(),
            message: e.to_string(),
        })?;

        let document = Html::parse_document(raw_html);
        let fragments = if self.options.include_commented {
            commented_fragments(&document)
        } else {
            Vec::new()
        };
        let candidates = document
            .select(&table_sel)
            .chain(fragments.iter().flat_map(|f| f.select(&table_sel)))
            .collect::<Vec<_>>();
        debug!(
            selector = self.selector.as_str(),
            candidates = candidates.len(),
            commented_fragments = fragments.len(),
            "selected candidate tables"
        );

        if candidates.is_empty() {
            return Err(ExtractError::NoTableFound {
                selector: self.selector.as_str().to_string(),
            });
        }
        let Some(table) = candidates.get(table_index) else {
            return Err(ExtractError::TableIndexOutOfRange {
                index: table_index,
                found: candidates.len(),
            });
        };

        let raw = RawTable::from_element(*table, &link_sel);
        ExtractedTable::from_raw(&raw, table_index)
    }

    pub fn normalize(&self, raw_html: &str, table_index: usize) -> Result<NormalizedTable, ExtractError> {
        self.extract(raw_html, table_index)?.to_normalized()
    }
}
