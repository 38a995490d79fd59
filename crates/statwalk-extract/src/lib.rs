//! HTML statistics-table normalization and API payload flattening.

pub mod grid;
pub mod infer;
pub mod normalize;
pub mod payload;

use scraper::Selector;
use statwalk_core::{CoreError, NormalizedTable};
use statwalk_fetch::{FetchError, PageFetcher};
use thiserror::Error;
use tracing::info;

pub use normalize::{
    to_snake_case, DropReason, ExtractedRow, ExtractedTable, HeaderColumn, LinkGrid,
    NormalizeOptions, TableNormalizer,
};
pub use payload::{
    flatten_lineup_details, flatten_statistics, json_scalar, lineup_availability,
    player_fixture_rows, table_from_flat_records, type_catalog_from_pages, FlatRecord,
    LineupAvailability, PlayerFixtureRows,
};

pub const CRATE_NAME: &str = "statwalk-extract";
pub const STATS_TABLE_SELECTOR: &str = "table.stats_table";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid table selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("no tables matching `{selector}` found")]
    NoTableFound { selector: String },
    #[error("table index {index} out of range ({found} candidate tables)")]
    TableIndexOutOfRange { index: usize, found: usize },
    #[error("table {index} has no header row")]
    MissingHeader { index: usize },
    #[error("{include} include unavailable: {message}")]
    IncludeUnavailable { include: String, message: String },
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ExtractError {
    /// Page-shape mismatches: retrying the same content cannot succeed.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ExtractError::InvalidSelector { .. }
                | ExtractError::NoTableFound { .. }
                | ExtractError::TableIndexOutOfRange { .. }
                | ExtractError::MissingHeader { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelector(String);

impl TableSelector {
    pub fn new(css: impl Into<String>) -> Self {
        Self(css.into())
    }

    pub fn stats_table() -> Self {
        Self::new(STATS_TABLE_SELECTOR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn compile(&self) -> Result<Selector, ExtractError> {
        Selector::parse(&self.0).map_err(|e| ExtractError::InvalidSelector {
            selector: self.0.clone(),
            message: e.to_string(),
        })
    }
}

impl Default for TableSelector {
    fn default() -> Self {
        Self::stats_table()
    }
}

pub fn normalize(
    raw_html: &str,
    selector: &TableSelector,
    table_index: usize,
) -> Result<NormalizedTable, ExtractError> {
    TableNormalizer::new(selector.clone()).normalize(raw_html, table_index)
}

pub async fn scrape_table(
    fetcher: &dyn PageFetcher,
    url: &str,
    normalizer: &TableNormalizer,
    table_index: usize,
) -> Result<NormalizedTable, ExtractError> {
    let html = fetcher.fetch_text(url).await?;
    let table = normalizer.normalize(&html, table_index)?;
    info!(
        url,
        selector = normalizer.selector().as_str(),
        table_index,
        rows = table.len(),
        columns = table.columns().len(),
        "normalized scraped table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statwalk_fetch::FixtureFetcher;

    const PAGE: &str = "<table class=\"stats_table\"><thead><tr><th>Squad</th><th>Pts</th></tr></thead>\
                        <tbody><tr><td>Arsenal</td><td>89</td></tr></tbody></table>";

    #[test]
    fn invalid_selector_is_reported() {
        let err = normalize(PAGE, &TableSelector::new("table[[["), 0).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidSelector { .. }));
    }

    #[test]
    fn missing_and_out_of_range_tables_are_distinct_errors() {
        let err = normalize("<p>nothing</p>", &TableSelector::stats_table(), 0).unwrap_err();
        assert!(matches!(err, ExtractError::NoTableFound { .. }));

        let err = normalize(PAGE, &TableSelector::stats_table(), 1).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::TableIndexOutOfRange { index: 1, found: 1 }
        ));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn scrape_table_goes_through_the_fetcher() {
        let fetcher = FixtureFetcher::new().with_page("https://example.test/league", PAGE);
        let normalizer = TableNormalizer::new(TableSelector::stats_table());

        let table = scrape_table(&fetcher, "https://example.test/league", &normalizer, 0)
            .await
            .unwrap();
        assert_eq!(table.len(), 1);

        let err = scrape_table(&fetcher, "https://example.test/other", &normalizer, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Fetch(FetchError::MissingFixture { .. })));
        assert!(!err.is_structural());
    }
}
