//! Raw HTML table rows and span expansion into a logical grid.

use scraper::{ElementRef, Selector};

const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub text: String,
    pub link: Option<String>,
    pub colspan: usize,
    pub rowspan: usize,
    pub is_header: bool,
}

impl RawCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
            colspan: 1,
            rowspan: 1,
            is_header: false,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_colspan(mut self, colspan: usize) -> Self {
        self.colspan = colspan.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub header_rows: Vec<RawRow>,
    pub body_rows: Vec<RawRow>,
}

impl RawTable {
    pub fn from_element(table: ElementRef<'_>, link_selector: &Selector) -> Self {
        let mut header_rows = Vec::new();
        let mut body_rows = Vec::new();

        for child in table.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "thead" => header_rows.extend(section_rows(child, link_selector)),
                "tbody" | "tfoot" => body_rows.extend(section_rows(child, link_selector)),
                "tr" => body_rows.extend(parse_row(child, link_selector)),
                _ => {}
            }
        }

        if header_rows.is_empty() {
            let leading = body_rows
                .iter()
                .take_while(|row| row.cells.iter().all(|c| c.is_header))
                .count();
            header_rows = body_rows.drain(..leading).collect();
        }

        Self {
            header_rows,
            body_rows,
        }
    }
}

fn section_rows(section: ElementRef<'_>, link_selector: &Selector) -> Vec<RawRow> {
    section
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
        .filter_map(|tr| parse_row(tr, link_selector))
        .collect()
}

fn parse_row(tr: ElementRef<'_>, link_selector: &Selector) -> Option<RawRow> {
    let cells = tr
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .map(|cell| RawCell {
            text: normalize_whitespace(&cell.text().collect::<String>()),
            link: first_link(cell, link_selector),
            colspan: span_attr(cell, "colspan", MAX_COLSPAN),
            rowspan: span_attr(cell, "rowspan", MAX_ROWSPAN),
            is_header: cell.value().name() == "th",
        })
        .collect::<Vec<_>>();
    if cells.is_empty() {
        None
    } else {
        Some(RawRow { cells })
    }
}

fn first_link(cell: ElementRef<'_>, link_selector: &Selector) -> Option<String> {
    cell.select(link_selector)
        .find_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(ToString::to_string)
}

fn span_attr(cell: ElementRef<'_>, name: &str, max: usize) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map(|n| n.min(max))
        .unwrap_or(1)
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridCell {
    pub text: String,
    pub link: Option<String>,
}

/// Expand every cell across the logical slots its colspan/rowspan covers.
///
/// Output rows line up 1:1 with input rows; each is as wide as its own expansion.
pub fn expand_spans(rows: &[RawRow]) -> Vec<Vec<GridCell>> {
    let mut grid: Vec<Vec<Option<GridCell>>> = vec![Vec::new(); rows.len()];

    for (r, row) in rows.iter().enumerate() {
        let mut col = 0usize;
        for cell in &row.cells {
            while grid[r].get(col).is_some_and(Option::is_some) {
                col += 1;
            }
            let slot = GridCell {
                text: cell.text.clone(),
                link: cell.link.clone(),
            };
            let depth = cell.rowspan.min(rows.len() - r);
            for target in grid.iter_mut().skip(r).take(depth) {
                let end = col + cell.colspan;
                if target.len() < end {
                    target.resize(end, None);
                }
                for entry in &mut target[col..end] {
                    if entry.is_none() {
                        *entry = Some(slot.clone());
                    }
                }
            }
            col += cell.colspan;
        }
    }

    grid.into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_table(html: &str) -> RawTable {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("table").unwrap();
        let link_sel = Selector::parse("a[href]").unwrap();
        let table = document.select(&table_sel).next().unwrap();
        RawTable::from_element(table, &link_sel)
    }

    #[test]
    fn colspan_replicates_text_and_link() {
        let rows = vec![RawRow {
            cells: vec![
                RawCell::new("Everton").with_link("/squads/everton").with_colspan(2),
                RawCell::new("38"),
            ],
        }];
        let grid = expand_spans(&rows);
        assert_eq!(grid[0].len(), 3);
        assert_eq!(grid[0][0].link.as_deref(), Some("/squads/everton"));
        assert_eq!(grid[0][1].link.as_deref(), Some("/squads/everton"));
        assert_eq!(grid[0][1].text, "Everton");
        assert_eq!(grid[0][2].link, None);
    }

    #[test]
    fn rowspan_occupies_slots_below() {
        let mut tall = RawCell::new("Player");
        tall.rowspan = 2;
        let rows = vec![
            RawRow {
                cells: vec![tall, RawCell::new("Playing Time").with_colspan(2)],
            },
            RawRow {
                cells: vec![RawCell::new("MP"), RawCell::new("Min")],
            },
        ];
        let grid = expand_spans(&rows);
        let bottom = grid[1].iter().map(|c| c.text.as_str()).collect::<Vec<_>>();
        assert_eq!(bottom, vec!["Player", "MP", "Min"]);
    }

    #[test]
    fn leading_th_rows_become_header_without_thead() {
        let table = first_table(
            "<table><tr><th>Rk</th><th>Squad</th></tr>\
             <tr><th>1</th><td><a href=\"/a\">Arsenal</a></td></tr></table>",
        );
        assert_eq!(table.header_rows.len(), 1);
        assert_eq!(table.body_rows.len(), 1);
        assert_eq!(table.body_rows[0].cells[1].link.as_deref(), Some("/a"));
    }

    #[test]
    fn nested_table_rows_are_not_mixed_in() {
        let table = first_table(
            "<table><thead><tr><th>A</th></tr></thead><tbody>\
             <tr><td>outer <table><tr><td>inner</td></tr></table></td></tr>\
             </tbody></table>",
        );
        assert_eq!(table.body_rows.len(), 1);
        assert_eq!(table.body_rows[0].cells.len(), 1);
    }

    #[test]
    fn bogus_spans_fall_back_to_one() {
        let table = first_table(
            "<table><thead><tr><th colspan=\"100%\">A</th><th colspan=\"0\">B</th></tr></thead></table>",
        );
        let spans = table.header_rows[0]
            .cells
            .iter()
            .map(|c| c.colspan)
            .collect::<Vec<_>>();
        assert_eq!(spans, vec![1, 1]);
    }
}
