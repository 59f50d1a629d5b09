//! HTML table and Netscape bookmark file import

use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::AppError;
use crate::import::{field_for_header, positional_row, split_multi, Field, ImportRow, PositionalCell};

/// Toolbar and menu folders browsers create on their own
const SKIPPED_FOLDERS: &[&str] = &[
    "bookmarks",
    "bookmarks bar",
    "bookmarks toolbar",
    "bookmarks menu",
    "bookmark menu",
    "other bookmarks",
    "mobile bookmarks",
    "favorites",
    "favorites bar",
    "favourites bar",
    "imported",
    "unsorted bookmarks",
    "lesezeichenleiste",
    "lesezeichen-symbolleiste",
    "lesezeichenmenü",
    "weitere lesezeichen",
    "traka oznaka",
    "ostale oznake",
    "barre de favoris",
    "barra de marcadores",
];

fn selector(cell: &'static OnceLock<Option<Selector>>, css: &str) -> Option<&'static Selector> {
    cell.get_or_init(|| Selector::parse(css).ok()).as_ref()
}

fn table_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    selector(&SELECTOR, "table")
}

fn row_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    selector(&SELECTOR, "tr")
}

fn cell_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    selector(&SELECTOR, "th, td")
}

fn anchor_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    selector(&SELECTOR, "a[href]")
}

pub fn looks_like_bookmarks(content: &str) -> bool {
    let head: String = content.chars().take(4096).collect::<String>().to_uppercase();
    head.contains("NETSCAPE-BOOKMARK-FILE") || head.contains("<DT>")
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_web_link(href: &str) -> bool {
    let lowered = href.trim().to_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

struct Cell {
    text: String,
    href: Option<String>,
}

fn read_cells(row: ElementRef) -> Vec<Cell> {
    let (Some(cells), Some(anchors)) = (cell_selector(), anchor_selector()) else {
        return Vec::new();
    };
    row.select(cells)
        .map(|cell| Cell {
            text: text_of(cell),
            href: cell
                .select(anchors)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
        })
        .collect()
}

fn header_row(row: ElementRef, cells: &[Cell]) -> Option<Vec<Option<Field>>> {
    let has_th = row.children().filter_map(ElementRef::wrap).any(|c| c.value().name() == "th");
    let columns: Vec<Option<Field>> = cells.iter().map(|c| field_for_header(&c.text)).collect();
    let recognized = columns.iter().any(|c| matches!(c, Some(Field::Url) | Some(Field::Name)));
    (recognized || (has_th && columns.iter().any(Option::is_some))).then_some(columns)
}

fn positional_cells(cells: &[Cell]) -> ImportRow {
    let cells: Vec<PositionalCell> = cells
        .iter()
        .map(|cell| PositionalCell {
            text: &cell.text,
            href: cell.href.as_deref(),
        })
        .collect();
    positional_row(&cells)
}

fn mapped_row(cells: &[Cell], columns: &[Option<Field>]) -> ImportRow {
    let mut row = ImportRow::default();
    for (cell, column) in cells.iter().zip(columns) {
        match column {
            Some(Field::Url) => row.set(Field::Url, cell.href.as_deref().unwrap_or(&cell.text)),
            Some(Field::Name) => {
                row.set(Field::Name, &cell.text);
                if let Some(href) = &cell.href {
                    row.set(Field::Url, href);
                }
            }
            Some(field) => row.set(*field, &cell.text),
            None => {}
        }
    }
    row
}

/// Reads every `<table>` in the document
///
/// A row whose cells name known columns switches the table to header
/// mode; tables without one are read positionally.
pub fn parse_tables(content: &str) -> Result<Vec<ImportRow>, AppError> {
    let document = Html::parse_document(content);
    let (Some(tables), Some(rows_sel)) = (table_selector(), row_selector()) else {
        return Err(AppError::ImportParse("HTML selectors unavailable".into()));
    };

    let mut rows = Vec::new();
    let mut saw_table = false;
    for table in document.select(tables) {
        saw_table = true;
        let mut columns: Option<Vec<Option<Field>>> = None;
        for tr in table.select(rows_sel) {
            let cells = read_cells(tr);
            if cells.iter().all(|c| c.text.is_empty() && c.href.is_none()) {
                continue;
            }
            if columns.is_none() {
                if let Some(header) = header_row(tr, &cells) {
                    columns = Some(header);
                    continue;
                }
            }
            let row = match &columns {
                Some(columns) => mapped_row(&cells, columns),
                None => positional_cells(&cells),
            };
            rows.push(row);
        }
    }

    if !saw_table {
        return Err(AppError::ImportParse(
            "HTML file contains neither a table nor bookmarks".into(),
        ));
    }
    tracing::debug!(rows = rows.len(), "html tables parsed");
    Ok(rows)
}

fn is_skipped_folder(name: &str) -> bool {
    let folded = name.trim().to_lowercase();
    folded.is_empty() || SKIPPED_FOLDERS.contains(&folded.as_str())
}

struct BookmarkWalker {
    path: Vec<String>,
    rows: Vec<ImportRow>,
}

impl BookmarkWalker {
    /// Walks the children of `element`. Returns a folder heading that was
    /// not followed by its list inside `element`, so the caller can attach
    /// it to the next sibling list.
    fn walk(&mut self, element: ElementRef, mut pending: Option<String>) -> Option<String> {
        for child in element.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "h3" | "h1" => pending = Some(text_of(child)),
                "dl" => {
                    let folder = pending.take();
                    let pushed = match folder {
                        Some(name) if !is_skipped_folder(&name) => {
                            self.path.push(name);
                            true
                        }
                        _ => false,
                    };
                    self.walk(child, None);
                    if pushed {
                        self.path.pop();
                    }
                }
                "a" => self.link(child),
                _ => pending = self.walk(child, pending),
            }
        }
        pending
    }

    fn link(&mut self, anchor: ElementRef) {
        let Some(href) = anchor.value().attr("href") else {
            return;
        };
        if !is_web_link(href) {
            return;
        }
        let mut row = ImportRow {
            name: text_of(anchor),
            url: href.trim().to_string(),
            categories: self.path.clone(),
            ..ImportRow::default()
        };
        if let Some(tags) = anchor.value().attr("tags") {
            row.tags = split_multi(tags);
        }
        self.rows.push(row);
    }
}

/// Walks a Netscape bookmark export
///
/// Every enclosing folder name becomes a category of the links beneath it,
/// except browser toolbar/menu folders. Only http/https links are kept.
pub fn parse_bookmarks(content: &str) -> Vec<ImportRow> {
    let document = Html::parse_document(content);
    let mut walker = BookmarkWalker {
        path: Vec::new(),
        rows: Vec::new(),
    };
    walker.walk(document.root_element(), None);
    tracing::debug!(rows = walker.rows.len(), "bookmarks parsed");
    walker.rows
}
