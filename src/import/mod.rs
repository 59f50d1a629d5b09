//! Import normalizer
//!
//! Turns JSON, CSV, HTML tables and browser bookmark exports into canonical
//! [`ImportRow`]s, drops rows without a usable URL and merges duplicates.
//! Parsing is all-or-nothing: a malformed file aborts the import with
//! [`AppError::ImportParse`] before anything is written.

pub mod delimited;
pub mod dedupe;
pub mod html;
pub mod json;
pub mod persist;
pub mod pricing;

use serde::Serialize;

use crate::error::AppError;
use crate::model::{normalize_site_url, Pricing};

pub use dedupe::dedupe;
pub use persist::{persist, ImportSummary};
pub use pricing::normalize_pricing;

/// One site as read from an import file, before persistence
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ImportRow {
    pub name: String,
    pub url: String,
    pub pricing: Option<Pricing>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub use_case: Option<String>,
    pub is_favorite: bool,
    pub is_pinned: bool,
    pub is_needed: bool,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    Json,
    Csv,
    Html,
    Bookmarks,
}

impl ImportFormat {
    /// Value stored in `Site::import_source`
    pub fn label(self) -> &'static str {
        match self {
            ImportFormat::Json => "json",
            ImportFormat::Csv => "csv",
            ImportFormat::Html => "html",
            ImportFormat::Bookmarks => "bookmarks",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ParsedImport {
    pub format: ImportFormat,
    pub rows: Vec<ImportRow>,
    /// Rows dropped because they had no http(s) URL
    pub discarded: usize,
    /// Rows folded into an earlier row with the same URL
    pub merged: usize,
}

/// Canonical field an input column or key maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Url,
    Pricing,
    Categories,
    Tags,
    Description,
    UseCase,
    Favorite,
    Pinned,
    Needed,
}

/// Maps a header cell or JSON key to a canonical field
pub fn field_for_header(header: &str) -> Option<Field> {
    let key = header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace(['-', '_'], " ");
    let key = key.split_whitespace().collect::<Vec<_>>().join(" ");

    let field = match key.as_str() {
        "name" | "title" | "resource" | "site" | "site name" | "website name" | "tool" | "naziv" => Field::Name,
        "url" | "link" | "website" | "href" | "address" | "web" | "site url" | "homepage" => Field::Url,
        "pricing" | "price" | "cost" | "plan" | "pricing model" | "cijena" => Field::Pricing,
        "category" | "categories" | "folder" | "group" | "kategorija" | "kategorije" => Field::Categories,
        "tag" | "tags" | "labels" | "label" | "keywords" => Field::Tags,
        "description" | "desc" | "notes" | "note" | "summary" | "opis" => Field::Description,
        "use case" | "usecase" | "use" | "purpose" => Field::UseCase,
        "favorite" | "favourite" | "is favorite" | "is favourite" | "starred" | "fav" => Field::Favorite,
        "pinned" | "is pinned" | "pin" => Field::Pinned,
        "needed" | "is needed" | "required" => Field::Needed,
        _ => return None,
    };
    Some(field)
}

/// Splits a multi-value cell on `;` or `,`
pub fn split_multi(cell: &str) -> Vec<String> {
    let separator = if cell.contains(';') { ';' } else { ',' };
    cell.split(separator)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_flag(cell: &str) -> bool {
    matches!(
        cell.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x" | "✓" | "da" | "ja" | "si" | "sí" | "oui"
    )
}

/// One cell of a headerless row: its text and, for HTML, the first link in it
#[derive(Debug, Clone, Copy)]
pub struct PositionalCell<'a> {
    pub text: &'a str,
    pub href: Option<&'a str>,
}

fn has_web_scheme(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn looks_like_host(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && !text.contains(char::is_whitespace)
        && text.contains('.')
        && !text.starts_with('.')
        && !text.ends_with('.')
}

/// Builds a row from cells with no header
///
/// The first column is the name. The URL is, in order of preference: a link
/// target, a cell with an http(s) scheme, a bare host in a later column.
/// The name cell only becomes the URL when no other cell qualifies, in which
/// case the row is left nameless and falls back to the host.
pub fn positional_row(cells: &[PositionalCell]) -> ImportRow {
    let mut row = ImportRow::default();
    let Some((first, rest)) = cells.split_first() else {
        return row;
    };

    let url = cells
        .iter()
        .find_map(|cell| cell.href.filter(|href| !href.trim().is_empty()))
        .or_else(|| rest.iter().map(|c| c.text).find(|t| has_web_scheme(t)))
        .or_else(|| rest.iter().map(|c| c.text).find(|t| looks_like_host(t)));

    match url {
        Some(url) => {
            row.set(Field::Name, first.text);
            row.set(Field::Url, url);
        }
        None if has_web_scheme(first.text) || looks_like_host(first.text) => {
            row.set(Field::Url, first.text);
        }
        None => row.set(Field::Name, first.text),
    }
    row
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ImportRow {
    /// Applies one mapped cell value to the row
    pub fn set(&mut self, field: Field, value: &str) {
        match field {
            Field::Name => {
                if self.name.is_empty() {
                    self.name = value.trim().to_string();
                }
            }
            Field::Url => {
                if self.url.is_empty() {
                    self.url = value.trim().to_string();
                }
            }
            Field::Pricing => {
                if self.pricing.is_none() {
                    self.pricing = normalize_pricing(value);
                }
            }
            Field::Categories => self.categories.extend(split_multi(value)),
            Field::Tags => self.tags.extend(split_multi(value)),
            Field::Description => self.description = self.description.take().or_else(|| non_empty(value)),
            Field::UseCase => self.use_case = self.use_case.take().or_else(|| non_empty(value)),
            Field::Favorite => self.is_favorite |= parse_flag(value),
            Field::Pinned => self.is_pinned |= parse_flag(value),
            Field::Needed => self.is_needed |= parse_flag(value),
        }
    }

    /// Normalizes the URL in place. `false` when there is no usable
    /// http(s) URL and the row has to be dropped.
    fn resolve_url(&mut self) -> bool {
        match normalize_site_url(&self.url) {
            Some(url) => {
                self.url = url;
                if self.name.trim().is_empty() {
                    self.name = display_name(&self.url);
                }
                true
            }
            None => false,
        }
    }
}

/// Host of a URL without `www.`, used when a row has no name
fn display_name(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    host.trim_start_matches("www.").to_string()
}

/// Detects the format from the file name, falling back to the content
pub fn detect_format(filename: &str, content: &str) -> Result<ImportFormat, AppError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let format = match extension.as_str() {
        "json" => ImportFormat::Json,
        "csv" | "tsv" | "txt" => ImportFormat::Csv,
        "html" | "htm" => {
            if html::looks_like_bookmarks(content) {
                ImportFormat::Bookmarks
            } else {
                ImportFormat::Html
            }
        }
        _ => sniff(content).ok_or_else(|| {
            AppError::ImportParse(format!(
                "unsupported file type '{filename}', expected .json, .csv, .html or .htm"
            ))
        })?,
    };
    Ok(format)
}

fn sniff(content: &str) -> Option<ImportFormat> {
    let head = content.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with('[') || head.starts_with('{') {
        Some(ImportFormat::Json)
    } else if html::looks_like_bookmarks(head) {
        Some(ImportFormat::Bookmarks)
    } else if head.starts_with('<') {
        Some(ImportFormat::Html)
    } else if head.lines().next().is_some_and(|line| line.contains(',') || line.contains(';')) {
        Some(ImportFormat::Csv)
    } else {
        None
    }
}

/// Parses an import file into deduplicated rows with resolved URLs
pub fn parse(filename: &str, content: &str) -> Result<ParsedImport, AppError> {
    let format = detect_format(filename, content)?;
    let raw_rows = match format {
        ImportFormat::Json => json::parse(content)?,
        ImportFormat::Csv => delimited::parse(content)?,
        ImportFormat::Html => html::parse_tables(content)?,
        ImportFormat::Bookmarks => html::parse_bookmarks(content),
    };

    let total = raw_rows.len();
    let resolved: Vec<ImportRow> = raw_rows
        .into_iter()
        .filter_map(|mut row| row.resolve_url().then_some(row))
        .collect();
    let discarded = total - resolved.len();

    let before_merge = resolved.len();
    let rows = dedupe(resolved);
    let merged = before_merge - rows.len();

    tracing::info!(
        filename,
        format = format.label(),
        rows = rows.len(),
        discarded,
        merged,
        "parsed import file"
    );

    Ok(ParsedImport {
        format,
        rows,
        discarded,
        merged,
    })
}
