//! CSV (and semicolon/tab separated) import

use std::iter::Peekable;
use std::str::Chars;

use crate::error::AppError;
use crate::import::{field_for_header, positional_row, Field, ImportRow, PositionalCell};

/// Picks the delimiter that occurs most often in the header line, ignoring
/// anything inside quotes.
fn sniff_delimiter(content: &str) -> char {
    let header = content.lines().next().unwrap_or_default();
    let mut in_quotes = false;
    let (mut commas, mut semicolons, mut tabs) = (0, 0, 0);
    for ch in header.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            '\t' if !in_quotes => tabs += 1,
            _ => {}
        }
    }
    if tabs > commas && tabs > semicolons {
        '\t'
    } else if semicolons > commas {
        ';'
    } else {
        ','
    }
}

/// `\"` is an escaped quote unless the quote is followed by a delimiter, a
/// line end or the end of input. There it closes a cell ending in a
/// backslash, as in `"C:\dir\",next`.
fn escapes_quote(chars: &Peekable<Chars>, delimiter: char) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    matches!(ahead.next(), Some(c) if c != delimiter && c != '\n' && c != '\r')
}

/// Splits the content into records of cells
///
/// Quote-aware: a quoted cell may contain the delimiter, line breaks and
/// quotes written as `""` or `\"`. CRLF and LF both end a record.
pub fn tokenize(content: &str, delimiter: char) -> Result<Vec<Vec<String>>, AppError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut opened_at = 0;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                '\\' if chars.peek() == Some(&'"') && escapes_quote(&chars, delimiter) => {
                    chars.next();
                    cell.push('"');
                }
                '\n' => {
                    line += 1;
                    cell.push('\n');
                }
                '\r' if chars.peek() == Some(&'\n') => {}
                _ => cell.push(ch),
            }
            continue;
        }

        match ch {
            '"' if cell.trim().is_empty() => {
                cell.clear();
                in_quotes = true;
                opened_at = line;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => record.push(std::mem::take(&mut cell)),
            _ => cell.push(ch),
        }
    }

    if in_quotes {
        return Err(AppError::ImportParse(format!(
            "unterminated quoted field starting on line {opened_at}"
        )));
    }
    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        records.push(record);
    }
    Ok(records)
}

fn positional_record(record: &[String]) -> ImportRow {
    let cells: Vec<PositionalCell> = record
        .iter()
        .map(|cell| PositionalCell { text: cell, href: None })
        .collect();
    positional_row(&cells)
}

pub fn parse(content: &str) -> Result<Vec<ImportRow>, AppError> {
    let content = content.trim_start_matches('\u{feff}');
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut records = tokenize(content, sniff_delimiter(content))?
        .into_iter()
        .filter(|record| record.iter().any(|cell| !cell.trim().is_empty()));

    let Some(first) = records.next() else {
        return Ok(Vec::new());
    };

    let columns: Vec<Option<Field>> = first.iter().map(|cell| field_for_header(cell)).collect();
    let has_header = columns.iter().any(|c| matches!(c, Some(Field::Url) | Some(Field::Name)));

    let mut rows = Vec::new();
    if !has_header {
        rows.push(positional_record(&first));
    }

    for record in records {
        if !has_header {
            rows.push(positional_record(&record));
            continue;
        }
        let mut row = ImportRow::default();
        for (cell, column) in record.iter().zip(&columns) {
            if let Some(field) = column {
                row.set(*field, cell);
            }
        }
        rows.push(row);
    }

    tracing::debug!(rows = rows.len(), has_header, "csv parsed");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pricing;

    #[test]
    fn doubled_quotes_inside_quoted_cell() {
        let csv = "name,url,description\n\"Site\",https://a.io,\"He said \"\"hi, there\"\"\"\n";
        let rows = parse(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description.as_deref(), Some("He said \"hi, there\""));
    }

    #[test]
    fn header_synonyms_and_semicolons() {
        let csv = "\u{feff}Title;Link;Folder;Price\r\nGitHub;github.com;Dev;Besplatno\r\n";
        let rows = parse(csv).unwrap();
        assert_eq!(rows[0].name, "GitHub");
        assert_eq!(rows[0].url, "github.com");
        assert_eq!(rows[0].categories, vec!["Dev".to_string()]);
        assert_eq!(rows[0].pricing, Some(Pricing::FullyFree));
    }

    #[test]
    fn embedded_newline_in_quotes() {
        let csv = "name,url,notes\nA,https://a.io,\"line one\nline two\"\n";
        let rows = parse(csv).unwrap();
        assert_eq!(rows[0].description.as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = parse("name,url\n\"broken,https://a.io\n").unwrap_err();
        assert!(matches!(err, AppError::ImportParse(_)));
    }

    #[test]
    fn backslash_escaped_quotes_and_crlf() {
        let records = tokenize("a,\"say \\\"x\\\"\"\r\nb,c\r\n", ',').unwrap();
        assert_eq!(records, vec![vec!["a", "say \"x\""], vec!["b", "c"]]);
    }

    #[test]
    fn headerless_rows_are_positional() {
        let rows = parse("Example,https://example.com\nOther,other.org\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Example");
        assert_eq!(rows[1].url, "other.org");
    }

    #[test]
    fn headerless_dotted_name_stays_the_name() {
        let rows = parse("Node.js,https://nodejs.org\nVue.js,vuejs.org\ngithub.com\n").unwrap();
        assert_eq!(rows[0].name, "Node.js");
        assert_eq!(rows[0].url, "https://nodejs.org");
        assert_eq!(rows[1].name, "Vue.js");
        assert_eq!(rows[1].url, "vuejs.org");
        assert!(rows[2].name.is_empty());
        assert_eq!(rows[2].url, "github.com");
    }

    #[test]
    fn trailing_backslash_closes_the_cell() {
        let records = tokenize("\"C:\\dir\\\",next\n\"end\\\"\n", ',').unwrap();
        assert_eq!(records, vec![vec!["C:\\dir\\", "next"], vec!["end\\"]]);
    }
}
