//! Export of an owner's catalog in the shapes the importer reads back

use crate::database::Catalog;
use crate::error::AppError;
use crate::list_query::shape_full;
use crate::model::{RelationRef, SiteView};

pub const EXPORT_HEADER: [&str; 9] = [
    "name",
    "url",
    "pricing",
    "categories",
    "tags",
    "description",
    "use_case",
    "favorite",
    "pinned",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
}

impl ExportFormat {
    /// Unknown or missing values fall back to JSON
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("csv") => ExportFormat::Csv,
            Some("html") | Some("htm") => ExportFormat::Html,
            _ => ExportFormat::Json,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub format: ExportFormat,
    pub filename: String,
    pub body: String,
}

fn joined(refs: &[RelationRef]) -> String {
    refs.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(";")
}

fn cells(view: &SiteView) -> [String; 9] {
    let site = &view.site;
    [
        site.name.clone(),
        site.url.clone(),
        site.pricing.map(|p| p.as_str().to_string()).unwrap_or_default(),
        joined(&view.categories),
        joined(&view.tags),
        site.description.clone().unwrap_or_default(),
        site.use_case.clone().unwrap_or_default(),
        site.is_favorite.to_string(),
        site.is_pinned.to_string(),
    ]
}

fn to_csv(views: &[SiteView]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let write_err = |e: csv::Error| AppError::Upstream(format!("csv export failed: {e}"));

    writer.write_record(EXPORT_HEADER).map_err(write_err)?;
    for view in views {
        writer.write_record(cells(view)).map_err(write_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Upstream(format!("csv export failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Upstream(format!("csv export failed: {e}")))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn to_html(views: &[SiteView]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Sites</title></head>\n<body>\n<table>\n<tr>",
    );
    for column in EXPORT_HEADER {
        html.push_str(&format!("<th>{column}</th>"));
    }
    html.push_str("</tr>\n");

    for view in views {
        html.push_str("<tr>");
        for (index, cell) in cells(view).iter().enumerate() {
            if index == 1 {
                let url = escape_html(cell);
                html.push_str(&format!("<td><a href=\"{url}\">{url}</a></td>"));
            } else {
                html.push_str(&format!("<td>{}</td>", escape_html(cell)));
            }
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Renders every site of `user_id`, oldest first
///
/// A failed relation batch fails the export rather than emitting sites
/// with missing categories or tags.
pub fn export(
    catalog: &Catalog,
    user_id: &str,
    format: ExportFormat,
    batch_size: usize,
) -> Result<ExportFile, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("user_id"));
    }

    let mut sites = catalog.list_sites(Some(user_id))?;
    sites.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let (views, failures) = shape_full(catalog, sites, batch_size)?;
    if let Some(failure) = failures.first() {
        return Err(AppError::Upstream(format!(
            "export aborted, {} relation batch(es) failed: {}",
            failures.len(),
            failure.error
        )));
    }

    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&views)?,
        ExportFormat::Csv => to_csv(&views)?,
        ExportFormat::Html => to_html(&views),
    };
    tracing::info!(user_id, sites = views.len(), format = format.extension(), "export rendered");

    Ok(ExportFile {
        format,
        filename: format!("sites-{}.{}", chrono::Utc::now().format("%Y%m%d"), format.extension()),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_fallback() {
        assert_eq!(ExportFormat::parse(Some("CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(Some("htm")), ExportFormat::Html);
        assert_eq!(ExportFormat::parse(Some("xml")), ExportFormat::Json);
        assert_eq!(ExportFormat::parse(None), ExportFormat::Json);
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }
}
