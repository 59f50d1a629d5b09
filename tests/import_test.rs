//! Import normalizer tests over whole files

use site_catalog::error::AppError;
use site_catalog::import::{self, normalize_pricing, ImportFormat};
use site_catalog::model::Pricing;

#[test]
fn pricing_vocabulary() {
    assert_eq!(normalize_pricing("Besplatno"), Some(Pricing::FullyFree));
    assert_eq!(normalize_pricing("  FREE  "), Some(Pricing::FullyFree));
    assert_eq!(normalize_pricing("kostenlos"), Some(Pricing::FullyFree));
    assert_eq!(normalize_pricing("Freemium"), Some(Pricing::Freemium));
    assert_eq!(normalize_pricing("free_trial"), Some(Pricing::FreeTrial));
    assert_eq!(normalize_pricing("14-day free trial"), Some(Pricing::FreeTrial));
    assert_eq!(normalize_pricing("Subscription"), Some(Pricing::Paid));
    assert_eq!(normalize_pricing("$9 per month"), Some(Pricing::Paid));
    assert_eq!(normalize_pricing("gibberish"), None);
    assert_eq!(normalize_pricing(""), None);

    // Keywords count only as whole words or word starts
    assert_eq!(normalize_pricing("Free for students"), Some(Pricing::FullyFree));
    assert_eq!(normalize_pricing("free with pro upgrade"), Some(Pricing::Freemium));
    assert_eq!(normalize_pricing("Monthly subscriptions"), Some(Pricing::Paid));
    assert_eq!(normalize_pricing("€ 12"), Some(Pricing::Paid));
    assert_eq!(normalize_pricing("workplace"), None);
    assert_eq!(normalize_pricing("placeholder"), None);
    assert_eq!(normalize_pricing("replace"), None);
    assert_eq!(normalize_pricing("freedom"), None);
    assert_eq!(normalize_pricing("unpaid intern"), None);
    assert_eq!(normalize_pricing("gratuity"), None);
}

#[test]
fn csv_cell_with_doubled_quotes() {
    let csv = "name,url,description\nQuote,https://quote.io,\"He said \"\"hi, there\"\"\"\n";
    let parsed = import::parse("sites.csv", csv).unwrap();

    assert_eq!(parsed.format, ImportFormat::Csv);
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rows[0].description.as_deref(), Some("He said \"hi, there\""));
}

#[test]
fn headerless_files_keep_dotted_names() {
    let parsed = import::parse("tools.csv", "Node.js,https://nodejs.org\nVue.js,vuejs.org\n").unwrap();
    assert_eq!(parsed.rows[0].name, "Node.js");
    assert_eq!(parsed.rows[0].url, "https://nodejs.org");
    assert_eq!(parsed.rows[1].name, "Vue.js");
    assert_eq!(parsed.rows[1].url, "https://vuejs.org");

    let html = "<table><tr><td>Node.js</td><td>https://nodejs.org</td></tr></table>";
    let parsed = import::parse("t.html", html).unwrap();
    assert_eq!(parsed.rows[0].name, "Node.js");
    assert_eq!(parsed.rows[0].url, "https://nodejs.org");
}

#[test]
fn rows_without_web_url_are_discarded() {
    let csv = "name,url\nGood,good.io\nMail,mailto:me@x.io\nEmpty,\nScript,javascript:void(0)\n";
    let parsed = import::parse("sites.csv", csv).unwrap();

    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rows[0].url, "https://good.io");
    assert_eq!(parsed.discarded, 3);
}

#[test]
fn bookmarks_under_two_folders_merge() {
    let html = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<DL><p>
    <DT><H3>Other bookmarks</H3>
    <DL><p>
        <DT><H3>Reading</H3>
        <DL><p>
            <DT><A HREF="https://example.com/">Example</A>
        </DL><p>
        <DT><H3>Work</H3>
        <DL><p>
            <DT><A HREF="HTTPS://EXAMPLE.COM">Example</A>
        </DL><p>
    </DL><p>
</DL><p>"#;
    let parsed = import::parse("export.html", html).unwrap();

    assert_eq!(parsed.format, ImportFormat::Bookmarks);
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.merged, 1);
    assert_eq!(parsed.rows[0].categories, vec!["Reading".to_string(), "Work".to_string()]);
}

#[test]
fn nested_folders_all_become_categories() {
    let html = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<DL><p>
    <DT><H3>Design</H3>
    <DL><p>
        <DT><H3>Icons</H3>
        <DL><p>
            <DT><A HREF="https://icons.io">Icons</A>
        </DL><p>
    </DL><p>
</DL><p>"#;
    let parsed = import::parse("export.htm", html).unwrap();
    assert_eq!(parsed.rows[0].categories, vec!["Design".to_string(), "Icons".to_string()]);
}

#[test]
fn html_table_import() {
    let html = r#"<html><body><table>
        <tr><th>Name</th><th>Link</th><th>Tags</th><th>Pinned</th></tr>
        <tr><td>Figma</td><td>figma.com</td><td>design, ui</td><td>yes</td></tr>
        <tr><td>No link</td><td></td><td></td><td></td></tr>
    </table></body></html>"#;
    let parsed = import::parse("table.html", html).unwrap();

    assert_eq!(parsed.format, ImportFormat::Html);
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rows[0].url, "https://figma.com");
    assert_eq!(parsed.rows[0].tags, vec!["design".to_string(), "ui".to_string()]);
    assert!(parsed.rows[0].is_pinned);
    assert_eq!(parsed.discarded, 1);
}

#[test]
fn json_shapes() {
    let bare = import::parse("a.json", r#"[{"name": "A", "url": "a.io"}]"#).unwrap();
    assert_eq!(bare.rows.len(), 1);

    let wrapped = import::parse("b.json", r#"{"sites": [{"title": "B", "website": "b.io", "tags": ["x"]}]}"#).unwrap();
    assert_eq!(wrapped.rows[0].name, "B");
    assert_eq!(wrapped.rows[0].tags, vec!["x".to_string()]);

    let err = import::parse("c.json", r#"{"unexpected": true}"#).unwrap_err();
    assert!(matches!(err, AppError::ImportParse(_)));
}

#[test]
fn missing_name_falls_back_to_host() {
    let parsed = import::parse("a.json", r#"[{"url": "https://www.example.org/path"}]"#).unwrap();
    assert_eq!(parsed.rows[0].name, "example.org");
}

#[test]
fn unknown_extension_is_sniffed() {
    let parsed = import::parse("upload", "[{\"name\": \"A\", \"url\": \"a.io\"}]").unwrap();
    assert_eq!(parsed.format, ImportFormat::Json);

    let err = import::parse("notes.pdf", "%PDF-1.4").unwrap_err();
    assert!(matches!(err, AppError::ImportParse(_)));
}
