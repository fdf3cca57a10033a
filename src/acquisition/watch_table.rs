//! TIA Portal watch-table parser
//!
//! The PLC web server renders a watch table as HTML:
//!
//! ```text
//! <table id="watch_table">
//!   <tr class="var"><td>"Datalog".DATA."Giờ chạy 2"</td><td>..</td><td>..</td><td>128</td></tr>
//!   <tr class="var"><td>"Datalog".DATA.CA</td><td>..</td><td>..</td><td>'CA1'</td></tr>
//! </table>
//! ```
//!
//! Cell 0 carries the tag name and cell 3 the current value. Tag names are
//! normalized to snake_case ASCII keys; values become [`MetricValue`]s.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::types::{MetricValue, Snapshot};

const NAME_CELL: usize = 0;
const VALUE_CELL: usize = 3;

static TABLE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<table\b[^>]*\bid\s*=\s*["']?watch_table\b[^>]*>"#)
        .expect("static regex")
});
static TABLE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</table\s*>").expect("static regex"));
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b([^>]*)>(.*?)</tr\s*>").expect("static regex"));
static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("static regex")
});
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td\s*>").expect("static regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchTableError {
    #[error("no #watch_table element in page")]
    TableNotFound,
}

/// Parse a watch-table page into a snapshot.
///
/// Rows without a value cell and values mentioning `no_scope` (tags outside
/// the PLC's current scope) are skipped. A later row with the same key
/// overwrites an earlier one.
pub fn parse_watch_table(html: &str) -> Result<Snapshot, WatchTableError> {
    let start = TABLE_START
        .find(html)
        .ok_or(WatchTableError::TableNotFound)?;
    let body = &html[start.end()..];
    let body = TABLE_END.find(body).map_or(body, |m| &body[..m.start()]);

    let mut snapshot = Snapshot::new();
    let mut skipped = 0usize;
    for row in ROW.captures_iter(body) {
        if !has_var_class(&row[1]) {
            continue;
        }
        let cells: Vec<&str> = CELL
            .captures_iter(&row[2])
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let (Some(name), Some(value)) = (cells.get(NAME_CELL), cells.get(VALUE_CELL)) else {
            skipped += 1;
            continue;
        };

        let key = normalize_key(&cell_text(name));
        let text = cell_text(value);
        // Lamp icons render as an <img> with no text content.
        let raw = if text.is_empty() { value.to_string() } else { text };

        let value = parse_value(&raw);
        if matches!(&value, MetricValue::Text(s) if s.contains("no_scope")) {
            skipped += 1;
            continue;
        }
        snapshot.insert(key, value);
    }

    debug!(tags = snapshot.len(), skipped, "Parsed watch table");
    Ok(snapshot)
}

fn has_var_class(attrs: &str) -> bool {
    CLASS_ATTR.captures(attrs).is_some_and(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .or_else(|| c.get(3))
            .is_some_and(|m| m.as_str().split_whitespace().any(|cls| cls == "var"))
    })
}

/// Visible text of a cell: markup removed, common entities decoded, trimmed.
fn cell_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Canonical key for a PLC tag name.
///
/// `"Datalog".DATA."Giờ chạy 2"` becomes `datalog_data_gio_chay_2`,
/// `"Datalog".Date` becomes `datalog_date`, `"Năng suất(kg/h)"` becomes
/// `nang_suatkg_h`.
pub fn normalize_key(raw: &str) -> String {
    let unquoted = raw.replace('"', "");
    let parts: Vec<&str> = unquoted.trim().split('.').collect();
    let last = parts.last().copied().unwrap_or_default();

    let key = if parts.len() > 1 {
        let mut prefix = parts[0].to_lowercase();
        if parts[1] == "DATA" {
            prefix.push_str("_data");
        }
        format!("{prefix}_{last}")
    } else {
        last.to_string()
    };

    key.chars()
        .filter(|c| !matches!(c, '(' | ')'))
        .map(|c| match c {
            '/' | ',' | ' ' => '_',
            c => fold_vietnamese(c).unwrap_or(c),
        })
        .collect::<String>()
        .to_lowercase()
}

/// Base Latin letter of an accented Vietnamese letter.
fn fold_vietnamese(c: char) -> Option<char> {
    let base = match c {
        'à' | 'á' | 'ạ' | 'ả' | 'ã' | 'â' | 'ầ' | 'ấ' | 'ậ' | 'ẩ' | 'ẫ' | 'ă' | 'ằ' | 'ắ' | 'ặ'
        | 'ẳ' | 'ẵ' | 'À' | 'Á' | 'Ạ' | 'Ả' | 'Ã' | 'Â' | 'Ầ' | 'Ấ' | 'Ậ' | 'Ẩ' | 'Ẫ' | 'Ă'
        | 'Ằ' | 'Ắ' | 'Ặ' | 'Ẳ' | 'Ẵ' => 'a',
        'è' | 'é' | 'ẹ' | 'ẻ' | 'ẽ' | 'ê' | 'ề' | 'ế' | 'ệ' | 'ể' | 'ễ' | 'È' | 'É' | 'Ẹ' | 'Ẻ'
        | 'Ẽ' | 'Ê' | 'Ề' | 'Ế' | 'Ệ' | 'Ể' | 'Ễ' => 'e',
        'ì' | 'í' | 'ị' | 'ỉ' | 'ĩ' | 'Ì' | 'Í' | 'Ị' | 'Ỉ' | 'Ĩ' => 'i',
        'ò' | 'ó' | 'ọ' | 'ỏ' | 'õ' | 'ô' | 'ồ' | 'ố' | 'ộ' | 'ổ' | 'ỗ' | 'ơ' | 'ờ' | 'ớ' | 'ợ'
        | 'ở' | 'ỡ' | 'Ò' | 'Ó' | 'Ọ' | 'Ỏ' | 'Õ' | 'Ô' | 'Ồ' | 'Ố' | 'Ộ' | 'Ổ' | 'Ỗ' | 'Ơ'
        | 'Ờ' | 'Ớ' | 'Ợ' | 'Ở' | 'Ỡ' => 'o',
        'ù' | 'ú' | 'ụ' | 'ủ' | 'ũ' | 'ư' | 'ừ' | 'ứ' | 'ự' | 'ử' | 'ữ' | 'Ù' | 'Ú' | 'Ụ' | 'Ủ'
        | 'Ũ' | 'Ư' | 'Ừ' | 'Ứ' | 'Ự' | 'Ử' | 'Ữ' => 'u',
        'ỳ' | 'ý' | 'ỵ' | 'ỷ' | 'ỹ' | 'Ỳ' | 'Ý' | 'Ỵ' | 'Ỷ' | 'Ỹ' => 'y',
        'đ' | 'Đ' => 'd',
        _ => return None,
    };
    Some(base)
}

/// Typed value of a watch-table cell.
///
/// - lamp icons and anything mentioning `true`/`false` become booleans
/// - `D#2024-05-01` date literals become text without the prefix
/// - comma decimals become numbers
/// - everything else stays text
pub fn parse_value(raw: &str) -> MetricValue {
    let value = raw.trim().trim_matches('\'');

    if value.contains("icontrue.gif") || value.contains("true") {
        return MetricValue::Bool(true);
    }
    if value.contains("iconfalse.gif") || value.contains("false") {
        return MetricValue::Bool(false);
    }
    if let Some(date) = value.strip_prefix("D#") {
        return MetricValue::Text(date.to_string());
    }

    let numeric = value.replace(',', ".");
    match parse_number(&numeric) {
        Some(x) => MetricValue::Number(x),
        None => MetricValue::Text(value.to_string()),
    }
}

/// Plain decimal or exponent notation; `inf`/`nan` spellings are text.
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty()
        || s.chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
    {
        return None;
    }
    s.parse::<f64>().ok().filter(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<table id="header"><tr class="var"><td>ignored</td><td></td><td></td><td>1</td></tr></table>
<table id="watch_table" class="grid">
  <tr class="head"><td>Name</td><td>Address</td><td>Format</td><td>Value</td></tr>
  <tr class="var"><td>"Datalog".DATA."Giờ chạy 2"</td><td>%DB1</td><td>DEC</td><td>128,5</td></tr>
  <tr class="var odd"><td>"Datalog".DATA.CA</td><td></td><td></td><td>'CA1'</td></tr>
  <tr class="var"><td>"Datalog".Date</td><td></td><td></td><td>D#2024-05-01</td></tr>
  <tr class="var"><td>"Năng suất(kg/h)"</td><td></td><td></td><td>182.25</td></tr>
  <tr class="var"><td>"Motor".Run</td><td></td><td></td><td><img src="/img/icontrue.gif"></td></tr>
  <tr class="var"><td>"Motor".Fault</td><td></td><td></td><td><img src="/img/iconfalse.gif"></td></tr>
  <tr class="var"><td>"Extruder".Zone5</td><td></td><td></td><td>no_scope</td></tr>
  <tr class="var"><td>"Short row"</td><td>1</td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_parse_page() {
        let snap = parse_watch_table(PAGE).unwrap();
        assert_eq!(
            snap.get("datalog_data_gio_chay_2"),
            Some(&MetricValue::Number(128.5))
        );
        assert_eq!(
            snap.get("datalog_data_ca"),
            Some(&MetricValue::Text("CA1".into()))
        );
        assert_eq!(
            snap.get("datalog_date"),
            Some(&MetricValue::Text("2024-05-01".into()))
        );
        assert_eq!(snap.get("nang_suatkg_h"), Some(&MetricValue::Number(182.25)));
        assert_eq!(snap.get("motor_run"), Some(&MetricValue::Bool(true)));
        assert_eq!(snap.get("motor_fault"), Some(&MetricValue::Bool(false)));
        assert!(snap.get("extruder_zone5").is_none());
        assert!(snap.get("ignored").is_none());
        assert_eq!(snap.len(), 6);
    }

    #[test]
    fn test_missing_table() {
        assert_eq!(
            parse_watch_table("<html><table id=\"other\"></table></html>"),
            Err(WatchTableError::TableNotFound)
        );
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("\"Datalog\".DATA.\"Giờ chạy 2\""), "datalog_data_gio_chay_2");
        assert_eq!(normalize_key(" \"Nhiệt độ/Vùng 1\" "), "nhiet_do_vung_1");
        assert_eq!(normalize_key("\"Line\".Data.Speed"), "line_speed");
        assert_eq!(normalize_key("ĐỘNG CƠ"), "dong_co");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("'true'"), MetricValue::Bool(true));
        assert_eq!(parse_value("FALSE"), MetricValue::Text("FALSE".into()));
        assert_eq!(parse_value("-3,25"), MetricValue::Number(-3.25));
        assert_eq!(parse_value("1e3"), MetricValue::Number(1000.0));
        assert_eq!(parse_value("inf"), MetricValue::Text("inf".into()));
        assert_eq!(parse_value("1,234,5"), MetricValue::Text("1,234,5".into()));
        assert_eq!(parse_value(""), MetricValue::Text(String::new()));
    }
}
