// =============================================================================
// html_table.rs — READING TABLES THE EDIT SITE NEVER MEANT FOR MACHINES
// =============================================================================
//
// The edit site renders every case as one HTML table:
//
//   <table>
//     <thead><tr><th>Service</th><th>Title</th><th>Status</th></tr></thead>
//     <tbody>
//       <tr><td><a href="...">DuckDuckGo</a></td><td>...</td><td>approved</td></tr>
//       ...
//     </tbody>
//   </table>
//
// We turn that into a sequence of header -> cell text maps. Headers come from
// the <thead>'s <th> cells in document order. Each body row is zipped 1:1
// against them, strictly: a row with too few or too many cells is an error,
// never a silently padded or truncated map.
//
// The document is parsed once, up front; rows are zipped lazily as the
// caller pulls them. The returned sequence can be walked exactly once.
// =============================================================================

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use crate::error::HtmlTableError;

/// One body row: header text -> flattened cell text.
pub type Row = BTreeMap<String, String>;

/// The rows of one table, zipped on demand.
#[derive(Debug)]
pub struct TableRows {
    headers: Vec<String>,
    rows: std::iter::Enumerate<std::vec::IntoIter<Vec<String>>>,
}

impl TableRows {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for TableRows {
    type Item = Result<Row, HtmlTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, cells) = self.rows.next()?;
        if cells.len() != self.headers.len() {
            return Some(Err(HtmlTableError::RowShape {
                row: index + 1,
                expected: self.headers.len(),
                found: cells.len(),
            }));
        }
        Some(Ok(self.headers.iter().cloned().zip(cells).collect()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// Extract the rows of the first `<table>` in `markup`.
///
/// Fails with `TagNotFound` when there's no table, no `<thead>`, or no header
/// cells. A table without body rows is fine and yields nothing. Only the
/// table's own sections, rows and cells count; a table nested inside a cell
/// is just part of that cell's text.
pub fn extract_rows(markup: &str) -> Result<TableRows, HtmlTableError> {
    let document = Html::parse_document(markup);
    let table = find_first(document.root_element(), "table")?;

    let header_group = children(table, &["thead"])
        .next()
        .ok_or_else(|| HtmlTableError::tag_not_found("thead"))?;
    let headers: Vec<String> = children(header_group, &["tr"])
        .flat_map(|row| children(row, &["th"]))
        .map(|cell| flat_text(cell).trim().to_string())
        .collect();
    if headers.is_empty() {
        return Err(HtmlTableError::tag_not_found("th"));
    }

    // html5ever wraps bare <tr>s in an implicit <tbody>, so a missing tbody
    // really does mean "no body rows".
    let rows: Vec<Vec<String>> = children(table, &["tbody"])
        .flat_map(|body| children(body, &["tr"]))
        .map(|row| children(row, &["th", "td"]).map(flat_text).collect())
        .collect();

    Ok(TableRows {
        headers,
        rows: rows.into_iter().enumerate(),
    })
}

/// Direct element children of `scope` named one of `names`.
fn children<'a>(
    scope: ElementRef<'a>,
    names: &'static [&'static str],
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    scope
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| names.contains(&el.value().name()))
}

fn find_first<'a>(scope: ElementRef<'a>, name: &'static str) -> Result<ElementRef<'a>, HtmlTableError> {
    scope
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == name)
        .ok_or_else(|| HtmlTableError::tag_not_found(name))
}

/// All text under the element with the tags stripped.
fn flat_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASE_PAGE: &str = r#"
        <html><body>
          <h1>Case 175</h1>
          <table class="table">
            <thead><tr><th>Service</th><th>Title</th><th>Status</th></tr></thead>
            <tbody>
              <tr><td><a href="/services/222">DuckDuckGo</a></td><td>No tracking</td><td>approved</td></tr>
              <tr><td>Startpage</td><td><em>No</em> tracking</td><td>pending</td></tr>
              <tr><td>Qwant</td><td>No tracking</td><td>declined</td></tr>
            </tbody>
          </table>
        </body></html>
    "#;

    #[test]
    fn test_three_rows_with_all_headers() {
        let rows: Vec<Row> = extract_rows(CASE_PAGE)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 3);
        for row in &rows {
            for key in ["Service", "Title", "Status"] {
                assert!(row.contains_key(key), "missing {key}");
            }
        }
        assert_eq!(rows[0]["Service"], "DuckDuckGo");
        assert_eq!(rows[1]["Title"], "No tracking");
    }

    #[test]
    fn test_headers_in_document_order() {
        let rows = extract_rows(CASE_PAGE).unwrap();
        assert_eq!(rows.headers(), ["Service", "Title", "Status"]);
    }

    #[test]
    fn test_no_table_is_tag_not_found() {
        let err = extract_rows("<html><body><p>nothing here</p></body></html>").unwrap_err();
        assert_eq!(err, HtmlTableError::tag_not_found("table"));
    }

    #[test]
    fn test_table_without_thead_is_tag_not_found() {
        let err = extract_rows("<table><tr><td>a</td></tr></table>").unwrap_err();
        assert_eq!(err, HtmlTableError::tag_not_found("thead"));
    }

    #[test]
    fn test_short_row_fails_strict_zip() {
        let markup = r#"
            <table>
              <thead><tr><th>Service</th><th>Title</th><th>Status</th></tr></thead>
              <tbody>
                <tr><td>A</td><td>B</td><td>C</td></tr>
                <tr><td>only two</td><td>cells</td></tr>
              </tbody>
            </table>
        "#;
        let mut rows = extract_rows(markup).unwrap();
        assert!(rows.next().unwrap().is_ok());
        assert_eq!(
            rows.next().unwrap().unwrap_err(),
            HtmlTableError::RowShape { row: 2, expected: 3, found: 2 }
        );
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_empty_body_yields_nothing() {
        let markup = "<table><thead><tr><th>Service</th></tr></thead><tbody></tbody></table>";
        assert_eq!(extract_rows(markup).unwrap().count(), 0);
    }

    #[test]
    fn test_header_whitespace_is_trimmed() {
        let markup = "<table><thead><tr><th>\n  Service </th><th> Status\n</th></tr></thead>\
                      <tbody><tr><td>A</td><td>ok</td></tr></tbody></table>";
        let mut rows = extract_rows(markup).unwrap();
        assert_eq!(rows.headers(), ["Service", "Status"]);
        assert_eq!(rows.next().unwrap().unwrap()["Service"], "A");
    }

    #[test]
    fn test_nested_table_stays_inside_its_cell() {
        let markup = r#"
            <table>
              <thead><tr><th>Service</th><th>Title</th><th>Status</th></tr></thead>
              <tbody>
                <tr>
                  <td>A</td>
                  <td><table><tbody><tr><td>inner</td><td>quote</td></tr></tbody></table></td>
                  <td>approved</td>
                </tr>
                <tr><td>B</td><td>plain</td><td>pending</td></tr>
              </tbody>
            </table>
        "#;
        let rows: Vec<Row> = extract_rows(markup)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Title"], "innerquote");
        assert_eq!(rows[0]["Status"], "approved");
        assert_eq!(rows[1]["Service"], "B");
    }
}
