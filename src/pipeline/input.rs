//! Source list: the ordered URLs a run will try to place.
//!
//! URLs come either straight from a library caller or from a CSV file with a
//! `url` column. CSV rows whose status column says the cover was already
//! printed are skipped, which is what makes repeated runs incremental.

use crate::error::CoverGridError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Name of the mandatory CSV column.
pub const URL_COLUMN: &str = "url";

/// One input URL and its 0-based position in the filtered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub index: usize,
    pub url: String,
}

impl SourceItem {
    /// Scratch file name for this item's normalised cover.
    pub fn scratch_name(&self) -> String {
        format!("{}.jpg", self.index + 1)
    }
}

/// Number a list of URLs, dropping blank entries.
pub fn sources_from_urls<I, S>(urls: I) -> Vec<SourceItem>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter_map(|u| {
            let u = u.as_ref().trim();
            (!u.is_empty()).then(|| u.to_string())
        })
        .enumerate()
        .map(|(index, url)| SourceItem { index, url })
        .collect()
}

/// Read the `url` column of a CSV file.
///
/// If a column named `status_column` exists, rows whose trimmed status
/// equals `skip_status` (case-insensitive) are left out.
///
/// # Errors
/// Fatal when the file is missing or unreadable, or has no `url` column.
pub fn read_source_csv(
    path: &Path,
    status_column: &str,
    skip_status: &str,
) -> Result<Vec<SourceItem>, CoverGridError> {
    if !path.exists() {
        return Err(CoverGridError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    let unreadable = |e: csv::Error| CoverGridError::SourceUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;
    let headers = reader.headers().map_err(unreadable)?.clone();

    let url_idx = column_index(&headers, URL_COLUMN).ok_or_else(|| CoverGridError::MissingColumn {
        path: path.to_path_buf(),
        column: URL_COLUMN.to_string(),
    })?;
    let status_idx = column_index(&headers, status_column);
    let skip = skip_status.trim().to_lowercase();

    let mut urls = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.map_err(unreadable)?;
        let status = status_idx
            .and_then(|i| record.get(i))
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        if !skip.is_empty() && status == skip {
            skipped += 1;
            continue;
        }
        if let Some(url) = record.get(url_idx) {
            urls.push(url.to_string());
        }
    }

    let items = sources_from_urls(urls);
    if skipped > 0 {
        debug!("Skipped {} rows with status '{}'", skipped, skip_status);
    }
    info!("Read {} source URLs from {}", items.len(), path.display());
    Ok(items)
}

/// Position of `name` in the header row, ignoring case and surrounding space.
pub(crate) fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn urls_are_numbered_after_dropping_blanks() {
        let items = sources_from_urls(["https://a", "  ", "https://b "]);
        assert_eq!(
            items,
            vec![
                SourceItem { index: 0, url: "https://a".into() },
                SourceItem { index: 1, url: "https://b".into() },
            ]
        );
        assert_eq!(items[1].scratch_name(), "2.jpg");
    }

    #[test]
    fn reads_url_column_in_order() {
        let f = csv_file("title,url\nDune,https://a.example/1\nEmma,https://a.example/2\n");
        let items = read_source_csv(f.path(), "status", "printed").unwrap();
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/1", "https://a.example/2"]);
    }

    #[test]
    fn printed_rows_are_skipped() {
        let f = csv_file(
            "url,status\nhttps://a/1,printed\nhttps://a/2,\nhttps://a/3, Printed \nhttps://a/4,todo\n",
        );
        let items = read_source_csv(f.path(), "status", "printed").unwrap();
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/2", "https://a/4"]);
        assert_eq!(items[1].index, 1);
    }

    #[test]
    fn missing_url_column_is_fatal() {
        let f = csv_file("link,status\nhttps://a/1,\n");
        let err = read_source_csv(f.path(), "status", "printed").unwrap_err();
        assert!(matches!(err, CoverGridError::MissingColumn { ref column, .. } if column == "url"));
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = read_source_csv(Path::new("/definitely/not/here.csv"), "status", "printed")
            .unwrap_err();
        assert!(matches!(err, CoverGridError::SourceNotFound { .. }));
    }

    #[test]
    fn header_match_ignores_case() {
        let f = csv_file("URL\nhttps://a/1\n");
        assert_eq!(read_source_csv(f.path(), "status", "printed").unwrap().len(), 1);
    }
}
