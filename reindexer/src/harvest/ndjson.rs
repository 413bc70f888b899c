//! Newline-delimited JSON harvester.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{future, StreamExt};
use reindexer_shared::{Document, Resource, Source, SourceMode};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

use super::{DocumentHarvester, DocumentStream};
use crate::errors::ReindexError;

/// Reads `<resource name>.ndjson`, one JSON object per line.
///
/// Files live in the source directory for `pdf` sources and in
/// `<documents dir>/<source id>/` for every other mode. Blank lines are
/// skipped.
#[derive(Debug, Clone)]
pub struct NdjsonHarvester {
    documents_dir: PathBuf,
}

impl NdjsonHarvester {
    pub fn new(documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents_dir: documents_dir.into(),
        }
    }

    /// Directory holding the files of `source`.
    pub fn directory_for(&self, source: &Source) -> PathBuf {
        match source.mode {
            SourceMode::Pdf => PathBuf::from(&source.uri),
            _ => self.documents_dir.join(source.id.to_string()),
        }
    }

    pub fn path_for(&self, source: &Source, resource: &Resource) -> PathBuf {
        self.directory_for(source)
            .join(format!("{}.ndjson", resource.name))
    }
}

/// Parse one line into a document.
pub(crate) fn parse_line(line: &str) -> Result<Document, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("expected a JSON object".to_string());
    }
    Ok(Document::from_value(value))
}

fn located(path: &Path, line: usize, err: impl std::fmt::Display) -> ReindexError {
    ReindexError::harvest(format!("{}:{}: {}", path.display(), line, err))
}

#[async_trait]
impl DocumentHarvester for NdjsonHarvester {
    async fn collect(
        &self,
        source: &Source,
        resource: &Resource,
    ) -> Result<DocumentStream, ReindexError> {
        let path = self.path_for(source, resource);
        let file = File::open(&path)
            .await
            .map_err(|e| ReindexError::harvest(format!("cannot open {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), resource = %resource.name, "Harvesting documents");

        let stream = LinesStream::new(BufReader::new(file).lines())
            .enumerate()
            .filter_map(move |(n, line)| {
                let item = match line {
                    Err(e) => Some(Err(located(&path, n + 1, e))),
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(parse_line(&line).map_err(|e| located(&path, n + 1, e))),
                };
                future::ready(item)
            })
            .boxed();

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use uuid::Uuid;

    fn fixtures(dir: &Path, lines: &str) -> (Source, Resource) {
        let source = Source::new("s", "https://example.org/wfs", SourceMode::Wfs, "alice");
        let source_dir = dir.join(source.id.to_string());
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(source_dir.join("roads.ndjson"), lines).unwrap();
        let resource = Resource::new("roads", source.id, vec![]);
        (source, resource)
    }

    #[tokio::test]
    async fn test_collect_reads_documents() {
        let dir = tempfile::tempdir().unwrap();
        let (source, resource) = fixtures(
            dir.path(),
            "{\"id\": \"r1\", \"name\": \"A1\"}\n\n{\"name\": \"N7\"}\n",
        );

        let harvester = NdjsonHarvester::new(dir.path());
        let documents: Vec<Document> = harvester
            .collect(&source, &resource)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id.as_deref(), Some("r1"));
        assert_eq!(documents[1].id, None);
        assert_eq!(documents[1].body, json!({"name": "N7"}));
    }

    #[tokio::test]
    async fn test_malformed_line_is_a_harvest_error() {
        let dir = tempfile::tempdir().unwrap();
        let (source, resource) = fixtures(dir.path(), "{\"id\": 1}\n[1, 2]\n");

        let harvester = NdjsonHarvester::new(dir.path());
        let result: Result<Vec<Document>, _> = harvester
            .collect(&source, &resource)
            .await
            .unwrap()
            .try_collect()
            .await;

        match result {
            Err(ReindexError::HarvestError(msg)) => assert!(msg.contains(":2:")),
            other => panic!("expected harvest error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let source = Source::new("s", "https://example.org", SourceMode::Wfs, "alice");
        let resource = Resource::new("absent", Uuid::new_v4(), vec![]);

        let harvester = NdjsonHarvester::new(dir.path());
        assert!(matches!(
            harvester.collect(&source, &resource).await,
            Err(ReindexError::HarvestError(_))
        ));
    }

    #[test]
    fn test_pdf_sources_read_from_their_own_directory() {
        let harvester = NdjsonHarvester::new("/data/documents");
        let pdf = Source::new("p", "/srv/pdf", SourceMode::Pdf, "alice");
        let resource = Resource::new("reports", pdf.id, vec![]);
        assert_eq!(
            harvester.path_for(&pdf, &resource),
            PathBuf::from("/srv/pdf/reports.ndjson")
        );
    }

    #[tokio::test]
    async fn test_sources_sharing_a_resource_name_read_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let (first, roads) = fixtures(dir.path(), "{\"id\": \"from-first\"}\n");
        let (second, _) = fixtures(dir.path(), "{\"id\": \"from-second\"}\n");
        let harvester = NdjsonHarvester::new(dir.path());
        assert_ne!(harvester.directory_for(&first), harvester.directory_for(&second));

        for (source, expected) in [(&first, "from-first"), (&second, "from-second")] {
            let documents: Vec<Document> = harvester
                .collect(source, &roads)
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap();
            assert_eq!(documents.len(), 1);
            assert_eq!(documents[0].id.as_deref(), Some(expected));
        }
    }
}
