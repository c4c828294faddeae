//! Pagination draining.
//!
//! A query answers with its first [`QueryPage`]; while the page is not
//! `done`, its `nextRecordsUrl` is resolved against the transport's instance
//! URL and fetched with a `GET`. [`PageStream`] walks that chain one page at
//! a time, in the order the server issues cursors, and stops at the first
//! terminal page, the first transport failure, or the page guard.

use forceorm_core::{ForceError, ForceResult};
use tracing::{debug, trace};

use crate::transport::{Endpoint, QueryPage, RawRecord, Transport};

/// A cursor-following reader over the pages of one query.
pub struct PageStream<'a> {
    transport: &'a dyn Transport,
    first: Option<QueryPage>,
    cursor: Option<String>,
    pages_fetched: usize,
    max_pages: usize,
}

impl std::fmt::Debug for PageStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStream")
            .field("cursor", &self.cursor)
            .field("pages_fetched", &self.pages_fetched)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl<'a> PageStream<'a> {
    /// Issues `soql` against `endpoint` and holds on to the first page.
    pub async fn open(
        transport: &'a dyn Transport,
        endpoint: Endpoint,
        soql: &str,
        max_pages: usize,
    ) -> ForceResult<Self> {
        let first = transport.query_endpoint(endpoint, soql).await?;
        Ok(Self {
            transport,
            first: Some(first),
            cursor: None,
            pages_fetched: 1,
            max_pages,
        })
    }

    /// Number of pages requested so far, the first one included.
    pub const fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Returns the records of the next page, or `None` once the terminal
    /// page has been returned.
    pub async fn next_page(&mut self) -> ForceResult<Option<Vec<RawRecord>>> {
        if let Some(page) = self.first.take() {
            return self.accept(page).map(Some);
        }
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };
        if self.pages_fetched >= self.max_pages {
            return Err(ForceError::PaginationLimitExceeded(self.pages_fetched));
        }

        let url = self.follow_up_url(&cursor)?;
        trace!(url = %url, page = self.pages_fetched + 1, "fetching next page");
        let page = self
            .transport
            .request(http::Method::GET, url.as_str())
            .await?
            .into_page()?;
        self.pages_fetched += 1;
        self.accept(page).map(Some)
    }

    /// Drains every remaining page into one sequence.
    pub async fn collect_all(mut self) -> ForceResult<Vec<RawRecord>> {
        let mut records = Vec::new();
        while let Some(batch) = self.next_page().await? {
            records.extend(batch);
        }
        debug!(
            records = records.len(),
            pages = self.pages_fetched,
            "drained query results"
        );
        Ok(records)
    }

    fn accept(&mut self, page: QueryPage) -> ForceResult<Vec<RawRecord>> {
        if !page.done {
            let cursor = page.next_records_url.ok_or_else(|| {
                ForceError::MalformedResponse(
                    "page is not done but carries no nextRecordsUrl".to_string(),
                )
            })?;
            self.cursor = Some(cursor);
        }
        Ok(page.records)
    }

    fn follow_up_url(&self, cursor: &str) -> ForceResult<url::Url> {
        let base = url::Url::parse(self.transport.instance_url()).map_err(|e| {
            ForceError::ConfigurationError(format!(
                "invalid instance url {:?}: {e}",
                self.transport.instance_url()
            ))
        })?;
        base.join(cursor)
            .map_err(|e| ForceError::MalformedResponse(format!("invalid cursor {cursor:?}: {e}")))
    }
}
