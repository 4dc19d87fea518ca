//! Row-batched retrieval through `offset_rows` / `limit_rows` parameters.
//!
//! The target query must define both template parameters itself, e.g.
//! `... LIMIT {{limit_rows}} OFFSET {{offset_rows}}`.

use tracing::{debug, info, warn};

use crate::client::RedashClient;
use crate::dataframe::DataFrame;
use crate::error::{RedashError, Result};
use crate::request::QueryRequest;

/// Template parameter receiving the row offset of a page.
pub const OFFSET_PARAM: &str = "offset_rows";
/// Template parameter receiving the page size.
pub const LIMIT_PARAM: &str = "limit_rows";

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The last page had fewer rows than the page size.
    ShortPage,
    /// The last page had no rows; it was not appended.
    EmptyPage,
    /// The page cap was reached while pages were still full.
    MaxPages,
}

/// Concatenated pages plus how the fetch ended.
#[derive(Debug, Clone)]
pub struct PagedFrame {
    pub frame: DataFrame,
    /// Number of query executions issued.
    pub pages: usize,
    pub stop: StopReason,
}

impl PagedFrame {
    /// `true` when the page cap cut the fetch short; more rows may exist.
    pub fn is_truncated(&self) -> bool {
        self.stop == StopReason::MaxPages
    }
}

impl RedashClient {
    /// Fetch a large result `page_size` rows at a time.
    ///
    /// Page `i` is requested with `offset_rows = i * page_size` and
    /// `limit_rows = page_size`, overwriting any caller values for those
    /// keys. Stops on the first empty or short page, and after at most
    /// `max_pages` executions even if every page is full.
    pub async fn fetch_paginated(
        &self,
        request: &QueryRequest,
        page_size: usize,
        max_pages: usize,
    ) -> Result<PagedFrame> {
        if page_size == 0 {
            return Err(RedashError::InvalidArgument("page_size must be positive".into()));
        }
        if max_pages == 0 {
            return Err(RedashError::InvalidArgument("max_pages must be positive".into()));
        }

        let mut frame = DataFrame::empty();
        let mut pages = 0;
        let mut stop = StopReason::MaxPages;

        while pages < max_pages {
            let mut page_request = request.clone();
            page_request.set_param(OFFSET_PARAM, pages * page_size);
            page_request.set_param(LIMIT_PARAM, page_size);

            let page = self.execute(&page_request).await?;
            pages += 1;

            let rows = page.row_count();
            debug!(query_id = %request.query_id, page = pages, rows, "Fetched page");

            if page.is_empty() {
                stop = StopReason::EmptyPage;
                break;
            }
            frame.append(page)?;
            if rows < page_size {
                stop = StopReason::ShortPage;
                break;
            }
        }

        if stop == StopReason::MaxPages {
            warn!(
                query_id = %request.query_id,
                max_pages,
                page_size,
                "Page cap reached before a short page; result may be truncated"
            );
        }

        info!(
            query_id = %request.query_id,
            pages,
            rows = frame.row_count(),
            stop = ?stop,
            "Paginated fetch complete"
        );

        Ok(PagedFrame { frame, pages, stop })
    }
}
