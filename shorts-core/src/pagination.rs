use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// One window over a sorted title list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct TitlePage {
    pub items: Vec<String>,
    /// Zero-based page number that was requested
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_count: usize,
}

/// Slice page `page` (zero-based) of `page_size` items out of `sorted`.
///
/// A page past the end is empty but still reports the real totals.
pub fn paginate<S: AsRef<str>>(sorted: &[S], page: usize, page_size: usize) -> Result<TitlePage> {
    if page_size == 0 {
        return Err(Error::InvalidInput("page size must be positive".to_string()));
    }

    let total_count = sorted.len();
    let total_pages = total_count.div_ceil(page_size);
    let items = match page.checked_mul(page_size) {
        Some(start) if start < total_count => sorted[start..]
            .iter()
            .take(page_size)
            .map(|title| title.as_ref().to_string())
            .collect(),
        _ => Vec::new(),
    };

    Ok(TitlePage {
        items,
        page,
        page_size,
        total_pages,
        total_count,
    })
}
