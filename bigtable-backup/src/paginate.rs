//! Lazy iteration over token-paginated list APIs.
//!
//! Both the Bigtable table listing and the Cloud Storage object listing hand
//! back one page at a time plus a continuation token. [`paginate`] turns such
//! an endpoint into a single stream of items that fetches the next page only
//! when the previous one has been consumed.

use crate::{BackupError, Result};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::future::Future;

/// One page of a list response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the following page; `None` or empty on the last page.
    pub next_page_token: Option<String>,
}

#[cfg(test)]
impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }
}

/// Stream every item of a paginated collection.
///
/// `fetch` is called with `None` for the first page and with the previous
/// page's token afterwards, until a page arrives without a token. An error
/// from `fetch` ends the stream after being yielded.
pub fn paginate<'a, T, F, Fut>(fetch: F) -> BoxStream<'a, Result<T>>
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    // `Some(token)` means another page must be fetched; `None` means done.
    let cursor: Option<Option<String>> = Some(None);

    stream::try_unfold((fetch, cursor), |(mut fetch, cursor)| async move {
        let Some(token) = cursor else {
            return Ok::<_, BackupError>(None);
        };

        let page = fetch(token).await?;
        let next = page
            .next_page_token
            .filter(|token| !token.is_empty())
            .map(Some);

        Ok(Some((page.items, (fetch, next))))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
