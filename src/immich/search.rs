//! Page-at-a-time asset stream.
//!
//! Pages are requested lazily: the next page is fetched only once every
//! asset of the current page has been pulled. Every request carries the same
//! filter (including the `createdAfter` bound); only the page number moves.
//! The stream ends at the first empty page and also after the first error.

use std::collections::VecDeque;

use futures_util::stream::{self, Stream};

use super::catalog::AssetCatalog;
use super::error::ImmichError;
use super::types::{Asset, AssetFilter};

/// Assets requested per page.
pub(crate) const PAGE_SIZE: u32 = 200;

struct Cursor<'a> {
    catalog: &'a dyn AssetCatalog,
    filter: AssetFilter,
    next_page: u32,
    buffered: VecDeque<Asset>,
    exhausted: bool,
}

/// Stream every asset matching `filter` in ascending `createdAt` order.
///
/// Finite and not restartable; a failed page request yields one `Err` and
/// ends the stream.
pub(crate) fn find_assets(
    catalog: &dyn AssetCatalog,
    filter: AssetFilter,
) -> impl Stream<Item = Result<Asset, ImmichError>> + Send + '_ {
    let cursor = Cursor {
        catalog,
        filter,
        next_page: 1,
        buffered: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        loop {
            if let Some(asset) = cursor.buffered.pop_front() {
                return Ok(Some((asset, cursor)));
            }
            if cursor.exhausted {
                return Ok(None);
            }

            let page = cursor.next_page;
            let items = cursor
                .catalog
                .search_page(&cursor.filter, page, PAGE_SIZE)
                .await?;
            tracing::debug!(page, count = items.len(), "Fetched asset page");

            if items.is_empty() {
                cursor.exhausted = true;
            } else {
                cursor.next_page += 1;
                cursor.buffered.extend(items);
            }
        }
    })
}
