//! Offset/limit pagination driver shared by every `*_full` API call.
//!
//! The driver only orchestrates offsets and termination. Items are handed to
//! the caller through side effects inside the fetch closure; accumulating them
//! is the caller's job.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Paging block returned with every page of a paginated response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingState {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PagingError<E> {
    /// A page came back empty while `offset < total`. Upstream totals and the
    /// returned items disagree, so continuing would loop forever.
    #[error("pagination stopped unexpectedly: zero items at offset {offset} of {total}")]
    UnexpectedStop { offset: usize, total: usize },
    #[error("page fetch failed")]
    Fetch(#[source] E),
}

/// Keep calling `fetch` with adjusted paging params until `total` is reached.
///
/// `fetch(offset, limit)` returns the page's [`PagingState`] and the number of
/// items it consumed. The server may adjust `limit`; the adjusted value is used
/// for the following request. `total` is re-read from every page and the latest
/// value is authoritative.
pub async fn paging_load<F, E>(
    offset: usize,
    limit: usize,
    mut fetch: F,
) -> Result<(), PagingError<E>>
where
    F: AsyncFnMut(usize, usize) -> Result<(PagingState, usize), E>,
{
    let (mut state, count) = fetch(offset, limit).await.map_err(PagingError::Fetch)?;

    let mut limit = state.limit;
    let mut offset = offset + count;

    while offset < state.total {
        trace!(offset, limit, total = state.total, "fetching next page");

        let consumed_before = offset;
        let (next, count) = fetch(offset, limit).await.map_err(PagingError::Fetch)?;
        if count == 0 {
            return Err(PagingError::UnexpectedStop {
                offset,
                total: next.total,
            });
        }

        if next.total < consumed_before {
            warn!(
                previous_total = state.total,
                total = next.total,
                consumed = consumed_before,
                "upstream total shrank below consumed item count"
            );
        }

        state = next;
        limit = state.limit;
        offset += count;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Boom;

    /// Serves `total` items in pages of at most `limit`, recording each request.
    struct FakeUpstream {
        total: usize,
        calls: Vec<(usize, usize)>,
        items: Vec<usize>,
    }

    impl FakeUpstream {
        fn new(total: usize) -> Self {
            Self {
                total,
                calls: Vec::new(),
                items: Vec::new(),
            }
        }

        fn page(&mut self, offset: usize, limit: usize) -> (PagingState, usize) {
            self.calls.push((offset, limit));
            let end = (offset + limit).min(self.total);
            let page: Vec<usize> = (offset..end).collect();
            let count = page.len();
            self.items.extend(page);
            (
                PagingState {
                    limit,
                    offset,
                    total: self.total,
                },
                count,
            )
        }
    }

    #[tokio::test]
    async fn fetches_ceil_total_over_limit_pages() {
        let mut upstream = FakeUpstream::new(45);

        paging_load(0, 20, async |offset, limit| {
            Ok::<_, Boom>(upstream.page(offset, limit))
        })
        .await
        .unwrap();

        assert_eq!(upstream.calls, vec![(0, 20), (20, 20), (40, 20)]);
        assert_eq!(upstream.items, (0..45).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn exact_multiple_does_not_request_empty_tail() {
        let mut upstream = FakeUpstream::new(40);

        paging_load(0, 20, async |offset, limit| {
            Ok::<_, Boom>(upstream.page(offset, limit))
        })
        .await
        .unwrap();

        assert_eq!(upstream.calls.len(), 2);
    }

    #[tokio::test]
    async fn empty_resource_needs_a_single_call() {
        let mut upstream = FakeUpstream::new(0);

        paging_load(0, 20, async |offset, limit| {
            Ok::<_, Boom>(upstream.page(offset, limit))
        })
        .await
        .unwrap();

        assert_eq!(upstream.calls, vec![(0, 20)]);
    }

    #[tokio::test]
    async fn honors_server_adjusted_limit() {
        let mut calls = Vec::new();

        paging_load(0, 100, async |offset, limit| {
            calls.push((offset, limit));
            // server caps the page size at 10
            let count = 10.min(25 - offset);
            Ok::<_, Boom>((
                PagingState {
                    limit: 10,
                    offset,
                    total: 25,
                },
                count,
            ))
        })
        .await
        .unwrap();

        assert_eq!(calls, vec![(0, 100), (10, 10), (20, 10)]);
    }

    #[tokio::test]
    async fn starts_from_initial_offset() {
        let mut upstream = FakeUpstream::new(30);

        paging_load(10, 10, async |offset, limit| {
            Ok::<_, Boom>(upstream.page(offset, limit))
        })
        .await
        .unwrap();

        assert_eq!(upstream.calls, vec![(10, 10), (20, 10)]);
    }

    #[tokio::test]
    async fn zero_items_before_total_is_an_unexpected_stop() {
        let mut calls = 0;

        let err = paging_load(0, 20, async |offset, limit| {
            calls += 1;
            // claims 100 items but stops serving after the first page
            let count = if offset == 0 { 20 } else { 0 };
            Ok::<_, Boom>((
                PagingState {
                    limit,
                    offset,
                    total: 100,
                },
                count,
            ))
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PagingError::UnexpectedStop {
                offset: 20,
                total: 100
            }
        ));
        assert_eq!(calls, 2, "no calls after the stall");
    }

    #[tokio::test]
    async fn first_call_error_propagates() {
        let mut calls = 0;

        let err = paging_load(0, 20, async |_, _| {
            calls += 1;
            Err::<(PagingState, usize), _>(Boom)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PagingError::Fetch(Boom)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn mid_crawl_error_aborts_without_retry() {
        let mut calls = Vec::new();

        let err = paging_load(0, 10, async |offset, limit| {
            calls.push(offset);
            if offset == 10 {
                return Err(Boom);
            }
            Ok((
                PagingState {
                    limit,
                    offset,
                    total: 50,
                },
                10,
            ))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PagingError::Fetch(Boom)));
        assert_eq!(calls, vec![0, 10]);
    }

    #[tokio::test]
    async fn latest_total_is_authoritative() {
        let mut calls = 0;

        paging_load(0, 10, async |offset, limit| {
            calls += 1;
            // total grows from 20 to 30 on the second page
            let total = if offset == 0 { 20 } else { 30 };
            Ok::<_, Boom>((
                PagingState {
                    limit,
                    offset,
                    total,
                },
                10,
            ))
        })
        .await
        .unwrap();

        assert_eq!(calls, 3);
    }
}
