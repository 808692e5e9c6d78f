pub mod index;
pub mod market;

use std::time::Duration;

use crate::driver::PageHandle;

/// Polls a selector every 250ms until it resolves or the timeout elapses.
/// Shared by `IndexExtractor` and `MarketExtractor` waiting for a results
/// table, and by `FilterConfigurator` waiting for the results area to
/// populate after the search is triggered.
pub(crate) async fn poll_selector(
    page: &dyn PageHandle,
    selector: &str,
    timeout: Duration,
) -> bool {
    let step = Duration::from_millis(250);
    let mut waited = Duration::ZERO;
    loop {
        if page.query_text(selector).await.is_some()
            || !page.query_all_text(selector).await.is_empty()
        {
            return true;
        }
        if waited >= timeout {
            return false;
        }
        page.sleep(step).await;
        waited += step;
    }
}
