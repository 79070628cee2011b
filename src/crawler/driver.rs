//! Per-site crawl loop
//!
//! Drives one site from its start URLs to a finished record batch. The
//! loop owns a FIFO queue seeded with the start URLs and a grow-only
//! visited set checked at both enqueue and dequeue, so pagination cycles
//! and self-links terminate instead of looping.

use crate::config::CrawlTarget;
use crate::crawler::extract::{extract_page, SelectorSet};
use crate::crawler::governor::{Governor, RequestOutcome};
use crate::fetch::{Fetcher, RawPage, SessionHandle};
use crate::record::RecordBatch;
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// What one site's crawl produced
#[derive(Debug)]
pub struct CrawlOutcome {
    /// Records in fetch order, one per successfully fetched page
    pub batch: RecordBatch,

    /// Pages fetched and extracted
    pub pages_fetched: u32,

    /// Pages dropped after exhausting their attempts
    pub pages_skipped: u32,

    /// Whether cancellation cut the crawl short
    pub cancelled: bool,
}

/// How one page's fetch attempts ended
enum Attempted {
    Fetched(RawPage),
    Exhausted,
    Interrupted,
}

/// Crawls one site to completion, cancellation, or its page budget
///
/// Pagination pushes the first unvisited next link to the FRONT of the
/// queue, so a chain of pages is walked in order before the crawl moves
/// to any remaining start URL. `max_retries` is the total attempts a page
/// gets, paced by the governor; a page that exhausts them is skipped and
/// the crawl continues. Cancellation is honored at dequeue and between
/// attempts, and whatever records exist by then are kept.
pub async fn crawl_site(
    target: &CrawlTarget,
    fetcher: &dyn Fetcher,
    governor: &Governor,
    session: Option<&SessionHandle>,
    max_retries: u32,
    cancel: &CancellationToken,
) -> CrawlOutcome {
    let selectors = SelectorSet::compile(target);

    // The page budget only applies when the site paginates; a plain URL
    // list is bounded by its own length
    let page_budget = target
        .pagination
        .as_ref()
        .filter(|p| p.enabled)
        .map(|p| p.max_pages);

    let mut queue: VecDeque<Url> = target.urls.iter().cloned().collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut batch = RecordBatch::new();
    let mut pages_fetched = 0u32;
    let mut pages_skipped = 0u32;
    let mut attempted = 0u32;
    let mut cancelled = false;

    loop {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        if let Some(budget) = page_budget {
            if attempted >= budget {
                debug!(site = %target.name, budget, "page budget reached");
                break;
            }
        }

        let url = match queue.pop_front() {
            Some(url) => url,
            None => break,
        };

        if !visited.insert(url.to_string()) {
            continue;
        }
        attempted += 1;

        let page = match fetch_with_retries(
            &url, target, fetcher, governor, session, max_retries, cancel,
        )
        .await
        {
            Attempted::Fetched(page) => page,
            Attempted::Exhausted => {
                pages_skipped += 1;
                continue;
            }
            Attempted::Interrupted => {
                cancelled = true;
                break;
            }
        };

        pages_fetched += 1;

        let extracted = extract_page(&page, target, &selectors);
        batch.push(extracted.record);

        // Follow the first unvisited next link; visited is also checked
        // at dequeue, so racing duplicates still collapse
        for next in extracted.next_urls {
            if !visited.contains(next.as_str()) {
                debug!(site = %target.name, next = %next, "following next page");
                queue.push_front(next);
                break;
            }
        }
    }

    if cancelled {
        info!(
            site = %target.name,
            records = batch.len(),
            "crawl cancelled, keeping partial batch"
        );
    }

    CrawlOutcome {
        batch,
        pages_fetched,
        pages_skipped,
        cancelled,
    }
}

/// Fetches one page with up to `max_retries` total attempts
///
/// Each attempt waits on the governor first, which is also where
/// cancellation can interrupt the pacing sleep. An attempt already on the
/// wire runs to completion.
async fn fetch_with_retries(
    url: &Url,
    target: &CrawlTarget,
    fetcher: &dyn Fetcher,
    governor: &Governor,
    session: Option<&SessionHandle>,
    max_retries: u32,
    cancel: &CancellationToken,
) -> Attempted {
    for attempt in 1..=max_retries {
        let endpoint = tokio::select! {
            _ = cancel.cancelled() => return Attempted::Interrupted,
            endpoint = governor.acquire() => endpoint,
        };

        match fetcher.fetch(url, session, endpoint.as_ref()).await {
            Ok(page) => {
                governor
                    .release(endpoint.as_ref(), RequestOutcome::Succeeded)
                    .await;
                return Attempted::Fetched(page);
            }
            Err(e) => {
                governor
                    .release(endpoint.as_ref(), RequestOutcome::Failed)
                    .await;

                if attempt < max_retries {
                    warn!(site = %target.name, %url, attempt, "fetch failed, retrying: {e}");
                } else {
                    warn!(
                        site = %target.name,
                        %url,
                        attempts = max_retries,
                        "fetch failed, skipping page: {e}"
                    );
                }
            }
        }
    }

    Attempted::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractOptions, PaginationConfig, ScrapeMode};
    use crate::fetch::{LoginForm, ProxyEndpoint};
    use crate::FetchError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Fetcher stub answering from per-URL scripted responses
    struct StubFetcher {
        responses: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
        log: Mutex<Vec<String>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
                cancel_on: None,
            }
        }

        fn cancelling_after(mut self, url: &str, token: CancellationToken) -> Self {
            self.cancel_on = Some((url.to_string(), token));
            self
        }

        async fn script(&self, url: &str, responses: Vec<Result<String, FetchError>>) {
            self.responses
                .lock()
                .await
                .insert(url.to_string(), responses.into());
        }

        async fn fetch_log(&self) -> Vec<String> {
            self.log.lock().await.clone()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(
            &self,
            url: &Url,
            _session: Option<&SessionHandle>,
            _proxy: Option<&ProxyEndpoint>,
        ) -> Result<RawPage, FetchError> {
            self.log.lock().await.push(url.to_string());

            if let Some((trigger, token)) = &self.cancel_on {
                if url.as_str() == trigger {
                    token.cancel();
                }
            }

            let mut responses = self.responses.lock().await;
            match responses.get_mut(url.as_str()).and_then(|q| q.pop_front()) {
                Some(Ok(body)) => Ok(RawPage {
                    url: url.clone(),
                    status: 200,
                    body,
                    fetched_at: Utc::now(),
                }),
                Some(Err(e)) => Err(e),
                None => Err(FetchError::Http {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }

        async fn submit_form(
            &self,
            _url: &Url,
            _form: &LoginForm,
            _proxy: Option<&ProxyEndpoint>,
        ) -> Result<RawPage, FetchError> {
            Err(FetchError::Unsupported("no forms here".to_string()))
        }
    }

    fn timeout_for(url: &str) -> FetchError {
        FetchError::Timeout {
            url: url.to_string(),
        }
    }

    fn page_body(title: &str, next: Option<&str>) -> String {
        let next_link = next
            .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
            .unwrap_or_default();
        format!("<html><body><h1>{}</h1>{}</body></html>", title, next_link)
    }

    fn paginated_target(urls: &[&str], max_pages: u32) -> CrawlTarget {
        let mut target = plain_target(urls);
        target.pagination = Some(PaginationConfig {
            enabled: true,
            next_selector: "a.next".to_string(),
            max_pages,
        });
        target
    }

    fn plain_target(urls: &[&str]) -> CrawlTarget {
        CrawlTarget {
            name: "stub".to_string(),
            urls: urls.iter().map(|u| Url::parse(u).unwrap()).collect(),
            mode: ScrapeMode::Http,
            selectors: [("title".to_string(), "h1".to_string())].into(),
            pagination: None,
            login: None,
            extract: ExtractOptions::default(),
        }
    }

    async fn run(
        target: &CrawlTarget,
        fetcher: &StubFetcher,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let governor = Governor::new(Duration::ZERO, None);
        crawl_site(target, fetcher, &governor, None, max_retries, cancel).await
    }

    fn titles(outcome: &CrawlOutcome) -> Vec<String> {
        outcome
            .batch
            .iter()
            .filter_map(|r| r.text("title"))
            .collect()
    }

    #[tokio::test]
    async fn test_start_urls_crawled_in_order() {
        let fetcher = StubFetcher::new();
        fetcher
            .script("https://s.test/a", vec![Ok(page_body("A", None))])
            .await;
        fetcher
            .script("https://s.test/b", vec![Ok(page_body("B", None))])
            .await;

        let target = plain_target(&["https://s.test/a", "https://s.test/b"]);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["A", "B"]);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.pages_skipped, 0);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_pagination_chain_walks_before_other_start_urls() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/p1",
                vec![Ok(page_body("P1", Some("/p2")))],
            )
            .await;
        fetcher
            .script("https://s.test/p2", vec![Ok(page_body("P2", None))])
            .await;
        fetcher
            .script("https://s.test/other", vec![Ok(page_body("Other", None))])
            .await;

        let target = paginated_target(&["https://s.test/p1", "https://s.test/other"], 10);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        // The chain from p1 finishes before the queue reaches the second
        // start URL
        assert_eq!(titles(&outcome), vec!["P1", "P2", "Other"]);
    }

    #[tokio::test]
    async fn test_pagination_cycle_terminates() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/p1",
                vec![Ok(page_body("P1", Some("/p2")))],
            )
            .await;
        fetcher
            .script(
                "https://s.test/p2",
                vec![Ok(page_body("P2", Some("/p1")))],
            )
            .await;

        let target = paginated_target(&["https://s.test/p1"], 10);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["P1", "P2"]);
    }

    #[tokio::test]
    async fn test_self_link_is_not_refollowed() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/p1",
                vec![Ok(page_body("P1", Some("/p1")))],
            )
            .await;

        let target = paginated_target(&["https://s.test/p1"], 10);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["P1"]);
        assert_eq!(fetcher.fetch_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_max_pages_caps_the_chain() {
        let fetcher = StubFetcher::new();
        for i in 1..=4 {
            let next = format!("/p{}", i + 1);
            fetcher
                .script(
                    &format!("https://s.test/p{}", i),
                    vec![Ok(page_body(&format!("P{}", i), Some(&next)))],
                )
                .await;
        }

        let target = paginated_target(&["https://s.test/p1"], 2);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["P1", "P2"]);
        assert_eq!(fetcher.fetch_log().await.len(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/flaky",
                vec![
                    Err(timeout_for("https://s.test/flaky")),
                    Ok(page_body("Flaky", None)),
                ],
            )
            .await;

        let target = plain_target(&["https://s.test/flaky"]);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["Flaky"]);
        assert_eq!(outcome.pages_fetched, 1);
        assert_eq!(outcome.pages_skipped, 0);
        assert_eq!(fetcher.fetch_log().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_skip_the_page_and_continue() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/bad",
                vec![
                    Err(timeout_for("https://s.test/bad")),
                    Err(timeout_for("https://s.test/bad")),
                    Err(timeout_for("https://s.test/bad")),
                ],
            )
            .await;
        fetcher
            .script("https://s.test/good", vec![Ok(page_body("Good", None))])
            .await;

        let target = plain_target(&["https://s.test/bad", "https://s.test/good"]);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["Good"]);
        assert_eq!(outcome.pages_fetched, 1);
        assert_eq!(outcome.pages_skipped, 1);

        let log = fetcher.fetch_log().await;
        assert_eq!(log.len(), 4);
        assert!(log[..3].iter().all(|u| u == "https://s.test/bad"));
    }

    #[tokio::test]
    async fn test_single_retry_means_one_attempt() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/bad",
                vec![Err(timeout_for("https://s.test/bad"))],
            )
            .await;

        let target = plain_target(&["https://s.test/bad"]);
        let outcome = run(&target, &fetcher, 1, &CancellationToken::new()).await;

        assert_eq!(outcome.pages_skipped, 1);
        assert_eq!(fetcher.fetch_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_disabled_ignores_next_links() {
        let fetcher = StubFetcher::new();
        fetcher
            .script(
                "https://s.test/p1",
                vec![Ok(page_body("P1", Some("/p2")))],
            )
            .await;

        let target = plain_target(&["https://s.test/p1"]);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["P1"]);
    }

    #[tokio::test]
    async fn test_cancellation_keeps_the_partial_batch() {
        let token = CancellationToken::new();
        let fetcher =
            StubFetcher::new().cancelling_after("https://s.test/p1", token.clone());
        fetcher
            .script(
                "https://s.test/p1",
                vec![Ok(page_body("P1", Some("/p2")))],
            )
            .await;
        fetcher
            .script("https://s.test/p2", vec![Ok(page_body("P2", None))])
            .await;

        let target = paginated_target(&["https://s.test/p1"], 10);
        let outcome = run(&target, &fetcher, 3, &token).await;

        // The in-flight page finished and was kept; the chain stopped there
        assert_eq!(titles(&outcome), vec!["P1"]);
        assert!(outcome.cancelled);
        assert_eq!(fetcher.fetch_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_run_fetches_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let fetcher = StubFetcher::new();
        let target = plain_target(&["https://s.test/a"]);
        let outcome = run(&target, &fetcher, 3, &token).await;

        assert!(outcome.cancelled);
        assert!(outcome.batch.is_empty());
        assert_eq!(fetcher.fetch_log().await.len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_start_urls_fetch_once() {
        let fetcher = StubFetcher::new();
        fetcher
            .script("https://s.test/a", vec![Ok(page_body("A", None))])
            .await;

        let target = plain_target(&["https://s.test/a", "https://s.test/a"]);
        let outcome = run(&target, &fetcher, 3, &CancellationToken::new()).await;

        assert_eq!(titles(&outcome), vec!["A"]);
        assert_eq!(fetcher.fetch_log().await.len(), 1);
    }
}
