// SPDX-License-Identifier: MPL-2.0

//! Async driver for one bookmark list screen.
//!
//! Owns a [`ListStateMachine`] plus the collaborators that feed it: the
//! session provider, the remote bookmark source and the entity store. All
//! machine interactions are serialized through one mutex; the fetch is the
//! sole suspension point. Completion of an in-flight fetch is made inert by
//! a liveness check (closed flag + generation counter) instead of a weak
//! back-reference to a view controller.

use crate::mastodon::BookmarkSource;
use crate::state::machine::{ListState, ListStateMachine};
use crate::state::session::SessionProvider;
use crate::store::{StoreDb, merge};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

/// Fixed backoff before an automatic `Fail → Loading` retry. Deliberately
/// flat and uncapped; the retry loop only stops when a fetch succeeds or
/// the screen goes away.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Value published to the list-rendering collaborator after every
/// observable change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    pub state: ListState,
    pub ids: Vec<String>,
}

/// Pagination controller for the signed-in account's bookmarks.
///
/// One screen, one pager. Dropping the pager makes any in-flight fetch or
/// pending retry a no-op.
pub struct BookmarkPager<S: BookmarkSource> {
    inner: Arc<PagerInner<S>>,
}

struct PagerInner<S> {
    domain: String,
    machine: Mutex<ListStateMachine>,
    /// Bumped on every caller-initiated cycle; stale completions and
    /// retries compare against it and abort silently.
    generation: AtomicU64,
    /// Set when the owning pager is dropped.
    closed: AtomicBool,
    source: S,
    sessions: Arc<dyn SessionProvider>,
    store: StoreDb,
    snapshots: broadcast::Sender<ListSnapshot>,
}

impl<S: BookmarkSource> BookmarkPager<S> {
    pub fn new(
        domain: impl Into<String>,
        store: StoreDb,
        sessions: Arc<dyn SessionProvider>,
        source: S,
    ) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(PagerInner {
                domain: domain.into(),
                machine: Mutex::new(ListStateMachine::new()),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                source,
                sessions,
                store,
                snapshots,
            }),
        }
    }

    pub fn state(&self) -> ListState {
        self.inner.machine().state()
    }

    pub fn snapshot(&self) -> ListSnapshot {
        let machine = self.inner.machine();
        ListSnapshot {
            state: machine.state(),
            ids: machine.ids().to_vec(),
        }
    }

    /// Subscribe to snapshots. The list-rendering collaborator observes
    /// these and re-renders; this layer never renders.
    pub fn subscribe(&self) -> broadcast::Receiver<ListSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Pull-to-refresh. Clears the materialized list and fetches from the
    /// start. Returns `false` when the machine rejects the transition
    /// (wrong state, or `Initial` without an active session).
    ///
    /// Must be called from within a Tokio runtime context.
    pub fn reload(&self) -> bool {
        let session_active = self.inner.sessions.active().is_some();
        // The generation bump happens under the machine lock, and only once
        // the machine accepts: a rejected request must not strand whatever
        // load is already in flight.
        let generation = {
            let mut machine = self.inner.machine();
            if !machine.request(ListState::Reloading, session_active) {
                return false;
            }
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.inner.publish();
        // Reloading resets the cursor: fetch from the start.
        tokio::spawn(PagerInner::run_load(
            Arc::clone(&self.inner),
            generation,
            None,
        ));
        true
    }

    /// Scroll-to-bottom. Fetches the next page with the stored cursor.
    ///
    /// Must be called from within a Tokio runtime context.
    pub fn load_more(&self) -> bool {
        let (generation, cursor) = {
            let mut machine = self.inner.machine();
            if !machine.request(ListState::Loading, true) {
                return false;
            }
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, machine.max_id().map(str::to_owned))
        };
        self.inner.publish();
        tokio::spawn(PagerInner::run_load(
            Arc::clone(&self.inner),
            generation,
            cursor,
        ));
        true
    }
}

impl<S: BookmarkSource> Drop for BookmarkPager<S> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

impl<S: BookmarkSource> PagerInner<S> {
    fn machine(&self) -> MutexGuard<'_, ListStateMachine> {
        self.machine.lock().expect("pager lock poisoned")
    }

    fn stale(&self, generation: u64) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
    }

    fn publish(&self) {
        let snapshot = {
            let machine = self.machine();
            ListSnapshot {
                state: machine.state(),
                ids: machine.ids().to_vec(),
            }
        };
        let _ = self.snapshots.send(snapshot);
    }

    /// One loading cycle: session check, fetch, merge, complete. Every
    /// failure path becomes a `Fail` transition; nothing propagates out.
    async fn run_load(inner: Arc<Self>, generation: u64, cursor: Option<String>) {
        let Some(auth) = inner.sessions.active() else {
            tracing::warn!("bookmark page load without an active session");
            Self::fail(&inner, generation);
            return;
        };

        let result = inner.source.fetch_bookmarks(cursor.as_deref(), &auth).await;

        if inner.stale(generation) {
            return;
        }

        match result {
            Ok(page) => {
                let network_date = StoreDb::now();
                let viewer = auth.account_identifier();
                let mut page_ids = Vec::with_capacity(page.statuses.len());
                for status in &page.statuses {
                    match merge::upsert_status(
                        &inner.store,
                        &inner.domain,
                        status,
                        Some(&viewer),
                        network_date,
                    ) {
                        Ok(_) => page_ids.push(status.id.clone()),
                        Err(error) => {
                            tracing::warn!(%error, status = %status.id, "failed to merge bookmarked status");
                            Self::fail(&inner, generation);
                            return;
                        }
                    }
                }

                {
                    let mut machine = inner.machine();
                    // Re-checked under the lock: a reload may have been
                    // accepted since the merge started.
                    if inner.stale(generation) {
                        return;
                    }
                    machine.complete_page(page_ids, page.next_max_id);
                }
                inner.publish();
            }
            Err(error) => {
                tracing::warn!(%error, "bookmark fetch failed");
                Self::fail(&inner, generation);
            }
        }
    }

    fn fail(inner: &Arc<Self>, generation: u64) {
        {
            let mut machine = inner.machine();
            if inner.stale(generation) || machine.state() != ListState::Loading {
                return;
            }
            machine.fail_page();
        }
        inner.publish();
        Self::schedule_retry(inner, generation);
    }

    /// Automatic `Fail → Loading` retry after [`RETRY_DELAY`]. Holds only a
    /// weak reference across the sleep so a torn-down screen never acts.
    fn schedule_retry(inner: &Arc<Self>, generation: u64) {
        let weak: Weak<Self> = Arc::downgrade(inner);
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            let Some(inner) = weak.upgrade() else { return };
            let cursor = {
                let mut machine = inner.machine();
                if inner.stale(generation) || machine.state() != ListState::Fail {
                    return;
                }
                if !machine.request(ListState::Loading, true) {
                    return;
                }
                machine.max_id().map(str::to_owned)
            };
            tracing::debug!("retrying bookmark load");
            inner.publish();
            Self::run_load(inner, generation, cursor).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastodon::{Account, BookmarkPage, FetchError, Status};
    use crate::state::session::{AuthContext, SessionBox};
    use crate::store::{ActorKind, PostStore};
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::future::Future;

    const DOMAIN: &str = "example.social";

    fn auth() -> AuthContext {
        AuthContext {
            domain: DOMAIN.to_string(),
            access_token: "token".to_string(),
            account_id: "7".to_string(),
        }
    }

    fn status(id: &str) -> Status {
        Status {
            id: id.to_string(),
            uri: format!("https://{DOMAIN}/statuses/{id}"),
            created_at: Utc.with_ymd_and_hms(2022, 7, 19, 0, 0, 0).unwrap(),
            content: format!("<p>{id}</p>"),
            visibility: Some("public".to_string()),
            sensitive: false,
            spoiler_text: None,
            application: None,
            reblogs_count: 0,
            favourites_count: 0,
            replies_count: None,
            url: None,
            in_reply_to_id: None,
            in_reply_to_account_id: None,
            language: None,
            text: None,
            account: Account {
                id: "9".to_string(),
                username: "alice".to_string(),
                acct: "alice".to_string(),
                display_name: None,
                url: None,
                avatar: None,
                created_at: None,
            },
            reblog: None,
            mentions: Vec::new(),
            emojis: Vec::new(),
            tags: Vec::new(),
            media_attachments: Vec::new(),
            favourited: None,
            reblogged: None,
            muted: None,
            bookmarked: Some(true),
            pinned: None,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> BookmarkPage {
        BookmarkPage {
            statuses: ids.iter().map(|id| status(id)).collect(),
            next_max_id: next.map(String::from),
        }
    }

    /// Replays a scripted sequence of responses and records the cursors it
    /// was asked for. Runs dry into empty final pages.
    #[derive(Clone)]
    struct ScriptedSource {
        responses: Arc<Mutex<VecDeque<Result<BookmarkPage, FetchError>>>>,
        requested_cursors: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<BookmarkPage, FetchError>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                requested_cursors: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn cursors(&self) -> Vec<Option<String>> {
            self.requested_cursors.lock().unwrap().clone()
        }
    }

    impl BookmarkSource for ScriptedSource {
        fn fetch_bookmarks(
            &self,
            max_id: Option<&str>,
            _auth: &AuthContext,
        ) -> impl Future<Output = Result<BookmarkPage, FetchError>> + Send {
            self.requested_cursors
                .lock()
                .unwrap()
                .push(max_id.map(String::from));
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(page(&[], None)));
            std::future::ready(response)
        }
    }

    fn pager_with(
        source: ScriptedSource,
        sessions: Arc<dyn SessionProvider>,
    ) -> (BookmarkPager<ScriptedSource>, StoreDb) {
        let store = StoreDb::open_in_memory().expect("open");
        let pager = BookmarkPager::new(DOMAIN, store.clone(), sessions, source);
        (pager, store)
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<ListSnapshot>,
        state: ListState,
    ) -> ListSnapshot {
        loop {
            let snapshot = rx.recv().await.expect("snapshot stream closed");
            if snapshot.state == state {
                return snapshot;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_then_load_more_until_exhausted() {
        let source = ScriptedSource::new(vec![
            Ok(page(&["a", "b", "c"], Some("x"))),
            Ok(page(&["c", "d"], None)),
        ]);
        let (pager, store) = pager_with(source.clone(), Arc::new(SessionBox::with(auth())));
        let mut rx = pager.subscribe();

        assert!(pager.reload());
        let snapshot = wait_for(&mut rx, ListState::Idle).await;
        assert_eq!(snapshot.ids, ["a", "b", "c"]);

        assert!(pager.load_more());
        let snapshot = wait_for(&mut rx, ListState::NoMore).await;
        assert_eq!(snapshot.ids, ["a", "b", "c", "d"]);

        // First fetch from the start, second with the page-1 cursor.
        assert_eq!(source.cursors(), [None, Some("x".to_string())]);

        // Every page entity landed in the store, bookmarked by the viewer.
        let posts = PostStore::new(&store);
        for id in ["a", "b", "c", "d"] {
            let record = posts.find(DOMAIN, id).expect("find").expect("merged");
            assert_eq!(record.author_identifier, "9@example.social");
            assert!(posts
                .has_actor(DOMAIN, id, ActorKind::Bookmark, "7@example.social")
                .expect("has_actor"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_requires_active_session() {
        let source = ScriptedSource::new(Vec::new());
        let (pager, _store) = pager_with(source.clone(), Arc::new(SessionBox::new()));

        assert!(!pager.reload());
        assert_eq!(pager.state(), ListState::Initial);
        assert!(source.cursors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_rejected_before_first_reload() {
        let source = ScriptedSource::new(Vec::new());
        let (pager, _store) = pager_with(source.clone(), Arc::new(SessionBox::with(auth())));

        assert!(!pager.load_more());
        assert_eq!(pager.state(), ListState::Initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_self_heals_after_fixed_delay() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Http(500)),
            Ok(page(&["a"], None)),
        ]);
        let (pager, _store) = pager_with(source.clone(), Arc::new(SessionBox::with(auth())));
        let mut rx = pager.subscribe();

        assert!(pager.reload());
        wait_for(&mut rx, ListState::Fail).await;

        // No further external input: the machine re-enters Loading on its
        // own after the fixed delay and the retry succeeds.
        let snapshot = wait_for(&mut rx, ListState::NoMore).await;
        assert_eq!(snapshot.ids, ["a"]);
        assert_eq!(source.cursors().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_loss_during_loading_fails() {
        let sessions = Arc::new(SessionBox::with(auth()));
        let source = ScriptedSource::new(vec![Ok(page(&["a"], Some("x")))]);
        let store = StoreDb::open_in_memory().expect("open");
        let pager = BookmarkPager::new(
            DOMAIN,
            store,
            Arc::clone(&sessions) as Arc<dyn SessionProvider>,
            source,
        );
        let mut rx = pager.subscribe();

        assert!(pager.reload());
        wait_for(&mut rx, ListState::Idle).await;

        // Session vanishes; the next cycle fails at the Loading boundary.
        sessions.set(None);
        assert!(pager.load_more());
        wait_for(&mut rx, ListState::Fail).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_clears_list_before_any_response() {
        let source = ScriptedSource::new(vec![
            Ok(page(&["a", "b", "c"], Some("x"))),
            Ok(page(&["d"], None)),
        ]);
        let (pager, _store) = pager_with(source, Arc::new(SessionBox::with(auth())));
        let mut rx = pager.subscribe();

        pager.reload();
        wait_for(&mut rx, ListState::Idle).await;

        pager.reload();
        // Synchronously after the request: passed through Reloading into
        // Loading with an empty list, no response processed yet.
        let snapshot = pager.snapshot();
        assert_eq!(snapshot.state, ListState::Loading);
        assert!(snapshot.ids.is_empty());

        let snapshot = wait_for(&mut rx, ListState::NoMore).await;
        assert_eq!(snapshot.ids, ["d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_retry_invalidates_pending_automatic_retry() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Http(500)),
            Ok(page(&["a"], Some("x"))),
        ]);
        let (pager, _store) = pager_with(source.clone(), Arc::new(SessionBox::with(auth())));
        let mut rx = pager.subscribe();

        pager.reload();
        wait_for(&mut rx, ListState::Fail).await;

        // User retries by hand (Fail → Loading) before the 3s timer fires.
        assert!(pager.load_more());
        let snapshot = wait_for(&mut rx, ListState::Idle).await;
        assert_eq!(snapshot.ids, ["a"]);

        // The scheduled retry wakes up, sees a newer generation, and does
        // nothing.
        tokio::time::sleep(RETRY_DELAY + Duration::from_secs(1)).await;
        assert_eq!(pager.state(), ListState::Idle);
        assert_eq!(source.cursors().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_pager_makes_retry_inert() {
        let source = ScriptedSource::new(vec![Err(FetchError::Http(500))]);
        let (pager, _store) = pager_with(source.clone(), Arc::new(SessionBox::with(auth())));
        let mut rx = pager.subscribe();

        pager.reload();
        wait_for(&mut rx, ListState::Fail).await;
        drop(pager);

        tokio::time::sleep(RETRY_DELAY + Duration::from_secs(1)).await;
        // Only the initial failed fetch ever reached the source.
        assert_eq!(source.cursors().len(), 1);
    }
}
