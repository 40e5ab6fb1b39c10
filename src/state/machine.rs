// SPDX-License-Identifier: MPL-2.0

//! Pure pagination state machine for a paged remote list.
//!
//! One instance per list screen. The machine owns the screen's ordered,
//! duplicate-free id list and the continuation cursor; the async driver in
//! [`super::pager`] performs the actual fetches and feeds results back
//! through [`ListStateMachine::complete_page`] / [`ListStateMachine::fail_page`].
//!
//! A class-per-state hierarchy with dynamic dispatch would be the GUI-
//! framework way to write this; here it is an enum plus a static transition
//! table, which makes the full table trivially testable.

/// Screen states. `Initial` is the entry state. There is no terminal state:
/// `NoMore` and `Fail` are both recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Initial,
    Reloading,
    Loading,
    Idle,
    NoMore,
    Fail,
}

impl ListState {
    /// The static transition table. Anything not listed is rejected.
    pub fn allows(self, next: ListState) -> bool {
        use ListState::*;
        matches!(
            (self, next),
            (Initial, Reloading)
                | (Reloading, Loading)
                | (Loading, Fail)
                | (Loading, Idle)
                | (Loading, NoMore)
                | (Idle, Reloading)
                | (Idle, Loading)
                | (Fail, Loading)
                | (NoMore, Reloading)
        )
    }
}

#[derive(Debug)]
pub struct ListStateMachine {
    state: ListState,
    ids: Vec<String>,
    max_id: Option<String>,
}

impl ListStateMachine {
    pub fn new() -> Self {
        Self {
            state: ListState::Initial,
            ids: Vec::new(),
            max_id: None,
        }
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    /// Ordered id list materialized for this screen. Append-only per
    /// loading cycle, reset on reload, never contains duplicates.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Cursor for the next page request. `None` means fetch from the start.
    pub fn max_id(&self) -> Option<&str> {
        self.max_id.as_deref()
    }

    /// Request a transition. Disallowed requests are ignored and return
    /// `false` with no state change. This is routine, not an error.
    ///
    /// `Initial → Reloading` is additionally gated on an active session.
    pub fn request(&mut self, next: ListState, session_active: bool) -> bool {
        if !self.state.allows(next) {
            tracing::debug!(current = ?self.state, requested = ?next, "transition rejected");
            return false;
        }
        if self.state == ListState::Initial && next == ListState::Reloading && !session_active {
            tracing::debug!("reload rejected: no active session");
            return false;
        }
        self.enter(next);
        true
    }

    /// Feed one fetched page back while in `Loading`.
    ///
    /// New ids are appended in response order, duplicates silently dropped
    /// preserving first-seen order. The continuation cursor comes from the
    /// response's pagination metadata; absence means no further pages.
    /// Decides `Idle` (≥1 new id and a cursor) or `NoMore` (otherwise).
    pub fn complete_page<I>(&mut self, page_ids: I, next_max_id: Option<String>) -> ListState
    where
        I: IntoIterator<Item = String>,
    {
        if self.state != ListState::Loading {
            // Stale completion, e.g. a response that raced a reload.
            return self.state;
        }

        let mut appended = false;
        for id in page_ids {
            if !self.ids.contains(&id) {
                self.ids.push(id);
                appended = true;
            }
        }

        let has_next_page = next_max_id.is_some();
        self.max_id = next_max_id;

        if appended && has_next_page {
            self.enter(ListState::Idle);
        } else {
            self.enter(ListState::NoMore);
        }
        self.state
    }

    /// Mark the in-flight fetch as failed while in `Loading`.
    pub fn fail_page(&mut self) -> ListState {
        if self.state == ListState::Loading {
            self.enter(ListState::Fail);
        }
        self.state
    }

    /// Per-state entry actions. `Reloading` clears the materialized list
    /// and self-advances to `Loading`; `Loading` entered from `Reloading`
    /// resets the cursor so the fetch starts from the top.
    fn enter(&mut self, next: ListState) {
        let previous = self.state;
        self.state = next;
        tracing::debug!(?previous, state = ?next, "enter list state");

        match next {
            ListState::Reloading => {
                self.ids.clear();
                self.enter(ListState::Loading);
            }
            ListState::Loading => {
                if previous == ListState::Reloading {
                    self.max_id = None;
                }
            }
            _ => {}
        }
    }
}

impl Default for ListStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ListState::*;

    const ALL: [ListState; 6] = [Initial, Reloading, Loading, Idle, NoMore, Fail];

    /// Drive a fresh machine into the given state.
    fn machine_in(state: ListState) -> ListStateMachine {
        let mut machine = ListStateMachine::new();
        match state {
            Initial => {}
            Reloading | Loading => {
                // Reloading is transient: entering it lands in Loading.
                assert!(machine.request(Reloading, true));
            }
            Idle => {
                machine.request(Reloading, true);
                machine.complete_page(vec!["a".to_string()], Some("x".to_string()));
            }
            NoMore => {
                machine.request(Reloading, true);
                machine.complete_page(Vec::new(), None);
            }
            Fail => {
                machine.request(Reloading, true);
                machine.fail_page();
            }
        }
        machine
    }

    #[test]
    fn test_full_transition_table() {
        // (from, allowed targets). Reloading is transient so requests from
        // it are exercised via the machine's internal self-advance.
        let table: [(ListState, &[ListState]); 5] = [
            (Initial, &[Reloading]),
            (Loading, &[Fail, Idle, NoMore]),
            (Idle, &[Reloading, Loading]),
            (NoMore, &[Reloading]),
            (Fail, &[Loading]),
        ];

        for (from, allowed) in table {
            for to in ALL {
                assert_eq!(
                    from.allows(to),
                    allowed.contains(&to),
                    "table mismatch for {from:?} -> {to:?}"
                );
            }
        }
        assert!(Reloading.allows(Loading));
        assert!(!Reloading.allows(Idle));
    }

    #[test]
    fn test_invalid_requests_leave_state_unchanged() {
        for from in [Initial, Idle, NoMore, Fail] {
            for to in ALL {
                if from.allows(to) {
                    continue;
                }
                let mut machine = machine_in(from);
                let ids_before = machine.ids().to_vec();
                assert!(!machine.request(to, true), "{from:?} -> {to:?} accepted");
                assert_eq!(machine.state(), from);
                assert_eq!(machine.ids(), ids_before.as_slice());
            }
        }
    }

    #[test]
    fn test_initial_reload_requires_session() {
        let mut machine = ListStateMachine::new();
        assert!(!machine.request(Reloading, false));
        assert_eq!(machine.state(), Initial);
        assert!(machine.request(Reloading, true));
        assert_eq!(machine.state(), Loading);
    }

    #[test]
    fn test_reloading_clears_list_and_self_advances() {
        let mut machine = machine_in(Idle);
        assert_eq!(machine.ids(), ["a"]);
        assert_eq!(machine.max_id(), Some("x"));

        assert!(machine.request(Reloading, true));
        // Passed through Reloading into Loading with a cleared list and
        // reset cursor, before any network response.
        assert_eq!(machine.state(), Loading);
        assert!(machine.ids().is_empty());
        assert_eq!(machine.max_id(), None);
    }

    #[test]
    fn test_load_more_keeps_cursor() {
        let mut machine = machine_in(Idle);
        assert!(machine.request(Loading, true));
        assert_eq!(machine.max_id(), Some("x"));
    }

    #[test]
    fn test_paging_example_overlap_dedup() {
        let mut machine = ListStateMachine::new();
        machine.request(Reloading, true);

        let state = machine.complete_page(
            ["a", "b", "c"].map(String::from),
            Some("x".to_string()),
        );
        assert_eq!(state, Idle);
        assert_eq!(machine.ids(), ["a", "b", "c"]);

        machine.request(Loading, true);
        let state = machine.complete_page(["c", "d"].map(String::from), None);
        assert_eq!(state, NoMore);
        assert_eq!(machine.ids(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_no_new_ids_means_no_more_even_with_cursor() {
        let mut machine = ListStateMachine::new();
        machine.request(Reloading, true);
        machine.complete_page(["a"].map(String::from), Some("x".to_string()));

        machine.request(Loading, true);
        let state = machine.complete_page(["a"].map(String::from), Some("y".to_string()));
        assert_eq!(state, NoMore);
    }

    #[test]
    fn test_new_ids_without_cursor_means_no_more() {
        let mut machine = ListStateMachine::new();
        machine.request(Reloading, true);
        let state = machine.complete_page(["a", "b"].map(String::from), None);
        assert_eq!(state, NoMore);
        assert_eq!(machine.ids(), ["a", "b"]);
    }

    #[test]
    fn test_stale_completion_ignored_outside_loading() {
        let mut machine = machine_in(Idle);
        let state = machine.complete_page(["z"].map(String::from), None);
        assert_eq!(state, Idle);
        assert_eq!(machine.ids(), ["a"]);

        let mut machine = machine_in(NoMore);
        assert_eq!(machine.fail_page(), NoMore);
    }

    #[test]
    fn test_no_more_recovers_only_via_reload() {
        let mut machine = machine_in(NoMore);
        assert!(!machine.request(Loading, true));
        assert!(machine.request(Reloading, true));
        assert_eq!(machine.state(), Loading);
    }
}
