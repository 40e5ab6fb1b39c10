// SPDX-License-Identifier: MPL-2.0

mod machine;
mod pager;
mod session;

pub use machine::{ListState, ListStateMachine};
pub use pager::{BookmarkPager, ListSnapshot};
pub use session::{AuthContext, SessionBox, SessionProvider};
