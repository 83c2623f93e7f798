use serde::{Deserialize, Serialize};

/// Which feed pages are reconciled against the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileReach {
    /// Only the first page; older pages are served from local state.
    #[default]
    FirstPage,
    /// Pages `0..=n`.
    UpToPage(usize),
    /// Every page.
    AllPages,
}

impl ReconcileReach {
    /// True if loading `page` should trigger reconciliation.
    pub fn covers(&self, page: usize) -> bool {
        match self {
            ReconcileReach::FirstPage => page == 0,
            ReconcileReach::UpToPage(last) => page <= *last,
            ReconcileReach::AllPages => true,
        }
    }

    /// Last page a full refresh visits, or `None` for no fixed bound.
    pub fn last_page(&self) -> Option<usize> {
        match self {
            ReconcileReach::FirstPage => Some(0),
            ReconcileReach::UpToPage(last) => Some(*last),
            ReconcileReach::AllPages => None,
        }
    }
}
