use serde::{Deserialize, Serialize};

/// Persisted resume position: the last page number the run had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_page: u32,
}

impl Checkpoint {
    pub fn new(last_page: u32) -> Self {
        Checkpoint {
            last_page: last_page.max(1),
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Checkpoint { last_page: 1 }
    }
}
