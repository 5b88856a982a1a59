use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tipjar_core::{Identity, ValueObject};

/// Immutable record of one accepted tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub sender: Identity,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub message: String,
}

impl ValueObject for Memo {}

/// Append-only, call-ordered sequence of memos.
///
/// No removal or in-place mutation API exists; `append` is only reachable
/// from event application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoLog {
    memos: Vec<Memo>,
}

impl MemoLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a memo and return its log index.
    pub(crate) fn append(&mut self, memo: Memo) -> u64 {
        self.memos.push(memo);
        (self.memos.len() - 1) as u64
    }

    pub fn len(&self) -> usize {
        self.memos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memos.is_empty()
    }

    /// Index the next appended memo will receive.
    pub fn next_index(&self) -> u64 {
        self.memos.len() as u64
    }

    pub fn get(&self, index: u64) -> Option<&Memo> {
        usize::try_from(index).ok().and_then(|i| self.memos.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Memo> {
        self.memos.iter()
    }

    /// Owned copy of the log as it is now; later appends do not show up in it.
    pub fn snapshot(&self) -> Vec<Memo> {
        self.memos.clone()
    }
}
