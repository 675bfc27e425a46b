//! Name allocation for one compilation run

use super::ir::types::{Label, Name};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Issues names that are unique within one compilation run
///
/// Every name has the form `prefix$n` with `n` drawn from a single counter, so names stay unique
/// across procedures and passes. Allocation takes `&self`; procedures lowered in parallel share
/// one allocator.
///
/// Source programs are expected not to use `$` in their own names.
#[derive(Debug, Default)]
pub struct NameAllocator {
    issued: AtomicUsize,
}

impl NameAllocator {
    /// Creates an allocator for a new run
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh name, e.g. `ex.val$3`
    pub fn fresh(&self, prefix: &str) -> Name {
        Name::new(self.next(prefix))
    }

    /// Issues a fresh label, e.g. `cd.then$7`
    pub fn fresh_label(&self, prefix: &str) -> Label {
        Label::new(self.next(prefix))
    }

    /// Number of names issued so far
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}${}", prefix, n)
    }
}
