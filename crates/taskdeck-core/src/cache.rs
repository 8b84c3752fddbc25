use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

pub const TASKS_TAG: &str = "tasks";

/// Hooks into whatever fetch cache sits
/// beside the client. Reads announce the
/// tags they depend on; successful writes
/// revalidate theirs.
pub trait TagCache: Send + Sync {
  fn observe(
    &self,
    url: &str,
    tags: &[String]
  );

  fn revalidate(&self, tag: &str);
}

#[derive(Debug, Default)]
pub struct NoCache;

impl TagCache for NoCache {
  fn observe(
    &self,
    _url: &str,
    _tags: &[String]
  ) {
  }

  fn revalidate(&self, _tag: &str) {}
}

/// Keeps a generation counter per tag;
/// a read made at an older generation is
/// stale.
#[derive(Debug, Default)]
pub struct TagLedger {
  generations: Mutex<BTreeMap<String, u64>>,
  observed:    Mutex<Vec<(String, Vec<String>)>>
}

impl TagLedger {
  pub fn generation(
    &self,
    tag: &str
  ) -> u64 {
    self
      .generations
      .lock()
      .get(tag)
      .copied()
      .unwrap_or(0)
  }

  pub fn observed(
    &self
  ) -> Vec<(String, Vec<String>)> {
    self.observed.lock().clone()
  }
}

impl TagCache for TagLedger {
  fn observe(
    &self,
    url: &str,
    tags: &[String]
  ) {
    if tags.is_empty() {
      return;
    }
    self
      .observed
      .lock()
      .push((url.to_string(), tags.to_vec()));
  }

  fn revalidate(&self, tag: &str) {
    let mut generations =
      self.generations.lock();
    let next = generations
      .entry(tag.to_string())
      .or_insert(0);
    *next += 1;
    debug!(tag, generation = *next, "revalidated cache tag");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn revalidate_bumps_only_that_tag() {
    let ledger = TagLedger::default();
    ledger.revalidate(TASKS_TAG);
    ledger.revalidate(TASKS_TAG);
    ledger.revalidate("users");
    assert_eq!(
      ledger.generation(TASKS_TAG),
      2
    );
    assert_eq!(ledger.generation("users"), 1);
    assert_eq!(ledger.generation("other"), 0);
  }

  #[test]
  fn untagged_reads_are_not_recorded() {
    let ledger = TagLedger::default();
    ledger.observe("/users/login", &[]);
    ledger.observe(
      "/tasks?page=1",
      &[TASKS_TAG.to_string()]
    );
    assert_eq!(ledger.observed().len(), 1);
  }
}
