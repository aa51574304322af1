use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::source::Source;

struct PublisherInner {
  name: String,
  sources: Mutex<HashMap<String, Source>>,
}

/// A remote participant and the sources it currently publishes.
#[derive(Clone)]
pub struct Publisher {
  inner: Arc<PublisherInner>,
}

impl fmt::Debug for Publisher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Publisher")
      .field("name", &self.inner.name)
      .field("sources", &self.inner.sources.lock().len())
      .finish()
  }
}

impl PartialEq for Publisher {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Publisher {
  pub(crate) fn new(name: &str) -> Self {
    Self {
      inner: Arc::new(PublisherInner {
        name: name.to_owned(),
        sources: Mutex::new(HashMap::new()),
      }),
    }
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn sources(&self) -> Vec<Source> {
    self.inner.sources.lock().values().cloned().collect()
  }

  pub fn source(&self, source_id: &str) -> Option<Source> {
    self.inner.sources.lock().get(source_id).cloned()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.sources.lock().is_empty()
  }

  /// Replaces any source registered under the same id.
  pub(crate) fn add_source(&self, source: Source) {
    self
      .inner
      .sources
      .lock()
      .insert(source.identifier().source_id().to_owned(), source);
  }

  /// Forgets the source and hands it back so the caller can stop it.
  pub(crate) fn take_source(&self, source_id: &str) -> Option<Source> {
    self.inner.sources.lock().remove(source_id)
  }
}
