use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{publisher::Publisher, source::Source, source_identifier::SourceIdentifier};

/// Events triggered by a [`Room`](crate::Room).
#[derive(Debug, Clone)]
pub enum RoomEvent {
  /// A new publisher started publishing to the stream.
  PublisherJoined(Publisher),
  /// The last source of a publisher stopped.
  PublisherLeft(Publisher),
  /// A new source is being published. Call [`Source::receive`] to start
  /// receiving it.
  SourceAdded(Publisher, Source),
  /// A source stopped being published.
  SourceRemoved(Publisher, SourceIdentifier),
  /// Number of viewers connected to the stream, sent from time to time.
  ViewerCount(u64),
}

impl RoomEvent {
  pub fn kind(&self) -> RoomEventKind {
    match self {
      RoomEvent::PublisherJoined(_) => RoomEventKind::PublisherJoined,
      RoomEvent::PublisherLeft(_) => RoomEventKind::PublisherLeft,
      RoomEvent::SourceAdded(..) => RoomEventKind::SourceAdded,
      RoomEvent::SourceRemoved(..) => RoomEventKind::SourceRemoved,
      RoomEvent::ViewerCount(_) => RoomEventKind::ViewerCount,
    }
  }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum RoomEventKind {
  PublisherJoined,
  PublisherLeft,
  SourceAdded,
  SourceRemoved,
  ViewerCount,
}

type Listener = Arc<dyn Fn(&RoomEvent) + Send + Sync>;

/// Listeners per event kind, called synchronously in registration order.
#[derive(Default)]
pub(crate) struct EventEmitter {
  listeners: Mutex<HashMap<RoomEventKind, Vec<Listener>>>,
}

impl fmt::Debug for EventEmitter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let listeners = self.listeners.lock();
    f.debug_struct("EventEmitter")
      .field(
        "listeners",
        &listeners.values().map(Vec::len).sum::<usize>(),
      )
      .finish()
  }
}

impl EventEmitter {
  pub(crate) fn on(&self, kind: RoomEventKind, listener: impl Fn(&RoomEvent) + Send + Sync + 'static) {
    self
      .listeners
      .lock()
      .entry(kind)
      .or_default()
      .push(Arc::new(listener));
  }

  /// Returns whether any listener was called.
  pub(crate) fn emit(&self, event: &RoomEvent) -> bool {
    // released before calling out so listeners may register more listeners
    let listeners = self
      .listeners
      .lock()
      .get(&event.kind())
      .cloned()
      .unwrap_or_default();
    for listener in &listeners {
      listener(event);
    }
    !listeners.is_empty()
  }

  pub(crate) fn clear(&self) {
    self.listeners.lock().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn listeners_run_in_registration_order() {
    let emitter = EventEmitter::default();
    let calls = Arc::new(Mutex::new(vec![]));
    for i in 0..3 {
      let calls = calls.clone();
      emitter.on(RoomEventKind::ViewerCount, move |event| {
        if let RoomEvent::ViewerCount(count) = event {
          calls.lock().push((i, *count));
        }
      });
    }

    assert!(emitter.emit(&RoomEvent::ViewerCount(7)));
    assert_eq!(*calls.lock(), vec![(0, 7), (1, 7), (2, 7)]);
  }

  #[test]
  fn only_matching_kind_is_called() {
    let emitter = EventEmitter::default();
    let calls = Arc::new(Mutex::new(0));
    {
      let calls = calls.clone();
      emitter.on(RoomEventKind::PublisherJoined, move |_| *calls.lock() += 1);
    }

    assert!(!emitter.emit(&RoomEvent::ViewerCount(1)));
    assert_eq!(*calls.lock(), 0);
  }

  #[test]
  fn cleared_emitter_is_silent() {
    let emitter = EventEmitter::default();
    emitter.on(RoomEventKind::ViewerCount, |_| panic!("listener called after clear"));
    emitter.clear();
    assert!(!emitter.emit(&RoomEvent::ViewerCount(1)));
  }

  #[test]
  fn listener_can_register_listener() {
    let emitter = Arc::new(EventEmitter::default());
    {
      let inner = emitter.clone();
      emitter.on(RoomEventKind::ViewerCount, move |_| {
        inner.on(RoomEventKind::ViewerCount, |_| {});
      });
    }
    emitter.emit(&RoomEvent::ViewerCount(1));
    assert_eq!(emitter.listeners.lock()[&RoomEventKind::ViewerCount].len(), 2);
  }
}
