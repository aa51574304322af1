use std::{
  collections::{hash_map::Entry, HashMap, HashSet},
  fmt,
  sync::Arc,
};

use tokio::{
  sync::{mpsc, oneshot, Mutex},
  task::JoinHandle,
};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, info, trace, warn};

use crate::{
  director::{Director, PublisherTokenGenerator, SubscriberTokenGenerator},
  engine::{BroadcastEvent, Engine, Viewer, WATCHED_EVENTS},
  error::RoomError,
  events::{EventEmitter, RoomEvent, RoomEventKind},
  options::{ConnectOptions, PublishOptions, StreamInformation, WatchOptions},
  published_source::PublishedSource,
  publisher::Publisher,
  source::Source,
  source_identifier::SourceIdentifier,
  util::require,
};

/// Maximum number of sources that can be published from a single room.
pub const MAX_SOURCES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
  /// Created, not receiving notifications yet.
  Idle,
  Watching,
  /// Terminal.
  Left,
}

struct RoomInner {
  state: RoomState,
  publisher_name: Option<String>,
  viewer: Option<Arc<dyn Viewer>>,
  watch_task: Option<JoinHandle<()>>,
  disconnected_rx: Option<oneshot::Receiver<()>>,
  publishers: HashMap<String, Publisher>,
  published_sources: HashMap<String, PublishedSource>,
  /// Source ids whose publish handshake is in flight.
  pending_sources: HashSet<String>,
}

impl fmt::Debug for RoomInner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RoomInner")
      .field("state", &self.state)
      .field("publisher_name", &self.publisher_name)
      .finish()
  }
}

/// A live stream seen as a room of publishers.
///
/// Publishing goes through [`Room::connect`] (or [`Room::publish`] once
/// connected); remote publishers and their sources are tracked from the
/// broadcast notifications of the viewer session started by
/// [`Room::watch`], and reported through the listeners registered with
/// [`Room::on`].
#[derive(Clone)]
pub struct Room {
  engine: Arc<dyn Engine>,
  director: Director,
  stream_info: StreamInformation,
  events: Arc<EventEmitter>,
  inner: Arc<Mutex<RoomInner>>,
}

impl fmt::Debug for Room {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Room")
      .field("stream_info", &self.stream_info)
      .field("director", &self.director)
      .field("events", &self.events)
      .finish()
  }
}

impl Room {
  pub fn new(engine: Arc<dyn Engine>, stream_info: StreamInformation) -> Result<Self, RoomError> {
    require(&stream_info.stream_name, "stream name")?;
    require(&stream_info.stream_account_id, "stream account id")?;

    Ok(Self {
      engine,
      director: Director::default(),
      stream_info,
      events: Arc::new(EventEmitter::default()),
      inner: Arc::new(Mutex::new(RoomInner {
        state: RoomState::Idle,
        publisher_name: None,
        viewer: None,
        watch_task: None,
        disconnected_rx: None,
        publishers: HashMap::new(),
        published_sources: HashMap::new(),
        pending_sources: HashSet::new(),
      })),
    })
  }

  /// Resolves credentials through `director` instead of the default directory.
  pub fn with_director(mut self, director: Director) -> Self {
    self.director = director;
    self
  }

  /// Adds `listener` to the end of the listeners of `kind`. Listeners run
  /// synchronously, in registration order, after the room state has been
  /// updated.
  pub fn on(&self, kind: RoomEventKind, listener: impl Fn(&RoomEvent) + Send + Sync + 'static) -> &Self {
    self.events.on(kind, listener);
    self
  }

  pub fn stream_info(&self) -> &StreamInformation {
    &self.stream_info
  }

  pub async fn state(&self) -> RoomState {
    self.inner.lock().await.state
  }

  pub async fn publisher_name(&self) -> Option<String> {
    self.inner.lock().await.publisher_name.clone()
  }

  /// The viewer session, once watching.
  pub async fn viewer(&self) -> Option<Arc<dyn Viewer>> {
    self.inner.lock().await.viewer.clone()
  }

  /// Remote publishers currently publishing at least one source.
  pub async fn publishers(&self) -> Vec<Publisher> {
    self.inner.lock().await.publishers.values().cloned().collect()
  }

  pub async fn publisher(&self, name: &str) -> Option<Publisher> {
    self.inner.lock().await.publishers.get(name).cloned()
  }

  /// Sources published from this room.
  pub async fn published_sources(&self) -> Vec<PublishedSource> {
    self
      .inner
      .lock()
      .await
      .published_sources
      .values()
      .cloned()
      .collect()
  }

  /// Publishes a source as `options.publisher_name`, then starts watching the stream.
  #[tracing::instrument(level = "debug", skip_all, fields(publisher_name = %options.publisher_name), err)]
  pub async fn connect(&self, options: &ConnectOptions) -> Result<PublishedSource, RoomError> {
    require(&options.publisher_name, "publisher name")?;
    {
      let mut inner = self.inner.lock().await;
      if inner.state == RoomState::Left {
        return Err(RoomError::Left);
      }
      inner.publisher_name = Some(options.publisher_name.clone());
    }

    let published_source = self.publish(&options.publish).await?;
    self.watch(&options.watch).await?;
    Ok(published_source)
  }

  /// Starts receiving the broadcast notifications of the stream. Does nothing
  /// if the room is already watching.
  #[tracing::instrument(level = "debug", skip_all, err)]
  pub async fn watch(&self, options: &WatchOptions) -> Result<(), RoomError> {
    let mut inner = self.inner.lock().await;
    match inner.state {
      RoomState::Left => return Err(RoomError::Left),
      RoomState::Watching => {
        debug!("already watching");
        return Ok(());
      },
      RoomState::Idle => {},
    }

    let token_generator = Arc::new(SubscriberTokenGenerator::new(
      self.director.clone(),
      &self.stream_info.stream_name,
      &self.stream_info.stream_account_id,
      options.subscriber_token.as_deref(),
    ));
    let viewer = self
      .engine
      .create_viewer(&self.stream_info.stream_name, token_generator)?;

    let (tx, rx) = mpsc::channel(64);
    viewer.subscribe(tx).await;
    viewer.connect(&WATCHED_EVENTS).await?;
    info!("watching stream {}", self.stream_info.stream_name);

    let (disconnected_tx, disconnected_rx) = oneshot::channel();
    let room = Arc::downgrade(&self.inner);
    let events = self.events.clone();
    inner.watch_task = Some(tokio::spawn(async move {
      let mut notifications = ReceiverStream::new(rx);
      while let Some(event) = notifications.next().await {
        match room.upgrade() {
          Some(inner) => handle_broadcast_event(&inner, &events, event).await,
          None => break,
        }
      }
      debug!("broadcast notifications closed");
      let _ = disconnected_tx.send(());
    }));
    inner.disconnected_rx = Some(disconnected_rx);
    inner.viewer = Some(viewer);
    inner.state = RoomState::Watching;
    Ok(())
  }

  /// Resolves once the viewer session stops delivering notifications.
  pub async fn disconnected(&self) -> Result<(), RoomError> {
    let rx = self
      .inner
      .lock()
      .await
      .disconnected_rx
      .take()
      .ok_or(RoomError::NotWatching)?;
    // a dropped sender means the watch task was aborted by leave()
    let _ = rx.await;
    Ok(())
  }

  /// Publishes a video / audio feed to the stream. The publisher name must
  /// have been set by [`Room::connect`].
  #[tracing::instrument(level = "debug", skip_all, fields(source_type = %options.source_type), err)]
  pub async fn publish(&self, options: &PublishOptions) -> Result<PublishedSource, RoomError> {
    let source_id = {
      let mut inner = self.inner.lock().await;
      if inner.state == RoomState::Left {
        return Err(RoomError::Left);
      }
      let publisher_name = inner
        .publisher_name
        .as_deref()
        .ok_or(RoomError::PublisherNameMissing)?;
      if inner.published_sources.len() + inner.pending_sources.len() >= MAX_SOURCES {
        return Err(RoomError::MaxSourcesReached(MAX_SOURCES));
      }
      let source_id =
        SourceIdentifier::new(publisher_name, options.source_type, &options.source_name());
      if inner.published_sources.contains_key(source_id.source_id())
        || inner.pending_sources.contains(source_id.source_id())
      {
        return Err(RoomError::DuplicateSource(source_id.source_id().to_owned()));
      }
      // counts toward capacity until the handshake settles
      inner.pending_sources.insert(source_id.source_id().to_owned());
      source_id
    };
    let key = source_id.source_id().to_owned();

    let token_generator = Arc::new(PublisherTokenGenerator::new(
      self.director.clone(),
      &options.publish_token,
      &self.stream_info.stream_name,
    ));
    let result = PublishedSource::publish(
      self.engine.as_ref(),
      &self.stream_info.stream_name,
      token_generator,
      source_id,
      options,
    )
    .await;

    let mut inner = self.inner.lock().await;
    inner.pending_sources.remove(&key);
    let published_source = result?;
    if inner.state == RoomState::Left {
      drop(inner);
      published_source.unpublish().await;
      return Err(RoomError::Left);
    }
    inner.published_sources.insert(key, published_source.clone());
    Ok(published_source)
  }

  /// Stops publishing the source. Unpublishing twice is harmless.
  #[tracing::instrument(level = "debug", skip(self))]
  pub async fn unpublish(&self, published_source: &PublishedSource) {
    published_source.unpublish().await;
    self
      .inner
      .lock()
      .await
      .published_sources
      .remove(published_source.source_id().source_id());
  }

  /// Leaves the stream: stops every published source and the viewer session.
  /// No event fires afterwards.
  #[tracing::instrument(level = "debug", skip(self))]
  pub async fn leave(&self) {
    let (published_sources, viewer, watch_task) = {
      let mut inner = self.inner.lock().await;
      inner.state = RoomState::Left;
      inner.publishers.clear();
      let published_sources: Vec<_> = inner.published_sources.drain().map(|(_, source)| source).collect();
      (published_sources, inner.viewer.take(), inner.watch_task.take())
    };
    self.events.clear();

    for published_source in published_sources {
      published_source.unpublish().await;
    }

    if let Some(viewer) = viewer {
      info!("stop listening to the stream");
      if let Err(e) = viewer.stop().await {
        warn!("failed to stop viewer: {:?}", e);
      }
    }

    if let Some(watch_task) = watch_task {
      watch_task.abort();
    }
  }

  #[cfg(test)]
  async fn on_broadcast_event(&self, event: BroadcastEvent) {
    handle_broadcast_event(&self.inner, &self.events, event).await
  }
}

/// Applies one notification to the room. Removed sources are stopped once the
/// state lock is released, then the resulting events are emitted.
async fn handle_broadcast_event(inner: &Mutex<RoomInner>, events: &EventEmitter, event: BroadcastEvent) {
  debug!("broadcast event: {:?}", event);
  let (emitted, removed) = {
    let mut inner = inner.lock().await;
    if inner.state == RoomState::Left {
      return;
    }
    apply_broadcast_event(&mut inner, event)
  };
  for source in removed {
    if let Err(e) = source.stop().await {
      warn!("failed to stop source {}: {:?}", source.identifier(), e);
    }
  }
  for event in &emitted {
    events.emit(event);
  }
}

fn apply_broadcast_event(inner: &mut RoomInner, event: BroadcastEvent) -> (Vec<RoomEvent>, Vec<Source>) {
  let mut emitted = vec![];
  let mut removed = vec![];
  match event {
    BroadcastEvent::Active(source) => {
      let source_id = source.source_id().to_owned();
      debug!("new source available: {}", source_id);
      let identifier = SourceIdentifier::from_source_id(&source_id);
      if inner.published_sources.contains_key(&source_id)
        || inner.publisher_name.as_deref() == Some(identifier.publisher_name())
      {
        debug!("ignoring local source");
        return (emitted, removed);
      }
      let viewer = match &inner.viewer {
        Some(viewer) => viewer.clone(),
        None => {
          warn!("source {} reported without a viewer session", source_id);
          return (emitted, removed);
        },
      };

      let source = Source::new(viewer, &source_id, source.tracks);
      let publisher = match inner.publishers.entry(identifier.publisher_name().to_owned()) {
        Entry::Occupied(entry) => entry.get().clone(),
        Entry::Vacant(entry) => {
          let publisher = Publisher::new(entry.key());
          entry.insert(publisher.clone());
          emitted.push(RoomEvent::PublisherJoined(publisher.clone()));
          publisher
        },
      };
      publisher.add_source(source.clone());
      emitted.push(RoomEvent::SourceAdded(publisher, source));
    },
    BroadcastEvent::Inactive(source) => {
      let identifier = SourceIdentifier::from_source_id(source.source_id());
      debug!("source stopped: {}", identifier.source_id());
      if inner.publisher_name.as_deref() == Some(identifier.publisher_name()) {
        debug!("ignoring local source");
        return (emitted, removed);
      }

      let publisher = match inner.publishers.get(identifier.publisher_name()) {
        Some(publisher) => publisher.clone(),
        None => return (emitted, removed),
      };
      removed.extend(publisher.take_source(identifier.source_id()));
      let publisher_left = publisher.is_empty();
      if publisher_left {
        inner.publishers.remove(identifier.publisher_name());
      }
      emitted.push(RoomEvent::SourceRemoved(publisher.clone(), identifier));
      if publisher_left {
        emitted.push(RoomEvent::PublisherLeft(publisher));
      }
    },
    BroadcastEvent::ViewerCount(count) => {
      emitted.push(RoomEvent::ViewerCount(count.viewercount));
    },
    BroadcastEvent::Layers(layers) => {
      trace!("layers: {}", layers);
    },
  }
  (emitted, removed)
}
