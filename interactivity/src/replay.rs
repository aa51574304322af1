//! A transport engine that plays back recorded broadcast notifications.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use lib_interactivity::{
  engine::{BroadcastEventKind, ProjectionMapping, RtcStats, Transceiver},
  BroadcastEvent, Engine, MediaDevices, MediaStream, MediaStreamConstraints, MediaType, Publish,
  TokenGenerator, Viewer,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Parses one notification per line. Blank lines are skipped, lines that
/// aren't notifications are reported and skipped.
pub(crate) fn parse_events(input: &str) -> Vec<BroadcastEvent> {
  input
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .filter_map(|(i, line)| match serde_json::from_str(line) {
      Ok(event) => Some(event),
      Err(e) => {
        warn!("skipping line {}: {}", i + 1, e);
        None
      },
    })
    .collect()
}

pub(crate) struct ReplayEngine {
  events: Vec<BroadcastEvent>,
}

impl ReplayEngine {
  pub(crate) fn new(events: Vec<BroadcastEvent>) -> Self {
    Self { events }
  }
}

impl Engine for ReplayEngine {
  fn create_viewer(
    &self,
    stream_name: &str,
    _token_generator: Arc<dyn TokenGenerator>,
  ) -> Result<Arc<dyn Viewer>> {
    debug!("replaying {} notifications on {}", self.events.len(), stream_name);
    Ok(Arc::new(ReplayViewer {
      events: Mutex::new(self.events.clone()),
      subscribers: Mutex::new(vec![]),
      next_mid: AtomicUsize::new(0),
    }))
  }

  fn create_publisher(
    &self,
    _stream_name: &str,
    _token_generator: Arc<dyn TokenGenerator>,
  ) -> Result<Arc<dyn Publish>> {
    bail!("a replayed stream cannot be published to")
  }

  fn media_devices(&self) -> Arc<dyn MediaDevices> {
    Arc::new(NoMediaDevices)
  }
}

struct ReplayViewer {
  events: Mutex<Vec<BroadcastEvent>>,
  subscribers: Mutex<Vec<mpsc::Sender<BroadcastEvent>>>,
  next_mid: AtomicUsize,
}

#[async_trait]
impl Viewer for ReplayViewer {
  async fn subscribe(&self, tx: mpsc::Sender<BroadcastEvent>) {
    self.subscribers.lock().await.push(tx);
  }

  async fn connect(&self, events: &[BroadcastEventKind]) -> Result<()> {
    let wanted = events.to_vec();
    let events = std::mem::take(&mut *self.events.lock().await);
    let subscribers = std::mem::take(&mut *self.subscribers.lock().await);
    // the subscribers are dropped once everything is sent, which ends the session
    tokio::spawn(async move {
      for event in events.into_iter().filter(|event| wanted.contains(&event.kind())) {
        for tx in &subscribers {
          if tx.send(event.clone()).await.is_err() {
            debug!("replay subscriber closed");
          }
        }
      }
    });
    Ok(())
  }

  async fn add_remote_track(&self, media: MediaType, _streams: &[MediaStream]) -> Result<Transceiver> {
    let mid = self.next_mid.fetch_add(1, Ordering::SeqCst).to_string();
    info!("{} transceiver {}", media, mid);
    Ok(Transceiver { mid: Some(mid) })
  }

  async fn project(&self, source_id: &str, mapping: &[ProjectionMapping]) -> Result<()> {
    for m in mapping {
      info!("project {} {} -> {}", source_id, m.track_id, m.media_id);
    }
    Ok(())
  }

  async fn unproject(&self, media_ids: &[String]) -> Result<()> {
    info!("unproject {:?}", media_ids);
    Ok(())
  }

  async fn stats(&self) -> Result<Vec<RtcStats>> {
    Ok(vec![])
  }

  async fn stop(&self) -> Result<()> {
    self.subscribers.lock().await.clear();
    Ok(())
  }
}

struct NoMediaDevices;

#[async_trait]
impl MediaDevices for NoMediaDevices {
  async fn get_user_media(&self, _constraints: &MediaStreamConstraints) -> Result<MediaStream> {
    bail!("no capture devices while replaying")
  }
}
