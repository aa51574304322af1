//! An in-memory transport engine that records what rooms ask of it.

use std::{
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
  time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
  director::TokenGenerator,
  engine::{
    BroadcastEvent, BroadcastEventKind, Engine, MediaDevices, ProjectionMapping, Publish,
    RtcStats, TrackInfo, Transceiver, Viewer,
  },
  media::{MediaStream, MediaStreamConstraints, MediaStreamTrack, MediaType},
};

pub(crate) fn audio_video_tracks() -> Vec<TrackInfo> {
  vec![
    TrackInfo {
      track_id: "audio0".into(),
      media: MediaType::Audio,
    },
    TrackInfo {
      track_id: "video0".into(),
      media: MediaType::Video,
    },
  ]
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ViewerCall {
  Connect(Vec<BroadcastEventKind>),
  AddRemoteTrack(MediaType),
  Project(String, Vec<ProjectionMapping>),
  Unproject(Vec<String>),
  Stop,
}

#[derive(Default)]
pub(crate) struct FakeViewer {
  calls: Mutex<Vec<ViewerCall>>,
  senders: Mutex<Vec<mpsc::Sender<BroadcastEvent>>>,
  stats: Mutex<Option<Vec<RtcStats>>>,
  next_mid: AtomicUsize,
  fail_next_project: AtomicBool,
  fail_unproject: AtomicBool,
  hang_unproject: AtomicBool,
}

impl FakeViewer {
  pub(crate) fn calls(&self) -> Vec<ViewerCall> {
    self.calls.lock().clone()
  }

  /// `None` makes statistics queries fail.
  pub(crate) fn set_stats(&self, stats: Option<Vec<RtcStats>>) {
    *self.stats.lock() = stats;
  }

  pub(crate) fn fail_next_project(&self) {
    self.fail_next_project.store(true, Ordering::SeqCst);
  }

  pub(crate) fn fail_unproject(&self) {
    self.fail_unproject.store(true, Ordering::SeqCst);
  }

  /// Makes every later `unproject` call wait forever.
  pub(crate) fn hang_unproject(&self) {
    self.hang_unproject.store(true, Ordering::SeqCst);
  }

  pub(crate) fn subscribers(&self) -> usize {
    self.senders.lock().len()
  }

  pub(crate) async fn notify(&self, event: BroadcastEvent) {
    let senders = self.senders.lock().clone();
    for tx in senders {
      let _ = tx.send(event.clone()).await;
    }
  }

  /// Closes every notification channel handed out by `subscribe`.
  pub(crate) fn hang_up(&self) {
    self.senders.lock().clear();
  }
}

#[async_trait]
impl Viewer for FakeViewer {
  async fn subscribe(&self, tx: mpsc::Sender<BroadcastEvent>) {
    self.senders.lock().push(tx);
  }

  async fn connect(&self, events: &[BroadcastEventKind]) -> Result<()> {
    self.calls.lock().push(ViewerCall::Connect(events.to_vec()));
    Ok(())
  }

  async fn add_remote_track(&self, media: MediaType, streams: &[MediaStream]) -> Result<Transceiver> {
    self.calls.lock().push(ViewerCall::AddRemoteTrack(media));
    let mid = self.next_mid.fetch_add(1, Ordering::SeqCst);
    let track = MediaStreamTrack::new(media);
    for stream in streams {
      stream.add_track(track.clone());
    }
    Ok(Transceiver {
      mid: Some(mid.to_string()),
    })
  }

  async fn project(&self, source_id: &str, mapping: &[ProjectionMapping]) -> Result<()> {
    self
      .calls
      .lock()
      .push(ViewerCall::Project(source_id.to_owned(), mapping.to_vec()));
    if self.fail_next_project.swap(false, Ordering::SeqCst) {
      bail!("projection rejected");
    }
    Ok(())
  }

  async fn unproject(&self, media_ids: &[String]) -> Result<()> {
    self.calls.lock().push(ViewerCall::Unproject(media_ids.to_vec()));
    if self.hang_unproject.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    if self.fail_unproject.load(Ordering::SeqCst) {
      bail!("unproject rejected");
    }
    Ok(())
  }

  async fn stats(&self) -> Result<Vec<RtcStats>> {
    self
      .stats
      .lock()
      .clone()
      .ok_or_else(|| anyhow!("peer connection closed"))
  }

  async fn stop(&self) -> Result<()> {
    self.calls.lock().push(ViewerCall::Stop);
    self.hang_up();
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PublishCall {
  /// Track ids, source id.
  Connect(Vec<String>, String),
  Stop,
}

#[derive(Default)]
pub(crate) struct FakePublish {
  calls: Mutex<Vec<PublishCall>>,
  stats: Mutex<Option<Vec<RtcStats>>>,
  fail_connect: bool,
  connect_delay: Option<Duration>,
}

impl FakePublish {
  pub(crate) fn calls(&self) -> Vec<PublishCall> {
    self.calls.lock().clone()
  }

  pub(crate) fn set_stats(&self, stats: Option<Vec<RtcStats>>) {
    *self.stats.lock() = stats;
  }
}

#[async_trait]
impl Publish for FakePublish {
  async fn connect(&self, tracks: &[MediaStreamTrack], source_id: &str) -> Result<()> {
    self.calls.lock().push(PublishCall::Connect(
      tracks.iter().map(|track| track.id().to_owned()).collect(),
      source_id.to_owned(),
    ));
    if let Some(delay) = self.connect_delay {
      tokio::time::sleep(delay).await;
    }
    if self.fail_connect {
      bail!("negotiation failed");
    }
    Ok(())
  }

  async fn stats(&self, _track: Option<&MediaStreamTrack>) -> Result<Vec<RtcStats>> {
    self
      .stats
      .lock()
      .clone()
      .ok_or_else(|| anyhow!("peer connection closed"))
  }

  async fn stop(&self) -> Result<()> {
    self.calls.lock().push(PublishCall::Stop);
    Ok(())
  }
}

#[derive(Default)]
pub(crate) struct FakeMediaDevices {
  acquired: Mutex<Vec<MediaStreamTrack>>,
  reject: AtomicBool,
}

impl FakeMediaDevices {
  pub(crate) fn acquired(&self) -> Vec<MediaStreamTrack> {
    self.acquired.lock().clone()
  }

  pub(crate) fn reject(&self) {
    self.reject.store(true, Ordering::SeqCst);
  }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
  async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream> {
    if self.reject.load(Ordering::SeqCst) {
      bail!("permission denied");
    }
    let stream = MediaStream::new();
    for (requested, kind) in [
      (constraints.audio.is_requested(), MediaType::Audio),
      (constraints.video.is_requested(), MediaType::Video),
    ] {
      if requested {
        let track = MediaStreamTrack::new(kind);
        self.acquired.lock().push(track.clone());
        stream.add_track(track);
      }
    }
    Ok(stream)
  }
}

#[derive(Default)]
pub(crate) struct FakeEngine {
  pub(crate) viewer: Arc<FakeViewer>,
  pub(crate) devices: Arc<FakeMediaDevices>,
  publishes: Mutex<Vec<Arc<FakePublish>>>,
  fail_next_connect: AtomicBool,
  connect_delay: Mutex<Option<Duration>>,
}

impl FakeEngine {
  pub(crate) fn publish(&self, index: usize) -> Arc<FakePublish> {
    self.publishes.lock()[index].clone()
  }

  pub(crate) fn publish_count(&self) -> usize {
    self.publishes.lock().len()
  }

  pub(crate) fn fail_next_connect(&self) {
    self.fail_next_connect.store(true, Ordering::SeqCst);
  }

  /// Publish handshakes started afterwards take `delay` to complete.
  pub(crate) fn delay_connect(&self, delay: Duration) {
    *self.connect_delay.lock() = Some(delay);
  }
}

impl Engine for FakeEngine {
  fn create_viewer(
    &self,
    _stream_name: &str,
    _token_generator: Arc<dyn TokenGenerator>,
  ) -> Result<Arc<dyn Viewer>> {
    Ok(self.viewer.clone())
  }

  fn create_publisher(
    &self,
    _stream_name: &str,
    _token_generator: Arc<dyn TokenGenerator>,
  ) -> Result<Arc<dyn Publish>> {
    let publish = Arc::new(FakePublish {
      fail_connect: self.fail_next_connect.swap(false, Ordering::SeqCst),
      connect_delay: *self.connect_delay.lock(),
      ..Default::default()
    });
    self.publishes.lock().push(publish.clone());
    Ok(publish)
  }

  fn media_devices(&self) -> Arc<dyn MediaDevices> {
    self.devices.clone()
  }
}
