//! The seam between rooms and the real-time transport engine.
//!
//! Negotiation, transport and capture all live behind these traits. A room
//! only ever asks an [`Engine`] for sessions and reacts to the broadcast
//! notifications a [`Viewer`] delivers.

use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
  director::TokenGenerator,
  media::{MediaStream, MediaStreamConstraints, MediaStreamTrack, MediaType},
};

/// Notification kinds a viewer can be asked to deliver.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastEventKind {
  Active,
  Inactive,
  ViewerCount,
  Layers,
}

/// The notifications a room watches.
pub const WATCHED_EVENTS: [BroadcastEventKind; 4] = [
  BroadcastEventKind::Active,
  BroadcastEventKind::Inactive,
  BroadcastEventKind::ViewerCount,
  BroadcastEventKind::Layers,
];

/// A track advertised by an active source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
  pub track_id: String,
  pub media: MediaType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamSource {
  #[serde(default)]
  pub stream_id: Option<String>,
  #[serde(default)]
  pub source_id: Option<String>,
  #[serde(default)]
  pub tracks: Vec<TrackInfo>,
}

impl MediaStreamSource {
  /// The main source of a stream has no id; it is addressed as the empty string.
  pub fn source_id(&self) -> &str {
    self.source_id.as_deref().unwrap_or_default()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerCount {
  pub viewercount: u64,
}

/// An inbound notification from a viewer session, as carried by the
/// signalling channel: `{"type":"event","name":"active","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "lowercase")]
pub enum BroadcastEvent {
  Active(MediaStreamSource),
  Inactive(MediaStreamSource),
  #[serde(rename = "viewercount")]
  ViewerCount(ViewerCount),
  Layers(Value),
}

impl BroadcastEvent {
  pub fn kind(&self) -> BroadcastEventKind {
    match self {
      BroadcastEvent::Active(_) => BroadcastEventKind::Active,
      BroadcastEvent::Inactive(_) => BroadcastEventKind::Inactive,
      BroadcastEvent::ViewerCount(_) => BroadcastEventKind::ViewerCount,
      BroadcastEvent::Layers(_) => BroadcastEventKind::Layers,
    }
  }
}

/// A receiving slot created on the viewer's peer connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transceiver {
  pub mid: Option<String>,
}

/// Routes one track of a remote source onto a local transceiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionMapping {
  pub media: MediaType,
  pub track_id: String,
  pub media_id: String,
}

/// The part of an engine statistics report used for speaking detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RtcStats {
  pub kind: Option<MediaType>,
  pub mid: Option<String>,
  pub track_id: Option<String>,
  pub audio_level: Option<f64>,
}

impl RtcStats {
  /// The audio level of an audio report, if the report carries a non-zero one.
  pub(crate) fn audio_level(&self) -> Option<f64> {
    match (self.kind, self.audio_level) {
      (Some(MediaType::Audio), Some(level)) if level != 0.0 => Some(level),
      _ => None,
    }
  }
}

/// A subscribe session on a stream.
#[async_trait]
pub trait Viewer: Send + Sync {
  /// Registers a sink for broadcast notifications. Notifications must be
  /// sent in the order the platform emitted them.
  async fn subscribe(&self, tx: mpsc::Sender<BroadcastEvent>);
  async fn connect(&self, events: &[BroadcastEventKind]) -> Result<()>;
  async fn add_remote_track(&self, media: MediaType, streams: &[MediaStream]) -> Result<Transceiver>;
  async fn project(&self, source_id: &str, mapping: &[ProjectionMapping]) -> Result<()>;
  async fn unproject(&self, media_ids: &[String]) -> Result<()>;
  async fn stats(&self) -> Result<Vec<RtcStats>>;
  async fn stop(&self) -> Result<()>;
}

/// A publish session for a single source.
#[async_trait]
pub trait Publish: Send + Sync {
  async fn connect(&self, tracks: &[MediaStreamTrack], source_id: &str) -> Result<()>;
  async fn stats(&self, track: Option<&MediaStreamTrack>) -> Result<Vec<RtcStats>>;
  async fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
  async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream>;
}

pub trait Engine: Send + Sync {
  fn create_viewer(
    &self,
    stream_name: &str,
    token_generator: Arc<dyn TokenGenerator>,
  ) -> Result<Arc<dyn Viewer>>;

  fn create_publisher(
    &self,
    stream_name: &str,
    token_generator: Arc<dyn TokenGenerator>,
  ) -> Result<Arc<dyn Publish>>;

  fn media_devices(&self) -> Arc<dyn MediaDevices>;
}

impl fmt::Debug for dyn Viewer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Viewer")
  }
}

impl fmt::Debug for dyn Publish {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Publish")
  }
}

impl fmt::Debug for dyn Engine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Engine")
  }
}
