use std::{
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::generate_id;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(C)]
pub enum MediaType {
  Video,
  Audio,
}

impl MediaType {
  pub fn as_str(&self) -> &'static str {
    match self {
      MediaType::Video => "video",
      MediaType::Audio => "audio",
    }
  }
}

impl fmt::Display for MediaType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

type StopHook = Box<dyn Fn() + Send + Sync>;

struct TrackState {
  enabled: AtomicBool,
  ended: AtomicBool,
  on_stop: Option<StopHook>,
}

/// A handle to one audio or video track.
///
/// Clones share the same enabled/ended state, so a track muted through one
/// handle is muted for every holder.
#[derive(Clone)]
pub struct MediaStreamTrack {
  id: String,
  kind: MediaType,
  state: Arc<TrackState>,
}

impl fmt::Debug for MediaStreamTrack {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MediaStreamTrack")
      .field("id", &self.id)
      .field("kind", &self.kind)
      .field("enabled", &self.enabled())
      .field("ended", &self.is_ended())
      .finish()
  }
}

impl PartialEq for MediaStreamTrack {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.state, &other.state)
  }
}

impl MediaStreamTrack {
  pub fn new(kind: MediaType) -> Self {
    Self::with_id(generate_id(), kind)
  }

  pub fn with_id(id: impl Into<String>, kind: MediaType) -> Self {
    Self::build(id.into(), kind, None)
  }

  /// Creates a track whose capture device is released by `on_stop` the
  /// first time the track is stopped.
  pub fn with_stop_hook(
    id: impl Into<String>,
    kind: MediaType,
    on_stop: impl Fn() + Send + Sync + 'static,
  ) -> Self {
    Self::build(id.into(), kind, Some(Box::new(on_stop)))
  }

  fn build(id: String, kind: MediaType, on_stop: Option<StopHook>) -> Self {
    Self {
      id,
      kind,
      state: Arc::new(TrackState {
        enabled: AtomicBool::new(true),
        ended: AtomicBool::new(false),
        on_stop,
      }),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn kind(&self) -> MediaType {
    self.kind
  }

  pub fn enabled(&self) -> bool {
    self.state.enabled.load(Ordering::SeqCst)
  }

  pub fn set_enabled(&self, enabled: bool) {
    self.state.enabled.store(enabled, Ordering::SeqCst);
  }

  pub fn is_ended(&self) -> bool {
    self.state.ended.load(Ordering::SeqCst)
  }

  pub fn stop(&self) {
    if !self.state.ended.swap(true, Ordering::SeqCst) {
      if let Some(on_stop) = &self.state.on_stop {
        on_stop();
      }
    }
  }
}

/// An ordered, shared collection of tracks.
#[derive(Debug, Clone)]
pub struct MediaStream {
  id: String,
  tracks: Arc<Mutex<Vec<MediaStreamTrack>>>,
}

impl Default for MediaStream {
  fn default() -> Self {
    Self::new()
  }
}

impl MediaStream {
  pub fn new() -> Self {
    Self::from_tracks(vec![])
  }

  pub fn from_tracks(tracks: Vec<MediaStreamTrack>) -> Self {
    Self {
      id: generate_id(),
      tracks: Arc::new(Mutex::new(tracks)),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn add_track(&self, track: MediaStreamTrack) {
    let mut tracks = self.tracks.lock();
    if !tracks.contains(&track) {
      tracks.push(track);
    }
  }

  pub fn tracks(&self) -> Vec<MediaStreamTrack> {
    self.tracks.lock().clone()
  }

  pub fn audio_tracks(&self) -> Vec<MediaStreamTrack> {
    self.tracks_of(MediaType::Audio)
  }

  pub fn video_tracks(&self) -> Vec<MediaStreamTrack> {
    self.tracks_of(MediaType::Video)
  }

  pub fn first_audio_track(&self) -> Option<MediaStreamTrack> {
    self.first_of(MediaType::Audio)
  }

  pub fn first_video_track(&self) -> Option<MediaStreamTrack> {
    self.first_of(MediaType::Video)
  }

  fn tracks_of(&self, kind: MediaType) -> Vec<MediaStreamTrack> {
    self
      .tracks
      .lock()
      .iter()
      .filter(|track| track.kind() == kind)
      .cloned()
      .collect()
  }

  fn first_of(&self, kind: MediaType) -> Option<MediaStreamTrack> {
    self
      .tracks
      .lock()
      .iter()
      .find(|track| track.kind() == kind)
      .cloned()
  }
}

/// Requirement for one media type when capturing: either a plain on/off
/// switch or a free-form constraint dictionary understood by the capture
/// backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaTrackConstraints {
  Enabled(bool),
  Constraints(Map<String, Value>),
}

impl Default for MediaTrackConstraints {
  fn default() -> Self {
    MediaTrackConstraints::Enabled(false)
  }
}

impl MediaTrackConstraints {
  pub fn is_requested(&self) -> bool {
    !matches!(self, MediaTrackConstraints::Enabled(false))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaStreamConstraints {
  #[serde(default)]
  pub audio: MediaTrackConstraints,
  #[serde(default)]
  pub video: MediaTrackConstraints,
}

impl MediaStreamConstraints {
  pub fn audio_video() -> Self {
    Self {
      audio: MediaTrackConstraints::Enabled(true),
      video: MediaTrackConstraints::Enabled(true),
    }
  }
}
