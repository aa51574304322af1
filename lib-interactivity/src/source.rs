use std::{fmt, sync::Arc};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{
  engine::{ProjectionMapping, TrackInfo, Viewer},
  media::{MediaStream, MediaType},
  source_identifier::SourceIdentifier,
};

/// Threshold beyond which a publisher is considered to be speaking.
pub const IS_SPEAKING_THRESHOLD: f64 = 0.002;

#[derive(Debug, Default)]
struct Binding {
  media_id: String,
  track_id: String,
}

#[derive(Debug, Default)]
struct Bindings {
  audio: Option<Binding>,
  video: Option<Binding>,
}

impl Bindings {
  fn is_empty(&self) -> bool {
    self.audio.is_none() && self.video.is_none()
  }

  fn media_ids(&self) -> Vec<String> {
    [&self.audio, &self.video]
      .into_iter()
      .flatten()
      .map(|binding| binding.media_id.clone())
      .collect()
  }
}

struct SourceInner {
  identifier: SourceIdentifier,
  viewer: Arc<dyn Viewer>,
  tracks: Vec<TrackInfo>,
  media_stream: MediaStream,
  bindings: Mutex<Bindings>,
}

/// A feed published by a remote participant.
///
/// Sources are created by the room when the platform reports them active.
/// Nothing is received until [`Source::receive`] is called.
#[derive(Clone)]
pub struct Source {
  inner: Arc<SourceInner>,
}

impl fmt::Debug for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Source")
      .field("identifier", &self.inner.identifier)
      .field("tracks", &self.inner.tracks)
      .finish()
  }
}

impl Source {
  pub(crate) fn new(viewer: Arc<dyn Viewer>, source_id: &str, tracks: Vec<TrackInfo>) -> Self {
    Self {
      inner: Arc::new(SourceInner {
        identifier: SourceIdentifier::from_source_id(source_id),
        viewer,
        tracks,
        media_stream: MediaStream::new(),
        bindings: Mutex::new(Bindings::default()),
      }),
    }
  }

  pub fn identifier(&self) -> &SourceIdentifier {
    &self.inner.identifier
  }

  /// The tracks the platform advertised for this source.
  pub fn tracks(&self) -> &[TrackInfo] {
    &self.inner.tracks
  }

  /// The received audio / video. Tracks appear once [`Source::receive`] has bound them.
  pub fn media_stream(&self) -> &MediaStream {
    &self.inner.media_stream
  }

  pub async fn audio_media_id(&self) -> Option<String> {
    let bindings = self.inner.bindings.lock().await;
    bindings.audio.as_ref().map(|binding| binding.media_id.clone())
  }

  pub async fn video_media_id(&self) -> Option<String> {
    let bindings = self.inner.bindings.lock().await;
    bindings.video.as_ref().map(|binding| binding.media_id.clone())
  }

  /// Starts receiving the source: one transceiver per advertised media type,
  /// then a projection of the source's tracks onto them. The bindings are only
  /// kept once the projection succeeded, so a failed call can be retried.
  #[tracing::instrument(level = "debug", err)]
  pub async fn receive(&self) -> Result<()> {
    let mut bindings = self.inner.bindings.lock().await;
    if !bindings.is_empty() {
      debug!("source already received");
      return Ok(());
    }

    let mut pending = Bindings::default();
    if let Err(e) = self.bind_and_project(&mut pending).await {
      let media_ids = pending.media_ids();
      if !media_ids.is_empty() {
        if let Err(e) = self.inner.viewer.unproject(&media_ids).await {
          warn!("failed to release {:?}: {:?}", media_ids, e);
        }
      }
      return Err(e);
    }
    *bindings = pending;
    Ok(())
  }

  async fn bind_and_project(&self, bindings: &mut Bindings) -> Result<()> {
    bindings.audio = self.bind(MediaType::Audio).await?;
    bindings.video = self.bind(MediaType::Video).await?;

    let mapping: Vec<_> = [(MediaType::Audio, &bindings.audio), (MediaType::Video, &bindings.video)]
      .into_iter()
      .filter_map(|(media, binding)| {
        binding.as_ref().map(|binding| ProjectionMapping {
          media,
          track_id: binding.track_id.clone(),
          media_id: binding.media_id.clone(),
        })
      })
      .collect();

    info!(
      "projecting source {} -> {:?}",
      self.inner.identifier.source_id(),
      mapping
    );
    self
      .inner
      .viewer
      .project(self.inner.identifier.source_id(), &mapping)
      .await
  }

  async fn bind(&self, media: MediaType) -> Result<Option<Binding>> {
    let track = match self.inner.tracks.iter().find(|track| track.media == media) {
      Some(track) => track,
      None => return Ok(None),
    };
    let transceiver = self
      .inner
      .viewer
      .add_remote_track(media, &[self.inner.media_stream.clone()])
      .await?;
    Ok(transceiver.mid.map(|media_id| Binding {
      media_id,
      track_id: track.track_id.clone(),
    }))
  }

  /// Stops receiving the source.
  #[tracing::instrument(level = "debug", err)]
  pub async fn stop(&self) -> Result<()> {
    let mut bindings = self.inner.bindings.lock().await;
    let media_ids = bindings.media_ids();
    if media_ids.is_empty() {
      return Ok(());
    }
    info!("unprojecting {:?}", media_ids);
    self.inner.viewer.unproject(&media_ids).await?;
    *bindings = Bindings::default();
    Ok(())
  }

  /// Whether the remote publisher is considered to be speaking. Any failure
  /// to read statistics counts as not speaking.
  pub async fn is_speaking(&self) -> bool {
    let audio_media_id = match self.audio_media_id().await {
      Some(media_id) => media_id,
      None => return false,
    };

    match self.inner.viewer.stats().await {
      Ok(stats) => stats
        .iter()
        .filter(|stats| stats.mid.as_deref() == Some(audio_media_id.as_str()))
        .find_map(|stats| stats.audio_level())
        .map(|level| level >= IS_SPEAKING_THRESHOLD)
        .unwrap_or_default(),
      Err(e) => {
        trace!(
          "is_speaking (remote) {}: {:?}",
          self.inner.identifier.source_id(),
          e
        );
        false
      },
    }
  }

  /// If no audio track is available, the source is reported as muted.
  pub fn is_muted(&self) -> bool {
    self
      .inner
      .media_stream
      .first_audio_track()
      .map(|track| !track.enabled())
      .unwrap_or(true)
  }

  pub fn mute(&self) {
    if let Some(track) = self.inner.media_stream.first_audio_track() {
      track.set_enabled(false);
    }
  }

  pub fn unmute(&self) {
    if let Some(track) = self.inner.media_stream.first_audio_track() {
      track.set_enabled(true);
    }
  }
}
