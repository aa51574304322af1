use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{info, trace, warn};

use crate::{
  director::TokenGenerator,
  engine::{Engine, Publish},
  error::RoomError,
  media::{MediaStream, MediaStreamTrack},
  options::{PublishMedia, PublishOptions},
  source::IS_SPEAKING_THRESHOLD,
  source_identifier::SourceIdentifier,
  util::{first, require},
};

struct PublishedSourceInner {
  source_id: SourceIdentifier,
  audio_track: Option<MediaStreamTrack>,
  video_track: Option<MediaStreamTrack>,
  release_on_leave: bool,
  publisher: Mutex<Option<Arc<dyn Publish>>>,
}

/// A feed published to the stream from this device.
#[derive(Clone)]
pub struct PublishedSource {
  inner: Arc<PublishedSourceInner>,
}

impl fmt::Debug for PublishedSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PublishedSource")
      .field("source_id", &self.inner.source_id)
      .field("audio_track", &self.inner.audio_track)
      .field("video_track", &self.inner.video_track)
      .field("release_on_leave", &self.inner.release_on_leave)
      .finish()
  }
}

impl PublishedSource {
  /// Acquires the tracks described by `options` and publishes them under `source_id`.
  pub(crate) async fn publish(
    engine: &dyn Engine,
    stream_name: &str,
    token_generator: Arc<dyn TokenGenerator>,
    source_id: SourceIdentifier,
    options: &PublishOptions,
  ) -> Result<Self, RoomError> {
    require(&options.publish_token, "publish token")?;

    let (media_stream, release_on_leave, acquired) = match &options.media {
      PublishMedia::Stream {
        media_stream,
        release_on_leave,
      } => (media_stream.clone(), *release_on_leave, false),
      PublishMedia::Constraints(constraints) => {
        let media_stream = engine.media_devices().get_user_media(constraints).await?;
        (media_stream, true, true)
      },
    };
    let video_track = first(&media_stream.video_tracks());
    let audio_track = first(&media_stream.audio_tracks());
    let tracks: Vec<_> = video_track.iter().chain(audio_track.iter()).cloned().collect();

    let connected = async {
      let publisher = engine.create_publisher(stream_name, token_generator)?;
      publisher.connect(&tracks, source_id.source_id()).await?;
      Ok::<_, anyhow::Error>(publisher)
    }
    .await;
    let publisher = match connected {
      Ok(publisher) => publisher,
      Err(e) => {
        if acquired {
          release(&media_stream);
        }
        return Err(e.into());
      },
    };

    info!("publishing source {}", source_id.source_id());
    Ok(Self {
      inner: Arc::new(PublishedSourceInner {
        source_id,
        audio_track,
        video_track,
        release_on_leave,
        publisher: Mutex::new(Some(publisher)),
      }),
    })
  }

  pub fn source_id(&self) -> &SourceIdentifier {
    &self.inner.source_id
  }

  pub fn audio_track(&self) -> Option<&MediaStreamTrack> {
    self.inner.audio_track.as_ref()
  }

  pub fn video_track(&self) -> Option<&MediaStreamTrack> {
    self.inner.video_track.as_ref()
  }

  pub fn release_on_leave(&self) -> bool {
    self.inner.release_on_leave
  }

  /// The publish session, until the source is unpublished.
  pub fn publisher(&self) -> Option<Arc<dyn Publish>> {
    self.inner.publisher.lock().clone()
  }

  /// Stops the publish session and, if requested, the tracks. Safe to call more than once.
  pub(crate) async fn unpublish(&self) {
    let publisher = self.inner.publisher.lock().take();
    if let Some(publisher) = publisher {
      info!("stop publishing {}", self.inner.source_id.source_id());
      if let Err(e) = publisher.stop().await {
        warn!("failed to stop publishing: {:?}", e);
      }
    }

    if self.inner.release_on_leave {
      info!("stop the audio & video tracks");
      for track in self.inner.video_track.iter().chain(self.inner.audio_track.iter()) {
        track.stop();
      }
    }
  }

  /// Whether the local publisher is considered to be speaking. Any failure
  /// to read statistics counts as not speaking.
  pub async fn is_speaking(&self) -> bool {
    let audio_track = match &self.inner.audio_track {
      Some(track) => track,
      None => return false,
    };
    let publisher = match self.publisher() {
      Some(publisher) => publisher,
      None => return false,
    };

    match publisher.stats(Some(audio_track)).await {
      Ok(stats) => stats
        .iter()
        .find_map(|stats| stats.audio_level())
        .map(|level| level >= IS_SPEAKING_THRESHOLD)
        .unwrap_or_default(),
      Err(e) => {
        trace!(
          "is_speaking (local) {}: {:?}",
          self.inner.source_id.source_id(),
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
      .audio_track
      .as_ref()
      .map(|track| !track.enabled())
      .unwrap_or(true)
  }

  pub fn mute(&self) {
    if let Some(track) = &self.inner.audio_track {
      track.set_enabled(false);
    }
  }

  pub fn unmute(&self) {
    if let Some(track) = &self.inner.audio_track {
      track.set_enabled(true);
    }
  }
}

fn release(media_stream: &MediaStream) {
  for track in media_stream.tracks() {
    track.stop();
  }
}
