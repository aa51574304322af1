use crate::{
  media::{MediaStream, MediaStreamConstraints},
  source_identifier::SourceType,
};

/// The stream a room connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInformation {
  pub stream_name: String,
  pub stream_account_id: String,
}

impl StreamInformation {
  pub fn new(stream_name: impl Into<String>, stream_account_id: impl Into<String>) -> Self {
    Self {
      stream_name: stream_name.into(),
      stream_account_id: stream_account_id.into(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
  /// Token to subscribe to secure streams. Unsecured streams don't need one.
  pub subscriber_token: Option<String>,
}

/// Where the published audio / video comes from.
#[derive(Debug, Clone)]
pub enum PublishMedia {
  /// Capture new tracks from the media devices. They are always released
  /// when the source is unpublished.
  Constraints(MediaStreamConstraints),
  /// Publish a stream managed by the caller.
  Stream {
    media_stream: MediaStream,
    /// Stop the stream's tracks when the source is unpublished.
    release_on_leave: bool,
  },
}

impl PublishMedia {
  pub fn stream(media_stream: MediaStream) -> Self {
    PublishMedia::Stream {
      media_stream,
      release_on_leave: true,
    }
  }
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
  /// Token that allows publishing to the stream.
  pub publish_token: String,
  pub source_type: SourceType,
  /// Defaults to the source type.
  pub source_name: Option<String>,
  pub media: PublishMedia,
}

impl PublishOptions {
  pub fn new(publish_token: impl Into<String>, source_type: SourceType, media: PublishMedia) -> Self {
    Self {
      publish_token: publish_token.into(),
      source_type,
      source_name: None,
      media,
    }
  }

  pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
    self.source_name = Some(source_name.into());
    self
  }

  pub(crate) fn source_name(&self) -> String {
    self
      .source_name
      .clone()
      .unwrap_or_else(|| self.source_type.to_string())
  }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
  pub publisher_name: String,
  pub publish: PublishOptions,
  pub watch: WatchOptions,
}
