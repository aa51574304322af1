pub mod director;
pub mod engine;
mod error;
mod events;
pub mod media;
mod options;
mod published_source;
mod publisher;
mod room;
mod source;
mod source_identifier;
#[cfg(test)]
mod testing;
mod util;

pub use crate::{
  director::{ConnectionCredentials, Director, TokenGenerator},
  engine::{BroadcastEvent, Engine, MediaDevices, Publish, Viewer},
  error::RoomError,
  events::{RoomEvent, RoomEventKind},
  media::{MediaStream, MediaStreamConstraints, MediaStreamTrack, MediaType},
  options::{ConnectOptions, PublishMedia, PublishOptions, StreamInformation, WatchOptions},
  published_source::PublishedSource,
  publisher::Publisher,
  room::{Room, RoomState, MAX_SOURCES},
  source::{Source, IS_SPEAKING_THRESHOLD},
  source_identifier::{encode, SourceIdentifier, SourceType},
};

#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing(level: tracing::Level) {
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
    .with_target(false)
    .init();
}
