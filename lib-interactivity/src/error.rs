use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
  #[error("the {0} is missing")]
  MissingField(&'static str),

  #[error("the name of the publisher is missing, reconnect to the stream")]
  PublisherNameMissing,

  #[error("maximum number of {0} sources reached")]
  MaxSourcesReached(usize),

  #[error("source {0} is already published")]
  DuplicateSource(String),

  #[error("the room has been left")]
  Left,

  #[error("the room is not watching the stream")]
  NotWatching,

  #[error("transport engine failure")]
  Transport(#[from] anyhow::Error),
}

impl RoomError {
  /// Validation and capacity errors are raised before anything is sent to
  /// the transport engine.
  pub fn is_transport(&self) -> bool {
    matches!(self, RoomError::Transport(_))
  }
}
