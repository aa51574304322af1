use uuid::Uuid;

use crate::error::RoomError;

pub(crate) fn generate_id() -> String {
  Uuid::new_v4().to_string()
}

/// Rejects an empty required field.
pub(crate) fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RoomError> {
  if value.is_empty() {
    Err(RoomError::MissingField(field))
  }
  else {
    Ok(value)
  }
}

pub(crate) fn first<T: Clone>(items: &[T]) -> Option<T> {
  items.first().cloned()
}
