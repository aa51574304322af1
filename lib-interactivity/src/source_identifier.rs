use std::{fmt, str::FromStr};

use anyhow::bail;
use base64::{
  alphabet,
  engine::{
    general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
    DecodePaddingMode,
  },
  Engine as _,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accepts tokens with or without trailing padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
  &alphabet::STANDARD,
  GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The kind of feed a source carries.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(C)]
pub enum SourceType {
  /// The source comes from a camera.
  Camera,
  /// The source is a screenshare capture.
  Screenshare,
  /// Hardware encoders, captured DOM elements, or anything else.
  Custom,
}

impl SourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceType::Camera => "camera",
      SourceType::Screenshare => "screenshare",
      SourceType::Custom => "custom",
    }
  }
}

impl fmt::Display for SourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SourceType {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "camera" => SourceType::Camera,
      "screenshare" => SourceType::Screenshare,
      "custom" => SourceType::Custom,
      _ => bail!("unknown source type: {}", s),
    })
  }
}

#[derive(Serialize)]
struct EncodedIdentifier<'a> {
  pn: &'a str,
  st: SourceType,
  sn: &'a str,
}

/// Identifies a source on the platform.
///
/// The `source_id` is the only form that travels over the wire. It is the
/// base64 form of a compact JSON record `{"pn":..,"st":..,"sn":..}`, so the
/// publisher name, source type and source name can be recovered from it.
/// Sources published by clients that don't follow this convention still get
/// an identifier: see [`SourceIdentifier::from_source_id`].
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SourceIdentifier {
  source_id: String,
  publisher_name: String,
  source_type: SourceType,
  source_name: String,
}

impl SourceIdentifier {
  pub fn new(publisher_name: &str, source_type: SourceType, source_name: &str) -> Self {
    Self {
      source_id: encode(publisher_name, source_type, source_name),
      publisher_name: publisher_name.to_owned(),
      source_type,
      source_name: source_name.to_owned(),
    }
  }

  /// Parses a source id received from the platform.
  ///
  /// Every field missing from the token falls back on its own: the publisher
  /// and source names become the raw token and the type becomes
  /// [`SourceType::Custom`]. A token that isn't base64 JSON at all therefore
  /// falls back entirely. The returned identifier always carries the input
  /// token verbatim as its `source_id`.
  pub fn from_source_id(source_id: &str) -> Self {
    let record = decode_record(source_id);
    let field = |name: &str| {
      record
        .as_ref()
        .and_then(|record| record.get(name))
        .and_then(Value::as_str)
        .map(str::to_owned)
    };

    Self {
      publisher_name: field("pn").unwrap_or_else(|| source_id.to_owned()),
      source_type: field("st")
        .and_then(|st| st.parse().ok())
        .unwrap_or(SourceType::Custom),
      source_name: field("sn").unwrap_or_else(|| source_id.to_owned()),
      source_id: source_id.to_owned(),
    }
  }

  pub fn source_id(&self) -> &str {
    &self.source_id
  }

  pub fn publisher_name(&self) -> &str {
    &self.publisher_name
  }

  pub fn source_type(&self) -> SourceType {
    self.source_type
  }

  pub fn source_name(&self) -> &str {
    &self.source_name
  }
}

impl fmt::Display for SourceIdentifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source_id)
  }
}

/// Builds the wire token for a (publisher name, source type, source name) triple.
pub fn encode(publisher_name: &str, source_type: SourceType, source_name: &str) -> String {
  let record = EncodedIdentifier {
    pn: publisher_name,
    st: source_type,
    sn: source_name,
  };
  // serialising a struct of strings and a unit enum cannot fail
  let json = serde_json::to_vec(&record).unwrap_or_default();
  STANDARD.encode(json)
}

fn decode_record(source_id: &str) -> Option<Value> {
  let bytes = LENIENT.decode(source_id).ok()?;
  // browser clients produce latin-1 payloads
  let text = String::from_utf8(bytes)
    .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect());
  serde_json::from_str(&text).ok()
}
