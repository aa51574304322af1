use std::{
  ffi::{CStr, CString},
  os::raw::c_char,
  ptr,
};

use anyhow::{Context, Result};
pub use lib_interactivity::{init_tracing, SourceType};
use lib_interactivity::SourceIdentifier;
use tracing::warn;

#[repr(C)]
pub struct SourceRecord {
  pub source_id: *mut c_char,
  pub publisher_name: *mut c_char,
  pub source_type: SourceType,
  pub source_name: *mut c_char,
}

trait ResultExt<T> {
  fn ok_raw_or_log(self) -> *mut T;
}

impl<T> ResultExt<T> for Result<T> {
  fn ok_raw_or_log(self) -> *mut T {
    match self {
      Ok(o) => Box::into_raw(Box::new(o)),
      Err(e) => {
        warn!("lib-interactivity: {:?}", e);
        ptr::null_mut()
      },
    }
  }
}

/// Input that isn't UTF-8 is an error, never patched up.
unsafe fn borrow_str<'a>(s: *const c_char, what: &str) -> Result<&'a str> {
  if s.is_null() {
    anyhow::bail!("{} is null", what);
  }
  CStr::from_ptr(s)
    .to_str()
    .with_context(|| format!("{} is not valid UTF-8", what))
}

fn into_raw_string(s: &str) -> Result<*mut c_char> {
  Ok(CString::new(s).context("string contains a nul byte")?.into_raw())
}

/// `level` is one of `error`, `warn`, `info`, `debug`, `trace`. Returns false
/// if it isn't.
#[no_mangle]
pub unsafe extern "C" fn interactivity_init_tracing(level: *const c_char) -> bool {
  match borrow_str(level, "level").and_then(|level| level.parse().context("invalid tracing level")) {
    Ok(level) => {
      init_tracing(level);
      true
    },
    Err(e) => {
      eprintln!("lib-interactivity: {:?}", e);
      false
    },
  }
}

/// Returns the source id for the given source, to be released with
/// `interactivity_string_free`, or null on invalid input. A null
/// `source_name` defaults to the source type.
#[no_mangle]
pub unsafe extern "C" fn interactivity_source_id_encode(
  publisher_name: *const c_char,
  source_type: SourceType,
  source_name: *const c_char,
) -> *mut c_char {
  let encoded = borrow_str(publisher_name, "publisher name").and_then(|publisher_name| {
    let source_name = if source_name.is_null() {
      source_type.as_str()
    }
    else {
      borrow_str(source_name, "source name")?
    };
    into_raw_string(&lib_interactivity::encode(
      publisher_name,
      source_type,
      source_name,
    ))
  });
  match encoded {
    Ok(s) => s,
    Err(e) => {
      warn!("lib-interactivity: {:?}", e);
      ptr::null_mut()
    },
  }
}

/// Decodes `source_id`. Never fails on malformed ids; a null or non-UTF-8
/// argument yields null. Release the record with
/// `interactivity_source_record_free`.
#[no_mangle]
pub unsafe extern "C" fn interactivity_source_id_decode(source_id: *const c_char) -> *mut SourceRecord {
  borrow_str(source_id, "source id")
    .and_then(|source_id| {
      let identifier = SourceIdentifier::from_source_id(source_id);
      let source_id = into_raw_string(identifier.source_id())?;
      let publisher_name = match into_raw_string(identifier.publisher_name()) {
        Ok(s) => s,
        Err(e) => {
          drop(CString::from_raw(source_id));
          return Err(e);
        },
      };
      let source_name = match into_raw_string(identifier.source_name()) {
        Ok(s) => s,
        Err(e) => {
          drop(CString::from_raw(source_id));
          drop(CString::from_raw(publisher_name));
          return Err(e);
        },
      };
      Ok(SourceRecord {
        source_id,
        publisher_name,
        source_type: identifier.source_type(),
        source_name,
      })
    })
    .ok_raw_or_log()
}

#[no_mangle]
pub unsafe extern "C" fn interactivity_source_record_free(record: *mut SourceRecord) {
  if record.is_null() {
    return;
  }
  let record = Box::from_raw(record);
  for s in [record.source_id, record.publisher_name, record.source_name] {
    interactivity_string_free(s);
  }
}

#[no_mangle]
pub unsafe extern "C" fn interactivity_string_free(s: *mut c_char) {
  if !s.is_null() {
    drop(CString::from_raw(s));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  unsafe fn read(s: *const c_char) -> String {
    CStr::from_ptr(s).to_string_lossy().into_owned()
  }

  #[test]
  fn encode_then_decode() {
    let publisher_name = CString::new("fabien").unwrap();
    let source_name = CString::new("Its me").unwrap();
    unsafe {
      let source_id = interactivity_source_id_encode(
        publisher_name.as_ptr(),
        SourceType::Camera,
        source_name.as_ptr(),
      );
      assert_eq!(
        read(source_id),
        "eyJwbiI6ImZhYmllbiIsInN0IjoiY2FtZXJhIiwic24iOiJJdHMgbWUifQ=="
      );

      let record = interactivity_source_id_decode(source_id);
      assert!(!record.is_null());
      assert_eq!(read((*record).source_id), read(source_id));
      assert_eq!(read((*record).publisher_name), "fabien");
      assert_eq!((*record).source_type, SourceType::Camera);
      assert_eq!(read((*record).source_name), "Its me");

      interactivity_source_record_free(record);
      interactivity_string_free(source_id);
    }
  }

  #[test]
  fn missing_source_name_defaults_to_type() {
    let publisher_name = CString::new("ada").unwrap();
    unsafe {
      let source_id =
        interactivity_source_id_encode(publisher_name.as_ptr(), SourceType::Screenshare, ptr::null());
      let record = interactivity_source_id_decode(source_id);
      assert_eq!(read((*record).source_name), "screenshare");
      interactivity_source_record_free(record);
      interactivity_string_free(source_id);
    }
  }

  #[test]
  fn malformed_id_falls_back() {
    let source_id = CString::new("main source").unwrap();
    unsafe {
      let record = interactivity_source_id_decode(source_id.as_ptr());
      assert_eq!(read((*record).publisher_name), "main source");
      assert_eq!((*record).source_type, SourceType::Custom);
      assert_eq!(read((*record).source_name), "main source");
      interactivity_source_record_free(record);
    }
  }

  #[test]
  fn non_utf8_input_is_rejected() {
    let source_id = CString::new(vec![b'a', 0xff, b'b']).unwrap();
    unsafe {
      assert!(interactivity_source_id_decode(source_id.as_ptr()).is_null());
      assert!(interactivity_source_id_encode(source_id.as_ptr(), SourceType::Camera, ptr::null()).is_null());
    }
  }

  #[test]
  fn null_arguments() {
    unsafe {
      assert!(interactivity_source_id_decode(ptr::null()).is_null());
      assert!(interactivity_source_id_encode(ptr::null(), SourceType::Camera, ptr::null()).is_null());
      interactivity_source_record_free(ptr::null_mut());
      interactivity_string_free(ptr::null_mut());
    }
  }
}
