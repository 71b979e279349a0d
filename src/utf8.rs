//! Streaming UTF-8 validation for TEXT messages (spec.md §4.3).
//!
//! A multi-byte code point can straddle a fragment boundary; a naive
//! "validate each chunk independently" approach would reject perfectly
//! valid messages. `Utf8Streamer` holds the teacher's declared `utf-8`
//! crate's `Incomplete` state between calls so a trailing partial sequence
//! is carried forward instead of rejected.

use utf8::{DecodeError, Incomplete};

/// Incremental UTF-8 validator. One instance per in-progress TEXT message.
#[derive(Default)]
pub struct Utf8Streamer {
  partial: Option<Incomplete>,
}

impl Utf8Streamer {
  pub fn new() -> Self {
    Self { partial: None }
  }

  /// Validates a newly-appended chunk, resuming from any partial code
  /// point left over from the previous call.
  ///
  /// Returns `Err` as soon as an invalid sequence is found, so the
  /// connection can close with 1007 without waiting for FIN (spec.md
  /// §4.3).
  pub fn push(&mut self, chunk: &[u8]) -> Result<(), InvalidUtf8> {
    let mut input = chunk;

    if let Some(mut incomplete) = self.partial.take() {
      match incomplete.try_complete(input) {
        None => {
          // The whole chunk was consumed continuing the same code point
          // and it's still not complete; keep waiting.
          self.partial = Some(incomplete);
          return Ok(());
        }
        Some((Ok(_valid_str), rest)) => {
          input = rest;
        }
        Some((Err(_invalid_bytes), _rest)) => {
          return Err(InvalidUtf8);
        }
      }
    }

    self.validate_rest(input)
  }

  fn validate_rest(&mut self, mut input: &[u8]) -> Result<(), InvalidUtf8> {
    loop {
      if input.is_empty() {
        return Ok(());
      }
      match utf8::decode(input) {
        Ok(_) => return Ok(()),
        Err(DecodeError::Invalid { .. }) => return Err(InvalidUtf8),
        Err(DecodeError::Incomplete { incomplete_suffix, .. }) => {
          self.partial = Some(incomplete_suffix);
          return Ok(());
        }
      }
    }
  }

  /// Call once the message is finalized (FIN=1). A held partial sequence
  /// at this point means the message ended mid-code-point, which is
  /// invalid per spec.md §4.3.
  pub fn finish(&mut self) -> Result<(), InvalidUtf8> {
    if self.partial.take().is_some() {
      Err(InvalidUtf8)
    } else {
      Ok(())
    }
  }
}

/// Marker error: the caller already knows this maps to close code 1007.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidUtf8;

/// Fast-path validation for a complete, unfragmented TEXT payload (no
/// streaming state needed). Uses `simdutf8` when the `simd` feature is
/// enabled, matching the teacher's own `#[cfg(feature = "simd")]` branch.
pub fn validate_complete(bytes: &[u8]) -> Result<(), InvalidUtf8> {
  #[cfg(feature = "simd")]
  {
    simdutf8::basic::from_utf8(bytes).map(|_| ()).map_err(|_| InvalidUtf8)
  }
  #[cfg(not(feature = "simd"))]
  {
    std::str::from_utf8(bytes).map(|_| ()).map_err(|_| InvalidUtf8)
  }
}
