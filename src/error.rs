//! Error kinds, grouped the way spec.md §7 categorizes them:
//! handshake-failed, protocol-violation, policy-violation, encoding-error,
//! transport-error, usage-error.

use crate::close::CloseCode;

/// Errors produced by the WebSocket core.
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
  /// The opening handshake failed: bad status, missing/invalid upgrade
  /// headers, or the underlying transport failed before it completed.
  #[error("handshake failed: {0}")]
  HandshakeFailed(#[from] HandshakeError),

  /// A malformed frame, reserved bits set, unexpected continuation, or an
  /// oversized control frame (spec.md §4.2, §4.3).
  #[error("protocol violation: {0}")]
  ProtocolViolation(#[from] ProtocolError),

  /// The message exceeded the configured maximum size.
  #[error("message of {size} bytes exceeds the {limit} byte limit")]
  MessageTooBig { size: usize, limit: usize },

  /// Invalid UTF-8 in a TEXT message (spec.md §4.3).
  #[error("invalid UTF-8 in text message")]
  InvalidUtf8,

  /// The underlying transport failed.
  #[error("transport error: {0}")]
  Io(#[from] std::io::Error),

  /// The transport reached EOF in the middle of a frame or the close
  /// handshake.
  #[error("unexpected end of stream")]
  UnexpectedEof,

  /// A programmer error: sending while not OPEN, or opening twice
  /// (spec.md §3 "Lifecycle", §7).
  #[error("usage error: {0}")]
  UsageError(&'static str),

  /// The close timer (spec.md §4.5) elapsed before the close handshake
  /// completed.
  #[error("close handshake timed out")]
  CloseTimeout,

  /// The handshake timer elapsed before a 101 response arrived.
  #[error("handshake timed out")]
  HandshakeTimeout,
}

impl WebSocketError {
  /// The close code this error implies, if the connection is to be torn
  /// down with a CLOSE frame rather than abruptly (spec.md §6).
  pub fn close_code(&self) -> Option<CloseCode> {
    match self {
      WebSocketError::ProtocolViolation(_) => Some(CloseCode::PROTOCOL_ERROR),
      WebSocketError::InvalidUtf8 => Some(CloseCode::INVALID_PAYLOAD),
      WebSocketError::MessageTooBig { .. } => Some(CloseCode::MESSAGE_TOO_BIG),
      WebSocketError::Io(_) | WebSocketError::UnexpectedEof => None,
      WebSocketError::HandshakeFailed(_)
      | WebSocketError::UsageError(_)
      | WebSocketError::CloseTimeout
      | WebSocketError::HandshakeTimeout => None,
    }
  }

  /// Whether this error is terminal via `failed` (as opposed to an
  /// orderly `closed`), per spec.md §7's mutual-exclusion rule.
  pub fn is_failure(&self) -> bool {
    matches!(
      self,
      WebSocketError::HandshakeFailed(_) | WebSocketError::Io(_) | WebSocketError::UnexpectedEof
    )
  }
}

/// Why the opening handshake did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
  #[error("could not reach host: {0}")]
  Unreachable(String),
  /// Carries the full response so a caller can inspect it on the
  /// `failed` event (spec.md §4.1 "non-101 status").
  #[error("expected HTTP status 101, got {status}")]
  UnexpectedStatus { status: u16, headers: Vec<(String, String)> },
  #[error("missing or invalid Upgrade header")]
  BadUpgradeHeader,
  #[error("missing or invalid Connection header")]
  BadConnectionHeader,
  #[error("Sec-WebSocket-Accept did not match the expected value")]
  AcceptKeyMismatch,
  #[error("server negotiated a subprotocol that was not offered")]
  UnofferedSubprotocol,
  #[error("malformed HTTP response: {0}")]
  MalformedResponse(String),
}

/// A violation of the framing protocol (spec.md §4.2's parser error list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
  #[error("RSV1/2/3 bits must be zero")]
  ReservedBitsNotZero,
  #[error("reserved or unknown opcode {0:#x}")]
  ReservedOpcode(u8),
  #[error("client received a masked frame")]
  MaskedFrameFromServer,
  #[error("control frame payload exceeds 125 bytes")]
  ControlFrameTooLarge,
  #[error("control frame is fragmented")]
  ControlFrameFragmented,
  #[error("received a data frame while a fragmented message was in progress")]
  UnexpectedDataFrame,
  #[error("received a continuation frame with no message in progress")]
  UnexpectedContinuation,
  #[error("close frame payload must be 0 or at least 2 bytes")]
  InvalidCloseFrame,
  #[error("close frame carried a disallowed status code")]
  InvalidCloseCode,
}

#[cfg(test)]
mod tests {
  use super::*;
  use assert2::check;

  #[test]
  fn protocol_errors_map_to_1002() {
    let err = WebSocketError::ProtocolViolation(ProtocolError::ReservedBitsNotZero);
    check!(err.close_code() == Some(CloseCode::PROTOCOL_ERROR));
  }

  #[test]
  fn invalid_utf8_maps_to_1007() {
    check!(WebSocketError::InvalidUtf8.close_code() == Some(CloseCode::INVALID_PAYLOAD));
  }

  #[test]
  fn io_errors_have_no_close_code() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
    check!(WebSocketError::Io(io).close_code().is_none());
  }

  #[test]
  fn failure_classification() {
    check!(WebSocketError::UnexpectedEof.is_failure());
    check!(!WebSocketError::InvalidUtf8.is_failure());
    check!(!WebSocketError::UsageError("send on non-open connection").is_failure());
  }
}
