//! Stitches fragmented data frames into complete messages (spec.md §3
//! "Inbound message in progress", §4.3).
//!
//! Grounded on the teacher's `FragmentCollector`, which the teacher's own
//! doc comments describe as giving the application "always... full
//! messages" instead of raw per-frame delivery.

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, WebSocketError};
use crate::frame::{Frame, OpCode};
use crate::utf8::{self, Utf8Streamer};

/// A complete, reassembled application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
  Text(String),
  Binary(Bytes),
}

struct InProgress {
  opcode: OpCode,
  buffer: BytesMut,
  /// `Some` only while reassembling a TEXT message.
  validator: Option<Utf8Streamer>,
}

/// Reassembles CONTINUATION frames into complete TEXT/BINARY messages.
/// Holds at most one in-progress message at a time (spec.md §3 invariant).
pub struct MessageAssembler {
  in_progress: Option<InProgress>,
  max_message_size: usize,
}

impl MessageAssembler {
  pub fn new(max_message_size: usize) -> Self {
    Self { in_progress: None, max_message_size }
  }

  /// Feeds one decoded data-or-continuation frame. Control frames must be
  /// intercepted before reaching this method (spec.md §4.4 handles them
  /// separately). Returns `Ok(Some(message))` once FIN completes a
  /// message.
  pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, WebSocketError> {
    match frame.opcode {
      OpCode::Text | OpCode::Binary => self.start(frame),
      OpCode::Continuation => self.continue_message(frame),
      _ => unreachable!("control frames are not routed through the assembler"),
    }
  }

  fn start(&mut self, frame: Frame) -> Result<Option<Message>, WebSocketError> {
    if self.in_progress.is_some() {
      return Err(ProtocolError::UnexpectedDataFrame.into());
    }

    if frame.payload.len() > self.max_message_size {
      return Err(WebSocketError::MessageTooBig {
        size: frame.payload.len(),
        limit: self.max_message_size,
      });
    }

    if frame.fin {
      return self.finalize_single_frame(frame);
    }

    let mut validator = (frame.opcode == OpCode::Text).then(Utf8Streamer::new);
    if let Some(validator) = validator.as_mut() {
      validator.push(&frame.payload).map_err(|_| WebSocketError::InvalidUtf8)?;
    }

    let mut buffer = BytesMut::with_capacity(frame.payload.len());
    buffer.extend_from_slice(&frame.payload);
    self.in_progress = Some(InProgress { opcode: frame.opcode, buffer, validator });
    Ok(None)
  }

  fn finalize_single_frame(&self, frame: Frame) -> Result<Option<Message>, WebSocketError> {
    match frame.opcode {
      OpCode::Text => {
        utf8::validate_complete(&frame.payload).map_err(|_| WebSocketError::InvalidUtf8)?;
        let text = String::from_utf8(frame.payload.to_vec())
          .expect("validate_complete already confirmed this is valid UTF-8");
        Ok(Some(Message::Text(text)))
      }
      OpCode::Binary => Ok(Some(Message::Binary(frame.payload))),
      _ => unreachable!(),
    }
  }

  fn continue_message(&mut self, frame: Frame) -> Result<Option<Message>, WebSocketError> {
    let Some(mut state) = self.in_progress.take() else {
      return Err(ProtocolError::UnexpectedContinuation.into());
    };

    let projected_len = state.buffer.len() + frame.payload.len();
    if projected_len > self.max_message_size {
      return Err(WebSocketError::MessageTooBig { size: projected_len, limit: self.max_message_size });
    }

    if let Some(validator) = state.validator.as_mut() {
      if let Err(_invalid) = validator.push(&frame.payload) {
        return Err(WebSocketError::InvalidUtf8);
      }
    }

    state.buffer.extend_from_slice(&frame.payload);

    if !frame.fin {
      self.in_progress = Some(state);
      return Ok(None);
    }

    if let Some(mut validator) = state.validator {
      validator.finish().map_err(|_| WebSocketError::InvalidUtf8)?;
      let text = String::from_utf8(state.buffer.to_vec())
        .expect("streaming validator already confirmed this is valid UTF-8");
      Ok(Some(Message::Text(text)))
    } else {
      Ok(Some(Message::Binary(state.buffer.freeze())))
    }
  }

  /// Drops any message currently being reassembled. Called when the
  /// connection closes abnormally (spec.md §7 "in-progress inbound
  /// messages are dropped").
  pub fn reset(&mut self) {
    self.in_progress = None;
  }
}
