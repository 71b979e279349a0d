//! Send queue and write pump (spec.md §4.6, §5).
//!
//! The queue is the one synchronized boundary in an otherwise
//! single-threaded core: any thread can enqueue a send, but only the write
//! pump (running on the connection's own task) ever dequeues. Two
//! `tokio::sync::mpsc` unbounded channels stand in for the "control frames
//! jump ahead of not-yet-started data frames" rule — a `tokio::select!`
//! with `biased` always drains the control lane first, and a frame that
//! has already started writing is never interrupted because the pump
//! doesn't poll the queue again until the current item is fully flushed.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::close::CloseCode;
use crate::error::WebSocketError;
use crate::executor::{Event, EventDispatcher};
use crate::frame::{encode_masked, Frame};

/// What kind of payload a queued send carries (spec.md §3 "Send item").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
  Text,
  Binary,
  Ping,
  Pong,
  Close,
}

/// One item waiting to be written. `completion_id`, if set, is echoed
/// back via [`Event::WriteComplete`] once the last byte leaves the
/// serializer.
pub struct SendItem {
  pub kind: SendKind,
  pub payload: Bytes,
  pub completion_id: Option<u64>,
}

impl SendItem {
  fn into_frame(self) -> Frame {
    match self.kind {
      SendKind::Text => Frame::text(self.payload),
      SendKind::Binary => Frame::binary(self.payload),
      SendKind::Ping => Frame::ping(self.payload),
      SendKind::Pong => Frame::pong(self.payload),
      SendKind::Close => Frame::close_raw(self.payload),
    }
  }
}

/// A cloneable, thread-safe handle for enqueuing sends. Cheap to clone
/// and safe to hold from any thread (spec.md §5).
#[derive(Clone)]
pub struct SendHandle {
  data_tx: mpsc::UnboundedSender<SendItem>,
  control_tx: mpsc::UnboundedSender<SendItem>,
}

impl SendHandle {
  /// Enqueues a data-lane item (TEXT/BINARY). Returns a usage error if the
  /// write pump has already shut down.
  pub fn enqueue_data(&self, item: SendItem) -> Result<(), WebSocketError> {
    self
      .data_tx
      .send(item)
      .map_err(|_| WebSocketError::UsageError("send queue is closed"))
  }

  /// Enqueues a control-lane item (PING/PONG/CLOSE), which jumps ahead of
  /// any data frame that hasn't started transmitting yet (spec.md §4.6).
  pub fn enqueue_control(&self, item: SendItem) -> Result<(), WebSocketError> {
    self
      .control_tx
      .send(item)
      .map_err(|_| WebSocketError::UsageError("send queue is closed"))
  }

  /// Convenience for the close handshake: enqueue a CLOSE frame on the
  /// control lane (spec.md §4.5 "enqueue CLOSE frame").
  pub fn enqueue_close(&self, code: CloseCode, reason: &str) -> Result<(), WebSocketError> {
    self.enqueue_control(SendItem { kind: SendKind::Close, payload: Frame::close(code, reason).payload, completion_id: None })
  }
}

/// Builds a fresh queue and its handle. The handle may be cloned freely;
/// the queue itself is consumed by [`WritePump::run`].
pub fn channel() -> (SendQueue, SendHandle) {
  let (data_tx, data_rx) = mpsc::unbounded_channel();
  let (control_tx, control_rx) = mpsc::unbounded_channel();
  (SendQueue { data_rx, control_rx }, SendHandle { data_tx, control_tx })
}

pub struct SendQueue {
  data_rx: mpsc::UnboundedReceiver<SendItem>,
  control_rx: mpsc::UnboundedReceiver<SendItem>,
}

impl SendQueue {
  async fn next(&mut self) -> Option<SendItem> {
    tokio::select! {
      biased;
      item = self.control_rx.recv() => match item {
        Some(item) => Some(item),
        None => self.data_rx.recv().await,
      },
      item = self.data_rx.recv() => item,
    }
  }
}

/// Drains the send queue onto a transport, one frame at a time, notifying
/// `dispatcher` when each item's last byte has been written (spec.md
/// §4.6).
pub struct WritePump<T> {
  transport: T,
  queue: SendQueue,
}

impl<T> WritePump<T>
where
  T: tokio::io::AsyncWrite + Unpin,
{
  pub fn new(transport: T, queue: SendQueue) -> Self {
    Self { transport, queue }
  }

  /// Runs until the queue is closed (both handle sides dropped) or a
  /// transport error occurs. Returns the opcode of the last frame
  /// written, so the connection state machine can recognize "our CLOSE
  /// flushed" (spec.md §4.5).
  pub async fn run(&mut self, dispatcher: &dyn EventDispatcher) -> Result<(), WebSocketError> {
    while let Some(item) = self.queue.next().await {
      let completion_id = item.completion_id;
      let is_close = item.kind == SendKind::Close;
      let frame = item.into_frame();
      let wire = encode_masked(&frame);

      self.write_all_resumable(&wire).await?;
      self.transport.flush().await?;

      if let Some(id) = completion_id {
        dispatcher.dispatch(Event::WriteComplete(id));
      }

      if is_close {
        return Ok(());
      }
    }
    Ok(())
  }

  /// Writes `buf` to the transport, remembering the cursor across partial
  /// writes instead of assuming one `write` call drains everything
  /// (spec.md §4.6 "on partial write, remembers its cursor and resumes
  /// when the transport signals writable").
  async fn write_all_resumable(&mut self, buf: &[u8]) -> Result<(), WebSocketError> {
    let mut cursor = 0;
    while cursor < buf.len() {
      let n = self.transport.write(&buf[cursor..]).await?;
      if n == 0 {
        return Err(WebSocketError::UnexpectedEof);
      }
      cursor += n;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::executor::NullDispatcher;
  use assert2::check;
  use tokio::io::duplex;

  #[tokio::test]
  async fn control_frame_jumps_ahead_of_queued_data() {
    let (client, mut server) = duplex(4096);
    let (queue, handle) = channel();
    let mut pump = WritePump::new(client, queue);

    handle
      .enqueue_data(SendItem { kind: SendKind::Binary, payload: Bytes::from_static(b"data"), completion_id: Some(1) })
      .unwrap();
    handle
      .enqueue_control(SendItem { kind: SendKind::Ping, payload: Bytes::new(), completion_id: Some(2) })
      .unwrap();

    // Drop both senders after enqueueing so `run` terminates once drained.
    drop(handle);

    let dispatcher = NullDispatcher;
    let run = tokio::spawn(async move {
      let _ = pump.run(&dispatcher).await;
    });

    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 64];
    let n = server.read(&mut buf).await.unwrap();
    // First frame off the wire should be the control (PING) frame: opcode
    // nibble 0x9 in the low bits of the first header byte.
    check!(buf[0] & 0x0F == 0x9);
    let _ = n;
    let _ = run.await;
  }

  #[tokio::test]
  async fn write_complete_fires_after_full_frame() {
    let (client, mut server) = duplex(4096);
    let (queue, handle) = channel();
    let mut pump = WritePump::new(client, queue);
    handle
      .enqueue_data(SendItem { kind: SendKind::Text, payload: Bytes::from_static(b"hi"), completion_id: Some(42) })
      .unwrap();
    drop(handle);

    let (tx, mut rx) = mpsc::unbounded_channel();
    struct ChannelDispatcher(mpsc::UnboundedSender<Event>);
    impl EventDispatcher for ChannelDispatcher {
      fn dispatch(&self, event: Event) {
        let _ = self.0.send(event);
      }
    }
    let dispatcher = ChannelDispatcher(tx);

    let run = tokio::spawn(async move {
      let _ = pump.run(&dispatcher).await;
    });

    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 64];
    let _ = server.read(&mut buf).await.unwrap();
    let _ = run.await;

    let event = rx.recv().await.unwrap();
    check!(matches!(event, Event::WriteComplete(42)));
  }
}
