//! The executor/event-sink seam (spec.md §9 "Design Notes").
//!
//! `Executor` replaces "run-loop scheduling": the host supplies (i) the
//! task driving I/O readiness — which is just whatever spawns the
//! connection's own task — and (ii) the dispatch context for event
//! delivery, modeled here. It is the same shape as the teacher's own doc
//! comment for `hyper::rt::Executor`:
//!
//! ```ignore
//! struct SpawnExecutor;
//! impl<Fut> hyper::rt::Executor<Fut> for SpawnExecutor { .. }
//! ```
//!
//! `EventSink` is the delegate-equivalent: every method has a no-op
//! default, and the connection only ever holds a `Weak` reference to it so
//! a user dropping their handle can't crash an in-flight dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use crate::close::{CloseCode, CloseContext};
use crate::error::WebSocketError;

/// A host-supplied spawner for the write-pump task and the event-dispatch
/// task.
pub trait Executor: Send + Sync + 'static {
  fn execute(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// Spawns directly onto the ambient tokio runtime — the default most
/// hosts will use, analogous to the teacher's `SpawnExecutor` example.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
  fn execute(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    tokio::task::spawn(future);
  }
}

/// The event-sink interface (spec.md §6 "Event surface"). Every method is
/// a no-op by default; implementors override only the events they care
/// about.
pub trait EventSink: Send + Sync + 'static {
  fn on_open(&self, _negotiated_protocol: Option<&str>) {}
  fn on_message_text(&self, _text: &str) {}
  fn on_message_binary(&self, _data: &Bytes) {}
  fn on_pong(&self, _payload: &Bytes) {}
  fn on_write_complete(&self, _id: u64) {}
  fn on_closing(&self, _code: CloseCode, _reason: &str) {}
  fn on_closed(&self, _context: &CloseContext) {}
  fn on_failed(&self, _error: &WebSocketError) {}
}

/// One occurrence on the core's event surface, posted to an
/// [`EventDispatcher`]. Owned so it can be handed off across the
/// asynchronous dispatch boundary (spec.md §5 "Event delivery").
#[derive(Debug)]
pub enum Event {
  Opened { negotiated_protocol: Option<String> },
  MessageText(String),
  MessageBinary(Bytes),
  Pong(Bytes),
  WriteComplete(u64),
  Closing { code: CloseCode, reason: String },
  Closed(CloseContext),
  Failed(WebSocketError),
}

/// Posts events somewhere; the core never calls an `EventSink` method
/// inline on its I/O task (spec.md §5).
pub trait EventDispatcher: Send + Sync + 'static {
  fn dispatch(&self, event: Event);
}

/// A lock-guarded, weak back-reference to the registered sink (spec.md §9
/// "Weak delegate back-reference").
pub struct SinkSlot {
  slot: Mutex<Option<Weak<dyn EventSink>>>,
}

impl SinkSlot {
  pub fn new(sink: &Arc<dyn EventSink>) -> Self {
    Self { slot: Mutex::new(Some(Arc::downgrade(sink))) }
  }

  pub fn empty() -> Self {
    Self { slot: Mutex::new(None) }
  }

  /// Replaces the registered sink, e.g. when a host re-homes the
  /// connection onto a new delegate.
  pub fn set(&self, sink: &Arc<dyn EventSink>) {
    *self.slot.lock().unwrap() = Some(Arc::downgrade(sink));
  }

  fn upgrade(&self) -> Option<Arc<dyn EventSink>> {
    self.slot.lock().unwrap().as_ref().and_then(Weak::upgrade)
  }
}

/// The "thin adapter" spec.md §1 describes: re-dispatches events posted
/// from the I/O task onto the host's executor, calling the sink's methods
/// there instead of inline.
pub struct SinkDispatcher<E> {
  sink: SinkSlot,
  executor: E,
}

impl<E: Executor> SinkDispatcher<E> {
  pub fn new(sink: SinkSlot, executor: E) -> Self {
    Self { sink, executor }
  }
}

impl<E: Executor> EventDispatcher for SinkDispatcher<E> {
  fn dispatch(&self, event: Event) {
    let Some(sink) = self.sink.upgrade() else {
      // The user dropped their handle to the sink; tolerate it silently
      // (spec.md §9).
      return;
    };

    self.executor.execute(Box::pin(async move {
      match event {
        Event::Opened { negotiated_protocol } => sink.on_open(negotiated_protocol.as_deref()),
        Event::MessageText(text) => sink.on_message_text(&text),
        Event::MessageBinary(data) => sink.on_message_binary(&data),
        Event::Pong(payload) => sink.on_pong(&payload),
        Event::WriteComplete(id) => sink.on_write_complete(id),
        Event::Closing { code, reason } => sink.on_closing(code, &reason),
        Event::Closed(context) => sink.on_closed(&context),
        Event::Failed(error) => sink.on_failed(&error),
      }
    }));
  }
}

/// A dispatcher that discards every event; useful for tests that only
/// care about wire behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl EventDispatcher for NullDispatcher {
  fn dispatch(&self, _event: Event) {}
}
