//! The connection state machine (spec.md §4.5, §3 "Lifecycle").
//!
//! Grounded on `SRWebSocket.h`'s `SRReadyState`/open/close/send surface and
//! weak-delegate design, driven the way the teacher's own read/write loop
//! is driven — except here the read loop and the write pump are two
//! cooperating tasks handed to the host's [`Executor`] rather than one
//! blocking call pair, since spec.md §5 requires sends to originate from
//! any thread while decode/assembly stays single-threaded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, watch};

use crate::assembler::{Message, MessageAssembler};
use crate::close::{CloseCode, CloseContext};
use crate::config::ConnectionConfig;
use crate::error::{HandshakeError, ProtocolError, WebSocketError};
use crate::executor::{Event, EventDispatcher, EventSink, Executor, SinkDispatcher, SinkSlot};
use crate::frame::{FrameDecoder, OpCode};
use crate::handshake;
use crate::queue::{self, SendHandle, SendItem, SendKind, WritePump};
use crate::transport::Transport;

/// The four lifecycle states of spec.md §4.5. `Connecting` is never
/// observable through a [`Connection`] handle: the handle is only handed
/// back to the caller once the handshake has already succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
  Connecting,
  Open,
  Closing,
  Closed,
}

/// A live, open connection. Cheap to clone (everything inside is already
/// reference-counted or `Copy`); clones share the same underlying engine.
#[derive(Clone)]
pub struct Connection {
  send_handle: SendHandle,
  ready_state: watch::Receiver<ReadyState>,
  ready_state_tx: Arc<watch::Sender<ReadyState>>,
  dispatcher: Arc<dyn EventDispatcher>,
  local_close_initiated: Arc<AtomicBool>,
  next_completion_id: Arc<AtomicU64>,
  copy_on_enqueue: bool,
  response_headers: Arc<Vec<(String, String)>>,
}

impl Connection {
  /// Performs the opening handshake (spec.md §4.1) over `transport`, then
  /// spawns the write pump and the read/state-machine loop onto
  /// `executor`. Resolves once `opened` would fire; the caller gets a
  /// handle usable immediately for sends.
  pub async fn connect<T, E>(
    transport: T,
    config: ConnectionConfig,
    sink: Arc<dyn EventSink>,
    executor: E,
  ) -> Result<Connection, WebSocketError>
  where
    T: Transport,
    E: Executor + Clone,
  {
    let request = config.to_handshake_request();
    let prepared = handshake::build_request(&request);

    let (mut read_half, mut write_half) = tokio::io::split(transport);

    let handshake_result = tokio::time::timeout(
      config.handshake_timeout(),
      run_handshake(&mut read_half, &mut write_half, &request, &prepared.key, &prepared.bytes),
    )
    .await
    .map_err(|_| WebSocketError::HandshakeTimeout)?;

    let (negotiated_protocol, response_headers, residue) = handshake_result?;

    tracing::debug!(protocol = ?negotiated_protocol, "handshake complete");

    let (queue, send_handle) = queue::channel();
    let mut write_pump = WritePump::new(write_half, queue);

    let (ready_state_tx, ready_state_rx) = watch::channel(ReadyState::Open);
    let ready_state_tx = Arc::new(ready_state_tx);

    let sink_slot = SinkSlot::new(&sink);
    let dispatcher: Arc<dyn EventDispatcher> = Arc::new(SinkDispatcher::new(sink_slot, executor.clone()));

    let (pump_done_tx, pump_done_rx) = oneshot::channel();
    // A forced shutdown (close timeout, read error) races this against the
    // pump so the transport's write half is released even if the pump is
    // stalled mid-write on a backpressured connection (spec.md §5 "the
    // transport is released exactly once on entry to CLOSED").
    let (abort_tx, abort_rx) = oneshot::channel::<()>();
    let pump_dispatcher = dispatcher.clone();
    executor.execute(Box::pin(async move {
      tokio::select! {
        result = write_pump.run(pump_dispatcher.as_ref()) => {
          let _ = pump_done_tx.send(result);
        }
        _ = abort_rx => {
          tracing::debug!("write pump aborted, releasing transport");
        }
      }
    }));

    let local_close_initiated = Arc::new(AtomicBool::new(false));

    dispatcher.dispatch(Event::Opened { negotiated_protocol: negotiated_protocol.clone() });

    let loop_state = ReadLoop {
      read_half,
      buf: residue,
      send_handle: send_handle.clone(),
      dispatcher: dispatcher.clone(),
      ready_state_tx: ready_state_tx.clone(),
      local_close_initiated: local_close_initiated.clone(),
      max_message_size: config.max_message_size(),
      idle_ping_interval: config.idle_ping_interval(),
      close_timeout: config.close_timeout(),
      pump_done: pump_done_rx,
      abort_tx: Some(abort_tx),
    };
    executor.execute(Box::pin(loop_state.run()));

    Ok(Connection {
      send_handle,
      ready_state: ready_state_rx,
      ready_state_tx,
      dispatcher,
      local_close_initiated,
      next_completion_id: Arc::new(AtomicU64::new(1)),
      copy_on_enqueue: config.copy_on_enqueue(),
      response_headers: Arc::new(response_headers),
    })
  }

  pub fn ready_state(&self) -> ReadyState {
    *self.ready_state.borrow()
  }

  /// The HTTP response headers captured during the opening handshake
  /// (spec.md §3 "received response headers"). Opaque to the core; never
  /// interpreted beyond the handful validated during the handshake itself.
  pub fn response_headers(&self) -> &[(String, String)] {
    &self.response_headers
  }

  fn require_open(&self) -> Result<(), WebSocketError> {
    if self.ready_state() != ReadyState::Open {
      return Err(WebSocketError::UsageError("connection is not open"));
    }
    Ok(())
  }

  fn next_id(&self) -> u64 {
    self.next_completion_id.fetch_add(1, Ordering::Relaxed)
  }

  /// Sends a TEXT message, copying or taking ownership of `text` per the
  /// connection's `copy-on-enqueue` policy (spec.md §4.6). Returns the
  /// completion identifier delivered on [`Event::WriteComplete`].
  pub fn send_text(&self, text: impl Into<String>) -> Result<u64, WebSocketError> {
    self.require_open()?;
    let owned: String = text.into();
    let payload = if self.copy_on_enqueue { Bytes::copy_from_slice(owned.as_bytes()) } else { Bytes::from(owned.into_bytes()) };
    let id = self.next_id();
    self.send_handle.enqueue_data(SendItem { kind: SendKind::Text, payload, completion_id: Some(id) })?;
    Ok(id)
  }

  /// Sends a BINARY message. See [`Connection::send_text`] for the
  /// copy-on-enqueue behavior.
  pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<u64, WebSocketError> {
    self.require_open()?;
    let owned: Bytes = data.into();
    let payload = if self.copy_on_enqueue { Bytes::copy_from_slice(&owned) } else { owned };
    let id = self.next_id();
    self.send_handle.enqueue_data(SendItem { kind: SendKind::Binary, payload, completion_id: Some(id) })?;
    Ok(id)
  }

  /// Sends a PING. `payload` defaults to empty when `None` (spec.md §4.4
  /// note on SocketRocket's `-[SRWebSocket sendPing:]`).
  pub fn ping(&self, payload: Option<Bytes>) -> Result<(), WebSocketError> {
    self.require_open()?;
    self.send_handle.enqueue_control(SendItem {
      kind: SendKind::Ping,
      payload: payload.unwrap_or_default(),
      completion_id: None,
    })
  }

  /// User-initiated close (spec.md §4.5 "OPEN | user requests close").
  pub fn close(&self, code: CloseCode, reason: &str) -> Result<(), WebSocketError> {
    self.require_open()?;
    if self.local_close_initiated.swap(true, Ordering::SeqCst) {
      return Err(WebSocketError::UsageError("close already requested"));
    }
    let _ = self.ready_state_tx.send(ReadyState::Closing);
    self.dispatcher.dispatch(Event::Closing { code, reason: reason.to_string() });
    self.send_handle.enqueue_close(code, reason)
  }
}

async fn run_handshake<R, W>(
  read_half: &mut R,
  write_half: &mut W,
  request: &handshake::HandshakeRequest,
  key: &str,
  request_bytes: &[u8],
) -> Result<(Option<String>, Vec<(String, String)>, BytesMut), WebSocketError>
where
  R: tokio::io::AsyncRead + Unpin,
  W: tokio::io::AsyncWrite + Unpin,
{
  write_half.write_all(request_bytes).await?;
  write_half.flush().await?;

  let mut buf = BytesMut::with_capacity(1024);
  loop {
    let n = read_half.read_buf(&mut buf).await?;
    if n == 0 {
      return Err(WebSocketError::HandshakeFailed(HandshakeError::Unreachable(
        "transport closed before a response arrived".into(),
      )));
    }

    if let Some(parsed) = handshake::parse_response(&buf)? {
      let negotiated = handshake::validate_response(request, key, &parsed)?;
      let residue = buf.split_off(parsed.consumed);
      return Ok((negotiated, parsed.headers, residue));
    }
  }
}

/// What remains after the event loop decides the connection is done.
enum Terminal {
  Closed(CloseContext),
  Failed(WebSocketError),
}

/// Classifies a local error and, if it's the kind the core itself closes
/// over (as opposed to an abrupt transport failure), makes a best-effort
/// attempt to tell the peer why before tearing down (spec.md §7).
fn finalize_local_error(err: WebSocketError, send_handle: &SendHandle) -> Terminal {
  if err.is_failure() {
    return Terminal::Failed(err);
  }

  let code = err.close_code().unwrap_or(CloseCode::INTERNAL_ERROR);
  let reason = err.to_string();
  let _ = send_handle.enqueue_close(code, &reason);
  Terminal::Closed(CloseContext::new(code, reason, false))
}

enum DrainOutcome {
  Continue,
  PeerClosed(CloseContext),
}

fn parse_close_payload(payload: &Bytes) -> Result<CloseContext, WebSocketError> {
  if payload.is_empty() {
    return Ok(CloseContext::no_status(true));
  }
  if payload.len() == 1 {
    return Err(ProtocolError::InvalidCloseFrame.into());
  }

  let code = CloseCode(u16::from_be_bytes([payload[0], payload[1]]));
  let reason = std::str::from_utf8(&payload[2..]).map_err(|_| WebSocketError::InvalidUtf8)?.to_string();

  if !code.is_allowed() {
    return Err(ProtocolError::InvalidCloseCode.into());
  }

  Ok(CloseContext::new(code, reason, true))
}

fn drain_frames(
  decoder: &mut FrameDecoder,
  buf: &mut BytesMut,
  assembler: &mut MessageAssembler,
  send_handle: &SendHandle,
  dispatcher: &dyn EventDispatcher,
  local_close_initiated: &AtomicBool,
) -> Result<DrainOutcome, WebSocketError> {
  loop {
    let frame = match decoder.decode(buf)? {
      Some(frame) => frame,
      None => return Ok(DrainOutcome::Continue),
    };

    match frame.opcode {
      OpCode::Ping => {
        tracing::trace!("replying to inbound ping");
        let _ = send_handle.enqueue_control(SendItem { kind: SendKind::Pong, payload: frame.payload, completion_id: None });
      }
      OpCode::Pong => dispatcher.dispatch(Event::Pong(frame.payload)),
      OpCode::Close => {
        let ctx = parse_close_payload(&frame.payload)?;
        // If we already initiated our own close, the peer's frame is
        // their reply to ours, not a fresh close to echo. Otherwise echo
        // the received payload back verbatim (code and reason both),
        // the way the teacher's own close handling does.
        if !local_close_initiated.swap(true, Ordering::SeqCst) {
          let _ = send_handle.enqueue_control(SendItem { kind: SendKind::Close, payload: frame.payload.clone(), completion_id: None });
        }
        return Ok(DrainOutcome::PeerClosed(ctx));
      }
      OpCode::Text | OpCode::Binary | OpCode::Continuation => {
        if let Some(message) = assembler.push(frame)? {
          match message {
            Message::Text(text) => dispatcher.dispatch(Event::MessageText(text)),
            Message::Binary(data) => dispatcher.dispatch(Event::MessageBinary(data)),
          }
        }
      }
    }
  }
}

struct ReadLoop<T> {
  read_half: tokio::io::ReadHalf<T>,
  buf: BytesMut,
  send_handle: SendHandle,
  dispatcher: Arc<dyn EventDispatcher>,
  ready_state_tx: Arc<watch::Sender<ReadyState>>,
  local_close_initiated: Arc<AtomicBool>,
  max_message_size: usize,
  idle_ping_interval: Option<Duration>,
  close_timeout: Duration,
  pump_done: oneshot::Receiver<Result<(), WebSocketError>>,
  abort_tx: Option<oneshot::Sender<()>>,
}

impl<T> ReadLoop<T>
where
  T: Transport,
{
  async fn run(mut self) {
    let mut decoder = FrameDecoder::new(self.max_message_size);
    let mut assembler = MessageAssembler::new(self.max_message_size);
    let mut pump_finished = false;
    let mut peer_close_ctx: Option<CloseContext> = None;
    let mut ping_timer = self.idle_ping_interval.map(tokio::time::interval);

    // Watches for CLOSING so a user-initiated `close()` (which can land at
    // any time, from any thread) arms the close timer too, not just a
    // peer-initiated close observed inline below.
    let mut ready_rx = self.ready_state_tx.subscribe();
    let mut close_deadline = if *ready_rx.borrow() == ReadyState::Closing {
      Some(tokio::time::Instant::now() + self.close_timeout)
    } else {
      None
    };

    let terminal = loop {
      if peer_close_ctx.is_some() && pump_finished {
        break Terminal::Closed(peer_close_ctx.take().unwrap());
      }

      tokio::select! {
        biased;

        result = &mut self.pump_done, if !pump_finished => {
          pump_finished = true;
          if let Ok(Err(err)) = result {
            break finalize_local_error(err, &self.send_handle);
          }
          continue;
        }

        changed = ready_rx.changed(), if close_deadline.is_none() => {
          if changed.is_ok() && *ready_rx.borrow() == ReadyState::Closing {
            close_deadline = Some(tokio::time::Instant::now() + self.close_timeout);
          }
          continue;
        }

        _ = deadline(close_deadline) => {
          break Terminal::Closed(CloseContext::new(CloseCode::ABNORMAL, WebSocketError::CloseTimeout.to_string(), false));
        }

        _ = tick(&mut ping_timer) => {
          let _ = self.send_handle.enqueue_control(SendItem { kind: SendKind::Ping, payload: Bytes::new(), completion_id: None });
          continue;
        }

        read_result = self.read_half.read_buf(&mut self.buf) => {
          match read_result {
            Err(err) => break Terminal::Failed(err.into()),
            Ok(0) => break Terminal::Closed(peer_close_ctx.take().unwrap_or_else(CloseContext::abnormal)),
            Ok(_) => {
              match drain_frames(&mut decoder, &mut self.buf, &mut assembler, &self.send_handle, self.dispatcher.as_ref(), &self.local_close_initiated) {
                Ok(DrainOutcome::Continue) => continue,
                Ok(DrainOutcome::PeerClosed(ctx)) => {
                  if *self.ready_state_tx.borrow() == ReadyState::Open {
                    let _ = self.ready_state_tx.send(ReadyState::Closing);
                    self.dispatcher.dispatch(Event::Closing { code: ctx.code, reason: ctx.reason.clone() });
                  }
                  peer_close_ctx = Some(ctx);
                  continue;
                }
                Err(err) => break finalize_local_error(err, &self.send_handle),
              }
            }
          }
        }
      }
    };

    let _ = self.ready_state_tx.send(ReadyState::Closed);
    // Release the transport's write half now, not whenever the pump
    // happens to notice the queue is empty: if it's stalled mid-write on
    // a backpressured transport this races it out from under the task.
    if let Some(abort_tx) = self.abort_tx.take() {
      let _ = abort_tx.send(());
    }
    match terminal {
      Terminal::Closed(ctx) => {
        tracing::debug!(code = ctx.code.0, clean = ctx.clean, "connection closed");
        self.dispatcher.dispatch(Event::Closed(ctx));
      }
      Terminal::Failed(err) => {
        tracing::warn!(error = %err, "connection failed");
        self.dispatcher.dispatch(Event::Failed(err));
      }
    }
  }
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
  match timer {
    Some(timer) => {
      timer.tick().await;
    }
    None => std::future::pending().await,
  }
}

/// Resolves at `instant` once armed, and never otherwise. Used to bound how
/// long a CLOSING connection waits for the peer's half of the close
/// handshake (spec.md §5 "close timeout").
async fn deadline(instant: Option<tokio::time::Instant>) {
  match instant {
    Some(instant) => tokio::time::sleep_until(instant).await,
    None => std::future::pending().await,
  }
}
