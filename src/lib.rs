//! A protocol engine for a client-side RFC 6455 WebSocket implementation.
//!
//! This crate owns the wire: the HTTP/1.1 upgrade handshake, frame
//! encoding/decoding, masking, message reassembly, and the connection
//! state machine. It does not own a socket, a TLS stack, or a run loop —
//! callers hand it any [`transport::Transport`] (a `tokio::net::TcpStream`
//! wrapped in TLS, an in-memory `tokio::io::DuplexStream` for tests,
//! anything `AsyncRead + AsyncWrite`) and an [`executor::Executor`] to
//! drive background tasks on.
//!
//! ```ignore
//! use std::sync::Arc;
//! use wsclient_core::{config::ConnectionConfig, connection::Connection, executor::{EventSink, TokioExecutor}};
//!
//! struct Logger;
//! impl EventSink for Logger {
//!     fn on_message_text(&self, text: &str) {
//!         println!("got: {text}");
//!     }
//! }
//!
//! # async fn run(transport: impl wsclient_core::transport::Transport) -> Result<(), wsclient_core::error::WebSocketError> {
//! let config = ConnectionConfig::new("example.com", "/chat", "https://example.com");
//! let connection = Connection::connect(transport, config, Arc::new(Logger), TokioExecutor).await?;
//! connection.send_text("hello")?;
//! # Ok(())
//! # }
//! ```
//!
//! Feature `simd` swaps the UTF-8 validator's single-frame fast path to
//! `simdutf8` instead of `std::str::from_utf8`.

pub mod assembler;
pub mod close;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod frame;
pub mod handshake;
mod mask;
pub mod queue;
pub mod transport;
mod utf8;

pub use close::{CloseCode, CloseContext};
pub use config::ConnectionConfig;
pub use connection::{Connection, ReadyState};
pub use error::{HandshakeError, ProtocolError, WebSocketError};
pub use executor::{Event, EventDispatcher, EventSink, Executor, TokioExecutor};
pub use frame::{Frame, OpCode};
pub use transport::{SecurityPolicy, Transport};
