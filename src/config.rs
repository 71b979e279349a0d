//! Per-connection configuration (spec.md §6 "Options").
//!
//! A single builder collapses several of the teacher's scattered
//! `set_auto_close`/`set_auto_pong`/`set_writev`/`set_max_message_size`
//! setters: this crate is client-only, so "auto-pong", "auto-apply-mask",
//! and "reject unmasked frames" aren't options here — they're just what a
//! client does, per spec.md §4.4. What's left, matching
//! `SRWebSocket`'s connect-time configuration surface, is recorded below.

use std::time::Duration;

use crate::transport::SecurityPolicy;

const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection-wide tuning knobs, set once at construction and immutable
/// for the connection's lifetime (spec.md §3 "set once").
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
  pub(crate) host: String,
  pub(crate) path_and_query: String,
  pub(crate) origin: String,
  pub(crate) subprotocols: Vec<String>,
  pub(crate) cookie_header: Option<String>,
  pub(crate) extra_headers: Vec<(String, String)>,
  pub(crate) security: SecurityPolicy,
  pub(crate) copy_on_enqueue: bool,
  pub(crate) max_message_size: usize,
  pub(crate) handshake_timeout: Duration,
  pub(crate) close_timeout: Duration,
  pub(crate) idle_ping_interval: Option<Duration>,
}

impl ConnectionConfig {
  pub fn new(host: impl Into<String>, path_and_query: impl Into<String>, origin: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      path_and_query: path_and_query.into(),
      origin: origin.into(),
      subprotocols: Vec::new(),
      cookie_header: None,
      extra_headers: Vec::new(),
      security: SecurityPolicy::strict(),
      copy_on_enqueue: true,
      max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
      handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
      close_timeout: DEFAULT_CLOSE_TIMEOUT,
      idle_ping_interval: None,
    }
  }

  pub fn set_subprotocols(&mut self, subprotocols: Vec<String>) -> &mut Self {
    self.subprotocols = subprotocols;
    self
  }

  pub fn set_cookie_header(&mut self, cookie_header: impl Into<String>) -> &mut Self {
    self.cookie_header = Some(cookie_header.into());
    self
  }

  pub fn set_extra_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.extra_headers.push((name.into(), value.into()));
    self
  }

  pub fn set_security_policy(&mut self, security: SecurityPolicy) -> &mut Self {
    self.security = security;
    self
  }

  /// Controls whether `send_binary`/`send_text` copy the caller's buffer
  /// before enqueuing it (`true`, the safe default matching `SRWebSocket`'s
  /// `sendDataSafely`) or take ownership of an already-owned buffer
  /// without copying (`false`). This only changes which `Connection::send_*`
  /// method a caller should reach for — see spec.md §6 "copy-on-enqueue".
  pub fn set_copy_on_enqueue(&mut self, copy_on_enqueue: bool) -> &mut Self {
    self.copy_on_enqueue = copy_on_enqueue;
    self
  }

  pub fn set_max_message_size(&mut self, max_message_size: usize) -> &mut Self {
    self.max_message_size = max_message_size;
    self
  }

  pub fn set_handshake_timeout(&mut self, timeout: Duration) -> &mut Self {
    self.handshake_timeout = timeout;
    self
  }

  pub fn set_close_timeout(&mut self, timeout: Duration) -> &mut Self {
    self.close_timeout = timeout;
    self
  }

  pub fn set_idle_ping_interval(&mut self, interval: Duration) -> &mut Self {
    self.idle_ping_interval = Some(interval);
    self
  }

  pub fn copy_on_enqueue(&self) -> bool {
    self.copy_on_enqueue
  }

  pub fn max_message_size(&self) -> usize {
    self.max_message_size
  }

  pub fn handshake_timeout(&self) -> Duration {
    self.handshake_timeout
  }

  pub fn close_timeout(&self) -> Duration {
    self.close_timeout
  }

  pub fn idle_ping_interval(&self) -> Option<Duration> {
    self.idle_ping_interval
  }

  pub fn security_policy(&self) -> &SecurityPolicy {
    &self.security
  }

  pub(crate) fn to_handshake_request(&self) -> crate::handshake::HandshakeRequest {
    crate::handshake::HandshakeRequest {
      host: self.host.clone(),
      path_and_query: self.path_and_query.clone(),
      origin: self.origin.clone(),
      subprotocols: self.subprotocols.clone(),
      cookie_header: self.cookie_header.clone(),
      extra_headers: self.extra_headers.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use assert2::check;

  #[test]
  fn defaults_match_spec() {
    let config = ConnectionConfig::new("example.com", "/chat", "https://example.com");
    check!(config.copy_on_enqueue());
    check!(config.max_message_size() == 16 * 1024 * 1024);
    check!(config.handshake_timeout() == Duration::from_secs(30));
    check!(config.close_timeout() == Duration::from_secs(60));
    check!(config.idle_ping_interval().is_none());
  }

  #[test]
  fn builder_methods_chain() {
    let mut config = ConnectionConfig::new("example.com", "/chat", "https://example.com");
    config
      .set_subprotocols(vec!["chat".into()])
      .set_copy_on_enqueue(false)
      .set_max_message_size(1024)
      .set_idle_ping_interval(Duration::from_secs(15));

    check!(config.subprotocols == vec!["chat".to_string()]);
    check!(!config.copy_on_enqueue());
    check!(config.max_message_size() == 1024);
    check!(config.idle_ping_interval() == Some(Duration::from_secs(15)));
  }

  #[test]
  fn derives_a_handshake_request() {
    let mut config = ConnectionConfig::new("example.com", "/chat", "https://example.com");
    config.set_cookie_header("session=abc");
    let request = config.to_handshake_request();
    check!(request.host == "example.com");
    check!(request.cookie_header.as_deref() == Some("session=abc"));
  }
}
