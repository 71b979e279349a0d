//! Close status codes (RFC 6455 §7.4).

/// A WebSocket close status code.
///
/// Codes 0-999 are unused, 1000-2999 are defined by the protocol or
/// reserved for its use, 3000-3999 are reserved for libraries/frameworks,
/// and 4000-4999 are available for private use between applications that
/// agree on them in advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
  pub const NORMAL: CloseCode = CloseCode(1000);
  pub const GOING_AWAY: CloseCode = CloseCode(1001);
  pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
  pub const UNSUPPORTED: CloseCode = CloseCode(1003);
  // 1004 reserved.
  pub const NO_STATUS_RECEIVED: CloseCode = CloseCode(1005);
  pub const ABNORMAL: CloseCode = CloseCode(1006);
  pub const INVALID_PAYLOAD: CloseCode = CloseCode(1007);
  pub const POLICY_VIOLATION: CloseCode = CloseCode(1008);
  pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);
  pub const EXTENSION_REQUIRED: CloseCode = CloseCode(1010);
  pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);

  /// Whether this code is legal to appear on the wire in a CLOSE frame
  /// payload, per spec.md §4.4.
  ///
  /// 1005 and 1006 are reserved for local use only (never sent on the
  /// wire); 1004 and the 1012-2999 range outside 1007-1011 are reserved
  /// for future protocol revisions.
  pub fn is_allowed(&self) -> bool {
    matches!(
      self.0,
      1000..=1003 | 1007..=1011 | 3000..=4999
    )
  }

  /// True for 1005/1006, the two codes the core synthesizes locally but
  /// never emits on the wire (spec.md §6).
  pub fn is_reserved_local(&self) -> bool {
    matches!(self.0, 1005 | 1006)
  }
}

impl From<u16> for CloseCode {
  fn from(code: u16) -> Self {
    CloseCode(code)
  }
}

impl From<CloseCode> for u16 {
  fn from(code: CloseCode) -> Self {
    code.0
  }
}

impl std::fmt::Display for CloseCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// The outcome of a completed close handshake, delivered on the `closed`
/// event (spec.md §3 "Close context", §6).
#[derive(Debug, Clone)]
pub struct CloseContext {
  pub code: CloseCode,
  pub reason: String,
  /// `true` only when both sides exchanged CLOSE frames before the
  /// transport closed.
  pub clean: bool,
}

impl CloseContext {
  pub fn new(code: CloseCode, reason: impl Into<String>, clean: bool) -> Self {
    Self { code, reason: reason.into(), clean }
  }

  /// The "no status received" case (spec.md §9 Open Question): the peer's
  /// CLOSE frame carried no payload.
  pub fn no_status(clean: bool) -> Self {
    Self::new(CloseCode::NO_STATUS_RECEIVED, "", clean)
  }

  /// The transport vanished without any close handshake at all.
  pub fn abnormal() -> Self {
    Self::new(CloseCode::ABNORMAL, "", false)
  }
}
