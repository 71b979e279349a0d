//! Client-side HTTP/1.1 upgrade handshake (spec.md §4.1).
//!
//! URL parsing, cookie jars, and proxy discovery are explicitly out of
//! scope (spec.md §1): callers hand this module a [`HandshakeRequest`]
//! descriptor that already has the host, path, and any cookie/header
//! material resolved.

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_RESPONSE_HEADERS: usize = 64;

/// Everything the handshake needs that isn't already resolved by an
/// external collaborator (spec.md §1).
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
  /// `Host` header value, e.g. `"example.com"` or `"example.com:8443"`.
  pub host: String,
  /// Request target, e.g. `"/chat?id=1"`.
  pub path_and_query: String,
  /// `Origin` header value, e.g. `"https://example.com"`.
  pub origin: String,
  /// Offered subprotocols, in order (spec.md §3 "non-empty strings, set
  /// once").
  pub subprotocols: Vec<String>,
  /// Pre-serialized `Cookie` header value, if any.
  pub cookie_header: Option<String>,
  /// Additional user-supplied headers that don't collide with the
  /// mandatory ones (spec.md §4.1).
  pub extra_headers: Vec<(String, String)>,
}

/// A composed request ready to write to the transport, plus the key it
/// was built with (needed later to validate `Sec-WebSocket-Accept`).
pub struct PreparedRequest {
  pub bytes: Vec<u8>,
  pub key: String,
}

/// Generates a fresh `Sec-WebSocket-Key`: base64 of 16 random bytes
/// (spec.md §4.1), mirroring the teacher's own `handshake::generate_key`.
pub fn generate_key() -> String {
  let raw: [u8; 16] = rand::random();
  base64::engine::general_purpose::STANDARD.encode(raw)
}

fn accept_key(client_key: &str) -> String {
  let mut hasher = Sha1::new();
  hasher.update(client_key.as_bytes());
  hasher.update(GUID.as_bytes());
  base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

const MANDATORY_HEADERS: &[&str] = &[
  "host",
  "upgrade",
  "connection",
  "sec-websocket-version",
  "sec-websocket-key",
  "origin",
  "sec-websocket-protocol",
  "cookie",
];

/// Composes the GET request described in spec.md §4.1.
pub fn build_request(desc: &HandshakeRequest) -> PreparedRequest {
  use std::fmt::Write as _;

  let key = generate_key();
  let mut req = String::with_capacity(256);

  let _ = write!(req, "GET {} HTTP/1.1\r\n", desc.path_and_query);
  let _ = write!(req, "Host: {}\r\n", desc.host);
  let _ = write!(req, "Upgrade: websocket\r\n");
  let _ = write!(req, "Connection: Upgrade\r\n");
  let _ = write!(req, "Sec-WebSocket-Version: 13\r\n");
  let _ = write!(req, "Sec-WebSocket-Key: {key}\r\n");
  let _ = write!(req, "Origin: {}\r\n", desc.origin);

  if !desc.subprotocols.is_empty() {
    let _ = write!(req, "Sec-WebSocket-Protocol: {}\r\n", desc.subprotocols.join(", "));
  }

  if let Some(cookie) = &desc.cookie_header {
    let _ = write!(req, "Cookie: {cookie}\r\n");
  }

  for (name, value) in &desc.extra_headers {
    if MANDATORY_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
      // Mandatory headers always win; spec.md §4.1 only asks for
      // user-supplied headers that don't collide.
      continue;
    }
    let _ = write!(req, "{name}: {value}\r\n");
  }

  req.push_str("\r\n");
  PreparedRequest { bytes: req.into_bytes(), key }
}

/// A parsed, not-yet-validated HTTP response.
pub struct ParsedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  /// Byte offset of the first byte after the header block; any remainder
  /// of `buf` is the start of the WebSocket byte stream.
  pub consumed: usize,
}

/// Attempts to parse one HTTP response from the front of `buf`. Returns
/// `Ok(None)` if the header block isn't complete yet.
pub fn parse_response(buf: &[u8]) -> Result<Option<ParsedResponse>, HandshakeError> {
  let mut header_storage = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
  let mut response = httparse::Response::new(&mut header_storage);

  match response
    .parse(buf)
    .map_err(|e| HandshakeError::MalformedResponse(e.to_string()))?
  {
    httparse::Status::Partial => Ok(None),
    httparse::Status::Complete(consumed) => {
      let status = response.code.ok_or_else(|| HandshakeError::MalformedResponse("no status code".into()))?;
      let headers = response
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
      Ok(Some(ParsedResponse { status, headers, consumed }))
    }
  }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
  headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

/// Validates a parsed response against spec.md §4.1's rules. Returns the
/// negotiated subprotocol, if any.
pub fn validate_response(
  desc: &HandshakeRequest,
  key: &str,
  response: &ParsedResponse,
) -> Result<Option<String>, HandshakeError> {
  if response.status != 101 {
    return Err(HandshakeError::UnexpectedStatus { status: response.status, headers: response.headers.clone() });
  }

  let upgrade = find_header(&response.headers, "Upgrade").ok_or(HandshakeError::BadUpgradeHeader)?;
  if !upgrade.eq_ignore_ascii_case("websocket") {
    return Err(HandshakeError::BadUpgradeHeader);
  }

  let connection = find_header(&response.headers, "Connection").ok_or(HandshakeError::BadConnectionHeader)?;
  if !connection.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade")) {
    return Err(HandshakeError::BadConnectionHeader);
  }

  let accept = find_header(&response.headers, "Sec-WebSocket-Accept").ok_or(HandshakeError::AcceptKeyMismatch)?;
  if accept != accept_key(key) {
    return Err(HandshakeError::AcceptKeyMismatch);
  }

  match find_header(&response.headers, "Sec-WebSocket-Protocol") {
    None => Ok(None),
    Some(negotiated) => {
      if desc.subprotocols.iter().any(|offered| offered == negotiated) {
        Ok(Some(negotiated.to_string()))
      } else {
        Err(HandshakeError::UnofferedSubprotocol)
      }
    }
  }
}
