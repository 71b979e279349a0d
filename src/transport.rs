//! The byte-stream seam and its security policy (spec.md §1, §6).
//!
//! The core never dials a socket or touches TLS itself — it consumes
//! whatever the host hands it as a `Transport`, the same way the teacher's
//! `WebSocket<S>` is generic over `S: AsyncRead + AsyncWrite`. Certificate
//! handling, SNI, proxying, and redirects all live on the host side of
//! this seam.

use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream the core can read the server's bytes from and
/// write its own frames to. Blanket-implemented for anything that already
/// satisfies the bounds, so `tokio::net::TcpStream`, a `tokio_rustls`
/// wrapper, or an in-memory `tokio::io::DuplexStream` all qualify without
/// extra glue.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Per-connection TLS posture (spec.md §6 "Options"), mirroring
/// `SRWebSocket`'s `allowInsecureConnections` flag and pinned-certificate
/// category property — the decision of *whether* a transport was built
/// under a relaxed policy is the host's; this struct only records that
/// decision so it can be surfaced in logs and `CloseContext`s.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
  /// Accept a transport whose certificate chain the host could not (or
  /// chose not to) validate, e.g. for local development against a
  /// self-signed endpoint.
  pub allow_insecure: bool,
  /// DER-encoded certificates the host is willing to accept even if they
  /// don't chain to a trusted root.
  pub pinned_certificates: Vec<Vec<u8>>,
}

impl SecurityPolicy {
  pub fn strict() -> Self {
    Self::default()
  }

  pub fn allow_insecure() -> Self {
    Self { allow_insecure: true, pinned_certificates: Vec::new() }
  }

  pub fn with_pinned_certificates(certificates: Vec<Vec<u8>>) -> Self {
    Self { allow_insecure: false, pinned_certificates: certificates }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use assert2::check;

  #[test]
  fn strict_policy_pins_nothing() {
    let policy = SecurityPolicy::strict();
    check!(!policy.allow_insecure);
    check!(policy.pinned_certificates.is_empty());
  }

  #[test]
  fn pinned_certificates_are_kept_verbatim() {
    let policy = SecurityPolicy::with_pinned_certificates(vec![vec![1, 2, 3]]);
    check!(!policy.allow_insecure);
    check!(policy.pinned_certificates.len() == 1);
  }

  #[tokio::test]
  async fn duplex_stream_satisfies_transport() {
    fn assert_transport<T: Transport>() {}
    assert_transport::<tokio::io::DuplexStream>();
  }
}
