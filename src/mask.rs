//! Masking/unmasking of frame payloads (RFC 6455 §5.3).
//!
//! Every outbound client frame MUST be masked with a fresh, unpredictable
//! 32-bit key (spec.md §4.2). Inbound frames from a (conforming) server are
//! never masked; `unmask` exists so the core can defensively reject a
//! masked inbound frame and so tests can build fixtures either way.

/// XORs `data` in place with `mask`, repeating the 4-byte key as needed.
///
/// Processes a `u32`-sized word at a time the way the teacher's own
/// `unmask` does, falling back to a byte loop for the head/tail that don't
/// line up on a 4-byte boundary.
pub fn unmask(data: &mut [u8], mask: [u8; 4]) {
  let mask_u32 = u32::from_ne_bytes(mask);
  let (prefix, words, suffix) = unsafe { data.align_to_mut::<u32>() };

  apply_mask_bytes(prefix, mask);
  let word_mask = mask_u32.rotate_left(8 * (prefix.len() as u32 % 4));
  for word in words.iter_mut() {
    *word ^= word_mask;
  }

  // Every full word consumed is a whole multiple of the 4-byte mask
  // period, so the phase at the start of `suffix` is the same as at the
  // start of `words`.
  apply_mask_bytes(suffix, word_mask.to_ne_bytes());
}

fn apply_mask_bytes(data: &mut [u8], mask: [u8; 4]) {
  for (byte, &key) in data.iter_mut().zip(mask.iter().cycle()) {
    *byte ^= key;
  }
}

/// Generates a fresh, non-deterministic 32-bit masking key.
///
/// spec.md §4.2 requires this be unpredictable to an observer; `rand`'s
/// thread-local generator (the teacher's existing dependency) satisfies
/// the "at least non-deterministic" bound.
pub fn generate_mask_key() -> [u8; 4] {
  rand::random()
}

#[cfg(test)]
mod tests {
  use super::*;
  use assert2::check;

  #[test]
  fn roundtrip() {
    let key = [0x12, 0x34, 0x56, 0x78];
    let original = b"the quick brown fox jumps over the lazy dog".to_vec();
    let mut data = original.clone();
    unmask(&mut data, key);
    check!(data != original);
    unmask(&mut data, key);
    check!(data == original);
  }

  #[test]
  fn empty_payload() {
    let mut data: Vec<u8> = vec![];
    unmask(&mut data, [1, 2, 3, 4]);
    check!(data.is_empty());
  }

  #[test]
  fn odd_length_payload() {
    let key = [0xaa, 0xbb, 0xcc, 0xdd];
    for len in 0..32 {
      let original: Vec<u8> = (0..len as u8).collect();
      let mut data = original.clone();
      unmask(&mut data, key);
      // Reference implementation: a plain byte-at-a-time XOR cycle.
      let mut expected = original.clone();
      for (i, b) in expected.iter_mut().enumerate() {
        *b ^= key[i % 4];
      }
      check!(data == expected);
    }
  }

  #[test]
  fn generated_keys_are_not_all_zero_across_a_sample() {
    let all_zero = (0..64).all(|_| generate_mask_key() == [0, 0, 0, 0]);
    check!(!all_zero);
  }
}
