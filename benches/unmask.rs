//! Throughput of the masking XOR, run directly (no test harness) the way
//! the teacher's own `unmask` bench does.

use std::time::Instant;

use wsclient_core::frame::Frame;

const SIZES: &[usize] = &[64, 4096, 65536, 1 << 20];

fn main() {
  for &size in SIZES {
    let payload = vec![0x42u8; size];
    let frame = Frame::binary(payload.into());

    let iterations = if size < 1 << 16 { 20_000 } else { 200 };
    let started = Instant::now();
    for _ in 0..iterations {
      let encoded = wsclient_core::frame::encode_masked(&frame);
      std::hint::black_box(&encoded);
    }
    let elapsed = started.elapsed();

    let bytes = (size as u128) * (iterations as u128);
    let nanos = elapsed.as_nanos().max(1);
    let gb_per_sec = (bytes as f64) / (nanos as f64);
    println!("{size:>8} bytes x {iterations:>6}: {elapsed:?} ({gb_per_sec:.3} GB/s)");
  }
}
