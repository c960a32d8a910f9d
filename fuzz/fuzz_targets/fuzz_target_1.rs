#![no_main]

use libfuzzer_sys::fuzz_target;
use websockify::frame;

// frame::decode is a pure function of bytes (no I/O), so it can be fuzzed
// directly without a runtime or socket pair.
fuzz_target!(|data: &[u8]| {
    let _ = frame::decode(data, 64 << 20);
});
