//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes must never panic the header parser or the length checks.
//! Invalid input returns an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vestibule_proto::Frame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        // Anything that decodes must encode back to the same bytes it came from.
        let encoded = frame.to_vec().expect("decoded frame re-encodes");
        assert_eq!(&encoded[..], &data[..encoded.len()]);
    }
});
