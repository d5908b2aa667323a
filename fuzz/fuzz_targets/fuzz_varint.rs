//! Fuzz testing for the VarInt reader.
//!
//! Every successful read stays inside the input, agrees with `peek` and
//! `length`, and re-encodes to exactly the bytes it consumed.

#![no_main]

use libfuzzer_sys::fuzz_target;

use proxywire::encoding::varint;

fuzz_target!(|data: &[u8]| {
    let Ok((value, len)) = varint::read(data, 0) else {
        assert!(varint::peek(data, 0).is_err());
        return;
    };

    assert!(len <= data.len());
    assert_eq!(varint::peek(data, 0).ok(), Some(value));
    assert_eq!(varint::length(data, 0).ok(), Some(len));

    let mut out = Vec::new();
    varint::write(&mut out, value);
    assert_eq!(&out[..], &data[..len]);
});
