#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use treecast::wire::decode_frame;

fuzz_target!(|data: &[u8]| {
    let _ = decode_frame(Bytes::copy_from_slice(data));
});
