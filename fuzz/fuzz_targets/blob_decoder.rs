#![no_main]

use libfuzzer_sys::fuzz_target;
use nightwatch_pbf::{BlobDecoder, BlobHeader, BufferPool};

fuzz_target!(|data: &[u8]| {
    // A hostile raw_size must be bounded before anything is allocated
    let _ = BlobHeader::parse(data);

    let decoder = BlobDecoder::zlib(BufferPool::new(2));
    if let Ok(blob) = decoder.decode(data) {
        let _ = nightwatch_pbf::sniff_first_element(blob.payload());
    }
});
