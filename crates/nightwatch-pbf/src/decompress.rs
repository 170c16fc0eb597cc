//! Blob payload decompression.
//!
//! The decoders only need "inflate these bytes into this buffer and tell me how
//! many were written". [`Decompressor`] is that seam; [`ZlibDecompressor`] is the
//! implementation for `zlib_data` blobs, the only compressed encoding OSM writers
//! emit in practice.

use flate2::{Decompress, FlushDecompress, Status};
use nightwatch_core::Error;

/// Inflate `compressed` into `out`, returning the number of bytes written.
///
/// A stream longer than `out` fails with `SizeMismatch` carrying its full
/// length; corrupt input fails with `Decompression`.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, compressed: &[u8], out: &mut [u8]) -> nightwatch_core::Result<usize>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibDecompressor;

impl Decompressor for ZlibDecompressor {
    fn decompress(&self, compressed: &[u8], out: &mut [u8]) -> nightwatch_core::Result<usize> {
        let mut inflater = Decompress::new(true);
        let status = inflate(&mut inflater, compressed, out)?;

        let written = inflater.total_out() as usize;
        match status {
            Status::StreamEnd => Ok(written),
            _ if written == out.len() => {
                // Output is full; drain the rest only to learn the real length
                let mut scratch = [0u8; 8 * 1024];
                loop {
                    let consumed = inflater.total_in() as usize;
                    let before = inflater.total_out();
                    let status = inflate(&mut inflater, &compressed[consumed..], &mut scratch)?;
                    if status == Status::StreamEnd {
                        break;
                    }
                    if inflater.total_out() == before && inflater.total_in() as usize == consumed {
                        return Err(Error::Decompression("stream truncated".to_string()));
                    }
                }
                let actual = inflater.total_out() as usize;
                if actual == written {
                    Ok(written)
                } else {
                    Err(Error::SizeMismatch {
                        declared: out.len(),
                        actual,
                    })
                }
            }
            _ => Err(Error::Decompression("stream truncated".to_string())),
        }
    }
}

fn inflate(inflater: &mut Decompress, input: &[u8], out: &mut [u8]) -> nightwatch_core::Result<Status> {
    inflater
        .decompress(input, out, FlushDecompress::Finish)
        .map_err(|e| Error::Decompression(e.to_string()))
}
