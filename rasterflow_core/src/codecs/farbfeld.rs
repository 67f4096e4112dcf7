//! farbfeld: 8-byte magic, big-endian u32 dimensions, RGBA with 16-bit
//! big-endian channels. 8-bit content maps through `v * 257` so it survives
//! a decode/encode cycle bit-exactly.

use crate::errors::{ErrorKind, Result};
use crate::flow::definitions::{Bitmap, FrameInfo};
use crate::io::IoProxy;
use crate::{here, nerror};
use rasterflow_types::PixelFormat;

const MAGIC: &[u8; 8] = b"farbfeld";
const HEADER_LENGTH: usize = 16;

fn parse_dimensions(bytes: &[u8]) -> Result<(i32, i32)> {
    if bytes.len() < HEADER_LENGTH || &bytes[0..8] != MAGIC {
        return Err(nerror!(ErrorKind::IoError, "Not a farbfeld stream"));
    }
    let w = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let h = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    if w == 0 || h == 0 || w > i32::MAX as u32 || h > i32::MAX as u32 {
        return Err(nerror!(
            ErrorKind::IoError,
            "Invalid farbfeld dimensions {}x{}",
            w,
            h
        ));
    }
    Ok((w as i32, h as i32))
}

fn read_all(io: &mut IoProxy) -> Result<Vec<u8>> {
    io.seek(0).map_err(|e| e.at(here!()))?;
    let mut bytes = Vec::new();
    io.read_to_end(&mut bytes).map_err(|e| e.at(here!()))?;
    Ok(bytes)
}

pub fn read_frame_info(io: &mut IoProxy) -> Result<FrameInfo> {
    let bytes = read_all(io).map_err(|e| e.at(here!()))?;
    let (w, h) = parse_dimensions(&bytes).map_err(|e| e.at(here!()))?;
    Ok(FrameInfo {
        w,
        h,
        fmt: PixelFormat::Rgba32,
    })
}

pub fn read_frame(io: &mut IoProxy) -> Result<Bitmap> {
    let bytes = read_all(io).map_err(|e| e.at(here!()))?;
    let (w, h) = parse_dimensions(&bytes).map_err(|e| e.at(here!()))?;
    let mut frame = Bitmap::new(w, h).map_err(|e| e.at(here!()))?;
    let expected = w as u64 * h as u64 * 8;
    let payload = &bytes[HEADER_LENGTH..];
    if (payload.len() as u64) < expected {
        return Err(nerror!(
            ErrorKind::IoError,
            "Truncated farbfeld payload: wanted {} bytes, got {}",
            expected,
            payload.len()
        ));
    }
    for (wide, rgba) in payload
        .chunks_exact(8)
        .zip(frame.pixels_mut().chunks_exact_mut(4))
    {
        for channel in 0..4 {
            let v = u16::from_be_bytes([wide[channel * 2], wide[channel * 2 + 1]]);
            rgba[channel] = (v / 257) as u8;
        }
    }
    Ok(frame)
}

pub fn write_frame(io: &mut IoProxy, frame: &Bitmap) -> Result<()> {
    let mut out = Vec::with_capacity(HEADER_LENGTH + frame.pixels().len() * 2);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(frame.w() as u32).to_be_bytes());
    out.extend_from_slice(&(frame.h() as u32).to_be_bytes());
    for &v in frame.pixels() {
        out.extend_from_slice(&(u16::from(v) * 257).to_be_bytes());
    }
    io.write_all(&out).map_err(|e| e.at(here!()))
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn tiny_farbfeld() -> Vec<u8> {
        // 2x1: opaque red, half-transparent gray
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        for rgba in [[255u8, 0, 0, 255], [128, 128, 128, 127]] {
            for v in rgba {
                bytes.extend_from_slice(&(u16::from(v) * 257).to_be_bytes());
            }
        }
        bytes
    }

    #[test]
    fn header_parses() {
        let info = read_frame_info(&mut IoProxy::from_vec(tiny_farbfeld())).expect("info");
        assert_eq!((info.w, info.h), (2, 1));
        assert_eq!(info.fmt, PixelFormat::Rgba32);
    }

    #[test]
    fn sixteen_bit_channels_round_trip_eight_bit_values() {
        let frame = read_frame(&mut IoProxy::from_vec(tiny_farbfeld())).expect("frame");
        assert_eq!(frame.get(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.get(1, 0), [128, 128, 128, 127]);

        let mut sink = IoProxy::output_buffer();
        write_frame(&mut sink, &frame).expect("write");
        let bytes = sink.get_output_buffer().expect("buffer").to_vec();
        let back = read_frame(&mut IoProxy::from_vec(bytes)).expect("reread");
        assert_eq!(back, frame);
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut bytes = tiny_farbfeld();
        bytes.truncate(bytes.len() - 4);
        let e = read_frame(&mut IoProxy::from_vec(bytes)).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::IoError);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        let e = read_frame_info(&mut IoProxy::from_vec(bytes)).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::IoError);
    }
}
