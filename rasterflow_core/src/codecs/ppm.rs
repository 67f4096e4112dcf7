//! Binary PPM (P6): ASCII header with `#` comments, maxval up to 255, then
//! raw RGB24 rows. Decoding fills alpha with 255; encoding drops alpha.

use crate::errors::{ErrorKind, Result};
use crate::flow::definitions::{Bitmap, FrameInfo};
use crate::io::IoProxy;
use crate::{here, nerror};
use rasterflow_types::PixelFormat;

struct Header {
    w: i32,
    h: i32,
    /// Offset of the first payload byte.
    data_start: usize,
}

struct HeaderCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn skip_separators(&mut self) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'#' {
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_int(&mut self) -> Result<i64> {
        self.skip_separators();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(nerror!(
                ErrorKind::IoError,
                "Malformed PPM header: expected an integer at byte {}",
                start
            ));
        }
        let mut value: i64 = 0;
        for &digit in &self.bytes[start..self.pos] {
            value = value * 10 + i64::from(digit - b'0');
            if value > i64::from(i32::MAX) {
                return Err(nerror!(
                    ErrorKind::IoError,
                    "Malformed PPM header: integer at byte {} is out of range",
                    start
                ));
            }
        }
        Ok(value)
    }
}

fn parse_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < 2 || &bytes[0..2] != b"P6" {
        return Err(nerror!(ErrorKind::IoError, "Not a binary PPM (P6) stream"));
    }
    let mut cursor = HeaderCursor { bytes, pos: 2 };
    let w = cursor.next_int().map_err(|e| e.at(here!()))?;
    let h = cursor.next_int().map_err(|e| e.at(here!()))?;
    let maxval = cursor.next_int().map_err(|e| e.at(here!()))?;
    if maxval > 255 {
        return Err(nerror!(
            ErrorKind::NotImplemented,
            "PPM maxval {} is not supported (only maxval <= 255)",
            maxval
        ));
    }
    if maxval < 1 {
        return Err(nerror!(ErrorKind::IoError, "Malformed PPM header: maxval {}", maxval));
    }
    // Exactly one whitespace byte separates the header from the payload.
    if cursor.pos >= bytes.len() || !bytes[cursor.pos].is_ascii_whitespace() {
        return Err(nerror!(
            ErrorKind::IoError,
            "Malformed PPM header: missing separator before payload"
        ));
    }
    Ok(Header {
        w: w as i32,
        h: h as i32,
        data_start: cursor.pos + 1,
    })
}

fn read_all(io: &mut IoProxy) -> Result<Vec<u8>> {
    io.seek(0).map_err(|e| e.at(here!()))?;
    let mut bytes = Vec::new();
    io.read_to_end(&mut bytes).map_err(|e| e.at(here!()))?;
    Ok(bytes)
}

pub fn read_frame_info(io: &mut IoProxy) -> Result<FrameInfo> {
    let bytes = read_all(io).map_err(|e| e.at(here!()))?;
    let header = parse_header(&bytes).map_err(|e| e.at(here!()))?;
    Ok(FrameInfo {
        w: header.w,
        h: header.h,
        fmt: PixelFormat::Rgb24,
    })
}

pub fn read_frame(io: &mut IoProxy) -> Result<Bitmap> {
    let bytes = read_all(io).map_err(|e| e.at(here!()))?;
    let header = parse_header(&bytes).map_err(|e| e.at(here!()))?;
    let mut frame = Bitmap::new(header.w, header.h).map_err(|e| e.at(here!()))?;
    let expected = header.w as u64 * header.h as u64 * 3;
    let payload = &bytes[header.data_start.min(bytes.len())..];
    if (payload.len() as u64) < expected {
        return Err(nerror!(
            ErrorKind::IoError,
            "Truncated PPM payload: wanted {} bytes, got {}",
            expected,
            payload.len()
        ));
    }
    for (rgb, rgba) in payload
        .chunks_exact(3)
        .zip(frame.pixels_mut().chunks_exact_mut(4))
    {
        rgba[0] = rgb[0];
        rgba[1] = rgb[1];
        rgba[2] = rgb[2];
        rgba[3] = 255;
    }
    Ok(frame)
}

pub fn write_frame(io: &mut IoProxy, frame: &Bitmap) -> Result<()> {
    let header = format!("P6\n{} {}\n255\n", frame.w(), frame.h());
    let mut out = Vec::with_capacity(header.len() + frame.pixels().len() / 4 * 3);
    out.extend_from_slice(header.as_bytes());
    for rgba in frame.pixels().chunks_exact(4) {
        out.extend_from_slice(&rgba[0..3]);
    }
    io.write_all(&out).map_err(|e| e.at(here!()))
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn tiny_ppm() -> Vec<u8> {
        // 2x2: red, green / blue, white
        let mut bytes = b"P6\n# test frame\n2 2\n255\n".to_vec();
        bytes.extend_from_slice(&[255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255]);
        bytes
    }

    #[test]
    fn header_parses_with_comments() {
        let info = read_frame_info(&mut IoProxy::from_vec(tiny_ppm())).expect("info");
        assert_eq!((info.w, info.h), (2, 2));
        assert_eq!(info.fmt, PixelFormat::Rgb24);
    }

    #[test]
    fn decode_fills_alpha() {
        let frame = read_frame(&mut IoProxy::from_vec(tiny_ppm())).expect("frame");
        assert_eq!(frame.get(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.get(1, 0), [0, 255, 0, 255]);
        assert_eq!(frame.get(0, 1), [0, 0, 255, 255]);
        assert_eq!(frame.get(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn encode_then_decode_preserves_pixels() {
        let frame = read_frame(&mut IoProxy::from_vec(tiny_ppm())).expect("frame");
        let mut sink = IoProxy::output_buffer();
        write_frame(&mut sink, &frame).expect("write");
        let bytes = sink.get_output_buffer().expect("buffer").to_vec();
        assert!(bytes.starts_with(b"P6\n"));
        let back = read_frame(&mut IoProxy::from_vec(bytes)).expect("reread");
        assert_eq!(back, frame);
    }

    #[test]
    fn wide_maxval_is_not_implemented() {
        let bytes = b"P6 2 2 65535\n".to_vec();
        let e = read_frame_info(&mut IoProxy::from_vec(bytes)).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut bytes = b"P6 2 2 255\n".to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let e = read_frame(&mut IoProxy::from_vec(bytes)).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::IoError);
    }
}
