//! Codec registry, signature sniffing, and the binding between graph
//! placeholder ids and I/O endpoints.
//!
//! Inputs are sniffed at registration: the first [`SIGNATURE_LENGTH`] bytes
//! pick the codec (or fail the registration), the stream is rewound, and the
//! codec caches the frame header. Output bindings stay unresolved until an
//! encoder node claims them during execution.

pub mod farbfeld;
pub mod ppm;

use crate::errors::{ErrorKind, Result};
use crate::flow::definitions::{Bitmap, FrameInfo};
use crate::io::IoProxy;
use crate::{here, nerror};
use lazy_static::lazy_static;
use rasterflow_types::IoDirection;

/// How many leading bytes a codec may inspect when sniffing.
pub const SIGNATURE_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Farbfeld,
    Ppm,
}

lazy_static! {
    /// Registration order decides sniffing precedence.
    static ref CODECS: Vec<CodecKind> = vec![CodecKind::Farbfeld, CodecKind::Ppm];
}

impl CodecKind {
    fn sniffs(self, signature: &[u8; SIGNATURE_LENGTH]) -> bool {
        match self {
            CodecKind::Farbfeld => signature == b"farbfeld",
            CodecKind::Ppm => {
                signature[0] == b'P' && signature[1] == b'6' && signature[2].is_ascii_whitespace()
            }
        }
    }

    /// Frame header only; leaves the stream position unspecified.
    pub fn read_frame_info(self, io: &mut IoProxy) -> Result<FrameInfo> {
        match self {
            CodecKind::Farbfeld => farbfeld::read_frame_info(io).map_err(|e| e.at(here!())),
            CodecKind::Ppm => ppm::read_frame_info(io).map_err(|e| e.at(here!())),
        }
    }

    pub fn read_frame(self, io: &mut IoProxy) -> Result<Bitmap> {
        match self {
            CodecKind::Farbfeld => farbfeld::read_frame(io).map_err(|e| e.at(here!())),
            CodecKind::Ppm => ppm::read_frame(io).map_err(|e| e.at(here!())),
        }
    }

    pub fn write_frame(self, io: &mut IoProxy, frame: &Bitmap) -> Result<()> {
        match self {
            CodecKind::Farbfeld => farbfeld::write_frame(io, frame).map_err(|e| e.at(here!())),
            CodecKind::Ppm => ppm::write_frame(io, frame).map_err(|e| e.at(here!())),
        }
    }
}

/// Picks the codec whose signature matches, or `None` for an unrecognized
/// byte sequence.
pub fn codec_select(signature: &[u8; SIGNATURE_LENGTH]) -> Option<CodecKind> {
    CODECS.iter().copied().find(|kind| kind.sniffs(signature))
}

/// One I/O binding of a job: a placeholder id, the endpoint, and the resolved
/// codec identity plus its cached state.
#[derive(Debug)]
pub struct CodecInstance {
    pub placeholder_id: i32,
    pub direction: IoDirection,
    pub io: IoProxy,
    /// `None` until resolved — at registration for inputs, by an encoder node
    /// during execution for outputs.
    pub codec_id: Option<CodecKind>,
    /// Frame header cached at initialization (inputs only).
    pub frame_info: Option<FrameInfo>,
}

/// Reads and caches the frame header for a freshly sniffed input binding,
/// leaving the stream rewound to byte 0.
pub fn initialize_codec(instance: &mut CodecInstance) -> Result<()> {
    let kind = instance.codec_id.ok_or_else(|| {
        nerror!(
            ErrorKind::InvalidArgument,
            "Cannot initialize binding for placeholder id {} before a codec is selected",
            instance.placeholder_id
        )
    })?;
    let info = kind.read_frame_info(&mut instance.io).map_err(|e| e.at(here!()))?;
    instance.io.seek(0).map_err(|e| e.at(here!()))?;
    instance.frame_info = Some(info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_recognizes_registered_signatures() {
        assert_eq!(codec_select(b"farbfeld"), Some(CodecKind::Farbfeld));
        assert_eq!(codec_select(b"P6\n12 34"), Some(CodecKind::Ppm));
        assert_eq!(codec_select(b"P6 1 1 2"), Some(CodecKind::Ppm));
    }

    #[test]
    fn select_rejects_unknown_signatures() {
        assert_eq!(codec_select(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03]), None);
        // "P6" without a whitespace separator is not a PPM header.
        assert_eq!(codec_select(b"P6x_____"), None);
        assert_eq!(codec_select(b"farbfelt"), None);
    }

    #[test]
    fn initialize_caches_frame_info_and_rewinds() {
        let bytes = farbfeld::tests::tiny_farbfeld();
        let mut instance = CodecInstance {
            placeholder_id: 0,
            direction: IoDirection::In,
            io: IoProxy::from_vec(bytes),
            codec_id: Some(CodecKind::Farbfeld),
            frame_info: None,
        };
        initialize_codec(&mut instance).expect("initialize");
        let info = instance.frame_info.expect("cached");
        assert_eq!((info.w, info.h), (2, 1));
        assert_eq!(instance.io.tell().expect("tell"), 0);
    }
}
