//! I/O endpoints a job can read from or write to.
//!
//! Endpoints are finite and seekable: in-memory sources, expanding in-memory
//! sinks, and plain files. All calls are synchronous and blocking.

use crate::errors::{ErrorKind, Result};
use crate::{here, nerror};
use rasterflow_types::IoMode;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

enum IoBackend {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

pub struct IoProxy {
    backend: IoBackend,
    mode: IoMode,
}

impl IoProxy {
    /// A readable, seekable source over a copy of the given bytes.
    pub fn from_slice(bytes: &[u8]) -> IoProxy {
        IoProxy::from_vec(bytes.to_vec())
    }

    /// A readable, seekable source that takes ownership of the given bytes.
    pub fn from_vec(bytes: Vec<u8>) -> IoProxy {
        IoProxy {
            backend: IoBackend::Memory(Cursor::new(bytes)),
            mode: IoMode::ReadSeekable,
        }
    }

    /// An expanding in-memory sink; retrieve the result with
    /// [`get_output_buffer`](IoProxy::get_output_buffer) after execution.
    pub fn output_buffer() -> IoProxy {
        IoProxy {
            backend: IoBackend::Memory(Cursor::new(Vec::new())),
            mode: IoMode::WriteSeekable,
        }
    }

    pub fn file_reader<P: AsRef<Path>>(path: P) -> Result<IoProxy> {
        let file = File::open(path.as_ref()).map_err(|e| {
            nerror!(
                ErrorKind::IoError,
                "Failed to open {:?} for reading: {}",
                path.as_ref(),
                e
            )
        })?;
        Ok(IoProxy {
            backend: IoBackend::File(file),
            mode: IoMode::ReadSeekable,
        })
    }

    pub fn file_writer<P: AsRef<Path>>(path: P) -> Result<IoProxy> {
        let file = File::create(path.as_ref()).map_err(|e| {
            nerror!(
                ErrorKind::IoError,
                "Failed to open {:?} for writing: {}",
                path.as_ref(),
                e
            )
        })?;
        Ok(IoProxy {
            backend: IoBackend::File(file),
            mode: IoMode::WriteSeekable,
        })
    }

    pub fn mode(&self) -> IoMode {
        self.mode
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !self.mode.can_read() {
            return Err(nerror!(
                ErrorKind::IoError,
                "I/O object with mode {:?} is not readable",
                self.mode
            ));
        }
        let read = match &mut self.backend {
            IoBackend::Memory(cursor) => cursor.read(buffer),
            IoBackend::File(file) => file.read(buffer),
        };
        read.map_err(|e| nerror!(ErrorKind::IoError, "Read failed: {}", e))
    }

    pub fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.read(&mut buffer[filled..]).map_err(|e| e.at(here!()))?;
            if n == 0 {
                return Err(nerror!(
                    ErrorKind::IoError,
                    "Unexpected end of stream: wanted {} bytes, got {}",
                    buffer.len(),
                    filled
                ));
            }
            filled += n;
        }
        Ok(())
    }

    pub fn read_to_end(&mut self, buffer: &mut Vec<u8>) -> Result<usize> {
        if !self.mode.can_read() {
            return Err(nerror!(
                ErrorKind::IoError,
                "I/O object with mode {:?} is not readable",
                self.mode
            ));
        }
        let read = match &mut self.backend {
            IoBackend::Memory(cursor) => cursor.read_to_end(buffer),
            IoBackend::File(file) => file.read_to_end(buffer),
        };
        read.map_err(|e| nerror!(ErrorKind::IoError, "Read failed: {}", e))
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        let seek = match &mut self.backend {
            IoBackend::Memory(cursor) => cursor.seek(SeekFrom::Start(offset)),
            IoBackend::File(file) => file.seek(SeekFrom::Start(offset)),
        };
        seek.map(|_| ())
            .map_err(|e| nerror!(ErrorKind::IoError, "Seek to {} failed: {}", offset, e))
    }

    pub fn tell(&mut self) -> Result<u64> {
        let pos = match &mut self.backend {
            IoBackend::Memory(cursor) => cursor.stream_position(),
            IoBackend::File(file) => file.stream_position(),
        };
        pos.map_err(|e| nerror!(ErrorKind::IoError, "Tell failed: {}", e))
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.mode.can_write() {
            return Err(nerror!(
                ErrorKind::IoError,
                "I/O object with mode {:?} is not writable",
                self.mode
            ));
        }
        let write = match &mut self.backend {
            IoBackend::Memory(cursor) => cursor.write_all(bytes),
            IoBackend::File(file) => file.write_all(bytes),
        };
        write.map_err(|e| nerror!(ErrorKind::IoError, "Write of {} bytes failed: {}", bytes.len(), e))
    }

    /// The accumulated bytes of an in-memory sink.
    pub fn get_output_buffer(&self) -> Result<&[u8]> {
        match &self.backend {
            IoBackend::Memory(cursor) if self.mode.can_write() => Ok(cursor.get_ref()),
            _ => Err(nerror!(
                ErrorKind::InvalidArgument,
                "This I/O object is not an output buffer"
            )),
        }
    }
}

impl fmt::Debug for IoProxy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.backend {
            IoBackend::Memory(cursor) => {
                write!(f, "IoProxy::Memory({} bytes, {:?})", cursor.get_ref().len(), self.mode)
            }
            IoBackend::File(_) => write!(f, "IoProxy::File({:?})", self.mode),
        }
    }
}
