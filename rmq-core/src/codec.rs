//! Remoting frame handling.
//!
//! Every command travels as a length-prefixed frame:
//! - `[total_len: i32][header_mark: i32][header][body]`
//! - `total_len` counts everything after itself
//! - `header_mark` carries the serialize type in its high byte and the header length in the low 24 bits

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::command::{RemotingCommand, SerializeType};
use crate::errors::{CodecError, Result};

/// Largest frame the cluster will send or accept (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_FIELD_SIZE: usize = 4;
const HEADER_MARK_SIZE: usize = 4;
const MAX_HEADER_LEN: usize = 0x00FF_FFFF;

#[derive(Debug, Clone)]
pub struct RemotingCodec {
    max_frame_size: usize,
}

impl RemotingCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for RemotingCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RemotingCodec {
    type Item = RemotingCommand;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_FIELD_SIZE];
        length_bytes.copy_from_slice(&src[..LENGTH_FIELD_SIZE]);
        let frame_len = i32::from_be_bytes(length_bytes);

        if frame_len < HEADER_MARK_SIZE as i32 || frame_len as usize > self.max_frame_size {
            return Err(CodecError::FrameSize {
                size: frame_len.max(0) as usize,
                max: self.max_frame_size,
            });
        }
        let frame_len = frame_len as usize;

        if src.len() < LENGTH_FIELD_SIZE + frame_len {
            trace!(
                "waiting for complete frame, have {} bytes, need {}",
                src.len(),
                LENGTH_FIELD_SIZE + frame_len
            );
            src.reserve(LENGTH_FIELD_SIZE + frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let frame = src.split_to(frame_len).freeze();
        decode_frame(frame).map(Some)
    }
}

impl Encoder<RemotingCommand> for RemotingCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RemotingCommand, dst: &mut BytesMut) -> Result<()> {
        let header = serde_json::to_vec(&item)?;
        let header_len = header.len();
        if header_len > MAX_HEADER_LEN {
            return Err(CodecError::HeaderOverflow {
                header_len,
                frame_len: MAX_HEADER_LEN,
            });
        }

        let frame_len = HEADER_MARK_SIZE + header_len + item.body.len();
        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameSize {
                size: frame_len,
                max: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_FIELD_SIZE + frame_len);
        dst.put_i32(frame_len as i32);
        dst.put_i32(header_mark(SerializeType::Json, header_len));
        dst.put_slice(&header);
        dst.put_slice(&item.body);

        Ok(())
    }
}

fn header_mark(serialize_type: SerializeType, header_len: usize) -> i32 {
    ((serialize_type.code() as i32) << 24) | (header_len & MAX_HEADER_LEN) as i32
}

/// Decodes one frame with the length prefix already stripped.
pub fn decode_frame(mut frame: Bytes) -> Result<RemotingCommand> {
    let frame_len = frame.len();
    if frame_len < HEADER_MARK_SIZE {
        return Err(CodecError::FrameSize {
            size: frame_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mark = frame.get_i32();
    let serialize_code = ((mark >> 24) & 0xFF) as u8;
    let header_len = (mark as usize) & MAX_HEADER_LEN;

    if header_len > frame.len() {
        return Err(CodecError::HeaderOverflow {
            header_len,
            frame_len,
        });
    }

    match SerializeType::from_code(serialize_code) {
        Some(SerializeType::Json) => {}
        _ => return Err(CodecError::UnsupportedSerializeType(serialize_code)),
    }

    let header = frame.split_to(header_len);
    let mut command: RemotingCommand = serde_json::from_slice(&header)?;
    command.body = frame;

    Ok(command)
}
