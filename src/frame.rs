//! Frame codec: the fixed header and the three variable length fields.

use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::protocol::{StatusCode, HEADER_LEN, SYNC_WORD};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad sync word {0:#010x}")]
    BadSync(u32),
    #[error("truncated {field}: expected {expected} bytes, found {found}")]
    Truncated {
        field: &'static str,
        expected: u64,
        found: usize,
    },
    #[error("{field} is {len} bytes, at most {max} fit in a header")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{0} is not valid UTF-8")]
    NotUtf8(&'static str),
    #[error("{0} unexpected bytes after payload")]
    TrailingBytes(usize),
    #[error("payload of {0} bytes cannot be held in memory")]
    PayloadTooLarge(u64),
}

/// Fixed 24 byte header at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub sync: u32,
    pub status: StatusCode,
    pub command_length: u16,
    pub argument_length: u16,
    pub message_length: u64,
    pub sequence_num: u32,
}

impl Header {
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.sync);
        dst.put_u32(self.status.into());
        dst.put_u16(self.command_length);
        dst.put_u16(self.argument_length);
        dst.put_u64(self.message_length);
        dst.put_u32(self.sequence_num);
    }

    /// Decodes the header at the start of `src`.
    ///
    /// The sync word is checked before any length field is looked at, so a
    /// stray segment is rejected without trusting its contents.
    pub fn decode(mut src: &[u8]) -> Result<Self, FrameError> {
        if src.len() < 4 {
            return Err(FrameError::Truncated {
                field: "header",
                expected: HEADER_LEN as u64,
                found: src.len(),
            });
        }
        let sync = src.get_u32();
        if sync != SYNC_WORD {
            return Err(FrameError::BadSync(sync));
        }
        if src.remaining() < HEADER_LEN - 4 {
            return Err(FrameError::Truncated {
                field: "header",
                expected: HEADER_LEN as u64,
                found: src.remaining() + 4,
            });
        }
        Ok(Header {
            sync,
            status: StatusCode::from(src.get_u32()),
            command_length: src.get_u16(),
            argument_length: src.get_u16(),
            message_length: src.get_u64(),
            sequence_num: src.get_u32(),
        })
    }

    /// Payload length as an in-memory size.
    pub fn payload_len(&self) -> Result<usize, FrameError> {
        usize::try_from(self.message_length)
            .map_err(|_| FrameError::PayloadTooLarge(self.message_length))
    }
}

/// One request or response.
///
/// The header's length fields are derived from the fields when the message
/// is encoded, so they cannot disagree with what is actually sent.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub status: StatusCode,
    pub sequence_num: u32,
    pub command: String,
    pub argument: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn request(
        sequence_num: u32,
        command: impl Into<String>,
        argument: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Message {
            status: StatusCode::NoErr,
            sequence_num,
            command: command.into(),
            argument: argument.into(),
            payload,
        }
    }

    /// Response echoing the request's command, argument and sequence number.
    pub fn reply_to(request: &Message, status: StatusCode, payload: Vec<u8>) -> Self {
        Message {
            status,
            sequence_num: request.sequence_num,
            command: request.command.clone(),
            argument: request.argument.clone(),
            payload,
        }
    }

    pub fn header(&self) -> Result<Header, FrameError> {
        Ok(Header {
            sync: SYNC_WORD,
            status: self.status,
            command_length: text_len("command", &self.command)?,
            argument_length: text_len("argument", &self.argument)?,
            message_length: self.payload.len() as u64,
            sequence_num: self.sequence_num,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let header = self.header()?;
        let mut frame = Vec::with_capacity(
            HEADER_LEN + self.command.len() + self.argument.len() + self.payload.len(),
        );
        header.encode(&mut frame);
        frame.put_slice(self.command.as_bytes());
        frame.put_slice(self.argument.as_bytes());
        frame.put_slice(&self.payload);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let header = Header::decode(frame)?;
        let mut body = &frame[HEADER_LEN..];

        let command = take(&mut body, "command", header.command_length as u64)?;
        let argument = take(&mut body, "argument", header.argument_length as u64)?;
        let payload = take(&mut body, "payload", header.message_length)?;
        if !body.is_empty() {
            return Err(FrameError::TrailingBytes(body.len()));
        }

        Ok(Message {
            status: header.status,
            sequence_num: header.sequence_num,
            command: utf8("command", command)?,
            argument: utf8("argument", argument)?,
            payload: payload.to_vec(),
        })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("status", &self.status)
            .field("sequence_num", &self.sequence_num)
            .field("command", &self.command)
            .field("argument", &self.argument)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

fn text_len(field: &'static str, text: &str) -> Result<u16, FrameError> {
    u16::try_from(text.len()).map_err(|_| FrameError::FieldTooLong {
        field,
        len: text.len(),
        max: u16::MAX as usize,
    })
}

fn take<'a>(src: &mut &'a [u8], field: &'static str, len: u64) -> Result<&'a [u8], FrameError> {
    match usize::try_from(len) {
        Ok(len) if len <= src.len() => {
            let (head, tail) = src.split_at(len);
            *src = tail;
            Ok(head)
        }
        _ => Err(FrameError::Truncated {
            field,
            expected: len,
            found: src.len(),
        }),
    }
}

fn utf8(field: &'static str, bytes: &[u8]) -> Result<String, FrameError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::NotUtf8(field))
}
