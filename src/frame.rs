// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// Deepest array nesting accepted from a peer.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("protocol error; invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("protocol error; invalid length {0}")]
    InvalidLength(String),
    #[error("protocol error; bulk string length does not match its payload")]
    LengthMismatch,
    #[error("protocol error; invalid frame format")]
    InvalidEncoding,
    #[error("protocol error; frame size exceeds limit of {0} bytes")]
    FrameTooLarge(usize),
    #[error("protocol error; arrays nested deeper than {0} levels")]
    NestingTooDeep(usize),
    /// Invalid message encoding.
    #[error("{0}")]
    Other(crate::Error),
}

/// A single RESP2 value. Null bulk strings and null arrays are distinct values and both survive
/// a parse/serialize round trip.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    NullArray,
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::Simple(String::from_utf8(line)?))
            }
            DataType::SimpleError => {
                let line = get_line(src)?.to_vec();
                Ok(Frame::Error(String::from_utf8(line)?))
            }
            DataType::Integer => {
                let integer = get_decimal(src)?;
                Ok(Frame::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = get_decimal(src)?;
                if length == -1 {
                    return Ok(Frame::Null);
                }
                let length = usize::try_from(length)
                    .map_err(|_| Error::InvalidLength(length.to_string()))?;

                let data = get_exact(src, length)?;
                Ok(Frame::Bulk(Bytes::copy_from_slice(data)))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                if depth >= MAX_DEPTH {
                    return Err(Error::NestingTooDeep(MAX_DEPTH));
                }
                let length = get_decimal(src)?;
                if length == -1 {
                    return Ok(Frame::NullArray);
                }
                let length = usize::try_from(length)
                    .map_err(|_| Error::InvalidLength(length.to_string()))?;

                // Every element takes at least three bytes, don't trust the header for capacity.
                let mut frames = Vec::with_capacity(length.min(src.remaining() / 3 + 1));
                for _ in 0..length {
                    frames.push(Self::parse_nested(src, depth + 1)?);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    /// Appends the wire representation of the frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(u8::from(DataType::SimpleString));
                put_line(dst, s);
            }
            Frame::Error(s) => {
                dst.put_u8(u8::from(DataType::SimpleError));
                put_line(dst, s);
            }
            Frame::Integer(i) => {
                dst.put_u8(u8::from(DataType::Integer));
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            Frame::Bulk(bytes) => {
                dst.put_u8(u8::from(DataType::BulkString));
                dst.extend_from_slice(bytes.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(bytes);
                dst.extend_from_slice(CRLF);
            }
            Frame::Null => {
                dst.put_u8(u8::from(DataType::BulkString));
                dst.extend_from_slice(b"-1\r\n");
            }
            Frame::Array(arr) => {
                dst.put_u8(u8::from(DataType::Array));
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    frame.encode(dst);
                }
            }
            Frame::NullArray => {
                dst.put_u8(u8::from(DataType::Array));
                dst.extend_from_slice(b"-1\r\n");
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.to_vec()
    }

    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    pub fn bulk(value: impl Into<Bytes>) -> Frame {
        Frame::Bulk(value.into())
    }

    /// A bulk string when `value` is present, the null bulk string otherwise.
    pub fn optional_bulk(value: Option<impl Into<Bytes>>) -> Frame {
        value.map_or(Frame::Null, |v| Frame::Bulk(v.into()))
    }

    pub fn bulk_array<I, T>(values: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Frame::Array(values.into_iter().map(|v| Frame::Bulk(v.into())).collect())
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
            Frame::NullArray => write!(f, "*-1"),
        }
    }
}

/// Reads up to the next CRLF, leaving the cursor right after it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = src.get_ref();

    let end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    let text = std::str::from_utf8(line).map_err(|_| Error::InvalidEncoding)?;

    text.parse::<i64>()
        .map_err(|_| Error::InvalidLength(text.to_string()))
}

/// Reads exactly `len` payload bytes followed by a CRLF terminator.
fn get_exact<'a>(src: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = src.get_ref();

    let end = start.checked_add(len).ok_or(Error::LengthMismatch)?;
    if buf.len() < end + CRLF.len() {
        return Err(Error::Incomplete);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(Error::LengthMismatch);
    }

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

/// Writes a single-line payload. Line breaks would end the frame early, so they become spaces.
fn put_line(dst: &mut BytesMut, line: &str) {
    dst.extend(line.bytes().map(|b| match b {
        b'\r' | b'\n' => b' ',
        b => b,
    }));
    dst.extend_from_slice(CRLF);
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        Error::InvalidEncoding
    }
}

impl From<std::io::Error> for Error {
    fn from(src: std::io::Error) -> Error {
        Error::Other(src.into())
    }
}
