//! Frame codec for the chat protocol
//!
//! Frames a TCP byte stream into text messages. Each message is a 2-byte
//! big-endian length followed by that many bytes of UTF-8.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest payload a 2-byte length prefix can describe.
pub const MAX_FRAME_LENGTH: usize = u16::MAX as usize;

/// A tokio codec that reads and writes one `String` per frame.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        let inner = LengthDelimitedCodec::builder()
            .length_field_length(2)
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();
        Self { inner }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.inner.decode(src)? else {
            return Ok(None);
        };
        String::from_utf8(frame.to_vec())
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(Bytes::from(item), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn framed(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);
        buf
    }

    #[test]
    fn test_decode_complete_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = framed(b"/auth login1 pass1");
        let line = codec.decode(&mut buf).unwrap();
        assert_eq!(line.as_deref(), Some("/auth login1 pass1"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = framed(b"hello there");
        let mut head = buf.split_to(5);
        assert!(codec.decode(&mut head).unwrap().is_none());

        head.unsplit(buf);
        assert_eq!(codec.decode(&mut head).unwrap().as_deref(), Some("hello there"));
    }

    #[test]
    fn test_decode_two_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = framed("привет".as_bytes());
        buf.unsplit(framed(b"/end"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("привет"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("/end"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut codec = FrameCodec::new();
        let mut buf = framed(&[0xff, 0xfe, 0xfd]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_encode_writes_length_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("/end".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x04, b'/', b'e', b'n', b'd']);
    }

    #[test]
    fn test_encode_rejects_oversized_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let huge = "x".repeat(MAX_FRAME_LENGTH + 1);
        assert!(codec.encode(huge, &mut buf).is_err());
    }
}
