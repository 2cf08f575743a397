//! Varint framing for CONNECT-IP payloads
//!
//! Both transports carry IP packets behind QUIC variable-length integers
//! (RFC 9000 §16):
//!
//! - **HTTP/3 datagram payload**: `quarter-stream-id` `context-id`
//!   `packet`. The quarter stream ID associates the datagram with the
//!   CONNECT request stream (RFC 9297), the context ID selects the
//!   CONNECT-IP context.
//! - **HTTP/2 body record**: `context-id` `length` `packet`, concatenated
//!   in the CONNECT body stream. Records arrive split across arbitrary
//!   DATA frame boundaries; [`RecordDecoder`] reassembles them.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Framing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// A datagram payload ended inside a varint
    #[error("malformed datagram: truncated varint")]
    Truncated,

    /// A record declared a payload longer than the decoder accepts
    #[error("record payload of {len} bytes exceeds limit of {max}")]
    Oversized {
        /// Declared payload length
        len: u64,
        /// Decoder limit
        max: usize,
    },
}

/// Append `v` as a QUIC varint.
pub fn put_varint(out: &mut Vec<u8>, v: u64) {
    if v < 1 << 6 {
        out.push(v as u8);
    } else if v < 1 << 14 {
        out.extend_from_slice(&((v as u16) | 0x4000).to_be_bytes());
    } else if v < 1 << 30 {
        out.extend_from_slice(&((v as u32) | 0x8000_0000).to_be_bytes());
    } else {
        out.extend_from_slice(&(v | 0xC000_0000_0000_0000).to_be_bytes());
    }
}

/// Encoded length of `v` as a QUIC varint.
#[must_use]
pub fn varint_len(v: u64) -> usize {
    octets::varint_len(v)
}

/// Append one HTTP/2 body record: context ID, payload length, payload.
pub fn encode_record(context_id: u64, packet: &[u8], out: &mut Vec<u8>) {
    put_varint(out, context_id);
    put_varint(out, packet.len() as u64);
    out.extend_from_slice(packet);
}

/// Append one HTTP/3 datagram payload: quarter stream ID, context ID,
/// payload.
pub fn encode_datagram(quarter_stream_id: u64, context_id: u64, packet: &[u8], out: &mut Vec<u8>) {
    put_varint(out, quarter_stream_id);
    put_varint(out, context_id);
    out.extend_from_slice(packet);
}

/// Split an HTTP/3 datagram payload into quarter stream ID, context ID,
/// and the remaining packet bytes.
///
/// # Errors
///
/// [`FramingError::Truncated`] if the payload ends inside either varint.
pub fn decode_datagram(payload: &[u8]) -> Result<(u64, u64, &[u8]), FramingError> {
    let mut oct = octets::Octets::with_slice(payload);
    let quarter_stream_id = oct.get_varint().map_err(|_| FramingError::Truncated)?;
    let context_id = oct.get_varint().map_err(|_| FramingError::Truncated)?;
    Ok((quarter_stream_id, context_id, &payload[oct.off()..]))
}

/// One decoded HTTP/2 body record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record's context ID
    pub context_id: u64,
    /// The raw IP packet (or foreign-context payload)
    pub payload: Bytes,
}

/// Incremental decoder for the HTTP/2 record stream.
///
/// Feed arbitrary chunks with [`push`](Self::push); pull complete records
/// with [`next`](Self::next). The declared payload length is always
/// consumed in full, so foreign-context records never desynchronize the
/// stream.
#[derive(Debug)]
pub struct RecordDecoder {
    /// Bytes received but not yet consumed
    buf: BytesMut,
    /// Largest acceptable payload
    max_payload: usize,
}

impl RecordDecoder {
    /// Create a decoder that accepts payloads up to `max_payload` bytes.
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
        }
    }

    /// Append a received chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet decoded.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete record, if one is buffered.
    ///
    /// # Errors
    ///
    /// [`FramingError::Oversized`] if a record declares a payload larger
    /// than this decoder's limit; the stream is unusable afterwards.
    pub fn next(&mut self) -> Result<Option<Record>, FramingError> {
        let mut oct = octets::Octets::with_slice(&self.buf);

        let Ok(context_id) = oct.get_varint() else {
            return Ok(None);
        };
        let Ok(len) = oct.get_varint() else {
            return Ok(None);
        };
        if len > self.max_payload as u64 {
            return Err(FramingError::Oversized {
                len,
                max: self.max_payload,
            });
        }
        let len = len as usize;
        let header = oct.off();
        if self.buf.len() - header < len {
            return Ok(None);
        }

        self.buf.advance(header);
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(Record {
            context_id,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encodings() {
        for (v, expected) in [
            (0u64, vec![0x00]),
            (63, vec![0x3F]),
            (64, vec![0x40, 0x40]),
            (16_383, vec![0x7F, 0xFF]),
            (16_384, vec![0x80, 0x00, 0x40, 0x00]),
            (1_073_741_823, vec![0xBF, 0xFF, 0xFF, 0xFF]),
            (
                1_073_741_824,
                vec![0xC0, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00],
            ),
        ] {
            let mut out = Vec::new();
            put_varint(&mut out, v);
            assert_eq!(out, expected, "encoding of {v}");
            assert_eq!(out.len(), varint_len(v));

            // octets must agree on the decode.
            let mut oct = octets::Octets::with_slice(&out);
            assert_eq!(oct.get_varint().unwrap(), v);
        }
    }

    #[test]
    fn test_record_round_trip() {
        let p1 = vec![0x45u8; 60];
        let p2: Vec<u8> = (0..=255).collect();

        let mut wire = Vec::new();
        encode_record(0, &p1, &mut wire);
        encode_record(0, &p2, &mut wire);

        let mut decoder = RecordDecoder::new(1500);
        decoder.push(&wire);

        let r1 = decoder.next().unwrap().unwrap();
        assert_eq!(r1.context_id, 0);
        assert_eq!(&r1.payload[..], &p1[..]);

        let r2 = decoder.next().unwrap().unwrap();
        assert_eq!(&r2.payload[..], &p2[..]);

        assert_eq!(decoder.next().unwrap(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_across_chunk_boundaries() {
        let packet = vec![0xAAu8; 300]; // length needs a 2-byte varint

        let mut wire = Vec::new();
        encode_record(0, &packet, &mut wire);

        // Feed one byte at a time; the record completes only on the last.
        let mut decoder = RecordDecoder::new(1500);
        for (i, b) in wire.iter().enumerate() {
            decoder.push(std::slice::from_ref(b));
            let record = decoder.next().unwrap();
            if i < wire.len() - 1 {
                assert!(record.is_none(), "premature record at byte {i}");
            } else {
                assert_eq!(&record.unwrap().payload[..], &packet[..]);
            }
        }
    }

    #[test]
    fn test_decoder_preserves_foreign_context_records() {
        let mut wire = Vec::new();
        encode_record(7, &[1, 2, 3], &mut wire);
        encode_record(0, &[4, 5], &mut wire);

        let mut decoder = RecordDecoder::new(1500);
        decoder.push(&wire);

        let skipped = decoder.next().unwrap().unwrap();
        assert_eq!(skipped.context_id, 7);
        assert_eq!(&skipped.payload[..], &[1, 2, 3]);

        let kept = decoder.next().unwrap().unwrap();
        assert_eq!(kept.context_id, 0);
        assert_eq!(&kept.payload[..], &[4, 5]);
    }

    #[test]
    fn test_decoder_rejects_oversized_record() {
        let mut wire = Vec::new();
        put_varint(&mut wire, 0);
        put_varint(&mut wire, 70_000);

        let mut decoder = RecordDecoder::new(65_535);
        decoder.push(&wire);
        assert_eq!(
            decoder.next(),
            Err(FramingError::Oversized {
                len: 70_000,
                max: 65_535
            })
        );
    }

    #[test]
    fn test_empty_packet_record() {
        let mut wire = Vec::new();
        encode_record(0, &[], &mut wire);

        let mut decoder = RecordDecoder::new(1500);
        decoder.push(&wire);
        let record = decoder.next().unwrap().unwrap();
        assert!(record.payload.is_empty());
    }

    #[test]
    fn test_datagram_round_trip() {
        let packet = [0x60u8, 1, 2, 3];
        let mut wire = Vec::new();
        encode_datagram(0, 0, &packet, &mut wire);
        assert_eq!(&wire[..2], &[0, 0]);

        let (quarter, context, payload) = decode_datagram(&wire).unwrap();
        assert_eq!(quarter, 0);
        assert_eq!(context, 0);
        assert_eq!(payload, &packet[..]);
    }

    #[test]
    fn test_datagram_nonzero_context() {
        let mut wire = Vec::new();
        encode_datagram(0, 3, &[9, 9], &mut wire);
        let (_, context, payload) = decode_datagram(&wire).unwrap();
        assert_eq!(context, 3);
        assert_eq!(payload, &[9, 9]);
    }

    #[test]
    fn test_datagram_truncated() {
        assert_eq!(decode_datagram(&[]), Err(FramingError::Truncated));
        // 0x40 opens a 2-byte varint that never completes.
        assert_eq!(decode_datagram(&[0x40]), Err(FramingError::Truncated));
        assert_eq!(decode_datagram(&[0x00, 0x40]), Err(FramingError::Truncated));
    }

    #[test]
    fn test_datagram_empty_payload_is_valid() {
        let (quarter, context, payload) = decode_datagram(&[0, 0]).unwrap();
        assert_eq!((quarter, context), (0, 0));
        assert!(payload.is_empty());
    }
}
