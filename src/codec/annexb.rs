//! Streaming Annex-B parser: splits an H.264 byte stream into NAL packets

use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

/// Incrementally extracts start-code delimited NAL units.
///
/// A unit is only complete once the next start code has been seen, so the
/// last unit of a push stays pending until more data arrives or [`flush`]
/// is called at the end of a compressed frame.
///
/// [`flush`]: AnnexBParser::flush
#[derive(Debug, Default)]
pub struct AnnexBParser {
    pending: BytesMut,
}

impl AnnexBParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Bytes buffered but not yet emitted.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Next complete NAL unit, start code included.
    pub fn next_packet(&mut self) -> Option<Bytes> {
        let header = self.align_to_start_code()?;
        let end = find_start_code(&self.pending, header)?;
        Some(self.pending.split_to(end).freeze())
    }

    /// Emit whatever is left as the final unit of the stream segment.
    pub fn flush(&mut self) -> Option<Bytes> {
        let header = self.align_to_start_code()?;
        if self.pending.len() <= header {
            self.pending.clear();
            return None;
        }
        Some(self.pending.split().freeze())
    }

    /// Drop any bytes before the first start code and return the length of
    /// that start code.
    fn align_to_start_code(&mut self) -> Option<usize> {
        let at = find_start_code(&self.pending, 0)?;
        if at > 0 {
            debug!(skipped = at, "discarding bytes before start code");
            self.pending.advance(at);
        }
        Some(start_code_len(&self.pending))
    }
}

fn start_code_len(buf: &[u8]) -> usize {
    if buf.starts_with(&[0, 0, 0, 1]) {
        4
    } else {
        3
    }
}

/// Position of the first start code at or after `from`. A four byte code is
/// reported from its leading zero.
fn find_start_code(buf: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 <= buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            return Some(if i > from && buf[i - 1] == 0 { i - 1 } else { i });
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0, 0, 0, 1, 0x67, 0x42, 0xc0, 0x1e];
    const PPS: &[u8] = &[0, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80];
    const IDR: &[u8] = &[0, 0, 1, 0x65, 0x88, 0x84, 0x00, 0x33];

    #[test]
    fn splits_units_on_start_codes() {
        let mut parser = AnnexBParser::new();
        parser.push(&[SPS, PPS, IDR].concat());

        assert_eq!(parser.next_packet().as_deref(), Some(SPS));
        assert_eq!(parser.next_packet().as_deref(), Some(PPS));
        // last unit waits for a terminating start code
        assert_eq!(parser.next_packet(), None);
        assert_eq!(parser.flush().as_deref(), Some(IDR));
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn units_split_across_pushes_are_reassembled() {
        let stream = [SPS, PPS].concat();
        let mut parser = AnnexBParser::new();
        parser.push(&stream[..6]);
        assert_eq!(parser.next_packet(), None);
        parser.push(&stream[6..12]);
        assert_eq!(parser.next_packet().as_deref(), Some(SPS));
        parser.push(&stream[12..]);
        assert_eq!(parser.flush().as_deref(), Some(PPS));
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut parser = AnnexBParser::new();
        parser.push(&[0xde, 0xad]);
        parser.push(IDR);
        assert_eq!(parser.flush().as_deref(), Some(IDR));
    }

    #[test]
    fn lone_start_code_yields_nothing() {
        let mut parser = AnnexBParser::new();
        parser.push(&[0, 0, 0, 1]);
        assert_eq!(parser.flush(), None);
        assert_eq!(parser.pending_len(), 0);
    }
}
