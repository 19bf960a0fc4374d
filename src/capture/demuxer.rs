//! JPEG frame demuxer
//!
//! Cuts a continuous byte stream into complete images delimited by the JPEG
//! start (`FF D8`) and end (`FF D9`) markers. Only the markers are inspected;
//! the rest of each image is opaque. The demuxer does not know where its
//! bytes come from.

use bytes::Bytes;
use thiserror::Error;

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default cap on bytes buffered for one unterminated frame
pub const DEFAULT_MAX_PENDING: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemuxError {
    #[error("frame exceeded {limit} bytes without an end marker ({buffered} buffered)")]
    Overflow { buffered: usize, limit: usize },
    #[error("demuxer is unusable after an overflow")]
    Poisoned,
}

/// Stateful frame extractor; owns its buffer exclusively
pub struct FrameDemuxer {
    buf: Vec<u8>,
    /// Where the end-marker search resumes when `buf` holds a partial frame
    scan_from: usize,
    max_pending: usize,
    poisoned: bool,
}

impl FrameDemuxer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            buf: Vec::with_capacity(64 * 1024),
            scan_from: 0,
            max_pending: max_pending.max(EOI.len() + SOI.len()),
            poisoned: false,
        }
    }

    /// Append received bytes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), DemuxError> {
        if self.poisoned {
            return Err(DemuxError::Poisoned);
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Extract every complete frame in arrival order. Trailing partial data
    /// stays buffered for the next call.
    pub fn drain_frames(&mut self) -> Result<Vec<Bytes>, DemuxError> {
        if self.poisoned {
            return Err(DemuxError::Poisoned);
        }

        let mut frames = Vec::new();
        let mut pos = 0;

        loop {
            let Some(rel) = find_marker(&self.buf[pos..], &SOI) else {
                // Only noise left. A trailing 0xFF may open the next marker.
                if pos < self.buf.len() && self.buf.last() == Some(&SOI[0]) {
                    pos = self.buf.len() - 1;
                } else {
                    pos = self.buf.len();
                }
                self.scan_from = 0;
                break;
            };

            let start = pos + rel;
            let search_from = if start == 0 && self.scan_from > SOI.len() {
                self.scan_from
            } else {
                start + SOI.len()
            };

            match find_marker(&self.buf[search_from..], &EOI) {
                Some(rel_end) => {
                    let end = search_from + rel_end + EOI.len();
                    if end - start > self.max_pending {
                        return Err(self.overflow(end - start));
                    }
                    frames.push(Bytes::copy_from_slice(&self.buf[start..end]));
                    pos = end;
                    self.scan_from = 0;
                }
                None => {
                    let pending = self.buf.len() - start;
                    if pending > self.max_pending {
                        return Err(self.overflow(pending));
                    }
                    pos = start;
                    // the last byte may be the first half of an end marker
                    self.scan_from = pending.saturating_sub(1).max(SOI.len());
                    break;
                }
            }
        }

        self.buf.drain(..pos);
        Ok(frames)
    }

    /// Feed and drain in one step
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, DemuxError> {
        self.feed(chunk)?;
        self.drain_frames()
    }

    /// Bytes currently held back
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn overflow(&mut self, buffered: usize) -> DemuxError {
        self.poisoned = true;
        self.buf = Vec::new();
        DemuxError::Overflow {
            buffered,
            limit: self.max_pending,
        }
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

fn find_marker(buffer: &[u8], marker: &[u8; 2]) -> Option<usize> {
    buffer.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut out = SOI.to_vec();
        out.extend_from_slice(payload);
        out.extend_from_slice(&EOI);
        out
    }

    fn drain_all(demuxer: &mut FrameDemuxer, data: &[u8], chunk: usize) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for piece in data.chunks(chunk.max(1)) {
            frames.extend(demuxer.push(piece).expect("push"));
        }
        frames
    }

    fn sample_stream() -> Vec<u8> {
        let mut data = b"\x00\xffgarbage\xd9".to_vec();
        data.extend(fake_jpeg(b"first frame"));
        data.extend_from_slice(b"\xff\xff between ");
        data.extend(fake_jpeg(&[0xFF, 0x00, 0xFF, 0xD8, 0x11, 0xFF]));
        data.extend(fake_jpeg(b""));
        data.extend(fake_jpeg(&vec![0xAB; 300]));
        data.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02, 0xFF]);
        data
    }

    #[test]
    fn two_back_to_back_frames() {
        let n = 10;
        let m = 33;
        let mut data = fake_jpeg(&vec![0x11; n]);
        data.extend(fake_jpeg(&vec![0x22; m]));

        let mut demuxer = FrameDemuxer::default();
        let frames = demuxer.push(&data).expect("push");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), n + 4);
        assert_eq!(frames[1].len(), m + 4);
        assert_eq!(frames[0][2], 0x11);
        assert_eq!(frames[1][2], 0x22);
        assert_eq!(demuxer.buffered(), 0);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let data = sample_stream();
        let mut whole = FrameDemuxer::default();
        let expected = drain_all(&mut whole, &data, data.len());
        assert_eq!(expected.len(), 4);

        for chunk in [1, 2, 3, 5, 7, 64, 127] {
            let mut demuxer = FrameDemuxer::default();
            let frames = drain_all(&mut demuxer, &data, chunk);
            assert_eq!(frames, expected, "chunk size {}", chunk);
            assert_eq!(demuxer.buffered(), whole.buffered(), "chunk size {}", chunk);
        }
    }

    #[test]
    fn partial_frame_persists_across_feeds() {
        let mut demuxer = FrameDemuxer::default();
        demuxer.feed(&[0xFF, 0xD8, 1, 2, 3]).expect("feed");
        assert!(demuxer.drain_frames().expect("drain").is_empty());
        assert_eq!(demuxer.buffered(), 5);

        demuxer.feed(&[4, 5]).expect("feed");
        assert!(demuxer.drain_frames().expect("drain").is_empty());

        demuxer.feed(&[0xFF, 0xD9, 0x00]).expect("feed");
        let frames = demuxer.drain_frames().expect("drain");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 1, 2, 3, 4, 5, 0xFF, 0xD9]);
    }

    #[test]
    fn end_marker_split_between_feeds() {
        let mut demuxer = FrameDemuxer::default();
        assert!(demuxer.push(&[0xFF, 0xD8, 9, 0xFF]).expect("push").is_empty());
        let frames = demuxer.push(&[0xD9]).expect("push");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 9, 0xFF, 0xD9]);
    }

    #[test]
    fn noise_before_start_is_discarded() {
        let mut demuxer = FrameDemuxer::default();
        assert!(demuxer.push(b"noise noise").expect("push").is_empty());
        assert_eq!(demuxer.buffered(), 0);

        assert!(demuxer.push(&[0x01, 0xFF]).expect("push").is_empty());
        assert_eq!(demuxer.buffered(), 1);
        let frames = demuxer.push(&[0xD8, 0x42, 0xFF, 0xD9]).expect("push");
        assert_eq!(frames, vec![Bytes::from_static(&[0xFF, 0xD8, 0x42, 0xFF, 0xD9])]);
    }

    #[test]
    fn never_emits_truncated_frames() {
        let mut demuxer = FrameDemuxer::default();
        let frames = demuxer.push(&[0xFF, 0xD8, 1, 2, 0xFF, 0xD8, 3]).expect("push");
        assert!(frames.is_empty());
        let frames = demuxer.push(&[0xFF, 0xD9]).expect("push");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &[0xFF, 0xD8, 1, 2, 0xFF, 0xD8, 3, 0xFF, 0xD9]);
    }

    #[test]
    fn overflow_poisons_the_demuxer() {
        let mut demuxer = FrameDemuxer::new(64);
        demuxer.feed(&SOI).expect("feed");
        demuxer.feed(&[0x55; 40]).expect("feed");
        assert!(demuxer.drain_frames().expect("drain").is_empty());

        demuxer.feed(&[0x55; 40]).expect("feed");
        assert!(matches!(
            demuxer.drain_frames(),
            Err(DemuxError::Overflow { limit: 64, .. })
        ));
        assert!(demuxer.is_poisoned());
        assert_eq!(demuxer.feed(&EOI), Err(DemuxError::Poisoned));
        assert_eq!(demuxer.drain_frames(), Err(DemuxError::Poisoned));
    }

    #[test]
    fn oversized_complete_frame_overflows_in_one_chunk() {
        let mut demuxer = FrameDemuxer::new(64);
        let data = fake_jpeg(&[0x55; 100]);
        assert!(matches!(demuxer.push(&data), Err(DemuxError::Overflow { .. })));
    }

    #[test]
    fn noise_does_not_count_towards_overflow() {
        let mut demuxer = FrameDemuxer::new(64);
        for _ in 0..10 {
            assert!(demuxer.push(&[0x00; 50]).expect("push").is_empty());
        }
        let frames = demuxer.push(&fake_jpeg(b"ok")).expect("push");
        assert_eq!(frames.len(), 1);
    }
}
