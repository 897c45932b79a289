use bytes::Bytes;
use std::iter::FusedIterator;
use std::num::NonZeroUsize;

/// Cuts `message` into radio frames of at most `frame_size` bytes.
///
/// Frames share the message's buffer. The iterator is `Clone`, so a copy
/// taken before consumption replays the same frames.
pub fn split(message: &Bytes, frame_size: NonZeroUsize) -> Frames {
    Frames {
        message: message.clone(),
        frame_size: frame_size.get(),
        offset: 0,
    }
}

#[derive(Debug, Clone)]
pub struct Frames {
    message: Bytes,
    frame_size: usize,
    offset: usize,
}

impl Iterator for Frames {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.message.len() {
            return None;
        }
        let end = (self.offset + self.frame_size).min(self.message.len());
        let frame = self.message.slice(self.offset..end);
        self.offset = end;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.message.len() - self.offset).div_ceil(self.frame_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames {}
impl FusedIterator for Frames {}
