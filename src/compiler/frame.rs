//! Frame slot allocation with scope-bounded lifetimes

use super::ir::types::{align_up, DataType};
use super::ladder::Level;
use crate::error::{Error, Result};

/// Alignment of frames and frame buffers
pub const FRAME_ALIGNMENT: i64 = 16;

/// Allocates slots below the frame pointer
///
/// Slots live at negative offsets from `fp`. Opening a scope records the current depth; closing
/// it frees every slot allocated since. The frame size is the deepest point ever reached.
#[derive(Debug, Default)]
pub struct FrameAllocator {
    depth: i64,
    deepest: i64,
    marks: Vec<i64>,
}

impl FrameAllocator {
    /// Creates an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a slot for one datum and returns its offset
    ///
    /// Integer slots are word-sized: registers hold bytes zero-extended and spill as words.
    pub fn allocate(&mut self, data_type: DataType) -> Result<i64> {
        let slot = spill_type(data_type);
        self.reserve(slot.byte_size(), slot.alignment())
    }

    /// Allocates a buffer and returns the offset of its lowest byte
    pub fn allocate_buffer(&mut self, bytes: i64) -> Result<i64> {
        if bytes < 0 {
            return Err(Error::lowering(
                Level::CC,
                format!("frame buffer of {} bytes", bytes),
                "buffer sizes cannot be negative",
            ));
        }
        self.reserve(bytes, FRAME_ALIGNMENT)
    }

    /// Opens a scope
    pub fn push_scope(&mut self) {
        self.marks.push(self.depth);
    }

    /// Closes the innermost scope, freeing its slots
    pub fn pop_scope(&mut self) {
        if let Some(depth) = self.marks.pop() {
            self.depth = depth;
        }
    }

    /// Bytes needed below `fp` for all slots, aligned to [`FRAME_ALIGNMENT`]
    pub fn size(&self) -> i64 {
        align_up(self.deepest, FRAME_ALIGNMENT)
    }

    fn reserve(&mut self, bytes: i64, alignment: i64) -> Result<i64> {
        let depth = self
            .depth
            .checked_add(bytes)
            .filter(|end| *end <= i64::MAX - FRAME_ALIGNMENT)
            .map(|end| align_up(end, alignment))
            .ok_or_else(|| {
                Error::lowering(
                    Level::CC,
                    format!("frame slot of {} bytes", bytes),
                    "the frame would exceed the addressable range",
                )
            })?;
        self.depth = depth;
        self.deepest = self.deepest.max(depth);
        Ok(-depth)
    }
}

/// Type in which a datum of `data_type` is kept in a frame slot
pub fn spill_type(data_type: DataType) -> DataType {
    match data_type {
        DataType::Cap => DataType::Cap,
        DataType::U8 | DataType::S32 => DataType::S32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_aligned_below_fp() {
        let mut frame = FrameAllocator::new();
        assert_eq!(frame.allocate(DataType::U8), Ok(-4));
        assert_eq!(frame.allocate(DataType::S32), Ok(-8));
        assert_eq!(frame.allocate(DataType::Cap), Ok(-32));
        assert_eq!(frame.size(), 32);
    }

    #[test]
    fn test_scopes_reuse_slots() {
        let mut frame = FrameAllocator::new();
        frame.allocate(DataType::S32).unwrap();
        frame.push_scope();
        let inner = frame.allocate_buffer(24).unwrap();
        frame.pop_scope();
        frame.push_scope();
        assert_eq!(frame.allocate_buffer(24), Ok(inner));
        frame.pop_scope();
        assert_eq!(inner, -32);
        assert_eq!(frame.size(), 32);
    }

    #[test]
    fn test_oversized_buffers_are_rejected() {
        let mut frame = FrameAllocator::new();
        assert!(frame.allocate_buffer(i64::MAX).is_err());
        frame.allocate_buffer(1 << 62).unwrap();
        assert!(matches!(
            frame.allocate_buffer(1 << 62),
            Err(Error::Lowering { level: Level::CC, .. })
        ));
        assert!(frame.allocate_buffer(-1).is_err());
    }
}
