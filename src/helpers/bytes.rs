//! Little-endian field access over byte slices.
//! Every accessor is bounds-checked so that truncated legacy workbooks surface as errors instead of panics.

/// Little-endian reads at a byte offset.
pub(crate) trait LittleEndian {
    /// Reads `N` bytes starting at `offset`, or None when the slice is too short.
    fn array_at<const N: usize>(&self, offset: usize) -> Option<[u8; N]>;

    fn u16_at(&self, offset: usize) -> Option<u16> {
        self.array_at(offset).map(u16::from_le_bytes)
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        self.array_at(offset).map(u32::from_le_bytes)
    }

    fn u64_at(&self, offset: usize) -> Option<u64> {
        self.array_at(offset).map(u64::from_le_bytes)
    }

    fn f64_at(&self, offset: usize) -> Option<f64> {
        self.array_at(offset).map(f64::from_le_bytes)
    }

    /// Reads a 32-bit sector or record pointer as usize.
    fn usize_at(&self, offset: usize) -> Option<usize> {
        self.u32_at(offset).map(|value| value as usize)
    }
}

impl LittleEndian for [u8] {
    #[inline]
    fn array_at<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.get(offset..end)?.try_into().ok()
    }
}

/// Splits a byte slice into 32-bit little-endian pointers; a trailing partial chunk is ignored.
pub(crate) fn pointers(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let bytes = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(bytes.u16_at(0), Some(0x0201));
        assert_eq!(bytes.u32_at(4), Some(0x0807_0605));
        assert_eq!(bytes.u64_at(0), Some(0x0807_0605_0403_0201));
        assert_eq!(bytes.usize_at(0), Some(0x0403_0201));
    }

    #[test]
    fn short_slices_yield_none() {
        let bytes = [0x01u8, 0x02, 0x03];
        assert_eq!(bytes.u32_at(0), None);
        assert_eq!(bytes.u16_at(2), None);
        assert_eq!(bytes.u16_at(usize::MAX), None);
    }

    #[test]
    fn reads_doubles() {
        let bytes = 12.5f64.to_le_bytes();
        assert_eq!(bytes.f64_at(0), Some(12.5));
    }

    #[test]
    fn pointers_ignore_partial_chunk() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0, 9];
        assert_eq!(pointers(&bytes).collect::<Vec<_>>(), vec![1, 2]);
    }
}
