//! Page header layout and checksum helpers.
//!
//! Every page starts with a 64-byte [`PageHeader`] containing metadata:
//! - page id, so a misdirected read is detectable
//! - LSN for WAL ordering (stamped by callers)
//! - CRC32 checksum for integrity
//! - free-space counter, dirty byte and an opaque type tag

use crate::common::config::{PAGE_DATA_SIZE, PAGE_HEADER_SIZE};
use crate::common::PageId;

/// Metadata stored at the beginning of every page.
///
/// # Layout (64 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     page_id
/// 4       8     lsn
/// 12      4     pin_count (meaningless once persisted)
/// 16      4     checksum (CRC32)
/// 20      2     free_space
/// 22      1     is_dirty
/// 23      1     page_type (opaque tag)
/// 24      40    reserved (zero)
/// ```
///
/// # Checksum
/// The checksum is computed over the entire page with the checksum field
/// itself treated as zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Id of the page this image belongs to.
    pub page_id: PageId,
    /// Log Sequence Number of last modification.
    pub lsn: u64,
    /// Pin count at the time the header was written.
    pub pin_count: u32,
    /// CRC32 checksum of the page contents.
    pub checksum: u32,
    /// Free bytes remaining in the payload.
    pub free_space: u16,
    /// Whether the page was modified since its last flush.
    pub is_dirty: bool,
    /// Type tag owned by higher layers.
    pub page_type: u8,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = PAGE_HEADER_SIZE;

    /// Offset of each field within the header.
    pub const OFFSET_PAGE_ID: usize = 0;
    pub const OFFSET_LSN: usize = 4;
    pub const OFFSET_PIN_COUNT: usize = 12;
    pub const OFFSET_CHECKSUM: usize = 16;
    pub const OFFSET_FREE_SPACE: usize = 20;
    pub const OFFSET_DIRTY: usize = 22;
    pub const OFFSET_PAGE_TYPE: usize = 23;
    pub const OFFSET_RESERVED: usize = 24;

    /// Header of a freshly reset page: given id, empty payload.
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            free_space: PAGE_DATA_SIZE as u16,
            ..Self::default()
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        Self {
            page_id: PageId::new(read_u32(data, Self::OFFSET_PAGE_ID)),
            lsn: read_u64(data, Self::OFFSET_LSN),
            pin_count: read_u32(data, Self::OFFSET_PIN_COUNT),
            checksum: read_u32(data, Self::OFFSET_CHECKSUM),
            free_space: read_u16(data, Self::OFFSET_FREE_SPACE),
            is_dirty: data[Self::OFFSET_DIRTY] != 0,
            page_type: data[Self::OFFSET_PAGE_TYPE],
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// The reserved bytes are zeroed.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        write_u32(data, Self::OFFSET_PAGE_ID, self.page_id.0);
        write_u64(data, Self::OFFSET_LSN, self.lsn);
        write_u32(data, Self::OFFSET_PIN_COUNT, self.pin_count);
        write_u32(data, Self::OFFSET_CHECKSUM, self.checksum);
        write_u16(data, Self::OFFSET_FREE_SPACE, self.free_space);
        data[Self::OFFSET_DIRTY] = self.is_dirty as u8;
        data[Self::OFFSET_PAGE_TYPE] = self.page_type;
        data[Self::OFFSET_RESERVED..Self::SIZE].fill(0);
    }

    /// Compute CRC32 checksum of a page.
    ///
    /// The checksum field (bytes 16-19) is fed as zeros, so the checksum
    /// doesn't include itself.
    ///
    /// # Arguments
    /// * `page_data` - The full page data (PAGE_SIZE bytes)
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();

        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);

        // Skip checksum field by feeding zeros instead
        hasher.update(&[0u8; 4]);

        hasher.update(&page_data[Self::OFFSET_CHECKSUM + 4..]);

        hasher.finalize()
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, page_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page_data)
    }
}

#[inline]
pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PAGE_SIZE;
    use proptest::prelude::*;

    #[test]
    fn test_page_header_new() {
        let header = PageHeader::new(PageId::new(9));
        assert_eq!(header.page_id, PageId::new(9));
        assert_eq!(header.free_space, 4032);
        assert_eq!(header.checksum, 0);
        assert_eq!(header.lsn, 0);
        assert!(!header.is_dirty);
    }

    #[test]
    fn test_page_header_default() {
        let header = PageHeader::default();
        assert_eq!(header.page_id, PageId::INVALID);
        assert_eq!(header.free_space, 0);
        assert_eq!(header.page_type, 0);
    }

    #[test]
    fn test_page_header_byte_layout() {
        let header = PageHeader {
            page_id: PageId::new(0x04030201),
            lsn: 0x0807060504030201,
            pin_count: 3,
            checksum: 0xDEADBEEF,
            free_space: 0x0102,
            is_dirty: true,
            page_type: 7,
        };

        let mut buffer = [0xFFu8; PageHeader::SIZE];
        header.write_to(&mut buffer);

        assert_eq!(&buffer[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(buffer[4], 0x01); // lsn byte 0 (LSB)
        assert_eq!(buffer[11], 0x08); // lsn byte 7 (MSB)
        assert_eq!(&buffer[12..16], &[3, 0, 0, 0]);
        assert_eq!(&buffer[16..20], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&buffer[20..22], &[0x02, 0x01]);
        assert_eq!(buffer[22], 1);
        assert_eq!(buffer[23], 7);
        assert!(buffer[24..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_header_roundtrip() {
        let original = PageHeader {
            page_id: PageId::new(77),
            lsn: 0x123456789ABCDEF0,
            pin_count: 0,
            checksum: 0xCAFEBABE,
            free_space: 100,
            is_dirty: false,
            page_type: 2,
        };

        let mut buffer = [0u8; PageHeader::SIZE];
        original.write_to(&mut buffer);
        assert_eq!(PageHeader::from_bytes(&buffer), original);
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut page_data = [0u8; PAGE_SIZE];
        page_data[100] = 0xAB;

        let checksum1 = PageHeader::compute_checksum(&page_data);

        page_data[16..20].copy_from_slice(&[0xFF; 4]);

        let checksum2 = PageHeader::compute_checksum(&page_data);

        assert_eq!(checksum1, checksum2);
    }

    #[test]
    fn test_checksum_matches_plain_crc32_with_zeroed_field() {
        let mut page_data = [0u8; PAGE_SIZE];
        page_data[5] = 0x11;
        page_data[4000] = 0x22;

        let expected = crc32fast::hash(&page_data);
        page_data[16..20].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(PageHeader::compute_checksum(&page_data), expected);
    }

    #[test]
    fn test_checksum_verify() {
        let mut page_data = [0u8; PAGE_SIZE];
        page_data[100] = 0xAB;

        let header = PageHeader {
            checksum: PageHeader::compute_checksum(&page_data),
            ..PageHeader::default()
        };

        assert!(header.verify_checksum(&page_data));

        page_data[100] = 0xFF;
        assert!(!header.verify_checksum(&page_data));
    }

    proptest! {
        #[test]
        fn prop_any_single_byte_flip_changes_checksum(
            offset in 0usize..PAGE_SIZE,
            flip in 1u8..=255,
            seed in any::<u8>(),
        ) {
            prop_assume!(!(PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4).contains(&offset));

            let mut page_data = [seed; PAGE_SIZE];
            let before = PageHeader::compute_checksum(&page_data);
            page_data[offset] ^= flip;
            prop_assert_ne!(PageHeader::compute_checksum(&page_data), before);
        }
    }
}
