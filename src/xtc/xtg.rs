//! XTG page encoding
//!
//! One page is a 22-byte header followed by a 1-bit bitmap, rows packed
//! MSB first with a stride of `ceil(width / 8)` bytes. A set bit is white.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use md5::{Digest, Md5};
use std::io::Write;

use super::types::{ensure_len, Result, XtcError, DIGEST_LEN, XTG_HEADER_SIZE, XTG_MAGIC};

/// Bytes per packed row
pub fn stride(width: u16) -> usize {
    (width as usize).div_ceil(8)
}

/// First 8 bytes of the payload MD5
pub fn payload_digest(payload: &[u8]) -> [u8; DIGEST_LEN] {
    let full = Md5::digest(payload);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&full[..DIGEST_LEN]);
    digest
}

/// Pack a grayscale page; pixels `>= threshold` become 1 (white)
pub fn pack_bits(gray: &GrayImage, threshold: u8) -> Vec<u8> {
    let row_bytes = (gray.width() as usize).div_ceil(8);
    let mut data = vec![0u8; row_bytes * gray.height() as usize];

    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] >= threshold {
            let index = y as usize * row_bytes + x as usize / 8;
            data[index] |= 0x80 >> (x % 8);
        }
    }
    data
}

// ============================================================
// Encoded Blob
// ============================================================

/// An encoded XTG page (header + payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XtgBlob {
    width: u16,
    height: u16,
    bytes: Vec<u8>,
}

impl XtgBlob {
    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Encoded bytes including the header
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Encoded length including the header
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Packed bitmap without the header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[XTG_HEADER_SIZE..]
    }

    /// Stored digest
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&self.bytes[14..XTG_HEADER_SIZE]);
        digest
    }
}

/// Encode a page at the declared size.
///
/// A page of any other size is resized with Lanczos3 first.
pub fn encode_page(page: &GrayImage, width: u32, height: u32, threshold: u8) -> Result<XtgBlob> {
    if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(XtcError::InvalidDimensions { width, height });
    }

    let resized;
    let page = if page.dimensions() != (width, height) {
        tracing::warn!(
            "Page is {}x{}, resizing to {}x{}",
            page.width(),
            page.height(),
            width,
            height
        );
        resized = imageops::resize(page, width, height, FilterType::Lanczos3);
        &resized
    } else {
        page
    };

    let payload = pack_bits(page, threshold);
    let digest = payload_digest(&payload);

    let mut bytes = Vec::with_capacity(XTG_HEADER_SIZE + payload.len());
    bytes.write_all(&XTG_MAGIC)?;
    bytes.write_u16::<LittleEndian>(width as u16)?;
    bytes.write_u16::<LittleEndian>(height as u16)?;
    bytes.write_u8(0)?; // color mode
    bytes.write_u8(0)?; // compression
    bytes.write_u32::<LittleEndian>(payload.len() as u32)?;
    bytes.write_all(&digest)?;
    bytes.write_all(&payload)?;

    Ok(XtgBlob {
        width: width as u16,
        height: height as u16,
        bytes,
    })
}

// ============================================================
// Decoded Page
// ============================================================

/// A decoded, validated XTG page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XtgPage {
    pub width: u16,
    pub height: u16,
    /// Packed rows, `stride(width) * height` bytes
    pub bitmap: Vec<u8>,
    pub digest: [u8; DIGEST_LEN],
}

impl XtgPage {
    /// Parse and validate an XTG blob
    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, XTG_HEADER_SIZE, "XTG header")?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != XTG_MAGIC {
            return Err(XtcError::BadMagic {
                what: "XTG",
                found: magic,
            });
        }

        let width = LittleEndian::read_u16(&data[4..6]);
        let height = LittleEndian::read_u16(&data[6..8]);
        let (color_mode, compression) = (data[8], data[9]);
        if color_mode != 0 || compression != 0 {
            return Err(XtcError::UnsupportedEncoding {
                color_mode,
                compression,
            });
        }

        let declared = LittleEndian::read_u32(&data[10..14]) as usize;
        let expected = stride(width) * height as usize;
        if declared != expected {
            return Err(XtcError::PayloadSize { declared, expected });
        }
        ensure_len(data, XTG_HEADER_SIZE + expected, "XTG payload")?;

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&data[14..XTG_HEADER_SIZE]);
        let bitmap = data[XTG_HEADER_SIZE..XTG_HEADER_SIZE + expected].to_vec();

        // All-zero digest means none was recorded
        if digest != [0u8; DIGEST_LEN] {
            let computed = payload_digest(&bitmap);
            if computed != digest {
                return Err(XtcError::DigestMismatch {
                    stored: digest,
                    computed,
                });
            }
        }

        Ok(Self {
            width,
            height,
            bitmap,
            digest,
        })
    }

    /// Bytes per packed row
    pub fn stride(&self) -> usize {
        stride(self.width)
    }

    /// Bit at `(x, y)`; true is white
    pub fn is_white(&self, x: u32, y: u32) -> bool {
        let index = y as usize * self.stride() + x as usize / 8;
        self.bitmap[index] & (0x80 >> (x % 8)) != 0
    }

    /// Unpack to a 0/255 grayscale image
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([if self.is_white(x, y) { 255 } else { 0 }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if (x + y) % 2 == 0 { 255 } else { 0 }])
        })
    }

    // XG-001: header layout
    #[test]
    fn test_encode_header() {
        let blob = encode_page(&checker(13, 5), 13, 5, 200).unwrap();
        let bytes = blob.as_bytes();

        assert_eq!(&bytes[..4], b"XTG\0");
        assert_eq!(LittleEndian::read_u16(&bytes[4..]), 13);
        assert_eq!(LittleEndian::read_u16(&bytes[6..]), 5);
        assert_eq!(bytes[8], 0);
        assert_eq!(bytes[9], 0);
        assert_eq!(LittleEndian::read_u32(&bytes[10..]), 10);
        assert_eq!(blob.len(), XTG_HEADER_SIZE + 10);
        assert_eq!(blob.digest(), payload_digest(blob.payload()));
    }

    // XG-002: MSB-first packing, white is 1
    #[test]
    fn test_pack_bits_msb_first() {
        let mut gray = GrayImage::from_pixel(10, 1, Luma([0]));
        gray.put_pixel(0, 0, Luma([255]));
        gray.put_pixel(9, 0, Luma([200]));

        assert_eq!(pack_bits(&gray, 200), vec![0b1000_0000, 0b0100_0000]);
    }

    #[test]
    fn test_threshold() {
        let gray = GrayImage::from_pixel(8, 1, Luma([199]));
        assert_eq!(pack_bits(&gray, 200), vec![0]);
        assert_eq!(pack_bits(&gray, 199), vec![0xFF]);
    }

    // XG-003: decode restores the bilevel page bit for bit
    #[test]
    fn test_decode_restores_page() {
        let page = checker(21, 7);
        let blob = encode_page(&page, 21, 7, 128).unwrap();
        let decoded = XtgPage::parse(blob.as_bytes()).unwrap();

        assert_eq!(decoded.stride(), 3);
        assert_eq!(decoded.to_image(), page);
    }

    #[test]
    fn test_encode_resizes_mismatched_page() {
        let page = GrayImage::from_pixel(20, 40, Luma([255]));
        let blob = encode_page(&page, 10, 20, 200).unwrap();

        assert_eq!((blob.width(), blob.height()), (10, 20));
        assert_eq!(blob.payload().len(), 2 * 20);
    }

    #[test]
    fn test_encode_rejects_oversize() {
        let page = GrayImage::new(1, 1);
        assert!(matches!(
            encode_page(&page, 70_000, 10, 200),
            Err(XtcError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_parse_digest_mismatch() {
        let blob = encode_page(&checker(8, 2), 8, 2, 128).unwrap();
        let mut bytes = blob.into_bytes();
        bytes[XTG_HEADER_SIZE] ^= 0xFF;

        assert!(matches!(
            XtgPage::parse(&bytes),
            Err(XtcError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_zero_digest_accepted() {
        let blob = encode_page(&checker(8, 2), 8, 2, 128).unwrap();
        let mut bytes = blob.into_bytes();
        bytes[14..XTG_HEADER_SIZE].fill(0);
        bytes[XTG_HEADER_SIZE] ^= 0xFF;

        assert!(XtgPage::parse(&bytes).is_ok());
    }

    #[test]
    fn test_parse_payload_size_mismatch() {
        let blob = encode_page(&checker(8, 2), 8, 2, 128).unwrap();
        let mut bytes = blob.into_bytes();
        LittleEndian::write_u32(&mut bytes[10..14], 3);

        assert!(matches!(
            XtgPage::parse(&bytes),
            Err(XtcError::PayloadSize {
                declared: 3,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_parse_truncated_payload() {
        let blob = encode_page(&checker(16, 4), 16, 4, 128).unwrap();
        let bytes = blob.as_bytes();

        assert!(matches!(
            XtgPage::parse(&bytes[..bytes.len() - 1]),
            Err(XtcError::Truncated { .. })
        ));
    }
}
