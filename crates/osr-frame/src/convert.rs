//! Pixel format conversion

/// Every frame uses 4 bytes per pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Copy `src` (BGRA) into `dst` as RGBA.
///
/// `dst` is resized to `src.len()`. A trailing partial pixel is copied
/// verbatim.
pub fn bgra_to_rgba(src: &[u8], dst: &mut Vec<u8>) {
    dst.clear();
    dst.extend_from_slice(src);
    bgra_to_rgba_in_place(dst);
}

/// Swap bytes 0 and 2 of every pixel; green and alpha stay put.
pub fn bgra_to_rgba_in_place(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_pixel_frame() {
        let mut out = Vec::new();
        bgra_to_rgba(&[10, 20, 30, 40, 50, 60, 70, 80], &mut out);
        assert_eq!(out, vec![30, 20, 10, 40, 70, 60, 50, 80]);
    }

    #[test]
    fn test_green_and_alpha_untouched() {
        let src: Vec<u8> = (0..=255).collect();
        let mut out = Vec::new();
        bgra_to_rgba(&src, &mut out);

        assert_eq!(out.len(), src.len());
        for (i, byte) in out.iter().enumerate() {
            match i % 4 {
                0 => assert_eq!(*byte, src[i + 2]),
                2 => assert_eq!(*byte, src[i - 2]),
                _ => assert_eq!(*byte, src[i]),
            }
        }
    }

    #[test]
    fn test_reuses_destination() {
        let mut out = vec![0xAA; 64];
        bgra_to_rgba(&[1, 2, 3, 4], &mut out);
        assert_eq!(out, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_empty() {
        let mut out = vec![1, 2, 3];
        bgra_to_rgba(&[], &mut out);
        assert!(out.is_empty());
    }
}
