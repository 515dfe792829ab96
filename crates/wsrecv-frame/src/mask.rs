//! Payload masking.
//!
//! Masking XORs every payload byte with one byte of a 4-byte key, cycling
//! through the key. The operation is its own inverse.

/// XOR `buf` with `key`, starting at key offset `pos % 4`.
///
/// Returns the key offset for the byte following `buf`, so a frame's payload
/// may be (un)masked in arbitrarily sized chunks.
pub fn apply_mask(key: [u8; 4], pos: usize, buf: &mut [u8]) -> usize {
    let start = pos % 4;
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[(start + i) % 4];
    }
    (start + buf.len()) % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    #[test]
    fn rfc_sample_unmasks() {
        // "Hello" masked with 37 fa 21 3d.
        let mut data = [0x7f, 0x9f, 0x4d, 0x51, 0x58];
        apply_mask(KEY, 0, &mut data);
        assert_eq!(&data, b"Hello");
    }

    #[test]
    fn mask_then_unmask_is_identity() {
        for len in [0usize, 1, 3, 4, 5, 17, 1024] {
            let original: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let mut data = original.clone();
            apply_mask(KEY, 0, &mut data);
            if len > 0 {
                assert_ne!(data, original);
            }
            apply_mask(KEY, 0, &mut data);
            assert_eq!(data, original);
        }
    }

    #[test]
    fn chunked_matches_whole() {
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();

        let mut whole = original.clone();
        apply_mask(KEY, 0, &mut whole);

        let mut chunked = original.clone();
        let mut pos = 0;
        for chunk in chunked.chunks_mut(3) {
            pos = apply_mask(KEY, pos, chunk);
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn returned_offset_wraps() {
        let mut data = [0u8; 6];
        assert_eq!(apply_mask(KEY, 0, &mut data), 2);
        assert_eq!(apply_mask(KEY, 3, &mut data[..1]), 0);
        assert_eq!(apply_mask(KEY, 1, &mut []), 1);
    }
}
