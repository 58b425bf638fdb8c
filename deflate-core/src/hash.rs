/// Stable 32-bit hash of a field name or map key (CRC-32/ISO-HDLC).
///
/// Used both when compiling struct layouts and when building maps at
/// deserialization time; readers of produced instances must use the same
/// function to look keys up.
#[inline]
pub fn name_hash(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        deflate_testhelpers::setup();
        assert_eq!(name_hash(""), 0);
        assert_eq!(name_hash("123456789"), 0xCBF4_3926);
    }

    #[test]
    fn known_collision() {
        deflate_testhelpers::setup();
        // Distinct names sharing a hash; collision handling is tested with these.
        assert_eq!(name_hash("plumless"), name_hash("buckeroo"));
    }
}
