//! Bitmap / ID-range codec.
//!
//! Object indices (PG or queue numbers 0..31) are kept as a `u32` bitmap
//! internally; the compact textual range form ("0-2,5-6") is purely a
//! serialization concern at the store boundary. Complement, merge and
//! split during reclaim bookkeeping are plain bit operations on the
//! canonical form.

/// Parses a single ID or ID range ("3", "3-4") into an inclusive pair.
///
/// Returns `None` for malformed or reversed ranges and indices >= 32.
pub fn parse_id_range(s: &str) -> Option<(u8, u8)> {
    let s = s.trim();
    let (lo, hi) = match s.split_once('-') {
        Some((lo, hi)) => (lo.trim().parse::<u8>().ok()?, hi.trim().parse::<u8>().ok()?),
        None => {
            let id = s.parse::<u8>().ok()?;
            (id, id)
        }
    };
    if lo > hi || hi >= 32 {
        return None;
    }
    Some((lo, hi))
}

/// Bitmap of one inclusive ID range.
pub fn range_to_bitmap(lo: u8, hi: u8) -> u32 {
    let mut bitmap = 0u32;
    for i in lo..=hi {
        bitmap |= 1 << i;
    }
    bitmap
}

/// Parses a comma-separated list of IDs and ranges ("0-2,5-6") into a
/// bitmap. Malformed pieces yield `None`.
pub fn ids_to_bitmap(s: &str) -> Option<u32> {
    let mut bitmap = 0u32;
    for piece in s.split(',') {
        if piece.trim().is_empty() {
            continue;
        }
        let (lo, hi) = parse_id_range(piece)?;
        bitmap |= range_to_bitmap(lo, hi);
    }
    Some(bitmap)
}

/// Decomposes a bitmap into maximal contiguous inclusive ranges.
pub fn bitmap_to_ranges(bitmap: u32) -> Vec<(u8, u8)> {
    let mut ranges = Vec::new();
    let mut i = 0u8;
    while i < 32 {
        if bitmap & (1 << i) != 0 {
            let lo = i;
            while i < 31 && bitmap & (1 << (i + 1)) != 0 {
                i += 1;
            }
            ranges.push((lo, i));
        }
        i += 1;
    }
    ranges
}

/// Serializes one inclusive range ("3" or "3-4").
pub fn range_to_string(lo: u8, hi: u8) -> String {
    if lo == hi {
        lo.to_string()
    } else {
        format!("{}-{}", lo, hi)
    }
}

/// Serializes a bitmap into the compact comma/range form ("0-2,5-6").
pub fn bitmap_to_string(bitmap: u32) -> String {
    bitmap_to_ranges(bitmap)
        .into_iter()
        .map(|(lo, hi)| range_to_string(lo, hi))
        .collect::<Vec<_>>()
        .join(",")
}

/// Serialized maximal ranges of a bitmap, one string per range.
pub fn bitmap_range_strings(bitmap: u32) -> Vec<String> {
    bitmap_to_ranges(bitmap)
        .into_iter()
        .map(|(lo, hi)| range_to_string(lo, hi))
        .collect()
}

/// Tests whether the set bits of a bitmap form one contiguous run.
pub fn is_contiguous(bitmap: u32) -> bool {
    if bitmap == 0 {
        return true;
    }
    let shifted = bitmap >> bitmap.trailing_zeros();
    (shifted & (shifted + 1)) == 0
}

/// Bitmap with the lowest `count` bits set (the full supported-object set).
pub fn full_bitmap(count: u32) -> u32 {
    match count {
        0 => 0,
        n if n >= 32 => u32::MAX,
        n => (1u32 << n) - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_range() {
        assert_eq!(parse_id_range("3"), Some((3, 3)));
        assert_eq!(parse_id_range("3-4"), Some((3, 4)));
        assert_eq!(parse_id_range(" 3 - 4 "), Some((3, 4)));
        assert_eq!(parse_id_range("4-3"), None);
        assert_eq!(parse_id_range("32"), None);
        assert_eq!(parse_id_range("x"), None);
        assert_eq!(parse_id_range(""), None);
    }

    #[test]
    fn test_ids_to_bitmap() {
        assert_eq!(ids_to_bitmap("3-4"), Some(0b0001_1000));
        assert_eq!(ids_to_bitmap("0-2,5-6"), Some(0b0110_0111));
        assert_eq!(ids_to_bitmap("0,1,2"), Some(0b0000_0111));
        assert_eq!(ids_to_bitmap(""), Some(0));
        assert_eq!(ids_to_bitmap("7,bogus"), None);
    }

    #[test]
    fn test_bitmap_to_string() {
        assert_eq!(bitmap_to_string(0b0110_0111), "0-2,5-6");
        assert_eq!(bitmap_to_string(0b0000_1000), "3");
        assert_eq!(bitmap_to_string(0), "");
        assert_eq!(bitmap_to_string(u32::MAX), "0-31");
    }

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous(0));
        assert!(is_contiguous(0b0001_1000));
        assert!(is_contiguous(1 << 31));
        assert!(!is_contiguous(0b0010_1000));
    }

    #[test]
    fn test_full_bitmap() {
        assert_eq!(full_bitmap(0), 0);
        assert_eq!(full_bitmap(8), 0xFF);
        assert_eq!(full_bitmap(32), u32::MAX);
        assert_eq!(full_bitmap(40), u32::MAX);
    }

    #[test]
    fn test_round_trip_exhaustive() {
        // Every subset of {0..7}: serialize and parse back.
        for bitmap in 0u32..256 {
            let s = bitmap_to_string(bitmap);
            assert_eq!(ids_to_bitmap(&s), Some(bitmap), "bitmap {:#b} via {:?}", bitmap, s);
        }
    }

    #[test]
    fn test_complement_merge_split() {
        // Configured 3-4 out of 8 supported: complement is 0-2,5-7.
        let configured = ids_to_bitmap("3-4").unwrap();
        let complement = full_bitmap(8) ^ configured;
        assert_eq!(bitmap_to_string(complement), "0-2,5-7");

        // Deleting the configured range coalesces back into one run.
        let merged = complement | configured;
        assert_eq!(bitmap_to_string(merged), "0-7");
        assert!(is_contiguous(merged));

        // Inserting a range in the middle splits a run.
        let split = merged & !ids_to_bitmap("2-5").unwrap();
        assert_eq!(bitmap_to_string(split), "0-1,6-7");
    }
}
