use std::cmp::Ordering;

/// Compares dotted version strings segment by segment as integers.
///
/// Missing segments count as `0`, and so do segments without a leading
/// number, so `"1.2"` equals `"1.2.0"` and `"0.7"` is older than `"0.15"`.
pub fn compare_version(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn segments(version: &str) -> Vec<u64> {
    version.trim().split('.').map(leading_number).collect()
}

fn leading_number(segment: &str) -> u64 {
    let digits: String = segment
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0;
    }
    // Only overflow can fail here.
    digits.parse().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_beat_lexicographic_order() {
        assert_eq!(compare_version("0.7", "0.15"), Ordering::Less);
        assert_eq!(compare_version("0.15", "0.7"), Ordering::Greater);
    }

    #[test]
    fn equal_versions() {
        assert_eq!(compare_version("0.8", "0.8"), Ordering::Equal);
        assert_eq!(compare_version("1.2", "1.2.0"), Ordering::Equal);
    }

    #[test]
    fn longer_version_with_nonzero_tail_is_newer() {
        assert_eq!(compare_version("1.2.1", "1.2"), Ordering::Greater);
        assert_eq!(compare_version("1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn junk_segments_count_as_zero() {
        assert_eq!(compare_version("1.x", "1.0"), Ordering::Equal);
        assert_eq!(compare_version("", "0"), Ordering::Equal);
        assert_eq!(compare_version("2.3beta", "2.3"), Ordering::Equal);
        assert_eq!(compare_version("abc", "0.1"), Ordering::Less);
    }

    #[test]
    fn oversized_segments_saturate() {
        let huge = "1.99999999999999999999999";
        assert_eq!(compare_version(huge, "1.2"), Ordering::Greater);
        assert_eq!(compare_version(huge, huge), Ordering::Equal);
    }
}
