//! Parsing of `Range: bytes=...` request headers

/// A satisfiable byte range within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset
    pub start: u64,
    /// Number of bytes
    pub length: u64,
}

impl ByteRange {
    /// Offset of the last byte in the range.
    pub fn end(&self) -> u64 {
        self.start + self.length - 1
    }

    /// The `Content-Range` value for this range within a resource of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end(), size)
    }
}

/// Why a range header could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// The header is not a valid `bytes` range set
    #[error("invalid range")]
    Invalid,

    /// Every requested range lies outside the resource
    #[error("invalid range: failed to overlap")]
    NoOverlap,
}

/// Parse a `Range` header against a resource of `size` bytes.
///
/// Returns the satisfiable ranges in request order. Ranges starting at or past
/// the end of the resource are dropped, and ends are clamped to the last byte.
/// An empty header yields no ranges.
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let Some(set) = header.strip_prefix("bytes=") else {
        return Err(RangeError::Invalid);
    };

    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for part in set.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (first, last) = part.split_once('-').ok_or(RangeError::Invalid)?;
        let (first, last) = (first.trim(), last.trim());

        let range = if first.is_empty() {
            // Suffix range: the final `last` bytes.
            if last.is_empty() || last.starts_with('-') {
                return Err(RangeError::Invalid);
            }
            let suffix = parse_offset(last)?.min(size);
            ByteRange {
                start: size - suffix,
                length: suffix,
            }
        } else {
            let start = parse_offset(first)?;
            if start >= size {
                no_overlap = true;
                continue;
            }

            let length = if last.is_empty() {
                size - start
            } else {
                let end = parse_offset(last)?;
                if start > end {
                    return Err(RangeError::Invalid);
                }
                end.min(size - 1) - start + 1
            };

            ByteRange { start, length }
        };

        if range.length == 0 {
            no_overlap = true;
            continue;
        }

        ranges.push(range);
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }

    Ok(ranges)
}

fn parse_offset(value: &str) -> Result<u64, RangeError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Invalid);
    }
    value.parse().map_err(|_| RangeError::Invalid)
}

/// Total number of bytes covered by `ranges`, counting overlaps twice.
pub fn total_length(ranges: &[ByteRange]) -> u64 {
    ranges
        .iter()
        .fold(0u64, |total, range| total.saturating_add(range.length))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, length: u64) -> ByteRange {
        ByteRange { start, length }
    }

    #[test]
    fn first_byte() {
        assert_eq!(parse_range("bytes=0-0", 10).unwrap(), vec![range(0, 1)]);
        assert_eq!(range(0, 1).content_range(10), "bytes 0-0/10");
    }

    #[test]
    fn open_and_suffix_ranges() {
        assert_eq!(parse_range("bytes=4-", 10).unwrap(), vec![range(4, 6)]);
        assert_eq!(parse_range("bytes=-3", 10).unwrap(), vec![range(7, 3)]);
        assert_eq!(parse_range("bytes=-30", 10).unwrap(), vec![range(0, 10)]);
    }

    #[test]
    fn end_is_clamped() {
        assert_eq!(parse_range("bytes=5-100", 10).unwrap(), vec![range(5, 5)]);
    }

    #[test]
    fn multiple_ranges_keep_order() {
        assert_eq!(
            parse_range("bytes=6-7, 0-1,,", 10).unwrap(),
            vec![range(6, 2), range(0, 2)]
        );
    }

    #[test]
    fn ranges_past_the_end_do_not_overlap() {
        assert_eq!(parse_range("bytes=10-", 10), Err(RangeError::NoOverlap));
        assert_eq!(parse_range("bytes=-0", 10), Err(RangeError::NoOverlap));
        assert_eq!(parse_range("bytes=0-", 0), Err(RangeError::NoOverlap));
        assert_eq!(
            parse_range("bytes=20-30,2-3", 10).unwrap(),
            vec![range(2, 2)]
        );
    }

    #[test]
    fn malformed_ranges() {
        for header in [
            "bytes",
            "items=0-1",
            "bytes=1",
            "bytes=5-2",
            "bytes=a-b",
            "bytes=--1",
            "bytes=-",
            "bytes=+1-2",
        ] {
            assert_eq!(parse_range(header, 10), Err(RangeError::Invalid), "{header}");
        }
    }

    #[test]
    fn empty_header_means_whole_resource() {
        assert!(parse_range("", 10).unwrap().is_empty());
        assert!(parse_range("bytes=", 10).unwrap().is_empty());
    }

    #[test]
    fn total_length_sums_ranges() {
        assert_eq!(total_length(&[range(0, 5), range(2, 5)]), 10);
    }
}
