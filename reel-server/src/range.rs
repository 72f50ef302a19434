//! HTTP `Range` header parsing and resolution.
//!
//! Only single-part responses are served: a multi-range header is honored by
//! its first spec. Malformed syntax and unsatisfiable ranges are distinct
//! failures so the handler can answer 400 versus 416.

use crate::error::PlayerError;

/// One byte-range spec from a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `start-end`, both inclusive.
    FromTo {
        /// First byte offset.
        start: u64,
        /// Last byte offset, inclusive.
        end: u64,
    },
    /// `start-`, to the end of the stream.
    From {
        /// First byte offset.
        start: u64,
    },
    /// `-len`, the final `len` bytes.
    Suffix {
        /// Number of trailing bytes.
        len: u64,
    },
}

/// A range resolved against a concrete stream size. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset, inclusive.
    pub end: u64,
}

impl ResolvedRange {
    /// Number of bytes the range covers.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false for a resolved range; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Parse a `Range` header value, keeping the first spec.
pub fn parse_range_header(value: &str) -> Result<RangeSpec, PlayerError> {
    let malformed = || PlayerError::MalformedRange(value.to_string());

    let rest = value
        .trim()
        .strip_prefix("bytes")
        .and_then(|r| r.trim_start().strip_prefix('='))
        .ok_or_else(malformed)?;

    let first = rest.split(',').next().ok_or_else(malformed)?.trim();
    if first.is_empty() {
        return Err(malformed());
    }

    if let Some(suffix) = first.strip_prefix('-') {
        let len: u64 = suffix.trim().parse().map_err(|_| malformed())?;
        return Ok(RangeSpec::Suffix { len });
    }

    let (start_s, end_s) = first.split_once('-').ok_or_else(malformed)?;
    let start: u64 = start_s.trim().parse().map_err(|_| malformed())?;

    let end_s = end_s.trim();
    if end_s.is_empty() {
        return Ok(RangeSpec::From { start });
    }

    let end: u64 = end_s.parse().map_err(|_| malformed())?;
    if end < start {
        return Err(malformed());
    }
    Ok(RangeSpec::FromTo { start, end })
}

/// Resolve a spec against the stream size.
pub fn resolve(spec: RangeSpec, size: u64) -> Result<ResolvedRange, PlayerError> {
    if size == 0 {
        return Err(PlayerError::UnsatisfiableRange);
    }

    let (start, end) = match spec {
        RangeSpec::FromTo { start, end } => (start, end.min(size - 1)),
        RangeSpec::From { start } => (start, size - 1),
        RangeSpec::Suffix { len } => {
            if len == 0 {
                return Err(PlayerError::UnsatisfiableRange);
            }
            (size.saturating_sub(len), size - 1)
        }
    };

    if start >= size {
        return Err(PlayerError::UnsatisfiableRange);
    }
    Ok(ResolvedRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounded_range() {
        assert_eq!(
            parse_range_header("bytes=0-19").unwrap(),
            RangeSpec::FromTo { start: 0, end: 19 }
        );
    }

    #[test]
    fn parses_open_and_suffix_ranges() {
        assert_eq!(
            parse_range_header("bytes=100-").unwrap(),
            RangeSpec::From { start: 100 }
        );
        assert_eq!(
            parse_range_header("bytes=-500").unwrap(),
            RangeSpec::Suffix { len: 500 }
        );
    }

    #[test]
    fn first_spec_of_multi_range_wins() {
        assert_eq!(
            parse_range_header("bytes=0-9, 20-29").unwrap(),
            RangeSpec::FromTo { start: 0, end: 9 }
        );
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["bytes", "bytes=", "items=0-9", "bytes=a-b", "bytes=9-1", "bytes=--5"] {
            assert!(
                matches!(parse_range_header(bad), Err(PlayerError::MalformedRange(_))),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn resolve_clamps_end_to_size() {
        let r = resolve(RangeSpec::FromTo { start: 10, end: 999 }, 100).unwrap();
        assert_eq!(r, ResolvedRange { start: 10, end: 99 });
        assert_eq!(r.len(), 90);
    }

    #[test]
    fn resolve_suffix() {
        let r = resolve(RangeSpec::Suffix { len: 30 }, 100).unwrap();
        assert_eq!(r, ResolvedRange { start: 70, end: 99 });

        // Suffix longer than the stream covers the whole stream.
        let r = resolve(RangeSpec::Suffix { len: 500 }, 100).unwrap();
        assert_eq!(r, ResolvedRange { start: 0, end: 99 });
    }

    #[test]
    fn resolve_rejects_unsatisfiable() {
        assert!(matches!(
            resolve(RangeSpec::From { start: 100 }, 100),
            Err(PlayerError::UnsatisfiableRange)
        ));
        assert!(matches!(
            resolve(RangeSpec::Suffix { len: 0 }, 100),
            Err(PlayerError::UnsatisfiableRange)
        ));
        assert!(matches!(
            resolve(RangeSpec::From { start: 0 }, 0),
            Err(PlayerError::UnsatisfiableRange)
        ));
    }
}
