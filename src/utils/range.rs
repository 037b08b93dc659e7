/// Outcome of parsing a `Range` header against a known payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Inclusive span clamped to the payload.
    Satisfiable { start: u64, end: u64 },
    /// Syntactically a byte range, but nothing in it can be served.
    Unsatisfiable,
    /// Not a byte range we understand; callers should fall back to a full response.
    NotARange,
}

/// Parse a single-span `Range: bytes=a-b` header. Multi-range requests are
/// treated as `NotARange` and answered with the full payload.
pub fn parse_byte_range(header: &str, size: u64) -> ByteRange {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::NotARange;
    };
    if ranges.contains(',') {
        return ByteRange::NotARange;
    }
    let Some((start_raw, end_raw)) = ranges.split_once('-') else {
        return ByteRange::NotARange;
    };
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    if start_raw.is_empty() {
        // Suffix form: bytes=-n, the final n bytes.
        let Ok(suffix) = end_raw.parse::<u64>() else {
            return ByteRange::NotARange;
        };
        if suffix == 0 || size == 0 {
            return ByteRange::Unsatisfiable;
        }
        let len = suffix.min(size);
        return ByteRange::Satisfiable {
            start: size - len,
            end: size - 1,
        };
    }

    let Ok(start) = start_raw.parse::<u64>() else {
        return ByteRange::NotARange;
    };
    if start >= size {
        return ByteRange::Unsatisfiable;
    }

    let end = if end_raw.is_empty() {
        size - 1
    } else {
        match end_raw.parse::<u64>() {
            Ok(end) => end.min(size - 1),
            Err(_) => return ByteRange::NotARange,
        }
    };

    if end < start {
        return ByteRange::Unsatisfiable;
    }

    ByteRange::Satisfiable { start, end }
}
