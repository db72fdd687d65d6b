//! Marker protocol spoken by the scanner firmware.
//!
//! The firmware does not frame its traffic beyond fixed ASCII markers:
//! - image payloads arrive between `<I>` and `</I>`
//! - named commands are sent wrapped in `<C>` and `</C>`
//!
//! There are no checksums or acknowledgements; the marker search here is the
//! only structure the byte stream has.

/// Start of an embedded image payload.
pub const IMAGE_START: &[u8] = b"<I>";
/// End of an embedded image payload.
pub const IMAGE_END: &[u8] = b"</I>";
/// Start of a named command envelope.
pub const COMMAND_START: &[u8] = b"<C>";
/// End of a named command envelope.
pub const COMMAND_END: &[u8] = b"</C>";

/// Single-character trigger that starts a fingerprint capture.
pub const CAPTURE_TRIGGER: &[u8] = b"5";

/// Index of the first occurrence of `marker` in `haystack` at or after `from`.
pub fn find_marker(haystack: &[u8], marker: &[u8], from: usize) -> Option<usize> {
    if marker.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|pos| pos + from)
}

/// Wrap a command name in the `<C>..</C>` envelope.
pub fn encode_command(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(COMMAND_START.len() + name.len() + COMMAND_END.len());
    out.extend_from_slice(COMMAND_START);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(COMMAND_END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_marker_returns_first_occurrence() {
        let buf = b"ab<I>cd<I>";
        assert_eq!(find_marker(buf, IMAGE_START, 0), Some(2));
        assert_eq!(find_marker(buf, IMAGE_START, 3), Some(7));
    }

    #[test]
    fn find_marker_handles_short_and_empty_input() {
        assert_eq!(find_marker(b"", IMAGE_START, 0), None);
        assert_eq!(find_marker(b"<I", IMAGE_START, 0), None);
        assert_eq!(find_marker(b"<I>", IMAGE_START, 4), None);
        assert_eq!(find_marker(b"<I>", b"", 0), None);
    }

    #[test]
    fn end_marker_is_not_confused_with_start_marker() {
        let buf = b"</I><I>";
        assert_eq!(find_marker(buf, IMAGE_START, 0), Some(4));
        assert_eq!(find_marker(buf, IMAGE_END, 0), Some(0));
    }

    #[test]
    fn encode_command_wraps_name() {
        assert_eq!(
            encode_command("CheckRegisteredNo"),
            b"<C>CheckRegisteredNo</C>".to_vec()
        );
    }
}
