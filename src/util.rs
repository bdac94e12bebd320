//! Shared helpers for bounded strings.

use core::fmt;

/// Longest prefix of `s` that is at most `max` bytes and ends on a char
/// boundary.
pub fn prefix(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Copy `s` into a fixed-capacity string, truncating at the last char
/// boundary that fits.
pub fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    // Cannot fail: the prefix is at most N bytes.
    let _ = out.push_str(prefix(s, N));
    out
}

/// Like [`bounded`] but refuses to truncate.
pub fn exact<const N: usize>(s: &str) -> Option<heapless::String<N>> {
    heapless::String::try_from(s).ok()
}

/// Format `args` into a fixed-capacity string, cutting at the capacity.
pub fn render<const N: usize>(args: fmt::Arguments<'_>) -> heapless::String<N> {
    let mut out = Truncating(heapless::String::new());
    // `Truncating` never reports an error.
    let _ = fmt::write(&mut out, args);
    out.0
}

struct Truncating<const N: usize>(heapless::String<N>);

impl<const N: usize> fmt::Write for Truncating<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.0.len();
        // Cannot fail: the prefix fits in the remaining room.
        let _ = self.0.push_str(prefix(s, room));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_copied() {
        let s: heapless::String<8> = bounded("abc");
        assert_eq!(s.as_str(), "abc");
    }

    #[test]
    fn long_strings_are_truncated() {
        let s: heapless::String<4> = bounded("abcdefgh");
        assert_eq!(s.as_str(), "abcd");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // "é" is two bytes; cutting at 2 would split it.
        let s: heapless::String<2> = bounded("aé");
        assert_eq!(s.as_str(), "a");
    }

    #[test]
    fn exact_rejects_overflow() {
        assert!(exact::<3>("abcd").is_none());
        assert_eq!(exact::<4>("abcd").unwrap().as_str(), "abcd");
    }

    #[test]
    fn render_cuts_at_capacity() {
        let s: heapless::String<8> = render(format_args!("{}-{}", "abcdef", 12345));
        assert_eq!(s.as_str(), "abcdef-1");
    }
}
