/// Longest encoded character the engine will decode or scan back over.
pub const MAX_CHAR_BYTES: usize = 4;

/// How buffer bytes map to logical characters.
///
/// Stateless per call: every query gets the charset passed in, the
/// store itself only caches derived per-page counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    /// 8-bit passthrough: one byte, one character, one column.
    EightBit,
    #[default]
    Utf8,
}

/// UTF-8 continuation byte (0x80..=0xBF).
#[inline]
#[must_use]
pub fn is_continuation(byte: u8) -> bool {
    (0x80..0xc0).contains(&byte)
}

impl Charset {
    #[inline]
    #[must_use]
    pub fn is_utf8(self) -> bool {
        self == Charset::Utf8
    }

    /// Encoded length implied by a lead byte. Invalid leads (stray
    /// continuation bytes, 0xf8 and above) decode as a single byte so
    /// scans always make progress.
    #[inline]
    #[must_use]
    pub fn char_len(self, lead: u8) -> usize {
        if self != Charset::Utf8 {
            return 1;
        }

        match lead {
            0xc0..0xe0 => 2,
            0xe0..0xf0 => 3,
            0xf0..0xf8 => 4,
            _ => 1,
        }
    }

    /// Number of logical characters in `buf`. For UTF-8 this counts
    /// every byte that is not a continuation byte, so a character
    /// split across two buffers is attributed to the buffer holding
    /// its lead byte.
    #[must_use]
    pub fn count_chars(self, buf: &[u8]) -> u64 {
        if self != Charset::Utf8 {
            return buf.len() as u64;
        }

        buf.iter().filter(|&&b| !is_continuation(b)).count() as u64
    }

    /// Number of `'\n'` in `buf`, plus the character count after the
    /// last one (or over all of `buf` when there is none).
    #[must_use]
    pub fn get_pos(self, buf: &[u8]) -> (u64, u64) {
        let mut nb_lines = 0u64;
        let mut line_start = 0usize;

        for newline in memchr::memchr_iter(b'\n', buf) {
            nb_lines += 1;
            line_start = newline + 1;
        }

        (nb_lines, self.count_chars(&buf[line_start..]))
    }

    /// Byte index of the start of the `pos`-th character of `buf`,
    /// clamped to `buf.len()`. Leading continuation bytes (a character
    /// begun in a previous buffer) do not count.
    #[must_use]
    pub fn goto_char(self, buf: &[u8], pos: u64) -> usize {
        if self != Charset::Utf8 {
            return usize::try_from(pos).unwrap_or(usize::MAX).min(buf.len());
        }

        let mut nb_chars = 0u64;

        for (idx, &byte) in buf.iter().enumerate() {
            if !is_continuation(byte) {
                if nb_chars >= pos {
                    return idx;
                }
                nb_chars += 1;
            }
        }

        buf.len()
    }

    /// Decodes the character starting at `buf[0]`, returning it and
    /// its encoded length. A truncated or malformed sequence falls
    /// back to a single-byte interpretation rather than failing.
    #[must_use]
    pub fn decode_char(self, buf: &[u8]) -> (char, usize) {
        let Some(&lead) = buf.first() else {
            return ('\n', 0);
        };

        let len = self.char_len(lead);

        if len > 1 && buf.len() >= len
            && let Ok(s) = std::str::from_utf8(&buf[..len])
            && let Some(ch) = s.chars().next()
        {
            return (ch, len);
        }

        (char::from(lead), 1)
    }
}
