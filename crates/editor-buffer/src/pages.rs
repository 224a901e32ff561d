use std::ops::{AddAssign, SubAssign};

/// Last-accessed-page memo: the page's index and the logical offset
/// of its first byte. Holding the index (never a reference) keeps the
/// cache sound across page-table reallocation; any structural
/// mutation resets it to `None`.
#[derive(Clone, Copy, Debug)]
struct PageCache {
    index: usize,
    start: u64,
}

/// An ordered sequence of pages whose sizes sum to `total_size`.
///
/// All offsets are 0-based byte offsets into the logical content.
/// Reads clamp silently; only growth and copy-on-write promotion can
/// fail, and they fail before any authoritative field is updated.
#[derive(Debug, Default)]
pub struct Pages {
    pages: Vec<crate::page::Page>,
    total_size: u64,
    cache: std::cell::Cell<Option<PageCache>>,
}

/*

====================
===== CREATION =====
====================

*/

impl Pages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the page table directly over `MAX_PAGE_SIZE` windows of
    /// a read-only mapping. No bytes are copied; every page is
    /// read-only and shares the mapping's lifetime.
    #[must_use]
    pub fn from_mmap(map: std::sync::Arc<io::mmap::MmapFile>) -> Self {
        let file_size = map.len();
        let mut pages = Vec::with_capacity(file_size.div_ceil(crate::page::MAX_PAGE_SIZE));
        let mut start = 0usize;

        while start < file_size {
            let len = std::cmp::min(file_size - start, crate::page::MAX_PAGE_SIZE);

            pages.push(crate::page::Page::mapped(map.clone(), start, len));
            start.add_assign(len);
        }

        Self {
            pages,
            total_size: file_size as u64,
            cache: std::cell::Cell::new(None),
        }
    }
}

/*

==========================
===== INLINE METHODS =====
==========================

*/

impl Pages {
    #[inline]
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    #[inline]
    #[must_use]
    pub fn nb_pages(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub(crate) fn page(&self, index: usize) -> &crate::page::Page {
        &self.pages[index]
    }

    #[inline]
    fn invalidate_cache(&self) {
        self.cache.set(None);
    }

    /// Drops every page's cached line and character summary; needed
    /// when the charset used to interpret the bytes changes.
    pub fn invalidate_page_summaries(&self) {
        for page in &self.pages {
            page.invalidate_caches();
        }
    }

    fn debug_check_sizes(&self) {
        debug_assert_eq!(
            self.pages.iter().map(|p| p.len() as u64).sum::<u64>(),
            self.total_size,
            "page sizes must sum to total_size"
        );
        debug_assert!(
            self.pages
                .iter()
                .all(|p| !p.is_empty() && p.len() <= crate::page::MAX_PAGE_SIZE),
            "every page must hold 1..=MAX_PAGE_SIZE bytes"
        );
    }

    /// Finds the page containing `offset`, returning its index and
    /// the offset within it. `None` when `offset >= total_size`.
    /// Sequential access is amortized O(1) through the cache.
    fn find_page(&self, offset: u64) -> Option<(usize, usize)> {
        if offset >= self.total_size {
            return None;
        }

        if let Some(cache) = self.cache.get() {
            let page_len = self.pages[cache.index].len() as u64;

            if offset >= cache.start && offset < cache.start + page_len {
                return Some((cache.index, (offset - cache.start) as usize));
            }
        }

        let mut start = 0u64;

        for (index, page) in self.pages.iter().enumerate() {
            let page_len = page.len() as u64;

            if offset < start + page_len {
                self.cache.set(Some(PageCache { index, start }));

                return Some((index, (offset - start) as usize));
            }

            start.add_assign(page_len);
        }

        None
    }
}

/*

========================
===== READ / WRITE =====
========================

*/

impl Pages {
    /// Copies bytes starting at `offset` into `out`, clamped to the
    /// end of the content. Returns how many bytes were copied; an
    /// `offset` past the end reads nothing. Never an error.
    pub fn read_into(&self, offset: u64, out: &mut [u8]) -> usize {
        let Some((mut index, mut off_in)) = self.find_page(offset) else {
            return 0;
        };

        let avail = self.total_size - offset;
        let count = if (out.len() as u64) < avail {
            out.len()
        } else {
            avail as usize
        };
        let mut done = 0usize;

        while done < count {
            let data = self.pages[index].data();
            let len = std::cmp::min(data.len() - off_in, count - done);

            out[done..done + len].copy_from_slice(&data[off_in..off_in + len]);

            done.add_assign(len);
            index.add_assign(1);
            off_in = 0;
        }

        count
    }

    /// Clamped read into a fresh vector.
    #[must_use]
    pub fn read(&self, offset: u64, size: u64) -> Vec<u8> {
        let avail = self.total_size.saturating_sub(offset);
        let count = std::cmp::min(size, avail) as usize;
        let mut out = vec![0u8; count];
        let got = self.read_into(offset, &mut out);

        debug_assert_eq!(got, count);

        out
    }

    /// In-place overwrite, clamped to `total_size` — the store never
    /// grows on write, callers fall back to insertion for any excess.
    /// Every touched page is promoted out of read-only and has its
    /// derived caches cleared before the copy. Returns the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// `BufferError::OutOfMemory` if a promotion copy fails; pages
    /// before the failing one keep the new bytes, sizes are untouched.
    pub fn write_in_place(&mut self, offset: u64, buf: &[u8]) -> crate::errors::BufferResult<usize> {
        let Some((mut index, mut off_in)) = self.find_page(offset) else {
            return Ok(0);
        };

        let avail = self.total_size - offset;
        let count = if (buf.len() as u64) < avail {
            buf.len()
        } else {
            avail as usize
        };
        let mut done = 0usize;

        while done < count {
            let page_len = self.pages[index].len();
            let len = std::cmp::min(page_len - off_in, count - done);
            let data = self.pages[index].prepare_for_update()?;

            data[off_in..off_in + len].copy_from_slice(&buf[done..done + len]);

            done.add_assign(len);
            index.add_assign(1);
            off_in = 0;
        }

        Ok(count)
    }
}

/*

=====================
===== INSERTION =====
=====================

*/

impl Pages {
    /// Inserts `buf` so that its bytes start at the front of the page
    /// at `page_index`: as much as fits is prepended into that page,
    /// the rest becomes fresh full pages spliced in just before it.
    /// Does not touch `total_size` — callers account for growth once.
    fn insert_pages_at(
        &mut self,
        page_index: usize,
        buf: &[u8],
    ) -> crate::errors::BufferResult<()> {
        let mut buf = buf;

        if page_index < self.pages.len() {
            let room = crate::page::MAX_PAGE_SIZE - self.pages[page_index].len();
            let take = std::cmp::min(room, buf.len());

            if take > 0 {
                let data = self.pages[page_index].prepare_for_update()?;

                data.try_reserve_exact(take)?;
                data.splice(0..0, buf[buf.len() - take..].iter().copied());

                buf = &buf[..buf.len() - take];
            }
        }

        if !buf.is_empty() {
            let mut new_pages = Vec::new();

            new_pages.try_reserve_exact(buf.len().div_ceil(crate::page::MAX_PAGE_SIZE))?;

            for chunk in buf.chunks(crate::page::MAX_PAGE_SIZE) {
                new_pages.push(crate::page::Page::from_bytes(chunk)?);
            }

            self.pages.try_reserve(new_pages.len())?;
            self.pages.splice(page_index..page_index, new_pages);
        }

        Ok(())
    }

    /// Inserts `buf` at `offset` (`0 <= offset <= total_size`).
    ///
    /// The page containing the insertion point is filled up to
    /// `MAX_PAGE_SIZE` first; the tail it can no longer hold is split
    /// off into a page of its own right after it, and whatever of
    /// `buf` does not fit becomes fresh pages in between. Pages stay
    /// near-full without a rebalance pass.
    ///
    /// # Errors
    ///
    /// - `MathError::OutOfBounds` if `offset > total_size`.
    /// - `BufferError::OutOfMemory` if page growth fails.
    pub fn insert_lowlevel(&mut self, offset: u64, buf: &[u8]) -> crate::errors::BufferResult<()> {
        if buf.is_empty() {
            return Ok(());
        }

        if offset > self.total_size {
            return Err(crate::enums::MathError::OutOfBounds(offset).into());
        }

        let inserted = <usize as TryInto<u64>>::try_into(buf.len())
            .map_err(crate::enums::MathError::ConversionFailed)?;
        let mut buf = buf;
        let insert_rest_at;

        if offset > 0 {
            // Look up the page containing offset-1, so an insert at a
            // page boundary keeps filling the page on the left.
            let (index, off_in) = self
                .find_page(offset - 1)
                .expect("offset-1 is below total_size");
            let off_in = off_in + 1;
            let page_len = self.pages[index].len();

            self.invalidate_cache();

            // What fits in this page from the insertion point on.
            let len = std::cmp::min(
                crate::page::MAX_PAGE_SIZE.saturating_sub(off_in),
                buf.len(),
            );
            // Bytes of the page tail that no longer fit and must be
            // pushed out into a page of their own.
            let len_out = (page_len + len).saturating_sub(crate::page::MAX_PAGE_SIZE);

            if len_out > 0 {
                let tail = self.pages[index].split_off(page_len - len_out)?;

                self.pages.insert(index + 1, tail);
            }

            if len > 0 {
                let data = self.pages[index].prepare_for_update()?;

                data.try_reserve_exact(len)?;
                data.splice(off_in..off_in, buf[..len].iter().copied());

                buf = &buf[len..];
            }

            insert_rest_at = index + 1;
        } else {
            insert_rest_at = 0;
        }

        if !buf.is_empty() {
            self.insert_pages_at(insert_rest_at, buf)?;
        }

        self.total_size.add_assign(inserted);
        self.invalidate_cache();
        self.debug_check_sizes();

        Ok(())
    }
}

/*

====================
===== DELETION =====
====================

*/

impl Pages {
    /// Deletes up to `size` bytes starting at `offset`, clamped to
    /// the end of the content. Fully-consumed pages are dropped as a
    /// run (owned bytes freed, shared mapped bytes just lose one
    /// reference); partially-consumed pages are promoted and shrunk
    /// in place.
    ///
    /// # Errors
    ///
    /// `BufferError::OutOfMemory` if promoting a partially-consumed
    /// read-only page fails; no sizes have been altered at that point.
    pub fn delete(&mut self, offset: u64, size: u64) -> crate::errors::BufferResult<()> {
        let Some((mut index, mut off_in)) = self.find_page(offset) else {
            return Ok(());
        };

        let size = std::cmp::min(size, self.total_size - offset);

        if size == 0 {
            return Ok(());
        }

        self.invalidate_cache();

        let mut remaining = size;

        while remaining > 0 && index < self.pages.len() {
            let page_len = self.pages[index].len();

            if off_in == 0 && remaining >= page_len as u64 {
                // A contiguous run of fully-consumed pages, dropped in
                // one splice.
                let mut run = 0usize;

                while index + run < self.pages.len() {
                    let len = self.pages[index + run].len() as u64;

                    if remaining < len {
                        break;
                    }

                    remaining.sub_assign(len);
                    run += 1;
                }

                self.pages.drain(index..index + run);
            } else {
                let len = std::cmp::min((page_len - off_in) as u64, remaining) as usize;
                let data = self.pages[index].prepare_for_update()?;

                data.drain(off_in..off_in + len);

                remaining.sub_assign(len as u64);
                // Only reached again if the deletion ran to the end of
                // this page.
                index += 1;
                off_in = 0;
            }
        }

        self.total_size.sub_assign(size);
        self.debug_check_sizes();

        Ok(())
    }
}

/*

============================
===== CROSS-STORE COPY =====
============================

*/

impl Pages {
    /// Copies `size` bytes from `src` starting at `src_offset` into
    /// this store at `dest_offset`, by page reference where possible:
    /// a read-only source page fully inside the range contributes a
    /// new page record over the same shared bytes instead of a copy.
    /// Partial first/last pages of the range are always byte-copied;
    /// the destination page is split when `dest_offset` falls mid-page.
    ///
    /// # Errors
    ///
    /// - `MathError::OutOfBounds` if `dest_offset > total_size`.
    /// - `BufferError::OutOfMemory` if any copy or split fails.
    pub fn insert_from(
        &mut self,
        dest_offset: u64,
        src: &Pages,
        src_offset: u64,
        size: u64,
    ) -> crate::errors::BufferResult<()> {
        if dest_offset > self.total_size {
            return Err(crate::enums::MathError::OutOfBounds(dest_offset).into());
        }

        let mut size = std::cmp::min(size, src.total_size.saturating_sub(src_offset));

        if size == 0 {
            return Ok(());
        }

        let mut dest_offset = dest_offset;
        let (mut src_index, src_off_in) = src
            .find_page(src_offset)
            .expect("src_offset is below src.total_size");

        // A partially-covered first source page is always byte-copied.
        if src_off_in > 0 {
            let data = src.pages[src_index].data();
            let len = std::cmp::min((data.len() - src_off_in) as u64, size) as usize;

            self.insert_lowlevel(dest_offset, &data[src_off_in..src_off_in + len])?;

            dest_offset += len as u64;
            size -= len as u64;
            src_index += 1;
        }

        if size == 0 {
            return Ok(());
        }

        // Cut the destination page at dest_offset if it falls mid-page.
        let mut insert_at = if dest_offset < self.total_size {
            let (index, off_in) = self
                .find_page(dest_offset)
                .expect("dest_offset is below total_size");

            if off_in > 0 {
                let tail = self.pages[index].split_off(off_in)?;

                self.pages.insert(index + 1, tail);

                index + 1
            } else {
                index
            }
        } else {
            self.pages.len()
        };

        let added = size;

        // Fully-covered source pages: share read-only bytes by
        // reference, duplicate writable ones.
        let mut full_pages = Vec::new();

        while size > 0 && src_index < src.pages.len() {
            let page = &src.pages[src_index];
            let page_len = page.len() as u64;

            if page_len > size {
                break;
            }

            full_pages.push(match page.share() {
                Some(shared) => shared,
                None => crate::page::Page::from_bytes(page.data())?,
            });

            size -= page_len;
            src_index += 1;
        }

        let run = full_pages.len();

        self.pages.try_reserve(run)?;
        self.pages.splice(insert_at..insert_at, full_pages);
        insert_at += run;

        // A partially-covered last source page is always byte-copied.
        if size > 0 {
            let data = src.pages[src_index].data();

            self.insert_pages_at(insert_at, &data[..size as usize])?;
        }

        self.total_size.add_assign(added);

        self.invalidate_cache();
        self.debug_check_sizes();

        Ok(())
    }
}

/*

======================================
===== CHARSET-AWARE POSITIONING ======
======================================

*/

impl Pages {
    /// Character at `offset` and the offset just past it. Reading at
    /// or past the end yields a synthetic `'\n'` so line-oriented
    /// scans terminate uniformly.
    #[must_use]
    pub fn next_char(&self, charset: crate::charset::Charset, offset: u64) -> (char, u64) {
        if offset >= self.total_size {
            return ('\n', self.total_size);
        }

        let mut buf = [0u8; crate::charset::MAX_CHAR_BYTES];
        let got = self.read_into(offset, &mut buf);
        let (ch, len) = charset.decode_char(&buf[..got]);

        (ch, offset + len as u64)
    }

    /// Character ending at `offset` and the offset of its first byte.
    /// At offset 0 there is nothing before the buffer; a synthetic
    /// `'\n'` is reported. For UTF-8 the scan walks backward over
    /// continuation bytes; if no lead byte turns up within
    /// `MAX_CHAR_BYTES` (or the start of the buffer is hit), the last
    /// byte read is taken as one character rather than failing.
    #[must_use]
    pub fn prev_char(&self, charset: crate::charset::Charset, offset: u64) -> (char, u64) {
        if offset == 0 {
            return ('\n', 0);
        }

        let started_at = offset - 1;
        let mut offset = started_at;
        let mut buf = [0u8; crate::charset::MAX_CHAR_BYTES];
        let mut q = crate::charset::MAX_CHAR_BYTES - 1;

        self.read_into(offset, std::slice::from_mut(&mut buf[q]));

        if !charset.is_utf8() {
            return (char::from(buf[q]), offset);
        }

        while crate::charset::is_continuation(buf[q]) {
            if offset == 0 || q == 0 {
                // Unterminated backward scan: take the byte we started
                // from as a single character.
                return (
                    char::from(buf[crate::charset::MAX_CHAR_BYTES - 1]),
                    started_at,
                );
            }

            offset -= 1;
            q -= 1;
            self.read_into(offset, std::slice::from_mut(&mut buf[q]));
        }

        let (ch, _) = charset.decode_char(&buf[q..]);

        (ch, offset)
    }

    /// Line/column of `offset`: lines are `'\n'` counts before it,
    /// the column is the character count since the preceding `'\n'`.
    /// Skipped pages contribute their cached summaries; only the
    /// final partial page is scanned.
    #[must_use]
    pub fn get_pos(&self, charset: crate::charset::Charset, offset: u64) -> (u64, u64) {
        let mut line = 0u64;
        let mut col = 0u64;
        let mut offset = offset;

        for page in &self.pages {
            if offset < page.len() as u64 {
                let (line1, col1) = charset.get_pos(&page.data()[..offset as usize]);

                line += line1;
                col = if line1 > 0 { col1 } else { col + col1 };

                return (line, col);
            }

            let summary = page.calc_pos(charset);

            line += summary.nb_lines;
            col = if summary.nb_lines > 0 {
                summary.col
            } else {
                col + summary.col
            };
            offset -= page.len() as u64;
        }

        (line, col)
    }

    /// Byte offset of character `col` on line `line`, clamping a
    /// column request past the line's end to the end of that line,
    /// and a line request past the buffer to `total_size`.
    #[must_use]
    pub fn goto_pos(&self, charset: crate::charset::Charset, line1: u64, col1: u64) -> u64 {
        let mut line = 0u64;
        let mut col = 0u64;
        let mut offset = 0u64;

        for page in &self.pages {
            let summary = page.calc_pos(charset);
            let line2 = line + summary.nb_lines;
            let col2 = if summary.nb_lines > 0 {
                summary.col
            } else {
                col + summary.col
            };

            if line2 > line1 || (line2 == line1 && col2 >= col1) {
                // The target position starts within this page: seek to
                // the target line, then step characters up to the
                // column or the end of the line, whichever comes first.
                let data = page.data();
                let mut byte = 0usize;

                while line < line1 {
                    let newline = memchr::memchr(b'\n', &data[byte..])
                        .expect("target line starts within this page");

                    byte += newline + 1;
                    col = 0;
                    line += 1;
                }

                let mut offset = offset + byte as u64;

                while col < col1 {
                    let (ch, next) = self.next_char(charset, offset);

                    if ch == '\n' {
                        break;
                    }

                    col += 1;
                    offset = next;
                }

                return offset;
            }

            line = line2;
            col = col2;
            offset += page.len() as u64;
        }

        self.total_size
    }

    /// Character index of the character containing byte `offset`
    /// (mid-character offsets round down). Identity for 8-bit
    /// charsets, clamped to `total_size`.
    #[must_use]
    pub fn get_char_offset(&self, charset: crate::charset::Charset, offset: u64) -> u64 {
        if !charset.is_utf8() {
            return std::cmp::min(offset, self.total_size);
        }

        let mut pos = 0u64;
        let mut offset = offset;

        for page in &self.pages {
            if offset < page.len() as u64 {
                pos += charset.count_chars(&page.data()[..offset as usize]);

                // A continuation byte at the target means the lead of
                // its character was already counted although the
                // character containing `offset` starts earlier.
                if crate::charset::is_continuation(page.data()[offset as usize]) {
                    pos = pos.saturating_sub(1);
                }

                return pos;
            }

            pos += page.calc_chars(charset);
            offset -= page.len() as u64;
        }

        pos
    }

    /// Byte offset of the start of character `pos`. Identity for
    /// 8-bit charsets; past-the-end positions clamp to `total_size`.
    #[must_use]
    pub fn goto_char(&self, charset: crate::charset::Charset, pos: u64) -> u64 {
        if !charset.is_utf8() {
            return std::cmp::min(pos, self.total_size);
        }

        let mut offset = 0u64;
        let mut pos = pos;

        for page in &self.pages {
            let nb_chars = page.calc_chars(charset);

            if pos < nb_chars {
                return offset + charset.goto_char(page.data(), pos) as u64;
            }

            pos -= nb_chars;
            offset += page.len() as u64;
        }

        offset
    }
}
