/// Hard cap on the byte run held by one page.
pub const MAX_PAGE_SIZE: usize = 4096;

/// Cached line/column summary of one page's bytes: number of `'\n'`,
/// and the character count after the last one (the whole page's
/// character count when it holds no newline).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PosSummary {
    pub nb_lines: u64,
    pub col: u64,
}

/// Where a page's bytes live.
#[derive(Debug)]
pub enum PageData {
    /// Bytes owned by this page alone; writable in place.
    Owned(Vec<u8>),
    /// A read-only window into a memory-mapped file. The same mapping
    /// may back pages in several stores at once; the `Arc` keeps it
    /// alive until the last such page is gone.
    Mapped {
        map: std::sync::Arc<io::mmap::MmapFile>,
        start: usize,
        len: usize,
    },
}

/// One bounded, contiguous byte run of a paginated store, plus its
/// lazily computed line/char summaries.
///
/// The summaries live in `Cell<Option<..>>` so position queries can
/// fill them through a shared reference (the same shape as a search
/// cache); every mutation of the bytes clears both.
#[derive(Debug)]
pub struct Page {
    data: PageData,
    pos_cache: std::cell::Cell<Option<PosSummary>>,
    char_cache: std::cell::Cell<Option<u64>>,
}

/*

====================
===== CREATION =====
====================

*/

impl Page {
    fn with_data(data: PageData) -> Self {
        Self {
            data,
            pos_cache: std::cell::Cell::new(None),
            char_cache: std::cell::Cell::new(None),
        }
    }

    /// Builds an owned page holding a copy of `bytes`.
    ///
    /// # Errors
    ///
    /// `BufferError::OutOfMemory` if the copy cannot be allocated;
    /// nothing is altered in that case.
    pub fn from_bytes(bytes: &[u8]) -> crate::errors::BufferResult<Self> {
        debug_assert!(bytes.len() <= MAX_PAGE_SIZE);

        let mut data = Vec::new();

        data.try_reserve_exact(bytes.len())?;
        data.extend_from_slice(bytes);

        Ok(Self::with_data(PageData::Owned(data)))
    }

    pub(crate) fn owned(data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= MAX_PAGE_SIZE);

        Self::with_data(PageData::Owned(data))
    }

    pub(crate) fn mapped(
        map: std::sync::Arc<io::mmap::MmapFile>,
        start: usize,
        len: usize,
    ) -> Self {
        debug_assert!(len <= MAX_PAGE_SIZE);

        Self::with_data(PageData::Mapped { map, start, len })
    }
}

/*

==========================
===== INLINE METHODS =====
==========================

*/

impl Page {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            PageData::Owned(vec) => vec.len(),
            PageData::Mapped { len, .. } => *len,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A mapped page must never be written in place; writers go
    /// through [`Page::prepare_for_update`] first.
    #[inline]
    #[must_use]
    pub fn read_only(&self) -> bool {
        matches!(self.data, PageData::Mapped { .. })
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.data {
            PageData::Owned(vec) => vec,
            PageData::Mapped { map, start, len } => map
                .get_bytes_exact(*start, *len)
                .expect("mapped page range lies within its mapping"),
        }
    }

    #[inline]
    pub fn invalidate_caches(&self) {
        self.pos_cache.set(None);
        self.char_cache.set(None);
    }
}

/*

==============================
===== COPY-ON-WRITE, CUT =====
==============================

*/

impl Page {
    /// Prepares the page for a mutation of its bytes: promotes a
    /// read-only (mapped/shared) page into an owned copy and clears
    /// the derived caches. Returns the now-writable byte vector.
    ///
    /// # Errors
    ///
    /// `BufferError::OutOfMemory` if the promotion copy cannot be
    /// allocated; the page is left untouched.
    pub fn prepare_for_update(&mut self) -> crate::errors::BufferResult<&mut Vec<u8>> {
        if let PageData::Mapped { map, start, len } = &self.data {
            let bytes = map
                .get_bytes_exact(*start, *len)
                .expect("mapped page range lies within its mapping");
            let mut owned = Vec::new();

            owned.try_reserve_exact(bytes.len())?;
            owned.extend_from_slice(bytes);

            self.data = PageData::Owned(owned);
        }

        self.invalidate_caches();

        match &mut self.data {
            PageData::Owned(vec) => Ok(vec),
            PageData::Mapped { .. } => unreachable!("promoted above"),
        }
    }

    /// Splits the page in two at `at`, keeping `[0, at)` here and
    /// returning `[at, len)` as a new page. A mapped page splits into
    /// two windows over the same mapping, no bytes are copied.
    ///
    /// # Errors
    ///
    /// `BufferError::OutOfMemory` if an owned tail cannot be
    /// allocated; the page is left untouched.
    pub fn split_off(&mut self, at: usize) -> crate::errors::BufferResult<Page> {
        debug_assert!(at <= self.len());

        let tail = match &mut self.data {
            PageData::Owned(vec) => {
                let mut tail = Vec::new();

                tail.try_reserve_exact(vec.len() - at)?;
                tail.extend_from_slice(&vec[at..]);
                vec.truncate(at);

                Page::owned(tail)
            }
            PageData::Mapped { map, start, len } => {
                let tail = Page::mapped(map.clone(), *start + at, *len - at);

                *len = at;

                tail
            }
        };

        self.invalidate_caches();

        Ok(tail)
    }

    /// A new page record pointing at the same mapped bytes ("copy the
    /// reference, not the bytes"). Only read-only pages can be shared;
    /// owned pages must be duplicated with [`Page::from_bytes`].
    #[must_use]
    pub fn share(&self) -> Option<Page> {
        match &self.data {
            PageData::Owned(_) => None,
            PageData::Mapped { map, start, len } => {
                Some(Page::mapped(map.clone(), *start, *len))
            }
        }
    }
}

/*

==============================
===== DERIVED SUMMARIES ======
==============================

*/

impl Page {
    /// Line/column summary of this page, computed once and cached
    /// until the next mutation.
    pub fn calc_pos(&self, charset: crate::charset::Charset) -> PosSummary {
        if let Some(summary) = self.pos_cache.get() {
            return summary;
        }

        let (nb_lines, col) = charset.get_pos(self.data());
        let summary = PosSummary { nb_lines, col };

        self.pos_cache.set(Some(summary));

        summary
    }

    /// Character count of this page, computed once and cached until
    /// the next mutation.
    pub fn calc_chars(&self, charset: crate::charset::Charset) -> u64 {
        if let Some(nb_chars) = self.char_cache.get() {
            return nb_chars;
        }

        let nb_chars = charset.count_chars(self.data());

        self.char_cache.set(Some(nb_chars));

        nb_chars
    }
}
