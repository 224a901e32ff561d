/// A whole file mapped read-only into memory.
///
/// The mapping stays valid for the lifetime of this struct; buffer
/// pages reference slices of it through an `Arc<MmapFile>`, so the
/// mapping is only unmapped once the last page sharing it is gone.
#[derive(Debug)]
pub struct MmapFile {
    _file: std::fs::File,
    mmap: memmap2::Mmap,
    path: std::path::PathBuf,
}

impl MmapFile {
    /// # Errors
    ///
    /// - `std::io::Error` if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;

        // SAFETY:
        // - File is opened read-only
        // - We keep the file handle alive in struct
        // - Caller only gets immutable &[u8]
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        Ok(Self {
            _file: file,
            mmap,
            path,
        })
    }

    /// Exact slice of `length` bytes starting at `start`.
    /// Returns `None` if the range goes out of bounds or overflows.
    /// Use this when page bookkeeping *guarantees* the bounds are
    /// correct.
    #[inline]
    #[must_use]
    pub fn get_bytes_exact(&self, start: usize, length: usize) -> Option<&[u8]> {
        let end = start.checked_add(length)?;

        self.mmap.get(start..end)
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// File length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether file is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of mapped file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
