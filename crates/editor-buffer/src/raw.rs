//! File representations and the raw (byte-for-byte) one.

use std::io::{Read, Write};

/// Files at or above this size are memory-mapped on load instead of
/// being copied into owned pages; edits then promote only the touched
/// pages.
pub const MIN_MMAP_SIZE: u64 = 1024 * 1024;

/// Chunk size for streamed loads and saves.
pub const IOBUF_SIZE: usize = 32_768;

/// How a buffer's bytes correspond to a file on disk. A data type
/// owns the load and save transformation; the raw one below does
/// none.
pub trait BufferDataType {
    fn name(&self) -> &'static str;

    /// Loads `path` into `buffer`, replacing whatever content the
    /// buffer held; on error the buffer is left exactly as it was.
    /// Returns the content size.
    ///
    /// # Errors
    ///
    /// `BufferError::IoError` on filesystem failure,
    /// `BufferError::OutOfMemory` if page growth fails.
    fn load(
        &self,
        buffer: &mut crate::buffer::EditBuffer,
        path: &std::path::Path,
    ) -> crate::errors::BufferResult<u64>;

    /// Writes `buffer` to `path`. On success the modified flag clears
    /// and the undo history is discarded. Returns the bytes written.
    ///
    /// # Errors
    ///
    /// `BufferError::IoError` on filesystem failure.
    fn save(
        &self,
        buffer: &mut crate::buffer::EditBuffer,
        path: &std::path::Path,
    ) -> crate::errors::BufferResult<u64>;

    /// Releases whatever the loader attached to the buffer.
    fn close(&self, buffer: &mut crate::buffer::EditBuffer);
}

/// Identity representation: buffer bytes are file bytes.
pub struct RawDataType;

impl BufferDataType for RawDataType {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn load(
        &self,
        buffer: &mut crate::buffer::EditBuffer,
        path: &std::path::Path,
    ) -> crate::errors::BufferResult<u64> {
        let file_size = std::fs::metadata(path)?.len();

        if file_size >= MIN_MMAP_SIZE {
            let map = std::sync::Arc::new(io::mmap::MmapFile::open(path)?);
            let pages = crate::pages::Pages::from_mmap(std::sync::Arc::clone(&map));

            log::debug!("mapped '{}' ({} bytes)", map.path().display(), map.len());

            buffer.install_mapping(pages, map);
        } else {
            let mut file = std::fs::File::open(path)?;
            let mut chunk = vec![0u8; IOBUF_SIZE];
            let was_modified = buffer.modified();
            // The old content stays behind the streamed-in bytes until
            // the whole file has arrived, so a failure can still hand
            // the buffer back untouched.
            let previous = buffer.total_size();
            let mut inserted = 0u64;
            let result = loop {
                match file.read(&mut chunk) {
                    Ok(0) => break Ok(()),
                    Ok(got) => {
                        if let Err(err) = buffer.insert_unlogged(inserted, &chunk[..got]) {
                            break Err(err);
                        }

                        inserted += got as u64;
                    }
                    Err(err) => break Err(err.into()),
                }
            };

            if let Err(err) = result {
                // A half-loaded file is worse than none: take the
                // inserted range back out before reporting.
                buffer.delete_unlogged(0, inserted)?;
                buffer.set_modified(was_modified);

                return Err(err);
            }

            buffer.delete_unlogged(inserted, previous)?;

            log::debug!("loaded '{}' ({} bytes)", path.display(), inserted);
        }

        buffer.set_path(Some(path.to_owned()));
        buffer.set_modified(false);
        buffer.reset_log();

        Ok(file_size)
    }

    fn save(
        &self,
        buffer: &mut crate::buffer::EditBuffer,
        path: &std::path::Path,
    ) -> crate::errors::BufferResult<u64> {
        // Tilde backup, best effort. The rename also keeps the inode
        // of a mapped original readable while the path is rewritten.
        let mut backup_name = path.as_os_str().to_owned();

        backup_name.push("~");

        let backup_path = std::path::PathBuf::from(backup_name);
        let backed_up = match std::fs::rename(path, &backup_path) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                log::warn!("could not back up '{}': {}", path.display(), err);

                false
            }
        };

        let mut file = std::fs::File::create(path)?;
        let total = buffer.total_size();
        let mut chunk = vec![0u8; IOBUF_SIZE];
        let mut offset = 0u64;

        while offset < total {
            let got = buffer.read_into(offset, &mut chunk);

            file.write_all(&chunk[..got])?;
            offset += got as u64;
        }

        file.sync_all()?;

        // Carry the original file's permissions over, best effort.
        if backed_up
            && let Ok(metadata) = std::fs::metadata(&backup_path)
            && let Err(err) = std::fs::set_permissions(path, metadata.permissions())
        {
            log::warn!("could not restore permissions on '{}': {}", path.display(), err);
        }

        buffer.set_path(Some(path.to_owned()));
        buffer.set_modified(false);
        buffer.reset_log();

        log::debug!("saved '{}' ({} bytes)", path.display(), total);

        Ok(total)
    }

    fn close(&self, buffer: &mut crate::buffer::EditBuffer) {
        buffer.clear_mapping();
    }
}
