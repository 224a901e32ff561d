//! The edit buffer: a paginated byte store plus everything an editor
//! hangs off it, naming, the modified flag, change observers, the
//! undo log, and charset-aware position queries.
//!
//! Every public mutation funnels through the logging layer before it
//! touches the store, so observers and the undo log see each change
//! exactly once, in order.

use std::ops::AddAssign;

/// Handle returned by [`EditBuffer::add_callback`], used to detach
/// the observer again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackId(u64);

/// Change observer: receives the operation, its offset and its byte
/// length just before the store mutates.
pub type ChangeCallback = Box<dyn FnMut(crate::enums::LogOperation, u64, u64)>;

/// Builds an observer that keeps a saved offset pointing at the same
/// content as bytes are inserted and deleted around it. Deletions
/// covering the offset clamp it to the start of the deleted range;
/// overwrites never move it.
#[must_use]
pub fn track_offset(tracked: &std::rc::Rc<std::cell::Cell<u64>>) -> ChangeCallback {
    let tracked = std::rc::Rc::clone(tracked);

    Box::new(move |op, offset, size| match op {
        crate::enums::LogOperation::Insert => {
            if tracked.get() > offset {
                tracked.set(tracked.get() + size);
            }
        }
        crate::enums::LogOperation::Delete => {
            let current = tracked.get();

            if current > offset {
                tracked.set(std::cmp::max(current.saturating_sub(size), offset));
            }
        }
        crate::enums::LogOperation::Write => {}
    })
}

pub struct EditBuffer {
    pages: crate::pages::Pages,
    name: String,
    path: Option<std::path::PathBuf>,
    charset: crate::charset::Charset,
    modified: bool,
    read_only: bool,
    /// Internal buffers (undo logs among them) that a registry should
    /// never list or save.
    system: bool,
    save_log: bool,
    log_buffer: Option<Box<EditBuffer>>,
    /// Offset in the log store where the next record lands; always
    /// the log's current size.
    log_new_index: u64,
    nb_logs: u64,
    cursor: crate::enums::LogCursor,
    /// Keeps the mapping alive while pages reference its bytes.
    mapping: Option<std::sync::Arc<io::mmap::MmapFile>>,
    data_type: std::rc::Rc<dyn crate::raw::BufferDataType>,
    callbacks: Vec<(CallbackId, ChangeCallback)>,
    next_callback_id: u64,
    mark: std::rc::Rc<std::cell::Cell<u64>>,
}

impl std::fmt::Debug for EditBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditBuffer")
            .field("name", &self.name)
            .field("total_size", &self.pages.total_size())
            .field("modified", &self.modified)
            .field("nb_logs", &self.nb_logs)
            .finish_non_exhaustive()
    }
}

/*

====================
===== CREATION =====
====================

*/

impl EditBuffer {
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mark = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut buffer = Self {
            pages: crate::pages::Pages::new(),
            name: name.to_owned(),
            path: None,
            charset: crate::charset::Charset::default(),
            modified: false,
            read_only: false,
            system: false,
            save_log: true,
            log_buffer: None,
            log_new_index: 0,
            nb_logs: 0,
            cursor: crate::enums::LogCursor::AtTip,
            mapping: None,
            data_type: std::rc::Rc::new(crate::raw::RawDataType),
            callbacks: Vec::new(),
            next_callback_id: 0,
            mark: std::rc::Rc::clone(&mark),
        };

        // The mark rides along with every edit from the start.
        buffer.add_callback(track_offset(&mark));

        buffer
    }
}

/*

==========================
===== INLINE METHODS =====
==========================

*/

impl EditBuffer {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: Option<std::path::PathBuf>) {
        self.path = path;
    }

    #[inline]
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.pages.total_size()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    #[inline]
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    #[inline]
    #[must_use]
    pub fn system(&self) -> bool {
        self.system
    }

    pub fn set_system(&mut self, system: bool) {
        self.system = system;
    }

    pub fn set_save_log(&mut self, save_log: bool) {
        self.save_log = save_log;
    }

    #[inline]
    #[must_use]
    pub fn charset(&self) -> crate::charset::Charset {
        self.charset
    }

    /// Changes the charset interpretation of the stored bytes. The
    /// bytes themselves are untouched; cached per-page line and
    /// character summaries are discarded since they depend on it.
    pub fn set_charset(&mut self, charset: crate::charset::Charset) {
        self.charset = charset;
        self.pages.invalidate_page_summaries();
    }

    #[inline]
    #[must_use]
    pub fn mark(&self) -> u64 {
        self.mark.get()
    }

    pub fn set_mark(&self, offset: u64) {
        self.mark.set(offset);
    }

    #[inline]
    #[must_use]
    pub fn nb_log_entries(&self) -> u64 {
        self.nb_logs
    }

    pub fn set_data_type(&mut self, data_type: std::rc::Rc<dyn crate::raw::BufferDataType>) {
        self.data_type = data_type;
    }

    #[must_use]
    pub fn data_type_name(&self) -> &'static str {
        self.data_type.name()
    }

    pub(crate) fn pages(&self) -> &crate::pages::Pages {
        &self.pages
    }

    pub(crate) fn install_mapping(
        &mut self,
        pages: crate::pages::Pages,
        map: std::sync::Arc<io::mmap::MmapFile>,
    ) {
        self.pages = pages;
        self.mapping = Some(map);
    }

    pub(crate) fn clear_mapping(&mut self) {
        self.mapping = None;
    }
}

/*

=====================
===== OBSERVERS =====
=====================

*/

impl EditBuffer {
    pub fn add_callback(&mut self, callback: ChangeCallback) -> CallbackId {
        let id = CallbackId(self.next_callback_id);

        self.next_callback_id += 1;
        self.callbacks.push((id, callback));

        id
    }

    /// Detaches an observer. Returns whether it was still attached.
    pub fn remove_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();

        self.callbacks.retain(|(cb_id, _)| *cb_id != id);

        self.callbacks.len() != before
    }

    fn fire_callbacks(&mut self, op: crate::enums::LogOperation, offset: u64, size: u64) {
        // Observers only see the operation triple; attaching or
        // detaching one needs `&mut EditBuffer`, which dispatch holds
        // exclusively, so the list cannot change under this loop.
        for (_, callback) in &mut self.callbacks {
            callback(op, offset, size);
        }
    }
}

/*

======================
===== UNDO LOG =======
======================

*/

impl EditBuffer {
    /// Notifies observers and, when logging is on, appends a record
    /// for the mutation about to happen. Write and delete records
    /// snapshot the current bytes of `[offset, offset + size)`, so
    /// this must run before the store changes.
    fn addlog(
        &mut self,
        op: crate::enums::LogOperation,
        offset: u64,
        size: u64,
    ) -> crate::errors::BufferResult<()> {
        self.fire_callbacks(op, offset, size);

        let was_modified = self.modified;

        self.modified = true;

        if !self.save_log {
            return Ok(());
        }

        if self.log_buffer.is_none() {
            let mut log = EditBuffer::new(&format!("*log {}*", self.name));

            log.system = true;
            log.save_log = false;

            self.log_buffer = Some(Box::new(log));
            self.log_new_index = 0;
            self.nb_logs = 0;
        }

        // Bound the history: drop the oldest record before appending
        // one past the cap. Every retained offset shifts down with it.
        if self.nb_logs >= crate::undo_log::NB_LOGS_MAX {
            let log = self.log_buffer.as_mut().expect("log buffer exists");
            let mut header = [0u8; crate::undo_log::HEADER_SIZE as usize];

            log.pages.read_into(0, &mut header);

            let oldest = crate::undo_log::LogEntry::decode_header(&header)?;
            let dropped = oldest.total_len();

            log.pages.delete(0, dropped)?;

            self.log_new_index = self
                .log_new_index
                .checked_sub(dropped)
                .ok_or(crate::enums::MathError::Overflow)?;
            self.nb_logs -= 1;

            if let crate::enums::LogCursor::AtEntry(entry) = self.cursor {
                self.cursor = crate::enums::LogCursor::AtEntry(entry.saturating_sub(dropped));
            }
        }

        let entry = crate::undo_log::LogEntry {
            op,
            was_modified,
            offset,
            size,
        };
        let index = self.log_new_index;
        let log = self.log_buffer.as_mut().expect("log buffer exists");

        debug_assert_eq!(index, log.pages.total_size(), "records append at the tip");

        log.pages.insert_lowlevel(index, &entry.encode_header())?;

        if entry.payload_len() > 0 {
            // Snapshot straight out of our own pages; read-only pages
            // cross over by reference.
            log.pages.insert_from(
                index + crate::undo_log::HEADER_SIZE,
                &self.pages,
                offset,
                size,
            )?;
        }

        log.pages.insert_lowlevel(
            index + crate::undo_log::HEADER_SIZE + entry.payload_len(),
            &entry.encode_trailer(),
        )?;

        self.log_new_index.add_assign(entry.total_len());
        self.nb_logs += 1;

        Ok(())
    }

    /// Undoes the most recent not-yet-undone mutation and returns the
    /// offset the caller should move its cursor to.
    ///
    /// The replayed inverse is itself logged, so undo is its own redo:
    /// stepping past the oldest record and undoing again walks back up
    /// through the inverses. Any ordinary edit resets the walk to the
    /// newest record.
    ///
    /// # Errors
    ///
    /// - `BufferError::NothingToUndo` if no log exists or the walk
    ///   reached the oldest retained record.
    /// - `BufferError::ReadOnly` if the buffer refuses mutation.
    pub fn undo(&mut self) -> crate::errors::BufferResult<u64> {
        if self.read_only {
            return Err(crate::errors::BufferError::ReadOnly);
        }

        let end = match self.cursor {
            crate::enums::LogCursor::AtTip => self
                .log_buffer
                .as_ref()
                .map_or(0, |log| log.pages.total_size()),
            crate::enums::LogCursor::AtEntry(entry) => entry,
        };

        if end == 0 {
            return Err(crate::errors::BufferError::NothingToUndo);
        }

        let log = self.log_buffer.as_ref().expect("cursor points into a log");
        let (entry, start) = crate::undo_log::read_entry_before(&log.pages, end)?;
        // The payload is copied out up front: appending the inverse
        // record below may drop the oldest record and shift the log.
        let payload = log
            .pages
            .read(start + crate::undo_log::HEADER_SIZE, entry.payload_len());

        log::trace!(
            "undo {:?} offset={} size={} in '{}'",
            entry.op,
            entry.offset,
            entry.size,
            self.name
        );

        // Step the walk before replaying; if appending the inverse
        // drops the oldest record, the cursor shifts down with it.
        self.cursor = crate::enums::LogCursor::AtEntry(start);

        let caret = match entry.op {
            crate::enums::LogOperation::Insert => {
                // Inverse of an insert: a logged delete of the range.
                self.delete_logged(entry.offset, entry.size)?;

                entry.offset
            }
            crate::enums::LogOperation::Delete => {
                self.addlog(crate::enums::LogOperation::Insert, entry.offset, entry.size)?;
                self.pages.insert_lowlevel(entry.offset, &payload)?;

                entry.offset + entry.size
            }
            crate::enums::LogOperation::Write => {
                // Restore first: the single inverse record then
                // snapshots the restored bytes, so replaying it later
                // leaves the restored content in place.
                self.pages.write_in_place(entry.offset, &payload)?;
                self.addlog(crate::enums::LogOperation::Write, entry.offset, entry.size)?;

                entry.offset + entry.size
            }
        };

        self.modified = entry.was_modified;

        Ok(caret)
    }

    /// Ends the current undo walk: the next undo starts again from
    /// the newest record, which replays the walk's own inverses
    /// first. In an editor any command other than undo calls this.
    pub fn break_undo_chain(&mut self) {
        self.cursor = crate::enums::LogCursor::AtTip;
    }

    /// Discards the whole undo history, typically after a successful
    /// save.
    pub fn reset_log(&mut self) {
        self.log_buffer = None;
        self.log_new_index = 0;
        self.nb_logs = 0;
        self.cursor = crate::enums::LogCursor::AtTip;
    }
}

/*

=====================
===== MUTATIONS =====
=====================

*/

impl EditBuffer {
    fn check_writable(&self) -> crate::errors::BufferResult<()> {
        if self.read_only {
            return Err(crate::errors::BufferError::ReadOnly);
        }

        Ok(())
    }

    fn insert_logged(&mut self, offset: u64, buf: &[u8]) -> crate::errors::BufferResult<()> {
        let size = <usize as TryInto<u64>>::try_into(buf.len())
            .map_err(crate::enums::MathError::ConversionFailed)?;

        if size == 0 {
            return Ok(());
        }

        if offset > self.pages.total_size() {
            return Err(crate::enums::MathError::OutOfBounds(offset).into());
        }

        self.addlog(crate::enums::LogOperation::Insert, offset, size)?;
        self.pages.insert_lowlevel(offset, buf)?;

        Ok(())
    }

    fn delete_logged(&mut self, offset: u64, size: u64) -> crate::errors::BufferResult<()> {
        let size = std::cmp::min(size, self.pages.total_size().saturating_sub(offset));

        if size == 0 {
            return Ok(());
        }

        self.addlog(crate::enums::LogOperation::Delete, offset, size)?;
        self.pages.delete(offset, size)?;

        Ok(())
    }

    /// Inserts `buf` at `offset`, shifting everything after it.
    ///
    /// # Errors
    ///
    /// - `BufferError::ReadOnly` if the buffer refuses mutation.
    /// - `MathError::OutOfBounds` if `offset > total_size`.
    /// - `BufferError::OutOfMemory` if page growth fails.
    pub fn insert(&mut self, offset: u64, buf: &[u8]) -> crate::errors::BufferResult<()> {
        self.check_writable()?;
        self.cursor = crate::enums::LogCursor::AtTip;
        self.insert_logged(offset, buf)
    }

    /// Inserts `buf` at the end of the buffer.
    ///
    /// # Errors
    ///
    /// As for [`EditBuffer::insert`].
    pub fn append(&mut self, buf: &[u8]) -> crate::errors::BufferResult<()> {
        self.insert(self.pages.total_size(), buf)
    }

    /// Deletes `size` bytes at `offset`, clamped to the end of the
    /// buffer; deleting at or past the end is a no-op.
    ///
    /// # Errors
    ///
    /// - `BufferError::ReadOnly` if the buffer refuses mutation.
    /// - `BufferError::OutOfMemory` if copy-on-write promotion fails.
    pub fn delete(&mut self, offset: u64, size: u64) -> crate::errors::BufferResult<()> {
        self.check_writable()?;
        self.cursor = crate::enums::LogCursor::AtTip;
        self.delete_logged(offset, size)
    }

    /// Overwrites bytes at `offset`; whatever extends past the end of
    /// the buffer is inserted instead, so the buffer grows as needed.
    /// The overwrite and the growth are logged as separate records.
    ///
    /// # Errors
    ///
    /// - `BufferError::ReadOnly` if the buffer refuses mutation.
    /// - `MathError::OutOfBounds` if `offset > total_size`.
    /// - `BufferError::OutOfMemory` if promotion or growth fails.
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> crate::errors::BufferResult<()> {
        self.check_writable()?;

        let size = <usize as TryInto<u64>>::try_into(buf.len())
            .map_err(crate::enums::MathError::ConversionFailed)?;

        if size == 0 {
            return Ok(());
        }

        let total = self.pages.total_size();

        if offset > total {
            return Err(crate::enums::MathError::OutOfBounds(offset).into());
        }

        self.cursor = crate::enums::LogCursor::AtTip;

        let in_place = std::cmp::min(size, total - offset);

        if in_place > 0 {
            self.addlog(crate::enums::LogOperation::Write, offset, in_place)?;
            self.pages.write_in_place(offset, &buf[..in_place as usize])?;
        }

        if size > in_place {
            self.insert_logged(offset + in_place, &buf[in_place as usize..])?;
        }

        Ok(())
    }

    /// Insert with observers notified but no record logged; used by
    /// loaders that do not want file content to be undoable.
    pub(crate) fn insert_unlogged(
        &mut self,
        offset: u64,
        buf: &[u8],
    ) -> crate::errors::BufferResult<()> {
        let saved = self.save_log;

        self.save_log = false;

        let result = self.insert_logged(offset, buf);

        self.save_log = saved;

        result
    }

    /// Delete counterpart of [`EditBuffer::insert_unlogged`].
    pub(crate) fn delete_unlogged(
        &mut self,
        offset: u64,
        size: u64,
    ) -> crate::errors::BufferResult<()> {
        let saved = self.save_log;

        self.save_log = false;

        let result = self.delete_logged(offset, size);

        self.save_log = saved;

        result
    }
}

/*

===================
===== QUERIES =====
===================

*/

impl EditBuffer {
    /// Clamped read; see [`crate::pages::Pages::read_into`].
    pub fn read_into(&self, offset: u64, out: &mut [u8]) -> usize {
        self.pages.read_into(offset, out)
    }

    #[must_use]
    pub fn read(&self, offset: u64, size: u64) -> Vec<u8> {
        self.pages.read(offset, size)
    }

    #[must_use]
    pub fn next_char(&self, offset: u64) -> (char, u64) {
        self.pages.next_char(self.charset, offset)
    }

    #[must_use]
    pub fn prev_char(&self, offset: u64) -> (char, u64) {
        self.pages.prev_char(self.charset, offset)
    }

    /// Line and column of `offset`; see
    /// [`crate::pages::Pages::get_pos`].
    #[must_use]
    pub fn get_pos(&self, offset: u64) -> (u64, u64) {
        self.pages.get_pos(self.charset, offset)
    }

    #[must_use]
    pub fn goto_pos(&self, line: u64, col: u64) -> u64 {
        self.pages.goto_pos(self.charset, line, col)
    }

    #[must_use]
    pub fn get_char_offset(&self, offset: u64) -> u64 {
        self.pages.get_char_offset(self.charset, offset)
    }

    #[must_use]
    pub fn goto_char(&self, pos: u64) -> u64 {
        self.pages.goto_char(self.charset, pos)
    }

    /// Offset of the start of the line containing `offset`.
    #[must_use]
    pub fn goto_bol(&self, offset: u64) -> u64 {
        let mut offset = offset;

        loop {
            let (ch, prev) = self.pages.prev_char(self.charset, offset);

            if ch == '\n' {
                return offset;
            }

            offset = prev;
        }
    }

    /// Offset just past the next `'\n'`, or the end of the buffer.
    #[must_use]
    pub fn next_line(&self, offset: u64) -> u64 {
        let mut offset = offset;

        loop {
            let (ch, next) = self.pages.next_char(self.charset, offset);

            if next == offset {
                return offset;
            }

            offset = next;

            if ch == '\n' {
                return offset;
            }
        }
    }
}

/*

===================
===== FILE IO =====
===================

*/

impl EditBuffer {
    /// Loads `path` through the buffer's data type, replacing nothing
    /// on failure. Returns the number of content bytes loaded.
    ///
    /// # Errors
    ///
    /// `BufferError::IoError` and allocation failures from the data
    /// type's loader.
    pub fn load(&mut self, path: &std::path::Path) -> crate::errors::BufferResult<u64> {
        let data_type = std::rc::Rc::clone(&self.data_type);

        data_type.load(self, path)
    }

    /// Saves through the buffer's data type. On success the modified
    /// flag clears and the undo history is discarded.
    ///
    /// # Errors
    ///
    /// `BufferError::IoError` from the data type's saver.
    pub fn save(&mut self, path: &std::path::Path) -> crate::errors::BufferResult<u64> {
        let data_type = std::rc::Rc::clone(&self.data_type);

        data_type.save(self, path)
    }

    /// Tears the buffer down: runs the data type's close hook, then
    /// drops the content, the undo history and the observers. Pages
    /// shared into other stores outlive this through their own
    /// references. The registry calls this when removing a buffer.
    pub fn close(&mut self) {
        let data_type = std::rc::Rc::clone(&self.data_type);

        data_type.close(self);
        self.save_log = false;
        self.callbacks.clear();
        self.pages = crate::pages::Pages::new();
        self.reset_log();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::LogOperation;
    use crate::errors::BufferError;

    fn text(buffer: &EditBuffer) -> Vec<u8> {
        buffer.read(0, buffer.total_size())
    }

    #[test]
    fn insert_delete_round_trip() {
        let mut buffer = EditBuffer::new("scratch");

        assert!(!buffer.modified());

        buffer.insert(0, b"hello world").unwrap();
        buffer.delete(5, 6).unwrap();
        buffer.append(b"!").unwrap();

        assert_eq!(text(&buffer), b"hello!");
        assert!(buffer.modified());
    }

    #[test]
    fn write_overwrites_and_extends() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"abcdef").unwrap();
        buffer.write(4, b"XYZW").unwrap();

        assert_eq!(text(&buffer), b"abcdXYZW");
    }

    #[test]
    fn out_of_bounds_insert_is_rejected() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"abc").unwrap();

        assert!(matches!(
            buffer.insert(4, b"x"),
            Err(BufferError::Math(crate::enums::MathError::OutOfBounds(4)))
        ));
        // The store is untouched.
        assert_eq!(text(&buffer), b"abc");
    }

    #[test]
    fn read_only_buffers_refuse_mutation() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"abc").unwrap();
        buffer.set_read_only(true);

        assert!(matches!(buffer.insert(0, b"x"), Err(BufferError::ReadOnly)));
        assert!(matches!(buffer.delete(0, 1), Err(BufferError::ReadOnly)));
        assert!(matches!(buffer.write(0, b"x"), Err(BufferError::ReadOnly)));
        assert!(matches!(buffer.undo(), Err(BufferError::ReadOnly)));
        assert_eq!(text(&buffer), b"abc");
    }

    #[test]
    fn undo_walks_back_through_the_history() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"hello\nworld").unwrap();
        assert_eq!(buffer.get_pos(6), (1, 0));

        buffer.delete(0, 6).unwrap();
        assert_eq!(text(&buffer), b"world");

        // First undo restores the deleted line front.
        let caret = buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"hello\nworld");
        assert_eq!(caret, 6);

        // Second undo reaches the original insert and removes it.
        let caret = buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"");
        assert_eq!(caret, 0);

        assert!(matches!(buffer.undo(), Err(BufferError::NothingToUndo)));
    }

    #[test]
    fn undo_restores_overwritten_bytes() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"abcdef").unwrap();
        buffer.write(1, b"BCD").unwrap();
        assert_eq!(text(&buffer), b"aBCDef");

        let caret = buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"abcdef");
        assert_eq!(caret, 4);
    }

    #[test]
    fn replaying_an_undone_write_keeps_the_restored_bytes() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"abcdef").unwrap();
        buffer.write(0, b"XYZ").unwrap();
        assert_eq!(text(&buffer), b"XYZdef");

        buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"abcdef");

        // The inverse record snapshots the restored bytes; walking
        // over it again from the tip must not re-apply the overwrite.
        buffer.break_undo_chain();
        buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"abcdef");
    }

    #[test]
    fn undo_restores_the_modified_flag() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"x").unwrap();
        assert!(buffer.modified());

        buffer.undo().unwrap();
        assert!(!buffer.modified(), "undoing the only edit restores a clean flag");
    }

    #[test]
    fn undo_is_its_own_redo() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"keep").unwrap();
        buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"");

        // The undo logged its inverse; breaking the chain and undoing
        // again replays it from the tip.
        buffer.break_undo_chain();
        buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"keep");
    }

    #[test]
    fn an_edit_resets_the_undo_walk_to_the_tip() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"ab").unwrap();
        buffer.insert(2, b"cd").unwrap();
        buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"ab");

        // A fresh edit: the next undo targets it, not older history.
        buffer.append(b"XY").unwrap();
        buffer.undo().unwrap();
        assert_eq!(text(&buffer), b"ab");
    }

    #[test]
    fn the_log_is_bounded() {
        let mut buffer = EditBuffer::new("scratch");

        for _ in 0..(crate::undo_log::NB_LOGS_MAX * 4) {
            buffer.append(b"chunk ").unwrap();
        }

        assert!(buffer.nb_log_entries() <= crate::undo_log::NB_LOGS_MAX);

        // The retained records undo cleanly until the history runs
        // out; no undo may corrupt the content.
        let mut undone = 0u64;

        loop {
            match buffer.undo() {
                Ok(_) => undone += 1,
                Err(BufferError::NothingToUndo) => break,
                Err(err) => panic!("unexpected undo failure: {err}"),
            }

            assert!(undone <= 1000, "the undo walk must terminate");
        }

        assert!(undone > 0);
        assert_eq!(
            buffer.total_size(),
            (crate::undo_log::NB_LOGS_MAX * 4 - undone) * 6,
            "every undo removed exactly one appended chunk"
        );
        assert!(text(&buffer)
            .chunks(6)
            .all(|chunk| chunk == b"chunk "));
    }

    #[test]
    fn reset_log_discards_the_history() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"data").unwrap();
        buffer.reset_log();

        assert!(matches!(buffer.undo(), Err(BufferError::NothingToUndo)));
        assert_eq!(text(&buffer), b"data");
    }

    #[test]
    fn the_mark_tracks_surrounding_edits() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"hello world").unwrap();
        buffer.set_mark(6); // at 'w'

        // Insert before the mark shifts it right.
        buffer.insert(0, b">> ").unwrap();
        assert_eq!(buffer.mark(), 9);

        // Insert after the mark leaves it alone.
        buffer.append(b"!").unwrap();
        assert_eq!(buffer.mark(), 9);

        // Delete before the mark shifts it left.
        buffer.delete(0, 3).unwrap();
        assert_eq!(buffer.mark(), 6);

        // Delete covering the mark clamps it to the deletion start.
        buffer.delete(4, 5).unwrap();
        assert_eq!(buffer.mark(), 4);
    }

    #[test]
    fn the_mark_follows_undone_edits() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"abcdef").unwrap();
        buffer.set_mark(6);
        buffer.delete(0, 3).unwrap();
        assert_eq!(buffer.mark(), 3);

        // Restoring the range through undo shifts the mark back out.
        buffer.undo().unwrap();
        assert_eq!(buffer.mark(), 6);
    }

    #[test]
    fn callbacks_fire_and_detach() {
        let mut buffer = EditBuffer::new("scratch");
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&seen);
        let id = buffer.add_callback(Box::new(move |op, offset, size| {
            sink.borrow_mut().push((op, offset, size));
        }));

        buffer.insert(0, b"abcd").unwrap();
        buffer.delete(1, 2).unwrap();
        buffer.write(0, b"X").unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (LogOperation::Insert, 0, 4),
                (LogOperation::Delete, 1, 2),
                (LogOperation::Write, 0, 1),
            ]
        );

        assert!(buffer.remove_callback(id));
        assert!(!buffer.remove_callback(id));

        buffer.append(b"y").unwrap();
        assert_eq!(seen.borrow().len(), 3, "detached observers stay silent");
    }

    #[test]
    fn unlogged_mutations_notify_but_do_not_log() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.set_mark(0);
        buffer.insert_unlogged(0, b"quiet").unwrap();

        assert_eq!(text(&buffer), b"quiet");
        assert_eq!(buffer.nb_log_entries(), 0);
        assert!(matches!(buffer.undo(), Err(BufferError::NothingToUndo)));

        buffer.delete_unlogged(0, 5).unwrap();
        assert_eq!(buffer.nb_log_entries(), 0);
    }

    #[test]
    fn line_navigation_helpers() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, b"one\ntwo\nthree").unwrap();

        assert_eq!(buffer.goto_bol(0), 0);
        assert_eq!(buffer.goto_bol(2), 0);
        assert_eq!(buffer.goto_bol(6), 4);
        assert_eq!(buffer.goto_bol(13), 8);

        assert_eq!(buffer.next_line(0), 4);
        assert_eq!(buffer.next_line(5), 8);
        assert_eq!(buffer.next_line(9), 13, "last line ends at the buffer end");
    }

    #[test]
    fn charset_switch_redoes_position_math() {
        let mut buffer = EditBuffer::new("scratch");

        buffer.insert(0, "aé".as_bytes()).unwrap();
        assert_eq!(buffer.get_pos(3), (0, 2));

        buffer.set_charset(crate::charset::Charset::EightBit);
        assert_eq!(buffer.get_pos(3), (0, 3));
        assert_eq!(buffer.get_char_offset(3), 3);
    }
}
