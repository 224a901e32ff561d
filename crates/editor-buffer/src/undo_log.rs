//! Binary layout of undo-log records.
//!
//! The log itself is an ordinary byte store (see
//! [`crate::buffer::EditBuffer`]'s log buffer); each record is laid
//! out for backward traversal:
//!
//! ```text
//! | header (18 bytes) | payload (0..n bytes) | trailer (8 bytes) |
//! ```
//!
//! The trailer repeats the payload length, so a reader positioned at
//! the end of a record can find the start of its header without any
//! out-of-band index. Insert records carry no payload (undoing an
//! insert needs no saved bytes); write and delete records snapshot
//! the bytes they destroyed.

/// Fixed byte length of a record header.
pub const HEADER_SIZE: u64 = 18;

/// Fixed byte length of a record trailer.
pub const TRAILER_SIZE: u64 = 8;

/// Retained record count per buffer; appending the record that would
/// exceed this drops the oldest one first.
pub const NB_LOGS_MAX: u64 = 50;

/// Decoded record header.
///
/// `op` and `offset`/`size` describe the original mutation; the saved
/// payload (for write and delete) lives in the log store right after
/// the header. `was_modified` snapshots the buffer's modified flag
/// from before the mutation so undo can restore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub op: crate::enums::LogOperation,
    pub was_modified: bool,
    pub offset: u64,
    pub size: u64,
}

impl LogEntry {
    /// Payload bytes carried by this record.
    #[inline]
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        match self.op {
            crate::enums::LogOperation::Write | crate::enums::LogOperation::Delete => self.size,
            crate::enums::LogOperation::Insert => 0,
        }
    }

    /// Full on-disk length of the record.
    #[inline]
    #[must_use]
    pub fn total_len(&self) -> u64 {
        HEADER_SIZE + self.payload_len() + TRAILER_SIZE
    }

    #[must_use]
    pub fn encode_header(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];

        buf[0] = self.op.to_byte();
        buf[1] = u8::from(self.was_modified);
        buf[2..10].copy_from_slice(&self.offset.to_le_bytes());
        buf[10..18].copy_from_slice(&self.size.to_le_bytes());

        buf
    }

    /// # Errors
    ///
    /// `BufferError::CorruptLog` if the operation byte is unknown.
    pub fn decode_header(
        buf: &[u8; HEADER_SIZE as usize],
    ) -> crate::errors::BufferResult<Self> {
        let op = crate::enums::LogOperation::from_byte(buf[0])
            .ok_or(crate::errors::BufferError::CorruptLog)?;
        let offset = u64::from_le_bytes(buf[2..10].try_into().expect("slice is 8 bytes"));
        let size = u64::from_le_bytes(buf[10..18].try_into().expect("slice is 8 bytes"));

        Ok(Self {
            op,
            was_modified: buf[1] != 0,
            offset,
            size,
        })
    }

    #[must_use]
    pub fn encode_trailer(&self) -> [u8; TRAILER_SIZE as usize] {
        self.payload_len().to_le_bytes()
    }
}

/// Steps backward over the record ending at `end` in the log store.
///
/// Returns the decoded header and the offset of its first byte (which
/// is also the `end` of the record before it). The payload, when
/// present, starts `HEADER_SIZE` past that offset.
///
/// # Errors
///
/// `BufferError::CorruptLog` if `end` does not sit on a record
/// boundary or the header does not decode.
pub fn read_entry_before(
    log: &crate::pages::Pages,
    end: u64,
) -> crate::errors::BufferResult<(LogEntry, u64)> {
    if end < HEADER_SIZE + TRAILER_SIZE || end > log.total_size() {
        return Err(crate::errors::BufferError::CorruptLog);
    }

    let mut trailer = [0u8; TRAILER_SIZE as usize];

    log.read_into(end - TRAILER_SIZE, &mut trailer);

    let payload_len = u64::from_le_bytes(trailer);
    let header_start = end
        .checked_sub(TRAILER_SIZE + payload_len + HEADER_SIZE)
        .ok_or(crate::errors::BufferError::CorruptLog)?;
    let mut header = [0u8; HEADER_SIZE as usize];

    log.read_into(header_start, &mut header);

    let entry = LogEntry::decode_header(&header)?;

    if entry.payload_len() != payload_len {
        return Err(crate::errors::BufferError::CorruptLog);
    }

    Ok((entry, header_start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::LogOperation;

    #[test]
    fn header_encoding_round_trips() {
        let entry = LogEntry {
            op: LogOperation::Delete,
            was_modified: true,
            offset: 0x1122_3344_5566,
            size: 42,
        };
        let decoded = LogEntry::decode_header(&entry.encode_header()).unwrap();

        assert_eq!(decoded, entry);
    }

    #[test]
    fn payload_length_depends_on_the_operation() {
        let write = LogEntry {
            op: LogOperation::Write,
            was_modified: false,
            offset: 0,
            size: 7,
        };
        let insert = LogEntry {
            op: LogOperation::Insert,
            ..write
        };
        let delete = LogEntry {
            op: LogOperation::Delete,
            ..write
        };

        assert_eq!(write.payload_len(), 7);
        assert_eq!(delete.payload_len(), 7);
        assert_eq!(insert.payload_len(), 0);

        assert_eq!(write.total_len(), HEADER_SIZE + 7 + TRAILER_SIZE);
        assert_eq!(insert.total_len(), HEADER_SIZE + TRAILER_SIZE);
    }

    #[test]
    fn unknown_operation_byte_is_rejected() {
        let mut buf = [0u8; HEADER_SIZE as usize];

        buf[0] = 0xff;

        assert!(matches!(
            LogEntry::decode_header(&buf),
            Err(crate::errors::BufferError::CorruptLog)
        ));
    }

    #[test]
    fn backward_traversal_finds_each_record() {
        // Append two records by hand, then walk them back to front.
        let mut log = crate::pages::Pages::new();
        let first = LogEntry {
            op: LogOperation::Delete,
            was_modified: false,
            offset: 3,
            size: 4,
        };
        let second = LogEntry {
            op: LogOperation::Insert,
            was_modified: true,
            offset: 9,
            size: 2,
        };

        log.insert_lowlevel(0, &first.encode_header()).unwrap();
        log.insert_lowlevel(HEADER_SIZE, b"body").unwrap();
        log.insert_lowlevel(HEADER_SIZE + 4, &first.encode_trailer())
            .unwrap();

        let tip = log.total_size();
        log.insert_lowlevel(tip, &second.encode_header()).unwrap();
        log.insert_lowlevel(tip + HEADER_SIZE, &second.encode_trailer())
            .unwrap();

        let (entry, start) = read_entry_before(&log, log.total_size()).unwrap();
        assert_eq!(entry, second);
        assert_eq!(start, first.total_len());

        let (entry, start) = read_entry_before(&log, start).unwrap();
        assert_eq!(entry, first);
        assert_eq!(start, 0);

        // Nothing before the first record.
        assert!(read_entry_before(&log, start).is_err());
    }
}
