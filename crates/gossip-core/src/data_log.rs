//! Bounded log of the latest payload per originator.
//!
//! The log is a 25-slot ring. Each originator owns at most one slot, updated
//! in place when a newer payload arrives; a previously unseen originator
//! claims the next ring slot, overwriting the oldest entry once all slots
//! are taken. Payload bytes are stored in fixed per-slot buffers that are
//! reused across updates.

use crate::message::MESSAGE_MAX_SIZE;
use crate::vector_clock::VectorRecord;

pub const DATA_LOG_SIZE: usize = 25;

#[derive(Clone)]
pub struct DataLogRecord {
    pub version: VectorRecord,
    data_size: u16,
    data: [u8; MESSAGE_MAX_SIZE],
}

impl DataLogRecord {
    fn new(version: VectorRecord, payload: &[u8]) -> Self {
        let mut record = Self {
            version,
            data_size: 0,
            data: [0u8; MESSAGE_MAX_SIZE],
        };
        record.fill(payload);
        record
    }

    fn fill(&mut self, payload: &[u8]) {
        self.data_size = payload.len() as u16;
        self.data[..payload.len()].copy_from_slice(payload);
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data_size as usize]
    }
}

#[derive(Clone, Default)]
pub struct DataLog {
    records: Vec<DataLogRecord>,
    current_idx: usize,
}

impl DataLog {
    pub fn new() -> Self {
        Self {
            records: Vec::with_capacity(DATA_LOG_SIZE),
            current_idx: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataLogRecord> {
        self.records.iter()
    }

    pub fn find(&self, member_id: u64) -> Option<&DataLogRecord> {
        self.records
            .iter()
            .find(|r| r.version.member_id == member_id)
    }

    /// Stores `payload` as the latest message from `version.member_id`.
    pub fn update(&mut self, version: VectorRecord, payload: &[u8]) {
        debug_assert!(payload.len() <= MESSAGE_MAX_SIZE);

        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.version.member_id == version.member_id)
        {
            record.version.sequence_number = version.sequence_number;
            record.fill(payload);
            return;
        }

        let record = DataLogRecord::new(version, payload);
        let idx = if self.records.len() < DATA_LOG_SIZE {
            self.records.push(record);
            self.records.len() - 1
        } else {
            self.records[self.current_idx] = record;
            self.current_idx
        };
        self.current_idx = (idx + 1) % DATA_LOG_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(member_id: u64, seq: u32) -> VectorRecord {
        VectorRecord {
            sequence_number: seq,
            member_id,
        }
    }

    #[test]
    fn one_slot_per_originator() {
        let mut log = DataLog::new();
        log.update(record(1, 1), b"first");
        log.update(record(1, 2), b"second");
        assert_eq!(log.len(), 1);
        let stored = log.find(1).unwrap();
        assert_eq!(stored.version.sequence_number, 2);
        assert_eq!(stored.payload(), b"second");
    }

    #[test]
    fn size_is_bounded() {
        let mut log = DataLog::new();
        for id in 0..40u64 {
            log.update(record(id, 1), b"payload");
        }
        assert_eq!(log.len(), DATA_LOG_SIZE);
    }

    #[test]
    fn overflow_reclaims_oldest_round_robin() {
        let mut log = DataLog::new();
        for id in 0..DATA_LOG_SIZE as u64 {
            log.update(record(id, 1), b"x");
        }
        log.update(record(100, 1), b"new");
        assert!(log.find(100).is_some());
        assert!(log.find(0).is_none());

        log.update(record(101, 1), b"newer");
        assert!(log.find(100).is_some());
        assert!(log.find(1).is_none());
    }

    #[test]
    fn payload_shrinks_in_place() {
        let mut log = DataLog::new();
        log.update(record(1, 1), b"a longer payload");
        log.update(record(1, 2), b"short");
        assert_eq!(log.find(1).unwrap().payload(), b"short");
    }
}
