//! Session-scoped tally of recurring problem words.

use serde::Serialize;
use std::collections::HashMap;
use std::time::SystemTime;

/// One recurring problem word.
#[derive(Debug, Clone, Serialize)]
pub struct MissedWordRecord {
    pub word: String,
    pub occurrences: u32,
    #[serde(skip)]
    pub last_missed: SystemTime,
}

/// Tally owned by the practice session; cleared only on session reset.
#[derive(Debug, Default)]
pub struct MissedWordLedger {
    records: HashMap<String, MissedWordRecord>,
}

impl MissedWordLedger {
    pub fn record(&mut self, word: &str) {
        let now = SystemTime::now();
        self.records
            .entry(word.to_string())
            .and_modify(|record| {
                record.occurrences += 1;
                record.last_missed = now;
            })
            .or_insert_with(|| MissedWordRecord {
                word: word.to_string(),
                occurrences: 1,
                last_missed: now,
            });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records sorted by occurrence count descending, ties alphabetical.
    pub fn sorted_records(&self) -> Vec<MissedWordRecord> {
        let mut records: Vec<MissedWordRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.word.cmp(&b.word))
        });
        records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_misses_accumulate() {
        let mut ledger = MissedWordLedger::default();
        ledger.record("dinner");
        ledger.record("dinner");
        ledger.record("home");

        let records = ledger.sorted_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].word, "dinner");
        assert_eq!(records[0].occurrences, 2);
        assert_eq!(records[1].word, "home");
    }

    #[test]
    fn ties_sort_alphabetically() {
        let mut ledger = MissedWordLedger::default();
        ledger.record("zebra");
        ledger.record("apple");

        let records = ledger.sorted_records();
        assert_eq!(records[0].word, "apple");
        assert_eq!(records[1].word, "zebra");
    }

    #[test]
    fn clear_empties_the_ledger() {
        let mut ledger = MissedWordLedger::default();
        ledger.record("word");
        assert!(!ledger.is_empty());
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
    }
}
