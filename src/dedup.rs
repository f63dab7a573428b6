use std::collections::HashMap;

use crate::parser::records::ContactRecord;

/// What makes two records the same contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Email(String),
    NamePhone(Option<String>, Option<String>),
}

impl IdentityKey {
    pub fn of(record: &ContactRecord) -> Option<Self> {
        if let Some(email) = record.email.as_deref().filter(|e| !e.is_empty()) {
            return Some(IdentityKey::Email(email.to_string()));
        }
        let name = record
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase);
        let phone = record
            .phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if name.is_none() && phone.is_none() {
            None
        } else {
            Some(IdentityKey::NamePhone(name, phone))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Merged,
}

/// Running set of unique records, in first-seen order.
#[derive(Debug, Default)]
pub struct Deduplicator {
    records: Vec<ContactRecord>,
    index: HashMap<IdentityKey, usize>,
    total_extracted: usize,
    duplicates_removed: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, record: ContactRecord) -> Outcome {
        match IdentityKey::of(&record) {
            Some(key) => self.insert_with_key(key, record),
            None => {
                self.total_extracted += 1;
                self.records.push(record);
                Outcome::Inserted
            }
        }
    }

    /// Offer a record under a key computed by the caller.
    pub fn insert_with_key(&mut self, key: IdentityKey, record: ContactRecord) -> Outcome {
        self.total_extracted += 1;
        match self.index.get(&key) {
            Some(&idx) => {
                self.records[idx].fill_from(record);
                self.duplicates_removed += 1;
                Outcome::Merged
            }
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
                Outcome::Inserted
            }
        }
    }

    pub fn records(&self) -> &[ContactRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ContactRecord> {
        self.records
    }

    pub fn total_extracted(&self) -> usize {
        self.total_extracted
    }

    pub fn unique_count(&self) -> usize {
        self.records.len()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }
}

// ── Tests ──
