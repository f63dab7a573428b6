use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dedup::Deduplicator;
use crate::parser::records::ContactRecord;
use crate::parser::PageContacts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_extracted: usize,
    pub unique_count: usize,
    pub duplicates_removed: usize,
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub rejected_candidates: usize,
}

impl RunStats {
    pub fn pages_attempted(&self) -> usize {
        self.pages_processed + self.pages_failed
    }

    /// Share of attempted pages that were processed; 0.0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        match self.pages_attempted() {
            0 => 0.0,
            attempted => self.pages_processed as f64 / attempted as f64,
        }
    }
}

/// Outcome of one page, kept for the run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLog {
    pub source: String,
    pub error: Option<String>,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub records: Vec<ContactRecord>,
    pub stats: RunStats,
    pub pages: Vec<PageLog>,
}

/// Owns the run state: the deduplicated set plus page counters.
#[derive(Debug, Default)]
pub struct Aggregator {
    dedup: Deduplicator,
    pages_processed: usize,
    pages_failed: usize,
    rejected: usize,
    pages: Vec<PageLog>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest_page(&mut self, page: PageContacts) {
        self.pages_processed += 1;
        self.rejected += page.rejected;
        self.pages.push(PageLog {
            source: page.source,
            error: None,
            records: page.records.len(),
        });
        for record in page.records {
            self.dedup.offer(record);
        }
    }

    pub fn page_failed(&mut self, source: &str, error: &anyhow::Error) {
        warn!(page = %source, "Page failed: {:#}", error);
        self.pages_failed += 1;
        self.pages.push(PageLog {
            source: source.to_string(),
            error: Some(format!("{:#}", error)),
            records: 0,
        });
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            total_extracted: self.dedup.total_extracted(),
            unique_count: self.dedup.unique_count(),
            duplicates_removed: self.dedup.duplicates_removed(),
            pages_processed: self.pages_processed,
            pages_failed: self.pages_failed,
            rejected_candidates: self.rejected,
        }
    }

    pub fn finish(self) -> Report {
        let stats = self.stats();
        Report {
            records: self.dedup.into_records(),
            stats,
            pages: self.pages,
        }
    }
}

// ── Tests ──
