use std::sync::{Arc, Mutex};

use testharness::dag::JobRecord;
use testharness::report::ResultSink;

/// Result sink whose records stay readable after it was handed to a
/// `Runtime` as a `Box<dyn ResultSink>`.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<JobRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far, in stream order.
    pub fn records(&self) -> Vec<JobRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.name).collect()
    }
}

impl ResultSink for RecordingSink {
    fn job_finished(&mut self, record: &JobRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
