use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_ingested: AtomicU64,
    queries_answered: AtomicU64,
    queries_without_context: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks stored for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a query answered by the language model.
    pub fn record_answered(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query that retrieved nothing above the score threshold.
    pub fn record_no_context(&self) {
        self.queries_without_context
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            queries_without_context: self.queries_without_context.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks stored across all ingested documents.
    pub chunks_ingested: u64,
    /// Queries that reached the language model.
    pub queries_answered: u64,
    /// Queries short-circuited because retrieval found nothing.
    pub queries_without_context: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_ingested, 5);
    }

    #[test]
    fn query_outcomes_are_counted_separately() {
        let metrics = PipelineMetrics::new();
        metrics.record_answered();
        metrics.record_no_context();
        metrics.record_no_context();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_answered, 1);
        assert_eq!(snapshot.queries_without_context, 2);
        assert_eq!(snapshot.documents_ingested, 0);
    }
}
