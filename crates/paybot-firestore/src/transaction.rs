//! Sequential write batches.
//!
//! Emulates the driver's transaction callback over plain REST writes. The
//! batch is NOT atomic and NOT isolated: writes replay in enqueue order, and
//! a failure at position k leaves writes 1..k-1 applied and k+1..n never
//! issued. Callers that need compensation handle it themselves.

use std::collections::HashMap;

use tracing::debug;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::Value;

#[derive(Debug, Clone)]
enum BatchOp {
    Update {
        collection: String,
        doc_id: String,
        fields: HashMap<String, Value>,
    },
    Set {
        collection: String,
        doc_id: String,
        fields: HashMap<String, Value>,
        merge: bool,
    },
}

/// An ordered queue of document writes, committed one at a time.
#[derive(Debug, Default)]
pub struct TransactionBatch {
    ops: Vec<BatchOp>,
}

impl TransactionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update of an existing document (fails on commit if absent).
    pub fn update(
        &mut self,
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        fields: HashMap<String, Value>,
    ) -> &mut Self {
        self.ops.push(BatchOp::Update {
            collection: collection.into(),
            doc_id: doc_id.into(),
            fields,
        });
        self
    }

    /// Queue an upsert; with `merge`, untouched fields survive.
    pub fn set(
        &mut self,
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        fields: HashMap<String, Value>,
        merge: bool,
    ) -> &mut Self {
        self.ops.push(BatchOp::Set {
            collection: collection.into(),
            doc_id: doc_id.into(),
            fields,
            merge,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replay the queued writes in order, awaiting each one. The first
    /// failure aborts the rest and is returned as-is.
    pub async fn commit(self, client: &FirestoreClient) -> FirestoreResult<()> {
        let total = self.ops.len();
        for (index, op) in self.ops.into_iter().enumerate() {
            match op {
                BatchOp::Update {
                    collection,
                    doc_id,
                    fields,
                } => {
                    client.update_document(&collection, &doc_id, fields).await?;
                }
                BatchOp::Set {
                    collection,
                    doc_id,
                    fields,
                    merge,
                } => {
                    client
                        .set_document(&collection, &doc_id, fields, merge)
                        .await?;
                }
            }
            debug!(index = index + 1, total, "batch write applied");
        }
        Ok(())
    }
}

impl FirestoreClient {
    /// Build a batch inside a callback and commit it.
    pub async fn run_transaction<F>(&self, build: F) -> FirestoreResult<()>
    where
        F: FnOnce(&mut TransactionBatch),
    {
        let mut batch = TransactionBatch::new();
        build(&mut batch);
        batch.commit(self).await
    }
}
