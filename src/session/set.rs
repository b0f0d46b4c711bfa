//! Two-phase SET transaction state machine.
//!
//! The master drives each write through TestSet, CommitSet, optionally
//! UndoSet, and finally CleanupSet, all sharing one transaction id. The
//! table below holds the per-transaction state between those PDUs and
//! guarantees each handler hook runs at most once per transaction, in
//! protocol order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::handler::SetHandler;
use crate::pdu::{ResponseError, ResponsePdu, TestSetPdu};
use crate::varbind::VarBind;

use super::Region;

const TARGET: &str = "async_agentx::set";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetPhase {
    Testing,
    TestedOk,
    TestFailed,
    Committed,
    CommitFailed,
    Undone,
}

struct SetTransaction {
    varbinds: Vec<VarBind>,
    handler: Option<Arc<dyn SetHandler>>,
    phase: SetPhase,
    touched: Instant,
}

impl SetTransaction {
    fn touch(&mut self) {
        self.touched = Instant::now();
    }
}

/// Open SET transactions, keyed by the PDU transaction id.
pub(crate) struct TransactionTable {
    map: HashMap<u32, SetTransaction>,
    /// Transactions idle past this duration are garbage-collected with a
    /// synthetic cleanup.
    timeout: Duration,
}

impl TransactionTable {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            map: HashMap::new(),
            timeout,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Process a TestSet PDU, creating the transaction.
    pub(crate) async fn test_set(
        &mut self,
        txid: u32,
        body: &TestSetPdu,
        regions: &[Region],
        uptime: u32,
    ) -> ResponsePdu {
        // A reused transaction id supersedes the old transaction; the old
        // one is synthetically cleaned so its handler contract holds.
        if let Some(old) = self.map.remove(&txid) {
            warn!(target: TARGET, txid, "transaction id reused before CleanupSet");
            Self::run_cleanup(old).await;
        }

        let context = body.context.as_deref();

        // Every varbind must land in one writable region; the first one
        // that does not pins the error index.
        let mut handler: Option<Arc<dyn SetHandler>> = None;
        let mut failure: Option<(ResponseError, u16)> = None;
        for (i, vb) in body.varbinds.iter().enumerate() {
            let index = (i + 1) as u16;
            let region = regions.iter().find(|r| {
                r.registered && r.context_matches(context) && r.spec.subtree.is_prefix_of(&vb.oid)
            });
            let Some(owner) = region.and_then(|r| r.spec.options.set_handler.clone()) else {
                failure = Some((ResponseError::NotWritable, index));
                break;
            };
            if let Some(existing) = &handler {
                // One handler per transaction; a varbind under a
                // different region cannot join it.
                if !Arc::ptr_eq(&owner, existing) {
                    debug!(
                        target: TARGET,
                        txid,
                        index,
                        "varbinds span multiple writable regions"
                    );
                    failure = Some((ResponseError::InconsistentName, index));
                    break;
                }
            } else {
                handler = Some(owner);
            }
        }

        if let Some((code, index)) = failure {
            // Parked until the master's CleanupSet; no hooks will run.
            self.map.insert(
                txid,
                SetTransaction {
                    varbinds: body.varbinds.clone(),
                    handler: None,
                    phase: SetPhase::TestFailed,
                    touched: Instant::now(),
                },
            );
            return ResponsePdu::error(uptime, code, index);
        }

        let mut tx = SetTransaction {
            varbinds: body.varbinds.clone(),
            handler,
            phase: SetPhase::Testing,
            touched: Instant::now(),
        };

        let response = match &tx.handler {
            None => {
                // An empty varbind list has nothing to test.
                tx.phase = SetPhase::TestedOk;
                ResponsePdu::success(uptime, Vec::new())
            }
            Some(handler) => match handler.test(&tx.varbinds).await {
                Ok(()) => {
                    tx.phase = SetPhase::TestedOk;
                    ResponsePdu::success(uptime, Vec::new())
                }
                Err(e) => {
                    debug!(target: TARGET, txid, error = %e, "test phase rejected");
                    tx.phase = SetPhase::TestFailed;
                    ResponsePdu::error(uptime, e.code.response_error(), e.index)
                }
            },
        };

        tx.touch();
        self.map.insert(txid, tx);
        response
    }

    /// Process a CommitSet PDU.
    pub(crate) async fn commit_set(&mut self, txid: u32, uptime: u32) -> ResponsePdu {
        let Some(tx) = self.map.get_mut(&txid) else {
            return ResponsePdu::error(uptime, ResponseError::ProcessingError, 0);
        };
        if tx.phase != SetPhase::TestedOk {
            warn!(target: TARGET, txid, phase = ?tx.phase, "CommitSet out of order");
            return ResponsePdu::error(uptime, ResponseError::ProcessingError, 0);
        }

        tx.touch();
        match &tx.handler {
            None => {
                tx.phase = SetPhase::Committed;
                ResponsePdu::success(uptime, Vec::new())
            }
            Some(handler) => match handler.commit(&tx.varbinds).await {
                Ok(()) => {
                    tx.phase = SetPhase::Committed;
                    ResponsePdu::success(uptime, Vec::new())
                }
                Err(e) => {
                    warn!(target: TARGET, txid, error = %e, "commit phase failed");
                    tx.phase = SetPhase::CommitFailed;
                    ResponsePdu::error(uptime, ResponseError::CommitFailed, e.index)
                }
            },
        }
    }

    /// Process an UndoSet PDU.
    pub(crate) async fn undo_set(&mut self, txid: u32, uptime: u32) -> ResponsePdu {
        let Some(tx) = self.map.get_mut(&txid) else {
            return ResponsePdu::error(uptime, ResponseError::ProcessingError, 0);
        };
        if !matches!(tx.phase, SetPhase::Committed | SetPhase::CommitFailed) {
            warn!(target: TARGET, txid, phase = ?tx.phase, "UndoSet out of order");
            return ResponsePdu::error(uptime, ResponseError::ProcessingError, 0);
        }

        tx.touch();
        let result = match &tx.handler {
            None => Ok(()),
            Some(handler) => handler.undo(&tx.varbinds).await,
        };
        tx.phase = SetPhase::Undone;
        match result {
            Ok(()) => ResponsePdu::success(uptime, Vec::new()),
            Err(e) => {
                warn!(target: TARGET, txid, error = %e, "undo phase failed");
                ResponsePdu::error(uptime, ResponseError::UndoFailed, e.index)
            }
        }
    }

    /// Process a CleanupSet PDU. No Response goes on the wire.
    pub(crate) async fn cleanup_set(&mut self, txid: u32) {
        match self.map.remove(&txid) {
            Some(tx) => Self::run_cleanup(tx).await,
            None => debug!(target: TARGET, txid, "CleanupSet for unknown transaction"),
        }
    }

    /// Garbage-collect transactions that never saw a CleanupSet.
    pub(crate) async fn sweep(&mut self) {
        let expired: Vec<u32> = self
            .map
            .iter()
            .filter(|(_, tx)| tx.touched.elapsed() > self.timeout)
            .map(|(&txid, _)| txid)
            .collect();
        for txid in expired {
            warn!(target: TARGET, txid, "transaction timed out, running synthetic cleanup");
            if let Some(tx) = self.map.remove(&txid) {
                Self::run_cleanup(tx).await;
            }
        }
    }

    /// Drop every transaction with a synthetic cleanup. Used when the
    /// connection goes away and the master's transactions die with it.
    pub(crate) async fn teardown(&mut self) {
        for (txid, tx) in self.map.drain().collect::<Vec<_>>() {
            debug!(target: TARGET, txid, "cleaning transaction on teardown");
            Self::run_cleanup(tx).await;
        }
    }

    async fn run_cleanup(tx: SetTransaction) {
        if let Some(handler) = &tx.handler {
            handler.cleanup(&tx.varbinds).await;
        }
    }
}
