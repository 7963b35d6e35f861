//! Reserve verification and solvency reconciliation.
//!
//! ledger read -> commitment -> state read -> guard -> sequence -> audit
//!
//! - The pre-sequence phase is bounded by `run_timeout`. Once the first
//!   instruction is submitted the run completes or fails fast; it is never
//!   abandoned mid-sequence.
//! - Steps run strictly in order, each confirmed before the next is sent.
//!   A failed step stops the run; earlier steps stay applied.
//! - Audit and stamping writes are best-effort: on-chain state is the record.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;
use w3b_chain::{await_confirmation, read_state, ChainError, ChainRpc, Instruction, TxSignature};
use w3b_commitment::{Commitment, CommitmentTree};
use w3b_config::W3bConfig;
use w3b_reconcile::{
    evaluate_guard, plan_sequence, GuardPolicy, GuardRefusal, GuardVerdict, SequencePlan, StepKind,
};
use w3b_schemas::{Address, AuditStatus, CommitmentAuditEntry, ProtocolStateSnapshot};

use crate::error::PipelineError;
use crate::report::{LogTap, ReconciliationReport, ReportError, RunLog, RunOutcome, StepRecord, StepStatus};
use crate::stores::{AuditStore, LedgerStore};
use crate::trigger::ReconciliationRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveSettings {
    pub state_address: Address,
    pub auto_mint: bool,
    pub allow_reserve_decrease: bool,
    pub debounce: Duration,
    pub run_timeout: Duration,
    pub confirm_poll: Duration,
    pub confirm_max_polls: u32,
}

impl ReserveSettings {
    pub fn from_config(cfg: &W3bConfig) -> Self {
        Self {
            state_address: cfg.chain.state_address,
            auto_mint: cfg.reserve.auto_mint,
            allow_reserve_decrease: cfg.reserve.allow_reserve_decrease,
            debounce: cfg.debounce(),
            run_timeout: cfg.run_timeout(),
            confirm_poll: cfg.confirm_poll(),
            confirm_max_polls: cfg.chain.confirm_max_polls,
        }
    }
}

pub struct ReserveReconciler {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditStore>,
    chain: Arc<dyn ChainRpc>,
    settings: ReserveSettings,
    log_tap: Option<LogTap>,
}

/// Everything decided before the first chain mutation.
enum Prepared {
    NothingToVerify,
    Ready {
        serials: Vec<String>,
        commitment: Commitment,
        before: ProtocolStateSnapshot,
        plan: SequencePlan,
    },
}

/// Partial report state collected while a run progresses.
#[derive(Default)]
struct Progress {
    root_hex: Option<String>,
    leaf_count: Option<u64>,
    before: Option<ProtocolStateSnapshot>,
}

impl ReserveReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditStore>,
        chain: Arc<dyn ChainRpc>,
        settings: ReserveSettings,
    ) -> Self {
        Self {
            ledger,
            audit,
            chain,
            settings,
            log_tap: None,
        }
    }

    pub fn with_log_tap(mut self, tap: LogTap) -> Self {
        self.log_tap = Some(tap);
        self
    }

    pub fn settings(&self) -> &ReserveSettings {
        &self.settings
    }

    /// Run one reconciliation. Never returns an error: every failure is a
    /// report.
    pub async fn run(&self, req: ReconciliationRequest) -> ReconciliationReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut log = RunLog::new(run_id, self.log_tap.clone());
        log.info(format!(
            "reserve reconciliation started (trigger={})",
            req.source.label()
        ));

        let mut progress = Progress::default();
        let prepared = tokio::time::timeout(
            self.settings.run_timeout,
            self.prepare(&req, &mut log, &mut progress),
        )
        .await
        .unwrap_or(Err(PipelineError::Timeout(self.settings.run_timeout)));

        let mut report = ReconciliationReport {
            run_id,
            trigger: req.source.clone(),
            success: false,
            outcome: RunOutcome::Failed,
            log: Vec::new(),
            root_hex: progress.root_hex.clone(),
            leaf_count: progress.leaf_count,
            steps: Vec::new(),
            before: progress.before.as_ref().map(|s| s.summary()),
            after: None,
            post_invariant_holds: None,
            error: None,
            started_at,
            finished_at: started_at,
        };

        match prepared {
            Ok(Prepared::NothingToVerify) => {
                log.info("ledger is empty: nothing to verify");
                report.success = true;
                report.outcome = RunOutcome::NothingToVerify;
            }
            Ok(Prepared::Ready {
                serials,
                commitment,
                before,
                plan,
            }) => {
                self.sequence(&serials, &commitment, &before, &plan, &mut log, &mut report)
                    .await;
            }
            Err(e) => {
                if matches!(e, PipelineError::Guard(_)) {
                    report.outcome = RunOutcome::Refused;
                }
                log.error(format!("run aborted: {e}"));
                report.error = Some(ReportError::from(&e));
            }
        }

        report.log = log.into_lines();
        report.finished_at = Utc::now();
        report
    }

    /// Pre-sequence phase. No chain mutation happens in here, so it is safe
    /// to drop on timeout.
    async fn prepare(
        &self,
        req: &ReconciliationRequest,
        log: &mut RunLog,
        progress: &mut Progress,
    ) -> Result<Prepared, PipelineError> {
        if req.debounce && !self.settings.debounce.is_zero() {
            log.info(format!(
                "debouncing {}ms before ledger read",
                self.settings.debounce.as_millis()
            ));
            tokio::time::sleep(self.settings.debounce).await;
        }

        let serials = self.ledger.fetch_serial_numbers().await?;
        log.info(format!("ledger read: {} serial(s)", serials.len()));
        if serials.is_empty() {
            return Ok(Prepared::NothingToVerify);
        }

        let commitment = CommitmentTree::build(&serials)?.commitment();
        progress.root_hex = Some(commitment.root_hex.clone());
        progress.leaf_count = Some(commitment.leaf_count);
        log.info(format!(
            "commitment root={} leaf_count={}",
            commitment.root_hex, commitment.leaf_count
        ));

        let (baseline, read_err) =
            match read_state(self.chain.as_ref(), &self.settings.state_address).await {
                Ok(s) => (Some(s), None),
                Err(ChainError::Layout(e)) => return Err(PipelineError::Layout(e)),
                Err(e) => (None, Some(e)),
            };
        if let Some(s) = &baseline {
            log.info(format!(
                "on-chain before: supply={} proven_reserves={} root={}",
                s.total_supply,
                s.proven_reserves,
                s.root_hex()
            ));
        }
        progress.before = baseline.clone();

        let policy = GuardPolicy {
            allow_reserve_decrease: self.settings.allow_reserve_decrease
                || req.allow_reserve_decrease,
        };
        if policy.allow_reserve_decrease {
            log.warn("operator override active: reserve decrease permitted");
        }

        let verdict = evaluate_guard(commitment.leaf_count, baseline.as_ref(), policy);
        let before = match (baseline, verdict) {
            (Some(s), GuardVerdict::Approved) => s,
            (_, GuardVerdict::Refused(GuardRefusal::NoBaseline)) | (None, _) => {
                return Err(match read_err {
                    Some(ChainError::AccountNotFound(a)) => PipelineError::AccountNotFound(a),
                    Some(e) => PipelineError::ChainRead(e),
                    None => PipelineError::Guard(GuardRefusal::NoBaseline),
                });
            }
            (_, GuardVerdict::Refused(r)) => return Err(PipelineError::Guard(r)),
        };
        log.info(format!("guard approved proposed={}", commitment.leaf_count));

        let mint_enabled = self.settings.auto_mint && !req.disable_mint;
        let plan = plan_sequence(&commitment, &before, mint_enabled, Utc::now().timestamp());

        Ok(Prepared::Ready {
            serials,
            commitment,
            before,
            plan,
        })
    }

    async fn sequence(
        &self,
        serials: &[String],
        commitment: &Commitment,
        before: &ProtocolStateSnapshot,
        plan: &SequencePlan,
        log: &mut RunLog,
        report: &mut ReconciliationReport,
    ) {
        let mut failure: Option<PipelineError> = None;
        let mut any_applied = false;
        let mut publish_signature: Option<String> = None;

        for planned in &plan.steps {
            let (instruction, amount) = instruction_for(plan, planned.kind);

            if let Some(reason) = planned.skip {
                log.info(format!("{}: skipped ({reason:?})", planned.kind.as_str()));
                report.steps.push(StepRecord {
                    step: planned.kind,
                    status: StepStatus::Skipped,
                    skip_reason: Some(reason),
                    amount,
                    signature: None,
                    error: None,
                });
                continue;
            }

            if failure.is_some() {
                report.steps.push(StepRecord {
                    step: planned.kind,
                    status: StepStatus::NotAttempted,
                    skip_reason: None,
                    amount,
                    signature: None,
                    error: None,
                });
                continue;
            }

            match self.submit_and_confirm(&instruction).await {
                Ok(sig) => {
                    log.info(format!(
                        "{}: confirmed amount={amount} signature={sig}",
                        planned.kind.as_str()
                    ));
                    any_applied = true;
                    if planned.kind == StepKind::PublishCommitment {
                        publish_signature = Some(sig.0.clone());
                    }
                    report.steps.push(StepRecord {
                        step: planned.kind,
                        status: StepStatus::Confirmed,
                        skip_reason: None,
                        amount,
                        signature: Some(sig.0),
                        error: None,
                    });
                }
                Err((sig, e)) => {
                    log.error(format!("{}: failed: {e}", planned.kind.as_str()));
                    report.steps.push(StepRecord {
                        step: planned.kind,
                        status: StepStatus::Failed,
                        skip_reason: None,
                        amount,
                        signature: sig.map(|s| s.0),
                        error: Some(e.to_string()),
                    });
                    failure = Some(PipelineError::Transaction {
                        step: planned.kind,
                        source: e,
                    });
                }
            }
        }

        let step_ok = |kind: StepKind| {
            report
                .step(kind)
                .map(|s| matches!(s.status, StepStatus::Confirmed | StepStatus::Skipped))
                .unwrap_or(false)
        };
        let root_on_chain = step_ok(StepKind::PublishCommitment);
        let attested = root_on_chain && step_ok(StepKind::RecordProof);
        let complete = attested && step_ok(StepKind::Mint);

        if root_on_chain {
            let status = if complete {
                AuditStatus::Complete
            } else if attested {
                AuditStatus::Attested
            } else {
                AuditStatus::Published
            };
            self.record_audit(serials, commitment, publish_signature, status, log)
                .await;
        }

        match read_state(self.chain.as_ref(), &self.settings.state_address).await {
            Ok(after) => {
                let holds = after.is_solvent() && after.proven_reserves == commitment.leaf_count;
                log.info(format!(
                    "on-chain after: supply={} proven_reserves={} root={}",
                    after.total_supply,
                    after.proven_reserves,
                    after.root_hex()
                ));
                if !holds {
                    log.error(format!(
                        "post-run invariant violated: supply={} proven_reserves={} leaf_count={}",
                        after.total_supply, after.proven_reserves, commitment.leaf_count
                    ));
                }
                report.post_invariant_holds = Some(holds);
                report.after = Some(after.summary());
            }
            Err(e) => log.warn(format!("post-run state read failed: {e}")),
        }

        if before.proven_reserves != commitment.leaf_count && !root_on_chain {
            log.warn("commitment not published; next run will retry from the same ledger state");
        }

        match failure {
            None => {
                report.success = true;
                report.outcome = RunOutcome::Reconciled;
                log.info("reserve reconciliation complete");
            }
            Some(e) => {
                report.outcome = if any_applied {
                    RunOutcome::PartiallyApplied
                } else {
                    RunOutcome::Failed
                };
                report.error = Some(ReportError::from(&e));
            }
        }
    }

    async fn submit_and_confirm(
        &self,
        instruction: &Instruction,
    ) -> Result<TxSignature, (Option<TxSignature>, ChainError)> {
        let sig = self
            .chain
            .submit(instruction)
            .await
            .map_err(|e| (None, e))?;
        await_confirmation(
            self.chain.as_ref(),
            &sig,
            self.settings.confirm_poll,
            self.settings.confirm_max_polls,
        )
        .await
        .map_err(|e| (Some(sig.clone()), e))?;
        Ok(sig)
    }

    async fn record_audit(
        &self,
        serials: &[String],
        commitment: &Commitment,
        signature: Option<String>,
        status: AuditStatus,
        log: &mut RunLog,
    ) {
        let entry = CommitmentAuditEntry {
            root_hash: commitment.root_hex.clone(),
            total_serials: commitment.leaf_count,
            on_chain_tx_signature: signature,
            status,
        };
        match self.audit.upsert_commitment_audit(&entry).await {
            Ok(()) => log.info(format!("audit entry upserted status={}", status.as_str())),
            Err(e) => log.warn(format!("audit upsert failed (non-fatal): {e}")),
        }

        match self
            .ledger
            .stamp_unreconciled(&commitment.root_hex, serials)
            .await
        {
            Ok(n) => log.info(format!("stamped {n} serial row(s)")),
            Err(e) => log.warn(format!("serial stamping failed (non-fatal): {e}")),
        }
    }
}

/// Instructions are only ever built from a plan, in plan order.
fn instruction_for(plan: &SequencePlan, kind: StepKind) -> (Instruction, u64) {
    match kind {
        StepKind::PublishCommitment => (
            Instruction::PublishCommitment {
                root: plan.root,
                total_serials: plan.total_serials,
            },
            plan.total_serials,
        ),
        StepKind::RecordProof => (
            Instruction::RecordProof {
                proof_hash: plan.proof_hash.to_vec(),
                claimed_reserves: plan.total_serials,
            },
            plan.total_serials,
        ),
        StepKind::Mint => (
            Instruction::Mint {
                amount: plan.mint_amount,
            },
            plan.mint_amount,
        ),
    }
}
