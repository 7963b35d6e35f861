//! Price drift reconciliation.
//!
//! Reads the on-chain price, asks the configured source for a candidate and
//! publishes only when the drift clears the threshold. Independent of the
//! reserve pipeline; the two share nothing but the chain client.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;
use w3b_chain::{await_confirmation, read_state, ChainError, ChainRpc, Instruction};
use w3b_config::W3bConfig;
use w3b_reconcile::{price_decision, PriceDecision, PricePolicy};
use w3b_schemas::Address;

use crate::error::PipelineError;
use crate::report::{LogTap, PriceReport, ReportError, RunLog};
use crate::stores::PriceSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSettings {
    pub state_address: Address,
    pub policy: PricePolicy,
    pub confirm_poll: Duration,
    pub confirm_max_polls: u32,
}

impl PriceSettings {
    pub fn from_config(cfg: &W3bConfig) -> Self {
        Self {
            state_address: cfg.chain.state_address,
            policy: PricePolicy {
                drift_threshold_bps: cfg.price.drift_threshold_bps,
                max_step_bps: cfg.price.max_step_bps,
            },
            confirm_poll: cfg.confirm_poll(),
            confirm_max_polls: cfg.chain.confirm_max_polls,
        }
    }
}

pub struct PriceReconciler {
    chain: Arc<dyn ChainRpc>,
    source: Arc<dyn PriceSource>,
    settings: PriceSettings,
    log_tap: Option<LogTap>,
}

impl PriceReconciler {
    pub fn new(chain: Arc<dyn ChainRpc>, source: Arc<dyn PriceSource>, settings: PriceSettings) -> Self {
        Self {
            chain,
            source,
            settings,
            log_tap: None,
        }
    }

    pub fn with_log_tap(mut self, tap: LogTap) -> Self {
        self.log_tap = Some(tap);
        self
    }

    pub async fn run(&self) -> PriceReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut log = RunLog::new(run_id, self.log_tap.clone());
        log.info(format!("price sync started (source={})", self.source.source_name()));

        let mut report = PriceReport {
            run_id,
            success: false,
            on_chain_price: None,
            candidate_price: None,
            decision: None,
            signature: None,
            log: Vec::new(),
            error: None,
            started_at,
            finished_at: started_at,
        };

        if let Err(e) = self.sync(&mut log, &mut report).await {
            log.error(format!("price sync failed: {e}"));
            report.error = Some(ReportError::from(&e));
        } else {
            report.success = true;
        }

        report.log = log.into_lines();
        report.finished_at = Utc::now();
        report
    }

    async fn sync(&self, log: &mut RunLog, report: &mut PriceReport) -> Result<(), PipelineError> {
        let state = read_state(self.chain.as_ref(), &self.settings.state_address)
            .await
            .map_err(|e| match e {
                ChainError::AccountNotFound(a) => PipelineError::AccountNotFound(a),
                ChainError::Layout(l) => PipelineError::Layout(l),
                other => PipelineError::ChainRead(other),
            })?;
        report.on_chain_price = Some(state.price_units);

        let candidate = self
            .source
            .candidate_price()
            .await
            .map_err(PipelineError::PriceSource)?;
        report.candidate_price = Some(candidate);
        log.info(format!(
            "on-chain price={} candidate={candidate}",
            state.price_units
        ));

        let decision = price_decision(state.price_units, candidate, self.settings.policy);
        report.decision = Some(decision);

        match decision {
            PriceDecision::Skip { drift_bps } => {
                log.info(format!(
                    "drift {drift_bps}bps below threshold {}bps: no update",
                    self.settings.policy.drift_threshold_bps
                ));
                Ok(())
            }
            PriceDecision::Reject { reason } => Err(reason.into()),
            PriceDecision::Publish {
                price,
                drift_bps,
                clamped,
            } => {
                if state.is_paused {
                    log.warn("protocol is paused; the program may refuse the price update");
                }
                if clamped {
                    log.warn(format!(
                        "candidate {candidate} exceeds the per-update limit; publishing {price}"
                    ));
                }
                log.info(format!("publishing price={price} drift={drift_bps}bps"));

                let sig = self
                    .chain
                    .submit(&Instruction::SetPrice { price_units: price })
                    .await
                    .map_err(PipelineError::PriceTransaction)?;
                report.signature = Some(sig.0.clone());
                await_confirmation(
                    self.chain.as_ref(),
                    &sig,
                    self.settings.confirm_poll,
                    self.settings.confirm_max_polls,
                )
                .await
                .map_err(PipelineError::PriceTransaction)?;
                log.info(format!("price update confirmed signature={sig}"));
                Ok(())
            }
        }
    }
}
