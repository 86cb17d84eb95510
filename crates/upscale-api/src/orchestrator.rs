//! Request orchestration
//!
//! Per request: `Received -> IdentityResolved -> AdmissionChecked ->
//! Transforming -> {Succeeded, Failed}`. Quota is only touched after a
//! confirmed successful transformation, and a failure to record that use
//! never turns the success into an error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use transform_client::{TransformError, Transformer};
use upscale_common::{EnhancementRequest, EnhancementResult, Identity, UsageSummary};
use upscale_quota::{Admission, AdmissionController, DenyReason, QuotaStore};

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("daily limit reached ({count}/{limit})")]
    LimitReached { count: u32, limit: u32 },

    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The usage snapshot needed for admission could not be read
    #[error("quota store unavailable: {0}")]
    Quota(#[from] upscale_common::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Received,
    IdentityResolved,
    AdmissionChecked,
    Transforming,
    Succeeded,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Received => "received",
            RequestState::IdentityResolved => "identity_resolved",
            RequestState::AdmissionChecked => "admission_checked",
            RequestState::Transforming => "transforming",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A successful enhancement and, for authenticated callers, their usage
#[derive(Debug, Clone)]
pub struct Enhanced {
    pub result: EnhancementResult,
    pub usage: Option<UsageSummary>,
}

pub struct Orchestrator {
    admission: AdmissionController,
    quota: Arc<dyn QuotaStore>,
    transformer: Arc<dyn Transformer>,
    provider_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        quota: Arc<dyn QuotaStore>,
        transformer: Arc<dyn Transformer>,
        daily_limit: u32,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            admission: AdmissionController::new(quota.clone(), daily_limit),
            quota,
            transformer,
            provider_timeout,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.admission.daily_limit()
    }

    pub async fn enhance(
        &self,
        identity: &Identity,
        request: EnhancementRequest,
    ) -> Result<Enhanced, OrchestrationError> {
        let mut state = RequestState::Received;
        advance(&mut state, RequestState::IdentityResolved, identity);

        let snapshot = match self.admission.check_admission(identity).await {
            Ok(Admission::Allow(snapshot)) => snapshot,
            Ok(Admission::Deny(DenyReason::LimitReached { count, limit })) => {
                advance(&mut state, RequestState::Failed, identity);
                return Err(OrchestrationError::LimitReached { count, limit });
            }
            Err(e) => {
                advance(&mut state, RequestState::Failed, identity);
                return Err(e.into());
            }
        };
        advance(&mut state, RequestState::AdmissionChecked, identity);

        info!(
            "Upscaling image. User: {} Scale: {}",
            identity, request.scale
        );
        advance(&mut state, RequestState::Transforming, identity);

        let outcome = tokio::time::timeout(
            self.provider_timeout,
            self.transformer.transform(&request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransformError::Unknown(format!(
                "provider did not respond within {}s",
                self.provider_timeout.as_secs()
            )))
        });

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                advance(&mut state, RequestState::Failed, identity);
                return Err(e.into());
            }
        };

        let usage = match identity.identity_key() {
            None => None,
            Some(key) => {
                let limit = self.daily_limit();
                match self.quota.increment(key, identity.display_name()).await {
                    Ok(record) => {
                        info!("Usage updated for {}: {}/{}", key, record.count, limit);
                        Some(record.summary(limit))
                    }
                    Err(e) => {
                        error!(
                            "Failed to record usage for {} after successful upscale: {}",
                            key, e
                        );
                        snapshot.map(|record| record.summary(limit))
                    }
                }
            }
        };

        advance(&mut state, RequestState::Succeeded, identity);
        Ok(Enhanced { result, usage })
    }
}

fn advance(state: &mut RequestState, next: RequestState, identity: &Identity) {
    debug!("Request for {}: {} -> {}", identity, state, next);
    *state = next;
}
