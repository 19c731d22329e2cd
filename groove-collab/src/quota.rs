use chrono::NaiveDate;
use groove_core::{usage_day, CounterKind, QuotaDecision, Tier, TierLimits, Usage};
use log::debug;
use serde::Serialize;

use crate::{CollabError, CollabResult, Identity, Operation};

/// Counts actions per user per UTC day and refuses the ones over the tier's limit
#[derive(Debug, Default, Clone, Copy)]
pub struct QuotaTracker;

/// Today's usage next to what the tier allows
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub day: NaiveDate,
    pub tier: Tier,
    pub usage: Usage,
    pub limits: TierLimits,
}

impl QuotaTracker {
    /// Counts one action of `kind` for the user, returning today's count including it.
    /// Nothing is counted when the limit has been reached.
    pub async fn check_and_increment(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        kind: CounterKind,
    ) -> CollabResult<u32> {
        let limit = kind.limit(&identity.tier.limits());
        let day = usage_day(op.now());

        let decision = op
            .tx
            .increment_usage(identity.user_id, day, kind, limit)
            .await?;

        match decision {
            QuotaDecision::Allowed { used, .. } => Ok(used),
            QuotaDecision::Denied { used, limit } => {
                debug!(
                    "User {} is out of {} for {} ({}/{})",
                    identity.user_id, kind, day, used, limit
                );

                Err(CollabError::QuotaExceeded { kind, limit, used })
            }
        }
    }

    pub async fn report(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
    ) -> CollabResult<UsageReport> {
        let day = usage_day(op.now());
        let usage = op.tx.usage(identity.user_id, day).await?;

        Ok(UsageReport {
            day,
            tier: identity.tier,
            usage,
            limits: identity.tier.limits(),
        })
    }
}
