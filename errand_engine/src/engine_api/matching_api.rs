use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db::traits::{OrderManagement, ShopperDirectory},
    db_types::{Order, OrderId, OrderStatusType},
    engine_api::{
        benefits::{BenefitsResolver, SubscriptionBenefits},
        claim_api::ClaimApi,
        errors::FulfillmentError,
        scoring::{compare_candidates, CandidateScore, Scorer, ShopperCandidate},
    },
    events::AutoAssignAttemptedEvent,
};

/// Optional narrowing of a candidate search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchCriteria {
    /// Overrides the configured max radius for this search.
    pub max_radius_km: Option<f64>,
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

impl MatchCriteria {
    pub fn with_max_radius_km(mut self, km: f64) -> Self {
        self.max_radius_km = Some(km);
        self
    }

    pub fn with_min_score(mut self, score: f64) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// A radius override must be a positive, finite distance.
    pub fn validate(&self) -> Result<(), FulfillmentError> {
        match self.max_radius_km {
            Some(km) if !(km.is_finite() && km > 0.0) => {
                Err(FulfillmentError::InvalidInput(format!("The search radius must be a positive distance, not {km} km")))
            },
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AutoAssignOutcome {
    Assigned { shopper_id: i64, score: f64 },
    /// Nobody in the pool qualified for the order.
    NoCandidates,
    /// The top-ranked shopper's claim did not go through.
    Lost { shopper_id: i64, reason: String },
    /// The attempt itself went wrong, e.g. the database was unavailable. The order stays in the queue.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoAssignReport {
    pub order_id: OrderId,
    pub outcome: AutoAssignOutcome,
}

/// Ranks a candidate pool for an order, best first. Candidates the scorer disqualifies are dropped, as are any that fall
/// outside `criteria`. Fails if `criteria` is malformed.
pub fn rank_candidates(
    scorer: &Scorer,
    order: &Order,
    pool: &[ShopperCandidate],
    account: &SubscriptionBenefits,
    criteria: &MatchCriteria,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<CandidateScore>, FulfillmentError> {
    criteria.validate()?;
    let scorer = match criteria.max_radius_km {
        Some(km) => Scorer::new(scorer.config().with_max_radius_km(km)),
        None => *scorer,
    };
    let mut ranked = pool
        .iter()
        .filter_map(|c| match scorer.score(order, c, account, now) {
            Ok(s) => Some(s),
            Err(reason) => {
                trace!("🧮️ Shopper #{} is not a candidate for order {}: {reason:?}", c.id(), order.id);
                None
            },
        })
        .filter(|s| criteria.min_score.map_or(true, |min| s.score >= min))
        .collect::<Vec<_>>();
    ranked.sort_by(compare_candidates);
    if let Some(limit) = criteria.limit {
        ranked.truncate(limit);
    }
    Ok(ranked)
}

/// `MatchingApi` finds the best shoppers for an order and, for auto-assignment, hands the order to the top one through
/// the [`ClaimApi`], so automatic and manual claims race under the same rules.
pub struct MatchingApi<B> {
    claims: ClaimApi<B>,
    benefits: BenefitsResolver<B>,
    scorer: Scorer,
}

impl<B> Debug for MatchingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatchingApi ({:?})", self.scorer.config())
    }
}

impl<B: Clone> MatchingApi<B> {
    pub fn new(claims: ClaimApi<B>, scorer: Scorer) -> Self {
        let benefits = BenefitsResolver::new(claims.order_flow().db().clone());
        Self { claims, benefits, scorer }
    }
}

impl<B> MatchingApi<B>
where B: OrderManagement + ShopperDirectory
{
    /// The online, approved shoppers with spare capacity, with the workload figures the scorer needs.
    pub async fn candidate_pool(&self) -> Result<Vec<ShopperCandidate>, FulfillmentError> {
        let db = self.claims.order_flow().db();
        let online = db.fetch_online_shoppers().await.map_err(FulfillmentError::database)?;
        let mut pool = Vec::with_capacity(online.len());
        for profile in online.into_iter().filter(|p| p.online && p.is_approved()) {
            let tier = self.benefits.benefits(profile.id).await?;
            let mut candidate = ShopperCandidate::new(profile, &tier);
            if !candidate.has_capacity() {
                continue;
            }
            let oldest = db.oldest_active_order_for_shopper(candidate.id()).await.map_err(FulfillmentError::database)?;
            candidate.oldest_queued_at = oldest;
            pool.push(candidate);
        }
        Ok(pool)
    }

    /// Ranks the current candidate pool for the order.
    pub async fn find_candidates(
        &self,
        order_id: OrderId,
        criteria: MatchCriteria,
    ) -> Result<Vec<CandidateScore>, FulfillmentError> {
        criteria.validate()?;
        let order = self.claims.order_flow().fetch_order(order_id).await?;
        self.rank_for(&order, &criteria).await
    }

    async fn rank_for(
        &self,
        order: &Order,
        criteria: &MatchCriteria,
    ) -> Result<Vec<CandidateScore>, FulfillmentError> {
        let account = self.benefits.benefits(order.account_id).await?;
        let pool = self.candidate_pool().await?;
        let now = self.claims.order_flow().clock().now();
        let ranked = rank_candidates(&self.scorer, order, &pool, &account, criteria, now)?;
        debug!("🧮️ {} of {} shoppers are candidates for order {}", ranked.len(), pool.len(), order.id);
        Ok(ranked)
    }

    /// Tries to give the order to its best candidate. Only the top-ranked shopper is tried.
    ///
    /// Orders that are no longer waiting for a shopper fail with [`FulfillmentError::OrderUnavailable`] without an
    /// attempt being made.
    pub async fn auto_assign(&self, order_id: OrderId) -> Result<AutoAssignOutcome, FulfillmentError> {
        let order = self.claims.order_flow().fetch_order(order_id).await?;
        if order.status != OrderStatusType::New || order.shopper_id.is_some() {
            debug!("🧮️ Order {order_id} is {} and no longer needs a shopper", order.status);
            return Err(FulfillmentError::OrderUnavailable(order_id));
        }
        let candidates = self.rank_for(&order, &MatchCriteria::default()).await?;
        let outcome = match candidates.first() {
            None => AutoAssignOutcome::NoCandidates,
            Some(best) => {
                let note = Some(format!("auto-assigned with score {:.2}", best.score));
                match self.claims.claim(order_id, best.shopper_id, note).await {
                    Ok(_) => AutoAssignOutcome::Assigned { shopper_id: best.shopper_id, score: best.score },
                    Err(e @ (FulfillmentError::OrderUnavailable(_) | FulfillmentError::ShopperIneligible { .. })) => {
                        AutoAssignOutcome::Lost { shopper_id: best.shopper_id, reason: e.to_string() }
                    },
                    Err(e) => return Err(e),
                }
            },
        };
        let flow = self.claims.order_flow();
        let event = AutoAssignAttemptedEvent {
            order_id,
            shopper_id: match &outcome {
                AutoAssignOutcome::Assigned { shopper_id, .. } => Some(*shopper_id),
                _ => None,
            },
            candidates: candidates.len(),
            timestamp: flow.clock().now(),
        };
        flow.producers().publish_auto_assign(event).await;
        info!("🧮️ Auto-assign for order {order_id}: {outcome:?}");
        Ok(outcome)
    }

    /// Runs [`Self::auto_assign`] over up to `limit` waiting orders, highest priority first, then oldest first.
    ///
    /// An error on one order is reported as [`AutoAssignOutcome::Failed`] and the round carries on with the next.
    pub async fn auto_assign_pending(&self, limit: usize) -> Result<Vec<AutoAssignReport>, FulfillmentError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let waiting = self.claims.order_flow().dispatch_queue(limit).await?;
        let mut reports = Vec::with_capacity(waiting.len());
        for order in waiting {
            let outcome = match self.auto_assign(order.id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("🧮️ Could not auto-assign order {}: {e}", order.id);
                    AutoAssignOutcome::Failed { reason: e.to_string() }
                },
            };
            reports.push(AutoAssignReport { order_id: order.id, outcome });
        }
        Ok(reports)
    }
}
