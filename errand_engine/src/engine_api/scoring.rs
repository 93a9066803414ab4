//! Shopper/order compatibility scoring.
//!
//! A score is the sum of six components, each capped at its weight:
//!
//! | component    | weight | rule                                                                    |
//! |--------------|-------:|-------------------------------------------------------------------------|
//! | distance     |     25 | linear decay from 25 at the address to 0 at the max radius             |
//! | rating       |     25 | `rating / 5 * 25`, floored for shoppers with few rated orders          |
//! | availability |     20 | `20 * (1 - active / cap)`                                              |
//! | preference   |     15 | 5 each for category fit, minimum order value, and working hours        |
//! | subscription |     10 | account has priority matching, shopper's tier and profile allow premium |
//! | experience   |      5 | `5 * (1 - e^(-completed / scale))`                                     |
//!
//! Candidates outside the radius, at their cap, or who exclude a category in the order are disqualified rather than
//! scored.
use std::cmp::Ordering;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, ShopperProfile},
    engine_api::{benefits::SubscriptionBenefits, config::ScoringConfig},
    helpers::haversine_km,
};

pub const DISTANCE_WEIGHT: f64 = 25.0;
pub const RATING_WEIGHT: f64 = 25.0;
pub const AVAILABILITY_WEIGHT: f64 = 20.0;
pub const PREFERENCE_WEIGHT: f64 = 15.0;
pub const SUBSCRIPTION_WEIGHT: f64 = 10.0;
pub const EXPERIENCE_WEIGHT: f64 = 5.0;
const PREFERENCE_PART: f64 = PREFERENCE_WEIGHT / 3.0;
const MAX_RATING: f64 = 5.0;

/// A shopper as seen by the matcher: their profile plus the workload figures scoring needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopperCandidate {
    pub profile: ShopperProfile,
    /// From the shopper's own subscription tier.
    pub max_concurrent_orders: i64,
    /// Whether the shopper's tier lets them take premium orders at all.
    pub premium_eligible: bool,
    /// When the oldest order in the shopper's active queue was placed. `None` if the queue is empty.
    pub oldest_queued_at: Option<DateTime<Utc>>,
}

impl ShopperCandidate {
    /// A candidate whose cap and premium eligibility come from `tier`, the benefits of the shopper's own subscription.
    pub fn new(profile: ShopperProfile, tier: &SubscriptionBenefits) -> Self {
        Self {
            profile,
            max_concurrent_orders: tier.max_concurrent_orders,
            premium_eligible: tier.premium_shopper_eligible,
            oldest_queued_at: None,
        }
    }

    /// Takes premium orders: the shopper opted in and their tier allows it.
    pub fn takes_premium_orders(&self) -> bool {
        self.premium_eligible && self.profile.accepts_premium_orders
    }

    pub fn with_oldest_queued_at(mut self, at: DateTime<Utc>) -> Self {
        self.oldest_queued_at = Some(at);
        self
    }

    pub fn id(&self) -> i64 {
        self.profile.id
    }

    pub fn active_orders(&self) -> i64 {
        self.profile.active_order_count
    }

    pub fn has_capacity(&self) -> bool {
        self.active_orders() < self.max_concurrent_orders
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance: f64,
    pub rating: f64,
    pub availability: f64,
    pub preference: f64,
    pub subscription: f64,
    pub experience: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.distance + self.rating + self.availability + self.preference + self.subscription + self.experience
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub shopper_id: i64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub distance_km: f64,
    pub active_orders: i64,
    pub oldest_queued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Disqualification {
    OutOfRange { distance_km: f64 },
    AtCapacity { active: i64, cap: i64 },
    ExcludedCategory(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scores `candidate` for `order`, placed by an account with benefits `account`. The time-slot check uses the
    /// order deadline, or `now` for orders without one.
    pub fn score(
        &self,
        order: &Order,
        candidate: &ShopperCandidate,
        account: &SubscriptionBenefits,
        now: DateTime<Utc>,
    ) -> Result<CandidateScore, Disqualification> {
        let profile = &candidate.profile;
        let distance_km = haversine_km(&order.address.location, &profile.location);
        let radius = self.config.max_radius_km;
        if distance_km > radius {
            return Err(Disqualification::OutOfRange { distance_km });
        }
        let (active, cap) = (candidate.active_orders(), candidate.max_concurrent_orders);
        if !candidate.has_capacity() {
            return Err(Disqualification::AtCapacity { active, cap });
        }
        let categories = order.categories();
        if let Some(c) = categories.intersection(&profile.preferences.excluded_categories).next() {
            return Err(Disqualification::ExcludedCategory(c.clone()));
        }

        let distance = DISTANCE_WEIGHT * (1.0 - distance_km / radius);
        let mut rating = profile.rating_avg.clamp(0.0, MAX_RATING) / MAX_RATING * RATING_WEIGHT;
        if profile.rating_count < self.config.min_rated_orders {
            rating = rating.max(self.config.new_shopper_rating_floor.min(RATING_WEIGHT));
        }
        let availability = AVAILABILITY_WEIGHT * (1.0 - active.max(0) as f64 / cap as f64);

        let prefs = &profile.preferences;
        let category_fit = if prefs.preferred_categories.is_empty() ||
            categories.intersection(&prefs.preferred_categories).next().is_some()
        {
            PREFERENCE_PART
        } else {
            PREFERENCE_PART / 2.0
        };
        let value_fit = if order.estimate_amount >= prefs.min_order_value { PREFERENCE_PART } else { 0.0 };
        let hour = order.deadline.unwrap_or(now).hour();
        let slot_fit = match prefs.working_hours {
            Some(hours) if !hours.contains(hour) => 0.0,
            _ => PREFERENCE_PART,
        };
        let preference = category_fit + value_fit + slot_fit;

        let subscription =
            if account.priority_matching && candidate.takes_premium_orders() { SUBSCRIPTION_WEIGHT } else { 0.0 };
        let completed = profile.completed_orders.max(0) as f64;
        let experience = EXPERIENCE_WEIGHT * (1.0 - (-completed / self.config.experience_scale).exp());

        let breakdown = ScoreBreakdown { distance, rating, availability, preference, subscription, experience };
        Ok(CandidateScore {
            shopper_id: profile.id,
            score: breakdown.total(),
            breakdown,
            distance_km,
            active_orders: active,
            oldest_queued_at: candidate.oldest_queued_at,
        })
    }
}

/// Best first: higher score, then fewer active orders, then the shopper whose queue has waited longest, then the
/// lower shopper id so that the ranking is total.
pub fn compare_candidates(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    let by_queue = match (a.oldest_queued_at, b.oldest_queued_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    b.score
        .total_cmp(&a.score)
        .then(a.active_orders.cmp(&b.active_orders))
        .then(by_queue)
        .then(a.shopper_id.cmp(&b.shopper_id))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::db_types::{
        Cents,
        DeliveryAddress,
        GeoPoint,
        NewOrderItem,
        OrderId,
        OrderItem,
        OrderMode,
        OrderStatusType,
        ReceiptCheck,
        ShopperPreferences,
        SubscriptionTier,
        WorkingHours,
    };

    // One degree of latitude is ~111.19 km on a 6371 km sphere
    const KM_PER_DEGREE: f64 = 111.194_926_644_558_73;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn order_with(categories: &[&str]) -> Order {
        let items = categories
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let item = NewOrderItem::new("thing", 1, Cents::from(100), Cents::from(200)).with_category(*c);
                OrderItem {
                    id: i as i64,
                    order_id: OrderId(1),
                    name: item.name,
                    quantity: item.quantity,
                    price: item.price,
                    substitution_allowed: true,
                    note: None,
                    category: item.category,
                }
            })
            .collect();
        Order {
            id: OrderId(1),
            account_id: 1,
            status: OrderStatusType::New,
            mode: OrderMode::Approve,
            receipt_check: ReceiptCheck::Required,
            estimate_amount: Cents::from(2000),
            deadline: None,
            priority: None,
            address: DeliveryAddress::new("1 Main St", "Springfield", "12345", GeoPoint::new(0.0, 0.0)),
            items,
            shopper_id: None,
            created_at: noon(),
            updated_at: noon(),
        }
    }

    fn shopper_at_km(id: i64, km: f64, rating: f64) -> ShopperCandidate {
        let profile = ShopperProfile::new(id, GeoPoint::new(km / KM_PER_DEGREE, 0.0)).with_rating(rating, 50);
        ShopperCandidate::new(profile, &SubscriptionBenefits::for_tier(SubscriptionTier::Premium))
    }

    fn free() -> SubscriptionBenefits {
        SubscriptionBenefits::for_tier(SubscriptionTier::Free)
    }

    #[test]
    fn two_shoppers_near_and_far() {
        let scorer = Scorer::default();
        let order = order_with(&[]);
        let s1 = scorer.score(&order, &shopper_at_km(1, 2.0, 4.8), &free(), noon()).unwrap();
        let s2 = scorer.score(&order, &shopper_at_km(2, 8.0, 4.9), &free(), noon()).unwrap();
        assert!((s1.breakdown.distance - 20.0).abs() < 1e-6);
        assert!((s1.breakdown.rating - 24.0).abs() < 1e-9);
        assert!((s2.breakdown.distance - 5.0).abs() < 1e-6);
        assert!((s2.breakdown.rating - 24.5).abs() < 1e-9);
        assert!(s1.score > s2.score);
        assert_eq!(compare_candidates(&s1, &s2), Ordering::Less);
    }

    #[test]
    fn rating_is_monotonic() {
        let scorer = Scorer::default();
        let order = order_with(&[]);
        let mut last = f64::MIN;
        for tenths in 0..=50 {
            let rating = tenths as f64 / 10.0;
            let s = scorer.score(&order, &shopper_at_km(1, 3.0, rating), &free(), noon()).unwrap();
            assert!(s.score >= last, "score dropped at rating {rating}");
            last = s.score;
        }
    }

    #[test]
    fn new_shoppers_get_the_rating_floor() {
        let scorer = Scorer::default();
        let order = order_with(&[]);
        let mut c = shopper_at_km(1, 1.0, 1.0);
        c.profile.rating_count = 2;
        let s = scorer.score(&order, &c, &free(), noon()).unwrap();
        assert_eq!(s.breakdown.rating, 20.0);
        c.profile.rating_count = 5;
        let s = scorer.score(&order, &c, &free(), noon()).unwrap();
        assert!((s.breakdown.rating - 5.0).abs() < 1e-9);
    }

    #[test]
    fn disqualifications() {
        let scorer = Scorer::default();
        let order = order_with(&["alcohol", "dairy"]);
        let far = shopper_at_km(1, 10.5, 5.0);
        assert!(matches!(scorer.score(&order, &far, &free(), noon()), Err(Disqualification::OutOfRange { .. })));
        let mut busy = shopper_at_km(2, 1.0, 5.0);
        busy.profile.active_order_count = 5;
        assert!(matches!(scorer.score(&order, &busy, &free(), noon()), Err(Disqualification::AtCapacity { .. })));
        let mut picky = shopper_at_km(3, 1.0, 5.0);
        picky.profile.preferences.excluded_categories.insert("alcohol".into());
        assert_eq!(
            scorer.score(&order, &picky, &free(), noon()).unwrap_err(),
            Disqualification::ExcludedCategory("alcohol".into())
        );
    }

    #[test]
    fn preference_and_subscription_components() {
        let scorer = Scorer::default();
        let order = order_with(&["dairy"]);
        let premium = SubscriptionBenefits::for_tier(SubscriptionTier::Premium);
        let mut c = shopper_at_km(1, 1.0, 5.0);
        let s = scorer.score(&order, &c, &premium, noon()).unwrap();
        assert_eq!(s.breakdown.preference, 15.0);
        assert_eq!(s.breakdown.subscription, 0.0);

        c.profile.accepts_premium_orders = true;
        c.profile.preferences = ShopperPreferences {
            preferred_categories: ["bakery".to_string()].into(),
            min_order_value: Cents::from(5000),
            working_hours: Some(WorkingHours::new(18, 23)),
            ..Default::default()
        };
        let s = scorer.score(&order, &c, &premium, noon()).unwrap();
        assert_eq!(s.breakdown.preference, 2.5);
        assert_eq!(s.breakdown.subscription, 10.0);
        let s = scorer.score(&order, &c, &free(), noon()).unwrap();
        assert_eq!(s.breakdown.subscription, 0.0);
    }

    #[test]
    fn only_premium_tier_shoppers_earn_the_subscription_score() {
        let scorer = Scorer::default();
        let order = order_with(&[]);
        let premium = SubscriptionBenefits::for_tier(SubscriptionTier::Premium);
        let profile = ShopperProfile::new(1, GeoPoint::new(1.0 / KM_PER_DEGREE, 0.0)).with_rating(4.5, 50);
        let mut opted_in = profile.clone();
        opted_in.accepts_premium_orders = true;
        let plus = ShopperCandidate::new(opted_in.clone(), &SubscriptionBenefits::for_tier(SubscriptionTier::Plus));
        assert!(!plus.takes_premium_orders());
        assert_eq!(scorer.score(&order, &plus, &premium, noon()).unwrap().breakdown.subscription, 0.0);
        let top = ShopperCandidate::new(opted_in, &premium);
        assert!(top.takes_premium_orders());
        assert_eq!(scorer.score(&order, &top, &premium, noon()).unwrap().breakdown.subscription, 10.0);
        let not_opted_in = ShopperCandidate::new(profile, &premium);
        assert_eq!(scorer.score(&order, &not_opted_in, &premium, noon()).unwrap().breakdown.subscription, 0.0);
    }

    #[test]
    fn experience_saturates() {
        let scorer = Scorer::default();
        let order = order_with(&[]);
        let mut c = shopper_at_km(1, 1.0, 5.0);
        let s0 = scorer.score(&order, &c, &free(), noon()).unwrap();
        assert_eq!(s0.breakdown.experience, 0.0);
        c.profile.completed_orders = 1000;
        let s = scorer.score(&order, &c, &free(), noon()).unwrap();
        assert!(s.breakdown.experience > 4.99 && s.breakdown.experience <= 5.0);
        assert!(s.score <= 100.0);
    }

    #[test]
    fn ties_go_to_the_less_busy_then_longest_waiting_shopper() {
        let base = CandidateScore {
            shopper_id: 1,
            score: 80.0,
            breakdown: ScoreBreakdown::default(),
            distance_km: 1.0,
            active_orders: 1,
            oldest_queued_at: Some(noon()),
        };
        let busier = CandidateScore { shopper_id: 2, active_orders: 2, ..base.clone() };
        let an_hour_earlier = Some(noon() - chrono::Duration::hours(1));
        let waited_longer = CandidateScore { shopper_id: 3, oldest_queued_at: an_hour_earlier, ..base.clone() };
        let mut ranked = vec![busier.clone(), base.clone(), waited_longer.clone()];
        ranked.sort_by(compare_candidates);
        let ids = ranked.iter().map(|c| c.shopper_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 1, 2]);
    }
}
