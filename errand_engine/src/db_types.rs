use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use errand_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

/// Implements `Display` and `FromStr` for a fieldless enum using the given canonical labels. The labels are what gets
/// written to the database, so they must never change for an existing variant.
macro_rules! text_enum {
    ($for_enum:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl Display for $for_enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($label),)+
                }
            }
        }

        impl FromStr for $for_enum {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($for_enum)))),
                }
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub i64);

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order has been placed and is waiting for a shopper.
    New,
    /// A shopper has claimed the order.
    Accepted,
    /// The shopper is in the store, buying the items.
    Shopping,
    /// The shopper has submitted the receipt and is waiting for the account holder to approve it.
    AwaitReceiptOk,
    /// The items are on their way to the delivery address.
    Enroute,
    /// The order was handed over. Terminal.
    Delivered,
    /// The order was cancelled. Terminal.
    Cancelled,
}

text_enum!(OrderStatusType {
    New => "new",
    Accepted => "accepted",
    Shopping => "shopping",
    AwaitReceiptOk => "await_receipt_ok",
    Enroute => "enroute",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 7] = [
        Self::New,
        Self::Accepted,
        Self::Shopping,
        Self::AwaitReceiptOk,
        Self::Enroute,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Statuses in which an order counts towards its shopper's concurrent-order cap.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Accepted | Self::Shopping | Self::AwaitReceiptOk | Self::Enroute)
    }
}

//--------------------------------------         Role          ---------------------------------------------------------
/// The role an actor plays when they act on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The account holder who placed the order.
    Customer,
    Shopper,
    Admin,
}

text_enum!(Role {
    Customer => "customer",
    Shopper => "shopper",
    Admin => "admin",
});

impl Role {
    pub const ALL: [Role; 3] = [Self::Customer, Self::Shopper, Self::Admin];
}

//--------------------------------------  OrderMode / Receipt  ---------------------------------------------------------
/// Governs whether the account holder must approve item substitutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    #[default]
    Approve,
    Delegate,
}

text_enum!(OrderMode { Approve => "approve", Delegate => "delegate" });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptCheck {
    /// The account holder must approve the receipt before the shopper may leave the store.
    #[default]
    Required,
    /// The shopper may head out as soon as they are done shopping.
    Auto,
}

text_enum!(ReceiptCheck { Required => "required", Auto => "auto" });

//--------------------------------------       Locations       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub postcode: String,
    pub location: GeoPoint,
}

impl DeliveryAddress {
    pub fn new<S: Into<String>>(street: S, city: S, postcode: S, location: GeoPoint) -> Self {
        Self { street: street.into(), city: city.into(), postcode: postcode.into(), location }
    }
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Cents,
    pub max: Cents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub name: String,
    pub quantity: i64,
    pub price: PriceRange,
    pub substitution_allowed: bool,
    pub note: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub name: String,
    pub quantity: i64,
    pub price: PriceRange,
    pub substitution_allowed: bool,
    pub note: Option<String>,
    pub category: Option<String>,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(name: S, quantity: i64, min_price: Cents, max_price: Cents) -> Self {
        Self {
            name: name.into(),
            quantity,
            price: PriceRange { min: min_price, max: max_price },
            substitution_allowed: true,
            note: None,
            category: None,
        }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn without_substitutions(mut self) -> Self {
        self.substitution_allowed = false;
        self
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: i64,
    pub status: OrderStatusType,
    pub mode: OrderMode,
    pub receipt_check: ReceiptCheck,
    pub estimate_amount: Cents,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
    pub address: DeliveryAddress,
    pub items: Vec<OrderItem>,
    pub shopper_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_claimed(&self) -> bool {
        self.shopper_id.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The distinct item categories in this order.
    pub fn categories(&self) -> BTreeSet<String> {
        self.items.iter().filter_map(|i| i.category.clone()).collect()
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub account_id: i64,
    pub mode: OrderMode,
    pub receipt_check: ReceiptCheck,
    pub estimate_amount: Cents,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
    pub address: DeliveryAddress,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new(account_id: i64, estimate_amount: Cents, address: DeliveryAddress) -> Self {
        Self {
            account_id,
            mode: OrderMode::default(),
            receipt_check: ReceiptCheck::default(),
            estimate_amount,
            deadline: None,
            priority: None,
            address,
            items: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: OrderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_receipt_check(mut self, receipt_check: ReceiptCheck) -> Self {
        self.receipt_check = receipt_check;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }

    /// Checks the internal consistency of the order request. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() {
            return Err("An order must contain at least one item".into());
        }
        if !self.estimate_amount.is_positive() {
            return Err(format!("The estimate must be positive, not {}", self.estimate_amount));
        }
        if let Some(p) = self.priority {
            if !(1..=10).contains(&p) {
                return Err(format!("Priority must be between 1 and 10, not {p}"));
            }
        }
        for item in &self.items {
            if item.name.trim().is_empty() {
                return Err("Item names cannot be empty".into());
            }
            if item.quantity < 1 {
                return Err(format!("Item '{}' has an invalid quantity of {}", item.name, item.quantity));
            }
            if item.price.min > item.price.max {
                return Err(format!("Item '{}' has a minimum price above its maximum price", item.name));
            }
        }
        Ok(())
    }
}

//--------------------------------------   OrderQueryFilter    ---------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub account_id: Option<i64>,
    pub shopper_id: Option<i64>,
    pub unassigned: bool,
    pub statuses: Vec<OrderStatusType>,
    /// Sort by descending priority (unset counts as 0), then oldest first, instead of by id.
    pub priority_first: bool,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_account_id(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_shopper_id(mut self, shopper_id: i64) -> Self {
        self.shopper_id = Some(shopper_id);
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.unassigned = true;
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn priority_first(mut self) -> Self {
        self.priority_first = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.account_id.is_none() && self.shopper_id.is_none() && !self.unassigned && self.statuses.is_empty()
    }
}

//--------------------------------------   OrderAuditLogEntry  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAuditLogEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub actor_id: i64,
    pub actor_role: Role,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit entry that has not been written yet. The order id and timestamp are supplied by the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor_id: i64,
    pub actor_role: Role,
    pub action: String,
    pub payload: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new<S: Into<String>>(actor_id: i64, actor_role: Role, action: S, payload: serde_json::Value) -> Self {
        Self { actor_id, actor_role, action: action.into(), payload }
    }
}

//--------------------------------------     ServiceCredit     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    DeliveryDelay,
    QualityIssue,
    SlaViolation,
    MissingItem,
    Goodwill,
}

text_enum!(CreditReason {
    DeliveryDelay => "delivery_delay",
    QualityIssue => "quality_issue",
    SlaViolation => "sla_violation",
    MissingItem => "missing_item",
    Goodwill => "goodwill",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredit {
    pub id: i64,
    pub account_id: i64,
    /// The value of the credit after the tier multiplier was applied.
    pub amount: Cents,
    /// The value requested by the grantor, before the tier multiplier.
    pub original_amount: Cents,
    pub reason: CreditReason,
    pub order_ref: Option<OrderId>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_amount: Option<Cents>,
    pub consumed_for_order: Option<OrderId>,
    /// For remainders produced by a partial consumption, the row this credit was split from.
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ServiceCredit {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.is_consumed() && !self.is_expired(now)
    }

    /// The value this row contributes to the ledger: the consumed amount for closed rows, the face amount otherwise.
    pub fn ledger_value(&self) -> Cents {
        match self.consumed_amount {
            Some(consumed) if self.is_consumed() => consumed,
            _ => self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredit {
    pub account_id: i64,
    pub amount: Cents,
    pub original_amount: Cents,
    pub reason: CreditReason,
    pub order_ref: Option<OrderId>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      LedgerEvent      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    Grant,
    Consume,
}

text_enum!(LedgerEventKind { Grant => "grant", Consume => "consume" });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: i64,
    pub account_id: i64,
    pub kind: LedgerEventKind,
    pub amount: Cents,
    pub order_ref: Option<OrderId>,
    /// The credit rows created or closed by this event.
    pub credit_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// A request to debit `amount` from the account's credits at time `now`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub account_id: i64,
    pub amount: Cents,
    pub order_ref: OrderId,
    pub now: DateTime<Utc>,
}

//--------------------------------------   SubscriptionTier    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Plus,
    Premium,
}

text_enum!(SubscriptionTier { Free => "free", Plus => "plus", Premium => "premium" });

//--------------------------------------    ShopperProfile     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopperStatus {
    #[default]
    Active,
    Suspended,
    Deactivated,
}

text_enum!(ShopperStatus { Active => "active", Suspended => "suspended", Deactivated => "deactivated" });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

text_enum!(KycStatus { Pending => "pending", Approved => "approved", Rejected => "rejected" });

/// A daily window in UTC hours. `start_hour > end_hour` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl WorkingHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self { start_hour: start_hour % 24, end_hour: end_hour % 24 }
    }

    /// Whether `hour` falls in `[start_hour, end_hour)`. Windows may wrap past midnight, and a window that starts and
    /// ends on the same hour covers the whole day.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            true
        } else if self.start_hour < self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopperPreferences {
    /// Orders containing any of these categories are never offered to the shopper.
    pub excluded_categories: BTreeSet<String>,
    pub preferred_categories: BTreeSet<String>,
    pub min_order_value: Cents,
    pub working_hours: Option<WorkingHours>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopperProfile {
    pub id: i64,
    pub status: ShopperStatus,
    pub kyc_status: KycStatus,
    pub rating_avg: f64,
    pub rating_count: i64,
    pub location: GeoPoint,
    /// As reported by the directory. Claims recount active orders from the order store.
    pub active_order_count: i64,
    pub completed_orders: i64,
    pub online: bool,
    pub accepts_premium_orders: bool,
    pub preferences: ShopperPreferences,
}

impl ShopperProfile {
    pub fn new(id: i64, location: GeoPoint) -> Self {
        Self {
            id,
            status: ShopperStatus::Active,
            kyc_status: KycStatus::Approved,
            rating_avg: 0.0,
            rating_count: 0,
            location,
            active_order_count: 0,
            completed_orders: 0,
            online: true,
            accepts_premium_orders: false,
            preferences: ShopperPreferences::default(),
        }
    }

    pub fn with_rating(mut self, rating_avg: f64, rating_count: i64) -> Self {
        self.rating_avg = rating_avg;
        self.rating_count = rating_count;
        self
    }

    pub fn with_completed_orders(mut self, completed_orders: i64) -> Self {
        self.completed_orders = completed_orders;
        self
    }

    pub fn with_status(mut self, status: ShopperStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_kyc_status(mut self, kyc_status: KycStatus) -> Self {
        self.kyc_status = kyc_status;
        self
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn accepting_premium_orders(mut self) -> Self {
        self.accepts_premium_orders = true;
        self
    }

    pub fn with_preferences(mut self, preferences: ShopperPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Account-level checks that do not depend on workload: the shopper must be active and verified.
    pub fn is_approved(&self) -> bool {
        self.status == ShopperStatus::Active && self.kyc_status == KycStatus::Approved
    }
}
