//! Audit trail records.
//!
//! Every state change is described by an [`AuditEvent`] variant carrying
//! typed before/after payloads. The payloads are serialized to JSON only when
//! the row is written, so the stored shape stays opaque to the database.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::booking::{Booking, BookingStatus, ItemSnapshot};
use super::contact::{ContactChannel, ContactDirection};
use super::facility::{BookingRules, Facility, PricingType, RuleSnapshot};
use super::payment::{Payment, PaymentMethod, PaymentStatus, PaymentTransaction, TransactionType};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Customer,
    System,
    Admin,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Customer => "CUSTOMER",
            ActorType::System => "SYSTEM",
            ActorType::Admin => "ADMIN",
        }
    }
}

/// Who performed an action and where the request came from.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    /// Same request metadata, attributed to the system instead of the caller.
    pub fn as_system(&self) -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: None,
            actor_name: None,
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn actor_ref(&self) -> Option<ActorRef> {
        self.actor_id.as_ref().map(|id| ActorRef {
            id: id.clone(),
            name: self.actor_name.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActorRef {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub booking_date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
}

impl Timing {
    pub fn of(booking: &Booking) -> Self {
        Self {
            booking_date: booking.booking_date,
            start_time: booking.start_time,
            end_time: booking.end_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreatedState {
    pub booking_id: String,
    pub booking_code: String,
    pub facility_id: String,
    pub customer_id: String,
    pub status: BookingStatus,
    pub pricing_type: PricingType,
    pub total_amount: Decimal,
    pub currency: String,
    pub item: ItemSnapshot,
    pub participants: i64,
    pub purpose: Option<String>,
    pub source: String,
    pub timing: Timing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemScheduleState {
    pub item_id: String,
    pub date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub unit_count: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    pub booking_id: String,
    pub booking_code: String,
    pub timing: Timing,
    pub total_amount: Decimal,
    pub first_item: Option<ItemScheduleState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduledState {
    #[serde(flatten)]
    pub schedule: ScheduleState,
    pub facility_id: String,
    pub pricing_type: PricingType,
    pub rules: RuleSnapshot,
    pub rescheduled_at: DateTime<Utc>,
    pub rescheduled_by: Option<ActorRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatusState {
    pub booking_id: String,
    pub booking_code: String,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub admin_note: Option<String>,
    pub facility_id: String,
    pub customer_id: String,
}

impl From<&Booking> for BookingStatusState {
    fn from(b: &Booking) -> Self {
        Self {
            booking_id: b.id.clone(),
            booking_code: b.booking_code.clone(),
            status: b.status,
            total_amount: b.total_amount,
            admin_note: b.admin_note.clone(),
            facility_id: b.facility_id.clone(),
            customer_id: b.customer_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedState {
    #[serde(flatten)]
    pub state: BookingStatusState,
    /// Admin note or cancellation reason supplied with the change.
    pub note: Option<String>,
    /// Amount settled as part of the change, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_amount: Option<Decimal>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<ActorRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentState {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub total_due: Decimal,
    pub total_paid: Decimal,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl From<&Payment> for PaymentState {
    fn from(p: &Payment) -> Self {
        Self {
            payment_id: p.id.clone(),
            status: p.status,
            total_due: p.total_due,
            total_paid: p.total_paid,
            last_transaction_at: p.last_transaction_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdatedState {
    #[serde(flatten)]
    pub state: PaymentState,
    pub context: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    pub transaction_id: String,
    pub booking_id: String,
    pub payment_id: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub method: PaymentMethod,
    pub status: String,
    pub paid_at: DateTime<Utc>,
    pub created_by: Option<ActorRef>,
}

impl TransactionState {
    pub fn new(tx: &PaymentTransaction, created_by: Option<ActorRef>) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            booking_id: tx.booking_id.clone(),
            payment_id: tx.payment_id.clone(),
            amount: tx.amount,
            tx_type: tx.tx_type,
            method: tx.method,
            status: tx.status.clone(),
            paid_at: tx.paid_at,
            created_by,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityState {
    pub facility_id: String,
    pub name: String,
    pub pricing_type: PricingType,
    pub base_price: Decimal,
    pub min_duration: Option<i64>,
    pub rules: Option<BookingRules>,
    pub is_deleted: bool,
}

impl From<&Facility> for FacilityState {
    fn from(f: &Facility) -> Self {
        Self {
            facility_id: f.id.clone(),
            name: f.name.clone(),
            pricing_type: f.pricing_type,
            base_price: f.base_price,
            min_duration: f.min_duration,
            rules: f.rules.clone(),
            is_deleted: f.is_deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceListState {
    pub price_list_id: String,
    pub facility_id: String,
    pub unit_price: Decimal,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStartedState {
    pub contact_log_id: String,
    pub booking_code: String,
    pub facility_id: String,
    pub channel: ContactChannel,
    pub direction: ContactDirection,
    pub initiated_by: Option<ActorRef>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureState {
    pub attempted_action: &'static str,
    pub error: String,
}

#[derive(Debug, Clone)]
pub enum AuditEvent {
    BookingCreate {
        after: Box<BookingCreatedState>,
    },
    PaymentInit {
        after: PaymentState,
    },
    BookingReschedule {
        before: ScheduleState,
        after: RescheduledState,
    },
    BookingApprove {
        before: BookingStatusState,
        after: StatusChangedState,
    },
    BookingComplete {
        before: BookingStatusState,
        after: StatusChangedState,
    },
    BookingCancel {
        before: BookingStatusState,
        after: StatusChangedState,
    },
    PaymentUpdate {
        before: PaymentState,
        after: PaymentUpdatedState,
    },
    PaymentTransactionCreate {
        after: TransactionState,
    },
    FacilityCreate {
        after: FacilityState,
    },
    FacilityDelete {
        before: FacilityState,
        after: FacilityState,
    },
    PriceListCreate {
        after: PriceListState,
    },
    ContactWhatsappStart {
        after: ContactStartedState,
    },
    /// Written outside the failed transaction on the best-effort channel.
    OperationFailed {
        entity: &'static str,
        entity_id: Option<String>,
        after: FailureState,
    },
}

impl AuditEvent {
    pub fn action(&self) -> &'static str {
        match self {
            AuditEvent::BookingCreate { .. } => "BOOKING_CREATE",
            AuditEvent::PaymentInit { .. } => "PAYMENT_INIT",
            AuditEvent::BookingReschedule { .. } => "BOOKING_RESCHEDULE",
            AuditEvent::BookingApprove { .. } => "BOOKING_APPROVE",
            AuditEvent::BookingComplete { .. } => "BOOKING_COMPLETE",
            AuditEvent::BookingCancel { .. } => "BOOKING_CANCEL",
            AuditEvent::PaymentUpdate { .. } => "PAYMENT_UPDATE",
            AuditEvent::PaymentTransactionCreate { .. } => "PAYMENT_TRANSACTION_CREATE",
            AuditEvent::FacilityCreate { .. } => "FACILITY_CREATE",
            AuditEvent::FacilityDelete { .. } => "FACILITY_DELETE",
            AuditEvent::PriceListCreate { .. } => "PRICE_LIST_CREATE",
            AuditEvent::ContactWhatsappStart { .. } => "CONTACT_WHATSAPP_START",
            AuditEvent::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    pub fn entity(&self) -> &'static str {
        match self {
            AuditEvent::BookingCreate { .. }
            | AuditEvent::BookingReschedule { .. }
            | AuditEvent::BookingApprove { .. }
            | AuditEvent::BookingComplete { .. }
            | AuditEvent::BookingCancel { .. } => "booking",
            AuditEvent::PaymentInit { .. } | AuditEvent::PaymentUpdate { .. } => "payment",
            AuditEvent::PaymentTransactionCreate { .. } => "paymentTransaction",
            AuditEvent::FacilityCreate { .. } | AuditEvent::FacilityDelete { .. } => "facility",
            AuditEvent::PriceListCreate { .. } => "priceList",
            AuditEvent::ContactWhatsappStart { .. } => "contactLog",
            AuditEvent::OperationFailed { entity, .. } => entity,
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        match self {
            AuditEvent::BookingCreate { after } => Some(&after.booking_id),
            AuditEvent::PaymentInit { after } => Some(&after.payment_id),
            AuditEvent::BookingReschedule { before, .. } => Some(&before.booking_id),
            AuditEvent::BookingApprove { before, .. }
            | AuditEvent::BookingComplete { before, .. }
            | AuditEvent::BookingCancel { before, .. } => Some(&before.booking_id),
            AuditEvent::PaymentUpdate { before, .. } => Some(&before.payment_id),
            AuditEvent::PaymentTransactionCreate { after } => Some(&after.transaction_id),
            AuditEvent::FacilityCreate { after } => Some(&after.facility_id),
            AuditEvent::FacilityDelete { before, .. } => Some(&before.facility_id),
            AuditEvent::PriceListCreate { after } => Some(&after.price_list_id),
            AuditEvent::ContactWhatsappStart { after } => Some(&after.contact_log_id),
            AuditEvent::OperationFailed { entity_id, .. } => entity_id.as_deref(),
        }
    }

    pub fn before_json(&self) -> serde_json::Result<Option<serde_json::Value>> {
        match self {
            AuditEvent::BookingReschedule { before, .. } => serde_json::to_value(before).map(Some),
            AuditEvent::BookingApprove { before, .. }
            | AuditEvent::BookingComplete { before, .. }
            | AuditEvent::BookingCancel { before, .. } => serde_json::to_value(before).map(Some),
            AuditEvent::PaymentUpdate { before, .. } => serde_json::to_value(before).map(Some),
            AuditEvent::FacilityDelete { before, .. } => serde_json::to_value(before).map(Some),
            _ => Ok(None),
        }
    }

    pub fn after_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            AuditEvent::BookingCreate { after } => serde_json::to_value(after),
            AuditEvent::PaymentInit { after } => serde_json::to_value(after),
            AuditEvent::BookingReschedule { after, .. } => serde_json::to_value(after),
            AuditEvent::BookingApprove { after, .. }
            | AuditEvent::BookingComplete { after, .. }
            | AuditEvent::BookingCancel { after, .. } => serde_json::to_value(after),
            AuditEvent::PaymentUpdate { after, .. } => serde_json::to_value(after),
            AuditEvent::PaymentTransactionCreate { after } => serde_json::to_value(after),
            AuditEvent::FacilityCreate { after } => serde_json::to_value(after),
            AuditEvent::FacilityDelete { after, .. } => serde_json::to_value(after),
            AuditEvent::PriceListCreate { after } => serde_json::to_value(after),
            AuditEvent::ContactWhatsappStart { after } => serde_json::to_value(after),
            AuditEvent::OperationFailed { after, .. } => serde_json::to_value(after),
        }
    }
}

/// A stored audit row, as read back for inspection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub actor_type: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<String>,
    pub booking_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
