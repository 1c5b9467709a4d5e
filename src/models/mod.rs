pub mod audit;
pub mod booking;
pub mod contact;
pub mod customer;
pub mod facility;
pub mod payment;

pub use audit::{ActorRef, ActorType, AuditContext, AuditEvent, AuditLogEntry};
pub use booking::{
    ActiveBooking, Booking, BookingItem, BookingStatus, CalendarBooking, ItemSnapshot,
};
pub use contact::{ContactChannel, ContactDirection, ContactLog};
pub use customer::Customer;
pub use facility::{BookingRules, Facility, PriceListEntry, PricingType, RuleSnapshot};
pub use payment::{Payment, PaymentMethod, PaymentStatus, PaymentTransaction, TransactionType};

/// Returned when a stored enum column holds a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
