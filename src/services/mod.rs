pub mod agenda;
pub mod audit;
pub mod availability;
pub mod booking;
pub mod calendar;
pub mod contact;
pub mod facilities;
pub mod notify;
pub mod pricing;
pub mod transitions;
