pub mod mail_api;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub provider: &'static str,
    pub message_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<DeliveryReceipt>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<DeliveryReceipt> {
        tracing::info!(to = %to, subject = %subject, body_len = body.len(), "notification (log only)");
        Ok(DeliveryReceipt {
            provider: "log",
            message_id: None,
            accepted_at: Utc::now(),
        })
    }
}

/// What a customer needs to know about their booking.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingNotice {
    pub booking_id: String,
    pub booking_code: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub facility_name: String,
    pub booking_date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    Created(BookingNotice),
    Rescheduled(BookingNotice),
}

impl BookingEvent {
    pub fn notice(&self) -> &BookingNotice {
        match self {
            BookingEvent::Created(n) | BookingEvent::Rescheduled(n) => n,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BookingEvent::Created(_) => "created",
            BookingEvent::Rescheduled(_) => "rescheduled",
        }
    }
}

/// Plain-text subject and body for an event.
pub fn render(event: &BookingEvent) -> (String, String) {
    let n = event.notice();
    let (subject, intro) = match event {
        BookingEvent::Created(_) => (
            format!("Booking received: {}", n.booking_code),
            "Thank you, we have received your booking.",
        ),
        BookingEvent::Rescheduled(_) => (
            format!("Booking rescheduled: {}", n.booking_code),
            "Your booking has been moved to a new schedule.",
        ),
    };

    let time = match (n.start_time, n.end_time) {
        (Some(s), Some(e)) => format!("{} - {}", s.format("%H:%M"), e.format("%H:%M")),
        _ => "all day".to_string(),
    };

    let body = format!(
        "Hello {name},\n\n{intro}\n\n\
         Booking code: {code}\n\
         Facility: {facility}\n\
         Date: {date}\n\
         Time: {time}\n\
         Total: {currency} {total:.2}\n\
         Status: {status}\n",
        name = n.customer_name,
        code = n.booking_code,
        facility = n.facility_name,
        date = n.booking_date.format("%d %b %Y"),
        currency = n.currency,
        total = n.total_amount,
        status = n.status,
    );

    (subject, body)
}

/// Queues an event for the notification worker. Never blocks and never
/// fails the caller; a full or closed queue drops the event with a warning.
pub fn publish(tx: &mpsc::Sender<BookingEvent>, event: BookingEvent) {
    let booking_code = event.notice().booking_code.clone();
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(ev)) => {
            tracing::warn!(booking_code = %booking_code, kind = ev.kind(), "notification queue full, event dropped");
        }
        Err(TrySendError::Closed(ev)) => {
            tracing::warn!(booking_code = %booking_code, kind = ev.kind(), "notification worker stopped, event dropped");
        }
    }
}

/// Background task that delivers booking events until every sender is gone.
pub async fn run_notification_worker(
    mut rx: mpsc::Receiver<BookingEvent>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(event) = rx.recv().await {
        let notice = event.notice();
        let Some(to) = notice.customer_email.as_deref().filter(|e| !e.trim().is_empty()) else {
            tracing::debug!(booking_code = %notice.booking_code, "customer has no email, skipping notification");
            continue;
        };

        let (subject, body) = render(&event);
        match notifier.send(to, &subject, &body).await {
            Ok(receipt) => tracing::info!(
                booking_code = %notice.booking_code,
                kind = event.kind(),
                provider = receipt.provider,
                message_id = ?receipt.message_id,
                "notification sent"
            ),
            Err(e) => tracing::warn!(
                booking_code = %notice.booking_code,
                kind = event.kind(),
                error = %e,
                "notification failed"
            ),
        }
    }

    tracing::info!("notification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct Recording {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<DeliveryReceipt> {
            self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
            Ok(DeliveryReceipt {
                provider: "test",
                message_id: Some("m-1".to_string()),
                accepted_at: Utc::now(),
            })
        }
    }

    fn notice(email: Option<&str>) -> BookingNotice {
        let wib = FixedOffset::east_opt(7 * 3600).unwrap();
        BookingNotice {
            booking_id: "b-1".to_string(),
            booking_code: "BK123456ABCD".to_string(),
            customer_name: "Ana".to_string(),
            customer_email: email.map(str::to_string),
            facility_name: "Main Hall".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            start_time: Some(wib.with_ymd_and_hms(2030, 1, 15, 9, 0, 0).unwrap()),
            end_time: Some(wib.with_ymd_and_hms(2030, 1, 15, 11, 0, 0).unwrap()),
            total_amount: dec!(100000),
            currency: "IDR".to_string(),
            status: "NEW",
        }
    }

    #[test]
    fn test_render_includes_schedule_and_total() {
        let (subject, body) = render(&BookingEvent::Created(notice(None)));
        assert_eq!(subject, "Booking received: BK123456ABCD");
        assert!(body.contains("Time: 09:00 - 11:00"));
        assert!(body.contains("Total: IDR 100000.00"));
        assert!(body.contains("Date: 15 Jan 2030"));
    }

    #[tokio::test]
    async fn test_worker_skips_customers_without_email() {
        let notifier = Arc::new(Recording { sent: Mutex::new(Vec::new()) });
        let (tx, rx) = mpsc::channel(8);

        publish(&tx, BookingEvent::Created(notice(None)));
        publish(&tx, BookingEvent::Rescheduled(notice(Some("ana@example.com"))));
        drop(tx);

        run_notification_worker(rx, notifier.clone()).await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ana@example.com");
        assert!(sent[0].1.starts_with("Booking rescheduled"));
    }

    #[test]
    fn test_publish_drops_when_queue_full() {
        let (tx, mut rx) = mpsc::channel(1);
        publish(&tx, BookingEvent::Created(notice(None)));
        publish(&tx, BookingEvent::Created(notice(None)));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
