//! Asynchronous confirmation-mail dispatch.
//!
//! Producers push [`PendingNotification`]s onto an unbounded in-process queue
//! and return at once. A single consumer task hands them to the
//! [`MailTransport`] one at a time. Delivery is at-most-once: a transport
//! failure is logged and the message dropped, and anything still queued when
//! the process dies is lost.

use std::fmt::Write as _;
use std::sync::Arc;

use domain::{Cart, Money, SaleStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::services::MailTransport;

/// An email waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

impl PendingNotification {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        is_html: bool,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            is_html,
        }
    }

    /// Builds the order confirmation for a purchased cart.
    ///
    /// Cancelled lines are left out of both the listing and the total.
    /// Returns None if the cart carries no client snapshot to address it to.
    pub fn order_confirmation(cart: &Cart) -> Option<Self> {
        let client = cart.client()?;
        let active = || {
            cart.lines()
                .iter()
                .filter(|line| line.status != SaleStatus::Cancelled)
        };

        let mut body = String::new();
        let _ = write!(
            body,
            "<h1>Thank you for your order, {}!</h1><p>Order {}</p><table>",
            client.name,
            cart.id()
        );
        for line in active() {
            let _ = write!(
                body,
                "<tr><td>{}</td><td>{} x {}</td><td>{}</td></tr>",
                line.product_name,
                line.quantity,
                line.unit_price,
                line.total_price()
            );
        }
        let _ = write!(
            body,
            "</table><p>Total: {}</p><p>Shipping to: {}</p>",
            active().map(|line| line.total_price()).sum::<Money>(),
            client.address
        );

        Some(Self::new(
            client.email.clone(),
            "Order confirmation",
            body,
            true,
        ))
    }
}

/// Errors raised while queueing or delivering notifications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The consumer has shut down.
    #[error("Notification queue is closed")]
    QueueClosed,

    #[error("Mail transport error: {0}")]
    Transport(String),
}

/// Delivery counts reported when the dispatcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<PendingNotification>,
}

impl NotificationSender {
    /// Queues a notification without waiting for delivery.
    pub fn enqueue(&self, notification: PendingNotification) -> Result<(), DispatchError> {
        self.tx
            .send(notification)
            .map_err(|_| DispatchError::QueueClosed)
    }
}

/// Consumer side of the queue.
pub struct NotificationDispatcher<T: MailTransport> {
    transport: Arc<T>,
    rx: mpsc::UnboundedReceiver<PendingNotification>,
}

impl<T: MailTransport + 'static> NotificationDispatcher<T> {
    /// Creates the queue and returns its consumer and producer halves.
    pub fn new(transport: Arc<T>) -> (Self, NotificationSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { transport, rx }, NotificationSender { tx })
    }

    /// Runs the consumer loop on its own task.
    pub fn spawn(self) -> DispatcherHandle {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(self.run(Arc::clone(&shutdown)));
        DispatcherHandle { shutdown, task }
    }

    /// Delivers queued notifications until `shutdown` fires or every sender
    /// is dropped, then drains what is already queued.
    pub async fn run(mut self, shutdown: Arc<Notify>) -> DispatchStats {
        tracing::info!("notification dispatcher started");
        let mut stats = DispatchStats::default();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    tracing::info!("notification dispatcher received shutdown signal");
                    break;
                }
                message = self.rx.recv() => match message {
                    Some(notification) => self.deliver(&notification, &mut stats).await,
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Some(notification) = self.rx.recv().await {
            self.deliver(&notification, &mut stats).await;
        }

        tracing::info!(
            sent = stats.sent,
            failed = stats.failed,
            "notification dispatcher stopped"
        );
        stats
    }

    async fn deliver(&self, notification: &PendingNotification, stats: &mut DispatchStats) {
        match self.transport.send(notification).await {
            Ok(()) => {
                stats.sent += 1;
                metrics::counter!("notifications_sent_total").increment(1);
                tracing::debug!(
                    to = %notification.to,
                    subject = %notification.subject,
                    "notification sent"
                );
            }
            Err(e) => {
                stats.failed += 1;
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(
                    to = %notification.to,
                    subject = %notification.subject,
                    error = %e,
                    "notification dropped"
                );
            }
        }
    }
}

/// Handle to a running dispatcher task.
pub struct DispatcherHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<DispatchStats>,
}

impl DispatcherHandle {
    /// Stops accepting new work, drains the queue, and waits for the task.
    pub async fn shutdown(self) -> DispatchStats {
        self.shutdown.notify_one();
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "notification dispatcher task failed");
                DispatchStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryMailTransport;
    use domain::{ClientSnapshot, Money, ProductId, UserId};

    fn note(to: &str) -> PendingNotification {
        PendingNotification::new(to, "Hello", "Body", false)
    }

    #[tokio::test]
    async fn test_delivers_in_queue_order() {
        let transport = Arc::new(InMemoryMailTransport::new());
        let (dispatcher, sender) = NotificationDispatcher::new(Arc::clone(&transport));
        let handle = dispatcher.spawn();

        for to in ["a@example.com", "b@example.com", "c@example.com"] {
            sender.enqueue(note(to)).unwrap();
        }
        let stats = handle.shutdown().await;

        assert_eq!(stats, DispatchStats { sent: 3, failed: 0 });
        let sent: Vec<String> = transport.sent().await.into_iter().map(|n| n.to).collect();
        assert_eq!(sent, ["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_dropped_and_loop_continues() {
        let transport = Arc::new(InMemoryMailTransport::new());
        transport.reject_recipient("lost@example.com").await;
        let (dispatcher, sender) = NotificationDispatcher::new(Arc::clone(&transport));

        sender.enqueue(note("lost@example.com")).unwrap();
        sender.enqueue(note("kept@example.com")).unwrap();
        drop(sender);
        let stats = dispatcher.run(Arc::new(Notify::new())).await;

        assert_eq!(stats, DispatchStats { sent: 1, failed: 1 });
        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "kept@example.com");
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_reports_closed() {
        let transport = Arc::new(InMemoryMailTransport::new());
        let (dispatcher, sender) = NotificationDispatcher::new(transport);
        dispatcher.spawn().shutdown().await;

        assert_eq!(
            sender.enqueue(note("late@example.com")),
            Err(DispatchError::QueueClosed)
        );
    }

    #[tokio::test]
    async fn test_stops_when_all_senders_dropped() {
        let transport = Arc::new(InMemoryMailTransport::new());
        let (dispatcher, sender) = NotificationDispatcher::new(Arc::clone(&transport));
        sender.enqueue(note("a@example.com")).unwrap();
        drop(sender);

        let stats = dispatcher.run(Arc::new(Notify::new())).await;

        assert_eq!(stats.sent, 1);
    }

    #[test]
    fn test_order_confirmation_lists_active_lines() {
        let mut cart = Cart::new(UserId::new());
        cart.add_line("P1", "Desk lamp", 2, Money::from_cents(1999))
            .unwrap();
        cart.add_line("P2", "Chair", 1, Money::from_cents(5000))
            .unwrap();
        cart.begin_checkout(
            ClientSnapshot::new("Ana", "ana@example.com", "Calle Mayor 1"),
            chrono::Utc::now(),
        )
        .unwrap();
        cart.set_line_status(&ProductId::new("P2"), SaleStatus::Cancelled)
            .unwrap();

        let mail = PendingNotification::order_confirmation(&cart).unwrap();

        assert_eq!(mail.to, "ana@example.com");
        assert!(mail.is_html);
        assert!(mail.body.contains("Desk lamp"));
        assert!(mail.body.contains("Total: $39.98"));
        assert!(!mail.body.contains("Chair"));
        assert!(!mail.body.contains("$89.98"));
    }

    #[test]
    fn test_order_confirmation_needs_client() {
        let cart = Cart::new(UserId::new());
        assert!(PendingNotification::order_confirmation(&cart).is_none());
    }
}
