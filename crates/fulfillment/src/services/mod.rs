//! External collaborators and in-memory implementations.

pub mod notification;
pub mod payment;

pub use notification::{InMemoryNotifier, Notification, Notifier, send_best_effort};
pub use payment::{InMemoryPaymentGateway, PaymentGateway, PaymentSession, PaymentStatus};
