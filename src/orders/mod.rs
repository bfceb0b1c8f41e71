//! Orders: records, input validation, payment creation and the status lifecycle

pub mod lifecycle;
pub mod models;
pub mod service;
pub mod validation;

pub use lifecycle::{OrderLifecycle, PaymentOutcome, TransitionResult};
pub use models::{Order, OrderItem, OrderReference, OrderStatus};
pub use service::{CheckoutService, PaymentCreated};
pub use validation::{CheckoutDraft, CreatePaymentRequest};
