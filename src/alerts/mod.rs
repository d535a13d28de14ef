//! Alert lifecycle and notifications
//!
//! The lifecycle manager turns classified readings into alert transitions backed
//! by the store; the notifier fans notable transitions out to log and webhook targets.

pub mod lifecycle;
pub mod notifier;

pub use lifecycle::{AlertLifecycleManager, Transition};
pub use notifier::{Notifier, NotifierError, NotifyTarget};
