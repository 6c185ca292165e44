//! # Models
//!
//! Notification envelope and the durable message record built around it.

pub mod message_record;
pub mod notification;

pub use message_record::MessageRecord;
pub use notification::{IdPolicy, Notification, NotificationObject, ValidationError};
