pub mod event;
pub mod notification;

pub use notification::{MatchingApplicant, Notification, NotificationType, RawNotification};
