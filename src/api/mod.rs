pub mod client;

pub use client::{NotificationPage, NotificationSync, RestClient};
