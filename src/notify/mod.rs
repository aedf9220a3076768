//! Outbound webhook notifications

mod client;
mod error;

pub use client::{Notification, Notifier};
