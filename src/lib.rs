//! Unread-count detection for the Messenger desktop shell.
//!
//! The page is read through the [`document::Document`] trait. A
//! [`detect::SignalExtractor`] pulls the unread count out of it, a
//! [`monitor::ChangeMonitor`] re-runs that on page mutations and reports
//! changes, and [`badge::BadgeDispatcher`] validates what reaches the native
//! badge.

pub mod badge;
pub mod config;
pub mod detect;
pub mod document;
mod error;
pub mod monitor;
pub mod notification;
pub mod signal;

pub use badge::{BadgeDispatcher, BadgeRenderer, BadgeState};
pub use config::DetectorConfig;
pub use detect::SignalExtractor;
pub use document::{Document, DocumentError, MemoryDocument};
pub use error::{BadgeError, BadgeResult};
pub use monitor::{ChangeMonitor, MonitorConfig};
pub use signal::{UnreadCount, UnreadSignal};
