#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` continue to work.

pub mod device_endpoint;
pub mod notification_preferences;
pub mod notification_record;
pub mod queue_message;

pub use self::device_endpoint::*;
pub use self::notification_preferences::*;
pub use self::notification_record::*;
pub use self::queue_message::*;
