//! Cron-driven maintenance: an hourly heartbeat and the daily counter reset.

pub mod sweep;
pub mod tasks;
