// Small helpers shared by workspace pages

use chrono::Local;
use uuid::Uuid;

/// Unique-enough record id: `prefix` + epoch milliseconds + a 0..999 random suffix
pub fn generate_id(prefix: &str) -> String {
    // The low bits of a v7 UUID are random
    let suffix = Uuid::now_v7().as_u128() % 1000;
    format!("{}{}{}", prefix, crate::now_ms(), suffix)
}

/// Today's local date as `YYYY-MM-DD`
pub fn today_iso() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}
