//! Configuration types

pub mod authority;
pub mod settings;

pub use authority::Authority;
pub use settings::Settings;

/// Current unix time in seconds.
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
