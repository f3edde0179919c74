use std::{
    sync::OnceLock,
    time::{Duration, Instant, SystemTime},
};

static START: OnceLock<(SystemTime, Instant)> = OnceLock::new();

/// Pin the supervisor start time. Later calls keep the first value.
pub fn init_uptime() -> SystemTime {
    START.get_or_init(|| (SystemTime::now(), Instant::now())).0
}

/// Time since [`init_uptime`], measured on the monotonic clock.
pub fn uptime() -> Duration {
    init_uptime();
    START.get().map_or(Duration::ZERO, |(_, at)| at.elapsed())
}

/// Host name of the machine, `unknown` when the OS will not tell.
pub fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
