use chrono::Duration;

/// Maximum sanitized report length in characters
pub const MAX_CONTENT_LEN: usize = 500;

/// Maximum alert body length before truncation
pub const MAX_ALERT_BODY_LEN: usize = 100;

/// Appended to truncated alert bodies
pub const ELLIPSIS: &str = "...";

/// Language tag used when the reporter gives none
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// How long a report stays visible, in hours
pub const REPORT_TTL_HOURS: i64 = 8;

/// Width of the bucket `created_at` is floored to, in minutes
pub const TIMESTAMP_BUCKET_MINUTES: i64 = 15;

/// Zone grid resolution: coordinates are bucketed at 1/1000 degree (~100m)
pub const ZONE_SCALE: f64 = 1000.0;

/// Upper bound of the location noise added before bucketing, in degrees
pub const LOCATION_NOISE_DEGREES: f64 = 0.001;

/// Largest accepted absolute latitude, in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Largest accepted absolute longitude, in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Most recent reports returned by a zone query
pub const ZONE_QUERY_LIMIT: usize = 20;

/// Most recent reports returned by a category query
pub const CATEGORY_QUERY_LIMIT: usize = 50;

/// Prefix of the push topic a zone maps to
pub const ZONE_TOPIC_PREFIX: &str = "zone_";

/// Default interval of the expired-report sweep, in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

pub fn report_ttl() -> Duration {
    Duration::hours(REPORT_TTL_HOURS)
}
