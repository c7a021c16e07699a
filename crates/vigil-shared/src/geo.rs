//! Location anonymization and zone topology.
//!
//! A zone is the string `<latBucket>_<lngBucket>` where each bucket is the
//! coordinate scaled by [`ZONE_SCALE`] and floored. Raw coordinates are
//! jittered before bucketing, so the same point may land in a neighbouring
//! zone on different calls. Alerts are fanned out to a zone and its eight
//! grid neighbours, which absorbs that jitter.

use rand::Rng;

use crate::constants::{LOCATION_NOISE_DEGREES, ZONE_SCALE, ZONE_TOPIC_PREFIX};

/// Result of anonymizing a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizedLocation {
    /// Coarse zone identifier derived from the perturbed coordinate.
    pub zone: String,
    /// Perturbed latitude.
    pub lat: f64,
    /// Perturbed longitude.
    pub lng: f64,
}

/// Perturb a coordinate with thread-local randomness and derive its zone.
pub fn anonymize(lat: f64, lng: f64) -> AnonymizedLocation {
    anonymize_with(&mut rand::thread_rng(), lat, lng)
}

/// Same as [`anonymize`] with an injected random source.
pub fn anonymize_with<R: Rng>(rng: &mut R, lat: f64, lng: f64) -> AnonymizedLocation {
    let lat = lat + rng.gen_range(-LOCATION_NOISE_DEGREES..LOCATION_NOISE_DEGREES);
    let lng = lng + rng.gen_range(-LOCATION_NOISE_DEGREES..LOCATION_NOISE_DEGREES);

    AnonymizedLocation {
        zone: zone_for(lat, lng),
        lat,
        lng,
    }
}

/// Zone containing an (already perturbed) coordinate.
pub fn zone_for(lat: f64, lng: f64) -> String {
    format_zone(bucket(lat), bucket(lng))
}

fn bucket(value: f64) -> i64 {
    (value * ZONE_SCALE).floor() as i64
}

fn format_zone(lat_bucket: i64, lng_bucket: i64) -> String {
    format!("{lat_bucket}_{lng_bucket}")
}

/// Split a zone into its two buckets. `None` unless the string is exactly
/// two integers joined by `_` that fit in an `i64`.
pub fn parse_zone(zone: &str) -> Option<(i64, i64)> {
    let (lat, lng) = split_zone(zone)?;
    Some((lat.parse().ok()?, lng.parse().ok()?))
}

/// Both bucket substrings of a well-formed zone (`-?digits_-?digits`).
/// Bucket width is not bounded.
fn split_zone(zone: &str) -> Option<(&str, &str)> {
    let (lat, lng) = zone.split_once('_')?;
    (is_bucket(lat) && is_bucket(lng)).then_some((lat, lng))
}

fn is_bucket(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// The zone itself followed by its eight grid neighbours, row-major over
/// offsets -1, 0, 1. A zone that is not well-formed is returned on its own.
pub fn neighborhood(zone: &str) -> Vec<String> {
    let Some((lat, lng)) = split_zone(zone) else {
        return vec![zone.to_string()];
    };

    let mut zones = Vec::with_capacity(9);
    zones.push(zone.to_string());
    for d_lat in [-1, 0, 1] {
        for d_lng in [-1, 0, 1] {
            if d_lat == 0 && d_lng == 0 {
                continue;
            }
            zones.push(format!(
                "{}_{}",
                step_bucket(lat, d_lat),
                step_bucket(lng, d_lng)
            ));
        }
    }
    zones
}

/// `bucket + delta` for `delta` in -1..=1. Buckets outside the `i64` range
/// are stepped on their decimal digits.
fn step_bucket(bucket: &str, delta: i64) -> String {
    if let Some(stepped) = bucket
        .parse::<i64>()
        .ok()
        .and_then(|v| v.checked_add(delta))
    {
        return stepped.to_string();
    }
    if delta == 0 {
        return bucket.to_string();
    }

    // Only reached for |bucket| >= 2^63, so the sign never flips.
    let (negative, digits) = match bucket.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, bucket),
    };
    let grow = (delta > 0) != negative;
    let magnitude = if grow {
        increment_digits(digits)
    } else {
        decrement_digits(digits)
    };
    if negative {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}

fn increment_digits(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for b in out.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            return String::from_utf8_lossy(&out).into_owned();
        }
    }
    let mut grown = String::with_capacity(out.len() + 1);
    grown.push('1');
    grown.push_str(&String::from_utf8_lossy(&out));
    grown
}

fn decrement_digits(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for b in out.iter_mut().rev() {
        if *b == b'0' {
            *b = b'9';
        } else {
            *b -= 1;
            break;
        }
    }
    let trimmed = String::from_utf8_lossy(&out);
    let trimmed = trimmed.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Push topic a zone's alerts are published on.
pub fn zone_topic(zone: &str) -> String {
    format!("{ZONE_TOPIC_PREFIX}{zone}")
}
