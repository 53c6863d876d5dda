//! Great-circle distance and proximity ranking.

use mealflow_core::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometres.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Ranks `candidates` by distance from `origin`, closest first, keeping
/// those within `radius_km` (pass `f64::INFINITY` for no cutoff) and at
/// most `limit` results.
#[must_use]
pub fn rank_by_distance<T>(
    candidates: Vec<(T, GeoPoint)>,
    origin: GeoPoint,
    radius_km: f64,
    limit: usize,
) -> Vec<(T, f64)> {
    let mut ranked: Vec<(T, f64)> = candidates
        .into_iter()
        .map(|(item, at)| (item, haversine_km(origin, at)))
        .filter(|(_, dist)| *dist <= radius_km)
        .collect();
    ranked.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(limit);
    ranked
}
