use crate::geo::{distance_km, Coordinate};
use crate::incident::Incident;

pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 20.0;

/// Incidents within `radius_km` of `origin`, in input order.
///
/// No origin means no nearby incidents (not "everything"). The boundary is
/// inclusive.
pub fn nearby(origin: Option<Coordinate>, incidents: &[Incident], radius_km: f64) -> Vec<Incident> {
    let Some(origin) = origin else {
        return Vec::new();
    };
    incidents
        .iter()
        .filter(|incident| distance_km(origin, incident.coordinate) <= radius_km)
        .cloned()
        .collect()
}

/// Same membership as [`nearby`], paired with each incident's distance.
pub fn nearby_with_distance(
    origin: Option<Coordinate>,
    incidents: &[Incident],
    radius_km: f64,
) -> Vec<(Incident, f64)> {
    let Some(origin) = origin else {
        return Vec::new();
    };
    incidents
        .iter()
        .filter_map(|incident| {
            let d = distance_km(origin, incident.coordinate);
            (d <= radius_km).then(|| (incident.clone(), d))
        })
        .collect()
}
