use anyhow::anyhow;
use beacon_core::{
    format_time_ago, nearby_with_distance, AppConfig, ColorKey, Coordinate, Incident,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::NearbyArgs;

#[derive(Debug, Serialize)]
struct NearbyRow {
    id: String,
    title: String,
    distance_km: f64,
    color: &'static str,
    reported: String,
    latitude: f64,
    longitude: f64,
}

impl NearbyRow {
    fn new(incident: &Incident, distance_km: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: incident.id.clone(),
            title: incident.title.clone(),
            distance_km,
            color: ColorKey::for_categories(&incident.categories).as_str(),
            reported: format_time_ago(incident.created_at, now),
            latitude: incident.coordinate.latitude,
            longitude: incident.coordinate.longitude,
        }
    }
}

pub fn nearby(config: &AppConfig, json: bool, args: NearbyArgs) -> anyhow::Result<()> {
    let origin = Coordinate::new(args.lat, args.lon).map_err(|e| anyhow!("{e}"))?;
    let radius_km = match args.radius_km {
        Some(r) if r.is_finite() && r >= 0.0 => r,
        Some(r) => return Err(anyhow!("radius must be a non-negative number, got {r}")),
        None => config.nearby_radius_km(),
    };
    let incidents = crate::load_incidents(config, &args.input)?;
    tracing::info!(total = incidents.len(), radius_km, "filtering incidents");

    let now = Utc::now();
    let rows: Vec<NearbyRow> = nearby_with_distance(Some(origin), &incidents, radius_km)
        .iter()
        .map(|(incident, d)| NearbyRow::new(incident, *d, now))
        .collect();

    if json {
        let body = serde_json::json!({
            "ok": true,
            "origin": origin,
            "radius_km": radius_km,
            "total": incidents.len(),
            "nearby": rows,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!(
            "no incidents within {radius_km} km of ({:.4}, {:.4})",
            origin.latitude, origin.longitude
        );
        return Ok(());
    }
    for row in &rows {
        println!(
            "{:<12} {:>7.2} km  {:<6}  {:<14}  {}",
            row.id, row.distance_km, row.color, row.reported, row.title
        );
    }
    Ok(())
}
