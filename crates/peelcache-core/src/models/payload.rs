//! Synthetic dining-hall data served for the mock-data endpoint.
//!
//! The payload is built once per process and never written to a store.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Global demo payload, built on first use
static DEMO_DATA: OnceLock<DemoData> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hall {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub status: String,
    pub open_hours: String,
    pub pickup_spot: String,
    pub pickup_windows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub fed_this_week: u32,
    pub donations_today: u32,
    pub avg_wait_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoData {
    pub halls: Vec<Hall>,
    pub metrics: Metrics,
}

impl DemoData {
    /// The process-wide payload.
    pub fn get() -> &'static DemoData {
        DEMO_DATA.get_or_init(seed)
    }

    /// Serialize a fresh copy for one response.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn hall(
    id: &str,
    name: &str,
    (lat, lng): (f64, f64),
    status: &str,
    open_hours: &str,
    pickup_spot: &str,
    pickup_windows: &[&str],
) -> Hall {
    Hall {
        id: id.to_string(),
        name: name.to_string(),
        lat,
        lng,
        status: status.to_string(),
        open_hours: open_hours.to_string(),
        pickup_spot: pickup_spot.to_string(),
        pickup_windows: pickup_windows.iter().map(|w| w.to_string()).collect(),
    }
}

fn seed() -> DemoData {
    DemoData {
        halls: vec![
            hall(
                "nebraska-union",
                "Nebraska Union",
                (40.817405, -96.703468),
                "Open",
                "Today · 7:00a — 9:00p",
                "North doors near Starbucks",
                &[
                    "10:15a - 10:30a · Welcome Desk",
                    "12:00p - 12:15p · South Atrium",
                    "6:00p - 6:15p · Union Plaza",
                ],
            ),
            hall(
                "abel-sandoz",
                "Abel / Sandoz",
                (40.818961, -96.689323),
                "Open",
                "Today · 6:30a — 10:00p",
                "South lobby by the elevators",
                &[
                    "8:00a - 8:10a · Lobby",
                    "1:00p - 1:15p · Dining Host",
                    "7:30p - 7:45p · East Entrance",
                ],
            ),
            hall(
                "selleck",
                "Selleck",
                (40.819672, -96.701255),
                "Closed · Opens 4:00p",
                "Reopens at 4:00p",
                "Courtyard picnic tables",
                &["4:15p - 4:30p · Courtyard", "5:45p - 6:00p · Front Desk"],
            ),
            hall(
                "cather",
                "Cather Dining",
                (40.820751, -96.705162),
                "Open",
                "Today · 7:00a — 10:00p",
                "Academic plaza benches",
                &[
                    "9:30a - 9:45a · Plaza",
                    "12:30p - 12:45p · Lobby",
                    "8:00p - 8:15p · Commons",
                ],
            ),
        ],
        metrics: Metrics {
            fed_this_week: 142,
            donations_today: 41,
            avg_wait_seconds: 390,
        },
    }
}
