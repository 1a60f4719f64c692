//! Country markers drawn on the globe.
//!
//! The table is fixed for the life of the process.  A marker carries no
//! playback state; its only job is to scope a directory query by ISO code.

use serde::{Deserialize, Serialize};

use crate::protocol::Country;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CountryMarker {
    pub name: String,
    /// ISO 3166-1 alpha-2, upper case.
    pub code: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_count: Option<u64>,
}

// (name, code, lat, lng)
const MARKERS: &[(&str, &str, f64, f64)] = &[
    ("United States", "US", 39.8, -98.6),
    ("Canada", "CA", 56.1, -106.3),
    ("Mexico", "MX", 23.6, -102.6),
    ("Cuba", "CU", 21.5, -77.8),
    ("Colombia", "CO", 4.6, -74.3),
    ("Venezuela", "VE", 6.4, -66.6),
    ("Peru", "PE", -9.2, -75.0),
    ("Brazil", "BR", -14.2, -51.9),
    ("Chile", "CL", -35.7, -71.5),
    ("Argentina", "AR", -38.4, -63.6),
    ("United Kingdom", "GB", 55.4, -3.4),
    ("Ireland", "IE", 53.4, -8.2),
    ("France", "FR", 46.2, 2.2),
    ("Spain", "ES", 40.5, -3.7),
    ("Portugal", "PT", 39.4, -8.2),
    ("Germany", "DE", 51.2, 10.5),
    ("Netherlands", "NL", 52.1, 5.3),
    ("Belgium", "BE", 50.5, 4.5),
    ("Switzerland", "CH", 46.8, 8.2),
    ("Austria", "AT", 47.5, 14.6),
    ("Italy", "IT", 41.9, 12.6),
    ("Greece", "GR", 39.1, 21.8),
    ("Poland", "PL", 51.9, 19.1),
    ("Czechia", "CZ", 49.8, 15.5),
    ("Hungary", "HU", 47.2, 19.5),
    ("Romania", "RO", 45.9, 25.0),
    ("Ukraine", "UA", 48.4, 31.2),
    ("Russia", "RU", 61.5, 105.3),
    ("Sweden", "SE", 60.1, 18.6),
    ("Norway", "NO", 60.5, 8.5),
    ("Finland", "FI", 61.9, 25.7),
    ("Denmark", "DK", 56.3, 9.5),
    ("Turkey", "TR", 38.9, 35.2),
    ("Israel", "IL", 31.0, 34.9),
    ("Saudi Arabia", "SA", 23.9, 45.1),
    ("Iran", "IR", 32.4, 53.7),
    ("Egypt", "EG", 26.8, 30.8),
    ("Morocco", "MA", 31.8, -7.1),
    ("Nigeria", "NG", 9.1, 8.7),
    ("Kenya", "KE", -0.0, 37.9),
    ("South Africa", "ZA", -30.6, 22.9),
    ("India", "IN", 20.6, 79.0),
    ("Pakistan", "PK", 30.4, 69.3),
    ("China", "CN", 35.9, 104.2),
    ("Japan", "JP", 36.2, 138.3),
    ("South Korea", "KR", 35.9, 127.8),
    ("Thailand", "TH", 15.9, 100.9),
    ("Vietnam", "VN", 14.1, 108.3),
    ("Philippines", "PH", 12.9, 121.8),
    ("Indonesia", "ID", -0.8, 113.9),
    ("Australia", "AU", -25.3, 133.8),
    ("New Zealand", "NZ", -40.9, 174.9),
];

fn to_marker(&(name, code, lat, lng): &(&str, &str, f64, f64)) -> CountryMarker {
    CountryMarker {
        name: name.to_string(),
        code: code.to_string(),
        lat,
        lng,
        station_count: None,
    }
}

/// Every marker, in table order.
pub fn all() -> Vec<CountryMarker> {
    MARKERS.iter().map(to_marker).collect()
}

/// Case-insensitive lookup by ISO code.
pub fn by_code(code: &str) -> Option<CountryMarker> {
    let code = code.trim();
    MARKERS
        .iter()
        .find(|(_, c, _, _)| c.eq_ignore_ascii_case(code))
        .map(to_marker)
}

/// Annotate markers with station counts from the directory's country
/// listing.  Markers the listing does not mention keep `None`.
pub fn with_station_counts(
    mut markers: Vec<CountryMarker>,
    countries: &[Country],
) -> Vec<CountryMarker> {
    for marker in &mut markers {
        // The listing can split one code across several names; sum them.
        let mut matching = countries
            .iter()
            .filter(|c| c.iso_3166_1.eq_ignore_ascii_case(&marker.code))
            .peekable();
        if matching.peek().is_some() {
            marker.station_count = Some(matching.map(|c| c.stationcount).sum());
        }
    }
    markers
}
