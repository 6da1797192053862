//! Real Metro Vancouver locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. These are routable with the
//! British Columbia extract from Geofabrik.

use field_router::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub address: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const fn new(name: &'static str, address: &'static str, lat: f64, lon: f64) -> Self {
        Self { name, address, lat, lon }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// `lat,lon,label` line, as a user would paste it.
    pub fn as_line(&self) -> String {
        format!("{},{},{}", self.lat, self.lon, self.name)
    }
}

// ============================================================================
// Depots (good for start/end places)
// ============================================================================

pub const DEPOTS: &[Location] = &[
    Location::new("Burnaby Yard", "3700 Willingdon Ave, Burnaby", 49.2488, -123.0016),
    Location::new("Richmond Office", "6911 No. 3 Rd, Richmond", 49.1666, -123.1364),
];

// ============================================================================
// Customer sites
// ============================================================================

pub const SITES: &[Location] = &[
    Location::new("Metrotown", "4700 Kingsway, Burnaby", 49.2266, -123.0027),
    Location::new("Brentwood", "4567 Lougheed Hwy, Burnaby", 49.2667, -123.0017),
    Location::new("Granville Island", "1669 Johnston St, Vancouver", 49.2712, -123.1340),
    Location::new("Kitsilano Beach", "1499 Arbutus St, Vancouver", 49.2737, -123.1540),
    Location::new("Lonsdale Quay", "123 Carrie Cates Ct, North Vancouver", 49.3100, -123.0830),
    Location::new("New Westminster Quay", "810 Quayside Dr, New Westminster", 49.2003, -122.9106),
    Location::new("Coquitlam Centre", "2929 Barnet Hwy, Coquitlam", 49.2781, -122.7960),
    Location::new("Surrey Central", "10153 King George Blvd, Surrey", 49.1887, -122.8490),
];

/// Addresses with no coordinates, resolved through the fake geocoder.
pub fn site_addresses() -> impl Iterator<Item = (&'static str, Coordinate)> {
    SITES.iter().map(|site| (site.address, site.coordinate()))
}
