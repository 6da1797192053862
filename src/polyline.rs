//! Polyline representation for route geometries.
//!
//! Providers ship geometry in the compact encoded polyline format; it is
//! decoded once at the boundary and kept as coordinate pairs internally.

use serde::{Deserialize, Serialize};

/// Precision used by Google and by OSRM's default `geometries=polyline`.
pub const DEFAULT_PRECISION: u32 = 5;

/// A polyline representing a route geometry as decoded coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

/// The encoded string ended in the middle of a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("truncated polyline at byte {0}")]
pub struct PolylineDecodeError(pub usize);

impl Polyline {
    /// Creates a new Polyline from decoded (latitude, longitude) points.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Decodes an encoded polyline string at the given decimal precision.
    pub fn decode(encoded: &str, precision: u32) -> Result<Self, PolylineDecodeError> {
        let factor = 10_f64.powi(precision as i32);
        let bytes = encoded.as_bytes();
        let mut index = 0;
        let mut lat: i64 = 0;
        let mut lng: i64 = 0;
        let mut points = Vec::new();

        while index < bytes.len() {
            lat += next_delta(bytes, &mut index)?;
            lng += next_delta(bytes, &mut index)?;
            points.push((lat as f64 / factor, lng as f64 / factor));
        }

        Ok(Self { points })
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineDecodeError> {
    let mut result: i64 = 0;
    let mut shift = 0;
    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(PolylineDecodeError(*index));
        };
        *index += 1;
        let chunk = i64::from(byte) - 63;
        if chunk < 0 || shift > 60 {
            return Err(PolylineDecodeError(*index - 1));
        }
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Ok(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[(f64, f64)], expected: &[(f64, f64)]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a.0 - e.0).abs() < 1e-9 && (a.1 - e.1).abs() < 1e-9, "{:?} != {:?}", a, e);
        }
    }

    #[test]
    fn test_decode_reference_example() {
        let polyline = Polyline::decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@", DEFAULT_PRECISION).unwrap();
        assert_close(
            polyline.points(),
            &[(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)],
        );
    }

    #[test]
    fn test_decode_empty() {
        let polyline = Polyline::decode("", DEFAULT_PRECISION).unwrap();
        assert!(polyline.is_empty());
    }

    #[test]
    fn test_decode_truncated() {
        // Latitude present, longitude missing.
        assert!(Polyline::decode("_p~iF", DEFAULT_PRECISION).is_err());
        // Continuation bit set on the final byte.
        assert!(Polyline::decode("_p~iF~ps|", DEFAULT_PRECISION).is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_bytes() {
        assert!(Polyline::decode(" ", DEFAULT_PRECISION).is_err());
    }

    #[test]
    fn test_into_points() {
        let points = vec![(38.5, -120.2), (40.7, -120.95)];
        let polyline = Polyline::new(points.clone());
        assert_eq!(polyline.into_points(), points);
    }
}
