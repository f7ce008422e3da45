//! Latitude/longitude points and radius bounding boxes.

use lazy_static::lazy_static;
use regex::Regex;

use super::{DbError, Result, Value};

/// Kilometres spanned by one degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.045;

lazy_static! {
    static ref DMS_NUMBER: Regex = Regex::new(r"\d+(?:\.\d+)?").unwrap();
    static ref WKT_POINT: Regex =
        Regex::new(r"^\s*POINT\s*\(\s*(-?[\d.eE+-]+)\s+(-?[\d.eE+-]+)\s*\)\s*$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn limit(self) -> f64 {
        match self {
            Self::Latitude => 90.0,
            Self::Longitude => 180.0,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        Ok(Self {
            lat: check_range(lat, Axis::Latitude)?,
            lon: check_range(lon, Axis::Longitude)?,
        })
    }

    /// Parse a point from any accepted input shape.
    ///
    /// Accepts a two-element list, a `"lat,lon"` string, or a map with
    /// `lat`/`lon` (or `lng`) keys. Each coordinate may be a decimal number,
    /// a degree-minute-second string such as `40°26'46"N`, or a
    /// `[degrees, minutes, seconds]` triple.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::List(items) if items.len() == 2 => Self::new(
                parse_coordinate(&items[0], Axis::Latitude)?,
                parse_coordinate(&items[1], Axis::Longitude)?,
            ),
            Value::Text(text) => {
                if let Some(point) = Self::from_wkt(text) {
                    return Ok(point);
                }
                let parts: Vec<&str> = text.split(',').collect();
                if parts.len() != 2 {
                    return Err(DbError::TypeMismatch(format!(
                        "Point '{}' must be written as 'lat,lon'",
                        text
                    )));
                }
                Self::new(
                    parse_dms(parts[0], Axis::Latitude)?,
                    parse_dms(parts[1], Axis::Longitude)?,
                )
            }
            Value::Map(map) => {
                let lat = map.get("lat").or_else(|| map.get("latitude"));
                let lon = map
                    .get("lon")
                    .or_else(|| map.get("lng"))
                    .or_else(|| map.get("longitude"));
                match (lat, lon) {
                    (Some(lat), Some(lon)) => Self::new(
                        parse_coordinate(lat, Axis::Latitude)?,
                        parse_coordinate(lon, Axis::Longitude)?,
                    ),
                    _ => Err(DbError::TypeMismatch(
                        "Point map needs 'lat' and 'lon' keys".into(),
                    )),
                }
            }
            other => Err(DbError::TypeMismatch(format!(
                "Cannot interpret {} as a point",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(self) -> Value {
        Value::List(vec![Value::Float(self.lat), Value::Float(self.lon)])
    }

    /// Text form stored in spatial index columns.
    pub fn to_wkt(self) -> String {
        format!("POINT({} {})", self.lat, self.lon)
    }

    pub fn from_wkt(text: &str) -> Option<Self> {
        let caps = WKT_POINT.captures(text)?;
        let lat = caps[1].parse().ok()?;
        let lon = caps[2].parse().ok()?;
        Some(Self { lat, lon })
    }

    /// Box around this point that contains every point within `radius_km`.
    ///
    /// Latitude degrees have a fixed length; longitude degrees shrink with
    /// `cos(lat)`, clamped so the box never exceeds the full longitude range.
    /// Longitude bounds are left unwrapped and may fall outside ±180° near
    /// the antimeridian; [`BoundingBox::contains`] accounts for that.
    pub fn bounding_box(self, radius_km: f64) -> BoundingBox {
        let radius_km = radius_km.abs();
        let lat_delta = radius_km / KM_PER_DEGREE;
        let cos_lat = self.lat.to_radians().cos().abs();
        let lon_delta = if cos_lat < 1e-9 {
            180.0
        } else {
            (radius_km / (KM_PER_DEGREE * cos_lat)).min(180.0)
        };

        BoundingBox {
            min_lat: self.lat - lat_delta,
            min_lon: self.lon - lon_delta,
            max_lat: self.lat + lat_delta,
            max_lon: self.lon + lon_delta,
        }
    }
}

/// Inclusive latitude/longitude rectangle.
///
/// `min_lon` may be below -180° and `max_lon` above 180° when the box
/// crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && [point.lon, point.lon - 360.0, point.lon + 360.0]
                .iter()
                .any(|lon| *lon >= self.min_lon && *lon <= self.max_lon)
    }
}

fn check_range(degrees: f64, axis: Axis) -> Result<f64> {
    if !degrees.is_finite() || degrees.abs() > axis.limit() {
        return Err(DbError::TypeMismatch(format!(
            "{} {} is outside ±{}",
            axis.name(),
            degrees,
            axis.limit()
        )));
    }
    Ok(degrees)
}

fn parse_coordinate(value: &Value, axis: Axis) -> Result<f64> {
    match value {
        Value::Integer(_) | Value::Float(_) => value
            .as_f64()
            .ok_or_else(|| DbError::TypeMismatch(format!("Invalid {}", axis.name()))),
        Value::Text(text) => parse_dms(text, axis),
        Value::List(parts) if parts.len() == 3 => {
            let mut numbers = [0.0; 3];
            for (slot, part) in numbers.iter_mut().zip(parts) {
                *slot = part.as_f64().ok_or_else(|| {
                    DbError::TypeMismatch(format!("Invalid {} component {}", axis.name(), part))
                })?;
            }
            let sign = if numbers[0] < 0.0 { -1.0 } else { 1.0 };
            Ok(sign * (numbers[0].abs() + numbers[1] / 60.0 + numbers[2] / 3600.0))
        }
        other => Err(DbError::TypeMismatch(format!(
            "Cannot interpret {} as a {}",
            other.type_name(),
            axis.name()
        ))),
    }
}

fn parse_dms(text: &str, axis: Axis) -> Result<f64> {
    let text = text.trim();
    if let Ok(decimal) = text.parse::<f64>() {
        return Ok(decimal);
    }

    let hemisphere = text
        .chars()
        .rev()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase());
    let negative = text.starts_with('-') || matches!(hemisphere, Some('S') | Some('W'));

    let parts: Vec<f64> = DMS_NUMBER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(DbError::TypeMismatch(format!(
            "Cannot parse {} '{}'",
            axis.name(),
            text
        )));
    }

    let mut degrees = parts[0];
    if let Some(minutes) = parts.get(1) {
        degrees += minutes / 60.0;
    }
    if let Some(seconds) = parts.get(2) {
        degrees += seconds / 3600.0;
    }
    Ok(if negative { -degrees } else { degrees })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_pair() {
        let point = GeoPoint::parse(&Value::from(vec![51.5, -0.12])).unwrap();
        assert_eq!(point, GeoPoint { lat: 51.5, lon: -0.12 });
    }

    #[test]
    fn test_parse_dms_string() {
        let point = GeoPoint::parse(&Value::from("40°26'46\"N, 79°58'56\"W")).unwrap();
        assert!((point.lat - 40.446_111).abs() < 1e-5);
        assert!((point.lon + 79.982_222).abs() < 1e-5);
    }

    #[test]
    fn test_parse_triples() {
        let lat = Value::from(vec![10i64, 30, 0]);
        let lon = Value::from(vec![-20i64, 15, 0]);
        let point = GeoPoint::parse(&Value::List(vec![lat, lon])).unwrap();
        assert_eq!(point.lat, 10.5);
        assert_eq!(point.lon, -20.25);
    }

    #[test]
    fn test_out_of_range() {
        assert!(GeoPoint::parse(&Value::from(vec![91.0, 0.0])).is_err());
        assert!(GeoPoint::parse(&Value::from(vec![0.0, -180.5])).is_err());
        assert!(GeoPoint::parse(&Value::Integer(5)).is_err());
    }

    #[test]
    fn test_wkt_round_trip() {
        let point = GeoPoint::new(12.25, -3.5).unwrap();
        assert_eq!(point.to_wkt(), "POINT(12.25 -3.5)");
        assert_eq!(GeoPoint::from_wkt(&point.to_wkt()), Some(point));
    }

    #[test]
    fn test_bounding_box_at_equator() {
        let origin = GeoPoint::new(0.0, 0.0).unwrap();
        let bbox = origin.bounding_box(KM_PER_DEGREE);
        assert_eq!(bbox.max_lat, 1.0);
        assert_eq!(bbox.min_lon, -1.0);
        assert!(bbox.contains(GeoPoint { lat: 1.0, lon: 0.0 }));
        assert!(!bbox.contains(GeoPoint { lat: 0.0, lon: 1.5 }));
    }

    #[test]
    fn test_bounding_box_crosses_antimeridian() {
        let bbox = GeoPoint::new(0.0, 179.5).unwrap().bounding_box(KM_PER_DEGREE);
        assert!(bbox.max_lon > 180.0);
        assert!(bbox.contains(GeoPoint::new(0.0, -179.8).unwrap()));
        assert!(bbox.contains(GeoPoint::new(0.0, 179.0).unwrap()));
        assert!(!bbox.contains(GeoPoint::new(0.0, -178.0).unwrap()));

        let bbox = GeoPoint::new(0.0, -179.5).unwrap().bounding_box(KM_PER_DEGREE);
        assert!(bbox.contains(GeoPoint::new(0.0, 179.8).unwrap()));
    }

    #[test]
    fn test_bounding_box_widens_with_latitude() {
        let north = GeoPoint::new(60.0, 0.0).unwrap();
        let bbox = north.bounding_box(KM_PER_DEGREE);
        assert!((bbox.max_lon - 2.0).abs() < 1e-9);
        assert!((bbox.max_lat - 61.0).abs() < 1e-9);
    }
}
