//! Coordinate reference systems
//!
//! The Census cartographic boundary files ship in NAD83 geographic
//! coordinates. Areas and simplification tolerances only make sense in a
//! projected system, so a small set of projections is supported here:
//!
//! - EPSG:4269 NAD83 geographic
//! - EPSG:4326 WGS84 geographic (same datum as NAD83 at this precision)
//! - EPSG:5070 NAD83 / Conus Albers equal-area (GRS80 ellipsoid)
//! - EPSG:3857 Web Mercator (spherical)
//!
//! Albers formulas follow Snyder, *Map Projections: A Working Manual*, §14.

use geo::{Coord, MapCoords, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use zip3_common::{Result, Zip3Error};

const GRS80_A: f64 = 6_378_137.0;
const GRS80_E2: f64 = 0.006_694_380_022_90;
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

const NAD83_GEOGCS: &str = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
const WGS84_GEOGCS: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// A supported coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    #[serde(rename = "EPSG:4269", alias = "epsg:4269")]
    Nad83,
    #[serde(rename = "EPSG:4326", alias = "epsg:4326")]
    Wgs84,
    #[serde(rename = "EPSG:5070", alias = "epsg:5070")]
    ConusAlbers,
    #[serde(rename = "EPSG:3857", alias = "epsg:3857")]
    WebMercator,
}

impl Crs {
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Nad83 => 4269,
            Crs::Wgs84 => 4326,
            Crs::ConusAlbers => 5070,
            Crs::WebMercator => 3857,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Crs::Nad83 => "NAD83",
            Crs::Wgs84 => "WGS 84",
            Crs::ConusAlbers => "NAD83 / Conus Albers",
            Crs::WebMercator => "WGS 84 / Pseudo-Mercator",
        }
    }

    pub fn is_geographic(self) -> bool {
        matches!(self, Crs::Nad83 | Crs::Wgs84)
    }

    /// ESRI-flavoured WKT, as written to `.prj` files
    pub fn wkt(self) -> String {
        match self {
            Crs::Nad83 => NAD83_GEOGCS.to_string(),
            Crs::Wgs84 => WGS84_GEOGCS.to_string(),
            Crs::ConusAlbers => format!(
                r#"PROJCS["NAD_1983_Contiguous_USA_Albers",{NAD83_GEOGCS},PROJECTION["Albers"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-96.0],PARAMETER["Standard_Parallel_1",29.5],PARAMETER["Standard_Parallel_2",45.5],PARAMETER["Latitude_Of_Origin",23.0],UNIT["Meter",1.0]]"#
            ),
            Crs::WebMercator => format!(
                r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",{WGS84_GEOGCS},PROJECTION["Mercator_Auxiliary_Sphere"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",0.0],PARAMETER["Standard_Parallel_1",0.0],PARAMETER["Auxiliary_Sphere_Type",0.0],UNIT["Meter",1.0]]"#
            ),
        }
    }

    /// Recognize a CRS from `.prj` WKT. Returns `None` for anything unsupported.
    pub fn from_wkt(wkt: &str) -> Option<Crs> {
        let wkt = wkt.to_ascii_lowercase();

        if wkt.contains("projcs") {
            if wkt.contains("albers")
                && (wkt.contains("5070")
                    || wkt.contains("contiguous_usa")
                    || wkt.contains("conus")
                    || (wkt.contains("29.5") && wkt.contains("45.5")))
            {
                return Some(Crs::ConusAlbers);
            }
            if wkt.contains("mercator")
                && (wkt.contains("3857")
                    || wkt.contains("auxiliary_sphere")
                    || wkt.contains("pseudo"))
            {
                return Some(Crs::WebMercator);
            }
            return None;
        }

        if wkt.contains("north_american_1983") || wkt.contains("nad83") || wkt.contains("4269") {
            Some(Crs::Nad83)
        } else if wkt.contains("wgs_1984") || wkt.contains("wgs 84") || wkt.contains("4326") {
            Some(Crs::Wgs84)
        } else {
            None
        }
    }

    /// Convert a coordinate in this CRS to geographic longitude/latitude degrees
    fn unproject(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Nad83 | Crs::Wgs84 => c,
            Crs::ConusAlbers => CONUS_ALBERS.inverse(c),
            Crs::WebMercator => Coord {
                x: (c.x / GRS80_A).to_degrees(),
                y: (2.0 * (c.y / GRS80_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
            },
        }
    }

    /// Convert geographic longitude/latitude degrees into this CRS
    fn project(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Nad83 | Crs::Wgs84 => c,
            Crs::ConusAlbers => CONUS_ALBERS.forward(c),
            Crs::WebMercator => {
                let lat = c.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
                Coord {
                    x: GRS80_A * c.x.to_radians(),
                    y: GRS80_A * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
                }
            },
        }
    }

    pub fn transform_coord(self, to: Crs, c: Coord<f64>) -> Coord<f64> {
        if self == to || (self.is_geographic() && to.is_geographic()) {
            return c;
        }
        to.project(self.unproject(c))
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl std::str::FromStr for Crs {
    type Err = Zip3Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        match code.trim_start_matches("EPSG:") {
            "4269" => Ok(Crs::Nad83),
            "4326" => Ok(Crs::Wgs84),
            "5070" => Ok(Crs::ConusAlbers),
            "3857" => Ok(Crs::WebMercator),
            _ => Err(Zip3Error::UnsupportedCrs(s.to_string())),
        }
    }
}

/// Reproject a multipolygon between two supported systems
pub fn reproject(mp: &MultiPolygon<f64>, from: Crs, to: Crs) -> MultiPolygon<f64> {
    if from == to || (from.is_geographic() && to.is_geographic()) {
        return mp.clone();
    }
    mp.map_coords(|c| from.transform_coord(to, c))
}

/// Albers equal-area conic on the GRS80 ellipsoid
struct Albers {
    lon0: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

/// EPSG:5070 parameters: parallels 29.5°/45.5°, origin 23°N 96°W
static CONUS_ALBERS: LazyLock<Albers> =
    LazyLock::new(|| Albers::from_parameters(23.0, -96.0, 29.5, 45.5));

impl Albers {
    fn from_parameters(lat0: f64, lon0: f64, lat1: f64, lat2: f64) -> Self {
        let (p0, p1, p2) = (lat0.to_radians(), lat1.to_radians(), lat2.to_radians());
        let (m1, m2) = (m(p1), m(p2));
        let (q0, q1, q2) = (q(p0), q(p1), q(p2));
        let n = (m1 * m1 - m2 * m2) / (q2 - q1);
        let c = m1 * m1 + n * q1;
        let rho0 = GRS80_A * (c - n * q0).sqrt() / n;
        Albers { lon0, n, c, rho0 }
    }

    fn forward(&self, lon_lat: Coord<f64>) -> Coord<f64> {
        let phi = lon_lat.y.to_radians();
        let rho = GRS80_A * (self.c - self.n * q(phi)).max(0.0).sqrt() / self.n;
        let theta = self.n * (lon_lat.x - self.lon0).to_radians();
        Coord {
            x: rho * theta.sin(),
            y: self.rho0 - rho * theta.cos(),
        }
    }

    fn inverse(&self, xy: Coord<f64>) -> Coord<f64> {
        let dy = self.rho0 - xy.y;
        let rho = (xy.x * xy.x + dy * dy).sqrt();
        let theta = xy.x.atan2(dy);
        let q = (self.c - rho * rho * self.n * self.n / (GRS80_A * GRS80_A)) / self.n;

        let e = GRS80_E2.sqrt();
        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..15 {
            let sin_phi = phi.sin();
            let one_minus = 1.0 - GRS80_E2 * sin_phi * sin_phi;
            let delta = one_minus * one_minus / (2.0 * phi.cos())
                * (q / (1.0 - GRS80_E2) - sin_phi / one_minus
                    + (1.0 / (2.0 * e)) * ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln());
            phi += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }

        Coord {
            x: self.lon0 + (theta / self.n).to_degrees(),
            y: phi.to_degrees(),
        }
    }
}

fn m(phi: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - GRS80_E2 * s * s).sqrt()
}

fn q(phi: f64) -> f64 {
    let e = GRS80_E2.sqrt();
    let s = phi.sin();
    (1.0 - GRS80_E2)
        * (s / (1.0 - GRS80_E2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_conus_cone_constant() {
        assert!(close(CONUS_ALBERS.n, 0.602_902_769, 1e-8), "n = {}", CONUS_ALBERS.n);
    }

    #[test]
    fn test_albers_origin_maps_to_zero() {
        let xy = Crs::Nad83.transform_coord(Crs::ConusAlbers, Coord { x: -96.0, y: 23.0 });
        assert!(close(xy.x, 0.0, 1e-6));
        assert!(close(xy.y, 0.0, 1e-3));
    }

    #[test]
    fn test_albers_round_trip_near_boston() {
        let boston = Coord { x: -71.1, y: 42.35 };
        let xy = Crs::Nad83.transform_coord(Crs::ConusAlbers, boston);
        // Boston sits roughly 2,000 km east and 2,300 km north of the origin
        assert!(xy.x > 1_900_000.0 && xy.x < 2_100_000.0, "x = {}", xy.x);
        assert!(xy.y > 2_200_000.0 && xy.y < 2_500_000.0, "y = {}", xy.y);

        let back = Crs::ConusAlbers.transform_coord(Crs::Nad83, xy);
        assert!(close(back.x, boston.x, 1e-9));
        assert!(close(back.y, boston.y, 1e-9));
    }

    #[test]
    fn test_web_mercator_round_trip() {
        let c = Coord { x: -122.4, y: 37.8 };
        let xy = Crs::Wgs84.transform_coord(Crs::WebMercator, c);
        let back = Crs::WebMercator.transform_coord(Crs::Wgs84, xy);
        assert!(close(back.x, c.x, 1e-9));
        assert!(close(back.y, c.y, 1e-9));
    }

    #[test]
    fn test_from_wkt_recognizes_written_wkt() {
        for crs in [Crs::Nad83, Crs::Wgs84, Crs::ConusAlbers, Crs::WebMercator] {
            assert_eq!(Crs::from_wkt(&crs.wkt()), Some(crs));
        }
        assert_eq!(Crs::from_wkt(r#"PROJCS["NAD83 / UTM zone 19N"]"#), None);
    }

    #[test]
    fn test_parse_epsg_codes() {
        assert_eq!("EPSG:5070".parse::<Crs>().unwrap(), Crs::ConusAlbers);
        assert_eq!("4269".parse::<Crs>().unwrap(), Crs::Nad83);
        assert!("EPSG:32619".parse::<Crs>().is_err());
        assert_eq!(Crs::WebMercator.to_string(), "EPSG:3857");
    }
}
