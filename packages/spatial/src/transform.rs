//! Coordinate transforms between the supported reference systems.
//!
//! Every transform is routed through WGS84 longitude/latitude:
//!
//! * EPSG:3857 is the spherical Web Mercator projection.
//! * EPSG:27700 is a seven-parameter Helmert shift from WGS84 to OSGB36
//!   followed by the Ordnance Survey transverse Mercator projection on the
//!   Airy 1830 ellipsoid. The Helmert shift is accurate to a few metres,
//!   which is the usual trade-off for not shipping the OSTN15 grid.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crime_atlas_dataset_models::Crs;
use geo::Coord;

use crate::SpatialError;

/// Web Mercator sphere radius.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude at which Web Mercator becomes square.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Iteration cap for the geodetic latitude solvers.
const MAX_ITERATIONS: usize = 20;

struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    fn e2(&self) -> f64 {
        self.a.mul_add(self.a, -(self.b * self.b)) / (self.a * self.a)
    }
}

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.314_245,
};

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

/// Position-vector Helmert parameters: translations in metres, scale in
/// ppm, rotations in arc seconds.
struct Helmert {
    tx: f64,
    ty: f64,
    tz: f64,
    s: f64,
    rx: f64,
    ry: f64,
    rz: f64,
}

const WGS84_TO_OSGB36: Helmert = Helmert {
    tx: -446.448,
    ty: 125.157,
    tz: -542.060,
    s: 20.4894,
    rx: -0.1502,
    ry: -0.2470,
    rz: -0.8421,
};

impl Helmert {
    const fn inverse(&self) -> Self {
        Self {
            tx: -self.tx,
            ty: -self.ty,
            tz: -self.tz,
            s: -self.s,
            rx: -self.rx,
            ry: -self.ry,
            rz: -self.rz,
        }
    }

    fn apply(&self, [x, y, z]: [f64; 3]) -> [f64; 3] {
        let s1 = self.s.mul_add(1e-6, 1.0);
        let rx = (self.rx / 3600.0).to_radians();
        let ry = (self.ry / 3600.0).to_radians();
        let rz = (self.rz / 3600.0).to_radians();

        [
            self.tx + x * s1 - y * rz + z * ry,
            self.ty + x * rz + y * s1 - z * rx,
            self.tz - x * ry + y * rx + z * s1,
        ]
    }
}

/// British National Grid projection constants.
mod national_grid {
    pub const F0: f64 = 0.999_601_271_7;
    pub const LAT0_DEG: f64 = 49.0;
    pub const LON0_DEG: f64 = -2.0;
    pub const N0: f64 = -100_000.0;
    pub const E0: f64 = 400_000.0;
}

/// Transforms a coordinate from one reference system into another.
///
/// Geographic coordinates are `x = longitude`, `y = latitude` in degrees;
/// projected ones are easting/northing in metres.
///
/// # Errors
///
/// Returns [`SpatialError::UnknownCrs`] if either system is unrecognized,
/// or [`SpatialError::OutOfDomain`] if the coordinate cannot be represented
/// in the target system.
pub fn transform_coord(coord: Coord<f64>, from: &Crs, to: &Crs) -> Result<Coord<f64>, SpatialError> {
    for crs in [from, to] {
        if !crs.is_known() {
            return Err(SpatialError::UnknownCrs {
                crs: crs.to_string(),
            });
        }
    }

    if !coord.x.is_finite() || !coord.y.is_finite() {
        return Err(out_of_domain(from, coord));
    }

    if from == to {
        return Ok(coord);
    }

    let lon_lat = to_wgs84(coord, from)?;
    let out = from_wgs84(lon_lat, to)?;

    if out.x.is_finite() && out.y.is_finite() {
        Ok(out)
    } else {
        Err(out_of_domain(to, lon_lat))
    }
}

fn out_of_domain(crs: &Crs, coord: Coord<f64>) -> SpatialError {
    SpatialError::OutOfDomain {
        crs: crs.to_string(),
        x: coord.x,
        y: coord.y,
    }
}

fn to_wgs84(coord: Coord<f64>, from: &Crs) -> Result<Coord<f64>, SpatialError> {
    match from {
        Crs::Wgs84 => {
            if coord.y.abs() > 90.0 {
                return Err(out_of_domain(from, coord));
            }
            Ok(coord)
        }
        Crs::WebMercator => Ok(mercator_to_lon_lat(coord)),
        Crs::BritishNationalGrid => Ok(national_grid_to_wgs84(coord)),
        Crs::Unknown(_) => Err(SpatialError::UnknownCrs {
            crs: from.to_string(),
        }),
    }
}

fn from_wgs84(lon_lat: Coord<f64>, to: &Crs) -> Result<Coord<f64>, SpatialError> {
    match to {
        Crs::Wgs84 => Ok(lon_lat),
        Crs::WebMercator => {
            if lon_lat.y.abs() > MERCATOR_MAX_LAT {
                return Err(out_of_domain(&Crs::Wgs84, lon_lat));
            }
            Ok(lon_lat_to_mercator(lon_lat))
        }
        Crs::BritishNationalGrid => Ok(wgs84_to_national_grid(lon_lat)),
        Crs::Unknown(_) => Err(SpatialError::UnknownCrs {
            crs: to.to_string(),
        }),
    }
}

fn lon_lat_to_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.to_radians();
    Coord {
        x: MERCATOR_RADIUS * c.x.to_radians(),
        y: MERCATOR_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

fn mercator_to_lon_lat(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / MERCATOR_RADIUS).to_degrees(),
        y: 2.0f64
            .mul_add((c.y / MERCATOR_RADIUS).exp().atan(), -FRAC_PI_2)
            .to_degrees(),
    }
}

fn geodetic_to_cartesian(lat: f64, lon: f64, ellipsoid: &Ellipsoid) -> [f64; 3] {
    let e2 = ellipsoid.e2();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let nu = ellipsoid.a / (e2 * sin_lat).mul_add(-sin_lat, 1.0).sqrt();

    [
        nu * cos_lat * lon.cos(),
        nu * cos_lat * lon.sin(),
        (1.0 - e2) * nu * sin_lat,
    ]
}

fn cartesian_to_geodetic([x, y, z]: [f64; 3], ellipsoid: &Ellipsoid) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let p = x.hypot(y);
    let mut lat = z.atan2(p * (1.0 - e2));

    for _ in 0..MAX_ITERATIONS {
        let sin_lat = lat.sin();
        let nu = ellipsoid.a / (e2 * sin_lat).mul_add(-sin_lat, 1.0).sqrt();
        let next = (e2 * nu).mul_add(sin_lat, z).atan2(p);
        let converged = (next - lat).abs() < 1e-12;
        lat = next;
        if converged {
            break;
        }
    }

    (lat, y.atan2(x))
}

/// Meridional arc from the true origin latitude to `lat` (radians).
fn meridional_arc(lat: f64) -> f64 {
    let Ellipsoid { a, b } = AIRY_1830;
    let n = (a - b) / (a + b);
    let (n2, n3) = (n * n, n * n * n);
    let lat0 = national_grid::LAT0_DEG.to_radians();
    let (d, s) = (lat - lat0, lat + lat0);

    b * national_grid::F0
        * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * d
            - (3.0 * n + 3.0 * n2 + 21.0 / 8.0 * n3) * d.sin() * s.cos()
            + (15.0 / 8.0 * n2 + 15.0 / 8.0 * n3) * (2.0 * d).sin() * (2.0 * s).cos()
            - 35.0 / 24.0 * n3 * (3.0 * d).sin() * (3.0 * s).cos())
}

/// Radii of curvature (`nu`, `rho`) and `eta^2` at `lat` on Airy 1830.
fn curvature(lat: f64) -> (f64, f64, f64) {
    let e2 = AIRY_1830.e2();
    let af0 = AIRY_1830.a * national_grid::F0;
    let sin2 = lat.sin().powi(2);
    let denom = e2.mul_add(-sin2, 1.0);
    let nu = af0 / denom.sqrt();
    let rho = af0 * (1.0 - e2) / denom.powf(1.5);
    (nu, rho, nu / rho - 1.0)
}

/// Projects OSGB36 latitude/longitude (degrees) onto the National Grid.
pub(crate) fn osgb36_to_grid(lat_deg: f64, lon_deg: f64) -> Coord<f64> {
    let lat = lat_deg.to_radians();
    let dl = lon_deg.to_radians() - national_grid::LON0_DEG.to_radians();
    let (nu, rho, eta2) = curvature(lat);
    let (sin, cos) = lat.sin_cos();
    let tan2 = lat.tan().powi(2);
    let tan4 = tan2 * tan2;

    let i = meridional_arc(lat) + national_grid::N0;
    let ii = nu / 2.0 * sin * cos;
    let iii = nu / 24.0 * sin * cos.powi(3) * (5.0 - tan2 + 9.0 * eta2);
    let iiia = nu / 720.0 * sin * cos.powi(5) * (61.0 - 58.0 * tan2 + tan4);
    let iv = nu * cos;
    let v = nu / 6.0 * cos.powi(3) * (nu / rho - tan2);
    let vi = nu / 120.0
        * cos.powi(5)
        * (5.0 - 18.0 * tan2 + tan4 + 14.0 * eta2 - 58.0 * tan2 * eta2);

    Coord {
        x: national_grid::E0 + iv * dl + v * dl.powi(3) + vi * dl.powi(5),
        y: i + ii * dl.powi(2) + iii * dl.powi(4) + iiia * dl.powi(6),
    }
}

/// Inverse of [`osgb36_to_grid`]: returns OSGB36 `(lat, lon)` in degrees.
pub(crate) fn grid_to_osgb36(grid: Coord<f64>) -> (f64, f64) {
    let af0 = AIRY_1830.a * national_grid::F0;
    let lat0 = national_grid::LAT0_DEG.to_radians();
    let northing = grid.y - national_grid::N0;

    let mut lat = northing / af0 + lat0;
    for _ in 0..MAX_ITERATIONS {
        let residual = northing - meridional_arc(lat);
        if residual.abs() < 1e-5 {
            break;
        }
        lat += residual / af0;
    }

    let (nu, rho, eta2) = curvature(lat);
    let tan = lat.tan();
    let (tan2, tan4, tan6) = (tan.powi(2), tan.powi(4), tan.powi(6));
    let sec = 1.0 / lat.cos();
    let de = grid.x - national_grid::E0;

    let vii = tan / (2.0 * rho * nu);
    let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
    let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
    let x = sec / nu;
    let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
    let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
    let xiia = sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan6);

    let lat = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
    let lon = national_grid::LON0_DEG.to_radians() + x * de - xi * de.powi(3) + xii * de.powi(5)
        - xiia * de.powi(7);

    (lat.to_degrees(), lon.to_degrees())
}

fn wgs84_to_national_grid(lon_lat: Coord<f64>) -> Coord<f64> {
    let xyz = geodetic_to_cartesian(lon_lat.y.to_radians(), lon_lat.x.to_radians(), &WGS84);
    let (lat, lon) = cartesian_to_geodetic(WGS84_TO_OSGB36.apply(xyz), &AIRY_1830);
    osgb36_to_grid(lat.to_degrees(), lon.to_degrees())
}

fn national_grid_to_wgs84(grid: Coord<f64>) -> Coord<f64> {
    let (lat, lon) = grid_to_osgb36(grid);
    let xyz = geodetic_to_cartesian(lat.to_radians(), lon.to_radians(), &AIRY_1830);
    let (lat, lon) = cartesian_to_geodetic(WGS84_TO_OSGB36.inverse().apply(xyz), &WGS84);
    Coord {
        x: lon.to_degrees(),
        y: lat.to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dms(d: f64, m: f64, s: f64) -> f64 {
        d + m / 60.0 + s / 3600.0
    }

    #[test]
    fn ordnance_survey_worked_example_forward() {
        let grid = osgb36_to_grid(dms(52.0, 39.0, 27.2531), dms(1.0, 43.0, 4.5177));
        assert!((grid.x - 651_409.903).abs() < 0.01, "easting {}", grid.x);
        assert!((grid.y - 313_177.270).abs() < 0.01, "northing {}", grid.y);
    }

    #[test]
    fn ordnance_survey_worked_example_inverse() {
        let (lat, lon) = grid_to_osgb36(Coord {
            x: 651_409.903,
            y: 313_177.270,
        });
        assert!((lat - dms(52.0, 39.0, 27.2531)).abs() < 1e-7, "lat {lat}");
        assert!((lon - dms(1.0, 43.0, 4.5177)).abs() < 1e-7, "lon {lon}");
    }

    #[test]
    fn charing_cross_lands_in_central_london() {
        let grid = transform_coord(
            Coord {
                x: -0.1277,
                y: 51.5073,
            },
            &Crs::Wgs84,
            &Crs::BritishNationalGrid,
        )
        .unwrap();
        assert!((529_500.0..530_600.0).contains(&grid.x), "easting {}", grid.x);
        assert!((180_000.0..181_000.0).contains(&grid.y), "northing {}", grid.y);
    }

    #[test]
    fn national_grid_roundtrip() {
        let start = Coord { x: -0.35, y: 51.42 };
        let grid = transform_coord(start, &Crs::Wgs84, &Crs::BritishNationalGrid).unwrap();
        let back = transform_coord(grid, &Crs::BritishNationalGrid, &Crs::Wgs84).unwrap();
        assert!((back.x - start.x).abs() < 1e-6, "lon {}", back.x);
        assert!((back.y - start.y).abs() < 1e-6, "lat {}", back.y);
    }

    #[test]
    fn web_mercator_known_values() {
        let origin = transform_coord(Coord { x: 0.0, y: 0.0 }, &Crs::Wgs84, &Crs::WebMercator)
            .unwrap();
        assert!(origin.x.abs() < 1e-9 && origin.y.abs() < 1e-9);

        let edge = transform_coord(Coord { x: 180.0, y: 0.0 }, &Crs::Wgs84, &Crs::WebMercator)
            .unwrap();
        assert!((edge.x - 20_037_508.342_789_244).abs() < 1e-6);

        let back = transform_coord(
            Coord {
                x: -14_226.6,
                y: 6_711_542.5,
            },
            &Crs::WebMercator,
            &Crs::Wgs84,
        )
        .unwrap();
        let again = transform_coord(back, &Crs::Wgs84, &Crs::WebMercator).unwrap();
        assert!((again.x + 14_226.6).abs() < 1e-6);
        assert!((again.y - 6_711_542.5).abs() < 1e-6);
    }

    #[test]
    fn mercator_to_national_grid_goes_through_wgs84() {
        let lon_lat = Coord { x: -0.1277, y: 51.5073 };
        let merc = transform_coord(lon_lat, &Crs::Wgs84, &Crs::WebMercator).unwrap();
        let direct = transform_coord(lon_lat, &Crs::Wgs84, &Crs::BritishNationalGrid).unwrap();
        let via = transform_coord(merc, &Crs::WebMercator, &Crs::BritishNationalGrid).unwrap();
        assert!((direct.x - via.x).abs() < 1e-3);
        assert!((direct.y - via.y).abs() < 1e-3);
    }

    #[test]
    fn polar_latitude_is_outside_web_mercator() {
        let err = transform_coord(Coord { x: 0.0, y: 89.0 }, &Crs::Wgs84, &Crs::WebMercator)
            .unwrap_err();
        assert!(matches!(err, SpatialError::OutOfDomain { .. }));
    }

    #[test]
    fn unknown_crs_is_rejected() {
        let err = transform_coord(
            Coord { x: 1.0, y: 1.0 },
            &Crs::Unknown("EPSG:2154".to_string()),
            &Crs::Wgs84,
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::UnknownCrs { .. }));
    }

    #[test]
    fn identity_when_systems_match() {
        let c = Coord {
            x: 530_000.0,
            y: 180_000.0,
        };
        let out = transform_coord(c, &Crs::BritishNationalGrid, &Crs::BritishNationalGrid).unwrap();
        assert_eq!(out, c);
    }
}
