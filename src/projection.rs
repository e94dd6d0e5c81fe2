//! Forward and inverse map projections for the five supported CRSs.
//!
//! Geographic input is longitude/latitude in degrees; projected output is in
//! metres. Formulas follow the ellipsoidal definitions where the CRS has one
//! (World Mercator, Lambert Conformal Conic) and the spherical ones otherwise.

use crate::types::{Crs, Feature, FeatureCollection};
use anyhow::{anyhow, Result};
use geo::{Coord, MapCoords};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use tracing::info;

// WGS84 / GRS80 semi-major axis, metres
const SEMI_MAJOR: f64 = 6_378_137.0;
const WGS84_INV_FLATTENING: f64 = 298.257_223_563;
const GRS80_INV_FLATTENING: f64 = 298.257_222_101;

// Latitudes beyond this are pulled in so conformal projections stay finite.
const MAX_CONFORMAL_LAT: f64 = 89.5;

const ITERATIONS: usize = 30;
const TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    Wgs84,
    Mercator,
    Robinson,
    Mollweide,
    LambertConformalConic,
}

impl Projection {
    pub const ALL: [Projection; 5] = [
        Projection::Wgs84,
        Projection::Mercator,
        Projection::Robinson,
        Projection::Mollweide,
        Projection::LambertConformalConic,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Projection::Wgs84 => "WGS84 (Geographic)",
            Projection::Mercator => "Mercator",
            Projection::Robinson => "Robinson",
            Projection::Mollweide => "Mollweide",
            Projection::LambertConformalConic => "Lambert Conformal Conic",
        }
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            Projection::Wgs84 => "EPSG:4326",
            Projection::Mercator => "EPSG:3395",
            Projection::Robinson => "ESRI:54030",
            Projection::Mollweide => "ESRI:54009",
            Projection::LambertConformalConic => "EPSG:3347",
        }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.label() == label)
            .ok_or_else(|| anyhow!("Unknown projection: {}", label))
    }

    pub fn from_identifier(identifier: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.identifier().eq_ignore_ascii_case(identifier))
            .ok_or_else(|| anyhow!("Unsupported projection identifier: {}", identifier))
    }

    /// Accepts either a menu label or a CRS identifier.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_label(s).or_else(|_| Self::from_identifier(s))
    }

    /// Degrees to projected units.
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Wgs84 => c,
            Projection::Mercator => mercator_forward(c),
            Projection::Robinson => robinson_forward(c),
            Projection::Mollweide => mollweide_forward(c),
            Projection::LambertConformalConic => Lcc::statcan().forward(c),
        }
    }

    /// Projected units back to degrees.
    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Wgs84 => c,
            Projection::Mercator => mercator_inverse(c),
            Projection::Robinson => robinson_inverse(c),
            Projection::Mollweide => mollweide_inverse(c),
            Projection::LambertConformalConic => Lcc::statcan().inverse(c),
        }
    }
}

impl From<Projection> for Crs {
    fn from(p: Projection) -> Self {
        match p {
            Projection::Wgs84 => Crs::Geographic,
            other => Crs::Projected(other),
        }
    }
}

/// Transforms every geometry into `target`, going through geographic
/// coordinates when the collection is already projected.
pub fn reproject(fc: &FeatureCollection, target: Projection) -> FeatureCollection {
    let source = fc.crs;
    let target_crs = Crs::from(target);
    info!(
        "Reprojecting {} features {} -> {}",
        fc.len(),
        source.identifier(),
        target_crs.identifier()
    );

    let features = fc
        .features
        .iter()
        .map(|f| {
            let geometry = f.geometry.map_coords(|c| {
                let geographic = match source {
                    Crs::Geographic => c,
                    Crs::Projected(p) => p.inverse(c),
                };
                target.forward(geographic)
            });
            Feature {
                geometry,
                attributes: f.attributes.clone(),
                pop_est: f.pop_est,
            }
        })
        .collect();

    FeatureCollection {
        crs: target_crs,
        columns: fc.columns.clone(),
        features,
    }
}

pub fn reproject_to(fc: &FeatureCollection, identifier: &str) -> Result<FeatureCollection> {
    let target = Projection::from_identifier(identifier)?;
    Ok(reproject(fc, target))
}

fn eccentricity(inv_flattening: f64) -> f64 {
    let f = 1.0 / inv_flattening;
    (f * (2.0 - f)).sqrt()
}

fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-MAX_CONFORMAL_LAT, MAX_CONFORMAL_LAT)
}

fn wrap_lon(lambda: f64) -> f64 {
    if (-PI..=PI).contains(&lambda) {
        lambda
    } else {
        (lambda + PI).rem_euclid(2.0 * PI) - PI
    }
}

/// Isometric-latitude helper `t` (Snyder 15-9).
fn conformal_t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

/// Solves for latitude given `t` (Snyder 7-9).
fn phi_from_t(t: f64, e: f64) -> f64 {
    let mut phi = FRAC_PI_2 - 2.0 * t.atan();
    for _ in 0..ITERATIONS {
        let es = e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
        if (next - phi).abs() < TOLERANCE {
            return next;
        }
        phi = next;
    }
    phi
}

fn mercator_forward(c: Coord<f64>) -> Coord<f64> {
    let e = eccentricity(WGS84_INV_FLATTENING);
    let phi = clamp_lat(c.y).to_radians();
    Coord {
        x: SEMI_MAJOR * c.x.to_radians(),
        y: -SEMI_MAJOR * conformal_t(phi, e).ln(),
    }
}

fn mercator_inverse(c: Coord<f64>) -> Coord<f64> {
    let e = eccentricity(WGS84_INV_FLATTENING);
    let t = (-c.y / SEMI_MAJOR).exp();
    Coord {
        x: (c.x / SEMI_MAJOR).to_degrees(),
        y: phi_from_t(t, e).to_degrees(),
    }
}

// Robinson table at 5 degree latitude steps: parallel length and distance
// from the equator.
const ROBINSON_X: [f64; 19] = [
    1.0000, 0.9986, 0.9954, 0.9900, 0.9822, 0.9730, 0.9600, 0.9427, 0.9216, 0.8962, 0.8679,
    0.8350, 0.7986, 0.7597, 0.7186, 0.6732, 0.6213, 0.5722, 0.5322,
];
const ROBINSON_Y: [f64; 19] = [
    0.0000, 0.0620, 0.1240, 0.1860, 0.2480, 0.3100, 0.3720, 0.4340, 0.4958, 0.5571, 0.6176,
    0.6769, 0.7346, 0.7903, 0.8435, 0.8936, 0.9394, 0.9761, 1.0000,
];
const ROBINSON_FXC: f64 = 0.8487;
const ROBINSON_FYC: f64 = 1.3523;
const ROBINSON_STEP: f64 = 5.0;

fn robinson_lookup(abs_lat: f64) -> (f64, f64) {
    let pos = (abs_lat.min(90.0) / ROBINSON_STEP).max(0.0);
    let i = (pos.floor() as usize).min(ROBINSON_X.len() - 2);
    let frac = pos - i as f64;
    let x = ROBINSON_X[i] + (ROBINSON_X[i + 1] - ROBINSON_X[i]) * frac;
    let y = ROBINSON_Y[i] + (ROBINSON_Y[i + 1] - ROBINSON_Y[i]) * frac;
    (x, y)
}

fn robinson_forward(c: Coord<f64>) -> Coord<f64> {
    let (px, py) = robinson_lookup(c.y.abs());
    Coord {
        x: ROBINSON_FXC * SEMI_MAJOR * px * c.x.to_radians(),
        y: ROBINSON_FYC * SEMI_MAJOR * py * c.y.signum(),
    }
}

fn robinson_inverse(c: Coord<f64>) -> Coord<f64> {
    let py = (c.y.abs() / (ROBINSON_FYC * SEMI_MAJOR)).min(1.0);
    // The Y column is strictly increasing, so the segment is unique.
    let i = ROBINSON_Y
        .windows(2)
        .position(|w| py <= w[1])
        .unwrap_or(ROBINSON_Y.len() - 2);
    let frac = (py - ROBINSON_Y[i]) / (ROBINSON_Y[i + 1] - ROBINSON_Y[i]);
    let abs_lat = (i as f64 + frac) * ROBINSON_STEP;
    let (px, _) = robinson_lookup(abs_lat);
    Coord {
        x: (c.x / (ROBINSON_FXC * SEMI_MAJOR * px)).to_degrees(),
        y: abs_lat * c.y.signum(),
    }
}

fn mollweide_theta(phi: f64) -> f64 {
    if (phi.abs() - FRAC_PI_2).abs() < TOLERANCE {
        return phi;
    }
    // Newton on 2t + sin 2t = pi sin phi, iterating on 2t.
    let target = PI * phi.sin();
    let mut two_theta = phi;
    for _ in 0..ITERATIONS {
        let delta = (two_theta + two_theta.sin() - target) / (1.0 + two_theta.cos());
        two_theta -= delta;
        if delta.abs() < TOLERANCE {
            break;
        }
    }
    two_theta / 2.0
}

fn mollweide_forward(c: Coord<f64>) -> Coord<f64> {
    let theta = mollweide_theta(c.y.to_radians());
    Coord {
        x: 2.0 * 2f64.sqrt() / PI * SEMI_MAJOR * c.x.to_radians() * theta.cos(),
        y: 2f64.sqrt() * SEMI_MAJOR * theta.sin(),
    }
}

fn mollweide_inverse(c: Coord<f64>) -> Coord<f64> {
    let theta = (c.y / (2f64.sqrt() * SEMI_MAJOR)).clamp(-1.0, 1.0).asin();
    let phi = ((2.0 * theta + (2.0 * theta).sin()) / PI).clamp(-1.0, 1.0).asin();
    let lambda = if theta.cos().abs() < TOLERANCE {
        0.0
    } else {
        PI * c.x / (2.0 * 2f64.sqrt() * SEMI_MAJOR * theta.cos())
    };
    Coord {
        x: lambda.to_degrees(),
        y: phi.to_degrees(),
    }
}

/// Two-standard-parallel Lambert Conformal Conic on an ellipsoid.
struct Lcc {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl Lcc {
    /// Statistics Canada Lambert (NAD83 / GRS80).
    fn statcan() -> Self {
        Self::new(
            GRS80_INV_FLATTENING,
            49.0,
            77.0,
            63.390675,
            -91.866_666_666_666_67,
            6_200_000.0,
            3_000_000.0,
        )
    }

    fn new(
        inv_flattening: f64,
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let e = eccentricity(inv_flattening);
        let m = |phi: f64| phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt();
        let (p1, p2, p0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());
        let (t1, t2, t0) = (conformal_t(p1, e), conformal_t(p2, e), conformal_t(p0, e));
        let n = (m(p1).ln() - m(p2).ln()) / (t1.ln() - t2.ln());
        let af = SEMI_MAJOR * m(p1) / (n * t1.powf(n));
        Self {
            e,
            n,
            af,
            rho0: af * t0.powf(n),
            lon0: lon0.to_radians(),
            false_easting,
            false_northing,
        }
    }

    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let phi = clamp_lat(c.y).to_radians();
        let rho = self.af * conformal_t(phi, self.e).powf(self.n);
        let theta = self.n * wrap_lon(c.x.to_radians() - self.lon0);
        Coord {
            x: self.false_easting + rho * theta.sin(),
            y: self.false_northing + self.rho0 - rho * theta.cos(),
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let dx = c.x - self.false_easting;
        let dy = self.rho0 - (c.y - self.false_northing);
        let rho = self.n.signum() * dx.hypot(dy);
        let theta = if self.n > 0.0 {
            dx.atan2(dy)
        } else {
            (-dx).atan2(-dy)
        };
        let t = (rho / self.af).powf(1.0 / self.n);
        Coord {
            x: wrap_lon(theta / self.n + self.lon0).to_degrees(),
            y: phi_from_t(t, self.e).to_degrees(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{polygon, Area, MultiPolygon};
    use std::collections::BTreeMap;

    fn sample_points() -> Vec<Coord<f64>> {
        let mut points = Vec::new();
        for lon in [-179.0, -120.5, -45.0, 0.0, 12.25, 90.0, 178.0] {
            for lat in [-80.0, -52.5, -10.0, 0.0, 33.3, 61.0, 84.0] {
                points.push(Coord { x: lon, y: lat });
            }
        }
        points
    }

    fn square_collection() -> FeatureCollection {
        let geometry = MultiPolygon::new(vec![polygon![
            (x: 10.0, y: 40.0),
            (x: 20.0, y: 40.0),
            (x: 20.0, y: 50.0),
            (x: 10.0, y: 50.0),
            (x: 10.0, y: 40.0),
        ]]);
        FeatureCollection {
            crs: Crs::Geographic,
            columns: vec!["name".into()],
            features: vec![Feature {
                geometry,
                attributes: BTreeMap::from([("name".to_string(), "Square".to_string())]),
                pop_est: 1_000_000,
            }],
        }
    }

    #[test]
    fn labels_and_identifiers_resolve() {
        for p in Projection::ALL {
            assert_eq!(Projection::from_label(p.label()).unwrap(), p);
            assert_eq!(Projection::from_identifier(p.identifier()).unwrap(), p);
        }
        assert!(Projection::from_identifier("EPSG:9999").is_err());
        assert!(Projection::from_label("Azimuthal").is_err());
        assert_eq!(Projection::parse("Robinson").unwrap(), Projection::Robinson);
        assert_eq!(Projection::parse("esri:54009").unwrap(), Projection::Mollweide);
    }

    #[test]
    fn forward_then_inverse_round_trips() {
        for p in Projection::ALL {
            for c in sample_points() {
                let back = p.inverse(p.forward(c));
                assert_abs_diff_eq!(back.x, c.x, epsilon = 1e-6);
                assert_abs_diff_eq!(back.y, c.y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn reference_values() {
        let edge = Coord { x: 180.0, y: 0.0 };
        assert_abs_diff_eq!(
            Projection::Mercator.forward(edge).x,
            20_037_508.342_789_244,
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            Projection::Mollweide.forward(edge).x,
            2.0 * 2f64.sqrt() * SEMI_MAJOR,
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            Projection::Robinson.forward(edge).x,
            ROBINSON_FXC * SEMI_MAJOR * PI,
            epsilon = 1e-3
        );
        let origin = Projection::LambertConformalConic.forward(Coord {
            x: -91.866_666_666_666_67,
            y: 63.390675,
        });
        assert_abs_diff_eq!(origin.x, 6_200_000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(origin.y, 3_000_000.0, epsilon = 1e-3);
    }

    #[test]
    fn mercator_pole_stays_finite() {
        let pole = Projection::Mercator.forward(Coord { x: 0.0, y: -90.0 });
        assert!(pole.y.is_finite());
        assert!(pole.y < 0.0);
    }

    #[test]
    fn geographic_round_trip_is_identity() {
        let fc = square_collection();
        let there = reproject(&fc, Projection::Wgs84);
        assert_eq!(there.crs, Crs::Geographic);
        let back = reproject(&there, Projection::Wgs84);
        assert_eq!(back.features[0].geometry, fc.features[0].geometry);
    }

    #[test]
    fn projected_collections_reproject_through_geographic() {
        let fc = square_collection();
        let merc = reproject(&fc, Projection::Mercator);
        assert_eq!(merc.crs, Crs::Projected(Projection::Mercator));
        let back = reproject(&merc, Projection::Wgs84);
        let original: Vec<Coord<f64>> = fc.features[0].geometry.0[0].exterior().0.clone();
        let restored: Vec<Coord<f64>> = back.features[0].geometry.0[0].exterior().0.clone();
        for (a, b) in original.iter().zip(restored.iter()) {
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-6);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn area_changes_after_projection() {
        let fc = square_collection();
        let degrees = fc.features[0].geometry.unsigned_area();
        assert_abs_diff_eq!(degrees, 100.0, epsilon = 1e-9);
        for p in [
            Projection::Mercator,
            Projection::Robinson,
            Projection::Mollweide,
            Projection::LambertConformalConic,
        ] {
            let projected = reproject(&fc, p).features[0].geometry.unsigned_area();
            assert!(projected > 1e9, "{} area {}", p.label(), projected);
        }
    }

    #[test]
    fn unsupported_identifier_is_fatal() {
        let err = reproject_to(&square_collection(), "ESRI:99999").unwrap_err();
        assert!(err.to_string().contains("Unsupported projection identifier"));
    }
}
