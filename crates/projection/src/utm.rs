//! Transverse Mercator projection on the GRS80 ellipsoid.
//!
//! This is the projection underlying the UTM zones used by the regional
//! boundary catalogs (EPSG:25832 and EPSG:25833). Forward and inverse use
//! the standard series expansions; accuracy is well below a millimetre
//! inside a zone, which is far tighter than the metre-scale tile lattice
//! this feeds.
//!
//! The projection parameters:
//! - Central meridian (lon0): 9° for zone 32, 15° for zone 33
//! - Scale factor at the central meridian: 0.9996
//! - False easting: 500 km, false northing: 0 (northern hemisphere)

use std::f64::consts::PI;

/// GRS80 semi-major axis (meters).
const GRS80_A: f64 = 6_378_137.0;
/// GRS80 flattening.
const GRS80_F: f64 = 1.0 / 298.257_222_101;
/// UTM scale factor at the central meridian.
const UTM_K0: f64 = 0.9996;
/// UTM false easting (meters).
const UTM_FALSE_EASTING: f64 = 500_000.0;

/// Transverse Mercator projection parameters.
#[derive(Debug, Clone)]
pub struct TransverseMercator {
    /// Central meridian in radians
    lon0: f64,
    /// Semi-major axis (meters)
    a: f64,
    /// First eccentricity squared
    e2: f64,
    /// Second eccentricity squared
    ep2: f64,
    /// Scale factor at the central meridian
    k0: f64,
    /// False easting (meters)
    false_easting: f64,
}

impl TransverseMercator {
    /// UTM projection for the given central meridian (degrees), GRS80.
    pub fn utm(central_meridian_deg: f64) -> Self {
        let e2 = GRS80_F * (2.0 - GRS80_F);
        Self {
            lon0: central_meridian_deg * PI / 180.0,
            a: GRS80_A,
            e2,
            ep2: e2 / (1.0 - e2),
            k0: UTM_K0,
            false_easting: UTM_FALSE_EASTING,
        }
    }

    /// Meridian arc length from the equator to latitude `lat` (radians).
    fn meridian_arc(&self, lat: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        self.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
    }

    /// Convert geographic coordinates (degrees) to projected easting/northing
    /// (meters).
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let lon = lon_deg * to_rad;

        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let tan_lat = lat.tan();

        let n = self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let t = tan_lat * tan_lat;
        let c = self.ep2 * cos_lat * cos_lat;
        let a_ = (lon - self.lon0) * cos_lat;
        let m = self.meridian_arc(lat);

        let a2 = a_ * a_;
        let a3 = a2 * a_;
        let a4 = a3 * a_;
        let a5 = a4 * a_;
        let a6 = a5 * a_;

        let easting = self.k0
            * n
            * (a_
                + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a5 / 120.0)
            + self.false_easting;

        let northing = self.k0
            * (m + n
                * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a6 / 720.0));

        (easting, northing)
    }

    /// Convert projected easting/northing (meters) back to geographic
    /// coordinates (degrees).
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;
        let x = easting - self.false_easting;
        let y = northing;

        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        // Footpoint latitude.
        let m = y / self.k0;
        let mu = m / (self.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let sqrt_1me2 = (1.0 - e2).sqrt();
        let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);
        let e1_2 = e1 * e1;
        let e1_3 = e1_2 * e1;
        let e1_4 = e1_3 * e1;

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

        let sin_phi1 = phi1.sin();
        let cos_phi1 = phi1.cos();
        let tan_phi1 = phi1.tan();

        let c1 = self.ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let n1 = self.a / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
        let r1 = self.a * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
        let d = x / (n1 * self.k0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * self.ep2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);

        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1)
                    * d5
                    / 120.0)
                / cos_phi1;

        (lat * to_deg, lon * to_deg)
    }
}
