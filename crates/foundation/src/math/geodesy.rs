use super::Ecef;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Reference ellipsoid described by semi-major axis and flattening.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: WGS84_A,
        f: WGS84_F,
    };

    /// Airy 1830, the ellipsoid of the OSGB36 datum.
    pub const AIRY_1830: Ellipsoid = Ellipsoid {
        a: 6_377_563.396,
        f: 1.0 / 299.324_964_6,
    };

    /// Semi-minor axis.
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// Second eccentricity squared.
    pub fn ep2(&self) -> f64 {
        let b = self.b();
        (self.a * self.a - b * b) / (b * b)
    }

    /// Prime vertical radius of curvature at `lat_rad`.
    pub fn prime_vertical_radius(&self, lat_rad: f64) -> f64 {
        let s = lat_rad.sin();
        self.a / (1.0 - self.e2() * s * s).sqrt()
    }
}

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }

    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self::new(lat_deg.to_radians(), lon_deg.to_radians(), 0.0)
    }

    /// `[lon, lat]` in degrees, the GeoJSON axis order.
    pub fn lon_lat_deg(&self) -> [f64; 2] {
        [self.lon_rad.to_degrees(), self.lat_rad.to_degrees()]
    }
}

pub fn geodetic_to_ecef(geo: Geodetic, ellipsoid: Ellipsoid) -> Ecef {
    let sin_lat = geo.lat_rad.sin();
    let cos_lat = geo.lat_rad.cos();
    let sin_lon = geo.lon_rad.sin();
    let cos_lon = geo.lon_rad.cos();

    let n = ellipsoid.prime_vertical_radius(geo.lat_rad);
    let x = (n + geo.alt_m) * cos_lat * cos_lon;
    let y = (n + geo.alt_m) * cos_lat * sin_lon;
    let z = (n * (1.0 - ellipsoid.e2()) + geo.alt_m) * sin_lat;

    Ecef::new(x, y, z)
}

/// Bowring's closed-form estimate followed by fixed-point refinement, which
/// converges to well below a millimeter for terrestrial points.
pub fn ecef_to_geodetic(ecef: Ecef, ellipsoid: Ellipsoid) -> Geodetic {
    let a = ellipsoid.a;
    let b = ellipsoid.b();
    let e2 = ellipsoid.e2();
    let ep2 = ellipsoid.ep2();

    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    let theta = (ecef.z * a).atan2(p * b);
    let sin_theta = theta.sin();
    let cos_theta = theta.cos();

    let mut lat = (ecef.z + ep2 * b * sin_theta * sin_theta * sin_theta)
        .atan2(p - e2 * a * cos_theta * cos_theta * cos_theta);

    for _ in 0..4 {
        let n = ellipsoid.prime_vertical_radius(lat);
        lat = (ecef.z + e2 * n * lat.sin()).atan2(p);
    }

    let n = ellipsoid.prime_vertical_radius(lat);
    let alt = if lat.cos().abs() > 1e-10 {
        p / lat.cos() - n
    } else {
        ecef.z.abs() - b
    };

    Geodetic::new(lat, lon, alt)
}
