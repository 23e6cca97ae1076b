/// Earth-centered, Earth-fixed Cartesian coordinates (meters).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Ecef {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Seven-parameter datum shift in the position-vector convention used by
/// proj4 `+towgs84` strings: translations in meters, rotations in arc
/// seconds, scale in parts per million.
///
/// `apply` maps source-datum ECEF to WGS84 ECEF; `invert` is its exact
/// inverse (the 3x3 system is solved, not approximated by negating the
/// parameters).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Helmert {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx_arcsec: f64,
    pub ry_arcsec: f64,
    pub rz_arcsec: f64,
    pub scale_ppm: f64,
}

impl Helmert {
    pub const fn new(t: [f64; 3], r_arcsec: [f64; 3], scale_ppm: f64) -> Self {
        Self {
            tx: t[0],
            ty: t[1],
            tz: t[2],
            rx_arcsec: r_arcsec[0],
            ry_arcsec: r_arcsec[1],
            rz_arcsec: r_arcsec[2],
            scale_ppm,
        }
    }

    fn matrix(&self) -> [[f64; 3]; 3] {
        let m = 1.0 + self.scale_ppm * 1e-6;
        let rx = self.rx_arcsec * ARCSEC_TO_RAD;
        let ry = self.ry_arcsec * ARCSEC_TO_RAD;
        let rz = self.rz_arcsec * ARCSEC_TO_RAD;
        [
            [m, -m * rz, m * ry],
            [m * rz, m, -m * rx],
            [-m * ry, m * rx, m],
        ]
    }

    pub fn apply(&self, p: Ecef) -> Ecef {
        let r = self.matrix();
        let v = p.as_array();
        Ecef::new(
            self.tx + dot3(r[0], v),
            self.ty + dot3(r[1], v),
            self.tz + dot3(r[2], v),
        )
    }

    pub fn invert(&self, p: Ecef) -> Ecef {
        let r = self.matrix();
        let b = [p.x - self.tx, p.y - self.ty, p.z - self.tz];
        let det = det3(r);
        let solve = |col: usize| {
            let mut m = r;
            for (row, value) in m.iter_mut().zip(b) {
                row[col] = value;
            }
            det3(m) / det
        };
        Ecef::new(solve(0), solve(1), solve(2))
    }
}

fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}
