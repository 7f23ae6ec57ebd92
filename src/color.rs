/// Temperature at which the display whitepoint is left untouched (D65).
pub const NEUTRAL_TEMP: i32 = 6500;

/// Per-channel multipliers for "white" at a given color temperature.
///
/// Every channel is in `[0, 1]` and the brightest one is exactly `1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Whitepoint {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Whitepoint {
    pub const UNITY: Whitepoint = Whitepoint {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn max(&self) -> f64 {
        self.r.max(self.g).max(self.b)
    }

    fn channels(&self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

/// Illuminant D (daylight locus). Only well-defined between 4000K and 25000K.
fn illuminant_d(temp: f64) -> (f64, f64) {
    let x = 0.237040 + 0.24748e3 / temp + 1.9018e6 / temp.powi(2) - 2.0064e9 / temp.powi(3);
    let y = -3.0 * x.powi(2) + 2.870 * x - 0.275;
    (x, y)
}

/// Planckian (black body) locus, tuned for temperatures below 4000K.
fn planckian_locus(temp: f64) -> (f64, f64) {
    let x = -0.2661239e9 / temp.powi(3) - 0.2343589e6 / temp.powi(2) + 0.93e3 / temp + 0.179910;
    let y = -0.9549476 * x.powi(3) - 1.37418593 * x.powi(2) + 2.095 * x - 0.16748867;
    (x, y)
}

fn srgb_gamma(value: f64) -> f64 {
    if value <= 0.0031308 {
        12.92 * value
    } else {
        1.055 * value.powf(1.0 / 2.2) - 0.055
    }
}

fn xyz_to_srgb(x: f64, y: f64, z: f64) -> Whitepoint {
    let r = 3.2404542 * x - 1.5371385 * y - 0.4985314 * z;
    let g = -0.9692660 * x + 1.8760108 * y + 0.0415560 * z;
    let b = 0.0556434 * x - 0.2040259 * y + 1.0572252 * z;
    Whitepoint {
        r: srgb_gamma(r.clamp(0.0, 1.0)),
        g: srgb_gamma(g.clamp(0.0, 1.0)),
        b: srgb_gamma(b.clamp(0.0, 1.0)),
    }
}

/// Whitepoint for `temp` Kelvin.
///
/// Uses the daylight locus at and above 6500K and the Planckian locus below
/// it, converts through linear sRGB and normalizes so the brightest channel
/// is unattenuated.
pub fn whitepoint(temp: i32) -> Whitepoint {
    if temp == NEUTRAL_TEMP {
        return Whitepoint::UNITY;
    }

    let t = f64::from(temp);
    let (x, y) = if temp >= NEUTRAL_TEMP {
        illuminant_d(t)
    } else {
        planckian_locus(t)
    };
    let z = 1.0 - x - y;

    let wp = xyz_to_srgb(x, y, z);
    let max = wp.max();
    if !(max > 0.0) {
        return Whitepoint::UNITY;
    }
    Whitepoint {
        r: wp.r / max,
        g: wp.g / max,
        b: wp.b / max,
    }
}

/// Linear ramp position with the contrast offset folded in.
fn contrast_position(val: f64, contrast: i32) -> f64 {
    if contrast == 0 {
        return val;
    }
    let scale = f64::from(100 - contrast.abs()) / 100.0;
    let val = if contrast < 0 {
        val * scale
    } else {
        val * scale + (1.0 - scale)
    };
    val.clamp(0.0, 1.0)
}

/// Fills `buf` with three planes (R, G, B) of `ramp_size` samples each.
pub fn fill_gamma_table(
    buf: &mut [u16],
    ramp_size: usize,
    wp: Whitepoint,
    gamma: f64,
    contrast: i32,
) {
    let (r, rest) = buf[..ramp_size * 3].split_at_mut(ramp_size);
    let (g, b) = rest.split_at_mut(ramp_size);
    let mut planes = [r, g, b];

    for i in 0..ramp_size {
        let val = if ramp_size > 1 {
            i as f64 / (ramp_size as f64 - 1.0)
        } else {
            1.0
        };
        let val = contrast_position(val, contrast);

        for (plane, w) in planes.iter_mut().zip(wp.channels()) {
            let corrected = (val * w).powf(gamma);
            let sample = (corrected * f64::from(u16::MAX)).round();
            // `as` saturates, NaN maps to 0
            plane[i] = sample as u16;
        }
    }
}

/// Builds a fresh planar ramp table of `ramp_size * 3` samples.
#[cfg(test)]
pub fn build_ramp(ramp_size: usize, wp: Whitepoint, gamma: f64, contrast: i32) -> Vec<u16> {
    let mut table = vec![0u16; ramp_size * 3];
    fill_gamma_table(&mut table, ramp_size, wp, gamma, contrast);
    table
}
