//! The fixed 27-entry parameter vector.
//!
//! Parameters are addressed by [`Param`], whose declaration order is also the
//! order of values in a `.par` file.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use super::{CalmError, CalmResult};

/// Parameter identifiers, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    /// R to paired V excitation
    Up,
    /// V to paired R inhibition
    Down,
    /// V to other R inhibition
    Cross,
    /// V to other V inhibition
    Flat,
    /// V to A weight
    High,
    /// R to A weight
    Low,
    /// A to E weight
    Ae,
    /// E to R noise scale
    Er,
    /// Initial inter-module weight
    InitWt,
    LowCrit,
    HighCrit,
    /// Activation decay
    KA,
    KLmax,
    KLmin,
    /// Competition factor of the learning rule
    LL,
    /// Base learning rate
    DL,
    /// E-dependent learning rate amplitude
    WmueL,
    /// Centre of the Gaussian learning-rate curve
    GL,
    /// Width of the Gaussian learning-rate curve
    GW,
    /// Learning-rate boost on connections leaving an active feedback module
    FBw,
    /// Strength of the feedback bias
    FBa,
    Sigma,
    /// Growth threshold, percentage gap between best and runner-up potential
    PG,
    /// Pruning threshold on potential
    PS,
    UL,
    AMap,
    BMap,
}

impl Param {
    pub const COUNT: usize = 27;

    pub const ALL: [Param; Param::COUNT] = [
        Param::Up,
        Param::Down,
        Param::Cross,
        Param::Flat,
        Param::High,
        Param::Low,
        Param::Ae,
        Param::Er,
        Param::InitWt,
        Param::LowCrit,
        Param::HighCrit,
        Param::KA,
        Param::KLmax,
        Param::KLmin,
        Param::LL,
        Param::DL,
        Param::WmueL,
        Param::GL,
        Param::GW,
        Param::FBw,
        Param::FBa,
        Param::Sigma,
        Param::PG,
        Param::PS,
        Param::UL,
        Param::AMap,
        Param::BMap,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical upper-case name (`"UP"`, `"K_Lmax"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Param::Up => "UP",
            Param::Down => "DOWN",
            Param::Cross => "CROSS",
            Param::Flat => "FLAT",
            Param::High => "HIGH",
            Param::Low => "LOW",
            Param::Ae => "AE",
            Param::Er => "ER",
            Param::InitWt => "INITWT",
            Param::LowCrit => "LOWCRIT",
            Param::HighCrit => "HIGHCRIT",
            Param::KA => "K_A",
            Param::KLmax => "K_Lmax",
            Param::KLmin => "K_Lmin",
            Param::LL => "L_L",
            Param::DL => "D_L",
            Param::WmueL => "WMUE_L",
            Param::GL => "G_L",
            Param::GW => "G_W",
            Param::FBw => "F_Bw",
            Param::FBa => "F_Ba",
            Param::Sigma => "SIGMA",
            Param::PG => "P_G",
            Param::PS => "P_S",
            Param::UL => "U_L",
            Param::AMap => "AMAP",
            Param::BMap => "BMAP",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Param> {
        Param::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// Parameter vector shared by every module of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    values: [f32; Param::COUNT],
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            values: [
                0.5,    // UP
                -1.2,   // DOWN
                -10.0,  // CROSS
                -1.0,   // FLAT
                -0.6,   // HIGH
                0.4,    // LOW
                1.0,    // AE
                0.25,   // ER
                0.6,    // INITWT
                0.05,   // LOWCRIT
                0.1,    // HIGHCRIT
                0.05,   // K_A
                1.0,    // K_Lmax
                0.0,    // K_Lmin
                1.0,    // L_L
                0.005,  // D_L
                0.05,   // WMUE_L
                0.6,    // G_L
                0.05,   // G_W
                2.0,    // F_Bw
                1.0,    // F_Ba
                0.06,   // SIGMA
                50.0,   // P_G
                0.0001, // P_S
                0.0,    // U_L
                8.8,    // AMAP
                10.0,   // BMAP
            ],
        }
    }
}

impl Parameters {
    /// Build from a flat slice in [`Param`] order.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` unless exactly 27 values are supplied.
    pub fn from_slice(values: &[f32]) -> CalmResult<Self> {
        let values: [f32; Param::COUNT] = values.try_into().map_err(|_| {
            CalmError::ShapeMismatch(format!(
                "expected {} parameters, got {}",
                Param::COUNT,
                values.len()
            ))
        })?;
        Ok(Self { values })
    }

    #[inline]
    pub fn get(&self, p: Param) -> f32 {
        self.values[p.index()]
    }

    #[inline]
    pub fn set(&mut self, p: Param, value: f32) {
        self.values[p.index()] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// `(name, value)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (Param, f32)> + '_ {
        Param::ALL.iter().map(move |&p| (p, self.get(p)))
    }
}

impl Index<Param> for Parameters {
    type Output = f32;

    #[inline]
    fn index(&self, p: Param) -> &f32 {
        &self.values[p.index()]
    }
}

impl IndexMut<Param> for Parameters {
    #[inline]
    fn index_mut(&mut self, p: Param) -> &mut f32 {
        &mut self.values[p.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_order_matches_index() {
        for (i, p) in Param::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
        assert_eq!(Param::BMap.index(), Param::COUNT - 1);
    }

    #[test]
    fn test_name_round_trip() {
        for p in Param::ALL {
            assert_eq!(Param::from_name(p.name()), Some(p));
        }
        assert_eq!(Param::from_name("k_lmax"), Some(Param::KLmax));
        assert_eq!(Param::from_name("GAIN"), None);
    }

    #[test]
    fn test_defaults() {
        let p = Parameters::default();
        assert_eq!(p[Param::Up], 0.5);
        assert_eq!(p[Param::Cross], -10.0);
        assert_eq!(p[Param::KLmax], 1.0);
        assert_eq!(p[Param::PG], 50.0);
        assert!(p[Param::LowCrit] < p[Param::HighCrit]);
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(Parameters::from_slice(&[0.0; 26]).is_err());
        let p = Parameters::from_slice(&[0.5; 27]).unwrap();
        assert_eq!(p.get(Param::Sigma), 0.5);
    }

    #[test]
    fn test_serde_json() {
        let mut p = Parameters::default();
        p.set(Param::Er, 0.3);
        let s = serde_json::to_string(&p).unwrap();
        let q: Parameters = serde_json::from_str(&s).unwrap();
        assert_eq!(p, q);
    }
}
