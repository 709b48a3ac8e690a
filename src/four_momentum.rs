use nalgebra::Vector3;
use num_traits::{Float, FloatConst};
use serde::{Deserialize, Serialize};

/// Charged-pion mass in GeV, assigned to reconstructed tracks.
pub const MASS_PION: f64 = 0.140;

pub fn wrap_phi<T: Float + FloatConst>(phi: T) -> T {
    //! Wraps an azimuthal angle into $`[-\pi, \pi]`$. Non-finite angles come back as NaN.
    if phi >= -T::PI() && phi <= T::PI() {
        return phi;
    }
    let two_pi = T::PI() + T::PI();
    let shifted = (phi + T::PI()) % two_pi;
    if shifted < T::zero() {
        shifted + two_pi - T::PI()
    } else {
        shifted - T::PI()
    }
}

pub fn delta_phi<T: Float + FloatConst>(phi_a: T, phi_b: T) -> T {
    //! Signed azimuthal separation $`\phi_a - \phi_b`$ wrapped into $`[-\pi, \pi]`$.
    wrap_phi(phi_a - phi_b)
}

pub fn delta_r<T: Float>(delta_eta: T, delta_phi: T) -> T {
    //! Angular separation $`\Delta R = \sqrt{\Delta\eta^2 + \Delta\phi^2}`$.
    delta_eta.hypot(delta_phi)
}

pub fn pseudorapidity(px: f64, py: f64, pz: f64) -> f64 {
    //! Pseudorapidity of a three-vector, $`\eta = \operatorname{atanh}(p_z / |p|)`$.
    //!
    //! A vector along the beam axis returns $`\pm\infty`$ and the null vector returns $`0`$.
    let p = (px * px + py * py + pz * pz).sqrt();
    if p == 0.0 {
        return 0.0;
    }
    (pz / p).atanh()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FourMomentum {
    pub e: f64,
    pub px: f64,
    pub py: f64,
    pub pz: f64,
}

impl FourMomentum {
    //! A four-momentum with the kinematic accessors used by the QA plugins.
    //!
    //! This is the basic structure of a Lorentz four-vector
    //! of the form $`(E, \overrightarrow{p})`$ where $E$ is the energy and $`\overrightarrow{p}`$ is the
    //! momentum.
    //!
    //! # Examples
    //! ```
    //! use correlator_qa::prelude::*;
    //!
    //! let vec_a = FourMomentum::new(1.3, 0.2, 0.3, 0.1);
    //! let vec_b = FourMomentum::new(4.2, 0.5, 0.4, 0.5);
    //! assert!(vec_a.delta_r(&vec_b) >= 0.0);
    //! ```

    pub fn new(e: f64, px: f64, py: f64, pz: f64) -> Self {
        //! Create a new [`FourMomentum`] from energy and momentum components.
        //!
        //! Components are listed in the order $` (E, p_x, p_y, p_z) `$
        Self { e, px, py, pz }
    }

    pub fn from_mass(px: f64, py: f64, pz: f64, mass: f64) -> Self {
        //! Create an on-shell [`FourMomentum`] from a three-momentum and a mass hypothesis.
        let e = (px * px + py * py + pz * pz + mass * mass).sqrt();
        Self { e, px, py, pz }
    }

    pub fn momentum(&self) -> Vector3<f64> {
        //! Extract the 3-momentum as a [`nalgebra::Vector3<f64>`]
        Vector3::new(self.px, self.py, self.pz)
    }

    pub fn p(&self) -> f64 {
        self.momentum().norm()
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn eta(&self) -> f64 {
        pseudorapidity(self.px, self.py, self.pz)
    }

    pub fn phi(&self) -> f64 {
        //! Azimuth in $`[-\pi, \pi]`$.
        self.py.atan2(self.px)
    }

    pub fn delta_eta(&self, other: &Self) -> f64 {
        self.eta() - other.eta()
    }

    pub fn delta_phi(&self, other: &Self) -> f64 {
        delta_phi(self.phi(), other.phi())
    }

    pub fn delta_r(&self, other: &Self) -> f64 {
        //! Angular separation between two four-momenta.
        //!
        //! Symmetric under exchange: `a.delta_r(&b) == b.delta_r(&a)`.
        delta_r(self.delta_eta(other), self.delta_phi(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn wraps_azimuth_across_the_seam() {
        assert_relative_eq!(delta_phi(3.0, -3.0), 6.0 - 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(-3.0, 3.0), 2.0 * PI - 6.0, epsilon = 1e-12);
        assert_eq!(wrap_phi(0.5_f32), 0.5_f32);
        assert_relative_eq!(wrap_phi(-7.0), 2.0 * PI - 7.0, epsilon = 1e-12);
    }

    #[test]
    fn huge_and_infinite_azimuths_terminate() {
        assert!(wrap_phi(f64::INFINITY).is_nan());
        assert!(wrap_phi(f64::NEG_INFINITY).is_nan());
        assert!(wrap_phi(f64::NAN).is_nan());
        let wrapped = wrap_phi(1e30_f64);
        assert!((-PI..=PI).contains(&wrapped));
        assert!(delta_phi(f64::INFINITY, 0.0).is_nan());
    }

    #[test]
    fn delta_r_is_symmetric() {
        let a = FourMomentum::from_mass(1.0, 0.5, 0.3, MASS_PION);
        let b = FourMomentum::from_mass(-0.4, 1.2, -0.8, MASS_PION);
        assert_relative_eq!(a.delta_r(&b), b.delta_r(&a), epsilon = 1e-12);
        let expected = (a.delta_eta(&b).powi(2) + a.delta_phi(&b).powi(2)).sqrt();
        assert_relative_eq!(a.delta_r(&b), expected, epsilon = 1e-12);
    }

    #[test]
    fn transverse_kinematics() {
        let a = FourMomentum::new(5.0, 3.0, 4.0, 0.0);
        assert_relative_eq!(a.pt(), 5.0);
        assert_relative_eq!(a.eta(), 0.0);
        assert_relative_eq!(a.p(), 5.0);
        let along_beam = FourMomentum::new(2.0, 0.0, 0.0, 1.0);
        assert!(along_beam.eta().is_infinite());
    }
}
