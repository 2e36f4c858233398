//! Rig reprojection residual.
//!
//! A world point `X` observed by camera `c` at frame `f` projects through
//!
//! `p_c = cam_se3_rig(c) * rig_se3_world(f) * X`
//!
//! Both poses are parameterized by a local perturbation `[w, v]` around a
//! base value: `R <- Exp(w) * R0`, `t <- t0 + v` (see
//! [`rigcal_core::retract_pose`]). The base poses and the intrinsics are
//! constants; only the two 6-vectors carry derivatives.

use nalgebra::{convert, RealField, Vector2, Vector3};
use rigcal_core::{Iso3, PinholeCamera, Pt2, Pt3, Real};

/// Depth below which points are clamped before division.
pub const PROJECTION_EPS: Real = 1.0e-9;

/// Below this squared angle the rotation uses its Taylor expansion.
const SMALL_ANGLE2: Real = 1.0e-10;

/// Intrinsics and distortion of one observation, as plain constants.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionConsts {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub skew: Real,
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
}

impl From<&PinholeCamera> for ProjectionConsts {
    fn from(camera: &PinholeCamera) -> Self {
        Self {
            fx: camera.k.fx,
            fy: camera.k.fy,
            cx: camera.k.cx,
            cy: camera.k.cy,
            skew: camera.k.skew,
            k1: camera.dist.k1,
            k2: camera.dist.k2,
            k3: camera.dist.k3,
            p1: camera.dist.p1,
            p2: camera.dist.p2,
        }
    }
}

/// Rotate `v` by `Exp(w)` (Rodrigues), without a square root near zero so
/// derivatives at `w = 0` stay finite.
pub fn rotate_by_exp<T: RealField>(w: &Vector3<T>, v: &Vector3<T>) -> Vector3<T> {
    let theta2 = w.dot(w);
    let (a, b) = if theta2 < convert(SMALL_ANGLE2) {
        (
            T::one() - theta2.clone() / convert(6.0),
            convert::<Real, T>(0.5) - theta2 / convert(24.0),
        )
    } else {
        let theta = theta2.clone().sqrt();
        (
            theta.clone().sin() / theta.clone(),
            (T::one() - theta.cos()) / theta2,
        )
    };
    let wxv = w.cross(v);
    let wxwxv = w.cross(&wxv);
    v + wxv * a + wxwxv * b
}

fn vec3<T: RealField>(d: &[T]) -> Vector3<T> {
    Vector3::new(d[0].clone(), d[1].clone(), d[2].clone())
}

/// Apply a perturbed pose `[w, v]` around `base` to a point.
fn transform<T: RealField>(delta: &[T], base: &Iso3, p: &Vector3<T>) -> Vector3<T> {
    let r0 = base
        .rotation
        .to_rotation_matrix()
        .into_inner()
        .map(|x| convert::<Real, T>(x));
    let t0 = base.translation.vector.map(|x| convert::<Real, T>(x));
    rotate_by_exp(&vec3(&delta[0..3]), &(r0 * p)) + t0 + vec3(&delta[3..6])
}

/// Projection minus observation for one correspondence.
///
/// `cam_delta` and `rig_delta` are `[w, v]` perturbations of `cam_se3_rig`
/// and `rig_se3_world`.
pub fn rig_reprojection_residual<T: RealField>(
    cam_delta: &[T],
    rig_delta: &[T],
    cam_se3_rig: &Iso3,
    rig_se3_world: &Iso3,
    intr: &ProjectionConsts,
    pw: &Pt3,
    uv: &Pt2,
) -> Vector2<T> {
    debug_assert!(cam_delta.len() == 6 && rig_delta.len() == 6);
    let c = |x: Real| convert::<Real, T>(x);

    let pw_t = pw.coords.map(c);
    let p_r = transform(rig_delta, rig_se3_world, &pw_t);
    let p_c = transform(cam_delta, cam_se3_rig, &p_r);

    let z = if p_c.z < c(PROJECTION_EPS) {
        c(PROJECTION_EPS)
    } else {
        p_c.z.clone()
    };
    let x = p_c.x.clone() / z.clone();
    let y = p_c.y.clone() / z;

    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let radial = T::one() + c(intr.k1) * r2.clone() + c(intr.k2) * r4 + c(intr.k3) * r6;
    let two = c(2.0);
    let xy = x.clone() * y.clone();
    let x_tan = two.clone() * c(intr.p1) * xy.clone()
        + c(intr.p2) * (r2.clone() + two.clone() * x.clone() * x.clone());
    let y_tan =
        c(intr.p1) * (r2 + two.clone() * y.clone() * y.clone()) + two * c(intr.p2) * xy;
    let xd = x * radial.clone() + x_tan;
    let yd = y * radial + y_tan;

    let u = c(intr.fx) * xd.clone() + c(intr.skew) * yd.clone() + c(intr.cx);
    let v = c(intr.fy) * yd + c(intr.cy);
    Vector2::new(u - c(uv.x), v - c(uv.y))
}

/// Residual at the base poses (zero perturbation).
pub fn rig_reprojection_residual_at(
    cam_se3_rig: &Iso3,
    rig_se3_world: &Iso3,
    intr: &ProjectionConsts,
    pw: &Pt3,
    uv: &Pt2,
) -> Vector2<Real> {
    rig_reprojection_residual(&[0.0; 6], &[0.0; 6], cam_se3_rig, rig_se3_world, intr, pw, uv)
}
