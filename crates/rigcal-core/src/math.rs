use nalgebra::{
    Isometry3, Matrix3, Matrix4, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3,
    Vector6,
};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Vec6 = Vector6<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Iso3 = Isometry3<Real>;
pub type Quat = UnitQuaternion<Real>;

/// Index of a camera on the rig.
pub type CameraId = usize;
/// Index of a synchronized frame, shared by all cameras.
pub type FrameId = usize;

/// Skew-symmetric matrix `[v]x` such that `[v]x * w = v x w`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Apply a left perturbation `delta = [w, v]` to a pose.
///
/// `R <- Exp(w) * R`, `t <- t + v`. This is the retraction used by the joint
/// refiner; it matches the generic residual parameterization exactly.
pub fn retract_pose(pose: &Iso3, delta: &Vec6) -> Iso3 {
    let w = Vec3::new(delta[0], delta[1], delta[2]);
    let v = Vec3::new(delta[3], delta[4], delta[5]);
    let rotation = Quat::from_scaled_axis(w) * pose.rotation;
    Iso3::from_parts(Translation3::from(pose.translation.vector + v), rotation)
}

/// Angle (radians) of the rotation taking `a` to `b`.
///
/// Uses `atan2` on the relative quaternion; `acos` of the scalar part loses
/// about 1e-8 rad of precision near zero.
pub fn rotation_angle(a: &Quat, b: &Quat) -> Real {
    let q = a.inverse() * b;
    2.0 * q.imag().norm().atan2(q.scalar().abs())
}

/// Rotation vector (axis * angle) of `q`, with the angle in `[0, pi]`.
pub fn rotation_log(q: &Quat) -> Vec3 {
    let (w, v) = if q.scalar() < 0.0 {
        (-q.scalar(), -q.imag())
    } else {
        (q.scalar(), q.imag())
    };
    let s = v.norm();
    if s < 1e-12 {
        return v * 2.0;
    }
    v * (2.0 * s.atan2(w) / s)
}

/// Translation distance and rotation angle between two poses.
pub fn pose_error(a: &Iso3, b: &Iso3) -> (Real, Real) {
    let dt = (a.translation.vector - b.translation.vector).norm();
    (dt, rotation_angle(&a.rotation, &b.rotation))
}

/// Row-major 4x4 homogeneous matrix of a pose, for interchange formats.
pub fn iso3_to_rows(iso: &Iso3) -> [[Real; 4]; 4] {
    let m: Mat4 = iso.to_homogeneous();
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    rows
}
