//! Axis system description and scene normalization into the engine convention.

use crate::Scene;
use glam::{DMat3, DMat4, DQuat, DVec3};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> DVec3 {
        match self {
            Self::X => DVec3::X,
            Self::Y => DVec3::Y,
            Self::Z => DVec3::Z,
        }
    }

    pub(crate) fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            2 => Some(Self::Z),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SignedAxis {
    pub axis: Axis,
    pub negative: bool,
}

impl SignedAxis {
    pub const fn positive(axis: Axis) -> Self {
        Self {
            axis,
            negative: false,
        }
    }

    pub const fn negative(axis: Axis) -> Self {
        Self {
            axis,
            negative: true,
        }
    }

    pub fn vector(self) -> DVec3 {
        if self.negative {
            -self.axis.unit()
        } else {
            self.axis.unit()
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

/// Up / front / coord directions of a scene.
///
/// The system is right-handed when `coord x up == front`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AxisSystem {
    pub up: SignedAxis,
    pub front: SignedAxis,
    pub coord: SignedAxis,
}

impl AxisSystem {
    /// Z up, +X front, left-handed. Every imported scene ends up here.
    pub const ENGINE: Self = Self {
        up: SignedAxis::positive(Axis::Z),
        front: SignedAxis::positive(Axis::X),
        coord: SignedAxis::negative(Axis::Y),
    };

    /// Y up, +Z front, right-handed.
    pub const Y_UP_RIGHT_HANDED: Self = Self {
        up: SignedAxis::positive(Axis::Y),
        front: SignedAxis::positive(Axis::Z),
        coord: SignedAxis::positive(Axis::X),
    };

    /// Z up, -Y front, right-handed.
    pub const Z_UP_RIGHT_HANDED: Self = Self {
        up: SignedAxis::positive(Axis::Z),
        front: SignedAxis::negative(Axis::Y),
        coord: SignedAxis::positive(Axis::X),
    };

    /// All three axes distinct.
    pub fn is_valid(&self) -> bool {
        self.up.axis != self.front.axis
            && self.up.axis != self.coord.axis
            && self.front.axis != self.coord.axis
    }

    pub fn handedness(&self) -> Handedness {
        let triple = self
            .coord
            .vector()
            .cross(self.up.vector())
            .dot(self.front.vector());
        if triple > 0.0 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    fn basis(&self) -> DMat3 {
        DMat3::from_cols(self.coord.vector(), self.up.vector(), self.front.vector())
    }

    /// Signed permutation taking directions of `self` onto the matching directions of `target`.
    pub fn conversion_to(&self, target: &AxisSystem) -> DMat3 {
        target.basis() * self.basis().transpose()
    }
}

/// What [`normalize_scene`] changed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NormalizeReport {
    pub axes_converted: bool,
    pub handedness_flipped: bool,
    pub unit_ratio: f64,
}

impl NormalizeReport {
    pub fn is_noop(&self) -> bool {
        !self.axes_converted && self.unit_ratio == 1.0
    }
}

/// Converts `scene` into [`AxisSystem::ENGINE`] and, when `target_unit_scale` is given, into
/// that many centimeters per unit.
///
/// Node transforms, geometry, bind poses, cluster matrices and animation keys are all rewritten
/// so later stages never look at the source convention again. Running it on an already
/// normalized scene changes nothing.
pub fn normalize_scene(scene: &mut Scene, target_unit_scale: Option<f64>) -> NormalizeReport {
    let target = AxisSystem::ENGINE;
    let source = scene.axis_system;

    let mut basis = DMat3::IDENTITY;
    if source != target {
        if source.is_valid() {
            basis = source.conversion_to(&target);
        } else {
            log::warn!(
                "scene '{}': invalid axis system {:?}; assuming engine axes",
                scene.name,
                source
            );
        }
    }

    let unit_ratio = match target_unit_scale {
        Some(t)
            if t.is_finite()
                && t > 0.0
                && scene.unit_scale_factor.is_finite()
                && scene.unit_scale_factor > 0.0
                && (scene.unit_scale_factor - t).abs() > 1e-9 =>
        {
            scene.unit_scale_factor / t
        }
        _ => 1.0,
    };

    let axes_converted = basis != DMat3::IDENTITY;
    let handedness_flipped = basis.determinant() < 0.0;
    let report = NormalizeReport {
        axes_converted,
        handedness_flipped,
        unit_ratio,
    };

    scene.axis_system = target;
    if report.is_noop() {
        return report;
    }

    log::info!(
        "scene '{}': converting {:?} -> engine axes (mirrored: {}), unit ratio {}",
        scene.name,
        source,
        handedness_flipped,
        unit_ratio
    );
    Conversion {
        basis,
        unit: unit_ratio,
    }
    .apply(scene);

    if unit_ratio != 1.0 {
        if let Some(t) = target_unit_scale {
            scene.unit_scale_factor = t;
        }
    }
    if handedness_flipped {
        scene.mirrored = !scene.mirrored;
    }
    report
}

struct Conversion {
    basis: DMat3,
    unit: f64,
}

impl Conversion {
    fn point(&self, p: DVec3) -> DVec3 {
        self.basis * p * self.unit
    }

    fn direction(&self, v: DVec3) -> DVec3 {
        self.basis * v
    }

    fn rotation(&self, q: DQuat) -> DQuat {
        let m = self.basis * DMat3::from_quat(q) * self.basis.transpose();
        DQuat::from_mat3(&m).normalize()
    }

    fn scale(&self, s: DVec3) -> DVec3 {
        let m = self.basis * DMat3::from_diagonal(s) * self.basis.transpose();
        DVec3::new(m.x_axis.x, m.y_axis.y, m.z_axis.z)
    }

    fn matrix(&self, m: DMat4) -> DMat4 {
        let c = DMat4::from_mat3(self.basis);
        let mut out = c * m * c.transpose();
        out.w_axis.x *= self.unit;
        out.w_axis.y *= self.unit;
        out.w_axis.z *= self.unit;
        out
    }

    fn apply(&self, scene: &mut Scene) {
        for node in scene.nodes_mut() {
            node.translation = self.point(node.translation);
            node.rotation = self.rotation(node.rotation);
            node.scale = self.scale(node.scale);
            node.geometric_translation = self.point(node.geometric_translation);
            node.geometric_rotation = self.rotation(node.geometric_rotation);
            node.geometric_scale = self.scale(node.geometric_scale);

            let Some(mesh) = node.mesh_mut() else {
                continue;
            };
            for p in &mut mesh.control_points {
                *p = self.point(*p);
            }
            if let Some(normals) = mesh.normals.as_mut() {
                normals.map_values(|n| self.direction(n));
            }
            if let Some(tangents) = mesh.tangents.as_mut() {
                tangents.map_values(|t| self.direction(t.truncate()).extend(t.w));
            }
            for cluster in mesh.skins.iter_mut().flat_map(|s| &mut s.clusters) {
                if let Some(m) = cluster.transform_link.as_mut() {
                    *m = self.matrix(*m);
                }
            }
        }

        for entry in scene.poses.iter_mut().flat_map(|p| &mut p.entries) {
            entry.matrix = self.matrix(entry.matrix);
        }

        for track in scene.animations.iter_mut().flat_map(|a| &mut a.tracks) {
            for key in &mut track.translation {
                key.value = self.point(key.value);
            }
            for key in &mut track.rotation {
                key.value = self.rotation(key.value);
            }
            for key in &mut track.scale {
                key.value = self.scale(key.value);
            }
        }
    }
}
