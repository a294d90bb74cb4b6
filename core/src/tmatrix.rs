//! Per-axis offset correction.
//!
//! A proxy vertex's offset was authored against the reference base mesh. When
//! the body is reshaped, the offset is corrected by a 3x3 matrix derived from
//! distances between landmark vertices on the live base mesh, either as a pure
//! per-axis scale or as a best-fit affine map between two landmark boxes
//! ("shear").
//!
//! Four independent sources may be present on one proxy; evaluation uses the
//! first one set in the order scale, shear, left shear, right shear. With none
//! set the correction is the identity.

use glam::{DMat3, DVec3, Mat3, Vec3};

/// Scale landmarks for one axis: `|co[a] - co[b]| / denominator`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleEntry {
    pub vert_a: u32,
    pub vert_b: u32,
    pub denominator: f32,
}

/// Shear landmarks for one axis: the live coordinates of `vert_a` and `vert_b`
/// along the axis are matched against the authored `source` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShearEntry {
    pub vert_a: u32,
    pub vert_b: u32,
    pub source: [f32; 2],
}

/// Which of the three shear tables a directive writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShearSide {
    Plain,
    Left,
    Right,
}

/// One optional entry per axis (x, y, z).
pub type AxisEntries<T> = [Option<T>; 3];

/// The correction selected for evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActiveTransform<'a> {
    Identity,
    Scale(&'a AxisEntries<ScaleEntry>),
    Shear(&'a AxisEntries<ShearEntry>),
}

/// Offset correction data of a proxy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformMatrix {
    pub scale: Option<AxisEntries<ScaleEntry>>,
    pub shear: Option<AxisEntries<ShearEntry>>,
    pub left_shear: Option<AxisEntries<ShearEntry>>,
    pub right_shear: Option<AxisEntries<ShearEntry>>,
}

const DEGENERATE_EPSILON: f64 = 1e-12;

impl TransformMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scale(&mut self, axis: usize, entry: ScaleEntry) {
        self.scale.get_or_insert([None; 3])[axis] = Some(entry);
    }

    pub fn set_shear(&mut self, axis: usize, side: ShearSide, entry: ShearEntry) {
        let table = match side {
            ShearSide::Plain => &mut self.shear,
            ShearSide::Left => &mut self.left_shear,
            ShearSide::Right => &mut self.right_shear,
        };
        table.get_or_insert([None; 3])[axis] = Some(entry);
    }

    pub fn shear_table(&self, side: ShearSide) -> Option<&AxisEntries<ShearEntry>> {
        match side {
            ShearSide::Plain => self.shear.as_ref(),
            ShearSide::Left => self.left_shear.as_ref(),
            ShearSide::Right => self.right_shear.as_ref(),
        }
    }

    /// Whether no correction source is set at all.
    pub fn is_identity(&self) -> bool {
        matches!(self.active(), ActiveTransform::Identity)
    }

    pub fn active(&self) -> ActiveTransform<'_> {
        if let Some(scale) = &self.scale {
            ActiveTransform::Scale(scale)
        } else if let Some(shear) = self
            .shear
            .as_ref()
            .or(self.left_shear.as_ref())
            .or(self.right_shear.as_ref())
        {
            ActiveTransform::Shear(shear)
        } else {
            ActiveTransform::Identity
        }
    }

    /// Correction matrix for the given base-mesh coordinates.
    ///
    /// Axes without an entry, or whose landmarks fall outside `coords`, are
    /// left uncorrected.
    pub fn matrix(&self, coords: &[Vec3]) -> Mat3 {
        match self.active() {
            ActiveTransform::Identity => Mat3::IDENTITY,
            ActiveTransform::Scale(entries) => matrix_from_scale(entries, coords),
            ActiveTransform::Shear(entries) => matrix_from_shear(entries, coords),
        }
    }
}

fn landmarks(coords: &[Vec3], a: u32, b: u32) -> Option<(Vec3, Vec3)> {
    Some((*coords.get(a as usize)?, *coords.get(b as usize)?))
}

fn matrix_from_scale(entries: &AxisEntries<ScaleEntry>, coords: &[Vec3]) -> Mat3 {
    let mut diagonal = Vec3::ONE;
    for (axis, entry) in entries.iter().enumerate() {
        let Some(entry) = entry else { continue };
        if entry.denominator == 0.0 {
            continue;
        }
        let Some((co_a, co_b)) = landmarks(coords, entry.vert_a, entry.vert_b) else {
            continue;
        };
        diagonal[axis] = (co_a[axis] - co_b[axis]).abs() / entry.denominator;
    }
    Mat3::from_diagonal(diagonal)
}

fn matrix_from_shear(entries: &AxisEntries<ShearEntry>, coords: &[Vec3]) -> Mat3 {
    // Per axis: authored landmark values (source) and their live values (target).
    // A missing axis maps [0, 1] onto itself.
    let mut source = [[0.0f64, 1.0]; 3];
    let mut target = [[0.0f64, 1.0]; 3];
    for (axis, entry) in entries.iter().enumerate() {
        let Some(entry) = entry else { continue };
        let Some((co_a, co_b)) = landmarks(coords, entry.vert_a, entry.vert_b) else {
            continue;
        };
        source[axis] = [entry.source[0] as f64, entry.source[1] as f64];
        target[axis] = [co_a[axis] as f64, co_b[axis] as f64];
    }

    let (source_box, target_box) = landmark_boxes(&source, &target);
    match affine_from_points(&source_box, &target_box) {
        Some(m) => m.as_mat3(),
        None => {
            tracing::warn!("degenerate shear landmarks, offset correction skipped");
            Mat3::IDENTITY
        }
    }
}

/// Expand per-axis landmark pairs into the 8 corners of two boxes.
fn landmark_boxes(source: &[[f64; 2]; 3], target: &[[f64; 2]; 3]) -> ([DVec3; 8], [DVec3; 8]) {
    let mut sbox = [DVec3::ZERO; 8];
    let mut tbox = [DVec3::ZERO; 8];
    let mut n = 0;
    for i in 0..2 {
        for (j, k) in [(0, 0), (0, 1), (1, 1), (1, 0)] {
            sbox[n] = DVec3::new(source[0][i], source[1][j], source[2][k]);
            tbox[n] = DVec3::new(target[0][i], target[1][j], target[2][k]);
            n += 1;
        }
    }
    (sbox, tbox)
}

/// Linear part of the least-squares affine map taking `from` onto `to`.
///
/// Both point sets are centred on their centroids, then the normal equations
/// `M * (Σ s sᵀ) = Σ t sᵀ` are solved for `M`. Returns `None` when the source
/// points do not span three dimensions.
pub fn affine_from_points(from: &[DVec3], to: &[DVec3]) -> Option<DMat3> {
    debug_assert_eq!(from.len(), to.len());
    if from.is_empty() {
        return None;
    }
    let count = from.len() as f64;
    let from_centroid = from.iter().copied().sum::<DVec3>() / count;
    let to_centroid = to.iter().copied().sum::<DVec3>() / count;

    let mut cross = DMat3::ZERO;
    let mut gram = DMat3::ZERO;
    for (s, t) in from.iter().zip(to) {
        let s = *s - from_centroid;
        let t = *t - to_centroid;
        cross += DMat3::from_cols(t * s.x, t * s.y, t * s.z);
        gram += DMat3::from_cols(s * s.x, s * s.y, s * s.z);
    }

    if gram.determinant().abs() < DEGENERATE_EPSILON {
        return None;
    }
    Some(cross * gram.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_mat(a: Mat3, b: Mat3) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    fn coords() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 3.0, 4.0),
            Vec3::new(-1.0, 5.0, 1.0),
            Vec3::new(1.0, -1.0, 9.0),
        ]
    }

    #[test]
    fn test_empty_is_identity() {
        let t = TransformMatrix::new();
        assert!(t.is_identity());
        assert_eq!(t.matrix(&coords()), Mat3::IDENTITY);
    }

    #[test]
    fn test_scale_matrix() {
        let mut t = TransformMatrix::new();
        t.set_scale(0, ScaleEntry { vert_a: 0, vert_b: 1, denominator: 1.0 });
        t.set_scale(1, ScaleEntry { vert_a: 1, vert_b: 0, denominator: 2.0 });
        t.set_scale(2, ScaleEntry { vert_a: 0, vert_b: 1, denominator: 8.0 });

        let m = t.matrix(&coords());
        assert!(approx_mat(m, Mat3::from_diagonal(Vec3::new(2.0, 1.5, 0.5))));
    }

    #[test]
    fn test_scale_missing_axis_is_uncorrected() {
        let mut t = TransformMatrix::new();
        t.set_scale(1, ScaleEntry { vert_a: 0, vert_b: 2, denominator: 2.5 });

        let m = t.matrix(&coords());
        assert!(approx_mat(m, Mat3::from_diagonal(Vec3::new(1.0, 2.0, 1.0))));
    }

    #[test]
    fn test_scale_out_of_range_landmark_is_uncorrected() {
        let mut t = TransformMatrix::new();
        t.set_scale(0, ScaleEntry { vert_a: 0, vert_b: 99, denominator: 1.0 });
        assert_eq!(t.matrix(&coords()), Mat3::IDENTITY);
    }

    #[test]
    fn test_scale_takes_priority_over_shear() {
        let mut t = TransformMatrix::new();
        t.set_shear(0, ShearSide::Plain, ShearEntry { vert_a: 0, vert_b: 1, source: [0.0, 1.0] });
        t.set_scale(0, ScaleEntry { vert_a: 0, vert_b: 1, denominator: 4.0 });
        assert!(matches!(t.active(), ActiveTransform::Scale(_)));
    }

    #[test]
    fn test_shear_priority_order() {
        let entry = ShearEntry { vert_a: 0, vert_b: 1, source: [0.0, 1.0] };
        let mut t = TransformMatrix::new();
        t.set_shear(0, ShearSide::Right, entry);
        assert_eq!(t.active(), ActiveTransform::Shear(t.right_shear.as_ref().unwrap()));

        t.set_shear(0, ShearSide::Left, entry);
        assert_eq!(t.active(), ActiveTransform::Shear(t.left_shear.as_ref().unwrap()));

        t.set_shear(0, ShearSide::Plain, entry);
        assert_eq!(t.active(), ActiveTransform::Shear(t.shear.as_ref().unwrap()));
    }

    #[test]
    fn test_shear_recovers_per_axis_scale() {
        // Live x extent 0..2 vs authored 0..1 -> 2; y 0..3 vs 1..2.5 -> 2; z 0..4 vs 0..8 -> 0.5
        let mut t = TransformMatrix::new();
        t.set_shear(0, ShearSide::Plain, ShearEntry { vert_a: 0, vert_b: 1, source: [0.0, 1.0] });
        t.set_shear(1, ShearSide::Plain, ShearEntry { vert_a: 0, vert_b: 1, source: [1.0, 2.5] });
        t.set_shear(2, ShearSide::Plain, ShearEntry { vert_a: 0, vert_b: 1, source: [0.0, 8.0] });

        let m = t.matrix(&coords());
        assert!(approx_mat(m, Mat3::from_diagonal(Vec3::new(2.0, 2.0, 0.5))));
    }

    #[test]
    fn test_shear_reversed_landmarks_flip_axis() {
        let mut t = TransformMatrix::new();
        t.set_shear(0, ShearSide::Left, ShearEntry { vert_a: 1, vert_b: 0, source: [0.0, 1.0] });

        let m = t.matrix(&coords());
        assert!(approx_mat(m, Mat3::from_diagonal(Vec3::new(-2.0, 1.0, 1.0))));
    }

    #[test]
    fn test_degenerate_shear_is_identity() {
        let mut t = TransformMatrix::new();
        t.set_shear(0, ShearSide::Plain, ShearEntry { vert_a: 0, vert_b: 1, source: [1.0, 1.0] });
        assert_eq!(t.matrix(&coords()), Mat3::IDENTITY);
    }

    #[test]
    fn test_affine_from_points_general_linear_map() {
        let linear = DMat3::from_cols(
            DVec3::new(1.0, 0.5, 0.0),
            DVec3::new(0.0, 2.0, 0.25),
            DVec3::new(0.1, 0.0, 3.0),
        );
        let offset = DVec3::new(4.0, -2.0, 1.0);
        let from = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
        ];
        let to: Vec<DVec3> = from.iter().map(|p| linear * *p + offset).collect();

        let m = affine_from_points(&from, &to).unwrap();
        assert!(m.abs_diff_eq(linear, 1e-9));
    }
}
