use crate::geometry::Rect;

/// A 4x4 transformation matrix stored in row-major order.
///
/// World transforms, transform slot values and the per-element vertex space
/// are all expressed with this type. Only the upper 3x4 block carries
/// information; the last row stays `[0, 0, 0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Matrix data in row-major order: [row0, row1, row2, row3]
    pub data: [f32; 16],
}

impl Transform {
    pub const IDENTITY: Self = Self {
        data: [
            1.0, 0.0, 0.0, 0.0, // row 0
            0.0, 1.0, 0.0, 0.0, // row 1
            0.0, 0.0, 1.0, 0.0, // row 2
            0.0, 0.0, 0.0, 1.0, // row 3
        ],
    };

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn translate(x: f32, y: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.data[3] = x;
        t.data[7] = y;
        t
    }

    /// Rotation around the Z axis.
    pub fn rotate(angle_radians: f32) -> Self {
        let (sin, cos) = angle_radians.sin_cos();
        let mut t = Self::IDENTITY;
        t.data[0] = cos;
        t.data[1] = -sin;
        t.data[4] = sin;
        t.data[5] = cos;
        t
    }

    pub fn rotate_degrees(angle_degrees: f32) -> Self {
        Self::rotate(angle_degrees.to_radians())
    }

    pub fn scale(s: f32) -> Self {
        Self::scale_xy(s, s)
    }

    pub fn scale_xy(sx: f32, sy: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.data[0] = sx;
        t.data[5] = sy;
        t
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f32 {
        self.data[row * 4 + col]
    }

    /// Compose this transform with another: self * other.
    /// Applies `other` first, then `self`.
    pub fn then(&self, other: &Transform) -> Transform {
        let mut result = [0.0f32; 16];
        for i in 0..4 {
            for j in 0..4 {
                result[i * 4 + j] = (0..4).map(|k| self.at(i, k) * other.at(k, j)).sum();
            }
        }
        Transform { data: result }
    }

    /// Inverse of the affine part, or `None` when the linear block is singular.
    pub fn inverse(&self) -> Option<Transform> {
        let (a, b, c) = (self.at(0, 0), self.at(0, 1), self.at(0, 2));
        let (d, e, f) = (self.at(1, 0), self.at(1, 1), self.at(1, 2));
        let (g, h, i) = (self.at(2, 0), self.at(2, 1), self.at(2, 2));

        let co00 = e * i - f * h;
        let co01 = f * g - d * i;
        let co02 = d * h - e * g;
        let det = a * co00 + b * co01 + c * co02;
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;

        // Inverse of the linear block (adjugate / det).
        let l = [
            [co00 * inv_det, (c * h - b * i) * inv_det, (b * f - c * e) * inv_det],
            [co01 * inv_det, (a * i - c * g) * inv_det, (c * d - a * f) * inv_det],
            [co02 * inv_det, (b * g - a * h) * inv_det, (a * e - b * d) * inv_det],
        ];
        let t = [self.at(0, 3), self.at(1, 3), self.at(2, 3)];

        let mut inv = Self::IDENTITY;
        for row in 0..3 {
            for col in 0..3 {
                inv.data[row * 4 + col] = l[row][col];
            }
            inv.data[row * 4 + 3] = -(l[row][0] * t[0] + l[row][1] * t[1] + l[row][2] * t[2]);
        }
        Some(inv)
    }

    /// Transform a 2D point (z = 0) by this matrix.
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let new_x = self.at(0, 0) * x + self.at(0, 1) * y + self.at(0, 3);
        let new_y = self.at(1, 0) * x + self.at(1, 1) * y + self.at(1, 3);
        (new_x, new_y)
    }

    pub fn transform_point3(&self, p: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0; 3];
        for (row, value) in out.iter_mut().enumerate() {
            *value = self.at(row, 0) * p[0]
                + self.at(row, 1) * p[1]
                + self.at(row, 2) * p[2]
                + self.at(row, 3);
        }
        out
    }

    /// Axis-aligned bounds of `rect` after transformation.
    pub fn transform_rect_bounds(&self, rect: &Rect) -> Rect {
        let mut min = (f32::MAX, f32::MAX);
        let mut max = (f32::MIN, f32::MIN);
        for (x, y) in rect.corners() {
            let (tx, ty) = self.transform_point(x, y);
            min = (min.0.min(tx), min.1.min(ty));
            max = (max.0.max(tx), max.1.max(ty));
        }
        Rect::from_min_max(min.0, min.1, max.0, max.1)
    }

    /// Summed absolute difference over the 3x4 affine block.
    pub fn affine_deviation(&self, other: &Transform) -> f32 {
        self.data[..12]
            .iter()
            .zip(&other.data[..12])
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// Copy with `m22` forced to one so that flat (z-less) matrices stay invertible.
    pub fn with_unit_z(mut self) -> Self {
        self.data[10] = 1.0;
        self
    }

    pub fn translation(&self) -> (f32, f32) {
        (self.at(0, 3), self.at(1, 3))
    }

    pub fn rows(&self) -> [[f32; 4]; 4] {
        [
            [self.data[0], self.data[1], self.data[2], self.data[3]],
            [self.data[4], self.data[5], self.data[6], self.data[7]],
            [self.data[8], self.data[9], self.data[10], self.data[11]],
            [self.data[12], self.data[13], self.data[14], self.data[15]],
        ]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
