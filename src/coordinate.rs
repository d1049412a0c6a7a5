use serde::{Deserialize, Serialize};

/// World a coordinate belongs to. Chest ownership is tracked per dimension,
/// so the dimension is part of the coordinate key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Nether,
    Overworld,
    End,
}

impl Dimension {
    /// Maps the wire-level dimension id. Unknown ids collapse to the
    /// overworld, matching how the upstream server treats them.
    pub fn from_id(id: i32) -> Self {
        match id {
            -1 => Dimension::Nether,
            1 => Dimension::End,
            _ => Dimension::Overworld,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Dimension::Nether => -1,
            Dimension::Overworld => 0,
            Dimension::End => 1,
        }
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Dimension::Overworld
    }
}

/// Absolute block position, as carried by dig/place/block-change packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i8,
    pub z: i32,
    pub dimension: Dimension,
}

impl Coordinate {
    pub fn new(x: i32, y: i8, z: i32, dimension: Dimension) -> Self {
        Self { x, y, z, dimension }
    }

    /// The block touching the given face, using the wire face encoding
    /// (0/1 = -y/+y, 2/3 = -z/+z, 4/5 = -x/+x). Any other face value
    /// leaves the coordinate unchanged.
    pub fn offset_face(self, face: i8) -> Self {
        let mut target = self;
        match face {
            0 => target.y = target.y.wrapping_sub(1),
            1 => target.y = target.y.wrapping_add(1),
            2 => target.z -= 1,
            3 => target.z += 1,
            4 => target.x -= 1,
            5 => target.x += 1,
            _ => {}
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_offsets() {
        let base = Coordinate::new(10, 64, -20, Dimension::Overworld);
        assert_eq!(base.offset_face(1).y, 65);
        assert_eq!(base.offset_face(0).y, 63);
        assert_eq!(base.offset_face(4).x, 9);
        assert_eq!(base.offset_face(5).x, 11);
        assert_eq!(base.offset_face(2).z, -21);
        assert_eq!(base.offset_face(3).z, -19);
        assert_eq!(base.offset_face(-1), base);
    }
}
