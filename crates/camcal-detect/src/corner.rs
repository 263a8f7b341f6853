use nalgebra::{Point2, Vector2};

/// Raw X-junction candidate before grid assembly.
///
/// `orientation` is the undirected axis (radians, modulo π) pointing along the
/// diagonal of the bright squares meeting at the corner. Adjacent board corners
/// have orientations roughly 90° apart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    pub orientation: f32,
    pub strength: f32,
}

impl Corner {
    /// Unit vector along `orientation`; its sign carries no meaning.
    pub fn axis(&self) -> Vector2<f32> {
        Vector2::new(self.orientation.cos(), self.orientation.sin())
    }
}
