use asd_geometry::Orientation;

/// One video frame as handed to `ASDEngine::update`.
pub struct Frame<'a> {
    pub pixel_buffer: &'a [u8],
    pub source_width: usize,
    pub source_height: usize,
    pub timestamp: f64,
    pub orientation: Orientation,
    pub mirrored: bool,
    pub drop_frame: bool,
}
