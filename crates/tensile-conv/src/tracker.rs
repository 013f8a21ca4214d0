use tensile_core::Shape;

/// Remembers the last-seen input and filter shapes and flags changes.
///
/// Drives the whole caching protocol: descriptors are rebuilt and the
/// algorithm reselected only when one of the two shapes differs from the
/// previous call. Starts empty, so the first observation always reports a
/// change.
#[derive(Debug, Default)]
pub struct ShapeTracker {
    input: Option<Shape>,
    filter: Option<Shape>,
}

impl ShapeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the observed input shape against the cache; update and
    /// report `true` when it differs.
    pub fn observe_input(&mut self, dims: &[usize]) -> bool {
        Self::observe(&mut self.input, dims)
    }

    /// Same as [`observe_input`](Self::observe_input), for the filter.
    pub fn observe_filter(&mut self, dims: &[usize]) -> bool {
        Self::observe(&mut self.filter, dims)
    }

    fn observe(slot: &mut Option<Shape>, dims: &[usize]) -> bool {
        match slot {
            Some(cached) if cached.dims() == dims => false,
            _ => {
                *slot = Some(Shape::new(dims));
                true
            }
        }
    }
}
