/// Response chosen after the surface failed to hand out a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; the next frame may render.
    Reconfigured,
    /// Transient error; drop the current frame.
    SkipFrame,
    /// Unrecoverable (commonly out of memory); shut down.
    Fatal,
}
