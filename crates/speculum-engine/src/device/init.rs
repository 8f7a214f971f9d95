/// Device and window-surface settings for [`WgpuBackend`](super::WgpuBackend).
///
/// Offscreen targets ignore the surface fields: capture faces and offscreen
/// sets are always `Rgba8Unorm` with a `Depth32Float` depth buffer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub power_preference: wgpu::PowerPreference,

    /// Pick an sRGB swapchain format when the surface offers one.
    pub prefer_srgb: bool,

    /// FIFO paces presentation to the display; the scene's frame-rate ceiling
    /// applies on top of it.
    pub present_mode: wgpu::PresentMode,

    /// Falls back to the first supported mode when unsupported.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Cube capture needs no optional features.
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,

    /// Swapchain latency hint.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}
