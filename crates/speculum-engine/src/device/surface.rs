use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::RenderError;

use super::{GpuInit, SurfaceErrorAction};

pub(super) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Depth attachment shared by the window surface and offscreen renderbuffers.
pub(super) struct DepthTarget {
    pub(super) view: wgpu::TextureView,
    pub(super) width: u32,
    pub(super) height: u32,
}

impl DepthTarget {
    pub(super) fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            width,
            height,
        }
    }
}

struct AcquiredFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// The window's swapchain plus the depth buffer that goes with it.
///
/// The frame is acquired lazily by the first on-screen pass and held until
/// [`present`](Self::present). The depth buffer follows the configured size and
/// is rebuilt on the first pass after a resize.
pub(super) struct WindowSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    frame: Option<AcquiredFrame>,
    depth: Option<DepthTarget>,
}

impl WindowSurface {
    pub(super) fn configure(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        init: &GpuInit,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format = choose_format(&caps, init.prefer_srgb).context("no supported surface formats")?;
        let alpha_mode = choose_alpha_mode(&caps, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(device, &config);
        log::debug!("surface {}x{} {format:?} {alpha_mode:?}", size.width, size.height);

        Ok(Self {
            surface,
            config,
            size,
            frame: None,
            depth: None,
        })
    }

    #[inline]
    pub(super) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Configured size; keeps the last non-zero size while minimized.
    #[inline]
    pub(super) fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Applies a new drawable size. Zero sizes defer configuration.
    pub(super) fn resize(&mut self, device: &wgpu::Device, new_size: PhysicalSize<u32>) {
        // A frame acquired at the old size must not be presented.
        self.frame = None;
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(device, &self.config);
        self.depth = None;
    }

    /// Acquires the frame and the matching depth buffer if not held yet.
    pub(super) fn acquire(&mut self, device: &wgpu::Device) -> Result<(), RenderError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(RenderError::Surface(SurfaceErrorAction::SkipFrame));
        }
        if self.frame.is_none() {
            let texture = self
                .surface
                .get_current_texture()
                .map_err(|err| RenderError::Surface(self.handle_error(device, err)))?;
            let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.frame = Some(AcquiredFrame { texture, view });
        }
        if self.depth.is_none() {
            let (width, height) = self.size();
            self.depth = Some(DepthTarget::new(device, "speculum surface depth", width, height));
        }
        Ok(())
    }

    /// Color view, depth view and size of the acquired frame.
    pub(super) fn attachments(&self) -> Option<(&wgpu::TextureView, &wgpu::TextureView, (u32, u32))> {
        let frame = self.frame.as_ref()?;
        let depth = self.depth.as_ref()?;
        Some((&frame.view, &depth.view, self.size()))
    }

    pub(super) fn present(&mut self, window: &Window) {
        if let Some(frame) = self.frame.take() {
            window.pre_present_notify();
            drop(frame.view);
            frame.texture.present();
        }
    }

    /// Maps an acquisition error to the action the caller should take,
    /// reconfiguring in place when the swapchain went stale.
    pub(super) fn handle_error(&self, device: &wgpu::Device, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                if self.size.width > 0 && self.size.height > 0 {
                    self.surface.configure(device, &self.config);
                }
                log::debug!("surface {err:?}, reconfigured");
                SurfaceErrorAction::Reconfigured
            }
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
        }
    }
}

fn choose_format(caps: &wgpu::SurfaceCapabilities, prefer_srgb: bool) -> Option<wgpu::TextureFormat> {
    let srgb = [
        wgpu::TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba8UnormSrgb,
    ];
    prefer_srgb
        .then(|| srgb.into_iter().find(|f| caps.formats.contains(f)))
        .flatten()
        .or_else(|| caps.formats.first().copied())
}

fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: &[wgpu::TextureFormat], alpha_modes: &[wgpu::CompositeAlphaMode]) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats: formats.to_vec(),
            alpha_modes: alpha_modes.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn srgb_is_preferred_when_offered() {
        let c = caps(
            &[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb],
            &[],
        );
        assert_eq!(choose_format(&c, true), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn no_formats_means_no_surface() {
        assert_eq!(choose_format(&caps(&[], &[]), true), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back() {
        let c = caps(&[], &[wgpu::CompositeAlphaMode::Opaque]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
        assert_eq!(choose_alpha_mode(&caps(&[], &[]), None), wgpu::CompositeAlphaMode::Auto);
    }
}
