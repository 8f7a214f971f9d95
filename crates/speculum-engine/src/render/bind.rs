use std::ops::{Deref, DerefMut};

use crate::device::{Backend, FramebufferId, ProgramId};

/// Scoped bind state.
///
/// Captures the bound framebuffer and program on creation and restores both on
/// drop, so a render path leaves the context as it found it even when it
/// returns early with an error.
pub struct BindScope<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
}

impl<'a, B: Backend + ?Sized> BindScope<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        let framebuffer = backend.current_framebuffer();
        let program = backend.current_program();
        Self {
            backend,
            framebuffer,
            program,
        }
    }
}

impl<B: Backend + ?Sized> Deref for BindScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: Backend + ?Sized> DerefMut for BindScope<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: Backend + ?Sized> Drop for BindScope<'_, B> {
    fn drop(&mut self) {
        if self.backend.current_framebuffer() != self.framebuffer {
            self.backend.bind_framebuffer(self.framebuffer);
        }
        if self.backend.current_program() != self.program {
            self.backend.use_program(self.program);
        }
    }
}
