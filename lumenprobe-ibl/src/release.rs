//! Deferred texture release keyed by submission serial.

use crate::backend::{RenderBackend, TextureHandle};
use crate::error::BackendError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingRelease {
    handle: TextureHandle,
    /// The texture may be freed once this submission has retired.
    after_serial: u64,
}

/// Textures waiting for the GPU to stop referencing them.
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    pending: Vec<PendingRelease>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `handle` for release once the submission currently being
    /// recorded on `backend` has retired.
    pub fn defer(&mut self, backend: &dyn RenderBackend, handle: TextureHandle) {
        let after_serial = backend.last_submitted() + 1;
        log::debug!("Deferring release of {handle} until submission {after_serial}");
        self.pending.push(PendingRelease { handle, after_serial });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.pending.iter().any(|p| p.handle == handle)
    }

    /// Safe point: wait for idle and release every entry whose submission has
    /// retired. Returns how many textures were freed.
    pub fn collect(&mut self, backend: &mut dyn RenderBackend) -> Result<usize, BackendError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let completed = backend.wait_idle()?;

        let mut released = 0;
        let mut kept = Vec::with_capacity(self.pending.len());
        for entry in self.pending.drain(..) {
            if entry.after_serial <= completed {
                backend.release(entry.handle)?;
                released += 1;
            } else {
                kept.push(entry);
            }
        }
        self.pending = kept;
        Ok(released)
    }

    /// Release everything regardless of serials, after a full idle wait.
    pub fn drain_all(&mut self, backend: &mut dyn RenderBackend) -> Result<usize, BackendError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        backend.wait_idle()?;
        let count = self.pending.len();
        for entry in self.pending.drain(..) {
            if backend.is_alive(entry.handle) {
                backend.release(entry.handle)?;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu::CpuBackend;
    use crate::backend::{CubeTextureDesc, ResourceState, SubresourceRange};

    fn used_cube(backend: &mut CpuBackend) -> TextureHandle {
        let handle = backend
            .create_cube_texture(&CubeTextureDesc {
                label: "transient".into(),
                resolution: 2,
                mip_count: 1,
                array_layers: 1,
            })
            .unwrap();
        backend
            .transition(handle, ResourceState::ShaderRead, ResourceState::RenderTarget, SubresourceRange::All)
            .unwrap();
        handle
    }

    #[test]
    fn test_release_waits_until_submission_retires() {
        let mut backend = CpuBackend::new();
        let mut queue = ReleaseQueue::new();
        let handle = used_cube(&mut backend);

        queue.defer(&backend, handle);
        // Still recording the submission that uses it.
        assert_eq!(queue.collect(&mut backend).unwrap(), 0);
        assert!(backend.is_alive(handle));

        backend.submit();
        assert_eq!(queue.collect(&mut backend).unwrap(), 1);
        assert!(!backend.is_alive(handle));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_queue_does_not_wait() {
        let mut backend = CpuBackend::new();
        let mut queue = ReleaseQueue::new();
        queue.collect(&mut backend).unwrap();
        assert_eq!(backend.stats().idle_waits, 0);
    }

    #[test]
    fn test_drain_all_releases_everything() {
        let mut backend = CpuBackend::new();
        let mut queue = ReleaseQueue::new();
        let a = used_cube(&mut backend);
        let b = used_cube(&mut backend);
        backend.submit();
        queue.defer(&backend, a);
        queue.defer(&backend, b);
        assert_eq!(queue.drain_all(&mut backend).unwrap(), 2);
        assert_eq!(backend.live_textures(), 0);
    }
}
