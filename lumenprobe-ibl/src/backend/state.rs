use super::{ResourceState, SubresourceRange, TextureHandle};
use crate::error::BackendError;

/// Per-subresource state table for one texture.
///
/// Subresources are addressed by (slice, face, mip). 2D textures use a
/// single slice with a single face.
#[derive(Clone, Debug)]
pub struct SubresourceStates {
    slices: u32,
    faces: u32,
    mips: u32,
    states: Vec<ResourceState>,
}

impl SubresourceStates {
    pub fn new(slices: u32, faces: u32, mips: u32, initial: ResourceState) -> Self {
        Self {
            slices,
            faces,
            mips,
            states: vec![initial; (slices * faces * mips) as usize],
        }
    }

    fn index(&self, slice: u32, face: u32, mip: u32) -> usize {
        (((slice * self.faces) + face) * self.mips + mip) as usize
    }

    pub fn get(&self, slice: u32, face: u32, mip: u32) -> Option<ResourceState> {
        if slice >= self.slices || face >= self.faces || mip >= self.mips {
            return None;
        }
        Some(self.states[self.index(slice, face, mip)])
    }

    fn covered(&self, range: SubresourceRange) -> Result<Vec<(u32, u32, u32)>, String> {
        let (slices, faces, mips) = match range {
            SubresourceRange::All => (0..self.slices, 0..self.faces, 0..self.mips),
            SubresourceRange::Slice(s) => (s..s + 1, 0..self.faces, 0..self.mips),
            SubresourceRange::Face { slice, face } => (slice..slice + 1, face..face + 1, 0..self.mips),
            SubresourceRange::Mip { slice, level } => (slice..slice + 1, 0..self.faces, level..level + 1),
        };
        if slices.end > self.slices || faces.end > self.faces || mips.end > self.mips {
            return Err(format!(
                "{range:?} exceeds {} slices x {} faces x {} mips",
                self.slices, self.faces, self.mips
            ));
        }

        let mut out = Vec::new();
        for slice in slices {
            for face in faces.clone() {
                for mip in mips.clone() {
                    out.push((slice, face, mip));
                }
            }
        }
        Ok(out)
    }

    /// Move every subresource in `range` from `from` to `to`. Fails without
    /// modifying anything if any of them is not currently in `from`.
    pub fn transition(
        &mut self,
        handle: TextureHandle,
        from: ResourceState,
        to: ResourceState,
        range: SubresourceRange,
    ) -> Result<(), BackendError> {
        let covered = self.covered(range).map_err(BackendError::InvalidTarget)?;
        for &(slice, face, mip) in &covered {
            let actual = self.states[self.index(slice, face, mip)];
            if actual != from {
                return Err(BackendError::InvalidState {
                    handle,
                    slice,
                    face,
                    mip,
                    expected: from,
                    actual,
                });
            }
        }
        for (slice, face, mip) in covered {
            let index = self.index(slice, face, mip);
            self.states[index] = to;
        }
        Ok(())
    }

    /// Check a single subresource.
    pub fn expect(
        &self,
        handle: TextureHandle,
        slice: u32,
        face: u32,
        mip: u32,
        expected: ResourceState,
    ) -> Result<(), BackendError> {
        let actual = self.get(slice, face, mip).ok_or_else(|| {
            BackendError::InvalidTarget(format!(
                "{handle} has no slice {slice} face {face} mip {mip}"
            ))
        })?;
        if actual != expected {
            return Err(BackendError::InvalidState {
                handle,
                slice,
                face,
                mip,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check every subresource in `range`.
    pub fn expect_range(
        &self,
        handle: TextureHandle,
        range: SubresourceRange,
        expected: ResourceState,
    ) -> Result<(), BackendError> {
        let covered = self.covered(range).map_err(BackendError::InvalidTarget)?;
        for (slice, face, mip) in covered {
            self.expect(handle, slice, face, mip, expected)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: TextureHandle = TextureHandle(7);

    #[test]
    fn test_mip_transition_only_touches_one_level() {
        let mut states = SubresourceStates::new(1, 6, 3, ResourceState::ShaderRead);
        states
            .transition(H, ResourceState::ShaderRead, ResourceState::RenderTarget, SubresourceRange::All)
            .unwrap();
        states
            .transition(
                H,
                ResourceState::RenderTarget,
                ResourceState::ShaderRead,
                SubresourceRange::Mip { slice: 0, level: 1 },
            )
            .unwrap();

        for face in 0..6 {
            assert_eq!(states.get(0, face, 0), Some(ResourceState::RenderTarget));
            assert_eq!(states.get(0, face, 1), Some(ResourceState::ShaderRead));
            assert_eq!(states.get(0, face, 2), Some(ResourceState::RenderTarget));
        }
    }

    #[test]
    fn test_mismatched_from_state_is_rejected_atomically() {
        let mut states = SubresourceStates::new(2, 6, 1, ResourceState::ShaderRead);
        states
            .transition(
                H,
                ResourceState::ShaderRead,
                ResourceState::RenderTarget,
                SubresourceRange::Face { slice: 1, face: 2 },
            )
            .unwrap();

        let err = states
            .transition(H, ResourceState::ShaderRead, ResourceState::RenderTarget, SubresourceRange::Slice(1))
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidState { slice: 1, face: 2, .. }));
        // Nothing else moved.
        assert_eq!(states.get(1, 0, 0), Some(ResourceState::ShaderRead));
    }

    #[test]
    fn test_out_of_range_is_invalid_target() {
        let mut states = SubresourceStates::new(1, 6, 2, ResourceState::ShaderRead);
        let err = states
            .transition(
                H,
                ResourceState::ShaderRead,
                ResourceState::RenderTarget,
                SubresourceRange::Mip { slice: 0, level: 2 },
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidTarget(_)));
        assert!(states.expect(H, 3, 0, 0, ResourceState::ShaderRead).is_err());
    }
}
