//! Pixel-stage uid: framebuffer copy conversion state.

use super::{UidData, UidReader, UidWriter};
use crate::driver::ShaderStage;
use crate::state::CopyState;

/// Fields that fully determine the pixel-stage source.
///
/// Layout: `copy_format: u8`, then one flag byte (`bit0` depth copy,
/// `bit1` intensity, `bit2` scale by half, `bit3` framebuffer has alpha).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelUidData {
    /// Raw format selector, interpreted per copy mode.
    pub copy_format: u8,
    pub is_depth_copy: bool,
    pub is_intensity: bool,
    pub scale_by_half: bool,
    pub efb_has_alpha: bool,
}

impl PixelUidData {
    /// Canonical uid data for a copy state.
    ///
    /// Depth copies never go through the intensity conversion and never
    /// read alpha, so both flags are cleared for them.
    #[must_use]
    pub fn from_state(state: &CopyState) -> Self {
        Self {
            copy_format: state.format,
            is_depth_copy: state.is_depth_copy,
            is_intensity: state.is_intensity && !state.is_depth_copy,
            scale_by_half: state.scale_by_half,
            efb_has_alpha: state.efb_has_alpha && !state.is_depth_copy,
        }
    }
}

impl UidData for PixelUidData {
    const STAGE: ShaderStage = ShaderStage::Pixel;

    fn write(&self, w: &mut UidWriter) {
        w.u8(self.copy_format);
        w.flags(&[
            self.is_depth_copy,
            self.is_intensity,
            self.scale_by_half,
            self.efb_has_alpha,
        ]);
    }

    fn read(r: &mut UidReader<'_>) -> Option<Self> {
        let copy_format = r.u8()?;
        let [is_depth_copy, is_intensity, scale_by_half, efb_has_alpha] = r.flags::<4>()?;
        Some(Self {
            copy_format,
            is_depth_copy,
            is_intensity,
            scale_by_half,
            efb_has_alpha,
        })
    }
}
