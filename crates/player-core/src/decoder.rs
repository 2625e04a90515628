//! Process-wide decoder settings.
//!
//! The manager owns the current value. A session copies it when it begins
//! decoding and keeps that copy until it is explicitly restarted, so toggling
//! a flag never alters a stream that is already decoding.

use serde::{Deserialize, Serialize};

/// Global decoder flags handed to the pipeline on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderSettings {
    /// Use the platform hardware decoder when available.
    pub hardware_decode: bool,
    /// Verify picture order count (frame order) while decoding.
    pub check_poc: bool,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            hardware_decode: false,
            check_poc: true,
        }
    }
}

impl DecoderSettings {
    #[must_use]
    pub fn with_hardware_decode(self, enable: bool) -> Self {
        Self {
            hardware_decode: enable,
            ..self
        }
    }

    #[must_use]
    pub fn with_check_poc(self, enable: bool) -> Self {
        Self {
            check_poc: enable,
            ..self
        }
    }
}
