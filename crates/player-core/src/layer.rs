//! Video layer selection.
//!
//! A publisher either encodes with scalable video coding (several decodable
//! layers) or publishes a single layer. [`resolve_layer`] maps the viewer's
//! request onto what the publisher can actually offer; [`LayerSelector`]
//! keeps the per-session request and decides when a live switch is needed.

use serde::{Deserialize, Serialize};

/// Requested or effective video quality layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoLayer {
    /// Let the pipeline pick by bandwidth and render size.
    #[default]
    Auto,
    /// Lowest quality layer.
    Base,
    /// Full quality layer.
    Standard,
}

impl VideoLayer {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            VideoLayer::Auto => "auto",
            VideoLayer::Base => "base",
            VideoLayer::Standard => "standard",
        }
    }
}

/// Publisher capability advertised when a connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvcCapability {
    SvcEnabled,
    SingleLayer,
}

impl SvcCapability {
    #[must_use]
    pub const fn from_svc_flag(svc: bool) -> Self {
        if svc {
            SvcCapability::SvcEnabled
        } else {
            SvcCapability::SingleLayer
        }
    }
}

/// Resolve a requested layer against the publisher's capability.
///
/// Single-layer publishers always resolve to [`VideoLayer::Standard`].
/// With SVC the request is honored as-is; `Auto` stays `Auto` and the
/// pipeline picks the concrete layer.
#[must_use]
pub const fn resolve_layer(requested: VideoLayer, capability: SvcCapability) -> VideoLayer {
    match capability {
        SvcCapability::SingleLayer => VideoLayer::Standard,
        SvcCapability::SvcEnabled => requested,
    }
}

/// Per-session layer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSelector {
    requested: VideoLayer,
    capability: Option<SvcCapability>,
    effective: Option<VideoLayer>,
    /// Concrete layer most recently chosen by the pipeline while in `Auto`.
    heuristic: Option<VideoLayer>,
}

impl LayerSelector {
    #[must_use]
    pub fn new(requested: VideoLayer) -> Self {
        Self {
            requested,
            capability: None,
            effective: None,
            heuristic: None,
        }
    }

    #[must_use]
    pub fn requested(&self) -> VideoLayer {
        self.requested
    }

    /// Effective layer, or `None` before the publisher capability is known.
    #[must_use]
    pub fn effective(&self) -> Option<VideoLayer> {
        self.effective
    }

    #[must_use]
    pub fn capability(&self) -> Option<SvcCapability> {
        self.capability
    }

    /// Layer the pipeline is actually decoding, when it has told us.
    #[must_use]
    pub fn decoding(&self) -> Option<VideoLayer> {
        match self.effective {
            Some(VideoLayer::Auto) => self.heuristic,
            other => other,
        }
    }

    /// Record the publisher capability for a fresh connection.
    ///
    /// Returns the effective layer for that connection.
    pub fn on_connected(&mut self, capability: SvcCapability) -> VideoLayer {
        let effective = resolve_layer(self.requested, capability);
        self.capability = Some(capability);
        self.effective = Some(effective);
        self.heuristic = None;
        effective
    }

    /// Record a layer chosen by the pipeline's `Auto` heuristic.
    ///
    /// Ignored unless the session is currently in `Auto` over SVC.
    pub fn on_heuristic_switch(&mut self, layer: VideoLayer) -> bool {
        if self.effective == Some(VideoLayer::Auto) && layer != VideoLayer::Auto {
            self.heuristic = Some(layer);
            return true;
        }
        false
    }

    /// Apply a new request.
    ///
    /// Returns the layer to send to the pipeline when a live switch is
    /// needed, or `None` when the request is stored only (capability not yet
    /// known) or does not change the effective layer.
    pub fn request(&mut self, layer: VideoLayer) -> Option<VideoLayer> {
        self.requested = layer;
        let capability = self.capability?;
        let effective = resolve_layer(layer, capability);
        if self.effective == Some(effective) {
            return None;
        }
        self.effective = Some(effective);
        self.heuristic = None;
        Some(effective)
    }
}

impl Default for LayerSelector {
    fn default() -> Self {
        Self::new(VideoLayer::Auto)
    }
}
