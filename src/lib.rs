//! # certforge – health certificates rendered onto a fixed PDF template
//!
//! Certificate records are kept in a record store together with their
//! uploaded photo and verification QR code. A record is turned into a
//! single-page PDF by overlaying its fields on a designed template. The
//! rendering stages are:
//!
//! 1. **Fetch** – template, fonts and images through an asset source ([`assets`])
//! 2. **Normalise** – images to embeddable PNG/JPEG ([`normalize`])
//! 3. **Shape** – text measured with the embedded fonts ([`fonts`])
//! 4. **Composite** – right-aligned text and fixed image rectangles on the
//!    template page via lopdf ([`render`], [`layout_config`])
//! 5. **Deliver** – a run-once, stage-tracked compositor ([`pipeline`])
//!
//! Records, uploads and the create/delete flows live in [`store`].

pub mod assets;
pub mod config;
pub mod error;
pub mod fonts;
pub mod layout_config;
pub mod normalize;
pub mod pipeline;
pub mod qr;
pub mod record;
pub mod render;
pub mod store;
pub mod templates;

#[cfg(test)]
#[path = "../tests/common/synth_font.rs"]
pub(crate) mod synth_font;

// Re-exports for convenience
pub use error::{FetchError, ImageDecodeError, RenderError, StoreError};
pub use pipeline::{Compositor, RenderOutput, RunOutcome};
pub use record::{Authority, CertificateRecord, RecordPatch};
pub use render::render;
