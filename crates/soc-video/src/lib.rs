//! Video scan-out.
//!
//! A timing generator produces hsync/vsync/data-enable at the pixel clock;
//! the scan-out engine expands a bit-packed framebuffer to the output
//! resolution, prefetching one input row of words into an on-chip cache
//! during the blanking interval before that row block renders. Every active
//! pixel is served from the cache in the cycle it is due.

mod scanout;
mod timing;

pub use scanout::{FramebufferScanout, VideoConfig};
pub use timing::{SyncTiming, TimingGenerator};
