//! Horizontal/vertical sync timing generation.

/// Display timing in pixel clocks and lines.
///
/// Each line is active, front porch, sync, back porch, in that order; frames
/// follow the same pattern in lines.
#[derive(Debug, Clone, Copy)]
pub struct SyncTiming {
    pub h_active: u32,
    pub h_front_porch: u32,
    pub h_sync: u32,
    pub h_back_porch: u32,
    pub v_active: u32,
    pub v_front_porch: u32,
    pub v_sync: u32,
    pub v_back_porch: u32,
}

impl SyncTiming {
    /// Pixel clocks per line.
    #[must_use]
    pub const fn h_total(&self) -> u32 {
        self.h_active + self.h_front_porch + self.h_sync + self.h_back_porch
    }

    /// Lines per frame.
    #[must_use]
    pub const fn v_total(&self) -> u32 {
        self.v_active + self.v_front_porch + self.v_sync + self.v_back_porch
    }
}

/// Beam counter and sync signal generator.
///
/// Ticked once per pixel clock. The beam starts at the top of the vertical
/// front porch so a full blanking interval elapses before the first active
/// pixel, giving the scan-out engine time to prime its row cache.
#[derive(Debug, Clone)]
pub struct TimingGenerator {
    timing: SyncTiming,
    h: u32,
    v: u32,
    frame_complete: bool,
}

impl TimingGenerator {
    #[must_use]
    pub const fn new(timing: SyncTiming) -> Self {
        Self {
            timing,
            h: 0,
            v: timing.v_active,
            frame_complete: false,
        }
    }

    /// Advance the beam one pixel clock.
    pub fn tick(&mut self) {
        self.h += 1;
        if self.h >= self.timing.h_total() {
            self.h = 0;
            self.v += 1;
            if self.v >= self.timing.v_total() {
                self.v = 0;
                self.frame_complete = true;
            }
        }
    }

    /// In the active region on both axes?
    #[must_use]
    pub const fn data_enable(&self) -> bool {
        self.h < self.timing.h_active && self.v < self.timing.v_active
    }

    #[must_use]
    pub const fn hsync(&self) -> bool {
        let start = self.timing.h_active + self.timing.h_front_porch;
        self.h >= start && self.h < start + self.timing.h_sync
    }

    #[must_use]
    pub const fn vsync(&self) -> bool {
        let start = self.timing.v_active + self.timing.v_front_porch;
        self.v >= start && self.v < start + self.timing.v_sync
    }

    /// Beam x in pixel units (also counts through blanking).
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.h
    }

    /// Beam y in line units (also counts through blanking).
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.v
    }

    pub const fn sync_timing(&self) -> &SyncTiming {
        &self.timing
    }

    /// Has the beam wrapped to the top of the frame? Auto-clears on read.
    pub fn take_frame_complete(&mut self) -> bool {
        let result = self.frame_complete;
        self.frame_complete = false;
        result
    }

    pub fn clear(&mut self) {
        self.h = 0;
        self.v = self.timing.v_active;
        self.frame_complete = false;
    }
}
