// Start button latch shared between an interrupt-like producer and the behavior step
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Edge-triggered button flag.
///
/// The producer (interrupt handler, keyboard thread, simulator) calls [`press`],
/// the Idle state consumes it with [`take`]. `take` is a single atomic swap so a
/// press landing between two scheduler passes is never lost or seen twice.
///
/// [`press`]: ButtonLatch::press
/// [`take`]: ButtonLatch::take
#[derive(Debug, Clone, Default)]
pub struct ButtonLatch {
    pressed: Arc<AtomicBool>,
}

impl ButtonLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.pressed.store(true, Ordering::Release);
    }

    /// Read and clear
    pub fn take(&self) -> bool {
        self.pressed.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }
}
