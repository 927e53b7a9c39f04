//! Per-frame payload: pick a free slot, paint the next ramp colour, post it.

use tracing::{error, trace};

use crate::error::{FrameError, ImportError, PoolError};
use crate::ring::PresentationRing;

/// Ramp steps from one end to the other. At 60Hz a full cycle takes 6 seconds.
pub const RAMP_STEPS: u32 = 180;

/// Something a frame can be drawn into.
pub trait FrameTarget {
    /// Clears the whole target to `rgba` and waits for the draw to complete.
    fn fill(&mut self, rgba: [f32; 4]) -> Result<(), ImportError>;
}

/// Triangle wave over `0..=RAMP_STEPS`, one step per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ramp {
    step: u32,
    rising: bool,
}

impl Default for Ramp {
    fn default() -> Self {
        Self {
            step: 0,
            rising: true,
        }
    }
}

impl Ramp {
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn is_rising(&self) -> bool {
        self.rising
    }

    /// Moves one step and reverses direction on reaching either end.
    pub fn advance(&mut self) -> u32 {
        if self.rising {
            self.step += 1;
        } else {
            self.step -= 1;
        }
        if self.step == 0 || self.step == RAMP_STEPS {
            self.rising = !self.rising;
        }
        self.step
    }

    /// Clear colour for the current step: green rises as blue falls.
    pub fn color(&self) -> [f32; 4] {
        let t = self.step as f32 / RAMP_STEPS as f32;
        [0.0, t, 1.0 - t, 1.0]
    }
}

/// Draws the next frame into the first free slot and marks it posted.
///
/// `first_frame` only selects the diagnostic for an exhausted pool. A failed
/// draw hands the slot back before returning the error.
pub fn render_next_frame<B: FrameTarget, const N: usize>(
    ring: &mut PresentationRing<B, N>,
    ramp: &mut Ramp,
    first_frame: bool,
) -> Result<usize, FrameError> {
    let Some(slot) = ring.acquire() else {
        let err = PoolError::Exhausted { first_frame };
        error!("{}", err);
        return Err(err.into());
    };

    ramp.advance();
    let color = ramp.color();
    let drawn = match ring.buffer_mut(slot) {
        Some(buffer) => buffer.fill(color),
        None => Err(ImportError::Render(format!("slot {} has no buffer", slot))),
    };
    if let Err(err) = drawn {
        error!("Failed to draw frame into slot {}: {}", slot, err);
        ring.cancel(slot)?;
        return Err(err.into());
    }

    ring.post(slot)?;
    trace!(slot, step = ramp.step(), "Frame posted");
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{SlotState, POOL_SIZE};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Canvas {
        colors: Vec<[f32; 4]>,
        broken: bool,
    }

    impl FrameTarget for Canvas {
        fn fill(&mut self, rgba: [f32; 4]) -> Result<(), ImportError> {
            if self.broken {
                return Err(ImportError::Render("broken canvas".to_string()));
            }
            self.colors.push(rgba);
            Ok(())
        }
    }

    fn ring() -> PresentationRing<Canvas> {
        PresentationRing::try_new(|_| Ok::<_, ()>(Canvas::default())).unwrap()
    }

    #[test]
    fn test_ramp_is_a_reflected_triangle_wave() {
        let mut ramp = Ramp::default();
        let steps: Vec<u32> = (0..720).map(|_| ramp.advance()).collect();

        assert!(steps.iter().all(|&s| s <= RAMP_STEPS));
        assert_eq!(steps[0], 1);
        assert_eq!(steps[179], 180);
        assert_eq!(steps[180], 179);
        assert_eq!(steps[359], 0);
        assert_eq!(steps[360], 1);
        for pair in steps.windows(2) {
            assert_eq!(pair[0].abs_diff(pair[1]), 1);
        }
        // Period of 360 steps.
        assert_eq!(&steps[..360], &steps[360..]);
    }

    #[test]
    fn test_ramp_direction_flips_at_the_extremes() {
        let mut ramp = Ramp::default();
        for _ in 0..179 {
            ramp.advance();
        }
        assert!(ramp.is_rising());
        ramp.advance();
        assert_eq!(ramp.step(), RAMP_STEPS);
        assert!(!ramp.is_rising());
        for _ in 0..180 {
            ramp.advance();
        }
        assert_eq!(ramp.step(), 0);
        assert!(ramp.is_rising());
    }

    #[test]
    fn test_ramp_colors_at_the_ends() {
        let mut ramp = Ramp::default();
        assert_eq!(ramp.color(), [0.0, 0.0, 1.0, 1.0]);
        for _ in 0..RAMP_STEPS {
            ramp.advance();
        }
        assert_eq!(ramp.color(), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_frame_posts_first_free_slot_with_next_color() {
        let mut ring = ring();
        let mut ramp = Ramp::default();

        let slot = render_next_frame(&mut ring, &mut ramp, true).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(ring.state(0), Some(SlotState::Posted));
        let expected = [0.0, 1.0 / 180.0, 1.0 - 1.0 / 180.0, 1.0];
        assert_eq!(ring.buffer(0).unwrap().colors, vec![expected]);
    }

    #[test]
    fn test_exhausted_pool_reports_first_frame_or_steady_state() {
        let mut ring = ring();
        let mut ramp = Ramp::default();
        for _ in 0..POOL_SIZE {
            render_next_frame(&mut ring, &mut ramp, false).unwrap();
        }

        let err = render_next_frame(&mut ring, &mut ramp, false).unwrap_err();
        assert!(matches!(err, FrameError::Pool(PoolError::Exhausted { first_frame: false })));
        let err = render_next_frame(&mut ring, &mut ramp, true).unwrap_err();
        assert!(matches!(err, FrameError::Pool(PoolError::Exhausted { first_frame: true })));
        // The ramp does not move when no frame is drawn.
        assert_eq!(ramp.step(), 3);
    }

    #[test]
    fn test_failed_draw_returns_the_slot() {
        let mut ring: PresentationRing<Canvas> = PresentationRing::try_new(|i| {
            Ok::<_, ()>(Canvas {
                broken: i == 0,
                ..Canvas::default()
            })
        })
        .unwrap();
        let mut ramp = Ramp::default();

        let err = render_next_frame(&mut ring, &mut ramp, true).unwrap_err();
        assert!(matches!(err, FrameError::Import(ImportError::Render(_))));
        assert_eq!(ring.state(0), Some(SlotState::Free));
        assert_eq!(ring.free_count(), POOL_SIZE);
    }
}
