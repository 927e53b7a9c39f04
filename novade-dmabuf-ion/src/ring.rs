//! Fixed pool of buffers cycled between the client and the compositor.
//!
//! A slot moves `Free -> Drawing -> Posted -> Free`. The last edge is taken only
//! when the compositor releases the buffer. The pool size is part of the contract
//! with the compositor: if it holds every buffer at once, no slot can be acquired.

use std::fmt;

use tracing::{debug, warn};

use crate::error::PoolError;

/// Buffers per window.
pub const POOL_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Free,
    /// Acquired for the frame being rendered.
    Drawing,
    /// Attached to the surface; the compositor owns it until release.
    Posted,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Free => f.write_str("free"),
            SlotState::Drawing => f.write_str("drawing"),
            SlotState::Posted => f.write_str("posted"),
        }
    }
}

#[derive(Debug)]
struct Slot<B> {
    buffer: B,
    state: SlotState,
}

/// `N` buffers and their presentation state.
#[derive(Debug)]
pub struct PresentationRing<B, const N: usize = POOL_SIZE> {
    slots: [Slot<B>; N],
}

impl<B, const N: usize> PresentationRing<B, N> {
    /// Builds every slot with `make(index)`, all starting out free.
    ///
    /// Either all `N` buffers are built or none is kept: on the first error the
    /// buffers built so far are dropped and the error is returned.
    pub fn try_new<E>(mut make: impl FnMut(usize) -> Result<B, E>) -> Result<Self, E> {
        let mut slots = Vec::with_capacity(N);
        for index in 0..N {
            slots.push(Slot {
                buffer: make(index)?,
                state: SlotState::Free,
            });
        }
        let slots: [Slot<B>; N] = match slots.try_into() {
            Ok(slots) => slots,
            Err(_) => unreachable!("exactly N slots were pushed"),
        };
        Ok(Self { slots })
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Claims the first free slot for drawing.
    pub fn acquire(&mut self) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.state == SlotState::Free)?;
        self.slots[index].state = SlotState::Drawing;
        debug!(slot = index, "Acquired buffer slot");
        Some(index)
    }

    /// Marks a drawn slot as handed to the compositor.
    pub fn post(&mut self, index: usize) -> Result<(), PoolError> {
        self.transition(index, SlotState::Drawing, SlotState::Posted)
    }

    /// Returns a slot that was acquired but never posted.
    pub fn cancel(&mut self, index: usize) -> Result<(), PoolError> {
        self.transition(index, SlotState::Drawing, SlotState::Free)
    }

    /// Handles a release from the compositor.
    ///
    /// Returns `false`, and changes nothing, if the slot was not posted.
    pub fn release(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.state == SlotState::Posted => {
                slot.state = SlotState::Free;
                debug!(slot = index, "Buffer released by compositor");
                true
            }
            Some(slot) => {
                warn!(slot = index, state = %slot.state, "Release for a buffer that is not posted");
                false
            }
            None => {
                warn!(slot = index, "Release for an unknown buffer slot");
                false
            }
        }
    }

    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|slot| slot.state)
    }

    pub fn free_count(&self) -> usize {
        self.count(SlotState::Free)
    }

    pub fn posted_count(&self) -> usize {
        self.count(SlotState::Posted)
    }

    pub fn buffer(&self, index: usize) -> Option<&B> {
        self.slots.get(index).map(|slot| &slot.buffer)
    }

    pub fn buffer_mut(&mut self, index: usize) -> Option<&mut B> {
        self.slots.get_mut(index).map(|slot| &mut slot.buffer)
    }

    /// Buffers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &B> {
        self.slots.iter().map(|slot| &slot.buffer)
    }

    fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|slot| slot.state == state).count()
    }

    fn transition(&mut self, index: usize, from: SlotState, to: SlotState) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(PoolError::SlotOutOfRange(index))?;
        if slot.state != from {
            return Err(PoolError::InvalidTransition {
                slot: index,
                from: slot.state,
                to,
            });
        }
        slot.state = to;
        debug!(slot = index, %from, %to, "Buffer slot transition");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ring() -> PresentationRing<usize> {
        PresentationRing::try_new(|i| Ok::<_, ()>(i * 10)).unwrap()
    }

    #[test]
    fn test_new_ring_is_all_free() {
        let ring = ring();
        assert_eq!(ring.len(), POOL_SIZE);
        assert_eq!(ring.free_count(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    #[test]
    fn test_construction_failure_keeps_no_partial_pool() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Tracked(Rc<RefCell<Vec<usize>>>, usize);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.borrow_mut().push(self.1);
            }
        }

        let dropped = Rc::new(RefCell::new(Vec::new()));
        let result: Result<PresentationRing<Tracked>, &str> = PresentationRing::try_new(|i| {
            if i == 2 {
                Err("third buffer failed")
            } else {
                Ok(Tracked(Rc::clone(&dropped), i))
            }
        });
        assert_eq!(result.err(), Some("third buffer failed"));
        assert_eq!(*dropped.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_acquire_picks_first_free_slot() {
        let mut ring = ring();
        assert_eq!(ring.acquire(), Some(0));
        ring.post(0).unwrap();
        assert_eq!(ring.acquire(), Some(1));
        ring.post(1).unwrap();
        assert!(ring.release(0));
        assert_eq!(ring.acquire(), Some(0));
    }

    #[test]
    fn test_exhaustion_after_pool_size_posts() {
        let mut ring = ring();
        for expected in 0..POOL_SIZE {
            let slot = ring.acquire().unwrap();
            assert_eq!(slot, expected);
            ring.post(slot).unwrap();
        }
        assert_eq!(ring.posted_count(), 3);
        assert_eq!(ring.acquire(), None);
    }

    #[test]
    fn test_release_of_unposted_slot_is_ignored() {
        let mut ring = ring();
        assert!(!ring.release(1));
        ring.acquire();
        assert!(!ring.release(0));
        assert_eq!(ring.state(0), Some(SlotState::Drawing));
        assert!(!ring.release(99));
    }

    #[test]
    fn test_post_requires_drawing() {
        let mut ring = ring();
        assert_eq!(
            ring.post(2),
            Err(PoolError::InvalidTransition {
                slot: 2,
                from: SlotState::Free,
                to: SlotState::Posted
            })
        );
        assert_eq!(ring.post(7), Err(PoolError::SlotOutOfRange(7)));
    }

    #[test]
    fn test_cancel_returns_slot_to_free() {
        let mut ring = ring();
        let slot = ring.acquire().unwrap();
        ring.cancel(slot).unwrap();
        assert_eq!(ring.state(slot), Some(SlotState::Free));
        assert!(ring.cancel(slot).is_err());
    }

    #[test]
    fn test_custom_pool_size() {
        let mut ring: PresentationRing<u8, 2> = PresentationRing::try_new(|i| Ok::<_, ()>(i as u8)).unwrap();
        assert_eq!(ring.len(), 2);
        ring.acquire();
        ring.acquire();
        assert_eq!(ring.acquire(), None);
        *ring.buffer_mut(1).unwrap() = 9;
        assert_eq!(ring.buffer(1), Some(&9));
    }
}
