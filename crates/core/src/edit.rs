//! Applying [`SlotMove`]s to a displayed slot list.
//!
//! A move either applies completely or leaves the slots untouched; its
//! [`SlotMove::inverse`] undoes it.

use thiserror::Error;
use types::{Cell, PlacedBy, SlotId, SlotMove, TimetableSlot};

use crate::snapshot::Snapshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("slot {0} not found")]
    UnknownSlot(SlotId),
    #[error("slot {0} is fixed")]
    Fixed(SlotId),
    #[error("slot {slot} is not at {expected}")]
    Moved { slot: SlotId, expected: Cell },
    #[error("slot {slot} does not belong to koma {koma}")]
    WrongKoma { slot: SlotId, koma: String },
    #[error("move of length {length} does not fit at {to}")]
    OffGrid { length: u8, to: Cell },
    #[error("move lists {ids} slots but has length {length}")]
    Length { ids: usize, length: u8 },
}

/// Checks that `mv` can be applied to `slots` and returns the slot
/// positions it touches, in block order.
pub fn check_move(snap: &Snapshot, slots: &[TimetableSlot], mv: &SlotMove) -> Result<Vec<usize>, EditError> {
    if mv.slot_ids.len() != mv.length as usize || mv.length == 0 {
        return Err(EditError::Length {
            ids: mv.slot_ids.len(),
            length: mv.length,
        });
    }
    if !snap.fits_day(mv.to, mv.length) {
        return Err(EditError::OffGrid {
            length: mv.length,
            to: mv.to,
        });
    }
    let mut found = Vec::with_capacity(mv.slot_ids.len());
    for (off, id) in mv.slot_ids.iter().enumerate() {
        let i = slots
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| EditError::UnknownSlot(id.clone()))?;
        let s = &slots[i];
        if s.is_fixed {
            return Err(EditError::Fixed(id.clone()));
        }
        if s.koma_id != mv.koma_id {
            return Err(EditError::WrongKoma {
                slot: id.clone(),
                koma: mv.koma_id.0.clone(),
            });
        }
        let expected = Cell::new(mv.from.day_of_week, mv.from.period + off as u8);
        if s.cell() != expected {
            return Err(EditError::Moved {
                slot: id.clone(),
                expected,
            });
        }
        found.push(i);
    }
    Ok(found)
}

pub fn apply_move(snap: &Snapshot, slots: &mut [TimetableSlot], mv: &SlotMove) -> Result<(), EditError> {
    let found = check_move(snap, slots, mv)?;
    for (off, i) in found.into_iter().enumerate() {
        let s = &mut slots[i];
        s.day_of_week = mv.to.day_of_week;
        s.period = mv.to.period + off as u8;
        s.placed_by = PlacedBy::Manual;
    }
    Ok(())
}

/// Applies a chain of moves in order; on error nothing is changed.
pub fn apply_moves(snap: &Snapshot, slots: &mut Vec<TimetableSlot>, moves: &[SlotMove]) -> Result<(), EditError> {
    let mut scratch = slots.clone();
    for mv in moves {
        apply_move(snap, &mut scratch, mv)?;
    }
    *slots = scratch;
    Ok(())
}
