//! Search state: one candidate placement of koma occurrences.
//!
//! A [`Unit`] is one occurrence: a single period for a normal koma, a block
//! of adjacent periods for a consecutive one. Unit definitions are shared
//! behind an `Arc`, so cloning a placement only copies positions and the
//! occupancy counters.

use std::sync::Arc;

use types::{Cell, PatternId, PlacedBy, Shortfall, SlotId, TimetableSlot};

use crate::snapshot::{KomaInfo, Snapshot};
use crate::ValidationError;

#[derive(Clone, Debug)]
pub struct Unit {
    pub koma: usize,
    pub len: u8,
    pub fixed: bool,
    pub placed_by: PlacedBy,
    /// Ids of the slots backing this unit, in period order. Empty for
    /// occurrences the solver created.
    pub slot_ids: Vec<SlotId>,
}

#[derive(Clone, Debug)]
pub struct Placement {
    units: Arc<[Unit]>,
    pos: Vec<Option<Cell>>,
    cells: usize,
    teacher_occ: Vec<u16>,
    class_occ: Vec<u16>,
    room_occ: Vec<u16>,
    koma_occ: Vec<u16>,
}

impl Placement {
    fn empty(snap: &Snapshot, units: Vec<Unit>) -> Self {
        let cells = snap.cells();
        Self {
            pos: vec![None; units.len()],
            units: units.into(),
            cells,
            teacher_occ: vec![0; snap.teachers.len() * cells],
            class_occ: vec![0; snap.classes.len() * cells],
            room_occ: vec![0; snap.rooms.len() * cells],
            koma_occ: vec![0; snap.komas.len() * cells],
        }
    }

    /// Fixed slots placed, every remaining occurrence unplaced.
    pub fn for_solver(snap: &Snapshot) -> Self {
        let mut units = Vec::new();
        let mut fixed_cells = Vec::new();
        let mut fixed_periods = vec![0u8; snap.komas.len()];
        for s in &snap.fixed {
            let Some(k) = snap.koma_ix(&s.koma_id) else {
                continue;
            };
            fixed_periods[k] = fixed_periods[k].saturating_add(1);
            units.push(Unit {
                koma: k,
                len: 1,
                fixed: true,
                placed_by: PlacedBy::Fixed,
                slot_ids: vec![s.id.clone()],
            });
            fixed_cells.push(s.cell());
        }
        for (k, info) in snap.komas.iter().enumerate() {
            let remaining = info.count.saturating_sub(fixed_periods[k]);
            let len = info.block_len.max(1);
            for _ in 0..remaining / len {
                units.push(Unit {
                    koma: k,
                    len,
                    fixed: false,
                    placed_by: PlacedBy::Auto,
                    slot_ids: Vec::new(),
                });
            }
            if remaining % len > 0 {
                units.push(Unit {
                    koma: k,
                    len: remaining % len,
                    fixed: false,
                    placed_by: PlacedBy::Auto,
                    slot_ids: Vec::new(),
                });
            }
        }
        let mut p = Self::empty(snap, units);
        for (u, cell) in fixed_cells.into_iter().enumerate() {
            p.place(snap, u, cell);
        }
        p
    }

    /// Rebuilds a placement from displayed slots, e.g. after manual edits.
    /// Adjacent non-fixed slots of a consecutive koma are regrouped into
    /// blocks of at most its block length.
    pub fn from_slots(snap: &Snapshot, slots: &[TimetableSlot]) -> Result<Self, ValidationError> {
        let mut errors = Vec::new();
        let mut loose: Vec<(usize, Cell, &TimetableSlot)> = Vec::new();
        let mut units = Vec::new();
        let mut cells = Vec::new();
        for s in slots {
            let Some(k) = snap.koma_ix(&s.koma_id) else {
                errors.push(format!("slot {} references missing koma {}", s.id, s.koma_id));
                continue;
            };
            if !snap.contains(s.cell()) {
                errors.push(format!("slot {} lies outside the grid", s.id));
                continue;
            }
            if s.is_fixed {
                units.push(Unit {
                    koma: k,
                    len: 1,
                    fixed: true,
                    placed_by: PlacedBy::Fixed,
                    slot_ids: vec![s.id.clone()],
                });
                cells.push(s.cell());
            } else {
                loose.push((k, s.cell(), s));
            }
        }
        if !errors.is_empty() {
            return Err(ValidationError::Msg(errors.join("; ")));
        }

        loose.sort_by(|a, b| (a.0, a.1, &a.2.id).cmp(&(b.0, b.1, &b.2.id)));
        let mut i = 0;
        while i < loose.len() {
            let (k, start, first) = loose[i];
            let max_len = snap.komas[k].block_len.max(1);
            let mut ids = vec![first.id.clone()];
            let mut j = i + 1;
            while j < loose.len() && ids.len() < max_len as usize {
                let (k2, c2, s2) = loose[j];
                let next = Cell::new(start.day_of_week, start.period + ids.len() as u8);
                if k2 != k || c2 != next {
                    break;
                }
                ids.push(s2.id.clone());
                j += 1;
            }
            units.push(Unit {
                koma: k,
                len: ids.len() as u8,
                fixed: false,
                placed_by: first.placed_by,
                slot_ids: ids,
            });
            cells.push(start);
            i = j;
        }

        let mut p = Self::empty(snap, units);
        for (u, cell) in cells.into_iter().enumerate() {
            p.place(snap, u, cell);
        }
        Ok(p)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, u: usize) -> &Unit {
        &self.units[u]
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn pos(&self, u: usize) -> Option<Cell> {
        self.pos[u]
    }

    pub fn is_movable(&self, u: usize) -> bool {
        !self.units[u].fixed
    }

    pub fn placed(&self) -> impl Iterator<Item = (usize, Cell)> + '_ {
        self.pos.iter().enumerate().filter_map(|(u, c)| c.map(|c| (u, c)))
    }

    pub fn on_day(&self, day: u8) -> impl Iterator<Item = (usize, Cell)> + '_ {
        self.placed().filter(move |(_, c)| c.day_of_week == day)
    }

    pub fn unplaced(&self) -> impl Iterator<Item = usize> + '_ {
        self.pos
            .iter()
            .enumerate()
            .filter_map(|(u, c)| c.is_none().then_some(u))
    }

    pub fn unplaced_periods(&self) -> u32 {
        self.unplaced().map(|u| self.units[u].len as u32).sum()
    }

    pub fn placed_periods(&self) -> u32 {
        self.placed().map(|(u, _)| self.units[u].len as u32).sum()
    }

    /// Whether unit `u` occupies `cell`.
    pub fn covers(&self, u: usize, cell: Cell) -> bool {
        match self.pos[u] {
            Some(c) => {
                c.day_of_week == cell.day_of_week
                    && cell.period >= c.period
                    && cell.period < c.period + self.units[u].len
            }
            None => false,
        }
    }

    pub fn teacher_at(&self, snap: &Snapshot, t: usize, cell: Cell) -> u16 {
        self.teacher_occ[t * self.cells + snap.index(cell)]
    }

    pub fn class_at(&self, snap: &Snapshot, c: usize, cell: Cell) -> u16 {
        self.class_occ[c * self.cells + snap.index(cell)]
    }

    pub fn room_at(&self, snap: &Snapshot, r: usize, cell: Cell) -> u16 {
        self.room_occ[r * self.cells + snap.index(cell)]
    }

    pub fn place(&mut self, snap: &Snapshot, u: usize, cell: Cell) {
        debug_assert!(self.pos[u].is_none(), "unit {u} placed twice");
        self.pos[u] = Some(cell);
        self.bump(snap, u, cell, true);
    }

    pub fn lift(&mut self, snap: &Snapshot, u: usize) -> Option<Cell> {
        let cell = self.pos[u].take()?;
        self.bump(snap, u, cell, false);
        Some(cell)
    }

    /// Moves `u` to `to` (or unplaces it) and returns where it was.
    pub fn relocate(&mut self, snap: &Snapshot, u: usize, to: Option<Cell>) -> Option<Cell> {
        let from = self.lift(snap, u);
        if let Some(cell) = to {
            self.place(snap, u, cell);
        }
        from
    }

    fn bump(&mut self, snap: &Snapshot, u: usize, start: Cell, up: bool) {
        let unit = &self.units[u];
        let info = &snap.komas[unit.koma];
        let koma = unit.koma;
        for off in 0..unit.len {
            let cell = Cell::new(start.day_of_week, start.period + off);
            if !snap.contains(cell) {
                continue;
            }
            let i = snap.index(cell);
            let cells = self.cells;
            let adj = |v: &mut u16| {
                if up {
                    *v += 1
                } else {
                    *v -= 1
                }
            };
            for &t in &info.teachers {
                adj(&mut self.teacher_occ[t * cells + i]);
            }
            for &c in &info.classes {
                adj(&mut self.class_occ[c * cells + i]);
            }
            for &r in &info.rooms {
                adj(&mut self.room_occ[r * cells + i]);
            }
            adj(&mut self.koma_occ[koma * cells + i]);
        }
    }

    /// Hard feasibility of putting `u` at `cell`, treating `u` itself and
    /// the units in `ignore` as absent. Soft constraints are not consulted.
    pub fn fits(&self, snap: &Snapshot, u: usize, cell: Cell, ignore: &[usize]) -> bool {
        let unit = &self.units[u];
        if !snap.fits_day(cell, unit.len) {
            return false;
        }
        let info = &snap.komas[unit.koma];
        for off in 0..unit.len {
            let at = Cell::new(cell.day_of_week, cell.period + off);
            let i = snap.index(at);
            // occupancy contributed by the units treated as absent
            let held = |pred: &dyn Fn(usize, &KomaInfo) -> bool| -> u16 {
                std::iter::once(&u)
                    .chain(ignore.iter())
                    .filter(|&&x| {
                        let k = self.units[x].koma;
                        self.covers(x, at) && pred(k, &snap.komas[k])
                    })
                    .count() as u16
            };
            for &t in &info.teachers {
                let teacher = &snap.teachers[t];
                if teacher.unavailable[i] || teacher.on_duty[i] {
                    return false;
                }
                if self.teacher_occ[t * self.cells + i] > held(&|_, k| k.teachers.contains(&t)) {
                    return false;
                }
            }
            for &c in &info.classes {
                if self.class_occ[c * self.cells + i] > held(&|_, k| k.classes.contains(&c)) {
                    return false;
                }
            }
            for &r in &info.rooms {
                if snap.rooms[r].unavailable[i] {
                    return false;
                }
                if self.room_occ[r * self.cells + i] > held(&|_, k| k.rooms.contains(&r)) {
                    return false;
                }
            }
            let koma = unit.koma;
            if self.koma_occ[koma * self.cells + i] > held(&|k, _| k == koma) {
                return false;
            }
        }
        true
    }

    /// Every cell where `u` fits, day-major then period-minor.
    pub fn candidates(&self, snap: &Snapshot, u: usize, ignore: &[usize]) -> Vec<Cell> {
        snap.grid().filter(|&c| self.fits(snap, u, c, ignore)).collect()
    }

    /// Units (other than `u` and `ignore`) that would collide with `u` at `cell`.
    pub fn blockers(&self, snap: &Snapshot, u: usize, cell: Cell) -> Vec<usize> {
        let unit = &self.units[u];
        let info = &snap.komas[unit.koma];
        let mut out = Vec::new();
        for (x, _) in self.on_day(cell.day_of_week) {
            if x == u {
                continue;
            }
            let overlaps = (0..unit.len).any(|off| self.covers(x, Cell::new(cell.day_of_week, cell.period + off)));
            if !overlaps {
                continue;
            }
            let other = &snap.komas[self.units[x].koma];
            let shares = self.units[x].koma == unit.koma
                || other.teachers.iter().any(|t| info.teachers.contains(t))
                || other.classes.iter().any(|c| info.classes.contains(c))
                || other.rooms.iter().any(|r| info.rooms.contains(r));
            if shares {
                out.push(x);
            }
        }
        out
    }

    pub fn shortfalls(&self, snap: &Snapshot) -> Vec<Shortfall> {
        let mut placed = vec![0u32; snap.komas.len()];
        for (u, _) in self.placed() {
            placed[self.units[u].koma] += self.units[u].len as u32;
        }
        snap.komas
            .iter()
            .zip(placed)
            .filter(|(k, n)| *n < k.count as u32)
            .map(|(k, n)| Shortfall {
                koma_id: k.id.clone(),
                required: k.count,
                placed: n as u8,
            })
            .collect()
    }

    /// Flattens placed units into slots, ordered by cell then koma id.
    pub fn to_slots(&self, snap: &Snapshot, pattern: &PatternId) -> Vec<TimetableSlot> {
        let mut out = Vec::with_capacity(self.placed_periods() as usize);
        for (u, cell) in self.placed() {
            let unit = &self.units[u];
            let koma = &snap.komas[unit.koma].id;
            for off in 0..unit.len {
                let at = Cell::new(cell.day_of_week, cell.period + off);
                let id = unit.slot_ids.get(off as usize).cloned().unwrap_or_else(|| {
                    SlotId(format!("{}-{}-{}-{}", pattern, koma, at.day_of_week, at.period))
                });
                out.push(TimetableSlot {
                    id,
                    pattern_id: pattern.clone(),
                    koma_id: koma.clone(),
                    day_of_week: at.day_of_week,
                    period: at.period,
                    placed_by: unit.placed_by,
                    is_fixed: unit.fixed,
                });
            }
        }
        out.sort_by(|a, b| (a.day_of_week, a.period, &a.koma_id).cmp(&(b.day_of_week, b.period, &b.koma_id)));
        out
    }
}
