//! Step grids, pattern memory slots, channel volumes and mute/solo state.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::drums::{DrumKit, DrumType};
use crate::error::{Result, RositaError};
use crate::instrument::{InstrumentId, InstrumentParams, InstrumentRegistry};
use crate::note::{Scale, row_to_note};

/// Volume of a drum type that has never been set.
pub const DEFAULT_DRUM_VOLUME: f64 = 0.8;
pub const DEFAULT_FILL_DENSITY: f64 = 0.4;
const MAX_OCTAVE_OFFSET: i32 = 2;

/// Grid geometry and the drum kit that goes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridLayout {
    /// 12 rows by 8 half-beat steps, classic kit.
    #[default]
    Halves,
    /// 6 rows by 16 sixteenth steps, noise kit.
    Steps16,
}

impl GridLayout {
    pub fn rows(self) -> usize {
        match self {
            GridLayout::Halves => 12,
            GridLayout::Steps16 => 6,
        }
    }

    pub fn columns(self) -> usize {
        match self {
            GridLayout::Halves => 8,
            GridLayout::Steps16 => 16,
        }
    }

    pub fn steps_per_beat(self) -> f64 {
        match self {
            GridLayout::Halves => 2.0,
            GridLayout::Steps16 => 4.0,
        }
    }

    pub fn kit(self) -> DrumKit {
        match self {
            GridLayout::Halves => DrumKit::Classic,
            GridLayout::Steps16 => DrumKit::Noise,
        }
    }
}

/// A row-major boolean grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    columns: usize,
    cells: Vec<bool>,
}

impl Grid {
    pub fn new(rows: usize, columns: usize) -> Self {
        Grid {
            rows,
            columns,
            cells: vec![false; rows * columns],
        }
    }

    pub fn for_layout(layout: GridLayout) -> Self {
        Grid::new(layout.rows(), layout.columns())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.columns).then(|| row * self.columns + col)
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.index(row, col).is_some_and(|i| self.cells[i])
    }

    pub fn set(&mut self, row: usize, col: usize, on: bool) {
        if let Some(i) = self.index(row, col) {
            self.cells[i] = on;
        }
    }

    pub fn clear(&mut self) {
        self.cells.fill(false);
    }

    /// Active rows of a column, top to bottom.
    pub fn active_rows(&self, col: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.rows).filter(move |&r| self.get(r, col))
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }
}

/// A drum template: active columns of the first four kit rows over eight steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrumTemplate {
    pub name: &'static str,
    pub rows: [&'static [usize]; 4],
}

pub const DRUM_TEMPLATES: [DrumTemplate; 5] = [
    DrumTemplate {
        name: "rock",
        rows: [&[0, 4], &[2, 6], &[0, 1, 2, 3, 4, 5, 6, 7], &[1, 3, 5, 7]],
    },
    DrumTemplate {
        name: "funk",
        rows: [&[0, 3, 6], &[2, 6], &[1, 4, 5, 7], &[0, 2, 4, 6]],
    },
    DrumTemplate {
        name: "disco",
        rows: [&[0, 2, 4, 6], &[2, 6], &[1, 3, 5, 7], &[0, 1, 2, 3, 4, 5, 6, 7]],
    },
    DrumTemplate {
        name: "breakbeat",
        rows: [&[0, 5], &[2, 3, 6], &[1, 4, 7], &[0, 2, 4, 6]],
    },
    DrumTemplate {
        name: "latin",
        rows: [&[0, 3, 5], &[2, 7], &[0, 1, 3, 4, 6, 7], &[1, 2, 5, 6]],
    },
];

impl DrumTemplate {
    /// Render the template into an empty grid, repeating every eight columns.
    pub fn render(&self, rows: usize, columns: usize) -> Grid {
        let mut grid = Grid::new(rows, columns);
        for (row, cols) in self.rows.iter().enumerate() {
            for bar in (0..columns).step_by(8) {
                for &c in cols.iter() {
                    grid.set(row, bar + c, true);
                }
            }
        }
        grid
    }
}

/// Scale degrees used as row indices, limited to rows that exist.
fn scale_rows(scale: Scale, rows: usize) -> Vec<usize> {
    scale.steps().into_iter().filter(|&r| r < rows).collect()
}

/// A saved snapshot of every grid, octave offset and volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSlot {
    pub grids: BTreeMap<InstrumentId, Grid>,
    pub octave_offsets: BTreeMap<InstrumentId, i32>,
    pub volumes: BTreeMap<InstrumentId, f64>,
    pub drum_volumes: BTreeMap<DrumType, f64>,
}

pub struct PatternStore {
    layout: GridLayout,
    grids: BTreeMap<InstrumentId, Grid>,
    octave_offsets: BTreeMap<InstrumentId, i32>,
    volumes: BTreeMap<InstrumentId, f64>,
    drum_volumes: BTreeMap<DrumType, f64>,
    muted: BTreeSet<InstrumentId>,
    soloed: BTreeSet<InstrumentId>,
    muted_drums: BTreeSet<DrumType>,
    slots: Vec<Option<PatternSlot>>,
    current_slot: usize,
    current_instrument: InstrumentId,
    scale: Scale,
}

impl PatternStore {
    pub fn new(layout: GridLayout, slot_count: usize) -> Self {
        PatternStore {
            layout,
            grids: InstrumentId::ALL
                .iter()
                .map(|&id| (id, Grid::for_layout(layout)))
                .collect(),
            octave_offsets: BTreeMap::new(),
            volumes: InstrumentId::ALL
                .iter()
                .map(|&id| (id, InstrumentParams::defaults_for(id).volume))
                .collect(),
            drum_volumes: BTreeMap::new(),
            muted: BTreeSet::new(),
            soloed: BTreeSet::new(),
            muted_drums: BTreeSet::new(),
            slots: vec![None; slot_count.max(1)],
            current_slot: 0,
            current_instrument: InstrumentId::Synth,
            scale: Scale::Major,
        }
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn grid(&self, id: InstrumentId) -> &Grid {
        &self.grids[&id]
    }

    fn grid_mut(&mut self, id: InstrumentId) -> &mut Grid {
        let layout = self.layout;
        self.grids.entry(id).or_insert_with(|| Grid::for_layout(layout))
    }

    pub fn current_instrument(&self) -> InstrumentId {
        self.current_instrument
    }

    pub fn select_instrument(&mut self, id: InstrumentId) {
        self.current_instrument = id;
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    /// Flip one cell and return its new state. Turning on a melodic cell
    /// clears the rest of its column. Out-of-range cells are ignored.
    pub fn toggle_step(&mut self, id: InstrumentId, row: usize, col: usize) -> Option<bool> {
        let grid = self.grid_mut(id);
        if row >= grid.rows() || col >= grid.columns() {
            log::warn!("toggle_step({id}, {row}, {col}) outside the grid, ignored");
            return None;
        }
        let on = !grid.get(row, col);
        if on && id.is_melodic() {
            for r in 0..grid.rows() {
                grid.set(r, col, false);
            }
        }
        grid.set(row, col, on);
        Some(on)
    }

    pub fn clear(&mut self, id: InstrumentId) {
        self.grid_mut(id).clear();
    }

    /// Replace `id`'s grid with a generated pattern. Drums pick one of
    /// [`DRUM_TEMPLATES`]; melodic instruments get each column filled with
    /// probability `density` on a random row of the current scale.
    pub fn random_fill<R: Rng + ?Sized>(&mut self, id: InstrumentId, density: f64, rng: &mut R) {
        let density = if density.is_finite() { density.clamp(0.0, 1.0) } else { DEFAULT_FILL_DENSITY };
        let (rows, columns) = (self.layout.rows(), self.layout.columns());
        if id == InstrumentId::Drums {
            let template = DRUM_TEMPLATES.choose(rng).unwrap_or(&DRUM_TEMPLATES[0]);
            log::debug!("drum fill: {}", template.name);
            self.grids.insert(id, template.render(rows, columns));
            return;
        }
        let rows_in_scale = scale_rows(self.scale, rows);
        let grid = self.grid_mut(id);
        grid.clear();
        for col in 0..columns {
            if rng.gen_bool(density) {
                if let Some(&row) = rows_in_scale.choose(rng) {
                    grid.set(row, col, true);
                }
            }
        }
    }

    /// Move the first note of each column onto `scale`, keeping the rhythm.
    /// Row `r` maps to the scale's `r % 7`th degree. Drums are left alone.
    pub fn convert_instrument_to_scale(&mut self, id: InstrumentId, scale: Scale) {
        if !id.is_melodic() {
            return;
        }
        let steps = scale.steps();
        let old = self.grid(id).clone();
        let mut converted = Grid::new(old.rows(), old.columns());
        for col in 0..old.columns() {
            if let Some(row) = old.active_rows(col).next() {
                converted.set(steps[row % steps.len()], col, true);
            }
        }
        self.grids.insert(id, converted);
    }

    /// Snap every note of every melodic instrument to the nearest row of `scale`.
    pub fn convert_all_to_scale(&mut self, scale: Scale) {
        let targets = scale_rows(scale, self.layout.rows());
        for id in InstrumentId::MELODIC {
            let old = self.grid(id).clone();
            let mut converted = Grid::new(old.rows(), old.columns());
            for col in 0..old.columns() {
                for row in old.active_rows(col) {
                    let nearest = targets
                        .iter()
                        .copied()
                        .min_by_key(|&t| t.abs_diff(row))
                        .unwrap_or(row);
                    converted.set(nearest, col, true);
                }
            }
            self.grids.insert(id, converted);
        }
        self.scale = scale;
    }

    pub fn octave_offset(&self, id: InstrumentId) -> i32 {
        self.octave_offsets.get(&id).copied().unwrap_or(0)
    }

    /// Shift a melodic instrument up or down an octave within `-2..=2`.
    /// Returns the resulting offset.
    pub fn shift_octave(&mut self, id: InstrumentId, up: bool) -> i32 {
        if !id.is_melodic() {
            return 0;
        }
        let delta = if up { 1 } else { -1 };
        let offset = (self.octave_offset(id) + delta).clamp(-MAX_OCTAVE_OFFSET, MAX_OCTAVE_OFFSET);
        self.octave_offsets.insert(id, offset);
        offset
    }

    /// Note played by melodic instrument `id` at `col`, if any.
    pub fn note_at(&self, id: InstrumentId, col: usize) -> Option<String> {
        let grid = self.grid(id);
        let row = grid.active_rows(col).next()?;
        Some(self.note_for_row(id, row))
    }

    pub fn note_for_row(&self, id: InstrumentId, row: usize) -> String {
        row_to_note(self.layout.rows(), row, self.octave_offset(id), self.scale)
    }

    /// Drums active at `col`, in row order.
    pub fn drums_at(&self, col: usize) -> Vec<DrumType> {
        let kit = self.layout.kit();
        self.grid(InstrumentId::Drums)
            .active_rows(col)
            .filter_map(|row| kit.drum_at(row))
            .collect()
    }

    pub fn instrument_volume(&self, id: InstrumentId) -> f64 {
        self.volumes
            .get(&id)
            .copied()
            .unwrap_or_else(|| InstrumentParams::defaults_for(id).volume)
    }

    /// Clamp to `[0, 1]`, store, and mirror into the registry.
    pub fn set_instrument_volume(&mut self, id: InstrumentId, volume: f64, registry: &mut InstrumentRegistry) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.volumes.insert(id, volume);
        registry.set_volume(id, volume);
    }

    pub fn drum_volume(&self, drum: DrumType) -> f64 {
        self.drum_volumes.get(&drum).copied().unwrap_or(DEFAULT_DRUM_VOLUME)
    }

    pub fn set_drum_volume(&mut self, drum: DrumType, volume: f64) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.drum_volumes.insert(drum, volume);
    }

    /// Returns the new mute state.
    pub fn toggle_mute(&mut self, id: InstrumentId) -> bool {
        toggle(&mut self.muted, id)
    }

    /// Returns the new solo state.
    pub fn toggle_solo(&mut self, id: InstrumentId) -> bool {
        toggle(&mut self.soloed, id)
    }

    pub fn toggle_drum_mute(&mut self, drum: DrumType) -> bool {
        toggle(&mut self.muted_drums, drum)
    }

    pub fn is_muted(&self, id: InstrumentId) -> bool {
        self.muted.contains(&id)
    }

    pub fn is_soloed(&self, id: InstrumentId) -> bool {
        self.soloed.contains(&id)
    }

    pub fn is_drum_muted(&self, drum: DrumType) -> bool {
        self.muted_drums.contains(&drum)
    }

    /// Not muted, and either nothing is soloed or this instrument is.
    pub fn is_audible(&self, id: InstrumentId) -> bool {
        !self.is_muted(id) && (self.soloed.is_empty() || self.is_soloed(id))
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn slot(&self, slot: usize) -> Option<&PatternSlot> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(RositaError::InvalidSlot {
                slot,
                count: self.slots.len(),
            })
        }
    }

    fn capture(&self) -> PatternSlot {
        PatternSlot {
            grids: self.grids.clone(),
            octave_offsets: self.octave_offsets.clone(),
            volumes: self.volumes.clone(),
            drum_volumes: self.drum_volumes.clone(),
        }
    }

    /// Store the current grids, offsets and volumes in `slot`.
    pub fn save(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        self.slots[slot] = Some(self.capture());
        log::debug!("pattern saved to slot {slot}");
        Ok(())
    }

    /// Make `slot` current. A never-saved slot yields empty grids and zero
    /// offsets and leaves volumes alone. Saved drum volumes overwrite only
    /// the drum types they contain.
    pub fn load(&mut self, slot: usize, registry: &mut InstrumentRegistry) -> Result<()> {
        self.check_slot(slot)?;
        match self.slots[slot].clone() {
            Some(saved) => {
                self.grids = saved.grids;
                self.octave_offsets = saved.octave_offsets;
                for (id, volume) in saved.volumes {
                    self.set_instrument_volume(id, volume, registry);
                }
                self.drum_volumes.extend(saved.drum_volumes);
            }
            None => {
                for grid in self.grids.values_mut() {
                    grid.clear();
                }
                self.octave_offsets.clear();
            }
        }
        self.current_slot = slot;
        log::debug!("pattern slot {slot} loaded");
        Ok(())
    }

    /// Copy the current state into `target` and select it.
    pub fn duplicate(&mut self, target: usize) -> Result<()> {
        self.check_slot(target)?;
        self.slots[target] = Some(self.capture());
        log::debug!("slot {} duplicated to {target}", self.current_slot);
        self.current_slot = target;
        Ok(())
    }
}

fn toggle<T: Ord>(set: &mut BTreeSet<T>, item: T) -> bool {
    if set.remove(&item) {
        false
    } else {
        set.insert(item);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn store() -> PatternStore {
        PatternStore::new(GridLayout::Halves, 8)
    }

    #[test]
    fn melodic_columns_stay_monophonic() {
        let mut s = store();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let row = rng.gen_range(0..12);
            let col = rng.gen_range(0..8);
            s.toggle_step(InstrumentId::Bass, row, col);
            for c in 0..8 {
                let count = s.grid(InstrumentId::Bass).active_rows(c).count();
                assert!(count <= 1, "column {c} has {count} notes");
            }
        }
    }

    #[test]
    fn drums_are_polyphonic() {
        let mut s = store();
        s.toggle_step(InstrumentId::Drums, 0, 3);
        s.toggle_step(InstrumentId::Drums, 1, 3);
        assert_eq!(s.drums_at(3), vec![DrumType::Kick, DrumType::Snare]);
    }

    #[test]
    fn toggle_out_of_range_is_ignored() {
        let mut s = store();
        assert_eq!(s.toggle_step(InstrumentId::Synth, 12, 0), None);
        assert_eq!(s.toggle_step(InstrumentId::Synth, 0, 8), None);
        assert!(s.grid(InstrumentId::Synth).is_empty());
        assert_eq!(s.toggle_step(InstrumentId::Synth, 0, 0), Some(true));
        assert_eq!(s.toggle_step(InstrumentId::Synth, 0, 0), Some(false));
    }

    #[test]
    fn clear_touches_one_instrument() {
        let mut s = store();
        s.toggle_step(InstrumentId::Synth, 1, 1);
        s.toggle_step(InstrumentId::Keys, 2, 2);
        s.clear(InstrumentId::Synth);
        assert!(s.grid(InstrumentId::Synth).is_empty());
        assert!(s.grid(InstrumentId::Keys).get(2, 2));
    }

    #[test]
    fn drum_fill_always_matches_a_template() {
        let mut s = store();
        let mut rng = StdRng::seed_from_u64(9);
        let shapes: Vec<Grid> = DRUM_TEMPLATES.iter().map(|t| t.render(12, 8)).collect();
        for _ in 0..100 {
            s.toggle_step(InstrumentId::Drums, 7, 5);
            s.random_fill(InstrumentId::Drums, 0.4, &mut rng);
            let grid = s.grid(InstrumentId::Drums);
            assert!(shapes.contains(grid), "fill is not a template: {grid:?}");
        }
    }

    #[test]
    fn templates_repeat_on_sixteen_steps() {
        let grid = DRUM_TEMPLATES[0].render(6, 16);
        for row in 0..4 {
            for col in 0..8 {
                assert_eq!(grid.get(row, col), grid.get(row, col + 8), "row {row} col {col}");
            }
        }
    }

    #[test]
    fn melodic_fill_uses_scale_rows() {
        let mut s = store();
        s.set_scale(Scale::Minor);
        let mut rng = StdRng::seed_from_u64(3);
        s.random_fill(InstrumentId::Keys, 1.0, &mut rng);
        let grid = s.grid(InstrumentId::Keys);
        let allowed = Scale::Minor.steps();
        for col in 0..8 {
            let rows: Vec<usize> = grid.active_rows(col).collect();
            assert_eq!(rows.len(), 1, "density 1 fills every column");
            assert!(allowed.contains(&rows[0]), "row {} not in scale", rows[0]);
        }
        s.random_fill(InstrumentId::Keys, 0.0, &mut rng);
        assert!(s.grid(InstrumentId::Keys).is_empty());
    }

    #[test]
    fn convert_current_instrument_maps_by_degree() {
        let mut s = store();
        s.toggle_step(InstrumentId::Synth, 3, 0);
        s.toggle_step(InstrumentId::Synth, 8, 1);
        s.convert_instrument_to_scale(InstrumentId::Synth, Scale::Minor);
        let grid = s.grid(InstrumentId::Synth);
        assert!(grid.get(5, 0), "row 3 -> minor degree 3 -> row 5");
        assert!(grid.get(2, 1), "row 8 -> degree 1 -> row 2");
        assert_eq!(grid.active_count(), 2);
    }

    #[test]
    fn convert_all_snaps_to_nearest_row() {
        let mut s = store();
        s.toggle_step(InstrumentId::Bass, 4, 0);
        s.toggle_step(InstrumentId::Keys, 9, 0);
        s.convert_all_to_scale(Scale::Minor);
        assert!(s.grid(InstrumentId::Bass).get(3, 0), "row 4 snaps down to 3");
        assert!(s.grid(InstrumentId::Keys).get(8, 0), "row 9 snaps down to 8");
        assert_eq!(s.scale(), Scale::Minor);
    }

    #[test]
    fn octave_offsets_clamp() {
        let mut s = store();
        for _ in 0..5 {
            s.shift_octave(InstrumentId::Synth, true);
        }
        assert_eq!(s.octave_offset(InstrumentId::Synth), 2);
        for _ in 0..9 {
            s.shift_octave(InstrumentId::Synth, false);
        }
        assert_eq!(s.octave_offset(InstrumentId::Synth), -2);
        assert_eq!(s.shift_octave(InstrumentId::Drums, true), 0);
        assert_eq!(s.octave_offset(InstrumentId::Drums), 0);
    }

    #[test]
    fn save_load_round_trip() {
        let mut s = store();
        let mut reg = InstrumentRegistry::new();
        s.toggle_step(InstrumentId::Synth, 2, 2);
        s.toggle_step(InstrumentId::Drums, 0, 0);
        s.shift_octave(InstrumentId::Keys, true);
        s.set_instrument_volume(InstrumentId::Bass, 0.3, &mut reg);
        s.set_drum_volume(DrumType::Snare, 0.5);
        let before = s.capture();
        s.save(3).unwrap();

        s.clear(InstrumentId::Synth);
        s.toggle_step(InstrumentId::Bass, 5, 5);
        s.set_instrument_volume(InstrumentId::Bass, 0.9, &mut reg);
        s.load(3, &mut reg).unwrap();

        assert_eq!(s.capture(), before);
        assert_eq!(s.current_slot(), 3);
        assert_eq!(reg.get(InstrumentId::Bass).volume, 0.3, "volume mirrored on load");
    }

    #[test]
    fn empty_slot_clears_grids_but_keeps_volumes() {
        let mut s = store();
        let mut reg = InstrumentRegistry::new();
        s.toggle_step(InstrumentId::Synth, 0, 0);
        s.shift_octave(InstrumentId::Synth, true);
        s.set_instrument_volume(InstrumentId::Synth, 0.2, &mut reg);
        s.load(5, &mut reg).unwrap();
        assert!(InstrumentId::ALL.iter().all(|&id| s.grid(id).is_empty()));
        assert_eq!(s.octave_offset(InstrumentId::Synth), 0);
        assert_eq!(s.instrument_volume(InstrumentId::Synth), 0.2);
    }

    #[test]
    fn duplicate_selects_target() {
        let mut s = store();
        s.toggle_step(InstrumentId::Keys, 1, 1);
        s.duplicate(6).unwrap();
        assert_eq!(s.current_slot(), 6);
        assert!(s.slot(6).is_some_and(|p| p.grids[&InstrumentId::Keys].get(1, 1)));
        assert!(matches!(s.save(8), Err(RositaError::InvalidSlot { slot: 8, count: 8 })));
    }

    #[test]
    fn volumes_clamp_and_default() {
        let mut s = store();
        let mut reg = InstrumentRegistry::new();
        assert_eq!(s.drum_volume(DrumType::Clap), DEFAULT_DRUM_VOLUME);
        s.set_drum_volume(DrumType::Clap, 4.0);
        assert_eq!(s.drum_volume(DrumType::Clap), 1.0);
        s.set_instrument_volume(InstrumentId::Keys, -1.0, &mut reg);
        assert_eq!(s.instrument_volume(InstrumentId::Keys), 0.0);
        assert_eq!(reg.get(InstrumentId::Keys).volume, 0.0);
    }

    #[test]
    fn solo_overrides_others() {
        let mut s = store();
        assert!(s.is_audible(InstrumentId::Bass));
        s.toggle_solo(InstrumentId::Synth);
        assert!(!s.is_audible(InstrumentId::Bass));
        assert!(s.is_audible(InstrumentId::Synth));
        s.toggle_mute(InstrumentId::Synth);
        assert!(!s.is_audible(InstrumentId::Synth), "mute wins over solo");
        assert!(s.toggle_drum_mute(DrumType::Rim));
        assert!(s.is_drum_muted(DrumType::Rim));
    }

    #[test]
    fn notes_follow_rows_and_offsets() {
        let mut s = store();
        s.toggle_step(InstrumentId::Synth, 11, 0);
        assert_eq!(s.note_at(InstrumentId::Synth, 0).as_deref(), Some("C3"));
        s.shift_octave(InstrumentId::Synth, true);
        assert_eq!(s.note_at(InstrumentId::Synth, 0).as_deref(), Some("C4"));
        assert_eq!(s.note_at(InstrumentId::Synth, 1), None);
    }
}
