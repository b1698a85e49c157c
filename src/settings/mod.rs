//! Settings control-frame model.
//!
//! A settings frame carries an ordered collection of numeric parameters,
//! each with a pair of persistence flags, plus a frame-level flag asking
//! the peer to discard everything it previously persisted for this
//! connection.
//!
//! The accessors are probe-style: settings frames are sparse and callers
//! iterate optimistically over a fixed ID space, so reading an absent ID
//! yields `None`/`false` and flag writes to an absent ID are silent
//! no-ops. Only a structural violation — writing a value under an
//! out-of-range ID — is a hard error, rejected before any mutation.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub mod codec;

pub use codec::{decode, encode, encode_to_bytes, SettingsCodecError};

/// Largest setting ID a frame may carry.
pub const SETTINGS_MAX_ID: u32 = 0x00FF_FFFF;

/// Error returned when a value write names an ID outside `1..=SETTINGS_MAX_ID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("setting ID is not valid: {0}")]
pub struct InvalidSettingId(pub u32);

/// One settings entry: a value and its two persistence flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Setting {
    value: i32,
    persist: bool,
    persisted: bool,
}

/// An ordered collection of setting entries keyed by numeric ID.
///
/// Iteration and serialization observe entries in ascending ID order
/// regardless of insertion order. The type provides no internal
/// synchronization; the holder of a decoded frame owns it exclusively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsFrame {
    settings: BTreeMap<u32, Setting>,
    clear_previously_persisted: bool,
}

impl SettingsFrame {
    /// Creates an empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All IDs currently present, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.settings.keys().copied()
    }

    /// Number of entries in the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Returns `true` if the frame has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Returns `true` if the frame has an entry under `id`.
    #[must_use]
    pub fn is_set(&self, id: u32) -> bool {
        self.settings.contains_key(&id)
    }

    /// The value stored under `id`, or `None` if the ID is absent.
    #[must_use]
    pub fn value(&self, id: u32) -> Option<i32> {
        self.settings.get(&id).map(|s| s.value)
    }

    /// Stores `value` under `id` with both persistence flags cleared.
    pub fn set_value(&mut self, id: u32, value: i32) -> Result<(), InvalidSettingId> {
        self.set_value_with_flags(id, value, false, false)
    }

    /// Stores `value` under `id` along with both persistence flags.
    ///
    /// Overwriting an existing entry replaces all three fields
    /// unconditionally. IDs outside `1..=SETTINGS_MAX_ID` are rejected
    /// before any mutation.
    pub fn set_value_with_flags(
        &mut self,
        id: u32,
        value: i32,
        persist: bool,
        persisted: bool,
    ) -> Result<(), InvalidSettingId> {
        if id == 0 || id > SETTINGS_MAX_ID {
            return Err(InvalidSettingId(id));
        }
        self.settings.insert(
            id,
            Setting {
                value,
                persist,
                persisted,
            },
        );
        Ok(())
    }

    /// Deletes the entry under `id`. No-op if absent.
    pub fn remove_value(&mut self, id: u32) {
        self.settings.remove(&id);
    }

    /// The persist-value flag for `id`, or `false` if the ID is absent.
    #[must_use]
    pub fn persist_value(&self, id: u32) -> bool {
        self.settings.get(&id).is_some_and(|s| s.persist)
    }

    /// Sets the persist-value flag for `id`. Silent no-op if absent;
    /// flag writes never create entries.
    pub fn set_persist_value(&mut self, id: u32, persist: bool) {
        if let Some(setting) = self.settings.get_mut(&id) {
            setting.persist = persist;
        }
    }

    /// The persisted flag for `id`, or `false` if the ID is absent.
    #[must_use]
    pub fn is_persisted(&self, id: u32) -> bool {
        self.settings.get(&id).is_some_and(|s| s.persisted)
    }

    /// Sets the persisted flag for `id`. Silent no-op if absent.
    pub fn set_persisted(&mut self, id: u32, persisted: bool) {
        if let Some(setting) = self.settings.get_mut(&id) {
            setting.persisted = persisted;
        }
    }

    /// Whether the peer should discard all settings it previously
    /// persisted for this connection before applying this frame.
    #[must_use]
    pub fn clear_previously_persisted(&self) -> bool {
        self.clear_previously_persisted
    }

    /// Sets the clear-previously-persisted flag. Independent of entries.
    pub fn set_clear_previously_persisted(&mut self, clear: bool) {
        self.clear_previously_persisted = clear;
    }

    fn entries(&self) -> impl Iterator<Item = (u32, &Setting)> {
        self.settings.iter().map(|(id, s)| (*id, s))
    }
}

impl fmt::Display for SettingsFrame {
    /// Diagnostic dump: type-name banner, one entry per line in ascending
    /// ID order, no trailing newline. Not a wire format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SettingsFrame")?;
        for (id, setting) in self.entries() {
            write!(
                f,
                "\n{id}:{} (persist value: {}; persisted: {})",
                setting.value, setting.persist, setting.persisted
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut frame = SettingsFrame::new();
        frame.set_value(1, 100).unwrap();
        frame.set_value(7, -3).unwrap();

        assert!(frame.is_set(1));
        assert!(frame.is_set(7));
        assert_eq!(frame.value(1), Some(100));
        assert_eq!(frame.value(7), Some(-3));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn out_of_range_ids_rejected_without_mutation() {
        let mut frame = SettingsFrame::new();
        frame.set_value(2, 5).unwrap();

        assert_eq!(frame.set_value(0, 1), Err(InvalidSettingId(0)));
        assert_eq!(
            frame.set_value(SETTINGS_MAX_ID + 1, 1),
            Err(InvalidSettingId(SETTINGS_MAX_ID + 1))
        );
        // Frame unchanged after the rejected writes.
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.value(2), Some(5));

        // The boundary itself is legal.
        frame.set_value(SETTINGS_MAX_ID, 9).unwrap();
        assert_eq!(frame.value(SETTINGS_MAX_ID), Some(9));
    }

    #[test]
    fn overwrite_replaces_all_three_fields() {
        let mut frame = SettingsFrame::new();
        frame.set_value_with_flags(3, 10, true, true).unwrap();
        frame.set_value(3, 20).unwrap();

        assert_eq!(frame.value(3), Some(20));
        assert!(!frame.persist_value(3));
        assert!(!frame.is_persisted(3));
    }

    #[test]
    fn remove_then_probe_reports_absent() {
        let mut frame = SettingsFrame::new();
        frame.set_value(4, 42).unwrap();
        frame.remove_value(4);

        assert_eq!(frame.value(4), None);
        assert!(!frame.is_set(4));

        // Removing again is a no-op.
        frame.remove_value(4);
        assert!(frame.is_empty());
    }

    #[test]
    fn flag_writes_on_absent_id_never_create_entries() {
        let mut frame = SettingsFrame::new();
        frame.set_persist_value(9, true);
        frame.set_persisted(9, true);

        assert!(!frame.is_set(9));
        assert!(!frame.persist_value(9));
        assert!(!frame.is_persisted(9));
        assert!(frame.is_empty());
    }

    #[test]
    fn flag_accessors_mutate_existing_entries() {
        let mut frame = SettingsFrame::new();
        frame.set_value(5, 1).unwrap();

        frame.set_persist_value(5, true);
        assert!(frame.persist_value(5));
        frame.set_persisted(5, true);
        assert!(frame.is_persisted(5));

        frame.set_persist_value(5, false);
        assert!(!frame.persist_value(5));
        // The value itself is untouched by flag writes.
        assert_eq!(frame.value(5), Some(1));
    }

    #[test]
    fn iteration_is_ascending_regardless_of_insertion_order() {
        let mut frame = SettingsFrame::new();
        frame.set_value(5, 0).unwrap();
        frame.set_value(2, 0).unwrap();
        frame.set_value(9, 0).unwrap();

        let ids: Vec<u32> = frame.ids().collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn clear_flag_is_independent_of_entries() {
        let mut frame = SettingsFrame::new();
        assert!(!frame.clear_previously_persisted());
        frame.set_clear_previously_persisted(true);
        assert!(frame.clear_previously_persisted());
        assert!(frame.is_empty());
    }

    #[test]
    fn display_dump_format() {
        let mut frame = SettingsFrame::new();
        frame.set_value_with_flags(5, 17, false, true).unwrap();
        frame.set_value_with_flags(2, -1, true, false).unwrap();

        let dump = frame.to_string();
        assert_eq!(
            dump,
            "SettingsFrame\n\
             2:-1 (persist value: true; persisted: false)\n\
             5:17 (persist value: false; persisted: true)"
        );
        assert!(!dump.ends_with('\n'));
    }

    #[test]
    fn display_of_empty_frame_is_banner_only() {
        assert_eq!(SettingsFrame::new().to_string(), "SettingsFrame");
    }
}
