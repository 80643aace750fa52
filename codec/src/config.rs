//! Engine configuration.

use core::ops::{Bound, RangeBounds};

/// Wire contract between writer and reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Writer and reader agree on the exact field layout of every type.
    #[default]
    SchemaConsistent,

    /// Writer and reader may disagree on field sets and reconcile them through class
    /// descriptors sent in-band.
    Compatible,
}

/// Low-level encoding used beneath the field walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Format understood only by engines of this crate.
    #[default]
    Native,

    /// Format shared with implementations in other languages.
    Xlang,
}

/// Configuration for an [crate::Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// Wire contract (schema-consistent or compatible).
    pub mode: Mode,

    /// Wire format used for values and type info.
    pub protocol: Protocol,

    /// Whether shared and cyclic references are preserved.
    ///
    /// When disabled, every occurrence of a node is written in full (and a cyclic graph
    /// cannot be serialized).
    pub track_ref: bool,

    /// Whether a struct version hash is written before (and checked after) each struct in
    /// schema-consistent mode.
    pub check_struct_version: bool,

    /// Whether class descriptors persist across top-level calls on the same engine.
    ///
    /// Both peers must agree on this setting and process the same sequence of payloads.
    pub share_meta: bool,

    /// Whether `i32` values are written as ZigZag varints (native protocol only).
    pub compress_int: bool,

    /// Whether `i64` values are written as ZigZag varints (native protocol only).
    pub compress_long: bool,

    /// Whether enum constants are written by name rather than by ordinal.
    pub enum_by_name: bool,

    /// Whether an unknown enum constant fails decoding instead of decoding to
    /// [crate::EnumValue::Unknown].
    pub unknown_enum_as_error: bool,

    /// Whether a struct of an unregistered type decodes to a placeholder (compatible mode only).
    pub deserialize_unknown_types: bool,

    /// Accepted length (in bytes) of strings.
    pub max_string_len: RangeCfg<usize>,

    /// Accepted length of lists, arrays, maps, and descriptor field lists.
    pub max_collection_len: RangeCfg<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::SchemaConsistent,
            protocol: Protocol::Native,
            track_ref: true,
            check_struct_version: true,
            share_meta: false,
            compress_int: true,
            compress_long: true,
            enum_by_name: false,
            unknown_enum_as_error: false,
            deserialize_unknown_types: true,
            max_string_len: RangeCfg::from(..=1 << 24),
            max_collection_len: RangeCfg::from(..=1 << 20),
        }
    }
}

impl Config {
    /// Returns the default configuration for compatible mode.
    pub fn compatible() -> Self {
        Self {
            mode: Mode::Compatible,
            ..Default::default()
        }
    }

    /// Returns true if descriptors are exchanged in-band.
    pub fn is_compatible(&self) -> bool {
        self.mode == Mode::Compatible
    }
}

/// Configuration for limiting the range of a value.
///
/// Used to bound lengths read from untrusted input before anything is allocated.
///
/// # Examples
///
/// ```
/// use commonware_graph_codec::RangeCfg;
///
/// let cfg = RangeCfg::new(0..=1024);
/// assert!(cfg.contains(&500));
/// assert!(!cfg.contains(&2000));
///
/// let cfg_min = RangeCfg::from(1..);
/// assert!(cfg_min.contains(&1));
/// assert!(!cfg_min.contains(&0));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RangeCfg<T: Copy + PartialOrd> {
    start: Bound<T>,
    end: Bound<T>,
}

impl<T: Copy + PartialOrd> From<core::ops::Range<T>> for RangeCfg<T> {
    fn from(r: core::ops::Range<T>) -> Self {
        Self::new(r)
    }
}

impl<T: Copy + PartialOrd> From<core::ops::RangeInclusive<T>> for RangeCfg<T> {
    fn from(r: core::ops::RangeInclusive<T>) -> Self {
        Self::new(r)
    }
}

impl<T: Copy + PartialOrd> From<core::ops::RangeFrom<T>> for RangeCfg<T> {
    fn from(r: core::ops::RangeFrom<T>) -> Self {
        Self::new(r)
    }
}

impl<T: Copy + PartialOrd> From<core::ops::RangeToInclusive<T>> for RangeCfg<T> {
    fn from(r: core::ops::RangeToInclusive<T>) -> Self {
        Self::new(r)
    }
}

impl<T: Copy + PartialOrd> From<core::ops::RangeFull> for RangeCfg<T> {
    fn from(_: core::ops::RangeFull) -> Self {
        Self::new(..)
    }
}

impl<T: Copy + PartialOrd> RangeCfg<T> {
    /// Creates a new `RangeCfg` from any type implementing `RangeBounds<T>`.
    pub fn new(r: impl RangeBounds<T>) -> Self {
        RangeCfg {
            start: r.start_bound().cloned(),
            end: r.end_bound().cloned(),
        }
    }

    /// Returns true if the value is within this range.
    pub fn contains(&self, value: &T) -> bool {
        match &self.start {
            Bound::Included(s) if value < s => return false,
            Bound::Excluded(s) if value <= s => return false,
            _ => {}
        }
        match &self.end {
            Bound::Included(e) if value > e => return false,
            Bound::Excluded(e) if value >= e => return false,
            _ => {}
        }
        true
    }
}

impl<T: Copy + PartialOrd> RangeBounds<T> for RangeCfg<T> {
    fn start_bound(&self) -> Bound<&T> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&T> {
        self.end.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ops::Bound::{Excluded, Included, Unbounded};

    #[test]
    fn test_range_cfg_bounds() {
        let cfg: RangeCfg<usize> = (3..7).into();
        assert_eq!(cfg.start_bound(), Included(&3));
        assert_eq!(cfg.end_bound(), Excluded(&7));
        assert!(!cfg.contains(&2));
        assert!(cfg.contains(&3));
        assert!(cfg.contains(&6));
        assert!(!cfg.contains(&7));

        let cfg: RangeCfg<usize> = (..=5).into();
        assert_eq!(cfg.start_bound(), Unbounded);
        assert!(cfg.contains(&0));
        assert!(cfg.contains(&5));
        assert!(!cfg.contains(&6));

        let cfg: RangeCfg<usize> = (..).into();
        assert!(cfg.contains(&usize::MAX));
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.mode, Mode::SchemaConsistent);
        assert_eq!(cfg.protocol, Protocol::Native);
        assert!(cfg.track_ref);
        assert!(!cfg.is_compatible());
        assert!(Config::compatible().is_compatible());
        assert!(cfg.max_string_len.contains(&(1 << 24)));
        assert!(!cfg.max_collection_len.contains(&((1 << 20) + 1)));
    }
}
