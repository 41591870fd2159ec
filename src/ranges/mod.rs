//! Lookup tables from raw channel values to classified labels.
//!
//! Fixture metadata declares enumerated channels (colour wheels, gobo wheels)
//! as a map of label -> `[low, high]` inclusive ranges. A `RangeTable` expands
//! those once into a dense index so every probe is a single slot read.

use std::fmt;

use log::warn;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Highest channel value a table will index. Declared bounds above this are clipped.
pub const MAX_INDEXED_VALUE: i64 = 0xffff;

/// Declared label ranges for one enumerated channel, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSpec {
    pub entries: Vec<(String, (i64, i64))>,
}

impl RangeSpec {
    pub fn new() -> RangeSpec {
        RangeSpec { entries: vec![] }
    }

    /// Append a label range. Later entries win where ranges overlap.
    pub fn with(mut self, label: &str, low: i64, high: i64) -> RangeSpec {
        self.entries.push((label.to_string(), (low, high)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RangeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, (low, high)) in &self.entries {
            map.serialize_entry(label, &[*low, *high])?;
        }
        map.end()
    }
}

/// Reads a JSON object keeping the key order, so overlapping ranges resolve
/// the same way on every run.
impl<'de> Deserialize<'de> for RangeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<RangeSpec, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = RangeSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to [low, high]")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RangeSpec, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, bounds)) = access.next_entry::<String, Bounds>()? {
                    entries.push((label, (bounds.0, bounds.1)));
                }
                Ok(RangeSpec { entries })
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

/// `[low, high]` pair. Extra trailing items are ignored.
struct Bounds(i64, i64);

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Bounds, D::Error> {
        struct BoundsVisitor;

        impl<'de> Visitor<'de> for BoundsVisitor {
            type Value = Bounds;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an inclusive [low, high] range")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Bounds, A::Error> {
                let low: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let high: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                Ok(Bounds(low, high))
            }
        }

        deserializer.deserialize_seq(BoundsVisitor)
    }
}

/// Dense value -> classification index built from a `RangeSpec`.
///
/// Overlapping ranges are resolved last-write-wins in declaration order;
/// gaps and values outside every range classify as `None`.
#[derive(Debug, Clone)]
pub struct RangeTable<T> {
    /// Channel value stored in `slots[0]`.
    offset: i64,
    /// Index into `classes` for every value from `offset` upwards.
    slots: Vec<Option<usize>>,
    /// One parsed classification per declared label.
    classes: Vec<T>,
}

impl<T> RangeTable<T> {
    /// Expand every declared range, parsing each label once with `parse`.
    pub fn build<F>(spec: &RangeSpec, parse: F) -> RangeTable<T>
    where
        F: Fn(&str) -> T,
    {
        let mut ranges = Vec::with_capacity(spec.entries.len());
        for (label, (low, high)) in &spec.entries {
            let low = (*low).max(0);
            let high = (*high).min(MAX_INDEXED_VALUE);
            if low > high {
                warn!("[ranges] Ignoring empty range {:?} for {}", (low, high), label);
                continue;
            }
            ranges.push((label.as_str(), low, high));
        }

        let offset = ranges.iter().map(|r| r.1).min().unwrap_or(0);
        let end = ranges.iter().map(|r| r.2).max().unwrap_or(-1);
        let mut slots = vec![None; (end - offset + 1).max(0) as usize];
        let mut classes = Vec::with_capacity(ranges.len());

        for (label, low, high) in ranges {
            let class_index = classes.len();
            classes.push(parse(label));
            for value in low..=high {
                slots[(value - offset) as usize] = Some(class_index);
            }
        }

        RangeTable {
            offset,
            slots,
            classes,
        }
    }

    /// Classify a raw channel value.
    pub fn lookup(&self, value: i64) -> Option<&T> {
        if value < self.offset {
            return None;
        }
        let slot = usize::try_from(value - self.offset).ok()?;
        match self.slots.get(slot) {
            Some(Some(class_index)) => self.classes.get(*class_index),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Colour wheel position: a split wheel slot shows two colours side by side.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ColorClass {
    pub primary_color: String,
    pub secondary_color: String,
}

/// Gobo wheel position.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GoboClass {
    pub gobo: String,
    /// Shaking ("dithered") variant of the gobo.
    pub dithered: bool,
}

impl GoboClass {
    /// True for the open slot, which projects no pattern.
    pub fn is_none(&self) -> bool {
        self.gobo == "none"
    }
}

const COLOR_SEPARATOR: char = '_';
const DITHER_PREFIX: &str = "dither_";

/// `red_blue` is a split slot, `red` a plain one.
pub fn parse_color(label: &str) -> ColorClass {
    let mut parts = label.split(COLOR_SEPARATOR);
    let primary = parts.next().unwrap_or_default();
    let secondary = parts.next().unwrap_or(primary);
    ColorClass {
        primary_color: primary.to_string(),
        secondary_color: secondary.to_string(),
    }
}

/// `dither_stars` is the shaking variant of `stars`.
pub fn parse_gobo(label: &str) -> GoboClass {
    match label.strip_prefix(DITHER_PREFIX) {
        Some(gobo) => GoboClass {
            gobo: gobo.to_string(),
            dithered: true,
        },
        None => GoboClass {
            gobo: label.to_string(),
            dithered: false,
        },
    }
}

pub type ColorTable = RangeTable<ColorClass>;
pub type GoboTable = RangeTable<GoboClass>;

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel() -> RangeSpec {
        RangeSpec::new()
            .with("white", 0, 9)
            .with("red_blue", 10, 19)
            .with("green", 30, 39)
    }

    #[test]
    fn test_lookup_covers_closed_ranges() {
        let table = RangeTable::build(&wheel(), parse_color);
        for value in 10..=19 {
            let class = table.lookup(value).unwrap();
            assert_eq!(class.primary_color, "red");
            assert_eq!(class.secondary_color, "blue");
        }
        assert_eq!(table.lookup(0).unwrap().primary_color, "white");
        assert_eq!(table.lookup(39).unwrap().secondary_color, "green");
    }

    #[test]
    fn test_lookup_outside_ranges() {
        let table = RangeTable::build(&wheel(), parse_color);
        assert!(table.lookup(-1).is_none());
        assert!(table.lookup(40).is_none());
        assert!(table.lookup(300).is_none());
        // Gap between 19 and 30.
        assert!(table.lookup(25).is_none());
    }

    #[test]
    fn test_overlap_last_write_wins() {
        let spec = RangeSpec::new().with("open", 0, 20).with("stars", 10, 30);
        let table = RangeTable::build(&spec, parse_gobo);
        assert_eq!(table.lookup(9).unwrap().gobo, "open");
        assert_eq!(table.lookup(10).unwrap().gobo, "stars");
        assert_eq!(table.lookup(30).unwrap().gobo, "stars");
    }

    #[test]
    fn test_empty_and_inverted_specs() {
        let table: ColorTable = RangeTable::build(&RangeSpec::new(), parse_color);
        assert!(table.is_empty());
        assert!(table.lookup(0).is_none());

        let table = RangeTable::build(&RangeSpec::new().with("red", 20, 10), parse_color);
        assert!(table.lookup(15).is_none());
    }

    #[test]
    fn test_gobo_labels() {
        assert_eq!(
            parse_gobo("dither_stars"),
            GoboClass { gobo: "stars".to_string(), dithered: true }
        );
        assert_eq!(
            parse_gobo("stars"),
            GoboClass { gobo: "stars".to_string(), dithered: false }
        );
        assert!(parse_gobo("none").is_none());
    }

    #[test]
    fn test_color_labels() {
        let single = parse_color("magenta");
        assert_eq!(single.primary_color, "magenta");
        assert_eq!(single.secondary_color, "magenta");
    }

    #[test]
    fn test_spec_keeps_document_order() {
        let spec: RangeSpec =
            serde_json::from_str(r#"{"zeta": [0, 5], "alpha": [3, 8], "mid": [9, 9, 1]}"#).unwrap();
        let labels: Vec<_> = spec.entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(labels, ["zeta", "alpha", "mid"]);

        let table = RangeTable::build(&spec, parse_gobo);
        assert_eq!(table.lookup(4).unwrap().gobo, "alpha");
        assert!(serde_json::from_str::<RangeSpec>(r#"{"bad": [1]}"#).is_err());
    }
}
