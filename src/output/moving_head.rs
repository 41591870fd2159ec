//! Moving head view: where the head points and what the beam looks like.

use std::any::Any;

use serde::Serialize;

use crate::fixture::{Fixture, OpKind, Output};
use crate::ranges::{self, ColorClass, ColorTable, GoboClass, GoboTable, RangeTable};

/// Full pan travel of the head.
const PAN_DEGREES: f64 = 540.0;
/// How far down the body the bulb sits at full tilt.
const TILT_PERCENT: f64 = 70.0;
/// Upper bound of a channel value.
const CHANNEL_MAX: i64 = 255;

/// Bulb appearance.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Bulb {
    /// Mixed from red, green and blue channels.
    Rgb { red: u8, green: u8, blue: u8 },
    /// Colour wheel slot, possibly split between two colours.
    Wheel(ColorClass),
}

/// Everything a renderer needs to draw one moving head.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovingHeadView {
    /// `type name`
    pub label: String,
    /// Head rotation in degrees.
    pub rotation: f64,
    /// Seconds a pan move takes at the current speed.
    pub pan_transition: f64,
    /// Bulb offset in percent of the body.
    pub tilt: f64,
    /// Seconds a tilt move takes at the current speed.
    pub tilt_transition: f64,
    /// 0.0 ..= 1.0
    pub opacity: f64,
    pub bulb: Option<Bulb>,
    /// `None` when the open slot is selected or the value is unknown.
    pub gobo: Option<GoboClass>,
    pub effects: Vec<String>,
    pub state_effects: Vec<String>,
    pub selected: bool,
}

/// Observer computing a `MovingHeadView` on every change.
pub struct MovingHeadOutput {
    rgb: bool,
    colors: Option<ColorTable>,
    gobos: Option<GoboTable>,
    view: MovingHeadView,
}

impl MovingHeadOutput {
    /// Fixtures that can pan or tilt get a moving head view.
    pub fn applies_to(fixture: &Fixture) -> bool {
        fixture.has_function("pan") || fixture.has_function("tilt")
    }

    /// Build the lookup tables from the fixture's metadata.
    pub fn new(fixture: &Fixture) -> MovingHeadOutput {
        let colors = match fixture.enums.get("color") {
            Some(spec) if fixture.has_function("color") => Some(RangeTable::build(spec, ranges::parse_color)),
            _ => None,
        };
        let gobos = match fixture.enums.get("gobo") {
            Some(spec) if fixture.has_function("gobo") => Some(RangeTable::build(spec, ranges::parse_gobo)),
            _ => None,
        };

        MovingHeadOutput {
            rgb: fixture.has_functions(&["red", "green", "blue"]),
            colors,
            gobos,
            view: MovingHeadView::default(),
        }
    }

    pub fn view(&self) -> &MovingHeadView {
        &self.view
    }
}

/// Channel value clamped into the 0..=255 range. Missing channels read as 0.
fn channel(fixture: &Fixture, name: &str) -> i64 {
    fixture.channel(name).unwrap_or(0).clamp(0, CHANNEL_MAX)
}

fn fraction(fixture: &Fixture, name: &str) -> f64 {
    channel(fixture, name) as f64 / CHANNEL_MAX as f64
}

/// Move time for a channel, interpolated between its speed bounds by the `speed` channel.
fn transition(fixture: &Fixture, name: &str) -> f64 {
    match fixture.speeds.get(name) {
        Some((min, max)) => min + fraction(fixture, "speed") * (max - min),
        None => 0.0,
    }
}

impl Output for MovingHeadOutput {
    fn render(&mut self, fixture: &Fixture) {
        let bulb = if self.rgb {
            Some(Bulb::Rgb {
                red: channel(fixture, "red") as u8,
                green: channel(fixture, "green") as u8,
                blue: channel(fixture, "blue") as u8,
            })
        } else {
            self.colors
                .as_ref()
                .and_then(|colors| colors.lookup(fixture.channel("color").unwrap_or(0)))
                .map(|color| Bulb::Wheel(color.clone()))
        };

        let gobo = self
            .gobos
            .as_ref()
            .and_then(|gobos| gobos.lookup(fixture.channel("gobo").unwrap_or(0)))
            .filter(|gobo| !gobo.is_none())
            .cloned();

        self.view = MovingHeadView {
            label: format!("{} {}", fixture.kind, fixture.name),
            rotation: fraction(fixture, "pan") * PAN_DEGREES,
            pan_transition: transition(fixture, "pan"),
            tilt: fraction(fixture, "tilt") * TILT_PERCENT,
            tilt_transition: transition(fixture, "tilt"),
            opacity: fraction(fixture, "dim"),
            bulb,
            gobo,
            effects: fixture.effects().lines(OpKind::Effect),
            state_effects: fixture.effects().lines(OpKind::StateEffect),
            selected: fixture.is_selected(),
        };
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureDescriptor, Lifecycle, OpEvent, Operation};

    fn head() -> Fixture {
        let descriptor: FixtureDescriptor = serde_json::from_str(
            r#"{"type": "MovingHead", "name": "mh1",
                "functions": ["pan", "tilt", "dim", "speed", "color", "gobo"],
                "state": {"pan": 255, "tilt": 0, "dim": 51, "speed": 0, "color": 12, "gobo": 0},
                "speeds": {"pan": [1, 3], "tilt": [0.5, 2.5]},
                "enums": {
                    "color": {"white": [0, 9], "red_blue": [10, 19]},
                    "gobo": {"none": [0, 7], "stars": [8, 15], "dither_stars": [16, 23]}
                }}"#,
        )
        .unwrap();
        Fixture::new(descriptor)
    }

    fn render(fixture: &Fixture) -> MovingHeadView {
        let mut output = MovingHeadOutput::new(fixture);
        output.render(fixture);
        output.view().clone()
    }

    #[test]
    fn test_geometry() {
        let view = render(&head());
        assert_eq!(view.label, "MovingHead mh1");
        assert_eq!(view.rotation, 540.0);
        assert_eq!(view.tilt, 0.0);
        assert!((view.opacity - 0.2).abs() < 1e-9);
        assert_eq!(view.pan_transition, 1.0);
        assert_eq!(view.tilt_transition, 0.5);
    }

    #[test]
    fn test_speed_scales_transitions() {
        let mut fixture = head();
        fixture.patch(&[("speed".to_string(), 255)].into());
        let view = render(&fixture);
        assert_eq!(view.pan_transition, 3.0);
        assert_eq!(view.tilt_transition, 2.5);
    }

    #[test]
    fn test_wheel_and_gobo() {
        let mut fixture = head();
        let view = render(&fixture);
        assert_eq!(
            view.bulb,
            Some(Bulb::Wheel(ColorClass {
                primary_color: "red".to_string(),
                secondary_color: "blue".to_string(),
            }))
        );
        // Open slot hides the gobo.
        assert_eq!(view.gobo, None);

        fixture.patch(&[("gobo".to_string(), 20), ("color".to_string(), 200)].into());
        let view = render(&fixture);
        assert_eq!(view.bulb, None);
        assert_eq!(
            view.gobo,
            Some(GoboClass {
                gobo: "stars".to_string(),
                dithered: true
            })
        );
    }

    #[test]
    fn test_rgb_clamps_out_of_range_values() {
        let descriptor: FixtureDescriptor = serde_json::from_str(
            r#"{"type": "Par", "name": "p", "functions": ["pan", "red", "green", "blue"],
                "state": {"red": 300, "green": -4, "blue": 128}}"#,
        )
        .unwrap();
        let fixture = Fixture::new(descriptor);
        assert_eq!(fixture.channel("red"), Some(300));
        assert_eq!(
            render(&fixture).bulb,
            Some(Bulb::Rgb { red: 255, green: 0, blue: 128 })
        );
    }

    #[test]
    fn test_follows_fixture_updates() {
        let mut fixture = head();
        let id = fixture.subscribe(Box::new(MovingHeadOutput::new(&fixture)));
        fixture.apply_operation(&OpEvent {
            kind: OpKind::Effect,
            op_name: "pan".to_string(),
            lifecycle: Lifecycle::New,
            state: Operation {
                start: Some(0),
                end: Some(255),
                done: None,
                duration: Some(4.0),
            },
        });
        fixture.set_selected(true);

        let view = fixture.output::<MovingHeadOutput>(id).unwrap().view();
        assert_eq!(view.effects, ["pan 0->255-> 4"]);
        assert!(view.state_effects.is_empty());
        assert!(view.selected);
    }
}
