//! Collaborators for everything the stream carries besides fixture state.

use log::{debug, info, warn};

use crate::fixture::ChannelState;
use crate::parser::ManualControl;

/// Receives audio levels, suspension changes and operator form controls.
pub trait ControlSink {
    fn audio(&mut self, _bins: &[f64]) {}
    fn suspended(&mut self, _suspended: bool) {}
    /// Fresh channel values of a fixture that exists in the registry.
    fn state(&mut self, _fixture: &str, _state: &ChannelState) {}
    fn control(&mut self, _control: &ManualControl) {}
    /// The session was reset.
    fn reset(&mut self) {}
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct LogSink;

impl ControlSink for LogSink {
    fn audio(&mut self, bins: &[f64]) {
        let peak = bins.iter().copied().fold(0.0, f64::max);
        debug!("[control] Audio: {} bins, peak {:.3}", bins.len(), peak);
    }

    fn suspended(&mut self, suspended: bool) {
        info!("[control] Output suspended: {}", suspended);
    }

    fn control(&mut self, control: &ManualControl) {
        info!("[control] {:?}", control);
    }
}

/// Fields of the operator form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Light,
    Property,
    Start,
    End,
    Done,
    Duration,
}

impl FormField {
    pub fn from_name(name: &str) -> Option<FormField> {
        match name {
            "light" => Some(FormField::Light),
            "property" => Some(FormField::Property),
            "start" => Some(FormField::Start),
            "end" => Some(FormField::End),
            "done" => Some(FormField::Done),
            "duration" => Some(FormField::Duration),
            _ => None,
        }
    }

    /// Fields that mirror live channel values while focused.
    fn takes_state(self) -> bool {
        matches!(self, FormField::Start | FormField::End | FormField::Done)
    }
}

/// Effect definition collected by the form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectDraft {
    pub light: String,
    pub property: String,
    pub start: String,
    pub end: String,
    pub done: String,
    pub duration: String,
}

/// Operator form for recording effects, driven from a hardware controller.
#[derive(Debug, Default)]
pub struct ControlForm {
    pub draft: EffectDraft,
    pub visible: bool,
    pub focused: Option<FormField>,
    /// Drafts that passed validation on save.
    pub saved: Vec<EffectDraft>,
    pub suspended: bool,
}

impl ControlForm {
    pub fn new() -> ControlForm {
        ControlForm::default()
    }

    fn field_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Light => &mut self.draft.light,
            FormField::Property => &mut self.draft.property,
            FormField::Start => &mut self.draft.start,
            FormField::End => &mut self.draft.end,
            FormField::Done => &mut self.draft.done,
            FormField::Duration => &mut self.draft.duration,
        }
    }

    /// Check the draft can become an effect.
    pub fn validate(&self) -> Result<(), &'static str> {
        let draft = &self.draft;
        if draft.light.is_empty() || draft.property.is_empty() || draft.duration.is_empty() {
            return Err("light, property, and duration are required");
        }
        if draft.start.is_empty() && draft.end.is_empty() {
            return Err("start or end are required");
        }
        Ok(())
    }

    fn hide(&mut self, clear: bool) {
        self.visible = false;
        self.focused = None;
        if clear {
            self.draft = EffectDraft::default();
        }
    }
}

impl ControlSink for ControlForm {
    fn suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    fn state(&mut self, fixture: &str, state: &ChannelState) {
        let field = match self.focused {
            Some(field) if field.takes_state() => field,
            _ => return,
        };
        if fixture != self.draft.light {
            return;
        }
        if let Some(value) = state.get(&self.draft.property) {
            *self.field_mut(field) = value.to_string();
        }
    }

    fn control(&mut self, control: &ManualControl) {
        match control {
            ManualControl::Select { name } => {
                self.draft.light = name.clone();
                self.visible = true;
            }
            ManualControl::Deselect => self.hide(true),
            ManualControl::Focus { field } => {
                self.focused = field.as_deref().and_then(FormField::from_name);
            }
            ManualControl::Property { name } => self.draft.property = name.clone(),
            ManualControl::Duration { value, unit } => {
                self.draft.duration = format!("{}{}", value, unit);
            }
            ManualControl::Save => {
                match self.validate() {
                    Ok(()) => self.saved.push(self.draft.clone()),
                    Err(reason) => warn!("[control] Not saving effect: {}", reason),
                }
                self.hide(false);
            }
            ManualControl::Cancel => self.hide(false),
        }
    }

    fn reset(&mut self) {
        self.hide(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(form: &mut ControlForm, controls: &[ManualControl]) {
        for control in controls {
            form.control(control);
        }
    }

    #[test]
    fn test_focused_field_mirrors_state() {
        let mut form = ControlForm::new();
        drive(
            &mut form,
            &[
                ManualControl::Select { name: "mh1".to_string() },
                ManualControl::Property { name: "pan".to_string() },
                ManualControl::Focus { field: Some("start".to_string()) },
            ],
        );
        form.state("mh2", &[("pan".to_string(), 1)].into());
        form.state("mh1", &[("tilt".to_string(), 2)].into());
        form.state("mh1", &[("pan".to_string(), 77)].into());
        assert_eq!(form.draft.start, "77");

        form.control(&ManualControl::Focus { field: Some("duration".to_string()) });
        form.state("mh1", &[("pan".to_string(), 99)].into());
        assert_eq!(form.draft.start, "77");
        assert_eq!(form.draft.duration, "");
    }

    #[test]
    fn test_save_validates() {
        let mut form = ControlForm::new();
        drive(
            &mut form,
            &[
                ManualControl::Select { name: "mh1".to_string() },
                ManualControl::Property { name: "dim".to_string() },
                ManualControl::Save,
            ],
        );
        assert!(form.saved.is_empty());
        assert!(!form.visible);

        drive(
            &mut form,
            &[
                ManualControl::Select { name: "mh1".to_string() },
                ManualControl::Duration { value: "5".to_string(), unit: "s".to_string() },
                ManualControl::Focus { field: Some("end".to_string()) },
            ],
        );
        form.state("mh1", &[("dim".to_string(), 255)].into());
        form.control(&ManualControl::Save);

        assert_eq!(form.saved.len(), 1);
        assert_eq!(form.saved[0].end, "255");
        assert_eq!(form.saved[0].duration, "5s");
    }

    #[test]
    fn test_deselect_clears() {
        let mut form = ControlForm::new();
        drive(
            &mut form,
            &[
                ManualControl::Select { name: "mh1".to_string() },
                ManualControl::Deselect,
            ],
        );
        assert_eq!(form.draft, EffectDraft::default());
        assert!(!form.visible);
    }
}
