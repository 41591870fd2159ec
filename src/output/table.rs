//! Tabular overview: one row per fixture, one column per channel.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::fixture::{Fixture, OpKind, Output, OutputId};

/// Columns every table starts with.
const FIXED_HEADERS: [&str; 4] = ["name", "type", "effects", "state_effects"];

/// Rendered cells of one row, shared between the row observer and the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub cells: Vec<String>,
    pub selected: bool,
}

/// Observer keeping one table row up to date.
pub struct TableRowOutput {
    headers: Rc<Vec<String>>,
    row: Rc<RefCell<Row>>,
}

impl Output for TableRowOutput {
    fn render(&mut self, fixture: &Fixture) {
        let cells = self
            .headers
            .iter()
            .map(|header| match header.as_str() {
                "name" => fixture.name.clone(),
                "type" => fixture.kind.clone(),
                "effects" => fixture.effects().lines(OpKind::Effect).join(", "),
                "state_effects" => fixture.effects().lines(OpKind::StateEffect).join(", "),
                channel => fixture
                    .channel(channel)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            })
            .collect();

        let mut row = self.row.borrow_mut();
        row.cells = cells;
        row.selected = fixture.is_selected();
    }

    fn destroy(&mut self) {
        *self.row.borrow_mut() = Row::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Table over a set of fixtures.
pub struct TableOutput {
    headers: Rc<Vec<String>>,
    rows: Vec<(String, OutputId, Rc<RefCell<Row>>)>,
}

impl TableOutput {
    /// Lay out the columns for `fixtures` and attach a row observer to each.
    pub fn new<'a, I>(fixtures: I) -> TableOutput
    where
        I: IntoIterator<Item = &'a mut Fixture>,
    {
        let fixtures: Vec<&mut Fixture> = fixtures.into_iter().collect();

        let mut headers: Vec<String> = FIXED_HEADERS.iter().map(|h| h.to_string()).collect();
        for fixture in &fixtures {
            for function in &fixture.functions {
                if !headers.contains(function) {
                    headers.push(function.clone());
                }
            }
        }
        let headers = Rc::new(headers);

        let mut rows = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let row = Rc::new(RefCell::new(Row::default()));
            let id = fixture.subscribe(Box::new(TableRowOutput {
                headers: headers.clone(),
                row: row.clone(),
            }));
            rows.push((fixture.name.clone(), id, row));
        }

        TableOutput { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Current rows, in the order the table was built.
    pub fn rows(&self) -> Vec<(String, Row)> {
        self.rows
            .iter()
            .map(|(name, _, row)| (name.clone(), row.borrow().clone()))
            .collect()
    }

    pub fn row(&self, name: &str) -> Option<Row> {
        self.rows
            .iter()
            .find(|(row_name, _, _)| row_name == name)
            .map(|(_, _, row)| row.borrow().clone())
    }

    /// Which observer of which fixture feeds each row.
    pub fn output_ids(&self) -> Vec<(String, OutputId)> {
        self.rows
            .iter()
            .map(|(name, id, _)| (name.clone(), *id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureDescriptor;

    fn fixture(json: &str) -> Fixture {
        Fixture::new(serde_json::from_str::<FixtureDescriptor>(json).unwrap())
    }

    #[test]
    fn test_headers_and_rows() {
        let mut a = fixture(r#"{"type": "Par", "name": "a", "functions": ["red", "dim"], "state": {"dim": 4}}"#);
        let mut b = fixture(r#"{"type": "Laser", "name": "b", "functions": ["dim", "pattern"]}"#);
        let table = TableOutput::new(vec![&mut a, &mut b]);

        assert_eq!(
            table.headers(),
            ["name", "type", "effects", "state_effects", "red", "dim", "pattern"]
        );
        assert_eq!(table.row("a").unwrap().cells, ["a", "Par", "", "", "", "4", ""]);

        b.patch(&[("pattern".to_string(), 7)].into());
        b.set_selected(true);
        let row = table.row("b").unwrap();
        assert_eq!(row.cells, ["b", "Laser", "", "", "", "", "7"]);
        assert!(row.selected);

        b.destroy();
        assert_eq!(table.row("b").unwrap(), Row::default());
        assert_eq!(table.rows().len(), 2);
    }
}
