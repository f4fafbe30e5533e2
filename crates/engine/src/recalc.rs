//! Whole-map re-evaluation.
//!
//! There is no dependency graph and no dirty tracking: every mutation
//! triggers a full sweep of the map, repeated a fixed number of times so
//! that forward references settle. Chains deeper than the pass count stay
//! stale until the next mutation.

use crate::cell::{CellMap, Value};
use crate::formula::eval::evaluate_formula;

/// Number of full sweeps per reevaluation. Bounds forward-reference
/// propagation to chains 5 deep.
pub const REEVAL_PASSES: usize = 5;

/// Refresh every cell's computed value from its raw value.
///
/// The input map is left untouched; the returned map carries the
/// refreshed computed fields. Each pass evaluates against the working
/// copy, so values settled earlier in the sweep are visible to later
/// cells within the same pass.
pub fn reevaluate(cells: &CellMap) -> CellMap {
    let mut next = cells.clone();
    let keys: Vec<String> = next.keys().cloned().collect();

    for _ in 0..REEVAL_PASSES {
        for key in &keys {
            let value = match next.get(key) {
                Some(cell) => cell.value.clone(),
                None => continue,
            };
            let computed = if value.is_empty() {
                Value::Text(String::new())
            } else {
                evaluate_formula(&value, &next)
            };
            if let Some(cell) = next.get_mut(key) {
                cell.computed = Some(computed);
            }
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellData;

    fn map(entries: &[(&str, &str)]) -> CellMap {
        let mut cells = CellMap::default();
        for (id, value) in entries {
            cells.insert(id.to_string(), CellData::from_value(*value));
        }
        cells
    }

    fn computed<'a>(cells: &'a CellMap, id: &str) -> &'a Value {
        cells[id].computed.as_ref().unwrap()
    }

    #[test]
    fn test_literals() {
        let out = reevaluate(&map(&[("A1", "2"), ("A2", "note"), ("A3", "")]));
        assert_eq!(computed(&out, "A1"), &Value::Number(2.0));
        assert_eq!(computed(&out, "A2"), &Value::Text("note".to_string()));
        assert_eq!(computed(&out, "A3"), &Value::Text(String::new()));
    }

    #[test]
    fn test_formula_over_literals() {
        let out = reevaluate(&map(&[
            ("A1", "1"),
            ("A2", "2"),
            ("A3", "3"),
            ("B1", "=SUM(A1:A3)"),
            ("C1", "=AVERAGE(A1:A3)"),
        ]));
        assert_eq!(computed(&out, "B1"), &Value::Number(6.0));
        assert_eq!(computed(&out, "C1"), &Value::Number(2.0));
    }

    #[test]
    fn test_forward_chain_settles_within_five_passes() {
        // Five levels of dependency, in whatever order the map iterates
        let out = reevaluate(&map(&[
            ("A1", "=A2+1"),
            ("A2", "=A3+1"),
            ("A3", "=A4+1"),
            ("A4", "=A5+1"),
            ("A5", "10"),
        ]));
        assert_eq!(computed(&out, "A5"), &Value::Number(10.0));
        assert_eq!(computed(&out, "A1"), &Value::Number(14.0));
    }

    #[test]
    fn test_idempotent_for_shallow_maps() {
        let input = map(&[
            ("A1", "1"),
            ("A2", "=A1*2"),
            ("A3", "=A2*2"),
            ("B1", "label"),
            ("B2", ""),
        ]);
        let once = reevaluate(&input);
        let twice = reevaluate(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_failed_formula_gets_error_sentinel() {
        let out = reevaluate(&map(&[("A1", "=NOPE(1)"), ("A2", "=1+")]));
        assert_eq!(computed(&out, "A1"), &Value::Text("#ERROR".to_string()));
        assert_eq!(computed(&out, "A2"), &Value::Text("#ERROR".to_string()));
    }

    #[test]
    fn test_input_not_mutated() {
        let input = map(&[("A1", "1"), ("A2", "=A1")]);
        let before = input.clone();
        let _ = reevaluate(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn test_error_cells_coerce_to_zero_downstream() {
        let out = reevaluate(&map(&[("A1", "=BAD("), ("B1", "=A1+5")]));
        assert_eq!(computed(&out, "A1"), &Value::Text("#ERROR".to_string()));
        assert_eq!(computed(&out, "B1"), &Value::Number(5.0));
    }
}
