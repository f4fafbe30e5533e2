// Formula evaluator - walks the AST against a cell-map snapshot

use crate::addr::cell_id;
use crate::cell::{coerce_number, CellMap, Value};

use super::parser::{self, Expr, Op};

/// Computed value of a formula that failed to evaluate.
pub const ERROR_SENTINEL: &str = "#ERROR";
/// Computed value of a formula referencing a structurally removed cell.
pub const REF_SENTINEL: &str = "#REF!";

/// Intermediate result while walking an expression: a scalar, the
/// flattened contents of a range, or an error sentinel on its way out.
#[derive(Debug, Clone, PartialEq)]
enum Eval {
    Number(f64),
    List(Vec<f64>),
    Error(String),
}

/// Evaluate one cell's raw text against a snapshot of the cell map.
///
/// Text without a leading '=' is a literal: numeric strings become
/// numbers, everything else passes through unchanged. Formulas evaluate
/// to a number or to a sentinel; the input map is never mutated.
pub fn evaluate_formula(formula: &str, cells: &CellMap) -> Value {
    if !formula.starts_with('=') {
        return match formula.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(formula.to_string()),
        };
    }

    let expr = match parser::parse(formula) {
        Ok(expr) => expr,
        Err(_) => return Value::Text(ERROR_SENTINEL.to_string()),
    };

    match eval_expr(&expr, cells) {
        Eval::Number(n) => Value::Number(n),
        // A bare range has no scalar value
        Eval::List(_) => Value::Text(ERROR_SENTINEL.to_string()),
        Eval::Error(sentinel) => Value::Text(sentinel),
    }
}

fn eval_expr(expr: &Expr, cells: &CellMap) -> Eval {
    match expr {
        Expr::Number(n) => Eval::Number(*n),
        Expr::RefError => Eval::Error(REF_SENTINEL.to_string()),
        Expr::CellRef { col, row } => Eval::Number(resolve(cells, *col, *row)),
        Expr::Range {
            start_col,
            start_row,
            end_col,
            end_row,
        } => Eval::List(flatten_range(
            cells, *start_col, *start_row, *end_col, *end_row,
        )),
        Expr::Function { name, args } => eval_function(name, args, cells),
        Expr::BinaryOp { op, left, right } => {
            let left = eval_expr(left, cells);
            if let Eval::Error(e) = left {
                return Eval::Error(e);
            }
            let right = eval_expr(right, cells);
            if let Eval::Error(e) = right {
                return Eval::Error(e);
            }
            let (Eval::Number(a), Eval::Number(b)) = (left, right) else {
                // Ranges are only meaningful as function arguments
                return Eval::Error(ERROR_SENTINEL.to_string());
            };
            Eval::Number(match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => a / b,
                Op::Pow => a.powf(b),
            })
        }
    }
}

/// Resolve a reference to a number: computed value if present, else the
/// raw value, else 0 for an absent cell; non-numeric coerces to 0.
fn resolve(cells: &CellMap, col: usize, row: usize) -> f64 {
    match cells.get(&cell_id(col, row)) {
        Some(cell) => match &cell.computed {
            Some(value) => value.as_number(),
            None => coerce_number(&cell.value),
        },
        None => 0.0,
    }
}

/// Flatten a range row-major over min..max of each axis, independent of
/// the direction the endpoints were written in.
fn flatten_range(
    cells: &CellMap,
    start_col: usize,
    start_row: usize,
    end_col: usize,
    end_row: usize,
) -> Vec<f64> {
    let (c0, c1) = (start_col.min(end_col), start_col.max(end_col));
    let (r0, r1) = (start_row.min(end_row), start_row.max(end_row));
    let mut vals = Vec::with_capacity((c1 - c0 + 1) * (r1 - r0 + 1));
    for r in r0..=r1 {
        for c in c0..=c1 {
            vals.push(resolve(cells, c, r));
        }
    }
    vals
}

fn eval_function(name: &str, args: &[Expr], cells: &CellMap) -> Eval {
    match name {
        "SUM" | "AVERAGE" | "MAX" | "MIN" => {
            let mut vals = Vec::new();
            for arg in args {
                match eval_expr(arg, cells) {
                    Eval::Number(n) => vals.push(n),
                    Eval::List(list) => vals.extend(list),
                    Eval::Error(e) => return Eval::Error(e),
                }
            }
            Eval::Number(match name {
                "SUM" => vals.iter().sum(),
                "AVERAGE" => {
                    if vals.is_empty() {
                        0.0
                    } else {
                        vals.iter().sum::<f64>() / vals.len() as f64
                    }
                }
                "MAX" => vals.iter().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v)),
                "MIN" => vals.iter().fold(f64::INFINITY, |acc, v| acc.min(*v)),
                _ => unreachable!(),
            })
        }
        "SIN" | "COS" | "TAN" | "ABS" | "SQRT" => {
            let [arg] = args else {
                return Eval::Error(ERROR_SENTINEL.to_string());
            };
            match eval_expr(arg, cells) {
                Eval::Number(n) => Eval::Number(match name {
                    "SIN" => n.sin(),
                    "COS" => n.cos(),
                    "TAN" => n.tan(),
                    "ABS" => n.abs(),
                    "SQRT" => n.sqrt(),
                    _ => unreachable!(),
                }),
                Eval::List(_) => Eval::Error(ERROR_SENTINEL.to_string()),
                Eval::Error(e) => Eval::Error(e),
            }
        }
        "PI" => {
            if args.is_empty() {
                Eval::Number(std::f64::consts::PI)
            } else {
                Eval::Error(ERROR_SENTINEL.to_string())
            }
        }
        _ => Eval::Error(ERROR_SENTINEL.to_string()),
    }
}
