use serde_json::Value;

use super::format_cell;

/// Headline figures, checked in order at the top level of the result and then
/// one level down (e.g. `metrics.levered_irr` in a full analysis).
const PRIORITY_KEYS: [&str; 8] = [
    "levered_irr",
    "irr",
    "lp_irr",
    "equity_multiple",
    "base_case_value",
    "level_payment",
    "total_equity",
    "errors",
];

/// Print just the headline value of the output.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result {
        if let Some(found) = find_priority(result) {
            println!("{}", format_cell(found));
            return;
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_cell(val));
            return;
        }
    }

    println!("{}", format_cell(result));
}

fn find_priority(result: &Value) -> Option<&Value> {
    let map = result.as_object()?;
    for key in PRIORITY_KEYS {
        if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
            return Some(val);
        }
    }
    map.values()
        .filter(|v| v.is_object())
        .find_map(|nested| {
            let inner = nested.as_object()?;
            PRIORITY_KEYS
                .iter()
                .find_map(|key| inner.get(*key).filter(|v| !v.is_null()))
        })
}
