use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_cell, is_record_array};

/// Print the envelope as tables.
///
/// Scalar result fields go in one Field/Value table. Nested sections (sources
/// & uses, metrics, summaries) get their own Field/Value table and record
/// arrays (cash flows, waterfall periods, annual rows) a columnar table, each
/// under its key as a heading. Warnings and methodology follow.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => {
                print_section(None, result);
                print_envelope_footer(map);
            }
            None => print_section(None, value),
        },
        _ => print_section(None, value),
    }
}

fn print_section(title: Option<&str>, value: &Value) {
    match value {
        Value::Object(map) => print_object(title, map),
        Value::Array(arr) if is_record_array(value) => {
            print_heading(title);
            print_records(arr);
        }
        Value::Array(arr) if arr.is_empty() => {
            print_heading(title);
            println!("(empty)");
        }
        _ => {
            print_heading(title);
            println!("{}", format_list(value));
        }
    }
}

fn print_object(title: Option<&str>, map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut nested: Vec<(&str, &Value)> = Vec::new();
    let mut scalar_rows = 0;

    for (key, val) in map {
        match val {
            Value::Object(_) => nested.push((key.as_str(), val)),
            Value::Array(_) if is_record_array(val) => nested.push((key.as_str(), val)),
            _ => {
                builder.push_record([key.as_str(), &format_list(val)]);
                scalar_rows += 1;
            }
        }
    }

    if scalar_rows > 0 {
        print_heading(title);
        println!("{}", Table::from(builder));
    }

    for (key, val) in nested {
        let heading = match title {
            Some(parent) => format!("{parent}.{key}"),
            None => key.to_string(),
        };
        print_section(Some(heading.as_str()), val);
    }
}

fn print_records(arr: &[Value]) {
    let headers: Vec<String> = match arr.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => return,
    };

    let mut builder = Builder::default();
    builder.push_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(format_list).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }
    }
    println!("{}", Table::from(builder));
}

fn print_heading(title: Option<&str>) {
    if let Some(t) = title {
        println!("\n{t}:");
    }
}

fn print_envelope_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Arrays of scalars (sweep axes, matrix rows) read better comma-joined.
fn format_list(value: &Value) -> String {
    match value {
        Value::Array(arr) if !is_record_array(value) => {
            let items: Vec<String> = arr.iter().map(format_list).collect();
            format!("[{}]", items.join(", "))
        }
        _ => format_cell(value),
    }
}
