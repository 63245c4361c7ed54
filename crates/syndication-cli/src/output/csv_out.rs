use serde_json::Value;
use std::io;

use super::{format_cell, is_record_array};

/// Write the envelope's result as CSV on stdout.
///
/// A record array (cash flows, a bare waterfall) becomes one row per record.
/// An object result becomes field,value rows, except that an object holding
/// a `periods` record array (the waterfall view) is written as those periods.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = match value {
        Value::Object(map) => map.get("result").unwrap_or(value),
        _ => value,
    };

    match result {
        Value::Array(arr) if is_record_array(result) => write_records(&mut wtr, arr),
        Value::Object(map) => match map.get("periods") {
            Some(periods @ Value::Array(arr)) if is_record_array(periods) => {
                write_records(&mut wtr, arr)
            }
            _ => {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_cell(val)]);
                }
            }
        },
        Value::Array(arr) => {
            for item in arr {
                let _ = wtr.write_record([&format_cell(item)]);
            }
        }
        _ => {
            let _ = wtr.write_record([&format_cell(result)]);
        }
    }

    let _ = wtr.flush();
}

fn write_records(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    let headers: Vec<&str> = match arr.first() {
        Some(Value::Object(first)) => first.keys().map(|k| k.as_str()).collect(),
        _ => return,
    };
    let _ = wtr.write_record(&headers);

    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_cell).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}
