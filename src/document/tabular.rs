//! CSV invoices
//!
//! Turns header-plus-rows text into an invoice mapping the parse stage can
//! resolve. Each row that fills a line-item column becomes a line item;
//! headline columns (invoice number, parties, totals) take the first
//! non-empty value found in any row.

use serde_json::{Map, Number, Value};

/// Columns that describe a single line
const LINE_COLUMNS: [&str; 6] = ["description", "hsn_sac", "quantity", "unit", "rate", "amount"];

/// Invoice-level columns and where they land in the mapping
const HEADLINE_COLUMNS: [(&str, &[&str]); 16] = [
    ("invoice_number", &["invoice_number"]),
    ("invoice_date", &["invoice_date"]),
    ("vendor_name", &["vendor", "name"]),
    ("vendor_gstin", &["vendor", "gstin"]),
    ("buyer_name", &["buyer", "name"]),
    ("buyer_gstin", &["buyer", "gstin"]),
    ("subtotal", &["subtotal"]),
    ("cgst_rate", &["cgst_rate"]),
    ("cgst_amount", &["cgst_amount"]),
    ("sgst_rate", &["sgst_rate"]),
    ("sgst_amount", &["sgst_amount"]),
    ("igst_rate", &["igst_rate"]),
    ("igst_amount", &["igst_amount"]),
    ("total_tax", &["total_tax"]),
    ("total_amount", &["total_amount"]),
    ("confidence", &["confidence"]),
];

/// `Vendor GSTIN`, `vendor-gstin` and `vendor.gstin` all become `vendor_gstin`
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Split one CSV record, honouring double-quoted fields and `""` escapes
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Numbers stay numbers; anything else is left as text for the invoice coercion to judge
fn cell_value(cell: &str) -> Value {
    let cleaned: String = cell.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

fn insert_path(target: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [key] => {
            target.entry(key.to_string()).or_insert(value);
        }
        [key, rest @ ..] => {
            let child = target
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
        [] => {}
    }
}

/// Invoice mapping from CSV text; `None` when the header names no invoice column
pub fn invoice_from_csv(text: &str) -> Option<Value> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<String> = split_record(lines.next()?)
        .iter()
        .map(|h| normalize_header(h))
        .collect();

    let known = headers.iter().any(|h| {
        LINE_COLUMNS.contains(&h.as_str()) || HEADLINE_COLUMNS.iter().any(|(c, _)| c == h)
    });
    if !known {
        return None;
    }

    let mut invoice = Map::new();
    let mut line_items = Vec::new();

    for line in lines {
        let cells = split_record(line);
        let mut item = Map::new();

        for (header, cell) in headers.iter().zip(cells.iter()) {
            if cell.is_empty() {
                continue;
            }
            if LINE_COLUMNS.contains(&header.as_str()) {
                let value = if matches!(header.as_str(), "quantity" | "rate" | "amount") {
                    cell_value(cell)
                } else {
                    Value::String(cell.clone())
                };
                item.insert(header.clone(), value);
            } else if let Some((_, path)) = HEADLINE_COLUMNS.iter().find(|(c, _)| c == header) {
                let value = match *path {
                    ["invoice_number"] | ["invoice_date"] | [_, _] => Value::String(cell.clone()),
                    _ => cell_value(cell),
                };
                insert_path(&mut invoice, path, value);
            }
        }

        if !item.is_empty() {
            line_items.push(Value::Object(item));
        }
    }

    invoice.insert("line_items".to_string(), Value::Array(line_items));
    Some(Value::Object(invoice))
}
