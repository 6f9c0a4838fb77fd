//! Text rendering for results shown to the operator

use fc_core::ExecutionResult;

/// Render rows as a grid table
///
/// ```text
/// +--------+-------+
/// | Metric | Value |
/// +========+=======+
/// | count  | 3.00  |
/// +--------+-------+
/// ```
pub fn grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = vec![
        rule(&widths, '-'),
        grid_line(&widths, headers.iter().copied()),
        rule(&widths, '='),
    ];
    for row in rows {
        out.push(grid_line(&widths, row.iter().map(String::as_str)));
        out.push(rule(&widths, '-'));
    }
    out.join("\n")
}

fn rule(widths: &[usize], fill: char) -> String {
    let segments: Vec<String> = widths
        .iter()
        .map(|w| fill.to_string().repeat(w + 2))
        .collect();
    format!("+{}+", segments.join("+"))
}

fn grid_line<'a>(widths: &[usize], mut cells: impl Iterator<Item = &'a str>) -> String {
    let padded: Vec<String> = widths
        .iter()
        .map(|w| {
            let cell = cells.next().unwrap_or("");
            let pad = w.saturating_sub(cell.chars().count());
            format!(" {}{} ", cell, " ".repeat(pad))
        })
        .collect();
    format!("|{}|", padded.join("|"))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Two decimals with thousands separators (`1,234.50`)
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, group_thousands(int_part), frac_part)
}

/// Integer with thousands separators
pub fn format_count(value: usize) -> String {
    group_thousands(&value.to_string())
}

/// Render a sandbox result for the operator
pub fn format_code_output(result: &ExecutionResult) -> String {
    let mut out = vec!["\n=== Code Execution Results ===".to_string()];

    if result.success {
        if !result.stdout.is_empty() {
            out.push("\nOutput:".to_string());
            out.push(result.stdout.clone());
        }
        if !result.bindings.is_empty() {
            out.push("\nReturned Variables:".to_string());
            for (name, value) in &result.bindings {
                out.push(format!("\n{}:", name));
                out.push(value.clone());
            }
        }
    } else {
        out.push("\nExecution Failed:".to_string());
        out.push(result.error_text().unwrap_or_default());
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::Diagnostics;
    use std::collections::BTreeMap;

    #[test]
    fn test_grid_layout() {
        let table = grid(
            &["Metric", "Value"],
            &[
                vec!["count".to_string(), "3.00".to_string()],
                vec!["mean".to_string(), "1,234.50".to_string()],
            ],
        );
        let expected = "\
+--------+----------+
| Metric | Value    |
+========+==========+
| count  | 3.00     |
+--------+----------+
| mean   | 1,234.50 |
+--------+----------+";
        assert_eq!(table, expected);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1234.5), "1,234.50");
        assert_eq!(format_number(-1234567.891), "-1,234,567.89");
        assert_eq!(format_number(12.0), "12.00");
        assert_eq!(format_number(-0.001), "0.00");
        assert_eq!(format_number(f64::NAN), "nan");
        assert_eq!(format_count(1500), "1,500");
        assert_eq!(format_count(999), "999");
    }

    #[test]
    fn test_format_code_output_success() {
        let mut bindings = BTreeMap::new();
        bindings.insert("result".to_string(), "60".to_string());
        let result = ExecutionResult::success("hello\n", bindings, Diagnostics::default());

        let text = format_code_output(&result);

        assert_eq!(
            text,
            "\n=== Code Execution Results ===\n\nOutput:\nhello\n\n\nReturned Variables:\n\nresult:\n60"
        );
    }

    #[test]
    fn test_format_code_output_quiet_success() {
        let result = ExecutionResult::success("", BTreeMap::new(), Diagnostics::default());
        assert_eq!(format_code_output(&result), "\n=== Code Execution Results ===");
    }
}
