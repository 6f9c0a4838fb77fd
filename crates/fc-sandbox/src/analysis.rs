//! Descriptive statistics for a loaded dataset

use serde::{Deserialize, Serialize};

use fc_core::{Cell, DataFrame, Error, Result};

use crate::format::{format_count, format_number, grid};

/// Summary of the target column, in the usual describe() layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    #[serde(rename = "50%")]
    pub p50: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
}

impl TargetStats {
    /// NaN stands in for statistics that are undefined on the sample
    pub fn compute(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();

        let mean = if n == 0 {
            f64::NAN
        } else {
            sorted.iter().sum::<f64>() / n as f64
        };
        let std = if n < 2 {
            f64::NAN
        } else {
            let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        };

        Self {
            count: n,
            mean,
            std,
            min: sorted.first().copied().unwrap_or(f64::NAN),
            p25: percentile(&sorted, 0.25),
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            max: sorted.last().copied().unwrap_or(f64::NAN),
        }
    }

    /// `(metric, formatted value)` rows
    pub fn rows(&self) -> Vec<Vec<String>> {
        [
            ("count", self.count as f64),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.p25),
            ("50%", self.p50),
            ("75%", self.p75),
            ("max", self.max),
        ]
        .into_iter()
        .map(|(metric, value)| vec![metric.to_string(), format_number(value)])
        .collect()
    }
}

/// Linear interpolation between closest ranks of sorted data
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallAnalysis {
    pub total_series: usize,
    pub date_range: Option<(String, String)>,
    pub target_stats: TargetStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesAnalysis {
    pub series: String,
    pub length: usize,
    pub target_stats: TargetStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetAnalysis {
    pub overall: OverallAnalysis,
    /// In order of first appearance
    pub per_series: Vec<SeriesAnalysis>,
}

fn target_values(frame: &DataFrame, target: &str, rows: Option<&[usize]>) -> Result<Vec<f64>> {
    let column = frame
        .column(target)
        .ok_or_else(|| Error::dataset(format!("Column '{}' not found", target)))?;
    if !column.dtype().is_numeric() {
        return Err(Error::dataset(format!(
            "Target column '{}' is not numeric ({})",
            target,
            column.dtype()
        )));
    }
    let values = column.values();
    Ok(match rows {
        Some(rows) => rows.iter().filter_map(|r| values[*r].as_f64()).collect(),
        None => values.iter().filter_map(Cell::as_f64).collect(),
    })
}

fn date_range(frame: &DataFrame) -> Option<(String, String)> {
    let column = frame.column("date")?;
    let values = column.values().iter().filter(|v| !v.is_null());
    let dates: Vec<_> = values.clone().filter_map(Cell::as_datetime).collect();
    if !dates.is_empty() {
        let min = dates.iter().min()?;
        let max = dates.iter().max()?;
        return Some((
            Cell::DateTime(*min).to_string(),
            Cell::DateTime(*max).to_string(),
        ));
    }
    let texts: Vec<String> = values.map(|v| v.to_string()).collect();
    Some((texts.iter().min()?.clone(), texts.iter().max()?.clone()))
}

/// Overall and per-series statistics of `target`, split by `series_id`
pub fn describe_dataset(frame: &DataFrame, target: &str, series_id: &str) -> Result<DatasetAnalysis> {
    let groups = frame.group_rows(series_id)?;

    let overall = OverallAnalysis {
        total_series: groups.len(),
        date_range: date_range(frame),
        target_stats: TargetStats::compute(&target_values(frame, target, None)?),
    };

    let per_series = groups
        .into_iter()
        .map(|(series, rows)| {
            let values = target_values(frame, target, Some(&rows))?;
            Ok(SeriesAnalysis {
                series,
                length: rows.len(),
                target_stats: TargetStats::compute(&values),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DatasetAnalysis { overall, per_series })
}

pub fn format_analysis_output(analysis: &DatasetAnalysis) -> String {
    let mut out = vec!["\n=== Overall Analysis ===".to_string()];
    out.push(format!("Total Series: {}", analysis.overall.total_series));
    match &analysis.overall.date_range {
        Some((start, end)) => out.push(format!("Date Range: {} to {}", start, end)),
        None => out.push("Date Range: unknown".to_string()),
    }

    out.push("\nOverall Target Statistics:".to_string());
    out.push(grid(&["Metric", "Value"], &analysis.overall.target_stats.rows()));

    out.push("\n=== Per Series Analysis ===".to_string());
    for series in &analysis.per_series {
        out.push(format!("\nSeries: {}", series.series));
        out.push(format!("Number of records: {}", format_count(series.length)));
        out.push(grid(&["Metric", "Value"], &series.target_stats.rows()));
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
date,value,series
2024-01-03,10,a
2024-01-01,20,a
2024-01-02,30,a
2024-01-01,5,b
2024-01-02,7,b
";

    fn frame() -> DataFrame {
        DataFrame::from_csv_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_stats_match_describe() {
        let stats = TargetStats::compute(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.std - 1.290_994).abs() < 1e-6);
        assert_eq!(stats.p25, 1.75);
        assert_eq!(stats.p50, 2.5);
        assert_eq!(stats.p75, 3.25);
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
    }

    #[test]
    fn test_single_value_has_undefined_std() {
        let stats = TargetStats::compute(&[5.0]);
        assert!(stats.std.is_nan());
        assert_eq!(stats.rows()[2], vec!["std".to_string(), "nan".to_string()]);
    }

    #[test]
    fn test_describe_dataset() {
        let analysis = describe_dataset(&frame(), "value", "series").unwrap();

        assert_eq!(analysis.overall.total_series, 2);
        assert_eq!(
            analysis.overall.date_range,
            Some(("2024-01-01".to_string(), "2024-01-03".to_string()))
        );
        assert_eq!(analysis.overall.target_stats.count, 5);
        let names: Vec<&str> = analysis.per_series.iter().map(|s| s.series.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(analysis.per_series[0].target_stats.mean, 20.0);
        assert_eq!(analysis.per_series[1].length, 2);
    }

    #[test]
    fn test_describe_converted_dates() {
        let mut df = frame();
        df.coerce_datetime("date").unwrap();
        let analysis = describe_dataset(&df, "value", "series").unwrap();
        assert_eq!(
            analysis.overall.date_range,
            Some(("2024-01-01 00:00:00".to_string(), "2024-01-03 00:00:00".to_string()))
        );
    }

    #[test]
    fn test_non_numeric_target_rejected() {
        assert!(describe_dataset(&frame(), "series", "series").is_err());
        assert!(describe_dataset(&frame(), "value", "region").is_err());
    }

    #[test]
    fn test_format_analysis_output() {
        let analysis = describe_dataset(&frame(), "value", "series").unwrap();
        let text = format_analysis_output(&analysis);

        assert!(text.starts_with("\n=== Overall Analysis ===\nTotal Series: 2\n"));
        assert!(text.contains("Date Range: 2024-01-01 to 2024-01-03"));
        assert!(text.contains("\nSeries: b\nNumber of records: 2\n+"));
        assert!(text.contains("| mean   | 20.00 |"));
    }

    #[test]
    fn test_analysis_serializes_with_describe_keys() {
        let analysis = describe_dataset(&frame(), "value", "series").unwrap();
        let value = serde_json::to_value(&analysis).unwrap();
        assert_eq!(value["overall"]["target_stats"]["50%"], 10.0);
    }
}
