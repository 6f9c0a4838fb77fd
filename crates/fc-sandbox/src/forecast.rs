//! Forecast collaborator
//!
//! The agent treats forecasting as opaque: hand over the frame, target,
//! series column and horizon, get back per-series points or an error string.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use fc_core::{DataFrame, Error, Result};

use crate::format::{format_number, grid};
use crate::runtime::{Capabilities, ScriptRuntime};

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: String,
    pub value: f64,
}

/// Points for one series, or why it could not be forecast
pub type SeriesForecast = std::result::Result<Vec<ForecastPoint>, String>;

#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Forecast `horizon` periods per series, in order of first appearance
    async fn forecast(
        &self,
        frame: &DataFrame,
        target: &str,
        series_id: &str,
        horizon: usize,
    ) -> Result<Vec<(String, SeriesForecast)>>;
}

/// Binding the forecast script leaves its JSON result in
const RESULT_BINDING: &str = "forecast_json";

const PROPHET_SCRIPT: &str = r#"
import json
from prophet import Prophet

_results = []
for _series in df[__FC_SERIES__].unique():
    _frame = df[df[__FC_SERIES__] == _series].copy()
    _frame['ds'] = pd.to_datetime(_frame['date'])
    _frame['y'] = _frame[__FC_TARGET__]
    try:
        _model = Prophet(yearly_seasonality=True, weekly_seasonality=True, daily_seasonality=True)
        _model.fit(_frame[['ds', 'y']])
        _future = _model.make_future_dataframe(periods=__FC_HORIZON__, freq='H')
        _tail = _model.predict(_future).tail(__FC_HORIZON__)
        _results.append([str(_series), {
            'timestamps': _tail['ds'].dt.strftime('%Y-%m-%d %H:%M:%S').tolist(),
            'forecast': [float(v) for v in _tail['yhat']],
        }])
    except Exception as _exc:
        _results.append([str(_series), 'Error forecasting: %s' % _exc])
forecast_json = json.dumps(_results)
"#;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSeries {
    Points { timestamps: Vec<String>, forecast: Vec<f64> },
    Failed(String),
}

/// Prophet run through the script runtime, hourly frequency
pub struct ProphetForecaster {
    runtime: Arc<dyn ScriptRuntime>,
}

impl ProphetForecaster {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self { runtime }
    }

    fn script(target: &str, series_id: &str, horizon: usize) -> Result<String> {
        // JSON string literals are valid Python string literals
        Ok(PROPHET_SCRIPT
            .replace("__FC_HORIZON__", &horizon.to_string())
            .replace("__FC_TARGET__", &serde_json::to_string(target)?)
            .replace("__FC_SERIES__", &serde_json::to_string(series_id)?))
    }
}

fn parse_forecasts(json: &str) -> Result<Vec<(String, SeriesForecast)>> {
    let raw: Vec<(String, RawSeries)> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|(series, data)| {
            let forecast = match data {
                RawSeries::Points {
                    timestamps,
                    forecast,
                } => Ok(timestamps
                    .into_iter()
                    .zip(forecast)
                    .map(|(timestamp, value)| ForecastPoint { timestamp, value })
                    .collect()),
                RawSeries::Failed(message) => Err(message),
            };
            (series, forecast)
        })
        .collect())
}

#[async_trait]
impl Forecaster for ProphetForecaster {
    async fn forecast(
        &self,
        frame: &DataFrame,
        target: &str,
        series_id: &str,
        horizon: usize,
    ) -> Result<Vec<(String, SeriesForecast)>> {
        info!(target_column = %target, series_column = %series_id, horizon, "Running forecast");
        let code = Self::script(target, series_id, horizon)?;
        let outcome = self
            .runtime
            .run(&code, Some(frame), &Capabilities::default())
            .await?;

        if !outcome.success {
            return Err(Error::execution_failure(format!(
                "Forecast failed: {}: {}",
                outcome.error_type.unwrap_or_else(|| "Exception".to_string()),
                outcome.error_msg.unwrap_or_default()
            )));
        }
        let json = outcome
            .bindings
            .get(RESULT_BINDING)
            .ok_or_else(|| Error::execution_failure("Forecast produced no results"))?;
        parse_forecasts(json)
    }
}

pub fn format_forecast_output(forecasts: &[(String, SeriesForecast)]) -> String {
    let mut out = vec!["\n=== Forecasting Results ===".to_string()];
    for (series, forecast) in forecasts {
        out.push(format!("\nSeries: {}", series));
        match forecast {
            Ok(points) => {
                let rows: Vec<Vec<String>> = points
                    .iter()
                    .map(|p| vec![p.timestamp.clone(), format_number(p.value)])
                    .collect();
                out.push(grid(&["Timestamp", "Forecast"], &rows));
            }
            Err(message) => out.push(message.clone()),
        }
    }
    out.join("\n")
}
