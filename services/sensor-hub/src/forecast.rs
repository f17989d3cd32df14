use chrono::{DateTime, Duration, Utc};

use crate::error::ApiError;
use crate::store::Reading;

/// Forecast strategy. `Window` is the baseline; `Trend` fits all history
/// and costs more as the series grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Window,
    Trend,
}

impl Strategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "window" => Some(Self::Window),
            "trend" => Some(Self::Trend),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Trend => "trend",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Forecast {
    pub prediction: f64,
    /// Samples the prediction was computed from. Zero means "no data",
    /// which callers must not confuse with a real 0.0 prediction.
    pub data_points: usize,
    /// The strategy that actually ran (the trend path may degrade).
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastParams {
    pub window: Duration,
    pub horizon_hours: u32,
    pub min_trend_samples: usize,
    pub max_fit_points: usize,
}

/// Runs the requested strategy over `readings` (full history, ascending).
pub fn predict(
    readings: &[Reading],
    strategy: Strategy,
    now: DateTime<Utc>,
    params: &ForecastParams,
) -> Result<Forecast, ApiError> {
    match strategy {
        Strategy::Window => Ok(windowed_average(readings, now - params.window)),
        Strategy::Trend => {
            if readings.len() < params.min_trend_samples {
                return Err(ApiError::InsufficientData {
                    required: params.min_trend_samples,
                    available: readings.len(),
                });
            }
            if readings.len() > params.max_fit_points {
                // Over the compute budget: degrade to the baseline rather
                // than fit an unbounded series.
                tracing::warn!(
                    points = readings.len(),
                    max_fit_points = params.max_fit_points,
                    "trend fit over budget, degrading to windowed average"
                );
                return Ok(windowed_average(readings, now - params.window));
            }
            let model = TrendModel::fit(readings);
            let at = now + Duration::hours(i64::from(params.horizon_hours));
            Ok(Forecast {
                prediction: round1(model.predict_at(at)),
                data_points: readings.len(),
                strategy: Strategy::Trend,
            })
        }
    }
}

/// Mean temperature of readings at or after `cutoff`. Zero in-window
/// readings yields prediction 0.0 with `data_points` 0.
pub fn windowed_average(readings: &[Reading], cutoff: DateTime<Utc>) -> Forecast {
    let mut sum = 0.0;
    let mut count = 0usize;
    for reading in readings {
        if reading.timestamp >= cutoff {
            sum += reading.temperature;
            count += 1;
        }
    }
    let prediction = if count == 0 { 0.0 } else { round1(sum / count as f64) };
    Forecast {
        prediction,
        data_points: count,
        strategy: Strategy::Window,
    }
}

/// Least-squares line through (seconds since first reading, temperature).
struct TrendModel {
    slope: f64,
    intercept: f64,
    base: DateTime<Utc>,
}

impl TrendModel {
    /// Callers guarantee at least two readings; a degenerate series (all
    /// samples at one instant) yields a flat line through the mean.
    fn fit(readings: &[Reading]) -> Self {
        let base = readings[0].timestamp;
        let n = readings.len() as f64;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for reading in readings {
            let x = (reading.timestamp - base).num_milliseconds() as f64 / 1000.0;
            let y = reading.temperature;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
        }
        let denom = n * sum_xx - sum_x * sum_x;
        let slope = if denom == 0.0 {
            0.0
        } else {
            (n * sum_xy - sum_x * sum_y) / denom
        };
        let intercept = (sum_y - slope * sum_x) / n;
        Self {
            slope,
            intercept,
            base,
        }
    }

    fn predict_at(&self, at: DateTime<Utc>) -> f64 {
        let x = (at - self.base).num_milliseconds() as f64 / 1000.0;
        self.slope * x + self.intercept
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: i64, at: DateTime<Utc>, temperature: f64) -> Reading {
        Reading {
            id,
            device_id: "sensor-1".into(),
            timestamp: at,
            temperature,
            humidity: 50.0,
        }
    }

    fn params() -> ForecastParams {
        ForecastParams {
            window: Duration::hours(6),
            horizon_hours: 6,
            min_trend_samples: 10,
            max_fit_points: 10_000,
        }
    }

    #[test]
    fn windowed_average_excludes_stale_readings() {
        let now = Utc::now();
        let readings = vec![
            reading(1, now - Duration::hours(7), 100.0),
            reading(2, now - Duration::hours(1), 20.0),
        ];
        let forecast = windowed_average(&readings, now - Duration::hours(6));
        assert_eq!(forecast.prediction, 20.0);
        assert_eq!(forecast.data_points, 1);
    }

    #[test]
    fn empty_window_is_flagged_not_zero_predicted() {
        let now = Utc::now();
        let readings = vec![reading(1, now - Duration::hours(7), 100.0)];
        let forecast = windowed_average(&readings, now - Duration::hours(6));
        assert_eq!(forecast.prediction, 0.0);
        assert_eq!(forecast.data_points, 0);
    }

    #[test]
    fn windowed_average_rounds_to_one_decimal() {
        let now = Utc::now();
        let readings = vec![
            reading(1, now, 20.0),
            reading(2, now, 20.05),
            reading(3, now, 20.2),
        ];
        let forecast = windowed_average(&readings, now - Duration::hours(6));
        assert_eq!(forecast.prediction, 20.1);
    }

    #[test]
    fn trend_extrapolates_a_linear_series() {
        let now = Utc::now();
        // 1 degree per hour for the last 10 hours, ending at 20.0 now
        let readings: Vec<Reading> = (0..10)
            .map(|i| {
                let hours_ago = 9 - i;
                reading(
                    i + 1,
                    now - Duration::hours(hours_ago),
                    20.0 - hours_ago as f64,
                )
            })
            .collect();
        let forecast = predict(&readings, Strategy::Trend, now, &params()).unwrap();
        assert_eq!(forecast.strategy, Strategy::Trend);
        assert_eq!(forecast.data_points, 10);
        // 6 hours out from 20.0 at +1 degree/hour
        assert!((forecast.prediction - 26.0).abs() < 0.11);
    }

    #[test]
    fn trend_requires_minimum_history() {
        let now = Utc::now();
        let readings: Vec<Reading> = (0..9)
            .map(|i| reading(i + 1, now - Duration::minutes(9 - i), 20.0))
            .collect();
        let err = predict(&readings, Strategy::Trend, now, &params()).unwrap_err();
        match err {
            ApiError::InsufficientData { required, available } => {
                assert_eq!(required, 10);
                assert_eq!(available, 9);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn trend_over_budget_degrades_to_window() {
        let now = Utc::now();
        let readings: Vec<Reading> = (0..20)
            .map(|i| reading(i + 1, now - Duration::minutes(20 - i), 22.0))
            .collect();
        let mut p = params();
        p.max_fit_points = 15;
        let forecast = predict(&readings, Strategy::Trend, now, &p).unwrap();
        assert_eq!(forecast.strategy, Strategy::Window);
        assert_eq!(forecast.prediction, 22.0);
        assert_eq!(forecast.data_points, 20);
    }

    #[test]
    fn degenerate_series_predicts_the_mean() {
        let now = Utc::now();
        let readings: Vec<Reading> =
            (0..10).map(|i| reading(i + 1, now, 18.0 + (i % 2) as f64)).collect();
        let forecast = predict(&readings, Strategy::Trend, now, &params()).unwrap();
        assert_eq!(forecast.prediction, 18.5);
    }

    #[test]
    fn round1_behaves() {
        assert_eq!(round1(20.04), 20.0);
        assert_eq!(round1(20.05), 20.1);
        assert_eq!(round1(-1.23), -1.2);
        assert_eq!(round1(0.0), 0.0);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(Strategy::parse("window"), Some(Strategy::Window));
        assert_eq!(Strategy::parse("trend"), Some(Strategy::Trend));
        assert_eq!(Strategy::parse("prophet"), None);
    }
}
