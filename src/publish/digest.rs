use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt::Write;

use super::weather::{ForecastSource, WeatherReport};
use crate::api::ApiClient;

/// Last UTC hour that still publishes today's forecast.
const LAST_HOUR_FOR_TODAY: u32 = 12;

/// Forecast day for a publish at `now`: today up to 12:59 UTC, tomorrow after.
pub fn forecast_date(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    if now.hour() <= LAST_HOUR_FOR_TODAY {
        today
    } else {
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    }
}

/// Multi-line digest, one line per location in a random order so consecutive
/// posts differ and are not rejected as duplicates.
pub fn format_digest<R: Rng + ?Sized>(
    date: NaiveDate,
    reports: &[WeatherReport],
    rng: &mut R,
) -> String {
    let mut ordered: Vec<&WeatherReport> = reports.iter().collect();
    ordered.shuffle(rng);

    let mut text = format!("Previsão para dia {}:\n", date.format("%d-%m-%Y"));
    for report in ordered {
        let _ = writeln!(
            text,
            "{}: {} - MIN: {}ºC MAX: {}ºC",
            report.location, report.weather_type, report.temp_min, report.temp_max
        );
    }
    text
}

/// Posts the daily weather digest as plain status text.
pub struct DigestPublisher<F> {
    forecast: F,
    client: ApiClient,
}

impl<F: ForecastSource> DigestPublisher<F> {
    pub fn new(forecast: F, client: ApiClient) -> Self {
        Self { forecast, client }
    }

    pub async fn publish_digest(&self) -> bool {
        self.publish_digest_at(Utc::now()).await
    }

    pub async fn publish_digest_at(&self, now: DateTime<Utc>) -> bool {
        let date = forecast_date(now);
        let reports = match self.forecast.reports(date).await {
            Ok(reports) if !reports.is_empty() => reports,
            Ok(_) => {
                tracing::warn!(date = %date, "No forecast available for any location");
                return false;
            }
            Err(e) => {
                tracing::warn!(date = %date, error = %e, "Forecast fetch failed");
                return false;
            }
        };

        let text = format_digest(date, &reports, &mut rand::thread_rng());
        match self.client.post_status(&text, None).await {
            Ok(posted) => {
                tracing::info!(date = %date, locations = reports.len(), status_id = %posted.id_str, "Digest published");
                true
            }
            Err(e) => {
                tracing::warn!(date = %date, error = %e, "Digest post failed");
                false
            }
        }
    }
}
