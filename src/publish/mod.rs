//! Outbound publishing: quote images and weather digests.

mod digest;
mod quote;
mod render;
mod weather;

pub use digest::{forecast_date, format_digest, DigestPublisher};
pub use quote::QuotePublisher;
pub use render::{CommandRenderer, QuoteRenderer, RenderError};
pub use weather::{ForecastSource, IpmaForecast, WeatherError, WeatherReport, DEFAULT_LOCATIONS};
