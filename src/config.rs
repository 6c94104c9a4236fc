use std::env;

use crate::engine::corridor::CorridorParams;
use crate::error::AppError;
use crate::geo::GeoPoint;

const DEFAULT_ORIGIN_LAT: f64 = -3.783871639912979;
const DEFAULT_ORIGIN_LON: f64 = -38.50082092785248;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_path: Option<String>,
    pub event_buffer_size: usize,
    pub dispatch_interval_ms: u64,
    pub origin: GeoPoint,
    pub corridor: CorridorParams,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = CorridorParams::default();
        let origin = GeoPoint::new(
            parse_or_default("ORIGIN_LAT", DEFAULT_ORIGIN_LAT)?,
            parse_or_default("ORIGIN_LON", DEFAULT_ORIGIN_LON)?,
        );
        if !origin.is_valid() {
            return Err(AppError::InvalidCoordinates(format!(
                "origin {},{} is out of range",
                origin.lat, origin.lon
            )));
        }

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            database_path: env::var("DATABASE_PATH").ok().filter(|path| !path.is_empty()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch_interval_ms: parse_or_default("DISPATCH_INTERVAL_MS", 3000)?,
            origin,
            corridor: CorridorParams {
                corridor_width_km: parse_or_default("CORRIDOR_WIDTH_KM", defaults.corridor_width_km)?,
                max_detour_km: parse_or_default("MAX_DETOUR_KM", defaults.max_detour_km)?,
                beyond_anchor_tolerance_km: parse_or_default(
                    "BEYOND_ANCHOR_TOLERANCE_KM",
                    defaults.beyond_anchor_tolerance_km,
                )?,
                cost_slack_km: parse_or_default("COST_SLACK_KM", defaults.cost_slack_km)?,
                direction_penalty_weight: parse_or_default(
                    "DIRECTION_PENALTY_WEIGHT",
                    defaults.direction_penalty_weight,
                )?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would stall the dispatch loop or leave the cost model unbounded.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.dispatch_interval_ms == 0 {
            return Err(invalid("DISPATCH_INTERVAL_MS", "must be at least 1"));
        }
        if self.event_buffer_size == 0 {
            return Err(invalid("EVENT_BUFFER_SIZE", "must be at least 1"));
        }

        let corridor = &self.corridor;
        for (key, value) in [
            ("MAX_DETOUR_KM", corridor.max_detour_km),
            ("COST_SLACK_KM", corridor.cost_slack_km),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(key, "must be a positive number"));
            }
        }
        for (key, value) in [
            ("CORRIDOR_WIDTH_KM", corridor.corridor_width_km),
            ("BEYOND_ANCHOR_TOLERANCE_KM", corridor.beyond_anchor_tolerance_km),
            ("DIRECTION_PENALTY_WEIGHT", corridor.direction_penalty_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, "must be a non-negative number"));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> AppError {
    AppError::Internal(format!("invalid {key}: {reason}"))
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
