//! Response payloads for the simulated vessel endpoints.
//!
//! The numeric ranges are cosmetic; only the field sets are part of the
//! HTTP surface.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::simulation::sampler::AlertLevel;

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Body of every non-2xx response produced by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub trace_id: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorResponse<T> {
    pub sensor_type: String,
    pub timestamp: i64,
    pub data: T,
    pub status: String,
}

impl<T> SensorResponse<T> {
    pub fn normal(sensor_type: &str, data: T) -> Self {
        Self {
            sensor_type: sensor_type.to_string(),
            timestamp: unix_timestamp(),
            data,
            status: "normal".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReading {
    pub rpm: u32,
    pub temperature_c: u32,
    pub oil_pressure_psi: u32,
    pub fuel_rate_lph: f64,
    pub coolant_temp_c: u32,
    pub battery_volts: f64,
}

impl EngineReading {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            rpm: rng.gen_range(1800..2200),
            temperature_c: rng.gen_range(75..90),
            oil_pressure_psi: rng.gen_range(45..55),
            fuel_rate_lph: 12.5 + rng.gen::<f64>() * 2.5,
            coolant_temp_c: rng.gen_range(70..80),
            battery_volts: 13.8 + rng.gen::<f64>() * 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationReading {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_knots: f64,
    pub heading: u32,
    pub depth_meters: u32,
    pub wind_speed_kt: u32,
}

impl NavigationReading {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            latitude: 41.9028 + rng.gen::<f64>() * 0.01,
            longitude: 12.4964 + rng.gen::<f64>() * 0.01,
            speed_knots: 8.5 + rng.gen::<f64>() * 3.5,
            heading: rng.gen_range(180..200),
            depth_meters: rng.gen_range(45..70),
            wind_speed_kt: rng.gen_range(12..20),
        }
    }
}

pub const OIL_PRESSURE_WARNING: &str = "Minor oil pressure fluctuation detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResults {
    pub engine_health: u32,
    pub fuel_efficiency: u32,
    pub vibration_level: f64,
    pub exhaust_temp_c: u32,
    pub next_maintenance_hours: u32,
    pub warnings: Vec<String>,
}

impl DiagnosticResults {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, with_warning: bool) -> Self {
        let warnings = if with_warning {
            vec![OIL_PRESSURE_WARNING.to_string()]
        } else {
            Vec::new()
        };
        Self {
            engine_health: rng.gen_range(85..95),
            fuel_efficiency: rng.gen_range(92..98),
            vibration_level: 0.2 + rng.gen::<f64>() * 0.15,
            exhaust_temp_c: rng.gen_range(350..400),
            next_maintenance_hours: rng.gen_range(150..200),
            warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    pub diagnostic_type: String,
    pub timestamp: i64,
    pub analysis_time_ms: u64,
    pub results: DiagnosticResults,
    pub status: String,
}

impl DiagnosticsResponse {
    pub fn completed(analysis_time_ms: u64, results: DiagnosticResults) -> Self {
        Self {
            diagnostic_type: "full_system".to_string(),
            timestamp: unix_timestamp(),
            analysis_time_ms,
            results,
            status: "completed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    pub alert_id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: i64,
    pub sensor_status: String,
}

impl AlertReport {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, level: AlertLevel) -> Self {
        Self {
            alert_id: rng.gen_range(0..10_000),
            kind: level.as_str().to_string(),
            message: "All systems operational".to_string(),
            timestamp: unix_timestamp(),
            sensor_status: "online".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseResponse {
    pub scenario: String,
    pub message: String,
    pub timestamp: i64,
}

impl NoiseResponse {
    pub fn new(scenario: &str, message: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            message: message.to_string(),
            timestamp: unix_timestamp(),
        }
    }
}
