use crate::series::Sample;
use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

const ZMON_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// A check result as delivered by a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckData {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub worker: String,
    pub check_id: i64,
    pub entity_id: String,
    #[serde(default)]
    pub entity: HashMap<String, Value>,
    #[serde(default)]
    pub run_time: f64,
    #[serde(default)]
    pub check_result: Value,
    #[serde(default)]
    pub exception: bool,
    #[serde(default)]
    pub alerts: HashMap<String, Value>,
}

/// Samples extracted from one REST metrics check result.
#[derive(Debug, Clone, PartialEq)]
pub struct RestCheck {
    pub application_id: String,
    pub application_version: String,
    pub instance_id: String,
    pub samples: Vec<RestSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestSample {
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub sample: Sample,
}

#[derive(Deserialize)]
struct StatusMetrics {
    #[serde(rename = "mRate", alias = "rate")]
    rate: f64,
    median: f64,
    #[serde(rename = "75th")]
    latency_75th: f64,
    #[serde(rename = "99th")]
    latency_99th: f64,
}

/// path -> method -> status code -> metrics
type RestValue = BTreeMap<String, BTreeMap<String, BTreeMap<String, StatusMetrics>>>;

impl CheckData {
    fn entity_str(&self, key: &str) -> Option<&str> {
        self.entity.get(key).and_then(Value::as_str)
    }

    /// Extracts REST samples. Returns `None` for records that are not REST
    /// metrics: failed checks and entities without an application id and
    /// version.
    pub fn rest_check(&self) -> Result<Option<RestCheck>> {
        if self.exception {
            return Ok(None);
        }
        let (Some(application_id), Some(application_version)) = (
            self.entity_str("application_id"),
            self.entity_str("application_version"),
        ) else {
            return Ok(None);
        };

        let value = self
            .check_result
            .get("value")
            .ok_or_else(|| anyhow!("check {} for {} has no value", self.check_id, self.entity_id))?;
        let value: RestValue = serde_json::from_value(value.clone())
            .with_context(|| format!("check {} for {} is not a REST metrics value", self.check_id, self.entity_id))?;
        let timestamp_ms = self.timestamp_ms()?;

        let mut samples = Vec::new();
        for (path, methods) in value {
            for (method, codes) in methods {
                for (code, metrics) in codes {
                    let status_code = code
                        .parse::<u16>()
                        .with_context(|| format!("invalid status code {code:?} for {path} {method}"))?;
                    samples.push(RestSample {
                        path: path.clone(),
                        method: method.clone(),
                        status_code,
                        sample: Sample::new(
                            timestamp_ms,
                            metrics.rate,
                            metrics.median,
                            metrics.latency_75th,
                            metrics.latency_99th,
                        ),
                    });
                }
            }
        }

        Ok(Some(RestCheck {
            application_id: application_id.to_string(),
            application_version: application_version.to_string(),
            instance_id: self.entity_id.clone(),
            samples,
        }))
    }

    /// Sample time in epoch milliseconds: the result's `ts` (seconds) when
    /// present, else the record's `time`.
    pub fn timestamp_ms(&self) -> Result<i64> {
        if let Some(ts) = self.check_result.get("ts").and_then(Value::as_f64) {
            return Ok((ts * 1000.0).round() as i64);
        }
        let parsed = DateTime::parse_from_rfc3339(&self.time)
            .or_else(|_| DateTime::parse_from_str(&self.time, ZMON_TIME_FORMAT))
            .with_context(|| format!("unparsable check time {:?}", self.time))?;
        Ok(parsed.timestamp_millis())
    }
}
