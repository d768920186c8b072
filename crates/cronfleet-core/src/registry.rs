//! Job registry: the static table of periodic jobs run by the active
//! scheduler.
//!
//! The registry is pure data. It is validated once at startup; a malformed
//! entry makes the instance refuse to run rather than install a table the
//! local cron daemon would reject.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job id reserved for the polling invocation installed on standbys.
pub const LISTENER_JOB_ID: &str = "listener";

/// One comma-separated item of a cron field: `*`, `n`, `a-b`, each with
/// an optional `/step`.
const FIELD_ITEM: &str = r"^(\*|[0-9A-Za-z]+(-[0-9A-Za-z]+)?)(/[0-9]+)?$";

const MACROS: [&str; 7] = [
    "@yearly",
    "@annually",
    "@monthly",
    "@weekly",
    "@daily",
    "@midnight",
    "@hourly",
];

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Errors raised while building a [`JobRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job id must not be empty")]
    EmptyId,

    #[error("invalid job id {0:?}: only letters, digits, '_', '.' and '-' are allowed")]
    InvalidId(String),

    #[error("job id {0:?} is reserved")]
    ReservedId(String),

    #[error("duplicate job id {0:?}")]
    DuplicateId(String),

    #[error("invalid schedule for job {job:?}: {reason}")]
    InvalidSchedule { job: String, reason: String },
}

/// A single registry entry: a job id and its recurrence expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub schedule: String,
}

impl JobSpec {
    pub fn new(id: &str, schedule: &str) -> Self {
        Self {
            id: id.to_string(),
            schedule: schedule.to_string(),
        }
    }
}

/// Validated, ordered job table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobRegistry {
    jobs: Vec<JobSpec>,
}

impl JobRegistry {
    /// Validate and build a registry. Order is preserved.
    pub fn new(jobs: Vec<JobSpec>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for job in &jobs {
            validate_id(&job.id)?;
            if !seen.insert(job.id.as_str()) {
                return Err(RegistryError::DuplicateId(job.id.clone()));
            }
            validate_schedule(&job.schedule).map_err(|reason| RegistryError::InvalidSchedule {
                job: job.id.clone(),
                reason,
            })?;
        }
        Ok(Self { jobs })
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobSpec> {
        self.jobs.iter()
    }

    pub fn get(&self, id: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn validate_id(id: &str) -> Result<(), RegistryError> {
    if id.is_empty() {
        return Err(RegistryError::EmptyId);
    }
    if id == LISTENER_JOB_ID {
        return Err(RegistryError::ReservedId(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(RegistryError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Check a five-field cron expression or an `@` macro.
pub fn validate_schedule(expr: &str) -> Result<(), String> {
    let expr = expr.trim();
    if expr.starts_with('@') {
        return if MACROS.contains(&expr) {
            Ok(())
        } else {
            Err(format!("unknown macro {expr}"))
        };
    }

    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }

    let item_re = Regex::new(FIELD_ITEM).map_err(|e| e.to_string())?;
    let bounds: [(&str, u32, u32, &[&str], u32); 5] = [
        ("minute", 0, 59, &[], 0),
        ("hour", 0, 23, &[], 0),
        ("day-of-month", 1, 31, &[], 0),
        ("month", 1, 12, &MONTHS, 1),
        ("day-of-week", 0, 7, &WEEKDAYS, 0),
    ];

    for (field, (name, min, max, names, name_base)) in fields.iter().zip(bounds) {
        for item in field.split(',') {
            validate_item(&item_re, item, min, max, names, name_base)
                .map_err(|reason| format!("{name} field {field:?}: {reason}"))?;
        }
    }
    Ok(())
}

fn validate_item(
    item_re: &Regex,
    item: &str,
    min: u32,
    max: u32,
    names: &[&str],
    name_base: u32,
) -> Result<(), String> {
    if !item_re.is_match(item) {
        return Err(format!("malformed item {item:?}"));
    }

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    if let Some(step) = step {
        match step.parse::<u32>() {
            Ok(0) | Err(_) => return Err(format!("invalid step {step:?}")),
            Ok(_) => {}
        }
    }

    if range == "*" {
        return Ok(());
    }

    let value = |token: &str| -> Result<u32, String> {
        if let Ok(n) = token.parse::<u32>() {
            return if (min..=max).contains(&n) {
                Ok(n)
            } else {
                Err(format!("{n} out of range {min}-{max}"))
            };
        }
        let lower = token.to_ascii_lowercase();
        names
            .iter()
            .position(|n| *n == lower)
            .map(|i| i as u32 + name_base)
            .ok_or_else(|| format!("unknown value {token:?}"))
    };

    match range.split_once('-') {
        Some((lo, hi)) => {
            let (lo, hi) = (value(lo)?, value(hi)?);
            if lo > hi {
                return Err(format!("descending range {range:?}"));
            }
        }
        None => {
            value(range)?;
        }
    }
    Ok(())
}
