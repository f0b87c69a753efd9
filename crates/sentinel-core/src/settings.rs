use crate::hasher::HashAlgorithm;
use crate::models::Policy;
use crate::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Seconds between full sweeps while no notifications arrive
    pub interval_secs: u64,
    /// Quiet period collecting a burst of notifications into one batch
    pub debounce_ms: u64,
    /// Upper bound on one blocking poll of the notification source
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    pub recipient: String,
    pub sender: String,
    #[serde(default = "default_sendmail")]
    pub sendmail_program: String,
}

fn default_sendmail() -> String {
    "sendmail".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelSettings {
    pub schedule: ScheduleSettings,
    /// Policy applied by `generate` and by `enroll` without explicit flags
    pub policy: Policy,
    pub alert: AlertSettings,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

impl Default for SentinelSettings {
    fn default() -> Self {
        Self {
            schedule: ScheduleSettings {
                interval_secs: 30,
                debounce_ms: 250,
                poll_timeout_ms: 200,
            },
            policy: Policy::default(),
            alert: AlertSettings {
                recipient: "nobody@localhost".into(),
                sender: "nobody@localhost".into(),
                sendmail_program: default_sendmail(),
            },
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

impl SentinelSettings {
    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.interval_secs == 0 || schedule.interval_secs > 86_400 {
            return Err(SentinelError::Config(
                "schedule.interval_secs must be between 1 and 86400".into(),
            ));
        }
        if schedule.poll_timeout_ms < 10 || schedule.poll_timeout_ms > 1000 {
            return Err(SentinelError::Config(
                "schedule.poll_timeout_ms must be between 10 and 1000".into(),
            ));
        }
        if schedule.debounce_ms > 10_000 {
            return Err(SentinelError::Config(
                "schedule.debounce_ms must not exceed 10000".into(),
            ));
        }
        if !self.alert.recipient.contains('@') || !self.alert.sender.contains('@') {
            return Err(SentinelError::Config(
                "alert.recipient and alert.sender must be mail addresses".into(),
            ));
        }
        if self.alert.sendmail_program.trim().is_empty() {
            return Err(SentinelError::Config(
                "alert.sendmail_program must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `path`, falling back to defaults when the file is absent.
pub fn load_settings(path: &Path) -> Result<SentinelSettings> {
    if !path.exists() {
        return Ok(SentinelSettings::default());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save_settings(path: &Path, settings: &SentinelSettings) -> Result<()> {
    settings.validate()?;
    let data = serde_json::to_vec_pretty(settings)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        SentinelSettings::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_interval_rejected() {
        let mut settings = SentinelSettings::default();
        settings.schedule.interval_secs = 0;
        assert!(matches!(settings.validate(), Err(SentinelError::Config(_))));
    }

    #[test]
    fn poll_timeout_above_one_second_rejected() {
        let mut settings = SentinelSettings::default();
        settings.schedule.poll_timeout_ms = 5000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults_and_save_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.schedule.interval_secs, 30);

        let mut custom = SentinelSettings::default();
        custom.schedule.interval_secs = 5;
        custom.policy.auto_email = true;
        save_settings(&path, &custom).unwrap();
        let reloaded = load_settings(&path).unwrap();
        assert_eq!(reloaded.schedule.interval_secs, 5);
        assert!(reloaded.policy.auto_email);
    }
}
