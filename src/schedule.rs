/// Daily backup scheduling.
use chrono::{DateTime, Local, NaiveTime};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::backup::{BackupOptions, run_backup_now};
use crate::config::Settings;
use crate::error::{WardenError, WardenResult};
use crate::progress::{BatchReport, CancelToken};

/// Longest single sleep, so cancellation is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The next moment at `hour:minute` local time strictly after `now`.
///
/// Returns `None` for an invalid time of day. A time skipped by a daylight
/// saving transition moves on to the following day.
pub fn next_run_after(now: DateTime<Local>, hour: u32, minute: u32) -> Option<DateTime<Local>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = date.and_time(time).and_local_timezone(Local).earliest()
            && candidate > now
        {
            return Some(candidate);
        }
        date = date.succ_opt()?;
    }
    None
}

/// A validated daily backup job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    pub hour: u32,
    pub minute: u32,
    pub source: PathBuf,
    pub target: PathBuf,
}

impl DailySchedule {
    /// Builds the job from `settings`, which were loaded from `origin`.
    ///
    /// # Errors
    ///
    /// `Configuration` if backups are disabled, a path is missing, or the
    /// time of day is out of range.
    pub fn from_settings(settings: &Settings, origin: &Path) -> WardenResult<Self> {
        let config_error = |reason: &str| WardenError::Configuration {
            path: origin.to_path_buf(),
            reason: reason.to_string(),
        };
        if !settings.backup_enabled {
            return Err(config_error("scheduled backup is disabled"));
        }
        let (source, target) = settings
            .backup_paths()
            .ok_or_else(|| config_error("backup source and target must both be set"))?;
        if NaiveTime::from_hms_opt(settings.backup_hour, settings.backup_minute, 0).is_none() {
            return Err(config_error("backup time is not a valid time of day"));
        }
        Ok(Self {
            hour: settings.backup_hour,
            minute: settings.backup_minute,
            source,
            target,
        })
    }

    pub fn next_run_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        next_run_after(now, self.hour, self.minute)
    }

    /// Sleeps until each occurrence and runs the backup, until `cancel` fires.
    ///
    /// `on_run` sees the result of every run; a failed run does not stop the
    /// schedule.
    pub fn run<F>(&self, cancel: &CancelToken, mut on_run: F)
    where
        F: FnMut(&WardenResult<BatchReport>),
    {
        while !cancel.is_cancelled() {
            let Some(next) = self.next_run_after(Local::now()) else {
                warn!("no upcoming backup time, stopping scheduler");
                return;
            };
            info!(at = %next.format("%Y-%m-%d %H:%M"), "next backup scheduled");
            if !sleep_until(next, cancel) {
                return;
            }

            let options = BackupOptions {
                progress: None,
                cancel: Some(cancel),
            };
            let result = run_backup_now(&self.source, &self.target, &options);
            if let Err(e) = &result {
                warn!(error = %e, "scheduled backup failed");
            }
            on_run(&result);
        }
    }
}

/// Runs the daily backup described by `settings` until `cancel` fires.
pub fn run_daily(settings: &Settings, origin: &Path, cancel: &CancelToken) -> WardenResult<()> {
    let schedule = DailySchedule::from_settings(settings, origin)?;
    schedule.run(cancel, |_| {});
    Ok(())
}

/// Returns false if cancelled before `deadline`.
fn sleep_until(deadline: DateTime<Local>, cancel: &CancelToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = match (deadline - Local::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => return true,
        };
        std::thread::sleep(remaining.min(POLL_INTERVAL));
    }
}
