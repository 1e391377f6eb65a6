//! Fire-and-forget periodic jobs on the tokio runtime.
//!
//! Every firing runs on the blocking pool under its own panic boundary, so a
//! failing job is logged and the schedule keeps going. Dropping the returned
//! handle leaves the schedule running; abort it to stop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, TimeZone, Weekday};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{panic_message, GoxError};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Run `job` once on the blocking pool, logging instead of propagating a panic.
pub fn safe_spawn<F>(job: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(panic = %panic_message(payload.as_ref()), "scheduled job panicked");
        }
    })
}

fn fire<F>(job: &Arc<F>)
where
    F: Fn() + Send + Sync + 'static,
{
    let job = Arc::clone(job);
    safe_spawn(move || job());
}

async fn repeat<F>(job: Arc<F>, period: Duration)
where
    F: Fn() + Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        fire(&job);
    }
}

fn check_period(period: Duration) -> Result<(), GoxError> {
    if period.is_zero() {
        return Err(GoxError::InvalidRequest(
            "repeat period must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Fire `job` every `period`, the first time one period from now.
///
/// # Errors
///
/// Rejects a zero `period`.
pub fn run_repeat<F>(job: F, period: Duration) -> Result<JoinHandle<()>, GoxError>
where
    F: Fn() + Send + Sync + 'static,
{
    check_period(period)?;
    Ok(tokio::spawn(repeat(Arc::new(job), period)))
}

/// Wait `delay`, fire `job`, then fire it again every `period`.
///
/// # Errors
///
/// Rejects a zero `period`.
pub fn run_delay_repeat<F>(
    job: F,
    delay: Duration,
    period: Duration,
) -> Result<JoinHandle<()>, GoxError>
where
    F: Fn() + Send + Sync + 'static,
{
    check_period(period)?;
    Ok(spawn_delay_repeat(job, delay, period))
}

fn spawn_delay_repeat<F>(job: F, delay: Duration, period: Duration) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let job = Arc::new(job);
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        fire(&job);
        repeat(job, period).await;
    })
}

/// A daily wall-clock time, optionally restricted to one day of the month or
/// one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    hour: u32,
    minute: u32,
    day: Option<u32>,
    weekday: Option<Weekday>,
}

impl Trigger {
    /// # Errors
    ///
    /// Returns [`GoxError::InvalidRequest`] for an hour above 23 or a minute
    /// above 59.
    pub fn daily(hour: u32, minute: u32) -> Result<Self, GoxError> {
        if hour > 23 || minute > 59 {
            return Err(GoxError::InvalidRequest(format!(
                "invalid trigger time {hour:02}:{minute:02}"
            )));
        }
        Ok(Self {
            hour,
            minute,
            day: None,
            weekday: None,
        })
    }

    /// # Errors
    ///
    /// Returns [`GoxError::InvalidRequest`] for a day outside `1..=31`.
    pub fn on_day(mut self, day: u32) -> Result<Self, GoxError> {
        if !(1..=31).contains(&day) {
            return Err(GoxError::InvalidRequest(format!(
                "invalid day of month {day}"
            )));
        }
        self.day = Some(day);
        Ok(self)
    }

    #[must_use]
    pub fn on_weekday(mut self, weekday: Weekday) -> Self {
        self.weekday = Some(weekday);
        self
    }

    /// Whether a firing at `at` should run the job.
    #[must_use]
    pub fn matches<D: Datelike>(&self, at: &D) -> bool {
        self.day.map_or(true, |day| at.day() == day)
            && self.weekday.map_or(true, |weekday| at.weekday() == weekday)
    }
}

/// Time from `now` until the next `hour:minute`, today if still ahead (or
/// exactly now), tomorrow otherwise.
#[must_use]
pub fn delay_until<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> Duration {
    let current = now.naive_local();
    let Some(mut target) = current.date().and_hms_opt(hour, minute, 0) else {
        return Duration::ZERO;
    };
    if target < current {
        target += chrono::Duration::days(1);
    }
    (target - current).to_std().unwrap_or(Duration::ZERO)
}

/// Check `trigger` once a day at its time (local clock) and run `job` when
/// the day matches.
pub fn run_at<F>(job: F, trigger: Trigger) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let delay = delay_until(&Local::now(), trigger.hour, trigger.minute);
    tracing::debug!(?trigger, delay_secs = delay.as_secs(), "scheduling daily job");
    spawn_delay_repeat(
        move || {
            if trigger.matches(&Local::now()) {
                job();
            }
        },
        delay,
        DAY,
    )
}

/// # Errors
///
/// Rejects an out-of-range time.
pub fn run_daily_at<F>(job: F, hour: u32, minute: u32) -> Result<JoinHandle<()>, GoxError>
where
    F: Fn() + Send + Sync + 'static,
{
    Ok(run_at(job, Trigger::daily(hour, minute)?))
}

/// Run at midnight on `day` of each month.
///
/// # Errors
///
/// Rejects a day outside `1..=31`.
pub fn run_day<F>(job: F, day: u32) -> Result<JoinHandle<()>, GoxError>
where
    F: Fn() + Send + Sync + 'static,
{
    run_day_at(job, day, 0, 0)
}

/// # Errors
///
/// Rejects an out-of-range day or time.
pub fn run_day_at<F>(job: F, day: u32, hour: u32, minute: u32) -> Result<JoinHandle<()>, GoxError>
where
    F: Fn() + Send + Sync + 'static,
{
    Ok(run_at(job, Trigger::daily(hour, minute)?.on_day(day)?))
}

/// Run at midnight every `weekday`.
pub fn run_weekday<F>(job: F, weekday: Weekday) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    run_at(
        job,
        Trigger {
            hour: 0,
            minute: 0,
            day: None,
            weekday: Some(weekday),
        },
    )
}

/// # Errors
///
/// Rejects an out-of-range time.
pub fn run_weekday_at<F>(
    job: F,
    weekday: Weekday,
    hour: u32,
    minute: u32,
) -> Result<JoinHandle<()>, GoxError>
where
    F: Fn() + Send + Sync + 'static,
{
    Ok(run_at(job, Trigger::daily(hour, minute)?.on_weekday(weekday)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        // 2024-05-15 was a Wednesday.
        Utc.with_ymd_and_hms(2024, 5, 15, hour, minute, second)
            .single()
            .unwrap()
    }

    #[test]
    fn test_delay_until_later_today() {
        assert_eq!(
            delay_until(&at(10, 0, 0), 10, 30),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn test_delay_until_rolls_to_tomorrow() {
        assert_eq!(
            delay_until(&at(10, 0, 30), 10, 0),
            DAY - Duration::from_secs(30)
        );
        assert_eq!(
            delay_until(&at(23, 59, 0), 0, 0),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_delay_until_exact_time_fires_now() {
        assert_eq!(delay_until(&at(8, 15, 0), 8, 15), Duration::ZERO);
    }

    #[test]
    fn test_trigger_validation() {
        assert!(Trigger::daily(24, 0).is_err());
        assert!(Trigger::daily(0, 60).is_err());
        let trigger = Trigger::daily(23, 59).unwrap();
        assert!(trigger.on_day(0).is_err());
        assert!(trigger.on_day(32).is_err());
        assert!(trigger.on_day(31).is_ok());
    }

    #[test]
    fn test_trigger_filters() {
        let wednesday_15th = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let thursday_16th = NaiveDate::from_ymd_opt(2024, 5, 16).unwrap();

        let every_day = Trigger::daily(0, 0).unwrap();
        assert!(every_day.matches(&wednesday_15th));
        assert!(every_day.matches(&thursday_16th));

        let on_15th = every_day.on_day(15).unwrap();
        assert!(on_15th.matches(&wednesday_15th));
        assert!(!on_15th.matches(&thursday_16th));

        let on_wednesday = every_day.on_weekday(Weekday::Wed);
        assert!(on_wednesday.matches(&wednesday_15th));
        assert!(!on_wednesday.matches(&thursday_16th));
    }

    #[tokio::test]
    async fn test_safe_spawn_contains_panic() {
        let handle = safe_spawn(|| panic!("job failed"));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_run_repeat_keeps_firing_after_panic() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handle = run_repeat(
            move || {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run fails");
                }
            },
            Duration::from_millis(10),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_run_delay_repeat_fires_immediately_without_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handle = run_delay_repeat(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            Duration::ZERO,
            Duration::from_secs(3600),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let err = run_repeat(|| {}, Duration::ZERO).unwrap_err();
        assert!(matches!(err, GoxError::InvalidRequest(ref m) if m.contains("period")));
        let err = run_delay_repeat(|| {}, Duration::ZERO, Duration::ZERO).unwrap_err();
        assert!(matches!(err, GoxError::InvalidRequest(_)));
    }
}
