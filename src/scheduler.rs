//! Daily countdown broadcast.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::exam::ExamCountdown;
use crate::status::StatusService;

/// Every day at 05:00 (sec min hour day month dow year).
pub const DAILY_SCHEDULE: &str = "0 0 5 * * * *";

/// Next occurrence of the daily trigger strictly after `after`, in its zone.
pub fn next_fire<Z: TimeZone>(after: &DateTime<Z>) -> Result<DateTime<Z>, String> {
    let schedule = Schedule::from_str(DAILY_SCHEDULE).map_err(|e| format!("Invalid cron: {}", e))?;
    schedule
        .after(after)
        .next()
        .ok_or_else(|| "No future occurrence for cron".to_string())
}

/// How long to sleep until the next trigger. `None` zone means server local time.
pub fn delay_until_next(now: DateTime<Utc>, timezone: Option<Tz>) -> Result<Duration, String> {
    let next = match timezone {
        Some(tz) => next_fire(&now.with_timezone(&tz))?.with_timezone(&Utc),
        None => next_fire(&now.with_timezone(&Local))?.with_timezone(&Utc),
    };
    (next - now).to_std().map_err(|e| format!("Next trigger is in the past: {e}"))
}

/// Queue today's countdown for every known group. Returns the group count.
pub async fn send_daily_countdown(status: &Arc<StatusService>, countdown: &ExamCountdown) -> usize {
    let message = countdown.message();
    let groups = status.groups().await;
    for group in &groups {
        status.queue_message(group.id, &message).await;
    }
    info!("⏰ Scheduled notification queued for {} group(s)", groups.len());
    groups.len()
}

pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn spawn(status: Arc<StatusService>, countdown: ExamCountdown, timezone: Option<Tz>) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                let delay = match delay_until_next(Utc::now(), timezone) {
                    Ok(delay) => delay,
                    Err(e) => {
                        error!("Daily scheduler stopped: {}", e);
                        return;
                    }
                };
                info!("Next daily notification in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
                send_daily_countdown(&status, &countdown).await;
            }
        });
        Self { handle }
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::mock::MockTransport;
    use chrono::Timelike;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_fire_same_day() {
        let next = next_fire(&utc("2025-06-08T03:00:00Z")).unwrap();
        assert_eq!(next, utc("2025-06-08T05:00:00Z"));
    }

    #[test]
    fn test_next_fire_rolls_to_tomorrow() {
        let next = next_fire(&utc("2025-06-08T05:00:00Z")).unwrap();
        assert_eq!(next, utc("2025-06-09T05:00:00Z"));
    }

    #[test]
    fn test_delay_in_zone() {
        // 05:00 in Kolkata is 23:30 UTC the previous day
        let now = utc("2025-06-08T23:00:00Z");
        let delay = delay_until_next(now, Some(chrono_tz::Asia::Kolkata)).unwrap();
        assert_eq!(delay, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_local_trigger_is_five_am() {
        let now = Utc::now();
        let delay = delay_until_next(now, None).unwrap();
        let fire = (now + chrono::Duration::from_std(delay).unwrap()).with_timezone(&Local);
        assert_eq!(fire.hour(), 5);
        assert!(delay <= Duration::from_secs(25 * 3600));
    }

    #[tokio::test]
    async fn test_daily_countdown_reaches_every_group() {
        let transport = Arc::new(MockTransport::new());
        let status = StatusService::new(Duration::from_millis(1));
        status.attach_transport(transport.clone()).await;
        status.add_group(-1, "A").await;
        status.add_group(-2, "B").await;

        let countdown = ExamCountdown::new(utc("2000-01-01T00:00:00Z"));
        assert_eq!(send_daily_countdown(&status, &countdown).await, 2);

        for _ in 0..200 {
            if transport.sent().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(transport.sent_to(-1), vec!["The exam date has passed.".to_string()]);
        assert_eq!(transport.sent_to(-2), vec!["The exam date has passed.".to_string()]);
    }
}
