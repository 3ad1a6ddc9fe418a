//! Fire-time computation for schedules.
//!
//! These are pure functions over `(schedule, epoch seconds)`, generic over
//! the timezone so tests can pin an offset while the daemon runs with
//! `chrono::Local`. TIMED schedules advance via local calendar arithmetic,
//! so daylight-savings transitions are absorbed by the local-time
//! conversion rather than by subtracting raw seconds across them.

use chrono::{Duration, LocalResult, NaiveDateTime, TimeZone};
use models::{Schedule, ScheduleType};

/// Computes when a schedule should first fire after the scheduler starts
/// at `now`. MANUAL schedules never fire on their own.
pub fn first_fire<Tz: TimeZone>(tz: &Tz, schedule: &Schedule, now: i64) -> Option<i64> {
    match schedule.schedule_type {
        ScheduleType::Interval => schedule.repeat_seconds.map(|repeat| now + repeat),
        ScheduleType::Timed => {
            let time = schedule.time?;
            let local = resolve(tz.timestamp_opt(now, 0))?;
            let mut date = local.date_naive();
            if local.time() > time {
                date = date.succ_opt()?;
            }
            Some(naive_to_epoch(tz, date.and_time(time)))
        }
        ScheduleType::Startup => Some(now),
        ScheduleType::Manual => None,
    }
}

/// Computes the fire time following `prev`, or `None` when the schedule is
/// paused or does not repeat.
///
/// Exclusive schedules advance only once the previous task completes, so
/// they skip whole periods past `now`: a long-running task cannot cause a
/// burst of back-to-back fires when it finally exits.
pub fn next_fire<Tz: TimeZone>(
    tz: &Tz,
    schedule: &Schedule,
    prev: i64,
    now: i64,
    paused: bool,
) -> Option<i64> {
    let repeat = schedule.repeat_seconds?;
    if paused {
        return None;
    }

    let mut advance = repeat;
    if schedule.exclusive && now > prev {
        advance = repeat * (1 + div_ceil(now - prev, repeat));
    }

    match schedule.schedule_type {
        ScheduleType::Timed => {
            let local = resolve(tz.timestamp_opt(prev, 0))?;
            Some(naive_to_epoch(
                tz,
                local.naive_local() + Duration::seconds(advance),
            ))
        }
        _ => Some(prev + advance),
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

fn resolve<Tz: TimeZone>(result: LocalResult<chrono::DateTime<Tz>>) -> Option<chrono::DateTime<Tz>> {
    match result {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// Epoch seconds of a naive local datetime in `tz`. An ambiguous local time
/// (fall-back transition) resolves to its earliest reading; a nonexistent
/// one (spring-forward gap) lands one hour later.
fn naive_to_epoch<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> i64 {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) => dt.timestamp(),
            LocalResult::Ambiguous(earliest, _) => earliest.timestamp(),
            LocalResult::None => naive.and_utc().timestamp(),
        },
    }
}
