use chrono::{NaiveTime, Timelike};
use uuid::Uuid;

use crate::ModelError;

pub const HOUR_SECONDS: i64 = 3600;
pub const DAY_SECONDS: i64 = 3600 * 24;
pub const WEEK_SECONDS: i64 = 3600 * 24 * 7;

/// ScheduleType discriminates how a schedule decides its fire times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum ScheduleType {
    Timed = 1,
    Interval = 2,
    Manual = 3,
    Startup = 4,
}

impl TryFrom<i16> for ScheduleType {
    type Error = ModelError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(ScheduleType::Timed),
            2 => Ok(ScheduleType::Interval),
            3 => Ok(ScheduleType::Manual),
            4 => Ok(ScheduleType::Startup),
            other => Err(ModelError::InvalidScheduleType(other)),
        }
    }
}

/// Repeat is the coarse repetition period of a timed schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum Repeat {
    Hourly = 1,
    Daily = 2,
    Weekly = 3,
}

impl Repeat {
    pub fn seconds(&self) -> i64 {
        match self {
            Repeat::Hourly => HOUR_SECONDS,
            Repeat::Daily => DAY_SECONDS,
            Repeat::Weekly => WEEK_SECONDS,
        }
    }
}

impl TryFrom<i16> for Repeat {
    type Error = ModelError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Repeat::Hourly),
            2 => Ok(Repeat::Daily),
            3 => Ok(Repeat::Weekly),
            other => Err(ModelError::InvalidRepeat(other)),
        }
    }
}

/// ScheduleRow is a persisted row of the `schedules` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub schedule_name: String,
    pub process_name: String,
    pub schedule_type: i16,
    pub schedule_time: Option<NaiveTime>,
    pub schedule_day: Option<i16>,
    pub schedule_interval: Option<NaiveTime>,
    pub repeat: Option<i16>,
    pub exclusive: bool,
}

/// Schedule is the scheduler's in-memory view of one schedule, with its
/// repetition period already resolved into seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub process_name: String,
    pub schedule_type: ScheduleType,
    pub time: Option<NaiveTime>,
    pub day: Option<i16>,
    pub interval: Option<NaiveTime>,
    pub repeat: Option<Repeat>,
    pub repeat_seconds: Option<i64>,
    pub exclusive: bool,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = ModelError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let repeat = match row.repeat {
            None | Some(0) => None,
            Some(r) => Some(Repeat::try_from(r)?),
        };

        let repeat_seconds = match (repeat, row.schedule_interval) {
            (Some(repeat), _) => Some(repeat.seconds()),
            (None, Some(interval)) => Some(
                i64::from(interval.hour()) * 3600
                    + i64::from(interval.minute()) * 60
                    + i64::from(interval.second()),
            )
            .filter(|s| *s > 0),
            (None, None) => None,
        };

        Ok(Schedule {
            id: row.id,
            name: row.schedule_name,
            process_name: row.process_name,
            schedule_type: ScheduleType::try_from(row.schedule_type)?,
            time: row.schedule_time,
            day: row.schedule_day,
            interval: row.schedule_interval,
            repeat,
            repeat_seconds,
            exclusive: row.exclusive,
        })
    }
}
