// ==========================================
// 外勤人员排班系统 - 日历领域模型
// ==========================================
// 职责: 日期区间、排班周期、周键、锁定日、轮值默认
// ==========================================

use crate::domain::types::{EmployeeId, EventCategory};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

// ==========================================
// DateRange - 闭区间 [start, end]
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// 创建日期区间
    ///
    /// # 返回
    /// - Some: start <= end
    /// - None: 区间倒置（数据完整性问题,由调用方报告）
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if end < start {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// 与另一区间求交
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        DateRange::new(self.start.max(other.start), self.end.min(other.end))
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// 逐日迭代
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

// ==========================================
// WeekKey - ISO 周键
// ==========================================
// 周工时上限按 ISO 周（周一至周日）统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekKey {
    pub iso_year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            iso_year: iso.year(),
            week: iso.week(),
        }
    }

    /// 该周的周一
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.iso_year, self.week, Weekday::Mon)
    }
}

// ==========================================
// Horizon - 排班周期
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub range: DateRange,
}

impl Horizon {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        DateRange::new(start, end).map(|range| Self { range })
    }

    pub fn start(&self) -> NaiveDate {
        self.range.start
    }

    pub fn end(&self) -> NaiveDate {
        self.range.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.range.contains(date)
    }

    /// 扩展到完整 ISO 周的区间
    ///
    /// 已发布排班按此区间加载,保证边界周的工时统计完整
    pub fn covering_weeks(&self) -> DateRange {
        let start = self.range.start
            - Duration::days(self.range.start.weekday().num_days_from_monday() as i64);
        let end = self.range.end
            + Duration::days(6 - self.range.end.weekday().num_days_from_monday() as i64);
        DateRange { start, end }
    }

    pub fn weeks(&self) -> Vec<WeekKey> {
        let mut weeks: Vec<WeekKey> = self.range.days().map(WeekKey::of).collect();
        weeks.dedup();
        weeks
    }
}

// ==========================================
// LockedDay - 锁定日 / 节假日
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockedDayKind {
    Locked,
    Holiday,
}

impl LockedDayKind {
    /// NULL/未知 → Locked（两者对排班的效果一致,只影响展示）
    pub fn from_db(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_uppercase()) {
            Some(v) if v == "HOLIDAY" => LockedDayKind::Holiday,
            _ => LockedDayKind::Locked,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            LockedDayKind::Locked => "LOCKED",
            LockedDayKind::Holiday => "HOLIDAY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDay {
    pub date: NaiveDate,
    pub kind: LockedDayKind,
    pub reason: Option<String>,
}

// ==========================================
// RotationDefault - 周内轮值默认
// ==========================================
// 用途: 偏好信号（目标函数奖励）,不是硬约束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationDefault {
    pub weekday: Weekday,
    pub category: EventCategory,
    pub employee_id: EmployeeId,
}

// ==========================================
// ScheduleException - 按日期覆写轮值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleException {
    pub date: NaiveDate,
    pub category: EventCategory,
    pub employee_id: EmployeeId,
}

/// 解析 0=周一 .. 6=周日
pub fn weekday_from_index(index: i64) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}
