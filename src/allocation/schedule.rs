//! 周计划：按每周课时容量把分配行依次排入各周
//!
//! 纯确定性推导，不调用生成服务。学期之间周序号重新从 1 开始；
//! 一行的课时可以跨越多周。没有可解析课时的行跳过；每学期最多排满 weeks_per_semester 周，
//! 超出部分不排入并记日志。

use crate::core::CurriculumError;
use crate::curriculum::{AllocationRow, WeekEntry, WeekPlan};

/// 由分配行推导周计划
pub fn build_schedule(
    rows: &[AllocationRow],
    weekly_hours: u32,
    weeks_per_semester: usize,
) -> Result<Vec<WeekPlan>, CurriculumError> {
    if weekly_hours == 0 || weeks_per_semester == 0 {
        return Err(CurriculumError::Config(
            "weekly hours and weeks per semester must be positive".to_string(),
        ));
    }

    let mut ordered: Vec<&AllocationRow> = rows.iter().collect();
    ordered.sort_by_key(|r| r.order);

    let mut semesters: Vec<&str> = Vec::new();
    for row in &ordered {
        if !semesters.contains(&row.semester.as_str()) {
            semesters.push(row.semester.as_str());
        }
    }

    let mut plans = Vec::new();
    for semester in semesters {
        let mut week = WeekPlan {
            semester: semester.to_string(),
            week: 1,
            entries: Vec::new(),
        };
        let mut remaining = weekly_hours;
        let mut unscheduled: u64 = 0;

        for row in ordered.iter().filter(|r| r.semester == semester) {
            let Some(mut hours) = row.budget_amount() else {
                tracing::warn!("Row {} has no usable time budget, not scheduled", row.code);
                continue;
            };
            while hours > 0 {
                if week.week > weeks_per_semester {
                    unscheduled += u64::from(hours);
                    break;
                }
                let take = hours.min(remaining);
                week.entries.push(WeekEntry {
                    code: row.code.clone(),
                    topic: row.topic.clone(),
                    hours: take,
                });
                hours -= take;
                remaining -= take;
                if remaining == 0 {
                    let next = WeekPlan {
                        semester: semester.to_string(),
                        week: week.week + 1,
                        entries: Vec::new(),
                    };
                    plans.push(std::mem::replace(&mut week, next));
                    remaining = weekly_hours;
                }
            }
        }
        if !week.entries.is_empty() {
            plans.push(week);
        }

        if unscheduled > 0 {
            tracing::warn!(
                "Semester {} exceeds {} weeks, {} hours not scheduled",
                semester,
                weeks_per_semester,
                unscheduled
            );
        }
    }
    Ok(plans)
}
