use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Attendance percentage below which a student is flagged.
pub const AT_RISK_BELOW: i64 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkStatus {
    Present,
    Absent,
}

impl MarkStatus {
    pub fn parse(s: &str) -> Option<MarkStatus> {
        match s {
            "present" => Some(MarkStatus::Present),
            "absent" => Some(MarkStatus::Absent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkStatus::Present => "present",
            MarkStatus::Absent => "absent",
        }
    }
}

/// One lecture slot's presence map, already narrowed to a single class.
/// A student missing from `statuses` counts as absent, never as an error.
#[derive(Debug, Clone)]
pub struct LectureRecord {
    pub subject: String,
    pub date: String,
    pub statuses: HashMap<String, MarkStatus>,
}

impl LectureRecord {
    fn present(&self, student_id: &str) -> bool {
        self.statuses.get(student_id) == Some(&MarkStatus::Present)
    }
}

/// Roster entry used when summarizing a whole class.
#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub id: String,
    pub name: String,
    pub roll_no: Option<String>,
}

/// Per-subject statistics for one student.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStat {
    pub subject: String,
    pub total_lectures: usize,
    pub present_count: usize,
    pub percent: i64,
    /// Status on `today`, "-" when no lecture was recorded that day.
    pub today: String,
    pub at_risk: bool,
}

/// Whole-record-set totals for one student.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub total_present: usize,
    pub total_absent: usize,
    pub percent: i64,
    pub at_risk: bool,
}

/// Derived per-student row for a class-wide summary table. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub student_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    pub present_count: usize,
    pub total_count: usize,
    pub percent: i64,
    pub today: String,
    pub at_risk: bool,
}

/// present/total as a rounded whole percentage; 0 (not NaN) for an empty set.
pub fn percent(present: usize, total: usize) -> i64 {
    if total == 0 {
        0
    } else {
        ((present as f64 / total as f64) * 100.0).round() as i64
    }
}

/// Group a student's records by subject and fold each group into counts.
/// Subjects come back in name order; the numbers do not depend on record
/// order. A subject with zero lectures cannot exist here (it would have no
/// records to group), so the at-risk flag is only ever computed over a
/// non-empty lecture set.
pub fn subject_stats_for_student(
    records: &[LectureRecord],
    student_id: &str,
    today: &str,
) -> Vec<SubjectStat> {
    let mut by_subject: BTreeMap<&str, Vec<&LectureRecord>> = BTreeMap::new();
    for rec in records {
        by_subject.entry(rec.subject.as_str()).or_default().push(rec);
    }

    by_subject
        .into_iter()
        .map(|(subject, recs)| {
            let total = recs.len();
            let present = recs.iter().filter(|r| r.present(student_id)).count();
            let pct = percent(present, total);
            let today_status = recs
                .iter()
                .find(|r| r.date == today)
                .map(|r| {
                    if r.present(student_id) {
                        MarkStatus::Present.as_str().to_string()
                    } else {
                        MarkStatus::Absent.as_str().to_string()
                    }
                })
                .unwrap_or_else(|| "-".to_string());
            SubjectStat {
                subject: subject.to_string(),
                total_lectures: total,
                present_count: present,
                percent: pct,
                today: today_status,
                at_risk: total > 0 && pct < AT_RISK_BELOW,
            }
        })
        .collect()
}

/// Totals across every (subject, lecture) pair for the student.
pub fn overall_for_student(records: &[LectureRecord], student_id: &str) -> OverallSummary {
    let total = records.len();
    let present = records.iter().filter(|r| r.present(student_id)).count();
    let pct = percent(present, total);
    OverallSummary {
        total_present: present,
        total_absent: total - present,
        percent: pct,
        at_risk: total > 0 && pct < AT_RISK_BELOW,
    }
}

/// One row per roster student over an already-filtered record set. Rows come
/// back in roll-number order: numeric rolls first ascending, then the rest in
/// roster order.
pub fn class_summary_rows(
    records: &[LectureRecord],
    roster: &[RosterStudent],
    today: &str,
) -> Vec<SummaryRow> {
    let total = records.len();
    let mut rows: Vec<SummaryRow> = roster
        .iter()
        .map(|s| {
            let present = records.iter().filter(|r| r.present(&s.id)).count();
            let pct = percent(present, total);
            let today_status = records
                .iter()
                .find(|r| r.date == today)
                .map(|r| {
                    if r.present(&s.id) {
                        MarkStatus::Present.as_str().to_string()
                    } else {
                        MarkStatus::Absent.as_str().to_string()
                    }
                })
                .unwrap_or_else(|| "-".to_string());
            SummaryRow {
                student_id: s.id.clone(),
                name: s.name.clone(),
                roll_no: s.roll_no.clone(),
                present_count: present,
                total_count: total,
                percent: pct,
                today: today_status,
                at_risk: total > 0 && pct < AT_RISK_BELOW,
            }
        })
        .collect();
    sort_by_roll(&mut rows);
    rows
}

/// Numeric rolls sort ahead of non-numeric ones; ties keep input order.
fn sort_by_roll(rows: &mut [SummaryRow]) {
    rows.sort_by(|a, b| {
        let ra = a.roll_no.as_deref().and_then(|r| r.trim().parse::<i64>().ok());
        let rb = b.roll_no.as_deref().and_then(|r| r.trim().parse::<i64>().ok());
        match (ra, rb) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}
