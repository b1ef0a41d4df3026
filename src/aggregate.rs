use serde::Serialize;
use std::collections::HashMap;

pub const ALL_LABEL: &str = "All";

/// Distribution cells for a group are withheld when fewer than this many
/// pupils answered the item.
pub const SUPPRESSION_THRESHOLD: usize = 10;

/// The four demographic axes a group filter can pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAxis {
    YearGroup,
    Gender,
    Fsm,
    Sen,
}

/// One single-axis filter: pin `axis` to `value`, hold the other three
/// axes at "All".
#[derive(Debug, Clone, Copy)]
pub struct GroupFilter {
    pub value: &'static str,
    pub axis: GroupAxis,
}

/// The fixed grouping scheme. Iteration order is part of the output
/// contract: consumers index rows by (school, position in this list).
static GROUP_FILTERS: [GroupFilter; 8] = [
    GroupFilter {
        value: "Year 8",
        axis: GroupAxis::YearGroup,
    },
    GroupFilter {
        value: "Year 10",
        axis: GroupAxis::YearGroup,
    },
    GroupFilter {
        value: "Girl",
        axis: GroupAxis::Gender,
    },
    GroupFilter {
        value: "Boy",
        axis: GroupAxis::Gender,
    },
    GroupFilter {
        value: "FSM",
        axis: GroupAxis::Fsm,
    },
    GroupFilter {
        value: "Non-FSM",
        axis: GroupAxis::Fsm,
    },
    GroupFilter {
        value: "SEN",
        axis: GroupAxis::Sen,
    },
    GroupFilter {
        value: "Non-SEN",
        axis: GroupAxis::Sen,
    },
];

pub fn group_filters() -> &'static [GroupFilter] {
    &GROUP_FILTERS
}

/// Number of result rows emitted per school: the "All" row plus one per
/// single-axis filter.
pub fn groups_per_school() -> usize {
    1 + GROUP_FILTERS.len()
}

/// The five grouping labels re-attached to every aggregate row after
/// computation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupLabels {
    pub school_lab: String,
    pub year_group_lab: String,
    pub gender_lab: String,
    pub fsm_lab: String,
    pub sen_lab: String,
}

impl GroupLabels {
    fn all_for(school: &str) -> Self {
        GroupLabels {
            school_lab: school.to_string(),
            year_group_lab: ALL_LABEL.to_string(),
            gender_lab: ALL_LABEL.to_string(),
            fsm_lab: ALL_LABEL.to_string(),
            sen_lab: ALL_LABEL.to_string(),
        }
    }

    fn with_filter(school: &str, filter: &GroupFilter) -> Self {
        let mut labels = Self::all_for(school);
        let value = filter.value.to_string();
        match filter.axis {
            GroupAxis::YearGroup => labels.year_group_lab = value,
            GroupAxis::Gender => labels.gender_lab = value,
            GroupAxis::Fsm => labels.fsm_lab = value,
            GroupAxis::Sen => labels.sen_lab = value,
        }
        labels
    }
}

/// One scored pupil as the aggregator sees them: grouping labels, raw
/// responses (for distributions) and derived topic scores (for means).
#[derive(Debug, Clone)]
pub struct ScoredPupil {
    pub pupil_id: String,
    pub school_lab: Option<String>,
    pub year_group_lab: Option<String>,
    pub gender_lab: Option<String>,
    pub fsm_lab: Option<String>,
    pub sen_lab: Option<String>,
    pub responses: HashMap<String, Option<f64>>,
    pub scores: HashMap<String, Option<f64>>,
}

impl ScoredPupil {
    fn axis_label(&self, axis: GroupAxis) -> Option<&str> {
        match axis {
            GroupAxis::YearGroup => self.year_group_lab.as_deref(),
            GroupAxis::Gender => self.gender_lab.as_deref(),
            GroupAxis::Fsm => self.fsm_lab.as_deref(),
            GroupAxis::Sen => self.sen_lab.as_deref(),
        }
    }
}

/// Build the "no pupils" placeholder by running the aggregation function
/// over a population known to be empty. Aggregation functions supplied to
/// the aggregator must be shape-stable, so this yields a schema-identical
/// row set with zero counts and null statistics.
pub fn no_pupils_template<R, F>(agg: &F) -> Vec<R>
where
    F: Fn(&[&ScoredPupil]) -> Vec<R>,
{
    agg(&[])
}

/// Aggregate for every school and every group in the fixed scheme.
///
/// Schools are enumerated from the data itself (a pupil with no school
/// label is excluded) and visited in ascending order. For each school the
/// "All" subset runs first, then each single-axis filter; an empty subset
/// takes a copy of the `no_pupils` template instead of calling `agg`.
/// Failures inside `agg` on a non-empty subset propagate to the caller.
pub fn results_by_school_and_group<R, F>(
    pupils: &[ScoredPupil],
    agg: &F,
    no_pupils: &[R],
) -> Vec<(GroupLabels, R)>
where
    R: Clone,
    F: Fn(&[&ScoredPupil]) -> Vec<R>,
{
    let mut schools: Vec<&str> = pupils
        .iter()
        .filter_map(|p| p.school_lab.as_deref())
        .collect();
    schools.sort_unstable();
    schools.dedup();

    let mut out = Vec::new();
    for school in schools {
        let school_pupils: Vec<&ScoredPupil> = pupils
            .iter()
            .filter(|p| p.school_lab.as_deref() == Some(school))
            .collect();

        let mut emit = |labels: GroupLabels, rows: Vec<R>| {
            for row in rows {
                out.push((labels.clone(), row));
            }
        };

        emit(GroupLabels::all_for(school), agg(&school_pupils));

        for filter in group_filters() {
            let subset: Vec<&ScoredPupil> = school_pupils
                .iter()
                .copied()
                .filter(|p| p.axis_label(filter.axis) == Some(filter.value))
                .collect();
            let rows = if subset.is_empty() {
                no_pupils.to_vec()
            } else {
                agg(&subset)
            };
            emit(GroupLabels::with_filter(school, filter), rows);
        }
    }
    out
}

/// One summary row per topic: mean over pupils with a complete score for
/// that topic, and how many pupils that was.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummaryRow {
    pub variable: String,
    pub mean: Option<f64>,
    pub count: i64,
}

/// The pseudo-variable carrying the subset size alongside the topic rows.
pub const OVERALL_COUNT_VARIABLE: &str = "overall_count";

pub fn summarise_topic_scores(
    subset: &[&ScoredPupil],
    topics: &[&'static str],
) -> Vec<ScoreSummaryRow> {
    let mut rows: Vec<ScoreSummaryRow> = topics
        .iter()
        .map(|topic| {
            let values: Vec<f64> = subset
                .iter()
                .filter_map(|p| p.scores.get(*topic).copied().flatten())
                .collect();
            let mean = if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            };
            ScoreSummaryRow {
                variable: topic.to_string(),
                mean,
                count: values.len() as i64,
            }
        })
        .collect();
    rows.push(ScoreSummaryRow {
        variable: OVERALL_COUNT_VARIABLE.to_string(),
        mean: None,
        count: subset.len() as i64,
    });
    rows
}

/// One declared response option of a survey item.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseOption {
    pub code: i64,
    pub label: String,
}

/// One survey item as stored in the workspace catalog.
#[derive(Debug, Clone)]
pub struct SurveyItem {
    pub name: String,
    pub label: String,
    pub options: Vec<ResponseOption>,
}

/// One distribution row per item: parallel category/label/percentage/count
/// lists (declared options plus a trailing "No response" category). All
/// list cells and `n_responses` are withheld when fewer than
/// `SUPPRESSION_THRESHOLD` pupils answered the item -- an empty group is
/// the zero case of that rule.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBreakdownRow {
    pub measure: String,
    pub measure_lab: String,
    pub cat: Option<Vec<Option<i64>>>,
    pub cat_lab: Option<Vec<String>>,
    pub percentage: Option<Vec<f64>>,
    pub count: Option<Vec<i64>>,
    pub n_responses: Option<i64>,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn breakdown_responses(
    subset: &[&ScoredPupil],
    items: &[SurveyItem],
) -> Vec<ResponseBreakdownRow> {
    items
        .iter()
        .map(|item| {
            let answers: Vec<f64> = subset
                .iter()
                .filter_map(|p| p.responses.get(&item.name).copied().flatten())
                .collect();
            let n_responses = answers.len();

            if n_responses < SUPPRESSION_THRESHOLD {
                return ResponseBreakdownRow {
                    measure: item.name.clone(),
                    measure_lab: item.label.clone(),
                    cat: None,
                    cat_lab: None,
                    percentage: None,
                    count: None,
                    n_responses: None,
                };
            }

            let total = subset.len();
            let mut cat = Vec::with_capacity(item.options.len() + 1);
            let mut cat_lab = Vec::with_capacity(item.options.len() + 1);
            let mut count = Vec::with_capacity(item.options.len() + 1);
            for option in &item.options {
                let n = answers
                    .iter()
                    .filter(|v| **v == option.code as f64)
                    .count();
                cat.push(Some(option.code));
                cat_lab.push(option.label.clone());
                count.push(n as i64);
            }
            // Non-response is a real category in the consuming charts; it
            // stays at the end of the sequence.
            cat.push(None);
            cat_lab.push("No response".to_string());
            count.push((total - n_responses) as i64);

            let percentage = count
                .iter()
                .map(|n| {
                    if total == 0 {
                        0.0
                    } else {
                        round1(100.0 * *n as f64 / total as f64)
                    }
                })
                .collect();

            ResponseBreakdownRow {
                measure: item.name.clone(),
                measure_lab: item.label.clone(),
                cat: Some(cat),
                cat_lab: Some(cat_lab),
                percentage: Some(percentage),
                count: Some(count),
                n_responses: Some(n_responses as i64),
            }
        })
        .collect()
}

/// The single-row participation count shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountRow {
    pub count: i64,
}

pub fn count_pupils(subset: &[&ScoredPupil]) -> Vec<CountRow> {
    vec![CountRow {
        count: subset.len() as i64,
    }]
}
