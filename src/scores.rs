use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

/// Fixed scale bounds for a survey item or a combined score. These are the
/// instrument's declared bounds, never the observed data range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

pub const fn bounds(min: f64, max: f64) -> Bounds {
    Bounds { min, max }
}

/// Mirror a value within its scale so the direction of "better" flips.
pub fn reverse_score(value: f64, b: Bounds) -> f64 {
    b.min + b.max - value
}

/// Per-input transform applied before values are combined.
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    None,
    /// Reverse within the item's declared bounds.
    Reverse(Bounds),
    /// Replace each listed code with a fixed value; codes not listed become
    /// missing (covers "don't know"/"unsure" options dropped from scoring).
    Recode(&'static [(i64, Option<f64>)]),
    /// Drop the listed codes to missing, pass everything else through.
    Exclude(&'static [i64]),
}

/// One contributing raw item plus its transform.
#[derive(Debug, Clone, Copy)]
pub struct Input {
    pub item: &'static str,
    pub transform: Transform,
}

impl Input {
    pub const fn plain(item: &'static str) -> Self {
        Input {
            item,
            transform: Transform::None,
        }
    }

    pub const fn reversed(item: &'static str, b: Bounds) -> Self {
        Input {
            item,
            transform: Transform::Reverse(b),
        }
    }

    pub const fn recoded(item: &'static str, map: &'static [(i64, Option<f64>)]) -> Self {
        Input {
            item,
            transform: Transform::Recode(map),
        }
    }

    pub const fn excluding(item: &'static str, codes: &'static [i64]) -> Self {
        Input {
            item,
            transform: Transform::Exclude(codes),
        }
    }
}

/// How a topic combines its inputs into one value per pupil.
#[derive(Debug, Clone, Copy)]
pub enum Combine {
    /// A single item, optionally shifted to re-base its range.
    Single { input: Input, offset: f64 },
    /// Row-wise sum; missing if any contributing input is missing. The
    /// offset re-bases the combined range (e.g. four 1-5 items summed as
    /// 0-16 take offset -4).
    Sum {
        inputs: &'static [Input],
        offset: f64,
    },
    /// Row-wise product; missing if any contributing input is missing.
    Product { inputs: &'static [Input] },
    /// Indicator over N items: 0 if any response falls in the negative code
    /// set, 1 otherwise. Missing only when all N responses are missing --
    /// one answered item is enough to score.
    AnyOf {
        items: &'static [&'static str],
        negative: &'static [i64],
    },
    /// A yes/no gate item chooses between a derived candidate (the mean of
    /// `listen` and the recoded `helped` item) and a direct alternative
    /// answer. Gate code 1 means yes.
    Gated {
        gate: &'static str,
        listen: &'static str,
        helped: Input,
        fallback: &'static str,
    },
}

/// One topic's full derivation: inputs, combination rule, and an optional
/// final reverse pass that puts the topic in the higher-is-better direction.
#[derive(Debug, Clone, Copy)]
pub struct TopicRule {
    pub topic: &'static str,
    pub combine: Combine,
    pub flip: Option<Bounds>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// One pupil's raw responses, keyed by item name. An absent key and an
/// explicit `None` both mean the pupil did not answer.
#[derive(Debug, Clone)]
pub struct PupilResponses {
    pub pupil_id: String,
    pub items: HashMap<String, Option<f64>>,
}

/// One pupil's derived topic scores, in rule-table order.
#[derive(Debug, Clone)]
pub struct PupilScores {
    pub pupil_id: String,
    pub topics: Vec<(&'static str, Option<f64>)>,
}

/// Every raw item name a rule table reads. Topics that feed later rules
/// (the gated sub-scores summed into an overall score) are not raw items
/// and are excluded here.
pub fn required_items(rules: &[TopicRule]) -> BTreeSet<&'static str> {
    let topic_names: BTreeSet<&'static str> = rules.iter().map(|r| r.topic).collect();
    let mut required = BTreeSet::new();
    let mut add = |name: &'static str| {
        if !topic_names.contains(name) {
            required.insert(name);
        }
    };
    for rule in rules {
        match rule.combine {
            Combine::Single { input, .. } => add(input.item),
            Combine::Sum { inputs, .. } => {
                for input in inputs {
                    add(input.item);
                }
            }
            Combine::Product { inputs } => {
                for input in inputs {
                    add(input.item);
                }
            }
            Combine::AnyOf { items, .. } => {
                for item in items {
                    add(item);
                }
            }
            Combine::Gated {
                gate,
                listen,
                helped,
                fallback,
            } => {
                add(gate);
                add(listen);
                add(helped.item);
                add(fallback);
            }
        }
    }
    required
}

/// Fail fast when the stored item catalog is missing a column the rule
/// table reads. The calculator assumes schema completeness; a missing
/// column is a batch failure, not a missing score.
pub fn check_schema(rules: &[TopicRule], catalog: &BTreeSet<String>) -> Result<(), ScoreError> {
    let missing: Vec<&str> = required_items(rules)
        .into_iter()
        .filter(|item| !catalog.contains(*item))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ScoreError {
        code: "schema_missing_column".to_string(),
        message: format!("survey schema is missing {} required item(s)", missing.len()),
        details: Some(json!({ "missingItems": missing })),
    })
}

fn apply_transform(input: &Input, value: Option<f64>) -> Option<f64> {
    let v = value?;
    match input.transform {
        Transform::None => Some(v),
        Transform::Reverse(b) => Some(reverse_score(v, b)),
        Transform::Recode(map) => map
            .iter()
            .find(|(code, _)| v == *code as f64)
            .and_then(|(_, mapped)| *mapped),
        Transform::Exclude(codes) => {
            if codes.iter().any(|code| v == *code as f64) {
                None
            } else {
                Some(v)
            }
        }
    }
}

fn combine(
    rule: &Combine,
    lookup: &dyn Fn(&str) -> Option<f64>,
) -> Option<f64> {
    match rule {
        Combine::Single { input, offset } => {
            apply_transform(input, lookup(input.item)).map(|v| v + offset)
        }
        Combine::Sum { inputs, offset } => {
            let mut total = *offset;
            for input in *inputs {
                total += apply_transform(input, lookup(input.item))?;
            }
            Some(total)
        }
        Combine::Product { inputs } => {
            let mut total = 1.0;
            for input in *inputs {
                total *= apply_transform(input, lookup(input.item))?;
            }
            Some(total)
        }
        Combine::AnyOf { items, negative } => {
            let mut any_answered = false;
            let mut any_negative = false;
            for item in *items {
                if let Some(v) = lookup(item) {
                    any_answered = true;
                    if negative.iter().any(|code| v == *code as f64) {
                        any_negative = true;
                    }
                }
            }
            if !any_answered {
                return None;
            }
            Some(if any_negative { 0.0 } else { 1.0 })
        }
        Combine::Gated {
            gate,
            listen,
            helped,
            fallback,
        } => {
            if lookup(gate) == Some(1.0) {
                let listened = lookup(listen)?;
                let helped = apply_transform(helped, lookup(helped.item))?;
                Some((listened + helped) / 2.0)
            } else {
                lookup(fallback)
            }
        }
    }
}

/// Run the rule table over one pupil. Rules evaluate in declared order and
/// may read topics declared earlier; scratch values never escape.
pub fn evaluate_pupil(
    rules: &[TopicRule],
    items: &HashMap<String, Option<f64>>,
) -> Vec<(&'static str, Option<f64>)> {
    let mut computed: HashMap<&'static str, Option<f64>> = HashMap::new();
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        let score = {
            let lookup = |name: &str| -> Option<f64> {
                if let Some(v) = computed.get(name) {
                    *v
                } else {
                    items.get(name).copied().flatten()
                }
            };
            let raw = combine(&rule.combine, &lookup);
            match rule.flip {
                Some(b) => raw.map(|v| reverse_score(v, b)),
                None => raw,
            }
        };
        computed.insert(rule.topic, score);
        out.push((rule.topic, score));
    }
    out
}

/// Score every pupil against the rule table. The catalog check runs once up
/// front; per-pupil gaps are ordinary missing data, not errors.
pub fn calculate_scores(
    rules: &[TopicRule],
    catalog: &BTreeSet<String>,
    pupils: &[PupilResponses],
) -> Result<Vec<PupilScores>, ScoreError> {
    check_schema(rules, catalog)?;
    Ok(pupils
        .iter()
        .map(|p| PupilScores {
            pupil_id: p.pupil_id.clone(),
            topics: evaluate_pupil(rules, &p.items),
        })
        .collect())
}
