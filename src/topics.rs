//! The survey instrument's per-topic derivation table. Each entry is a
//! domain fact (which items feed the topic, the declared scale bounds,
//! whether the combined score is flipped into the positive direction);
//! adding a topic is a data change here, not a code change.

use crate::scores::{bounds, Bounds, Combine, Input, TopicRule};

const AGREE_1_5: Bounds = bounds(1.0, 5.0);
const AGREE_1_4: Bounds = bounds(1.0, 4.0);

/// "How helpful" answers sit on a 1-3 scale; rescaled onto 1-4 so they
/// average cleanly with the 1-4 "did they listen" answers.
static HELPFUL_1_4: [(i64, Option<f64>); 3] = [(1, Some(1.0)), (2, Some(2.5)), (3, Some(4.0))];

/// First local-area question has four responses plus "don't know" (5);
/// rescaled onto 1-5 to match the rest of the topic's items.
static LOCAL_SAFE_1_5: [(i64, Option<f64>); 5] = [
    (1, Some(1.0)),
    (2, Some(2.0 + 1.0 / 3.0)),
    (3, Some(3.0 + 2.0 / 3.0)),
    (4, Some(5.0)),
    (5, None),
];

/// Feeling about as well off as friends scores 1; "don't know" (4) drops.
static WEALTH_SAME: [(i64, Option<f64>); 4] =
    [(1, Some(0.0)), (2, Some(0.0)), (3, Some(1.0)), (4, None)];

/// Knowledge of future options has three responses plus "unsure" (4);
/// rescaled onto 1-5 to match the interest and support items.
static FUTURE_OPTIONS_1_5: [(i64, Option<f64>); 4] =
    [(1, Some(1.0)), (2, Some(2.5)), (3, Some(4.0)), (4, None)];

/// "Often or always", "some of the time", "occasionally".
static DISCRIM_NEGATIVE: [i64; 3] = [1, 2, 3];

static UNSURE: [i64; 1] = [5];
static PREFER_NOT_TO_SAY: [i64; 1] = [11];

static AUTONOMY: [Input; 6] = [
    Input::reversed("autonomy_pressure", AGREE_1_5),
    Input::plain("autonomy_express"),
    Input::plain("autonomy_decide"),
    Input::reversed("autonomy_told", AGREE_1_5),
    Input::plain("autonomy_myself"),
    Input::plain("autonomy_choice"),
];

static OPTIMISM: [Input; 4] = [
    Input::plain("optimism_future"),
    Input::plain("optimism_best"),
    Input::plain("optimism_good"),
    Input::plain("optimism_work"),
];

static WELLBEING: [Input; 7] = [
    Input::plain("wellbeing_optimistic"),
    Input::plain("wellbeing_useful"),
    Input::plain("wellbeing_relaxed"),
    Input::plain("wellbeing_problems"),
    Input::plain("wellbeing_thinking"),
    Input::plain("wellbeing_close"),
    Input::plain("wellbeing_mind"),
];

static ESTEEM: [Input; 5] = [
    Input::reversed("esteem_satisfied", AGREE_1_4),
    Input::reversed("esteem_qualities", AGREE_1_4),
    Input::reversed("esteem_well", AGREE_1_4),
    Input::reversed("esteem_value", AGREE_1_4),
    Input::reversed("esteem_good", AGREE_1_4),
];

static STRESS: [Input; 4] = [
    Input::plain("stress_control"),
    Input::plain("stress_overcome"),
    Input::reversed("stress_confident", AGREE_1_5),
    Input::reversed("stress_way", AGREE_1_5),
];

static NEGATIVE: [Input; 10] = [
    Input::plain("negative_lonely"),
    Input::plain("negative_unhappy"),
    Input::plain("negative_like"),
    Input::plain("negative_cry"),
    Input::plain("negative_school"),
    Input::plain("negative_worry"),
    Input::plain("negative_sleep"),
    Input::plain("negative_wake"),
    Input::plain("negative_shy"),
    Input::plain("negative_scared"),
];

static SUPPORT: [Input; 2] = [Input::plain("support_ways"), Input::plain("support_look")];

static PHYSICAL: [Input; 2] = [Input::plain("physical_days"), Input::plain("physical_hours")];

static TALK_OVERALL: [Input; 3] = [
    Input::plain("staff_talk_score"),
    Input::plain("home_talk_score"),
    Input::plain("peer_talk_score"),
];

static ACCEPT: [Input; 4] = [
    Input::plain("accept_staff"),
    Input::plain("accept_home"),
    Input::plain("accept_local"),
    Input::plain("accept_peer"),
];

static STAFF_RELATIONSHIP: [Input; 4] = [
    Input::plain("staff_interest"),
    Input::plain("staff_believe"),
    Input::plain("staff_best"),
    Input::plain("staff_listen"),
];

static HOME_RELATIONSHIP: [Input; 4] = [
    Input::plain("home_interest"),
    Input::plain("home_believe"),
    Input::plain("home_best"),
    Input::plain("home_listen"),
];

static LOCAL_ENV: [Input; 5] = [
    Input::recoded("local_safe", &LOCAL_SAFE_1_5),
    Input::plain("local_support"),
    Input::plain("local_trust"),
    Input::plain("local_neighbours"),
    Input::plain("local_places"),
];

static DISCRIM_ITEMS: [&str; 5] = [
    "discrim_race",
    "discrim_gender",
    "discrim_orientation",
    "discrim_disability",
    "discrim_faith",
];

static FUTURE: [Input; 3] = [
    Input::recoded("future_options", &FUTURE_OPTIONS_1_5),
    Input::excluding("future_interest", &UNSURE),
    Input::excluding("future_support", &UNSURE),
];

static SOCIAL: [Input; 4] = [
    Input::plain("social_along"),
    Input::plain("social_time"),
    Input::plain("social_support"),
    Input::plain("social_hard"),
];

static BULLY: [Input; 3] = [
    Input::plain("bully_physical"),
    Input::plain("bully_other"),
    Input::plain("bully_cyber"),
];

static RULES: [TopicRule; 32] = [
    TopicRule {
        topic: "autonomy_score",
        combine: Combine::Sum {
            inputs: &AUTONOMY,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "life_satisfaction_score",
        combine: Combine::Single {
            input: Input::plain("life_satisfaction"),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "optimism_score",
        combine: Combine::Sum {
            inputs: &OPTIMISM,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "wellbeing_score",
        combine: Combine::Sum {
            inputs: &WELLBEING,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "esteem_score",
        combine: Combine::Sum {
            inputs: &ESTEEM,
            offset: 0.0,
        },
        flip: None,
    },
    // Four 1-5 items re-based to 0-4 each, summed to 0-16, then flipped
    // into the positive direction.
    TopicRule {
        topic: "stress_score",
        combine: Combine::Sum {
            inputs: &STRESS,
            offset: -4.0,
        },
        flip: Some(bounds(0.0, 16.0)),
    },
    TopicRule {
        topic: "appearance_score",
        combine: Combine::Single {
            input: Input::excluding("appearance_happy", &PREFER_NOT_TO_SAY),
            offset: 0.0,
        },
        flip: None,
    },
    // Ten 1-3 items re-based to 0-2 each, summed to 0-20, then flipped.
    TopicRule {
        topic: "negative_score",
        combine: Combine::Sum {
            inputs: &NEGATIVE,
            offset: -10.0,
        },
        flip: Some(bounds(0.0, 20.0)),
    },
    TopicRule {
        topic: "lonely_score",
        combine: Combine::Single {
            input: Input::plain("lonely"),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "support_score",
        combine: Combine::Sum {
            inputs: &SUPPORT,
            offset: 0.0,
        },
        flip: Some(bounds(2.0, 8.0)),
    },
    TopicRule {
        topic: "sleep_score",
        combine: Combine::Single {
            input: Input::plain("sleep"),
            offset: 0.0,
        },
        flip: None,
    },
    // Active days per week times average minutes per active day.
    TopicRule {
        topic: "physical_score",
        combine: Combine::Product { inputs: &PHYSICAL },
        flip: None,
    },
    TopicRule {
        topic: "free_like_score",
        combine: Combine::Single {
            input: Input::plain("free_like"),
            offset: 0.0,
        },
        flip: Some(AGREE_1_5),
    },
    // Hours codes 1-9 re-based to 0-8, then flipped so heavier use scores
    // lower.
    TopicRule {
        topic: "media_score",
        combine: Combine::Single {
            input: Input::plain("media_hours"),
            offset: -1.0,
        },
        flip: Some(bounds(0.0, 8.0)),
    },
    TopicRule {
        topic: "places_score",
        combine: Combine::Single {
            input: Input::plain("places_freq"),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "staff_talk_score",
        combine: Combine::Gated {
            gate: "staff_talk",
            listen: "staff_talk_listen",
            helped: Input::recoded("staff_talk_helpful", &HELPFUL_1_4),
            fallback: "staff_talk_if",
        },
        flip: None,
    },
    TopicRule {
        topic: "home_talk_score",
        combine: Combine::Gated {
            gate: "home_talk",
            listen: "home_talk_listen",
            helped: Input::recoded("home_talk_helpful", &HELPFUL_1_4),
            fallback: "home_talk_if",
        },
        flip: None,
    },
    TopicRule {
        topic: "peer_talk_score",
        combine: Combine::Gated {
            gate: "peer_talk",
            listen: "peer_talk_listen",
            helped: Input::recoded("peer_talk_helpful", &HELPFUL_1_4),
            fallback: "peer_talk_if",
        },
        flip: None,
    },
    // Staff, home and peer sub-scores each span 1-4, so the overall score
    // spans 3-12.
    TopicRule {
        topic: "talk_score",
        combine: Combine::Sum {
            inputs: &TALK_OVERALL,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "accept_score",
        combine: Combine::Sum {
            inputs: &ACCEPT,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "school_belong_score",
        combine: Combine::Single {
            input: Input::plain("school_belong"),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "staff_relationship_score",
        combine: Combine::Sum {
            inputs: &STAFF_RELATIONSHIP,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "home_relationship_score",
        combine: Combine::Sum {
            inputs: &HOME_RELATIONSHIP,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "home_happy_score",
        combine: Combine::Single {
            input: Input::plain("home_happy"),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "local_env_score",
        combine: Combine::Sum {
            inputs: &LOCAL_ENV,
            offset: 0.0,
        },
        flip: Some(bounds(5.0, 25.0)),
    },
    TopicRule {
        topic: "discrim_score",
        combine: Combine::AnyOf {
            items: &DISCRIM_ITEMS,
            negative: &DISCRIM_NEGATIVE,
        },
        flip: None,
    },
    TopicRule {
        topic: "belong_local_score",
        combine: Combine::Single {
            input: Input::plain("belong_local"),
            offset: 0.0,
        },
        flip: Some(AGREE_1_4),
    },
    TopicRule {
        topic: "wealth_score",
        combine: Combine::Single {
            input: Input::recoded("wealth", &WEALTH_SAME),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "future_score",
        combine: Combine::Sum {
            inputs: &FUTURE,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "climate_score",
        combine: Combine::Single {
            input: Input::plain("climate"),
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "social_score",
        combine: Combine::Sum {
            inputs: &SOCIAL,
            offset: 0.0,
        },
        flip: None,
    },
    TopicRule {
        topic: "bully_score",
        combine: Combine::Sum {
            inputs: &BULLY,
            offset: 0.0,
        },
        flip: Some(bounds(3.0, 12.0)),
    },
];

pub fn topic_rules() -> &'static [TopicRule] {
    &RULES
}

pub fn topic_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.topic).collect()
}
