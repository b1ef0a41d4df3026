#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_wellbeingd"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn sidecar");
    let stdin = child.stdin.take().expect("sidecar stdin");
    let stdout = child.stdout.take().expect("sidecar stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    if dir.exists() {
        let _ = std::fs::remove_dir_all(&dir);
    }
    dir
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let line = serde_json::to_string(&json!({
        "id": id,
        "method": method,
        "params": params
    }))
    .expect("serialize request");
    writeln!(stdin, "{line}").expect("write request");
    stdin.flush().expect("flush request");

    let mut response = String::new();
    reader.read_line(&mut response).expect("read response");
    serde_json::from_str(&response).expect("parse response")
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let resp = request(stdin, reader, id, method, params);
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response for {method}: {resp}"
    );
    resp.get("result").cloned().expect("result payload")
}

pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let resp = request(stdin, reader, id, method, params);
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected error response for {method}: {resp}"
    );
    resp.get("error").cloned().expect("error payload")
}

pub fn error_code(error: &Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

/// Every raw item the score derivations read, in instrument order.
pub fn survey_item_names() -> Vec<&'static str> {
    vec![
        "autonomy_pressure",
        "autonomy_express",
        "autonomy_decide",
        "autonomy_told",
        "autonomy_myself",
        "autonomy_choice",
        "life_satisfaction",
        "optimism_future",
        "optimism_best",
        "optimism_good",
        "optimism_work",
        "wellbeing_optimistic",
        "wellbeing_useful",
        "wellbeing_relaxed",
        "wellbeing_problems",
        "wellbeing_thinking",
        "wellbeing_close",
        "wellbeing_mind",
        "esteem_satisfied",
        "esteem_qualities",
        "esteem_well",
        "esteem_value",
        "esteem_good",
        "stress_control",
        "stress_overcome",
        "stress_confident",
        "stress_way",
        "appearance_happy",
        "negative_lonely",
        "negative_unhappy",
        "negative_like",
        "negative_cry",
        "negative_school",
        "negative_worry",
        "negative_sleep",
        "negative_wake",
        "negative_shy",
        "negative_scared",
        "lonely",
        "support_ways",
        "support_look",
        "sleep",
        "physical_days",
        "physical_hours",
        "free_like",
        "media_hours",
        "places_freq",
        "staff_talk",
        "staff_talk_listen",
        "staff_talk_helpful",
        "staff_talk_if",
        "home_talk",
        "home_talk_listen",
        "home_talk_helpful",
        "home_talk_if",
        "peer_talk",
        "peer_talk_listen",
        "peer_talk_helpful",
        "peer_talk_if",
        "accept_staff",
        "accept_home",
        "accept_local",
        "accept_peer",
        "school_belong",
        "staff_interest",
        "staff_believe",
        "staff_best",
        "staff_listen",
        "home_interest",
        "home_believe",
        "home_best",
        "home_listen",
        "home_happy",
        "local_safe",
        "local_support",
        "local_trust",
        "local_neighbours",
        "local_places",
        "discrim_race",
        "discrim_gender",
        "discrim_orientation",
        "discrim_disability",
        "discrim_faith",
        "belong_local",
        "wealth",
        "future_options",
        "future_interest",
        "future_support",
        "climate",
        "social_along",
        "social_time",
        "social_support",
        "social_hard",
        "bully_physical",
        "bully_other",
        "bully_cyber",
    ]
}

/// The full item catalog payload for `survey.importResponses`. The sleep
/// item carries its yes/no options so distribution assertions have labelled
/// categories to check against.
pub fn survey_items_json() -> Value {
    let items = survey_item_names()
        .into_iter()
        .map(|name| {
            if name == "sleep" {
                json!({
                    "name": name,
                    "label": "Is the amount of sleep you normally get enough?",
                    "options": [
                        { "code": 1, "label": "Yes" },
                        { "code": 2, "label": "No" }
                    ]
                })
            } else {
                json!({ "name": name })
            }
        })
        .collect::<Vec<_>>();
    Value::Array(items)
}

pub fn pupil_json(
    school: &str,
    year_group: &str,
    gender: &str,
    fsm: &str,
    sen: &str,
    responses: Value,
) -> Value {
    json!({
        "schoolLab": school,
        "yearGroupLab": year_group,
        "genderLab": gender,
        "fsmLab": fsm,
        "senLab": sen,
        "responses": responses
    })
}

/// Select a fresh workspace and import the given pupils against the full
/// item catalog.
pub fn select_and_import(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
    pupils: Vec<Value>,
) {
    let _ = request_ok(
        stdin,
        reader,
        "setup-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "setup-2",
        "survey.importResponses",
        json!({ "items": survey_items_json(), "pupils": pupils }),
    );
}
