mod test_support;

use serde_json::json;
use test_support::{pupil_json, request_ok, select_and_import, spawn_sidecar, temp_dir};

const GROUPS_PER_SCHOOL: usize = 9;
const TOPIC_COUNT: usize = 32;

#[test]
fn aggregate_emits_the_full_school_by_group_grid_in_order() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("wellbeing-aggregate-grid");

    // Deliberately import School B first: output order must come from the
    // sorted school list, not import order.
    let pupils = vec![
        pupil_json(
            "School B",
            "Year 8",
            "Girl",
            "FSM",
            "SEN",
            json!({ "life_satisfaction": 9 }),
        ),
        pupil_json(
            "School A",
            "Year 10",
            "Boy",
            "Non-FSM",
            "Non-SEN",
            json!({ "life_satisfaction": 7 }),
        ),
    ];
    select_and_import(&mut stdin, &mut reader, &workspace, pupils);
    let _ = request_ok(&mut stdin, &mut reader, "1", "scores.compute", json!({}));

    let run = request_ok(&mut stdin, &mut reader, "2", "aggregate.run", json!({}));
    assert_eq!(run.get("schools").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        run.get("countRows").and_then(|v| v.as_u64()),
        Some((2 * GROUPS_PER_SCHOOL) as u64)
    );
    assert_eq!(
        run.get("scoreRows").and_then(|v| v.as_u64()),
        Some((2 * GROUPS_PER_SCHOOL * (TOPIC_COUNT + 1)) as u64)
    );

    let counts = request_ok(&mut stdin, &mut reader, "3", "results.counts", json!({}));
    let rows = counts.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 2 * GROUPS_PER_SCHOOL);

    // Schools ascending, nine rows each, whole-school row first.
    for (i, row) in rows.iter().enumerate() {
        let expected_school = if i < GROUPS_PER_SCHOOL {
            "School A"
        } else {
            "School B"
        };
        assert_eq!(
            row.get("schoolLab").and_then(|v| v.as_str()),
            Some(expected_school)
        );
    }

    let group_of = |row: &serde_json::Value, key: &str| {
        row.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
    };
    let expected_order = [
        ("yearGroupLab", "All"),
        ("yearGroupLab", "Year 8"),
        ("yearGroupLab", "Year 10"),
        ("genderLab", "Girl"),
        ("genderLab", "Boy"),
        ("fsmLab", "FSM"),
        ("fsmLab", "Non-FSM"),
        ("senLab", "SEN"),
        ("senLab", "Non-SEN"),
    ];
    for (i, (key, value)) in expected_order.iter().enumerate() {
        assert_eq!(group_of(&rows[i], key), *value, "group position {i}");
    }

    // Every filtered row pins exactly one axis; the other three stay "All".
    for row in rows {
        let pinned = ["yearGroupLab", "genderLab", "fsmLab", "senLab"]
            .iter()
            .filter(|key| group_of(row, key) != "All")
            .count();
        assert!(pinned <= 1);
    }

    // Whole-school rows count one pupil each; the matching filter rows
    // inherit that pupil, the opposite filters report zero.
    let count_of = |school: &str, key: &str, value: &str| {
        rows.iter()
            .find(|row| {
                row.get("schoolLab").and_then(|v| v.as_str()) == Some(school)
                    && group_of(row, key) == value
            })
            .and_then(|row| row.get("count").and_then(|v| v.as_i64()))
            .expect("count row")
    };
    assert_eq!(count_of("School A", "yearGroupLab", "All"), 1);
    assert_eq!(count_of("School A", "yearGroupLab", "Year 10"), 1);
    assert_eq!(count_of("School A", "yearGroupLab", "Year 8"), 0);
    assert_eq!(count_of("School B", "fsmLab", "FSM"), 1);
    assert_eq!(count_of("School B", "fsmLab", "Non-FSM"), 0);
}

#[test]
fn score_rows_cover_every_topic_plus_the_overall_count() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("wellbeing-aggregate-topics");
    let pupils = vec![pupil_json(
        "School A",
        "Year 8",
        "Girl",
        "FSM",
        "SEN",
        json!({ "life_satisfaction": 7 }),
    )];
    select_and_import(&mut stdin, &mut reader, &workspace, pupils);
    let _ = request_ok(&mut stdin, &mut reader, "1", "scores.compute", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "2", "aggregate.run", json!({}));

    let scores = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.scores",
        json!({ "schoolLab": "School A" }),
    );
    let rows = scores.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), GROUPS_PER_SCHOOL * (TOPIC_COUNT + 1));

    let all_rows: Vec<&serde_json::Value> = rows
        .iter()
        .filter(|row| {
            ["yearGroupLab", "genderLab", "fsmLab", "senLab"]
                .iter()
                .all(|key| row.get(*key).and_then(|v| v.as_str()) == Some("All"))
        })
        .collect();
    assert_eq!(all_rows.len(), TOPIC_COUNT + 1);

    let find = |variable: &str| {
        all_rows
            .iter()
            .find(|row| row.get("variable").and_then(|v| v.as_str()) == Some(variable))
            .cloned()
            .expect("variable row")
    };
    let life = find("life_satisfaction_score");
    assert_eq!(life.get("mean").and_then(|v| v.as_f64()), Some(7.0));
    assert_eq!(life.get("count").and_then(|v| v.as_i64()), Some(1));

    // A topic the pupil never answered has a null mean but still appears.
    let autonomy = find("autonomy_score");
    assert!(autonomy.get("mean").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(autonomy.get("count").and_then(|v| v.as_i64()), Some(0));

    let overall = find("overall_count");
    assert!(overall.get("mean").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(overall.get("count").and_then(|v| v.as_i64()), Some(1));
}
