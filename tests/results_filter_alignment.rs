mod test_support;

use serde_json::json;
use test_support::{pupil_json, request_ok, select_and_import, spawn_sidecar, temp_dir};

/// Twelve pupils in one school: nine Year 8 answering "yes" to the sleep
/// question, one Year 8 answering "no", one Year 10 "yes", one Year 10 who
/// skipped it. All are girls, so the Boy rows exercise the empty-group path.
fn import_sleep_cohort(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    workspace: &std::path::PathBuf,
) {
    let mut pupils = Vec::new();
    for _ in 0..9 {
        pupils.push(pupil_json(
            "School A",
            "Year 8",
            "Girl",
            "Non-FSM",
            "Non-SEN",
            json!({ "sleep": 1 }),
        ));
    }
    pupils.push(pupil_json(
        "School A",
        "Year 8",
        "Girl",
        "Non-FSM",
        "Non-SEN",
        json!({ "sleep": 2 }),
    ));
    pupils.push(pupil_json(
        "School A",
        "Year 10",
        "Girl",
        "Non-FSM",
        "Non-SEN",
        json!({ "sleep": 1 }),
    ));
    pupils.push(pupil_json(
        "School A",
        "Year 10",
        "Girl",
        "Non-FSM",
        "Non-SEN",
        json!({}),
    ));
    select_and_import(stdin, reader, workspace, pupils);
}

#[test]
fn response_distribution_counts_categories_and_suppresses_small_groups() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("wellbeing-responses");
    import_sleep_cohort(&mut stdin, &mut reader, &workspace);
    let _ = request_ok(&mut stdin, &mut reader, "1", "scores.compute", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "2", "aggregate.run", json!({}));

    let responses = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.responses",
        json!({ "schoolLab": "School A", "measure": "sleep" }),
    );
    let rows = responses
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows");
    // One school, nine groups, one measure.
    assert_eq!(rows.len(), 9);

    let row_for = |key: &str, value: &str| {
        rows.iter()
            .find(|row| row.get(key).and_then(|v| v.as_str()) == Some(value))
            .expect("group row")
    };

    // Whole-school row: 11 of 12 answered, categories in declared order
    // with the non-response bar at the end.
    let all_row = row_for("yearGroupLab", "All");
    assert_eq!(all_row.get("nResponses").and_then(|v| v.as_i64()), Some(11));
    assert_eq!(
        all_row.get("catLab").and_then(|v| v.as_array()).map(|a| {
            a.iter()
                .map(|v| v.as_str().unwrap_or("").to_string())
                .collect::<Vec<_>>()
        }),
        Some(vec![
            "Yes".to_string(),
            "No".to_string(),
            "No response".to_string()
        ])
    );
    assert_eq!(
        all_row.get("count").and_then(|v| v.as_array()).map(|a| {
            a.iter().map(|v| v.as_i64().unwrap_or(-1)).collect::<Vec<_>>()
        }),
        Some(vec![10, 1, 1])
    );
    assert_eq!(
        all_row.get("percentage").and_then(|v| v.as_array()).map(|a| {
            a.iter().map(|v| v.as_f64().unwrap_or(-1.0)).collect::<Vec<_>>()
        }),
        Some(vec![83.3, 8.3, 8.3])
    );

    // Ten Year 8 pupils all answered: published in full.
    let year8 = row_for("yearGroupLab", "Year 8");
    assert_eq!(year8.get("nResponses").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(
        year8.get("count").and_then(|v| v.as_array()).map(|a| {
            a.iter().map(|v| v.as_i64().unwrap_or(-1)).collect::<Vec<_>>()
        }),
        Some(vec![9, 1, 0])
    );

    // Two Year 10 pupils: below the publication threshold, withheld.
    let year10 = row_for("yearGroupLab", "Year 10");
    assert!(year10.get("nResponses").map(|v| v.is_null()).unwrap_or(false));
    assert!(year10.get("cat").map(|v| v.is_null()).unwrap_or(false));
    assert!(year10.get("count").map(|v| v.is_null()).unwrap_or(false));

    // No boys at all: the empty group takes the same withheld shape.
    let boys = row_for("genderLab", "Boy");
    assert!(boys.get("nResponses").map(|v| v.is_null()).unwrap_or(false));
    assert!(boys.get("percentage").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn filtered_reads_align_with_full_reads() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("wellbeing-filters");
    import_sleep_cohort(&mut stdin, &mut reader, &workspace);
    let _ = request_ok(&mut stdin, &mut reader, "1", "scores.compute", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "2", "aggregate.run", json!({}));

    let all_scores = request_ok(&mut stdin, &mut reader, "3", "results.scores", json!({}));
    let all_rows = all_scores
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows");

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.scores",
        json!({ "variable": "sleep_score" }),
    );
    let filtered_rows = filtered
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows");
    let manual: Vec<&serde_json::Value> = all_rows
        .iter()
        .filter(|row| row.get("variable").and_then(|v| v.as_str()) == Some("sleep_score"))
        .collect();
    assert_eq!(filtered_rows.len(), manual.len());
    assert_eq!(filtered_rows.len(), 9);
    for (filtered_row, manual_row) in filtered_rows.iter().zip(manual) {
        assert_eq!(*filtered_row, *manual_row);
    }

    // The whole-school mean uses completed responses only: eleven pupils
    // answered, (10 * 1 + 1 * 2) / 11.
    let all_row = filtered_rows
        .iter()
        .find(|row| row.get("yearGroupLab").and_then(|v| v.as_str()) == Some("All"))
        .expect("All row");
    assert_eq!(all_row.get("count").and_then(|v| v.as_i64()), Some(11));
    let mean = all_row.get("mean").and_then(|v| v.as_f64()).expect("mean");
    assert!((mean - 12.0 / 11.0).abs() < 1e-9);

    // Count reads agree with the score table's overall counts.
    let counts = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.counts",
        json!({ "schoolLab": "School A" }),
    );
    let count_rows = counts.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(count_rows.len(), 9);
    let whole_school = count_rows
        .iter()
        .find(|row| row.get("yearGroupLab").and_then(|v| v.as_str()) == Some("All"))
        .expect("All count row");
    assert_eq!(whole_school.get("count").and_then(|v| v.as_i64()), Some(12));
}
