use crate::aggregate::{
    breakdown_responses, count_pupils, groups_per_school, no_pupils_template,
    results_by_school_and_group, summarise_topic_scores, ScoredPupil,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::topics;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn load_scored_pupils(conn: &Connection) -> Result<Vec<ScoredPupil>, rusqlite::Error> {
    let mut pupils_stmt = conn.prepare(
        "SELECT id, school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab
         FROM pupils
         ORDER BY rowid",
    )?;
    let mut pupils: Vec<ScoredPupil> = pupils_stmt
        .query_map([], |r| {
            Ok(ScoredPupil {
                pupil_id: r.get(0)?,
                school_lab: r.get(1)?,
                year_group_lab: r.get(2)?,
                gender_lab: r.get(3)?,
                fsm_lab: r.get(4)?,
                sen_lab: r.get(5)?,
                responses: HashMap::new(),
                scores: HashMap::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, p) in pupils.iter().enumerate() {
        index.insert(p.pupil_id.clone(), i);
    }

    let mut responses_stmt = conn.prepare("SELECT pupil_id, item, value FROM responses")?;
    let response_rows = responses_stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, f64>(2)?,
        ))
    })?;
    for row in response_rows {
        let (pupil_id, item, value) = row?;
        if let Some(i) = index.get(&pupil_id) {
            pupils[*i].responses.insert(item, Some(value));
        }
    }

    let mut scores_stmt = conn.prepare("SELECT pupil_id, topic, score FROM pupil_scores")?;
    let score_rows = scores_stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, Option<f64>>(2)?,
        ))
    })?;
    for row in score_rows {
        let (pupil_id, topic, score) = row?;
        if let Some(i) = index.get(&pupil_id) {
            pupils[*i].scores.insert(topic, score);
        }
    }
    Ok(pupils)
}

fn json_list<T: serde::Serialize>(values: &Option<Vec<T>>) -> Option<String> {
    values
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string()))
}

fn handle_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let scored_count: i64 = match conn.query_row("SELECT COUNT(*) FROM pupil_scores", [], |r| {
        r.get(0)
    }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if scored_count == 0 {
        return err(
            &req.id,
            "no_scores",
            "compute pupil scores before aggregating",
            None,
        );
    }

    let pupils = match load_scored_pupils(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let items = match db::load_survey_items(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let topic_names = topics::topic_names();

    let score_agg = |subset: &[&ScoredPupil]| summarise_topic_scores(subset, &topic_names);
    let response_agg = |subset: &[&ScoredPupil]| breakdown_responses(subset, &items);
    let count_agg = |subset: &[&ScoredPupil]| count_pupils(subset);

    let score_rows =
        results_by_school_and_group(&pupils, &score_agg, &no_pupils_template(&score_agg));
    let response_rows =
        results_by_school_and_group(&pupils, &response_agg, &no_pupils_template(&response_agg));
    let count_rows =
        results_by_school_and_group(&pupils, &count_agg, &no_pupils_template(&count_agg));

    let tx = match conn.unchecked_transaction() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_write_failed", e.to_string(), None),
    };
    for table in ["aggregate_scores", "aggregate_responses", "overall_counts"] {
        if let Err(e) = tx.execute(&format!("DELETE FROM {table}"), []) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    for (labels, row) in &score_rows {
        if let Err(e) = tx.execute(
            "INSERT INTO aggregate_scores(
                school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab,
                variable, mean, count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &labels.school_lab,
                &labels.year_group_lab,
                &labels.gender_lab,
                &labels.fsm_lab,
                &labels.sen_lab,
                &row.variable,
                row.mean,
                row.count,
            ),
        ) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    for (labels, row) in &response_rows {
        if let Err(e) = tx.execute(
            "INSERT INTO aggregate_responses(
                school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab,
                measure, measure_lab, cat, cat_lab, percentage, count, n_responses)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &labels.school_lab,
                &labels.year_group_lab,
                &labels.gender_lab,
                &labels.fsm_lab,
                &labels.sen_lab,
                &row.measure,
                &row.measure_lab,
                json_list(&row.cat),
                json_list(&row.cat_lab),
                json_list(&row.percentage),
                json_list(&row.count),
                row.n_responses,
            ),
        ) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    for (labels, row) in &count_rows {
        if let Err(e) = tx.execute(
            "INSERT INTO overall_counts(
                school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab, count)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                &labels.school_lab,
                &labels.year_group_lab,
                &labels.gender_lab,
                &labels.fsm_lab,
                &labels.sen_lab,
                row.count,
            ),
        ) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    // Every school contributes a fixed-size block of group rows.
    let school_count = count_rows.len() / groups_per_school();

    if let Err(e) = db::record_batch_run(
        &tx,
        "aggregate.run",
        &json!({
            "schools": school_count,
            "scoreRows": score_rows.len(),
            "responseRows": response_rows.len(),
            "countRows": count_rows.len()
        }),
    ) {
        return err(&req.id, "db_write_failed", format!("{e:?}"), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_write_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "schools": school_count,
            "scoreRows": score_rows.len(),
            "responseRows": response_rows.len(),
            "countRows": count_rows.len()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "aggregate.run" => Some(handle_run(state, req)),
        _ => None,
    }
}
