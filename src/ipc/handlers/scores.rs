use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scores::{calculate_scores, PupilResponses};
use crate::topics;
use rusqlite::Connection;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn load_catalog(conn: &Connection) -> Result<BTreeSet<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT name FROM survey_items")?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn load_pupil_responses(conn: &Connection) -> Result<Vec<PupilResponses>, rusqlite::Error> {
    let mut pupils_stmt = conn.prepare("SELECT id FROM pupils ORDER BY rowid")?;
    let mut pupils: Vec<PupilResponses> = pupils_stmt
        .query_map([], |r| {
            Ok(PupilResponses {
                pupil_id: r.get(0)?,
                items: HashMap::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, p) in pupils.iter().enumerate() {
        index.insert(p.pupil_id.clone(), i);
    }

    let mut responses_stmt = conn.prepare("SELECT pupil_id, item, value FROM responses")?;
    let rows = responses_stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, f64>(2)?,
        ))
    })?;
    for row in rows {
        let (pupil_id, item, value) = row?;
        if let Some(i) = index.get(&pupil_id) {
            pupils[*i].items.insert(item, Some(value));
        }
    }
    Ok(pupils)
}

fn handle_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let catalog = match load_catalog(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let pupils = match load_pupil_responses(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rules = topics::topic_rules();
    let scored = match calculate_scores(rules, &catalog, &pupils) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_write_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM pupil_scores", []) {
        return err(&req.id, "db_write_failed", e.to_string(), None);
    }
    for pupil in &scored {
        for (topic, score) in &pupil.topics {
            if let Err(e) = tx.execute(
                "INSERT INTO pupil_scores(pupil_id, topic, score) VALUES (?, ?, ?)",
                (&pupil.pupil_id, topic, score),
            ) {
                return err(&req.id, "db_write_failed", e.to_string(), None);
            }
        }
    }
    if let Err(e) = db::record_batch_run(
        &tx,
        "scores.compute",
        &json!({ "pupils": scored.len(), "topics": rules.len() }),
    ) {
        return err(&req.id, "db_write_failed", format!("{e:?}"), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_write_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "pupilCount": scored.len(),
            "topicCount": rules.len()
        }),
    )
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_filter = req
        .params
        .get("schoolLab")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut pupils_stmt = match conn.prepare(
        "SELECT id, school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab
         FROM pupils
         ORDER BY rowid",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let pupils: Vec<(String, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> =
        match pupils_stmt
            .query_map([], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };

    let mut scores_stmt = match conn.prepare("SELECT pupil_id, topic, score FROM pupil_scores") {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let score_rows: Vec<(String, String, Option<f64>)> = match scores_stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut scores_by_pupil: HashMap<String, serde_json::Map<String, serde_json::Value>> =
        HashMap::new();
    for (pupil_id, topic, score) in score_rows {
        scores_by_pupil
            .entry(pupil_id)
            .or_default()
            .insert(topic, json!(score));
    }

    let rows = pupils
        .into_iter()
        .filter(|(_, school, _, _, _, _)| match &school_filter {
            Some(wanted) => school.as_deref() == Some(wanted.as_str()),
            None => true,
        })
        .map(|(id, school, year, gender, fsm, sen)| {
            let scores = scores_by_pupil
                .remove(&id)
                .map(serde_json::Value::Object)
                .unwrap_or_else(|| json!({}));
            json!({
                "pupilId": id,
                "schoolLab": school,
                "yearGroupLab": year,
                "genderLab": gender,
                "fsmLab": fsm,
                "senLab": sen,
                "scores": scores
            })
        })
        .collect::<Vec<_>>();

    ok(&req.id, json!({ "pupils": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.compute" => Some(handle_compute(state, req)),
        "scores.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
