use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

const IMPORT_MAX_PUPILS: usize = 50_000;

struct ParsedOption {
    code: i64,
    label: String,
}

struct ParsedItem {
    name: String,
    label: String,
    options: Vec<ParsedOption>,
}

struct ParsedPupil {
    school_lab: Option<String>,
    year_group_lab: Option<String>,
    gender_lab: Option<String>,
    fsm_lab: Option<String>,
    sen_lab: Option<String>,
    responses: Vec<(String, f64)>,
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn parse_items(req: &Request) -> Result<Vec<ParsedItem>, serde_json::Value> {
    let Some(raw) = req.params.get("items").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing items", None));
    };
    if raw.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            "items must contain at least one survey item",
            None,
        ));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (idx, value) in raw.iter().enumerate() {
        let Some(obj) = value.as_object() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("items[{idx}] must be an object"),
                None,
            ));
        };
        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Err(err(
                &req.id,
                "bad_params",
                format!("items[{idx}].name must be a non-empty string"),
                None,
            ));
        }
        if !seen.insert(name.clone()) {
            return Err(err(
                &req.id,
                "bad_params",
                "items must not contain duplicate names",
                Some(json!({ "name": name })),
            ));
        }
        let label = obj
            .get("label")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| name.clone());

        let mut options = Vec::new();
        if let Some(raw_options) = obj.get("options") {
            let Some(raw_options) = raw_options.as_array() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("items[{idx}].options must be an array"),
                    None,
                ));
            };
            let mut codes_seen: HashSet<i64> = HashSet::new();
            for option in raw_options {
                let Some(code) = option.get("code").and_then(|v| v.as_i64()) else {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        format!("items[{idx}].options entries need an integer code"),
                        None,
                    ));
                };
                if !codes_seen.insert(code) {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        format!("items[{idx}].options must not repeat codes"),
                        Some(json!({ "code": code })),
                    ));
                }
                let label = option
                    .get("label")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| code.to_string());
                options.push(ParsedOption { code, label });
            }
        }
        out.push(ParsedItem {
            name,
            label,
            options,
        });
    }
    Ok(out)
}

fn parse_label(
    req: &Request,
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    idx: usize,
) -> Result<Option<String>, serde_json::Value> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
            Some(_) => Ok(None),
            None => Err(err(
                &req.id,
                "bad_params",
                format!("pupils[{idx}].{key} must be a string or null"),
                None,
            )),
        },
    }
}

fn parse_pupils(
    req: &Request,
    item_names: &HashSet<String>,
) -> Result<Vec<ParsedPupil>, serde_json::Value> {
    let Some(raw) = req.params.get("pupils").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing pupils", None));
    };
    if raw.len() > IMPORT_MAX_PUPILS {
        return Err(err(
            &req.id,
            "bad_params",
            format!("pupils must contain at most {IMPORT_MAX_PUPILS} rows"),
            None,
        ));
    }

    let mut out = Vec::with_capacity(raw.len());
    for (idx, value) in raw.iter().enumerate() {
        let Some(obj) = value.as_object() else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("pupils[{idx}] must be an object"),
                None,
            ));
        };

        let mut responses = Vec::new();
        if let Some(raw_responses) = obj.get("responses") {
            let Some(raw_responses) = raw_responses.as_object() else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("pupils[{idx}].responses must be an object"),
                    None,
                ));
            };
            for (item, answer) in raw_responses {
                if !item_names.contains(item.as_str()) {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        format!("pupils[{idx}].responses names an item missing from items"),
                        Some(json!({ "item": item })),
                    ));
                }
                if answer.is_null() {
                    continue;
                }
                let Some(v) = answer.as_f64() else {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        format!("pupils[{idx}].responses.{item} must be a number or null"),
                        None,
                    ));
                };
                responses.push((item.clone(), v));
            }
        }

        out.push(ParsedPupil {
            school_lab: parse_label(req, obj, "schoolLab", idx)?,
            year_group_lab: parse_label(req, obj, "yearGroupLab", idx)?,
            gender_lab: parse_label(req, obj, "genderLab", idx)?,
            fsm_lab: parse_label(req, obj, "fsmLab", idx)?,
            sen_lab: parse_label(req, obj, "senLab", idx)?,
            responses,
        });
    }
    Ok(out)
}

fn handle_import_responses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let items = match parse_items(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let item_names: HashSet<String> = items.iter().map(|i| i.name.clone()).collect();
    let pupils = match parse_pupils(req, &item_names) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_write_failed", e.to_string(), None),
    };

    // A fresh survey load replaces everything derived from the old one.
    for table in [
        "aggregate_scores",
        "aggregate_responses",
        "overall_counts",
        "pupil_scores",
        "responses",
        "pupils",
        "item_options",
        "survey_items",
    ] {
        if let Err(e) = tx.execute(&format!("DELETE FROM {table}"), []) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
    }

    for (sort_order, item) in items.iter().enumerate() {
        if let Err(e) = tx.execute(
            "INSERT INTO survey_items(name, label, sort_order) VALUES (?, ?, ?)",
            (&item.name, &item.label, sort_order as i64),
        ) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
        for (option_order, option) in item.options.iter().enumerate() {
            if let Err(e) = tx.execute(
                "INSERT INTO item_options(item, code, label, sort_order) VALUES (?, ?, ?, ?)",
                (&item.name, option.code, &option.label, option_order as i64),
            ) {
                return err(&req.id, "db_write_failed", e.to_string(), None);
            }
        }
    }

    let imported_at = Utc::now().to_rfc3339();
    let mut response_count = 0usize;
    for pupil in &pupils {
        let pupil_id = Uuid::new_v4().to_string();
        if let Err(e) = tx.execute(
            "INSERT INTO pupils(id, school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab, imported_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                &pupil_id,
                &pupil.school_lab,
                &pupil.year_group_lab,
                &pupil.gender_lab,
                &pupil.fsm_lab,
                &pupil.sen_lab,
                &imported_at,
            ),
        ) {
            return err(&req.id, "db_write_failed", e.to_string(), None);
        }
        for (item, value) in &pupil.responses {
            if let Err(e) = tx.execute(
                "INSERT INTO responses(pupil_id, item, value) VALUES (?, ?, ?)",
                (&pupil_id, item, value),
            ) {
                return err(&req.id, "db_write_failed", e.to_string(), None);
            }
            response_count += 1;
        }
    }

    if let Err(e) = db::record_batch_run(
        &tx,
        "survey.importResponses",
        &json!({ "pupils": pupils.len(), "items": items.len() }),
    ) {
        return err(&req.id, "db_write_failed", format!("{e:?}"), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_write_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "pupilCount": pupils.len(),
            "itemCount": items.len(),
            "responseCount": response_count
        }),
    )
}

fn handle_schema(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let items = match db::load_survey_items(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let items_json = items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "label": item.label,
                "options": item.options.iter().map(|o| {
                    json!({ "code": o.code, "label": o.label })
                }).collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();
    ok(&req.id, json!({ "items": items_json }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "survey.importResponses" => Some(handle_import_responses(state, req)),
        "survey.schema" => Some(handle_schema(state, req)),
        _ => None,
    }
}
