use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Append optional equality filters, keeping stored row order.
fn filtered_sql(base: &str, filters: &[(&str, Option<String>)]) -> (String, Vec<Value>) {
    let mut sql = base.to_string();
    let mut values = Vec::new();
    let mut first = true;
    for (column, value) in filters {
        if let Some(v) = value {
            sql.push_str(if first { " WHERE " } else { " AND " });
            sql.push_str(column);
            sql.push_str(" = ?");
            values.push(Value::Text(v.clone()));
            first = false;
        }
    }
    sql.push_str(" ORDER BY rowid");
    (sql, values)
}

fn parse_list(raw: Option<String>) -> serde_json::Value {
    match raw {
        Some(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::Null),
        None => serde_json::Value::Null,
    }
}

fn handle_scores(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (sql, values) = filtered_sql(
        "SELECT school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab, variable, mean, count
         FROM aggregate_scores",
        &[
            ("school_lab", optional_str(req, "schoolLab")),
            ("variable", optional_str(req, "variable")),
        ],
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map(params_from_iter(values), |r| {
            Ok(json!({
                "schoolLab": r.get::<_, String>(0)?,
                "yearGroupLab": r.get::<_, String>(1)?,
                "genderLab": r.get::<_, String>(2)?,
                "fsmLab": r.get::<_, String>(3)?,
                "senLab": r.get::<_, String>(4)?,
                "variable": r.get::<_, String>(5)?,
                "mean": r.get::<_, Option<f64>>(6)?,
                "count": r.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "rows": rows }))
}

fn handle_responses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (sql, values) = filtered_sql(
        "SELECT school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab,
                measure, measure_lab, cat, cat_lab, percentage, count, n_responses
         FROM aggregate_responses",
        &[
            ("school_lab", optional_str(req, "schoolLab")),
            ("measure", optional_str(req, "measure")),
        ],
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map(params_from_iter(values), |r| {
            Ok(json!({
                "schoolLab": r.get::<_, String>(0)?,
                "yearGroupLab": r.get::<_, String>(1)?,
                "genderLab": r.get::<_, String>(2)?,
                "fsmLab": r.get::<_, String>(3)?,
                "senLab": r.get::<_, String>(4)?,
                "measure": r.get::<_, String>(5)?,
                "measureLab": r.get::<_, String>(6)?,
                "cat": parse_list(r.get::<_, Option<String>>(7)?),
                "catLab": parse_list(r.get::<_, Option<String>>(8)?),
                "percentage": parse_list(r.get::<_, Option<String>>(9)?),
                "count": parse_list(r.get::<_, Option<String>>(10)?),
                "nResponses": r.get::<_, Option<i64>>(11)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "rows": rows }))
}

fn handle_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (sql, values) = filtered_sql(
        "SELECT school_lab, year_group_lab, gender_lab, fsm_lab, sen_lab, count
         FROM overall_counts",
        &[("school_lab", optional_str(req, "schoolLab"))],
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map(params_from_iter(values), |r| {
            Ok(json!({
                "schoolLab": r.get::<_, String>(0)?,
                "yearGroupLab": r.get::<_, String>(1)?,
                "genderLab": r.get::<_, String>(2)?,
                "fsmLab": r.get::<_, String>(3)?,
                "senLab": r.get::<_, String>(4)?,
                "count": r.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.scores" => Some(handle_scores(state, req)),
        "results.responses" => Some(handle_responses(state, req)),
        "results.counts" => Some(handle_counts(state, req)),
        _ => None,
    }
}
