use crate::aggregate::{ResponseOption, SurveyItem};
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "wellbeing.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS survey_items(
            name TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS item_options(
            item TEXT NOT NULL,
            code INTEGER NOT NULL,
            label TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(item, code),
            FOREIGN KEY(item) REFERENCES survey_items(name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pupils(
            id TEXT PRIMARY KEY,
            school_lab TEXT,
            year_group_lab TEXT,
            gender_lab TEXT,
            fsm_lab TEXT,
            sen_lab TEXT,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pupils_school ON pupils(school_lab)",
        [],
    )?;

    // One row per answered item; an unanswered item has no row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            pupil_id TEXT NOT NULL,
            item TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY(pupil_id, item),
            FOREIGN KEY(pupil_id) REFERENCES pupils(id),
            FOREIGN KEY(item) REFERENCES survey_items(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_item ON responses(item)",
        [],
    )?;

    // Derived topic scores; a NULL score is a pupil who did not complete
    // the topic.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pupil_scores(
            pupil_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            score REAL,
            PRIMARY KEY(pupil_id, topic),
            FOREIGN KEY(pupil_id) REFERENCES pupils(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pupil_scores_topic ON pupil_scores(topic)",
        [],
    )?;

    // Aggregate output tables, fully regenerated by each batch run. Row
    // order (rowid) is the deterministic school/group iteration order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS aggregate_scores(
            school_lab TEXT NOT NULL,
            year_group_lab TEXT NOT NULL,
            gender_lab TEXT NOT NULL,
            fsm_lab TEXT NOT NULL,
            sen_lab TEXT NOT NULL,
            variable TEXT NOT NULL,
            mean REAL,
            count INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS aggregate_responses(
            school_lab TEXT NOT NULL,
            year_group_lab TEXT NOT NULL,
            gender_lab TEXT NOT NULL,
            fsm_lab TEXT NOT NULL,
            sen_lab TEXT NOT NULL,
            measure TEXT NOT NULL,
            measure_lab TEXT NOT NULL,
            cat TEXT,
            cat_lab TEXT,
            percentage TEXT,
            count TEXT,
            n_responses INTEGER
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS overall_counts(
            school_lab TEXT NOT NULL,
            year_group_lab TEXT NOT NULL,
            gender_lab TEXT NOT NULL,
            fsm_lab TEXT NOT NULL,
            sen_lab TEXT NOT NULL,
            count INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_runs(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            ran_at TEXT NOT NULL,
            detail TEXT
        )",
        [],
    )?;

    Ok(conn)
}

/// Append one audit row for an import/compute/aggregate batch step.
pub fn record_batch_run(
    conn: &Connection,
    kind: &str,
    detail: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO batch_runs(id, kind, ran_at, detail) VALUES (?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            kind,
            Utc::now().to_rfc3339(),
            serde_json::to_string(detail)?,
        ),
    )?;
    Ok(())
}

/// Load the stored item catalog in import order.
pub fn load_survey_items(conn: &Connection) -> anyhow::Result<Vec<SurveyItem>> {
    let mut items_stmt = conn.prepare(
        "SELECT name, label
         FROM survey_items
         ORDER BY sort_order",
    )?;
    let mut items: Vec<SurveyItem> = items_stmt
        .query_map([], |r| {
            Ok(SurveyItem {
                name: r.get(0)?,
                label: r.get(1)?,
                options: Vec::new(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut options_stmt = conn.prepare(
        "SELECT item, code, label
         FROM item_options
         ORDER BY item, sort_order",
    )?;
    let options: Vec<(String, i64, String)> = options_stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    for (item, code, label) in options {
        if let Some(entry) = items.iter_mut().find(|i| i.name == item) {
            entry.options.push(ResponseOption { code, label });
        }
    }
    Ok(items)
}
