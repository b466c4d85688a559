pub const CREATE_ALERTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS alerts (id varchar PRIMARY KEY, updated varchar);
"#;

pub const SELECT_ALERT_UPDATED: &str = r#"
SELECT updated FROM alerts WHERE id = $1;
"#;

pub const INSERT_ALERT: &str = r#"
INSERT INTO alerts (id, updated) VALUES ($1, $2);
"#;

pub const UPDATE_ALERT_UPDATED: &str = r#"
UPDATE alerts SET updated = $2 WHERE id = $1;
"#;

pub const DELETE_ALERT: &str = r#"
DELETE FROM alerts WHERE id = $1;
"#;
