//! Predicted local effect of each action kind.
//!
//! Predictions are pure: the same prior value, kind and timestamp always give
//! the same result, which lets the manager recompute an entity's visible value
//! from its base and pending layers at any time.

use checksync_domain::{ActionKind, EntityId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Value `kind` would leave behind when applied to `prior`.
///
/// A missing or non-object prior is treated as `{"id": <target>}`.
#[must_use]
pub fn predict(prior: Option<&Value>, kind: &ActionKind, applied_at: DateTime<Utc>) -> Value {
    let mut entity = match prior {
        Some(Value::Object(map)) => map.clone(),
        _ => skeleton(kind.target()),
    };
    let stamp = Value::String(applied_at.to_rfc3339_opts(SecondsFormat::Millis, true));

    match kind {
        ActionKind::TaskCompletion { notes, completed_by, .. } => {
            entity.insert("completed".into(), Value::Bool(true));
            entity.insert("completed_at".into(), stamp);
            if let Some(by) = completed_by {
                entity.insert("completed_by".into(), Value::String(by.clone()));
            }
            if let Some(notes) = notes {
                entity.insert("completion_notes".into(), Value::String(notes.clone()));
            }
        }
        ActionKind::UndoTaskCompletion { .. } => {
            entity.insert("completed".into(), Value::Bool(false));
            entity.remove("completed_at");
            entity.remove("completed_by");
            entity.remove("completion_notes");
        }
        ActionKind::ChecklistUpdate { fields, .. } => {
            entity.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        ActionKind::NoteAdd { note_id, text, .. } => {
            let note = json!({ "id": note_id, "text": text });
            match entity.get_mut("notes") {
                Some(Value::Array(notes)) => notes.push(note),
                _ => {
                    entity.insert("notes".into(), Value::Array(vec![note]));
                }
            }
        }
        ActionKind::ChecklistSubmission { .. } => {
            entity.insert("status".into(), Value::String("completed".into()));
            entity.insert("completed_at".into(), stamp);
        }
    }

    Value::Object(entity)
}

fn skeleton(target: &EntityId) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(target.as_str().to_owned()));
    map
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_completion_then_undo_clears_completion_fields() {
        let task = json!({"id": "t1", "title": "Check valves", "completed": false});
        let kind = ActionKind::TaskCompletion {
            task_id: "t1".into(),
            notes: Some("ok".into()),
            completed_by: Some("user-1".into()),
        };

        let done = predict(Some(&task), &kind, at());
        assert_eq!(done["completed"], json!(true));
        assert_eq!(done["completed_at"], json!("2024-05-01T09:30:00.000Z"));
        assert_eq!(done["completed_by"], json!("user-1"));

        let undone = predict(Some(&done), &ActionKind::UndoTaskCompletion { task_id: "t1".into() }, at());
        assert_eq!(undone, task);
    }

    #[test]
    fn test_note_add_appends() {
        let kind = ActionKind::NoteAdd { task_id: "t1".into(), note_id: "n1".into(), text: "a".into() };
        let once = predict(None, &kind, at());
        let twice = predict(Some(&once), &kind, at());

        assert_eq!(once, json!({"id": "t1", "notes": [{"id": "n1", "text": "a"}]}));
        assert_eq!(twice["notes"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_completion_notes_and_note_list_coexist() {
        let completion = ActionKind::TaskCompletion {
            task_id: "t1".into(),
            notes: Some("replaced seal".into()),
            completed_by: None,
        };
        let note = ActionKind::NoteAdd { task_id: "t1".into(), note_id: "n1".into(), text: "a".into() };

        let done = predict(None, &completion, at());
        let noted = predict(Some(&done), &note, at());

        assert_eq!(noted["completion_notes"], json!("replaced seal"));
        assert_eq!(noted["notes"], json!([{"id": "n1", "text": "a"}]));
    }

    #[test]
    fn test_checklist_update_merges_fields() {
        let mut fields = Map::new();
        fields.insert("title".into(), json!("Night shift"));
        let kind = ActionKind::ChecklistUpdate { checklist_id: "cl".into(), fields };

        let value = predict(Some(&json!({"id": "cl", "title": "Day", "progress": 10})), &kind, at());
        assert_eq!(value, json!({"id": "cl", "title": "Night shift", "progress": 10}));
    }
}
