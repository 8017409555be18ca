//! Map-marker teleport shortcut
//!
//! Placing a fish-pool marker on the map teleports the player to the marked
//! position through a `goto` console command. The marker's name field, when
//! numeric, supplies the target height.

use serde_json::Value;
use tracing::debug;

use crate::inject::Injections;
use crate::net::Session;

pub const MARK_MAP_REQ: &str = "MarkMapReq";

/// Marker-type ordinal reserved for the teleport shortcut
const MARK_POINT_FISH_POOL: i64 = 5;

const DEFAULT_GOTO_HEIGHT: f64 = 500.0;

pub(crate) fn observe_mark_map(inj: &Injections, session: &mut Session, value: &Value) {
    let Some(mark) = value.get("mark") else {
        return;
    };
    let point_type = mark.get("point_type").and_then(Value::as_i64).unwrap_or(0);
    if point_type != MARK_POINT_FISH_POOL {
        return;
    }

    let pos = mark.get("pos");
    let axis = |name: &str| {
        pos.and_then(|p| p.get(name))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let x = axis("x");
    let z = axis("z");
    let height = mark
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.trim().parse::<f64>().ok())
        .unwrap_or(DEFAULT_GOTO_HEIGHT);

    let command = format!("goto {x:.2} {height:.2} {z:.2}");
    debug!(session_id = session.id, uid = session.uid(), command = %command, "Marker teleport");
    let reply = inj.run_command(session.uid(), &command);
    debug!(session_id = session.id, reply = %reply, "Marker teleport executed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    use crate::inject::{CommandExecutor, ConsoleProfile};
    use crate::proto::SchemaCatalog;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<(u32, String)>>,
    }

    impl CommandExecutor for RecordingExecutor {
        fn execute(&self, uid: u32, command: &str) -> String {
            self.commands.lock().unwrap().push((uid, command.to_string()));
            String::new()
        }
    }

    fn injections(executor: Arc<RecordingExecutor>) -> Injections {
        let catalog = SchemaCatalog::from_json(r#"{ "messages": [] }"#).unwrap();
        Injections::new(ConsoleProfile::default(), executor, Arc::new(catalog))
    }

    #[test]
    fn test_fish_pool_marker_issues_goto() {
        let executor = Arc::new(RecordingExecutor::default());
        let inj = injections(executor.clone());
        let mut session = Session::new(1);

        observe_mark_map(
            &inj,
            &mut session,
            &json!({
                "mark": {
                    "point_type": MARK_POINT_FISH_POOL,
                    "pos": { "x": 100.5, "y": 0.0, "z": -20.25 },
                    "name": "777"
                }
            }),
        );

        let commands = executor.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].1, "goto 100.50 777.00 -20.25");
    }

    #[test]
    fn test_height_defaults_when_name_not_numeric() {
        let executor = Arc::new(RecordingExecutor::default());
        let inj = injections(executor.clone());
        let mut session = Session::new(1);

        observe_mark_map(
            &inj,
            &mut session,
            &json!({
                "mark": {
                    "point_type": MARK_POINT_FISH_POOL,
                    "pos": { "x": 1.0, "z": 2.0 },
                    "name": "my spot"
                }
            }),
        );

        let commands = executor.commands.lock().unwrap();
        assert_eq!(commands[0].1, "goto 1.00 500.00 2.00");
    }

    #[test]
    fn test_other_marker_types_ignored() {
        let executor = Arc::new(RecordingExecutor::default());
        let inj = injections(executor.clone());
        let mut session = Session::new(1);

        observe_mark_map(
            &inj,
            &mut session,
            &json!({ "mark": { "point_type": 1, "pos": { "x": 1.0, "z": 2.0 } } }),
        );
        observe_mark_map(&inj, &mut session, &json!({}));

        assert!(executor.commands.lock().unwrap().is_empty());
    }
}
