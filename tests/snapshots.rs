//! Snapshot and persistence round-trips.

use tempfile::TempDir;

use carvm::runtime::clock::FixedClock;
use carvm::runtime::Runtime;

fn counter_doc() -> String {
    serde_json::json!({
        "p": "cardinals",
        "op": "deploy",
        "protocol": "counter",
        "version": "1.0",
        "cpl": {
            "state": {"count": {"type": "int", "default": "0"}},
            "methods": {
                "increment": {"params": [], "logic": "state.count = state.count + 1"},
                "get_count": {"params": [], "returns": "state.count"}
            },
            "events": {"Milestone": {"params": ["at"]}},
            "owner": "doge1owner"
        }
    })
    .to_string()
}

fn make_runtime() -> Runtime {
    let mut runtime = Runtime::new().with_clock(Box::new(FixedClock::at_unix(1_700_000_000)));
    runtime.load_protocol_from_json(&counter_doc()).unwrap();
    runtime
}

#[test]
fn snapshot_restore_resumes_execution() {
    let mut runtime = make_runtime();

    runtime.call_method("increment", &[]);
    runtime.call_method("increment", &[]);
    assert_eq!(runtime.get_state("count"), "2");

    let snapshot = runtime.create_snapshot(None);

    runtime.reset_state();
    assert_eq!(runtime.get_state("count"), "0");

    runtime.restore_from_snapshot(&snapshot);
    assert_eq!(runtime.get_state("count"), "2");

    runtime.call_method("increment", &[]);
    assert_eq!(runtime.get_state("count"), "3");
}

#[test]
fn snapshot_round_trip_preserves_state_and_events() {
    let mut runtime = make_runtime();
    runtime.call_method("increment", &[]);
    runtime.emit_event("Milestone", vec!["1".to_string()]);

    let snapshot = runtime.create_snapshot(Some("123456"));
    assert_eq!(snapshot.protocol_name, "counter");
    assert_eq!(snapshot.version, "1.0");
    assert_eq!(snapshot.block_height.as_deref(), Some("123456"));

    let mut other = make_runtime();
    other.restore_from_snapshot(&snapshot);
    assert_eq!(other.get_all_state(), runtime.get_all_state());
    assert_eq!(other.event_log(), runtime.event_log());
}

#[test]
fn snapshot_serialization_is_deterministic() {
    let mut runtime = make_runtime();
    runtime.call_method("increment", &[]);
    runtime.emit_event("Milestone", vec!["1".to_string()]);

    let a = serde_json::to_string(&runtime.create_snapshot(None)).unwrap();
    let b = serde_json::to_string(&runtime.create_snapshot(None)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn snapshot_file_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.snapshot.json");

    let mut runtime = make_runtime();
    runtime.call_method("increment", &[]);
    runtime.emit_event("Milestone", vec!["1".to_string()]);
    runtime.save_snapshot_to_file(&path).unwrap();

    let mut restored = make_runtime();
    restored.load_snapshot_from_file(&path).unwrap();
    assert_eq!(restored.get_state("count"), "1");
    assert_eq!(restored.event_log().len(), 1);
    assert_eq!(restored.event_log().entries()[0].name, "Milestone");
}

#[test]
fn state_file_round_trip_across_runtimes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.state");

    // First invocation: increment twice, save state.
    let mut first = make_runtime();
    first.call_method("increment", &[]);
    first.call_method("increment", &[]);
    first.save_state_to_file(&path).unwrap();

    // Second invocation: fresh runtime, load state, continue.
    let mut second = make_runtime();
    assert_eq!(second.get_state("count"), "0");
    second.load_state_from_file(&path).unwrap();
    assert_eq!(second.get_state("count"), "2");
    second.call_method("increment", &[]);
    assert_eq!(
        second.call_method("get_count", &[]).return_value,
        "3"
    );
}

#[test]
fn state_file_wire_form_is_typed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("counter.state");

    let mut runtime = make_runtime();
    runtime.call_method("increment", &[]);
    runtime.save_state_to_file(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    // Declared int variable carries the Int tag (enum ordering: 1).
    assert_eq!(raw["count"]["type"], 1);
    assert_eq!(raw["count"]["value"], "1");
}

#[test]
fn loading_a_missing_state_file_fails_cleanly() {
    let temp = TempDir::new().unwrap();
    let mut runtime = make_runtime();
    runtime.call_method("increment", &[]);

    let result = runtime.load_state_from_file(&temp.path().join("absent.state"));
    assert!(result.is_err());
    // The store is untouched by the failed load.
    assert_eq!(runtime.get_state("count"), "1");
}

#[test]
fn restore_removes_keys_not_in_the_snapshot() {
    let mut runtime = make_runtime();
    let snapshot = runtime.create_snapshot(None);

    runtime.set_state("stray", "value");
    runtime.restore_from_snapshot(&snapshot);
    assert_eq!(runtime.get_state("stray"), "");
    assert_eq!(runtime.get_state("count"), "0");
}
