use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

const NOW: i64 = 1_700_000_000;
const HOUR: i64 = 3600;

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reminderd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reminderd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    seq: u32,
}

impl Sidecar {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut sidecar = Sidecar {
            _child: child,
            stdin,
            reader,
            seq: 0,
        };
        sidecar.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        sidecar
    }

    fn call(&mut self, method: &str, params: Value) -> Value {
        self.seq += 1;
        let id = self.seq.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn err_code(&mut self, method: &str, params: Value) -> String {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"].as_str().unwrap_or("").to_string()
    }

    fn course(&mut self, name: &str) -> String {
        let r = self.ok("courses.create", json!({ "name": name }));
        r["courseId"].as_str().expect("courseId").to_string()
    }

    fn enrolled(&mut self, course_id: &str, first_name: &str, role: &str) -> String {
        let r = self.ok(
            "users.create",
            json!({ "firstName": first_name, "lastName": "Example" }),
        );
        let user_id = r["userId"].as_str().expect("userId").to_string();
        self.ok(
            "enrolments.set",
            json!({ "courseId": course_id, "userId": user_id, "role": role }),
        );
        user_id
    }

    fn due_item(&mut self, course_id: &str, name: &str, due_at: Option<i64>) -> String {
        let r = self.ok(
            "dueItems.create",
            json!({ "courseId": course_id, "name": name, "dueAt": due_at }),
        );
        r["dueItemId"].as_str().expect("dueItemId").to_string()
    }

    fn run(&mut self, now: i64) -> Value {
        self.ok("reminders.run", json!({ "now": now }))
    }
}

#[test]
fn second_run_sends_nothing_until_the_deadline_moves() {
    let mut sc = Sidecar::open("reminderd-idempotence");
    let course = sc.course("History");
    let ada = sc.enrolled(&course, "Ada", "student");
    let item = sc.due_item(&course, "Essay", Some(NOW + 24 * HOUR));

    let first = sc.run(NOW);
    assert_eq!(first["sent"], 1);

    let second = sc.run(NOW + HOUR);
    assert_eq!(second["sent"], 0);
    assert_eq!(second["skippedNotified"], 1);

    sc.ok(
        "dueItems.update",
        json!({ "dueItemId": item, "dueAt": NOW + 26 * HOUR }),
    );
    let third = sc.run(NOW + 2 * HOUR);
    assert_eq!(third["sent"], 1);

    let fourth = sc.run(NOW + 3 * HOUR);
    assert_eq!(fourth["sent"], 0);

    let records = sc.ok("reminders.records.list", json!({ "userId": ada }));
    let records = records["records"].as_array().expect("records");
    assert_eq!(records.len(), 2);
    let mut deadlines: Vec<i64> = records
        .iter()
        .map(|r| r["deadline"].as_i64().expect("deadline"))
        .collect();
    deadlines.sort();
    assert_eq!(deadlines, vec![NOW + 24 * HOUR, NOW + 26 * HOUR]);

    let outbox = sc.ok("outbox.list", json!({}));
    assert_eq!(outbox["messages"].as_array().map(Vec::len), Some(2));
}

#[test]
fn clearing_the_deadline_stops_reminders() {
    let mut sc = Sidecar::open("reminderd-idempotence-clear");
    let course = sc.course("Geography");
    sc.enrolled(&course, "Ada", "student");
    let item = sc.due_item(&course, "Map", Some(NOW + 5 * HOUR));
    sc.ok("dueItems.update", json!({ "dueItemId": item, "dueAt": null }));

    let summary = sc.run(NOW);
    assert_eq!(summary["candidates"], 0);
    assert_eq!(summary["sent"], 0);

    let list = sc.ok("dueItems.list", json!({ "courseId": course }));
    assert!(list["dueItems"][0]["dueAt"].is_null());
}

#[test]
fn runs_are_logged() {
    let mut sc = Sidecar::open("reminderd-idempotence-runs");
    let course = sc.course("Art");
    sc.enrolled(&course, "Ada", "student");
    sc.due_item(&course, "Portfolio", Some(NOW + HOUR));
    sc.run(NOW);
    sc.run(NOW + 60);

    let runs = sc.ok("reminders.runs.list", json!({ "limit": 5 }));
    let runs = runs["runs"].as_array().expect("runs");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["ranAt"], NOW + 60);
    assert_eq!(runs[0]["status"], "completed");
    assert_eq!(runs[0]["summary"]["sent"], 0);
    assert_eq!(runs[1]["summary"]["sent"], 1);

    assert_eq!(
        sc.err_code("reminders.runs.list", json!({ "limit": 0 })),
        "bad_params"
    );
}
