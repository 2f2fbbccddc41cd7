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
fn four_students_and_a_teacher_get_four_reminders() {
    let mut sc = Sidecar::open("reminderd-scenario");
    let course = sc.course("Physics 101");
    let students: Vec<String> = ["Ada", "Grace", "Alan", "Edsger"]
        .iter()
        .map(|name| sc.enrolled(&course, name, "student"))
        .collect();
    let teacher = sc.enrolled(&course, "Barbara", "editingteacher");
    let item = sc.due_item(&course, "Lab report", Some(NOW + 24 * HOUR));

    let summary = sc.run(NOW);
    assert_eq!(summary["candidates"], 1);
    assert_eq!(summary["sent"], 4);

    let outbox = sc.ok("outbox.list", json!({}));
    let messages = outbox["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 4);
    let mut recipients: Vec<String> = messages
        .iter()
        .map(|m| m["recipientId"].as_str().expect("recipientId").to_string())
        .collect();
    recipients.sort();
    let mut expected = students.clone();
    expected.sort();
    assert_eq!(recipients, expected);
    assert!(!recipients.contains(&teacher));

    for m in messages {
        assert_eq!(m["subject"], "Lab report is due soon");
        assert_eq!(m["contextLabel"], "Lab report");
        assert_eq!(m["customPayload"]["dueItemId"], item.as_str());
        assert_eq!(m["customPayload"]["deadline"], NOW + 24 * HOUR);
        assert!(m["deliveredAt"].is_null());
        assert!(m["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(m["createdAt"], NOW);
        assert!(m["bodyText"].as_str().unwrap_or("").contains("Lab report"));
        assert!(m["bodyHtml"].as_str().unwrap_or("").starts_with("<p>Hi "));
    }
}

#[test]
fn user_override_deadline_is_carried_into_the_message() {
    let mut sc = Sidecar::open("reminderd-scenario-override");
    let course = sc.course("Chemistry");
    let ada = sc.enrolled(&course, "Ada", "student");
    let _grace = sc.enrolled(&course, "Grace", "student");
    let item = sc.due_item(&course, "Titration", Some(NOW + 100 * HOUR));
    sc.ok(
        "overrides.set",
        json!({ "dueItemId": item, "userId": ada, "dueAt": NOW + 30 * HOUR }),
    );

    let summary = sc.run(NOW);
    assert_eq!(summary["sent"], 1);
    assert_eq!(summary["skippedOutsideWindow"], 1);

    let outbox = sc.ok("outbox.list", json!({ "recipientId": ada }));
    let messages = outbox["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 1);
    let m = &messages[0];
    assert_eq!(m["customPayload"]["deadline"], NOW + 30 * HOUR);
    assert_eq!(m["customPayload"]["provenance"], "user");
    assert!(
        m["bodyText"]
            .as_str()
            .unwrap_or("")
            .contains("Thursday, 16 November 2023, 04:13 UTC"),
        "{}",
        m
    );
}

#[test]
fn outbox_delivery_marks_are_one_shot() {
    let mut sc = Sidecar::open("reminderd-scenario-outbox");
    let course = sc.course("Biology");
    sc.enrolled(&course, "Ada", "student");
    sc.enrolled(&course, "Grace", "student");
    sc.due_item(&course, "Dissection notes", Some(NOW + 2 * HOUR));
    sc.run(NOW);

    let outbox = sc.ok("outbox.list", json!({ "undeliveredOnly": true }));
    let ids: Vec<Value> = outbox["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| m["id"].clone())
        .collect();
    assert_eq!(ids.len(), 2);

    let first = sc.ok("outbox.markDelivered", json!({ "messageIds": [ids[0].clone()] }));
    assert_eq!(first["updated"], 1);
    let again = sc.ok("outbox.markDelivered", json!({ "messageIds": ids }));
    assert_eq!(again["updated"], 1);

    let pending = sc.ok("outbox.list", json!({ "undeliveredOnly": true }));
    assert_eq!(pending["messages"].as_array().map(Vec::len), Some(0));
    assert_eq!(
        sc.err_code("outbox.markDelivered", json!({ "messageIds": "nope" })),
        "bad_params"
    );
}
