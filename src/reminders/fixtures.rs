//! In-memory workspace builder for reminder unit tests.

use std::cell::Cell;

use rusqlite::Connection;

use crate::db;

pub struct Fixture {
    pub conn: Connection,
    seq: Cell<u32>,
}

impl Fixture {
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("init schema");
        Self {
            conn,
            seq: Cell::new(0),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.seq.get() + 1;
        self.seq.set(n);
        format!("{prefix}{n:04}")
    }

    pub fn course(&self, name: &str) -> String {
        let id = self.next_id("course-");
        self.conn
            .execute("INSERT INTO courses(id, name) VALUES(?, ?)", (&id, name))
            .expect("insert course");
        id
    }

    pub fn user(&self, first_name: &str) -> String {
        let id = self.next_id("user-");
        self.conn
            .execute(
                "INSERT INTO users(id, first_name, last_name) VALUES(?, ?, 'Tester')",
                (&id, first_name),
            )
            .expect("insert user");
        id
    }

    pub fn enrol(&self, course_id: &str, user_id: &str, role: &str, status: &str) {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO enrolments(course_id, user_id, role, status) VALUES(?, ?, ?, ?)",
                (course_id, user_id, role, status),
            )
            .expect("insert enrolment");
    }

    pub fn student(&self, course_id: &str, first_name: &str) -> String {
        let id = self.user(first_name);
        self.enrol(course_id, &id, "student", "active");
        id
    }

    pub fn teacher(&self, course_id: &str, first_name: &str) -> String {
        let id = self.user(first_name);
        self.enrol(course_id, &id, "editingteacher", "active");
        id
    }

    pub fn suspend(&self, user_id: &str) {
        self.conn
            .execute("UPDATE users SET suspended = 1 WHERE id = ?", [user_id])
            .expect("suspend user");
    }

    pub fn group(&self, course_id: &str, name: &str) -> String {
        let id = self.next_id("group-");
        self.conn
            .execute(
                "INSERT INTO course_groups(id, course_id, name) VALUES(?, ?, ?)",
                (&id, course_id, name),
            )
            .expect("insert group");
        id
    }

    pub fn add_member(&self, group_id: &str, user_id: &str) {
        self.conn
            .execute(
                "INSERT INTO group_members(group_id, user_id) VALUES(?, ?)",
                (group_id, user_id),
            )
            .expect("insert member");
    }

    pub fn due_item(&self, course_id: &str, name: &str, due_at: Option<i64>) -> String {
        let id = self.next_id("item-");
        self.conn
            .execute(
                "INSERT INTO due_items(id, course_id, name, due_at, created_at) VALUES(?, ?, ?, ?, 0)",
                (&id, course_id, name, due_at),
            )
            .expect("insert due item");
        id
    }

    pub fn set_due_at(&self, due_item_id: &str, due_at: Option<i64>) {
        self.conn
            .execute(
                "UPDATE due_items SET due_at = ? WHERE id = ?",
                (due_at, due_item_id),
            )
            .expect("update due item");
    }

    pub fn set_item_visible(&self, due_item_id: &str, visible: bool) {
        self.conn
            .execute(
                "UPDATE due_items SET visible = ? WHERE id = ?",
                (visible as i64, due_item_id),
            )
            .expect("update due item");
    }

    pub fn set_course_visible(&self, course_id: &str, visible: bool) {
        self.conn
            .execute(
                "UPDATE courses SET visible = ? WHERE id = ?",
                (visible as i64, course_id),
            )
            .expect("update course");
    }

    pub fn user_override(&self, due_item_id: &str, user_id: &str, due_at: i64) -> String {
        let id = self.next_id("ovr-");
        self.conn
            .execute(
                "INSERT INTO due_item_overrides(id, due_item_id, user_id, due_at) VALUES(?, ?, ?, ?)",
                (&id, due_item_id, user_id, due_at),
            )
            .expect("insert user override");
        id
    }

    pub fn group_override(
        &self,
        due_item_id: &str,
        group_id: &str,
        due_at: i64,
        sort_order: Option<i64>,
    ) -> String {
        let id = self.next_id("ovr-");
        self.conn
            .execute(
                "INSERT INTO due_item_overrides(id, due_item_id, group_id, due_at, sort_order) VALUES(?, ?, ?, ?, ?)",
                (&id, due_item_id, group_id, due_at, sort_order),
            )
            .expect("insert group override");
        id
    }

    pub fn submit(&self, due_item_id: &str, user_id: &str) {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO submissions(due_item_id, user_id, status, updated_at) VALUES(?, ?, 'submitted', 0)",
                (due_item_id, user_id),
            )
            .expect("insert submission");
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.conn
            .query_row(sql, [], |r| r.get(0))
            .expect("count query")
    }
}
