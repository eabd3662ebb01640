use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn create_id(result: &serde_json::Value, entity: &str, key: &str) -> i64 {
    result
        .get(entity)
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| panic!("{}.{} in {}", entity, key, result))
}

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    seq: u64,
}

#[allow(dead_code)]
impl Sidecar {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Sidecar {
            _child: child,
            stdin,
            reader,
            seq: 0,
        };
        s.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        s
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        self.seq.to_string()
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn account(&mut self, username: &str) -> i64 {
        let r = self.ok("accounts.create", json!({ "username": username }));
        create_id(&r, "account", "id")
    }

    fn course(&mut self, name: &str) -> i64 {
        let r = self.ok(
            "courses.create",
            json!({ "name": name, "departmentHead": "Dr. Menon" }),
        );
        create_id(&r, "course", "id")
    }

    fn subject(&mut self, course_id: i64, name: &str, semester: i64) -> i64 {
        let r = self.ok(
            "subjects.create",
            json!({ "courseId": course_id, "name": name, "semester": semester }),
        );
        create_id(&r, "subject", "id")
    }

    fn tutor(&mut self, username: &str) -> i64 {
        let account_id = self.account(username);
        let r = self.ok(
            "tutors.create",
            json!({ "accountId": account_id, "name": "Anita Rao", "phone": 9876543210i64 }),
        );
        create_id(&r, "tutor", "id")
    }

    fn student_params(&mut self, reg_no: i64, course_id: i64, tutor_id: i64) -> serde_json::Value {
        let username = format!("student{}-{}", reg_no, self.seq);
        let account_id = self.account(&username);
        json!({
            "regNo": reg_no,
            "accountId": account_id,
            "name": format!("Student {}", reg_no),
            "address": "12 College Road",
            "phone": 9123456780i64,
            "admissionNo": 42,
            "courseId": course_id,
            "tutorId": tutor_id
        })
    }

    fn marks_for(&mut self, reg_no: i64) -> Vec<serde_json::Value> {
        let r = self.ok("marks.list", json!({ "studentRegNo": reg_no }));
        r.get("marks")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    }
}


fn error_message(value: &serde_json::Value) -> &str {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn phone_numbers_must_have_ten_characters_of_text() {
    let mut sc = Sidecar::open("campus-validate-phone");
    let course = sc.course("BSc CS");
    let tutor = sc.tutor("tutor-phone");

    for (i, phone) in [123456789i64, 12345678901, 0, -1234567890].iter().enumerate() {
        let account_id = sc.account(&format!("bad-phone-tutor-{}", i));
        let resp = sc.call(
            "tutors.create",
            json!({ "accountId": account_id, "name": "T", "phone": phone }),
        );
        assert_eq!(error_code(&resp), "validation_failed", "phone {}", phone);
        assert_eq!(error_message(&resp), "Mobile number must be 10 digit number");
        assert_eq!(
            resp.pointer("/error/details/field").and_then(|v| v.as_str()),
            Some("phone")
        );

        let mut params = sc.student_params(700 + i as i64, course, tutor);
        params["phone"] = json!(phone);
        let resp = sc.call("students.create", params);
        assert_eq!(error_code(&resp), "validation_failed", "phone {}", phone);
    }

    // Nine digits plus a minus sign is ten characters of text.
    let account_id = sc.account("signed-phone-tutor");
    sc.ok(
        "tutors.create",
        json!({ "accountId": account_id, "name": "Signed", "phone": -123456789i64 }),
    );
}

#[test]
fn student_phone_is_optional_and_clearable() {
    let mut sc = Sidecar::open("campus-validate-phone-optional");
    let course = sc.course("BA ENG");
    let tutor = sc.tutor("tutor-opt");

    let mut params = sc.student_params(801, course, tutor);
    params
        .as_object_mut()
        .expect("object")
        .remove("phone");
    let created = sc.ok("students.create", params);
    assert!(created.pointer("/student/phone").map(|v| v.is_null()).unwrap_or(false));

    sc.ok("students.update", json!({ "regNo": 801, "phone": 9988776655i64 }));
    let got = sc.ok("students.get", json!({ "regNo": 801 }));
    assert_eq!(
        got.pointer("/student/phone").and_then(|v| v.as_i64()),
        Some(9988776655)
    );

    sc.ok("students.update", json!({ "regNo": 801, "phone": null }));
    let got = sc.ok("students.get", json!({ "regNo": 801 }));
    assert!(got.pointer("/student/phone").map(|v| v.is_null()).unwrap_or(false));

    let resp = sc.call("students.update", json!({ "regNo": 801, "phone": 12345 }));
    assert_eq!(error_code(&resp), "validation_failed");
}

#[test]
fn admission_number_range_is_inclusive() {
    let mut sc = Sidecar::open("campus-validate-admission");
    let course = sc.course("BSc STA");
    let tutor = sc.tutor("tutor-adm");

    for (reg_no, adm) in [(901, 1), (902, 1000)] {
        let mut params = sc.student_params(reg_no, course, tutor);
        params["admissionNo"] = json!(adm);
        sc.ok("students.create", params);
    }

    let mut params = sc.student_params(903, course, tutor);
    params["admissionNo"] = json!(0);
    let resp = sc.call("students.create", params);
    assert_eq!(error_code(&resp), "validation_failed");
    assert_eq!(
        error_message(&resp),
        "Ensure this value is greater than or equal to 1."
    );

    let mut params = sc.student_params(904, course, tutor);
    params["admissionNo"] = json!(1001);
    let resp = sc.call("students.create", params);
    assert_eq!(
        error_message(&resp),
        "Ensure this value is less than or equal to 1000."
    );

    let resp = sc.call("students.update", json!({ "regNo": 901, "admissionNo": 5000 }));
    assert_eq!(error_code(&resp), "validation_failed");
    let got = sc.ok("students.get", json!({ "regNo": 901 }));
    assert_eq!(
        got.pointer("/student/admissionNo").and_then(|v| v.as_i64()),
        Some(1)
    );
}

#[test]
fn text_fields_enforce_length_and_presence() {
    let mut sc = Sidecar::open("campus-validate-text");

    let resp = sc.call(
        "courses.create",
        json!({ "name": "Computer Sc", "departmentHead": "Dr. Menon" }),
    );
    assert_eq!(error_code(&resp), "validation_failed");
    assert_eq!(
        error_message(&resp),
        "Ensure this value has at most 10 characters (it has 11)."
    );

    let resp = sc.call(
        "courses.create",
        json!({ "name": "BSc", "departmentHead": "Professor Lakshmi Narayanan" }),
    );
    assert_eq!(
        resp.pointer("/error/details/field").and_then(|v| v.as_str()),
        Some("departmentHead")
    );

    let resp = sc.call("courses.create", json!({ "name": "   ", "departmentHead": "X" }));
    assert_eq!(error_code(&resp), "validation_failed");

    let resp = sc.call("courses.create", json!({ "departmentHead": "X" }));
    assert_eq!(error_code(&resp), "bad_params");

    let course = sc.course("BSc");
    let resp = sc.call(
        "subjects.create",
        json!({ "courseId": course, "name": "Advanced Thermodynamics" }),
    );
    assert_eq!(error_code(&resp), "validation_failed");

    let tutor = sc.tutor("tutor-text");
    let mut params = sc.student_params(1001, course, tutor);
    params["address"] = json!("x".repeat(1001));
    let resp = sc.call("students.create", params);
    assert_eq!(
        resp.pointer("/error/details/field").and_then(|v| v.as_str()),
        Some("address")
    );
}

#[test]
fn semester_is_a_closed_choice_with_unset_default() {
    let mut sc = Sidecar::open("campus-validate-semester");
    let course = sc.course("BSc GEO");

    let created = sc.ok(
        "subjects.create",
        json!({ "courseId": course, "name": "Cartography" }),
    );
    assert_eq!(
        created.pointer("/subject/semester").and_then(|v| v.as_i64()),
        Some(0)
    );
    assert_eq!(
        created.pointer("/subject/semesterLabel").and_then(|v| v.as_str()),
        Some("Unset")
    );
    let subject_id = create_id(&created, "subject", "id");

    for bad in [0, 7, -1] {
        let resp = sc.call(
            "subjects.create",
            json!({ "courseId": course, "name": "Geology", "semester": bad }),
        );
        assert_eq!(error_code(&resp), "validation_failed", "semester {}", bad);
    }
    let resp = sc.call(
        "subjects.update",
        json!({ "subjectId": subject_id, "semester": 9 }),
    );
    assert_eq!(
        error_message(&resp),
        "Select a valid choice. 9 is not one of the available choices."
    );

    let updated = sc.ok(
        "subjects.update",
        json!({ "subjectId": subject_id, "semester": 6 }),
    );
    assert_eq!(
        updated.pointer("/subject/semesterLabel").and_then(|v| v.as_str()),
        Some("Semester 6")
    );
}

#[test]
fn manual_marks_are_validated_and_may_repeat_a_pair() {
    let mut sc = Sidecar::open("campus-validate-marks");
    let course = sc.course("BSc AI");
    let subject = sc.subject(course, "Machine Learning", 5);
    let tutor = sc.tutor("tutor-marks");
    let params = sc.student_params(1101, course, tutor);
    sc.ok("students.create", params);

    let resp = sc.call(
        "marks.create",
        json!({ "studentRegNo": 1101, "subjectId": subject, "firstInternal": 51 }),
    );
    assert_eq!(error_code(&resp), "validation_failed");

    let created = sc.ok(
        "marks.create",
        json!({ "studentRegNo": 1101, "subjectId": subject, "firstInternal": 45, "attendance": 50 }),
    );
    assert_eq!(
        created.pointer("/mark/total").and_then(|v| v.as_i64()),
        Some(95)
    );
    assert_eq!(sc.marks_for(1101).len(), 2);

    let resp = sc.call(
        "marks.create",
        json!({ "studentRegNo": 9999, "subjectId": subject }),
    );
    assert_eq!(error_code(&resp), "not_found");
}
