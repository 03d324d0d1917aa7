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
    let exe = env!("CARGO_BIN_EXE_alunosd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn alunosd");
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
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn grades_feed_the_history_backfill() {
    let workspace = temp_dir("alunosd-backfill");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "fields": {
            "nome": "Ana Silva",
            "serieAno": "8",
            "turma": "A",
            "turno": "Matutino"
        }}),
    );
    let student_id = student
        .get("id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    // The average and status are derived from the four bimester marks.
    let appended = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.append",
        json!({ "studentId": student_id, "entry": {
            "disciplina": "Matemática",
            "serie": "8",
            "bimestre1": 7.0, "bimestre2": 8.0, "bimestre3": 6.0, "bimestre4": 7.0
        }}),
    );
    assert_eq!(appended.get("appended"), Some(&json!(1)));
    assert_eq!(appended.pointer("/entry/mediaFinal"), Some(&json!(7.0)));
    assert_eq!(appended.pointer("/entry/situacao"), Some(&json!("Aprovado")));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.append",
        json!({ "studentId": student_id, "entry": {
            "disciplina": "Português",
            "serie": "8",
            "mediaFinal": 4.5,
            "situacao": "Em Recuperação"
        }}),
    );

    let backfill = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "history.backfill",
        json!({ "anoLetivo": "2025" }),
    );
    assert_eq!(backfill.get("scanned"), Some(&json!(1)));
    assert_eq!(backfill.get("backfilled"), Some(&json!(1)));
    assert_eq!(backfill.get("errored"), Some(&json!(0)));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "history.list",
        json!({ "studentId": student_id }),
    );
    let historico = listed
        .get("historico")
        .and_then(|v| v.as_array())
        .expect("historico array");
    assert_eq!(historico.len(), 1);
    let entry = &historico[0];
    assert_eq!(entry.get("anoLetivo"), Some(&json!("2025")));
    assert_eq!(entry.get("serie"), Some(&json!("8")));
    // (7.0 + 4.5) / 2 rounded to one decimal.
    assert_eq!(entry.get("mediaGeral"), Some(&json!(5.8)));
    assert_eq!(entry.get("situacaoGeral"), Some(&json!("Em Recuperação")));
    assert_eq!(
        entry.get("observacoes"),
        Some(&json!("Migrado automaticamente do boletim"))
    );
    assert_eq!(entry.get("frequencia"), Some(&json!("")));
    assert_eq!(
        entry
            .get("disciplinas")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(2)
    );

    // A second pass finds the history already in place and leaves it alone.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "history.backfill",
        json!({ "anoLetivo": "2025" }),
    );
    assert_eq!(again.get("backfilled"), Some(&json!(0)));
    assert_eq!(again.get("skipped"), Some(&json!(1)));
}

#[test]
fn appending_the_same_entry_twice_is_skipped() {
    let workspace = temp_dir("alunosd-dedup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "fields": { "nome": "Bruno Costa" } }),
    );
    let student_id = student
        .get("id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    let entry = json!({
        "id": "hist-2024",
        "anoLetivo": "2024",
        "serie": "7",
        "situacaoGeral": "Aprovado"
    });
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "history.append",
        json!({ "studentId": student_id, "entry": entry }),
    );
    assert_eq!(first.get("appended"), Some(&json!(1)));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "history.append",
        json!({ "studentId": student_id, "entry": entry }),
    );
    assert_eq!(second.get("appended"), Some(&json!(0)));
    assert_eq!(second.get("skipped"), Some(&json!(1)));

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "history.remove",
        json!({ "studentId": student_id, "entryId": "hist-2024" }),
    );
    assert_eq!(removed.get("removed"), Some(&json!(1)));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "history.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        listed.get("historico").and_then(|v| v.as_array()).map(Vec::len),
        Some(0)
    );
}

#[test]
fn grades_dedup_by_entry_id() {
    let workspace = temp_dir("alunosd-grades-dedup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "fields": { "nome": "Carla Dias" } }),
    );
    let student_id = student
        .get("id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();

    let entry = json!({ "id": "nota-mat-8", "disciplina": "Matemática", "serie": "8" });
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.append",
        json!({ "studentId": student_id, "entry": entry }),
    );
    assert_eq!(first.get("appended"), Some(&json!(1)));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.append",
        json!({ "studentId": student_id, "entry": entry }),
    );
    assert_eq!(second.get("skipped"), Some(&json!(1)));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        listed.get("notas").and_then(|v| v.as_array()).map(Vec::len),
        Some(1)
    );
}
