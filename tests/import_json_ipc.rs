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
fn imports_spreadsheet_rows_in_batches() {
    let workspace = temp_dir("alunosd-import");
    let export = workspace.join("export.json");
    let rows: Vec<serde_json::Value> = (1..=7)
        .map(|i| {
            json!({
                "Nome do Aluno": format!("Aluno {:02}", i),
                "CPF": format!("{}", i),
                "Série/Ano": "8",
                "Turma": "A"
            })
        })
        .collect();
    std::fs::write(&export, serde_json::to_string(&rows).expect("rows")).expect("write export");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.import",
        json!({ "path": export.to_string_lossy(), "batchSize": 3 }),
    );
    assert_eq!(report.get("total"), Some(&json!(7)));
    assert_eq!(report.get("inserted"), Some(&json!(7)));
    assert_eq!(report.get("batches"), Some(&json!(3)));
    assert_eq!(report.get("batchErrors"), Some(&json!(0)));

    let list = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(list.get("total"), Some(&json!(7)));
    // Canonical shape straight from import: alias mapped, cpf padded.
    assert_eq!(list.pointer("/data/0/nome"), Some(&json!("Aluno 01")));
    assert_eq!(list.pointer("/data/0/cpf"), Some(&json!("00000000001")));
    assert_eq!(list.pointer("/data/0/status"), Some(&json!("Matriculado")));
}

#[test]
fn import_is_additive_not_destructive() {
    let workspace = temp_dir("alunosd-import-add");
    let export = workspace.join("export.json");
    std::fs::write(
        &export,
        json!([{ "Nome do Aluno": "Novo Aluno" }]).to_string(),
    )
    .expect("write export");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "fields": { "nome": "Aluno Existente" } }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({ "path": export.to_string_lossy() }),
    );

    let list = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({}));
    assert_eq!(list.get("total"), Some(&json!(2)));
}

#[test]
fn import_rejects_non_array_files() {
    let workspace = temp_dir("alunosd-import-bad");
    let export = workspace.join("export.json");
    std::fs::write(&export, "{\"not\": \"an array\"}").expect("write export");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "students.import",
        json!({ "path": export.to_string_lossy() }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("import_failed")
    );
}
