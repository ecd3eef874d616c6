mod csv_import;
mod db;
mod export;
mod extract;
mod ingest;
mod ipc;
mod merge;
mod sheet;
mod vocab;

use std::io::{self, BufRead, Write};

fn respond(stdout: &mut io::Stdout, resp: &serde_json::Value) {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn main() {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                let resp = ipc::handle_request(&mut state, req);
                respond(&mut stdout, &resp);
            }
            Err(e) => {
                // No id to correlate with; reply with a bare envelope.
                respond(
                    &mut stdout,
                    &serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    }),
                );
            }
        }
    }
}
