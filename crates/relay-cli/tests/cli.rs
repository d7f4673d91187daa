use assert_cmd::Command;

#[test]
fn help_lists_options() {
    let output = Command::cargo_bin("relay-chat")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--url"));
    assert!(stdout.contains("--retries"));
}

#[test]
fn unreachable_relay_exits_non_zero() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    Command::cargo_bin("relay-chat")
        .unwrap()
        .args(["--url", &format!("ws://127.0.0.1:{port}"), "--retries", "0"])
        .write_stdin("")
        .assert()
        .failure();
}

#[test]
fn rejects_non_websocket_url() {
    Command::cargo_bin("relay-chat")
        .unwrap()
        .args(["--url", "http://localhost:3001"])
        .assert()
        .failure();
}
