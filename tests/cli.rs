use serde_json::Value;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::Duration;

const HYPERMC: &str = env!("CARGO_BIN_EXE_hypermc");

const PARAMS: [&str; 8] = ["-d", "3", "-n", "30001", "-w", "3", "--seed", "7"];

fn hypermc(args: &[&str]) -> Output {
    Command::new(HYPERMC).args(args).output().unwrap()
}

fn spawn(args: &[&str]) -> Child {
    Command::new(HYPERMC)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap()
}

fn report(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "hypermc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn vacant_address() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
}

#[test]
fn processes_and_threads_agree() {
    let threads = hypermc(&[&["run", "--json", "--backend", "threads"][..], &PARAMS].concat());
    let processes =
        hypermc(&[&["run", "--json", "--backend", "processes"][..], &PARAMS].concat());

    let threads = report(&threads);
    let processes = report(&processes);

    assert_eq!(threads["workers"], 3);
    assert_eq!(processes["workers"], 3);
    assert_eq!(threads["result"], processes["result"]);
}

#[test]
fn scaling_output() {
    let output = hypermc(&["run", "--scaling", "-n", "1000", "-w", "2"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let fields = stdout.split_whitespace().collect::<Vec<_>>();

    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0], "2");
    assert!(fields[1].parse::<f64>().unwrap() >= 0.0);

    // one or the other
    assert!(!hypermc(&["run", "--scaling", "--json"]).status.success());
}

#[test]
fn worker_started_before_coordinator() {
    let address = vacant_address().to_string();
    let coordinator_flag = format!("--coordinator={}", address);
    let bind_flag = format!("--bind={}", address);

    let worker = spawn(&[
        "worker",
        "--rank=1",
        "--size=2",
        coordinator_flag.as_str(),
        "-n",
        "5000",
    ]);

    thread::sleep(Duration::from_millis(500));

    let coordinator = hypermc(&[
        "coordinate",
        "--size=2",
        bind_flag.as_str(),
        "-n",
        "5000",
        "--json",
    ]);
    let threads = hypermc(&["run", "--json", "-w", "2", "-n", "5000"]);

    assert_eq!(report(&coordinator)["result"], report(&threads)["result"]);
    assert!(worker.wait_with_output().unwrap().status.success());
}

#[test]
fn failing_rank_fails_the_coordinator() {
    let address = vacant_address().to_string();
    let coordinator_flag = format!("--coordinator={}", address);
    let bind_flag = format!("--bind={}", address);

    let coordinator = spawn(&["coordinate", "--size=3", bind_flag.as_str(), "--timeout=30"]);
    let healthy = spawn(&[
        "worker",
        "--rank=1",
        "--size=3",
        coordinator_flag.as_str(),
        "--timeout=5",
    ]);

    // rank 3 does not exist among 3 processes, so this worker aborts
    let failing = spawn(&[
        "worker",
        "--rank=3",
        "--size=3",
        coordinator_flag.as_str(),
        "--timeout=30",
    ]);

    let coordinator = coordinator.wait_with_output().unwrap();
    let failing = failing.wait_with_output().unwrap();
    let healthy = healthy.wait_with_output().unwrap();

    assert!(!failing.status.success());
    assert!(!coordinator.status.success());
    assert!(String::from_utf8_lossy(&coordinator.stderr).contains("worker 3 failed"));

    // it joined, but never received a total
    assert!(!healthy.status.success());
}

#[test]
fn missing_worker_times_out() {
    let output = hypermc(&["coordinate", "--size=2", "--bind=127.0.0.1:0", "--timeout=1"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("worker 1 failed"));
}
