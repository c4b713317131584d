use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use tnm_core::EventSource;
use tnm_io::{InputStream, read_counts};

const HEPMC: &str = "\
HepMC::Version 2.06.09
HepMC::IO_GenEvent-START_EVENT_LISTING
E 10 -1 -1.0 7.8e-03 1.18e-01 0 -2 2 1 2 0 1 2.0
V -1 0 0 0 0 0 2 1 0
P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
P 3 35 1 2 3 300 250 2 0 0 -2 0
V -2 0 0 0 1.5 0 0 2 0
P 4 15 50 0 10 140 1.777 1 0 0 0 0
P 5 -15 -49 2 -7 160 1.777 1 0 0 0 0
E 11 -1 -1.0 7.8e-03 1.18e-01 0 -2 2 1 2 0 1 3.0
V -1 0 0 0 0 0 2 1 0
P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
P 3 35 1 2 3 300 250 2 0 0 -2 0
V -2 0 0 0 0 0 0 2 0
P 4 6 50 0 10 140 173 1 0 0 0 0
P 5 -6 -49 2 -7 160 173 1 0 0 0 0
E 12 -1 -1.0 7.8e-03 1.18e-01 0 -1 1 1 2 0 0
V -1 0 0 0 0 0 2 2 0
P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
P 3 13 20 0 0 30 0.105 1 0 0 0 0
P 4 -13 -20 0 0 30 0.105 1 0 0 0 0
HepMC::IO_GenEvent-END_EVENT_LISTING
";

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tnm"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("tnm_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn run_ok(args: &[&str]) -> String {
    let out = run(args);
    assert!(
        out.status.success(),
        "tnm {:?} failed:\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

/// Convert the sample HepMC text and return the ntuple path.
fn ntuple(dir: &Path) -> PathBuf {
    let input = dir.join("sample.hepmc");
    std::fs::write(&input, HEPMC).unwrap();
    let output = dir.join("sample.parquet");
    let stdout = run_ok(&["hepmc2ntuple", input.to_str().unwrap(), output.to_str().unwrap()]);
    assert!(stdout.contains("events:        3"), "stdout:\n{stdout}");
    output
}

#[test]
fn hepmc2ntuple_then_ls() {
    let dir = tmp_dir("ls");
    let ntuple = ntuple(&dir);

    let listing = run_ok(&["ls", ntuple.to_str().unwrap()]);
    assert!(listing.contains("tree 'Events': 3 entries"), "listing:\n{listing}");
    assert!(listing.contains("Particle_px[Event_numberP]/D"), "listing:\n{listing}");
    assert!(listing.contains("events"), "listing:\n{listing}");

    let json = run_ok(&["ls", "--json", ntuple.to_str().unwrap()]);
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v[0]["label"], "events");
    assert_eq!(v[0]["sumw"], 6.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn analyze_skims_dimuon_events() {
    let dir = tmp_dir("analyze");
    let ntuple = ntuple(&dir);

    let filelist = dir.join("filelist.txt");
    std::fs::write(&filelist, format!("# converted sample\n{}\n", ntuple.display())).unwrap();

    let config = dir.join("skim.yaml");
    std::fs::write(
        &config,
        r#"skim: true
save_count: 2
weight_column: eventWeight
objects:
  - name: Particle
    min_count: 2
    cuts:
      - { column: Particle_pid, op: abs_eq, value: 13 }
"#,
    )
    .unwrap();

    let output = dir.join("skim");
    let stdout = run_ok(&[
        "analyze",
        filelist.to_str().unwrap(),
        output.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    let output = dir.join("skim.parquet");
    assert!(stdout.contains("tree 'Events': 1 entries"), "stdout:\n{stdout}");

    let counts = read_counts(&output).unwrap();
    assert_eq!(counts.get("all").unwrap().entries, 3);
    assert_eq!(counts.get("all").unwrap().sumw, 6.0);
    assert_eq!(counts.get("Particle >= 2").unwrap().entries, 1);

    let mut stream = InputStream::open(&[&output], "Events").unwrap();
    assert_eq!(stream.len(), 1);
    let mut ev = stream.buffer();
    ev.read(&mut stream, 0).unwrap();
    assert_eq!(ev.scalar::<i32>("Event_number").unwrap(), 12);
    assert_eq!(ev.scalar::<i32>("Event_numberP").unwrap(), 2);
    assert_eq!(ev.get::<i32>("Particle_pid").unwrap(), &[13, -13]);
    assert_eq!(ev.scalar::<f64>("eventWeight").unwrap(), 1.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn analyze_counts_only() {
    let dir = tmp_dir("counts_only");
    let ntuple = ntuple(&dir);
    let filelist = dir.join("files.txt");
    std::fs::write(&filelist, format!("{}\n", ntuple.display())).unwrap();
    let output = dir.join("histos.parquet");

    run_ok(&[
        "analyze",
        filelist.to_str().unwrap(),
        output.to_str().unwrap(),
        "--max-events",
        "2",
    ]);
    let counts = read_counts(&output).unwrap();
    assert_eq!(counts.get("all").unwrap().entries, 2);
    assert_eq!(counts.get("all").unwrap().sumw, 2.0);

    let listing = run_ok(&["ls", output.to_str().unwrap()]);
    assert!(listing.contains("counts:"), "listing:\n{listing}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn analyze_rejects_missing_file_list_and_bad_cut() {
    let dir = tmp_dir("errors");
    let missing = dir.join("nope.txt");
    let out = run(&["analyze", missing.to_str().unwrap(), dir.join("o").to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unable to open file list"));

    let ntuple = ntuple(&dir);
    let filelist = dir.join("files.txt");
    std::fs::write(&filelist, format!("{}\n", ntuple.display())).unwrap();
    let config = dir.join("bad.json");
    std::fs::write(
        &config,
        r#"{"objects": [{"name": "Jet", "cuts": [{"column": "Particle_pt", "op": "gt", "value": 1}]}]}"#,
    )
    .unwrap();
    let out = run(&[
        "analyze",
        filelist.to_str().unwrap(),
        dir.join("o").to_str().unwrap(),
        "-c",
        config.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("is not an array of object 'Jet'"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn hepmc_filter_keeps_requested_decays() {
    let dir = tmp_dir("filter");
    let input = dir.join("sample.hepmc");
    std::fs::write(&input, HEPMC).unwrap();
    let output = dir.join("tops.hepmc");

    let stdout = run_ok(&[
        "hepmc-filter",
        input.to_str().unwrap(),
        "35",
        "6",
        "-6",
        "-o",
        output.to_str().unwrap(),
    ]);
    let kept = stdout.lines().find(|l| l.contains("events(out):")).unwrap();
    assert_eq!(kept.split_whitespace().last(), Some("1"), "stdout:\n{stdout}");
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("E 11 "));
    assert!(!text.contains("E 10 "));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_crate_version() {
    let stdout = run_ok(&["version"]);
    assert!(stdout.starts_with("tnm "));
}
