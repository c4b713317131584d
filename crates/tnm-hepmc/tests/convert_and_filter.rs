use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use tnm_core::EventSource;
use tnm_hepmc::{ConvertOptions, DecayFilter, HepMcReader, convert_file, filter_file};
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

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("tnm_hepmc_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

#[test]
fn convert_writes_weighted_events() {
    let dir = tmp_dir("convert");
    let input = dir.join("higgs.hepmc");
    std::fs::write(&input, HEPMC).unwrap();
    let output = dir.join("higgs.parquet");

    let opts = ConvertOptions { save_count: 2, ..ConvertOptions::default() };
    let summary = convert_file(&input, &output, &opts).unwrap();
    assert_eq!(summary.events, 3);
    assert_eq!(summary.version, "2.06.09");
    assert_eq!(summary.truncated, 0);

    let mut stream = InputStream::open(&[&output], "Events").unwrap();
    assert_eq!(stream.len(), 3);
    let mut ev = stream.buffer();
    ev.read(&mut stream, 0).unwrap();
    assert_eq!(ev.scalar::<i32>("Event_number").unwrap(), 10);
    assert_relative_eq!(ev.scalar::<f64>("eventWeight").unwrap(), 2.0);
    assert_eq!(ev.get::<f64>("Particle_z").unwrap(), &[0.0, 0.0, 0.0, 1.5, 1.5]);

    ev.read(&mut stream, 2).unwrap();
    assert_relative_eq!(ev.scalar::<f64>("eventWeight").unwrap(), 1.0);
    assert_eq!(ev.get::<i32>("Particle_pid").unwrap(), &[2212, 2212, 13, -13]);

    let counts = read_counts(&output).unwrap();
    assert_relative_eq!(counts.get("events").unwrap().sumw, 6.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn convert_honours_max_events() {
    let dir = tmp_dir("max_events");
    let input = dir.join("higgs.hepmc");
    std::fs::write(&input, HEPMC).unwrap();
    let output = dir.join("two.parquet");

    let opts = ConvertOptions { max_events: Some(2), ..ConvertOptions::default() };
    assert_eq!(convert_file(&input, &output, &opts).unwrap().events, 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn filter_copies_kept_events_verbatim() {
    let dir = tmp_dir("filter");
    let input = dir.join("higgs.hepmc");
    std::fs::write(&input, HEPMC).unwrap();
    let output = dir.join("filtered_higgs.hepmc");

    let filter = DecayFilter::parse("35 15 -15").unwrap();
    let summary = filter_file(&input, &output, &filter).unwrap();
    assert_eq!(summary.events_in, 3);
    assert_eq!(summary.events_out, 1);

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("HepMC::Version 2.06.09\n"));
    assert!(text.trim_end().ends_with("HepMC::IO_GenEvent-END_EVENT_LISTING"));
    assert!(text.contains("E 10 "));
    assert!(!text.contains("E 11 "));

    let events: Vec<_> = HepMcReader::open(&output).unwrap().map(|e| e.unwrap()).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].particles.len(), 5);

    let either = DecayFilter::parse("35 15 -15, 35 6 -6").unwrap();
    let summary = filter_file(&input, &output, &either).unwrap();
    assert_eq!(summary.events_out, 2);
    assert_relative_eq!(summary.fraction(), 2.0 / 3.0);

    let _ = std::fs::remove_dir_all(&dir);
}
