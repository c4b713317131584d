use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use tnm_core::{CutOp, EventBuffer, EventSource, FieldSpec, ObjectSelection, Schema, ValueType};
use tnm_io::{InputStream, OutputFile, read_counts};

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("tnm_io_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn schema() -> Schema {
    Schema::new(vec![
        FieldSpec::scalar("Event_number", ValueType::I32),
        FieldSpec::scalar("Event_numberP", ValueType::I32),
        FieldSpec::counted("Particle_pid", ValueType::I32, "Event_numberP"),
        FieldSpec::counted("Particle_pt", ValueType::F64, "Event_numberP"),
        FieldSpec::array("Jet_pt", ValueType::F32),
    ])
    .unwrap()
}

/// Write `n` events; event `k` has `k % 4` particles with pt `10 * (i + 1)`.
fn write_events(path: &PathBuf, first: i32, n: i32, save_count: usize) -> usize {
    let mut ev = EventBuffer::new(schema());
    let mut out = OutputFile::skim(path, &ev, "Events", save_count).unwrap();
    for k in first..first + n {
        let np = k % 4;
        ev.set_scalar("Event_number", k).unwrap();
        ev.set_scalar("Event_numberP", np).unwrap();
        ev.set_array("Particle_pid", (0..np).map(|i| if i % 2 == 0 { 11 } else { -13 }).collect())
            .unwrap();
        ev.set_array("Particle_pt", (0..np).map(|i| 10.0 * (i + 1) as f64).collect()).unwrap();
        ev.set_array("Jet_pt", vec![k as f32]).unwrap();
        out.count("all", 1.0);
        out.write(&mut ev, 0.5).unwrap();
    }
    out.close().unwrap().row_groups
}

#[test]
fn skim_writes_weight_column_and_row_groups() {
    let dir = tmp_dir("rowgroups");
    let path = dir.join("skim.parquet");
    let row_groups = write_events(&path, 0, 5, 2);
    assert_eq!(row_groups, 3);

    let mut input = InputStream::open(&[&path], "Events").unwrap();
    assert_eq!(input.len(), 5);
    assert_eq!(input.tree(), "Events");
    assert!(input.schema().field("eventWeight").is_some());
    assert_eq!(
        input.schema().field("Particle_pt").unwrap().counter(),
        Some("Event_numberP")
    );

    let mut ev = input.buffer();
    for entry in [3usize, 0, 4] {
        ev.read(&mut input, entry).unwrap();
        assert_eq!(ev.scalar::<i32>("Event_number").unwrap(), entry as i32);
        assert_eq!(ev.get::<f64>("Particle_pt").unwrap().len(), entry % 4);
        assert_relative_eq!(ev.scalar::<f64>("eventWeight").unwrap(), 0.5);
    }
    ev.read(&mut input, 3).unwrap();
    assert_eq!(ev.get::<i32>("Particle_pid").unwrap(), &[11, -13, 11]);
    assert!(ev.read(&mut input, 5).is_err());

    let counts = read_counts(&path).unwrap();
    assert_eq!(counts.get("all").unwrap().entries, 5);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn skim_saves_only_selected_objects() {
    let dir = tmp_dir("select");
    let path = dir.join("skim.parquet");

    let mut ev = EventBuffer::new(schema());
    let mut out = OutputFile::skim(&path, &ev, "Events", 100).unwrap();
    ev.set_scalar("Event_numberP", 3i32).unwrap();
    ev.set_array("Particle_pid", vec![11, 22, -11]).unwrap();
    ev.set_array("Particle_pt", vec![40.0, 5.0, 25.0]).unwrap();
    ev.set_array("Jet_pt", vec![30.0f32, 20.0]).unwrap();
    ev.select("Particle").unwrap();
    ev.select_index("Particle", 0).unwrap();
    ev.select_index("Particle", 2).unwrap();
    out.write(&mut ev, 2.0).unwrap();
    let summary = out.close().unwrap();
    assert_eq!(summary.entries, 1);
    assert!(summary.ls().contains("1 entries"));

    let mut input = InputStream::open(&[&path], "Events").unwrap();
    let mut back = input.buffer();
    back.read(&mut input, 0).unwrap();
    assert_eq!(back.get::<i32>("Particle_pid").unwrap(), &[11, -11]);
    assert_eq!(back.scalar::<i32>("Event_numberP").unwrap(), 2);
    assert_eq!(back.get::<f32>("Jet_pt").unwrap(), &[30.0, 20.0]);
    assert_relative_eq!(back.scalar::<f64>("eventWeight").unwrap(), 2.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn chain_spans_files_and_projection_limits_reads() {
    let dir = tmp_dir("chain");
    let a = dir.join("a.parquet");
    let b = dir.join("b.parquet");
    write_events(&a, 0, 3, 50);
    write_events(&b, 3, 4, 50);

    let mut input = InputStream::open(&[&a, &b], "Events").unwrap();
    assert_eq!(input.len(), 7);
    assert_eq!(input.files().len(), 2);
    assert!(input.ls().contains("7 entries in 2 file(s)"));

    input.select(&["Particle_pt"]).unwrap();
    assert_eq!(input.schema().names(), vec!["Event_numberP", "Particle_pt"]);

    let mut ev = input.buffer();
    ev.read(&mut input, 5).unwrap();
    assert_eq!(ev.get::<f64>("Particle_pt").unwrap(), &[10.0]);
    // not selected: left at its initial value
    assert_eq!(ev.scalar::<i32>("Event_number").unwrap(), 0);

    input.select_all();
    ev.read(&mut input, 5).unwrap();
    assert_eq!(ev.scalar::<i32>("Event_number").unwrap(), 5);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn projected_read_sizes_objects_from_decoded_fields() {
    let dir = tmp_dir("projected");
    let path = dir.join("a.parquet");
    write_events(&path, 0, 4, 10);

    let mut input = InputStream::open(&[&path], "Events").unwrap();
    let mut ev = input.buffer();
    ev.read(&mut input, 1).unwrap();
    assert_eq!(ev.get::<i32>("Particle_pid").unwrap(), &[11]);

    input.select(&["Particle_pt"]).unwrap();
    ev.read(&mut input, 3).unwrap();
    assert_eq!(ev.get::<f64>("Particle_pt").unwrap(), &[10.0, 20.0, 30.0]);
    // not decoded: emptied instead of keeping entry 1
    assert!(ev.get::<i32>("Particle_pid").unwrap().is_empty());
    assert!(!ev.is_loaded("Particle_pid"));
    assert!(ev.get::<f32>("Jet_pt").unwrap().is_empty());
    assert_eq!(ev.object_size("Particle"), 3);

    let hard = ObjectSelection::new("Particle").cut("Particle_pt", CutOp::Gt, 15.0);
    assert_eq!(hard.apply(&mut ev).unwrap(), 2);
    ev.save_objects().unwrap();
    assert_eq!(ev.get::<f64>("Particle_pt").unwrap(), &[20.0, 30.0]);
    assert_eq!(ev.scalar::<i32>("Event_numberP").unwrap(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn open_rejects_bad_chains() {
    let dir = tmp_dir("bad");
    let a = dir.join("a.parquet");
    write_events(&a, 0, 1, 10);

    let empty: [PathBuf; 0] = [];
    assert!(InputStream::open(&empty, "Events").is_err());
    let err = InputStream::open(&[&a], "Other").unwrap_err();
    assert!(err.to_string().contains("holds tree 'Events'"));

    let counts_only = dir.join("counts.parquet");
    let mut out = OutputFile::create(&counts_only).unwrap();
    out.count("all", 1.0);
    out.close().unwrap();
    assert!(InputStream::open(&[&a, &counts_only], "Events").is_err());

    let other = dir.join("other.parquet");
    let ev = EventBuffer::new(Schema::new(vec![FieldSpec::scalar("x", ValueType::F64)]).unwrap());
    OutputFile::skim(&other, &ev, "Events", 10).unwrap().close().unwrap();
    let err = InputStream::open(&[&a, &other], "Events").unwrap_err();
    assert!(err.to_string().contains("does not match"));
    assert_eq!(read_counts(&counts_only).unwrap().len(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn outputs_create_their_file_when_opened() {
    let dir = tmp_dir("create");
    let unwritable = dir.join("missing").join("counts.parquet");
    let err = OutputFile::create(&unwritable).unwrap_err();
    assert!(err.to_string().contains("failed to create"));
    let ev = EventBuffer::new(schema());
    assert!(OutputFile::skim(&unwritable, &ev, "Events", 10).is_err());

    let path = dir.join("counts.parquet");
    let mut out = OutputFile::create(&path).unwrap();
    assert!(path.exists());
    out.count("all", 2.0);
    out.close().unwrap();
    assert_eq!(read_counts(&path).unwrap().get("all").unwrap().sumw, 2.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn zero_save_count_is_rejected() {
    let dir = tmp_dir("zero");
    let ev = EventBuffer::new(schema());
    assert!(OutputFile::skim(dir.join("x.parquet"), &ev, "Events", 0).is_err());
    let _ = std::fs::remove_dir_all(&dir);
}
