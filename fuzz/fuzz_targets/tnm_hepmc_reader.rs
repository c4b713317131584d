#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Bound the number of events so pathological inputs stay fast.
    let Ok(reader) = tnm_hepmc::HepMcReader::new(data) else {
        return;
    };
    for event in reader.take(64) {
        if event.is_err() {
            break;
        }
    }
});
