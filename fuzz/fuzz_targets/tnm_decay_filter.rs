#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(filter) = tnm_hepmc::DecayFilter::parse(text) {
        let _ = filter.to_string().parse::<tnm_hepmc::DecayFilter>();
    }
});
