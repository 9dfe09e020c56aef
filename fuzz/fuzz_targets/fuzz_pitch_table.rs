#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct RawRow {
    name: String,
    pitch_mm: f64,
}

fuzz_target!(|rows: Vec<RawRow>| {
    let rows: Vec<els_config::PitchRow> = rows
        .into_iter()
        .map(|r| els_config::PitchRow {
            name: r.name,
            pitch_mm: r.pitch_mm,
        })
        .collect();
    // Row validation must reject garbage (NaN, duplicates, empties)
    // without panicking.
    let _ = els_config::PitchTable::from_rows(rows);
});
