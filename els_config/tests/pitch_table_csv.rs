use std::fs::File;
use std::io::Write;

use els_config::{KinematicsCfg, PitchRow, PitchTable, load_pitch_table_csv, ratio_for_pitch};
use rstest::rstest;
use tempfile::tempdir;

#[rstest]
fn table_from_rows_resolves_by_name() {
    let rows = vec![
        PitchRow {
            name: "M10x1.5".into(),
            pitch_mm: 1.5,
        },
        PitchRow {
            name: "16tpi".into(),
            pitch_mm: 1.5875,
        },
    ];
    let table = PitchTable::from_rows(rows).unwrap();
    assert_eq!(table.pitch_mm("M10x1.5"), Some(1.5));
    assert_eq!(table.pitch_mm("16tpi"), Some(1.5875));
    assert_eq!(table.pitch_mm("M8x1.25"), None);
    assert_eq!(table.rows().len(), 2);
}

#[rstest]
fn table_rejects_duplicate_names() {
    let rows = vec![
        PitchRow {
            name: "M10x1.5".into(),
            pitch_mm: 1.5,
        },
        PitchRow {
            name: "M10x1.5".into(),
            pitch_mm: 1.25,
        },
    ];
    let err = PitchTable::from_rows(rows).expect_err("should fail on duplicate name");
    assert!(format!("{err}").to_lowercase().contains("duplicate name"));
}

#[rstest]
fn table_rejects_non_positive_pitch() {
    let rows = vec![PitchRow {
        name: "broken".into(),
        pitch_mm: 0.0,
    }];
    let err = PitchTable::from_rows(rows).expect_err("should fail on zero pitch");
    assert!(format!("{err}").contains("invalid pitch"));
}

#[rstest]
fn table_rejects_empty() {
    let err = PitchTable::from_rows(Vec::new()).expect_err("should fail on empty table");
    assert!(format!("{err}").contains("at least one row"));
}

#[rstest]
fn csv_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pitches.csv");

    let mut f = File::create(&path).unwrap();
    writeln!(f, "name,pitch_mm").unwrap();
    writeln!(f, "M6x1,1.0").unwrap();
    writeln!(f, "M12x1.75,1.75").unwrap();
    writeln!(f, "8tpi,3.175").unwrap();

    let table = load_pitch_table_csv(&path).expect("load pitch table");
    assert_eq!(table.pitch_mm("M6x1"), Some(1.0));
    assert_eq!(table.pitch_mm("8tpi"), Some(3.175));
}

#[rstest]
fn csv_with_wrong_headers_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_headers.csv");

    let mut f = File::create(&path).unwrap();
    writeln!(f, "thread,mm").unwrap();
    writeln!(f, "M6x1,1.0").unwrap();

    let err = load_pitch_table_csv(&path).expect_err("should error on bad headers");
    assert!(format!("{err}").contains("headers 'name,pitch_mm'"));
}

#[rstest]
fn csv_with_non_numeric_pitch_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_numeric.csv");

    let mut f = File::create(&path).unwrap();
    writeln!(f, "name,pitch_mm").unwrap();
    writeln!(f, "M6x1,coarse").unwrap();

    let err = load_pitch_table_csv(&path).expect_err("should error on non-numeric");
    assert!(format!("{err}").contains("invalid CSV row"));
}

#[rstest]
fn ratio_follows_pitch_and_kinematics() {
    let kinematics = KinematicsCfg {
        steps_per_mm: 200.0,
        stepper_ppr: 1_600,
        encoder_ppr: 2_400,
    };
    // 1.5mm pitch: 300 pulses per rev over 2400 counts per rev.
    let ratio = ratio_for_pitch(1.5, &kinematics);
    assert!((ratio - 0.125).abs() < 1e-12);

    // Imperial 8tpi = 3.175mm: 635 pulses over 2400 counts.
    let ratio = ratio_for_pitch(3.175, &kinematics);
    assert!((ratio - 635.0 / 2_400.0).abs() < 1e-12);
}
