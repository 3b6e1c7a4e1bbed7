use std::fs;
use std::path::Path;

use shippos::dataset::VariableRole;
use shippos::positions::load_position_dirs;
use shippos::{
    merge_ship_positions, summarize_position_dir, write_table_file, Dataset, MergeParams,
    PositionSchema, ShipPosError, Variable,
};

const S: i64 = 1_000_000_000;
const T0: i64 = 1_732_968_000 * S; // 2024-11-30 12:00:00 UTC

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn sensor_dataset(times: Vec<i64>, t_air: Vec<f64>) -> Dataset {
    let n = times.len();
    let mut ds = Dataset::from_timestamps(times).unwrap();
    for (name, value) in [("lat", -54.8), ("lon", -68.3)] {
        ds.push_variable(Variable::numeric(name, vec![value; n]).with_role(VariableRole::Coordinate))
            .unwrap();
    }
    ds.push_variable(
        Variable::text("section", vec!["drake".to_string(); n]).with_role(VariableRole::Coordinate),
    )
    .unwrap();
    ds.push_variable(Variable::numeric("t_air", t_air)).unwrap();
    ds
}

#[test]
fn merges_both_log_schemas_into_dataset_and_table() {
    let scratch = tempfile::tempdir().unwrap();
    let old_dir = scratch.path().join("nansen_gps_old_format");
    let new_dir = scratch.path().join("nansen_gps_new_format");
    fs::create_dir_all(&old_dir).unwrap();
    fs::create_dir_all(&new_dir).unwrap();

    // Written out of order on purpose; files are read by name.
    write(
        &old_dir,
        "20241130_b.nrt",
        "datetime\tlat\tlon\n2024-11-30 12:02:00\t-60.2\t-50.2\n",
    );
    write(
        &old_dir,
        "20241130_a.nrt",
        "datetime\tlat\tlon\n\
         2024-11-30 12:00:00\t-60.0\t-50.0\n\
         2024-11-30 12:01:10\t-60.1\t-50.1\n",
    );
    write(&old_dir, "notes.txt", "not a log\n");
    write(
        &new_dir,
        "20241130_c.nrt",
        "datetime\tvessel:soop_fridtjof_nansen:latitude [deg]\tvessel:soop_fridtjof_nansen:longitude [deg]\n\
         2024-11-30 12:10:00\t-61.0\t-51.0\n",
    );

    let track = load_position_dirs(&[&old_dir, &new_dir]).unwrap();
    assert_eq!(track.len(), 4);
    assert!(track.time.windows(2).all(|w| w[0] <= w[1]));

    let times: Vec<i64> = (0..=10).map(|m| T0 + m * 60 * S).collect();
    let mut t_air = vec![1.5; times.len()];
    t_air[1] = f64::NAN;
    let mut ds = sensor_dataset(times, t_air);

    let report = merge_ship_positions(&mut ds, &track, &MergeParams::default()).unwrap();
    let lat = ds.numeric("lat_ship").unwrap().to_vec();
    assert_eq!(lat[0], -60.0);
    assert!(lat[1].is_nan(), "t_air missing at 12:01");
    assert_eq!(lat[2], -60.2);
    assert_eq!(lat[3], -60.2);
    for minute in 4..=8 {
        assert!(lat[minute].is_nan(), "dropout at minute {}", minute);
    }
    assert_eq!(lat[9], -61.0);
    assert_eq!(lat[10], -61.0);
    assert_eq!(report.kept, 5);
    assert_eq!(report.validity_masked, 1);
    assert_eq!(report.gap_masked, 5);

    let csv_path = scratch.path().join("merged.csv");
    write_table_file(&ds, &csv_path).unwrap();
    let table = fs::read_to_string(&csv_path).unwrap();
    let mut lines = table.lines();
    assert_eq!(
        lines.next().unwrap(),
        "time;lat;lon;section;lat_ship;lon_ship;t_air"
    );
    assert_eq!(
        lines.next().unwrap(),
        "2024-11-30 12:00:00;-54.8;-68.3;drake;-60.0;-50.0;1.5"
    );
    assert_eq!(
        lines.next().unwrap(),
        "2024-11-30 12:01:00;-54.8;-68.3;drake;;;"
    );
}

#[test]
fn summary_reports_schema_and_gaps() {
    let scratch = tempfile::tempdir().unwrap();
    write(
        scratch.path(),
        "a.nrt",
        "datetime\tlat\tlon\n\
         2024-11-30 12:00:00\t-60.0\t-50.0\n\
         2024-11-30 12:05:00\t\t\n\
         2024-11-30 12:06:00\t-60.1\t-50.1\n",
    );
    let summary = summarize_position_dir(scratch.path()).unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].schema, PositionSchema::Legacy);
    assert_eq!(summary[0].records, 3);
    assert_eq!(summary[0].missing_positions, 1);
    assert_eq!(summary[0].largest_gap_s, Some(300.0));
}

#[test]
fn empty_log_directory_is_fatal() {
    let scratch = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_position_dirs(&[scratch.path()]),
        Err(ShipPosError::NoInputFiles { .. })
    ));
}
