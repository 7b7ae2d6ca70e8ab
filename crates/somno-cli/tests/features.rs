use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;

#[derive(Deserialize)]
struct Row {
    sample_index: i64,
    pulse: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Matrix {
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct Labels {
    labels: Vec<u8>,
}

#[derive(Deserialize)]
struct FeaturesOutput {
    features: Matrix,
    labels: Option<Labels>,
}

fn night_a(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("test_data/night_a")
        .join(name)
        .to_string_lossy()
        .to_string()
}

fn table_args() -> Vec<String> {
    vec![
        "features".into(),
        "--beats".into(),
        night_a("beats.csv"),
        "--pulse-peaks".into(),
        night_a("pulse_peaks.csv"),
        "--sleep-stages".into(),
        night_a("sleep_stages.csv"),
        "--duration".into(),
        "40".into(),
    ]
}

#[test]
fn labeled_features_from_peak_tables() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args(table_args())
        .args(["--arousals", &night_a("arousals.tsv")]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: FeaturesOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.features.rows.len(), 42);
    let labels = value.labels.expect("labeled output");
    assert_eq!(labels.labels.len(), 42);
    assert_eq!(labels.labels.iter().filter(|&&l| l == 1).count(), 10);
    let missing = value.features.rows.iter().filter(|r| r.pulse.is_none()).count();
    assert_eq!(missing, 6);
    assert!(value
        .features
        .rows
        .windows(2)
        .all(|w| w[1].sample_index > w[0].sample_index));
    Ok(())
}

#[test]
fn unlabeled_features_without_arousals() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args(table_args());
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: FeaturesOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.features.rows.len(), 42);
    assert!(value.labels.is_none());
    Ok(())
}

#[test]
fn writes_csv_table() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("night_a.csv");
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args(table_args())
        .args(["--arousals", &night_a("arousals.tsv")])
        .args(["--out", path.to_str().expect("utf8 path")]);
    cmd.assert().success();

    let mut reader = csv::Reader::from_path(&path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    assert_eq!(headers, ["index", "rr", "rwa", "ptt", "pwa", "ss", "arousal"]);
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 42);
    let sentinel_rows = rows.iter().filter(|r| &r[3] == "-1").count();
    assert_eq!(sentinel_rows, 6);
    for row in &rows {
        assert_eq!(&row[3] == "-1", &row[4] == "-1");
    }
    Ok(())
}

#[test]
fn missing_peak_source_fails() {
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args([
        "features",
        "--sleep-stages",
        &night_a("sleep_stages.csv"),
    ]);
    cmd.assert().failure();
}

#[test]
fn pulse_duration_conflicts_with_edf() {
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args([
        "features",
        "--edf",
        &night_a("night_a.edf"),
        "--sleep-stages",
        &night_a("sleep_stages.csv"),
        "--pulse-duration",
        "30",
    ]);
    cmd.assert().failure();
}
