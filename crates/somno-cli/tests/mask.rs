use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize)]
struct MaskOutput {
    fs: f64,
    classes: Vec<i8>,
}

#[test]
fn sleep_stage_mask_at_one_hertz() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stages.csv");
    std::fs::write(&path, "start,duration,stage\n0,10,0\n10,20,2\n")?;
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args(["mask", "--annotations", path.to_str().expect("utf8 path")]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let mask: MaskOutput = serde_json::from_slice(&out)?;
    assert_eq!(mask.fs, 1.0);
    assert_eq!(mask.classes.len(), 30);
    assert!(mask.classes[..10].iter().all(|&c| c == -1));
    assert!(mask.classes[10..].iter().all(|&c| c == 0));
    Ok(())
}

#[test]
fn overlapping_arousals() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("arousals.tsv");
    std::fs::write(&path, "onset\tduration\n5\t10\n8\t4\n")?;
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args([
        "mask",
        "--annotations",
        path.to_str().expect("utf8 path"),
        "--duration",
        "20",
        "--rule",
        "arousal",
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let mask: MaskOutput = serde_json::from_slice(&out)?;
    assert_eq!(mask.classes.len(), 20);
    for (i, &c) in mask.classes.iter().enumerate() {
        assert_eq!(c, i8::from((5..15).contains(&i)), "sample {i}");
    }
    Ok(())
}
