use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::json;
use wearcast::TrainingStore;

fn record_command(home: &Path, payload: &serde_json::Value) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_wearcast_bin"));
    command
        .arg("--home")
        .arg(home)
        .arg("record")
        .arg(payload.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
}

#[test]
fn test_concurrent_record_processes_keep_every_append() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let writers = 16;

    let children = (0..writers)
        .map(|i| {
            record_command(
                dir.path(),
                &json!({
                    "training_data": {
                        "features": {"temp": 30 + i, "sky": "sunny"},
                        "labels": {"top": "t-shirt"}
                    }
                }),
            )
            .spawn()
        })
        .collect::<Result<Vec<_>, _>>()?;
    for mut child in children {
        assert!(child.wait()?.success());
    }

    let store = TrainingStore::new(dir.path().join("training_data.json"));
    let mut temps: Vec<f64> = store
        .load()?
        .iter()
        .filter_map(|record| match record.features.get("temp") {
            Some(wearcast::FeatureValue::Number(t)) => Some(*t),
            _ => None,
        })
        .collect();
    temps.sort_by(f64::total_cmp);
    let expected: Vec<f64> = (0..writers).map(|i| (30 + i) as f64).collect();
    assert_eq!(temps, expected);
    Ok(())
}

#[test]
fn test_invalid_record_exits_with_client_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let status = record_command(dir.path(), &json!({"not_training_data": 1})).status()?;
    assert_eq!(status.code(), Some(2));
    assert!(!dir.path().join("training_data.json").exists());
    Ok(())
}
