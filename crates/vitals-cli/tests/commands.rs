use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, f64::consts::PI, fs, path::Path};
use tempfile::tempdir;

fn run_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("vitals");
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

fn write_series(path: &Path, values: impl Iterator<Item = f64>) -> Result<(), Box<dyn Error>> {
    let text: String = values.map(|v| format!("{v}\n")).collect();
    fs::write(path, text)?;
    Ok(())
}

fn simulate(dir: &Path, seconds: &str) -> Result<Value, Box<dyn Error>> {
    run_json(&[
        "simulate",
        "--out",
        dir.to_str().expect("utf8 path"),
        "--duration-s",
        seconds,
        "--seed",
        "7",
    ])
}

fn channel_args(dir: &Path) -> Vec<String> {
    ["ECG", "ABP", "co2", "Hr"]
        .iter()
        .flat_map(|name| {
            [
                "--channel".to_string(),
                format!("{name}={}", dir.join(format!("{name}.csv")).display()),
            ]
        })
        .collect()
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(diff <= tol, "diff {} exceeded tol {} ({} vs {})", diff, tol, a, b);
}

#[test]
fn design_fir_prints_coefficients() -> Result<(), Box<dyn Error>> {
    let out = run_json(&["design-fir", "--cutoff-hz", "20", "--fs", "500", "--length", "100"])?;
    assert_eq!(out["length"], 100);
    assert_eq!(out["group_delay"], 50);
    assert_eq!(out["coefficients"].as_array().map(Vec::len), Some(100));
    assert!(out["dc_gain"].as_f64().unwrap_or(1.0).abs() < 0.2);
    Ok(())
}

#[test]
fn design_fir_rejects_odd_length() {
    cargo_bin_cmd!("vitals")
        .args(["design-fir", "--length", "99"])
        .assert()
        .failure();
}

#[test]
fn filter_keeps_sample_count() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.txt");
    write_series(&input, (0..300).map(|i| (i as f64 / 50.0).sin()))?;
    let mut cmd = cargo_bin_cmd!("vitals");
    cmd.args(["filter", "--input", input.to_str().expect("utf8 path")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let lines: Vec<f64> = String::from_utf8(output)?
        .lines()
        .map(|line| line.parse::<f64>())
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 300);
    Ok(())
}

#[test]
fn find_peaks_uses_annotations() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.txt");
    let annotations = dir.path().join("beats.txt");
    write_series(&input, std::iter::repeat(0.1).take(2000))?;
    fs::write(&annotations, "# beat samples\n100\n600\n1100\n1600\n")?;
    let out = run_json(&[
        "find-peaks",
        "--fs",
        "500",
        "--no-filter",
        "--input",
        input.to_str().expect("utf8 path"),
        "--annotations",
        annotations.to_str().expect("utf8 path"),
    ])?;
    let indices: Vec<u64> = out["peaks"]
        .as_array()
        .expect("peaks array")
        .iter()
        .filter_map(|p| p["index"].as_u64())
        .collect();
    assert_eq!(indices, vec![100, 600, 1100, 1600]);
    assert!(out.get("events").is_none());
    let rates = out["heart_rate"].as_array().expect("heart rate array");
    assert_eq!(rates.len(), 3);
    for hr in rates {
        assert_close(hr["bpm"].as_f64().unwrap_or_default(), 60.0, 1e-9);
    }
    Ok(())
}

#[test]
fn segment_abp_finds_one_cycle_per_second() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("abp.txt");
    write_series(
        &input,
        (0..5000).map(|i| 100.0 + 20.0 * (2.0 * PI * i as f64 / 500.0).sin()),
    )?;
    let out = run_json(&[
        "segment-abp",
        "--fs",
        "500",
        "--input",
        input.to_str().expect("utf8 path"),
    ])?;
    assert_eq!(out["period_samples"], 500);
    let waves = out["waves"].as_array().expect("waves array");
    assert_eq!(waves.len(), 9);
    assert_close(waves[0]["max_value"].as_f64().unwrap_or_default(), 120.0, 1e-3);
    Ok(())
}

#[test]
fn segment_abp_reads_config() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("abp.txt");
    let config = dir.path().join("segmenter.toml");
    write_series(
        &input,
        (0..5000).map(|i| 100.0 + 20.0 * (2.0 * PI * i as f64 / 500.0).sin()),
    )?;
    fs::write(&config, "min_amplitude = 50.0\n")?;
    let out = run_json(&[
        "segment-abp",
        "--input",
        input.to_str().expect("utf8 path"),
        "--config",
        config.to_str().expect("utf8 path"),
    ])?;
    assert_eq!(out["waves"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn simulate_writes_channel_csvs() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let out = simulate(dir.path(), "4")?;
    assert_eq!(out["channels"]["ECG"], 2000);
    assert_eq!(out["channels"]["co2"], 250);
    assert_eq!(out["channels"]["Hr"], 2);
    let ecg = fs::read_to_string(dir.path().join("ECG.csv"))?;
    assert!(ecg.starts_with("time,value\n0,"));
    Ok(())
}

#[test]
fn analyze_simulated_case() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    simulate(dir.path(), "20")?;
    let table_path = dir.path().join("table.csv");

    let mut args = vec!["analyze".to_string()];
    args.extend(channel_args(dir.path()));
    args.extend(["--out".to_string(), table_path.display().to_string()]);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let out = run_json(&arg_refs)?;

    assert_close(out["mean_bpm"].as_f64().unwrap_or_default(), 72.0, 3.0);
    assert!(out["beats"].as_u64().unwrap_or_default() >= 20);
    assert!(out["waves"].as_array().map(Vec::len).unwrap_or_default() >= 20);
    assert_eq!(out["tachycardic"].as_array().map(Vec::len), Some(0));
    assert_eq!(out["rows"], 10_000);

    let table = fs::read_to_string(&table_path)?;
    let header = table.lines().next().unwrap_or_default();
    assert_eq!(header, "time,ABP,ECG,ECG_f,Hr,co2,dbp,hr,map,peak,sbp");
    assert_eq!(table.lines().count(), 10_001);
    Ok(())
}

#[test]
fn analyze_event_window_from_config() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    simulate(dir.path(), "20")?;
    let config = dir.path().join("pipeline.toml");
    fs::write(
        &config,
        "window_half_width_s = 5.0\n\n[events]\n\"operation start\" = 10.0\n",
    )?;

    let mut args = vec!["analyze".to_string()];
    args.extend(channel_args(dir.path()));
    args.extend([
        "--config".to_string(),
        config.display().to_string(),
        "--event".to_string(),
        "operation start".to_string(),
    ]);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let out = run_json(&arg_refs)?;
    assert_close(out["window_s"][0].as_f64().unwrap_or_default(), 5.0, 1e-9);
    assert!(out["window_s"][1].as_f64().unwrap_or_default() < 15.0);
    assert_eq!(out["rows"], 5_000);

    let mut cmd = cargo_bin_cmd!("vitals");
    cmd.args(&arg_refs[..arg_refs.len() - 1]).arg("case end");
    cmd.assert().failure();
    Ok(())
}

#[test]
fn replay_streams_time_value_lines() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("ecg.txt");
    write_series(&input, (0..10).map(f64::from))?;
    let mut cmd = cargo_bin_cmd!("vitals");
    cmd.args([
        "replay",
        "--fs",
        "100",
        "--cutoff-hz",
        "10",
        "--length",
        "4",
        "--input",
        input.to_str().expect("utf8 path"),
    ]);
    let output = String::from_utf8(cmd.assert().success().get_output().stdout.clone())?;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "time,value");
    assert_eq!(lines.len(), 11);
    assert!(lines[1].starts_with("0,0"));
    assert!(lines[2].starts_with("0.01,"));
    Ok(())
}
