use std::fs;
use std::path::Path;
use std::process::Command;

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn write_gray(path: &Path, value: u8) {
    RgbaImage::from_pixel(4, 4, Rgba([value, value, value, 255]))
        .save(path)
        .unwrap();
}

fn glfilter() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_glfilter"));
    command.env("RUST_LOG", "warn");
    command
}

#[test]
fn applies_effects_from_flags() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("gray.png");
    let output = root.path().join("bright.png");
    write_gray(&input, 128);

    let status = glfilter()
        .arg(&input)
        .arg(&output)
        .args(["--backend", "software", "--effect", "brightness:0.2"])
        .status()
        .expect("failed to run glfilter");
    assert!(status.success());

    let result = image::open(&output).unwrap().to_rgba8();
    assert_eq!(result.dimensions(), (4, 4));
    for pixel in result.pixels() {
        assert!(pixel.0[0].abs_diff(154) <= 1, "{pixel:?}");
        assert_eq!(pixel.0[3], 255);
    }
}

#[test]
fn preset_file_and_stats() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("gray.png");
    let output = root.path().join("out.png");
    let preset = root.path().join("presets.toml");
    write_gray(&input, 100);
    fs::write(
        &preset,
        r#"
version = 1

[defaults]
preset = "soft"

[[presets.soft.effects]]
name = "blur"
params = [2]

[[presets.soft.effects]]
name = "negative"

[[presets.sharp.effects]]
name = "sharpen"
"#,
    )
    .unwrap();

    let result = glfilter()
        .arg(&input)
        .arg(&output)
        .args(["--backend", "software", "--repeat", "2", "--stats"])
        .arg("--preset")
        .arg(&preset)
        .output()
        .expect("failed to run glfilter");
    assert!(
        result.status.success(),
        "{}",
        String::from_utf8_lossy(&result.stderr)
    );

    let stats: serde_json::Value = serde_json::from_slice(&result.stdout).unwrap();
    assert_eq!(stats["draws"], 6);
    assert_eq!(stats["programs_linked"], 2);
    assert_eq!(stats["full_uploads"], 1);
    assert_eq!(stats["partial_uploads"], 1);

    let negated = image::open(&output).unwrap().to_rgba8();
    // Negative maps c to 256 - c.
    assert!(negated.pixels().all(|pixel| pixel.0[0].abs_diff(156) <= 1));
}

#[test]
fn unknown_effect_fails_without_writing() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("gray.png");
    let output = root.path().join("never.png");
    write_gray(&input, 128);

    let result = glfilter()
        .arg(&input)
        .arg(&output)
        .args(["--backend", "software", "-e", "doesNotExist"])
        .output()
        .expect("failed to run glfilter");
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("unknown effect 'doesNotExist'"), "{stderr}");
    assert!(!output.exists());
}

#[test]
fn list_prints_the_catalog() {
    let result = glfilter().arg("list").output().expect("failed to run glfilter");
    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    for name in ["blur", "colorMatrix", "pixelate", "shiftToBGR", "sobelX"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
}
