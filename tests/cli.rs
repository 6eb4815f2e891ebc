use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::TempDir;

const SAMPLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 3 2 4\n";
const SAMPLE_HDR: &str = "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 1024 +X 2048\n";

fn build_stage(model: &str, environment: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("temp dir");

    let model_path = dir.path().join("model.obj");
    std::fs::File::create(&model_path)
        .expect("model file")
        .write_all(model.as_bytes())
        .expect("write model");

    let env_path = dir.path().join("environment.hdr");
    std::fs::File::create(&env_path)
        .expect("environment file")
        .write_all(environment.as_bytes())
        .expect("write environment");

    let stage = format!(
        r#"<stage>
  <model>
    <path>{}</path>
  </model>
  <environment>
    <path>{}</path>
  </environment>
</stage>
"#,
        model_path.display(),
        env_path.display()
    );
    let stage_path = dir.path().join("stage.xml");
    std::fs::File::create(&stage_path)
        .expect("stage file")
        .write_all(stage.as_bytes())
        .expect("write stage");

    (dir, stage_path)
}

#[test]
fn cli_loads_assets_and_prints_final_state() {
    let (_dir, stage) = build_stage(SAMPLE_OBJ, SAMPLE_HDR);
    let mut cmd = Command::cargo_bin("stagelight").expect("binary exists");
    cmd.arg(&stage).arg("--summary-only").arg("--frames").arg("3");
    cmd.assert()
        .success()
        .stdout(contains("Loaded stage with 3 nodes (2 meshes)"))
        .stdout(contains("Launched 2 asset load(s)"))
        .stdout(contains("Final stage state:"))
        .stdout(contains("sun (light)"))
        .stdout(contains("floor (mesh)"))
        .stdout(contains("wall (mesh)"))
        .stdout(contains("model (mesh)"))
        .stdout(contains("shadow=cast:true receive:true"));
}

#[test]
fn cli_survives_missing_assets() {
    let dir = TempDir::new().expect("temp dir");
    let stage = dir.path().join("stage.xml");
    std::fs::File::create(&stage)
        .expect("stage file")
        .write_all(
            b"<stage>\
              <model><path>/no/such/model.obj</path></model>\
              <environment><path>/no/such/env.hdr</path></environment>\
              </stage>",
        )
        .expect("write stage");

    let mut cmd = Command::cargo_bin("stagelight").expect("binary exists");
    cmd.arg(&stage).arg("--summary-only").arg("--frames").arg("1");
    // Load failures are reported, never fatal; the stage still renders.
    cmd.assert()
        .success()
        .stdout(contains("Final stage state:"))
        .stdout(contains("floor (mesh)"))
        .stdout(contains("wall (mesh)"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    let mut cmd = Command::cargo_bin("stagelight").expect("binary exists");
    cmd.arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument"));
}
