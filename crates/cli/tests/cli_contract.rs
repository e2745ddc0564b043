use assert_cmd::cargo::cargo_bin_cmd;
use pdf_annotator_engine::{
    build_blank_document, build_document, default_engine, OpenSource, RenderRequest,
};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn write_pdf(dir: &Path, name: &str, sizes: &[(f32, f32)]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, build_blank_document(sizes).expect("blank document should build"))
        .expect("fixture should be written");
    path
}

fn write_script(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("script.json");
    fs::write(&path, contents).expect("script should be written");
    path
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "two.pdf", &[(200.0, 100.0), (300.0, 150.0)]);

    let output = cargo_bin_cmd!("pdf-annotator-cli")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let mut value: Value =
        serde_json::from_slice(&output).expect("stdout should contain valid json");
    value["path"] = Value::String("<FIXTURE>".to_owned());

    insta::with_settings!({ sort_maps => true }, {
        insta::assert_json_snapshot!(value, @r#"
        {
          "page_count": 2,
          "pages": [
            {
              "height": 100.0,
              "rotation": 0,
              "width": 200.0
            },
            {
              "height": 150.0,
              "rotation": 0,
              "width": 300.0
            }
          ],
          "path": "<FIXTURE>"
        }
        "#);
    });
}

#[test]
fn render_page_writes_png_at_zoom() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(200.0, 100.0), (150.0, 150.0)]);
    let script = write_script(
        temp.path(),
        r#"[
            {"op": "page", "page": 2},
            {"op": "tool", "tool": "rect"},
            {"op": "drag", "from": [10, 10], "to": [60, 40]}
        ]"#,
    );
    let output_path = temp.path().join("out/page.png");

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("render-page")
        .arg(&pdf)
        .arg("--page")
        .arg("2")
        .arg("--zoom")
        .arg("200")
        .arg("--script")
        .arg(&script)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let image = image::open(&output_path).expect("page should be a readable image").to_rgba8();
    assert_eq!(image.dimensions(), (300, 300));
    // top edge of the rectangle at 200%
    assert_ne!(image.get_pixel(70, 20).0, [255, 255, 255, 255]);
    assert_eq!(image.get_pixel(250, 250).0, [255, 255, 255, 255]);
}

#[test]
fn annotate_exports_every_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(200.0, 100.0); 3]);
    let script = write_script(
        temp.path(),
        r##"[
            {"op": "tool", "tool": "pen"},
            {"op": "stroke", "points": [[10, 10], [20, 30], [40, 35]]},
            {"op": "page", "page": 3},
            {"op": "tool", "tool": "text"},
            {"op": "click", "at": [30, 40]},
            {"op": "text", "text": "Reviewed"},
            {"op": "confirm"},
            {"op": "stamp", "stamp": {"stamp": "preset", "preset": "approved"}}
        ]"##,
    );
    let output_path = temp.path().join("annotated.pdf");

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("annotate")
        .arg(&pdf)
        .arg("--script")
        .arg(&script)
        .arg("--page-labels")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("annotated.pdf"));

    let mut engine = default_engine();
    let handle = engine
        .open(OpenSource::from(output_path.as_path()))
        .expect("exported PDF should open");
    assert_eq!(engine.page_count(handle).expect("page count"), 3);
    let size = engine.page_size(handle, 2).expect("page size");
    assert_eq!((size.width_pt, size.height_pt), (200.0, 100.0));
}

#[test]
fn annotate_keeps_source_page_content() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = temp.path().join("filled.pdf");
    // lower half of the page filled black
    let source = build_document(&[((200.0, 100.0), b"0 g 0 0 200 50 re f".as_slice())])
        .expect("document should build");
    fs::write(&pdf, source).expect("fixture should be written");
    let script = write_script(
        temp.path(),
        r#"[
            {"op": "tool", "tool": "rect"},
            {"op": "drag", "from": [20, 10], "to": [60, 30]}
        ]"#,
    );
    let output_path = temp.path().join("out.pdf");

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("annotate")
        .arg(&pdf)
        .arg("--script")
        .arg(&script)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let mut engine = default_engine();
    let handle = engine
        .open(OpenSource::from(output_path.as_path()))
        .expect("exported PDF should open");
    let page = engine
        .render_page(handle, RenderRequest { page_index: 0, scale: 1.0 })
        .expect("exported page should render");
    assert_eq!(page.get_pixel(100, 80).0, [0, 0, 0, 255]);
    assert_eq!(page.get_pixel(150, 20).0, [255, 255, 255, 255]);
    assert_ne!(page.get_pixel(40, 10).0, [255, 255, 255, 255]);
}

#[test]
fn annotate_reports_failing_operation() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(200.0, 100.0)]);
    let script = write_script(temp.path(), r#"[{"op": "page", "page": 4}]"#);

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("annotate")
        .arg(&pdf)
        .arg("--script")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("script operation 1 (page)"))
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn annotate_rejects_malformed_script() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(200.0, 100.0)]);
    let script = write_script(temp.path(), r#"{"op": "tool"}"#);

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("annotate")
        .arg(&pdf)
        .arg("--script")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid annotation script"));
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    fs::write(&path, b"not a pdf").expect("fixture should be written");

    cargo_bin_cmd!("pdf-annotator-cli")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}
