use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use installer_probe::{charset_candidates_for, InstallerProbe, RootChild, DEFAULT_LANGUAGE_PLACEHOLDER};
use installer_session::Charset;

fn write_fake_installer(dir: &Path, script: &str) -> std::path::PathBuf {
    let path = dir.join("fake-weidu.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// S2 — language list parsing with a gap filled by the default placeholder.
#[tokio::test]
async fn list_languages_fills_gaps_with_default_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_fake_installer(
        &dir,
        r#"printf '0:English\n3:Korean\n'"#,
    );
    let tp2 = dir.path().join("setup-testmod.tp2");
    std::fs::write(&tp2, "").unwrap();

    let probe = InstallerProbe::new(bin);
    let languages = probe.list_languages(&tp2).await.unwrap();

    assert_eq!(
        languages,
        vec![
            "English".to_string(),
            DEFAULT_LANGUAGE_PLACEHOLDER.to_string(),
            DEFAULT_LANGUAGE_PLACEHOLDER.to_string(),
            "Korean".to_string(),
        ]
    );
}

/// S3 — component JSON extraction with a non-JSON prelude line.
#[tokio::test]
async fn list_components_extracts_the_json_line_from_a_prelude() {
    let dir = tempfile::tempdir().unwrap();
    let json = r#"[{"index":0,"number":10,"name":"Core","forced":true,"subgroup":"","group":["A","B"],"label":[],"metadata":[]}]"#;
    let bin = write_fake_installer(
        &dir,
        &format!("printf 'Starting WeiDU...\\n{json}\\n'"),
    );
    let tp2 = dir.path().join("setup-testmod.tp2");
    std::fs::write(&tp2, "").unwrap();

    let probe = InstallerProbe::new(bin);
    let tree = probe
        .list_components(&tp2, 0, &[Charset::Utf8])
        .await
        .unwrap();

    assert_eq!(tree.root_children().len(), 1);
    let RootChild::Component(id) = tree.root_children()[0] else {
        panic!("expected a bare component");
    };
    let component = tree.component(id);
    assert_eq!(component.index, 0);
    assert_eq!(component.id, 10);
    assert!(component.forced);

    let group_names: Vec<&str> = tree.groups().map(|(_, name)| name).collect();
    assert_eq!(group_names, vec!["A", "B"]);
    assert_eq!(component.group_refs.len(), 2);
}

/// Fallback on failure: a failing non-zero-index lookup retries at index 0.
#[tokio::test]
async fn list_components_with_fallback_retries_at_language_zero() {
    let dir = tempfile::tempdir().unwrap();
    let json = r#"[{"index":0,"number":1,"name":"Core","forced":false}]"#;
    let bin = write_fake_installer(
        &dir,
        &format!(
            r#"if [ "$4" = "0" ]; then printf '{json}\n'; else exit 1; fi"#
        ),
    );
    let tp2 = dir.path().join("setup-testmod.tp2");
    std::fs::write(&tp2, "").unwrap();

    let probe = InstallerProbe::new(bin);
    let tree = probe
        .list_components_with_fallback(&tp2, 5, &[Charset::Utf8])
        .await
        .unwrap();

    assert_eq!(tree.root_children().len(), 1);
}

/// S4 — charset candidate ordering.
#[test]
fn charset_candidate_ordering_matches_fragment_table() {
    assert_eq!(
        charset_candidates_for("日本語"),
        vec![Charset::Utf8, Charset::ShiftJis]
    );
    assert_eq!(
        charset_candidates_for("Russian"),
        vec![Charset::Utf8, Charset::Ibm866, Charset::Windows1251]
    );
    assert_eq!(charset_candidates_for("Klingon"), vec![Charset::Utf8]);
}

/// Working-directory rule: grandparent when the tp2's parent folder name
/// normalizes to the mod name.
#[test]
fn working_directory_rule_prefers_grandparent_on_mod_named_folder() {
    let tp2 = Path::new("/games/bg2/ascension/setup-ascension.tp2");
    assert_eq!(
        InstallerProbe::working_dir_for(tp2),
        Path::new("/games/bg2")
    );
}
