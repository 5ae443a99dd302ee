use super::*;

fn sample_body() -> PayloadBody {
    PayloadBody {
        settings: PayloadSettings {
            name: "Atlas".to_string(),
            version: "2.1.0".to_string(),
            target_dir: Some("/opt/atlas".to_string()),
            repositories: vec!["https://repo.example.test/atlas".to_string()],
        },
        operations: vec![PerformedOperation::new(
            "Mkdir",
            vec!["@TargetDir@/bin".to_string()],
        )],
        components: vec![InstalledComponent {
            name: "atlas.core".to_string(),
            version: "2.1.0".to_string(),
            is_virtual: false,
        }],
    }
}

#[test]
fn payload_trailer_decodes_after_leading_executable_bytes() {
    let content = PayloadContent::new(MagicMarker::Uninstaller, sample_body());
    let mut image = b"\x7fELF fake executable image".to_vec();
    let exe_len = image.len();
    image.extend(encode_payload_trailer(&content).expect("must encode payload"));

    let decoded = decode_payload_trailer(&image).expect("must decode payload");
    assert_eq!(decoded, content);
    assert_eq!(payload_trailer_offset(&image), Some(exe_len));
}

#[test]
fn payload_without_cookie_is_rejected() {
    let err = decode_payload_trailer(&[0_u8; 128]).expect_err("plain bytes carry no payload");
    assert!(
        err.to_string().contains("magic cookie not found"),
        "unexpected error: {err}"
    );
    assert!(payload_trailer_offset(&[0_u8; 128]).is_none());
}

#[test]
fn payload_with_tampered_body_fails_digest_check() {
    let content = PayloadContent::new(MagicMarker::Installer, sample_body());
    let mut image = encode_payload_trailer(&content).expect("must encode payload");
    image[2] ^= 0x20;

    let err = decode_payload_trailer(&image).expect_err("tampered body must be rejected");
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::InvalidPayload { .. })
    ));
    assert!(err.to_string().contains("digest mismatch"));
}

#[test]
fn payload_with_unknown_marker_is_rejected() {
    let content = PayloadContent::new(MagicMarker::Installer, sample_body());
    let mut image = encode_payload_trailer(&content).expect("must encode payload");
    let marker_at = image.len() - 16;
    image[marker_at..marker_at + 8].copy_from_slice(&0xdead_u64.to_le_bytes());

    let err = decode_payload_trailer(&image).expect_err("unknown marker must be rejected");
    assert!(err.to_string().contains("unknown magic marker 0xdead"));
}

#[test]
fn payload_with_oversized_length_is_truncated() {
    let content = PayloadContent::new(MagicMarker::Installer, sample_body());
    let mut image = encode_payload_trailer(&content).expect("must encode payload");
    let len_at = image.len() - 24;
    image[len_at..len_at + 8].copy_from_slice(&u64::MAX.to_le_bytes());

    let err = decode_payload_trailer(&image).expect_err("oversized length must be rejected");
    assert!(err.to_string().contains("truncated payload body"));
}

#[test]
fn core_from_payload_seeds_values_and_history() {
    let content = PayloadContent::new(MagicMarker::Uninstaller, sample_body());
    let core = PackageManagerCore::from_payload(&content);

    assert!(core.is_uninstaller());
    assert!(!core.is_installer());
    assert_eq!(core.value("ProductName"), Some("Atlas"));
    assert_eq!(core.value("TargetDir"), Some("/opt/atlas"));
    assert_eq!(core.performed_operations().len(), 1);
    assert_eq!(core.components()[0].name, "atlas.core");
    assert_eq!(core.status(), Status::Unfinished);
}

#[test]
fn empty_value_is_distinct_from_missing_key() {
    let mut core = PackageManagerCore::new(MagicMarker::Installer, Vec::new());
    core.set_value("AllUsers", "");

    assert_eq!(core.value("AllUsers"), Some(""));
    assert!(core.contains_value("AllUsers"));
    assert_eq!(core.value("TargetDir"), None);
    assert!(!core.contains_value("TargetDir"));
}

#[test]
fn replace_variables_expands_known_keys_only() {
    let mut core = PackageManagerCore::new(MagicMarker::Installer, Vec::new());
    core.set_value("TargetDir", "/opt/atlas");

    assert_eq!(
        core.replace_variables("@TargetDir@/bin/@Unknown@"),
        "/opt/atlas/bin/@Unknown@"
    );
    assert_eq!(core.replace_variables("user@@host"), "user@@host");
    assert_eq!(core.replace_variables("trailing@"), "trailing@");
}

#[test]
fn temporary_repositories_set_then_add_accumulate() {
    let mut core = PackageManagerCore::new(MagicMarker::Installer, Vec::new());
    core.set_temporary_repositories(vec!["x".to_string()], false);
    core.set_temporary_repositories(
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        true,
    );
    core.set_temporary_repositories(vec!["d".to_string()], false);

    assert_eq!(core.temporary_repositories(), ["a", "b", "c", "d"]);
    assert!(core.user_repositories().is_empty());
}

#[test]
fn effective_repositories_prefer_temporary_over_defaults() {
    let content = PayloadContent::new(MagicMarker::Installer, sample_body());
    let mut core = PackageManagerCore::from_payload(&content);
    core.add_user_repositories(vec!["/srv/user-repo".to_string()]);
    assert_eq!(
        core.effective_repositories(),
        vec!["https://repo.example.test/atlas", "/srv/user-repo"]
    );

    core.set_temporary_repositories(vec!["/srv/temp".to_string()], true);
    assert_eq!(
        core.effective_repositories(),
        vec!["/srv/temp", "/srv/user-repo"]
    );
}

#[test]
fn finished_with_success_tracks_status_and_written_tool() {
    let mut core = PackageManagerCore::new(MagicMarker::Installer, Vec::new());
    assert!(!core.finished_with_success());

    core.set_status(Status::Success);
    assert!(core.finished_with_success());

    core.set_status(Status::Canceled);
    assert!(!core.finished_with_success());
    core.set_maintenance_tool_written();
    assert!(core.finished_with_success());
}

#[test]
fn status_codes_are_stable() {
    assert_eq!(ExitStatus::Success.code(), 0);
    assert_eq!(ExitStatus::Failure.code(), 1);
    assert_eq!(ExitStatus::Canceled.code(), 3);
    assert_eq!(Status::Running.code(), 2);
    assert_eq!(Status::Unfinished.code(), 4);
}

#[test]
fn proxy_flag_selects_system_configuration() {
    assert_eq!(
        ProxyMode::resolve(true, Some("http://proxy.local:3128"), true),
        ProxyMode::System
    );
}

#[test]
fn proxy_env_seeds_manual_proxy_when_honored() {
    assert_eq!(
        ProxyMode::resolve(false, Some("proxy.local:3128"), true),
        ProxyMode::Manual("http://proxy.local:3128".to_string())
    );
    assert_eq!(
        ProxyMode::resolve(false, Some("http://user:pw@proxy.local:8080/"), true),
        ProxyMode::Manual("http://user:pw@proxy.local:8080/".to_string())
    );
    assert_eq!(
        ProxyMode::resolve(false, Some("http://proxy.local:3128"), false),
        ProxyMode::None
    );
    assert_eq!(ProxyMode::resolve(false, Some("   "), true), ProxyMode::None);
    assert_eq!(ProxyMode::resolve(false, Some("http://"), true), ProxyMode::None);
}

#[test]
fn show_virtual_components_switches_style() {
    let mut options = RuntimeOptions::default();
    options.show_virtual_components();
    assert!(options.virtual_components_visible);
    assert_eq!(options.virtual_component_style, ComponentStyle::Italic);
}
