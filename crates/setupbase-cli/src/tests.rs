use super::*;
use crate::classify::{classify, InvocationMode, MODE_PRECEDENCE};
use crate::controller::{ConsoleContext, ConsoleController, Controller, GuiFlavor};
use crate::coordinator::{admit_normal_instance, update_flow_blocked, Admission, POLL_INTERVAL};
use crate::normal_mode::{
    apply_arguments, run_normal_session, run_session, translate_outcome, ArgumentOutcome,
    NormalContext, NormalSession,
};
use crate::render::render_component_line;
use crate::usage::{parse_creation_time, usage_text, version_lines};
use setupbase_core::{
    ComponentStyle, InstalledComponent, MagicMarker, MaintenanceMode, PackageManagerCore,
    PayloadBody, PayloadContent, PayloadSettings, PerformedOperation, ProxyMode, RuntimeOptions,
    Status,
};
use setupbase_installer::{
    load_payload, maintenance_tool_file_name, InstanceLock, InstanceProbe, InstanceSignal,
    LockfileGuard, PayloadLocation, ProcessEntry, ProcessLister, SelfRestarter, LOCKFILE_NAME,
};
use setupbase_registry::RepositoryStore;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

fn test_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("setupbase-cli-test-{name}-{nanos}"));
    fs::create_dir_all(&path).expect("must create test dir");
    path
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn mode_of(values: &[&str]) -> InvocationMode {
    classify(&ArgumentSet::new(args(values))).mode
}

fn installer_core() -> PackageManagerCore {
    PackageManagerCore::new(MagicMarker::Installer, Vec::new())
}

fn uninstaller_core() -> PackageManagerCore {
    PackageManagerCore::new(MagicMarker::Uninstaller, Vec::new())
}

fn normal_context(root: &std::path::Path) -> NormalContext {
    NormalContext {
        store: RepositoryStore::new(root.join("repositories.toml")),
        http_proxy: None,
        style: OutputStyle::Plain,
    }
}

fn expect_session(outcome: ArgumentOutcome) -> NormalSession {
    match outcome {
        ArgumentOutcome::Continue(session) => session,
        ArgumentOutcome::Exit(status) => panic!("unexpected early exit: {status:?}"),
    }
}

struct ScriptedProbe {
    lockfile: bool,
    process_list: RefCell<VecDeque<bool>>,
    claimed_first: bool,
}

impl ScriptedProbe {
    fn new(lockfile: bool, process_list: &[bool]) -> Self {
        Self {
            lockfile,
            process_list: RefCell::new(process_list.iter().copied().collect()),
            claimed_first: true,
        }
    }
}

impl InstanceProbe for ScriptedProbe {
    type Claim = &'static str;

    fn is_running(&self, signal: InstanceSignal) -> bool {
        match signal {
            InstanceSignal::Lockfile => self.lockfile,
            InstanceSignal::ProcessList => {
                self.process_list.borrow_mut().pop_front().unwrap_or(false)
            }
        }
    }

    fn claim(&self) -> anyhow::Result<&'static str> {
        Ok("claimed")
    }

    fn try_claim(&self) -> anyhow::Result<Option<&'static str>> {
        Ok(self.claimed_first.then_some("created"))
    }
}

/// Lists this binary under `own_pid` and a sibling for the first
/// `sibling_listings` calls.
struct SiblingLister {
    own_pid: u32,
    sibling_pid: u32,
    sibling_listings: Cell<u32>,
}

impl ProcessLister for SiblingLister {
    fn list_processes(&self) -> anyhow::Result<Vec<ProcessEntry>> {
        let mut processes = vec![ProcessEntry {
            pid: self.own_pid,
            name: "setupbase".to_string(),
        }];
        let remaining = self.sibling_listings.get();
        if remaining > 0 {
            self.sibling_listings.set(remaining - 1);
            processes.push(ProcessEntry {
                pid: self.sibling_pid,
                name: "setupbase".to_string(),
            });
        }
        Ok(processes)
    }
}

fn sibling_lock(
    path: &std::path::Path,
    own_pid: u32,
    sibling_pid: u32,
    listings: u32,
) -> InstanceLock<SiblingLister> {
    InstanceLock::with_lister(
        path,
        "setupbase",
        own_pid,
        SiblingLister {
            own_pid,
            sibling_pid,
            sibling_listings: Cell::new(listings),
        },
    )
}

/// Sees the lockfile as it was before the sibling launch created it.
struct EarlyLockfileRead<'a>(&'a InstanceLock<SiblingLister>);

impl InstanceProbe for EarlyLockfileRead<'_> {
    type Claim = LockfileGuard;

    fn is_running(&self, signal: InstanceSignal) -> bool {
        match signal {
            InstanceSignal::Lockfile => false,
            InstanceSignal::ProcessList => self.0.is_running(signal),
        }
    }

    fn claim(&self) -> anyhow::Result<LockfileGuard> {
        self.0.claim()
    }

    fn try_claim(&self) -> anyhow::Result<Option<LockfileGuard>> {
        self.0.try_claim()
    }
}

#[derive(Clone)]
struct FakeController {
    events: Rc<RefCell<Vec<String>>>,
    init_status: Status,
    exec_result: i32,
    final_status: Status,
}

impl FakeController {
    fn new(events: Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            events,
            init_status: Status::Success,
            exec_result: 0,
            final_status: Status::Success,
        }
    }
}

impl Controller for FakeController {
    fn set_manager_params(&mut self, params: BTreeMap<String, String>) {
        self.events
            .borrow_mut()
            .push(format!("params:{}", params.len()));
    }

    fn set_control_script(&mut self, script: Option<PathBuf>) {
        self.events
            .borrow_mut()
            .push(format!("script:{}", script.is_some()));
    }

    fn set_gui(&mut self, flavor: GuiFlavor) {
        self.events.borrow_mut().push(format!("gui:{flavor:?}"));
    }

    fn init(&mut self, _core: &mut PackageManagerCore) -> Status {
        self.events.borrow_mut().push("init".to_string());
        self.init_status
    }

    fn exec(&mut self, core: &mut PackageManagerCore) -> anyhow::Result<i32> {
        self.events.borrow_mut().push("exec".to_string());
        core.set_status(self.final_status);
        Ok(self.exec_result)
    }
}

#[test]
fn version_wins_over_every_other_mode() {
    assert_eq!(
        mode_of(&["--checkupdates", "--runoperation", "Mkdir", "--version"]),
        InvocationMode::Version
    );
    assert_eq!(
        mode_of(&["--startserver", "4000", "--version"]),
        InvocationMode::Version
    );

    let classification = classify(&ArgumentSet::new(args(&["--version", "--verbose"])));
    assert!(classification.residual.is_empty());
    let lines = version_lines();
    assert!(lines
        .last()
        .expect("must print a version line")
        .starts_with("Setupbase Version: \""));
}

#[test]
fn precedence_table_lists_modes_in_fixed_order() {
    let order: Vec<InvocationMode> = MODE_PRECEDENCE.iter().map(|(mode, _)| *mode).collect();
    assert_eq!(
        order,
        vec![
            InvocationMode::Version,
            InvocationMode::StartServer,
            InvocationMode::CheckUpdates,
            InvocationMode::RunOperation,
            InvocationMode::UndoOperation,
            InvocationMode::UpdateInstallerBase,
        ]
    );
}

#[test]
fn check_updates_beats_operations_and_base_update() {
    assert_eq!(
        mode_of(&["--runoperation", "Mkdir", "/tmp/x", "--checkupdates"]),
        InvocationMode::CheckUpdates
    );
    assert_eq!(
        mode_of(&["--update-installerbase", "/tmp/new", "--undooperation", "Delete"]),
        InvocationMode::UndoOperation
    );
    assert_eq!(
        mode_of(&["--update-installerbase", "/tmp/new"]),
        InvocationMode::UpdateInstallerBase
    );

    let classification = classify(&ArgumentSet::new(args(&["-v", "--checkupdates", "--proxy"])));
    assert_eq!(classification.residual, args(&["-v", "--proxy"]));
}

#[test]
fn start_server_must_lead_the_command_line() {
    let classification = classify(&ArgumentSet::new(args(&["--startserver", "4000", "key"])));
    assert_eq!(classification.mode, InvocationMode::StartServer);
    assert_eq!(classification.residual, args(&["4000", "key"]));

    assert_eq!(mode_of(&["-v", "--startserver", "4000"]), InvocationMode::Normal);
    assert_eq!(mode_of(&["--startserver"]), InvocationMode::Normal);
}

#[test]
fn unmatched_input_is_normal_mode_with_all_tokens() {
    let classification = classify(&ArgumentSet::new(args(&["TargetDir=/opt", "--weird"])));
    assert_eq!(classification.mode, InvocationMode::Normal);
    assert_eq!(classification.residual, args(&["TargetDir=/opt", "--weird"]));
    assert_eq!(mode_of(&[]), InvocationMode::Normal);
}

#[test]
fn argument_set_keeps_last_value_and_splits_at_first_separator() {
    let set = ArgumentSet::new(args(&["a=1", "", "b=x=y", "a=2", "c=", "-v"]));
    let value = |key: &str| set.values().get(key).map(String::as_str);
    assert_eq!(value("a"), Some("2"));
    assert_eq!(value("b"), Some("x=y"));
    assert_eq!(value("c"), Some(""));
    assert_eq!(value("d"), None);
    assert!(set.is_verbose());
    assert_eq!(set.len(), 6);
    assert_eq!(
        set.unknown_flags(&["-v"]),
        Vec::<&str>::new()
    );
}

#[test]
fn coordinator_proceeds_when_no_sibling_is_listed() {
    let probe = ScriptedProbe::new(true, &[false]);
    let admission = admit_normal_instance(&probe, |_| panic!("must not sleep"));
    assert_eq!(
        admission,
        Admission::Proceed {
            polls: 0,
            lockfile: Some("claimed")
        }
    );
}

#[test]
fn coordinator_reports_already_open_instance() {
    let probe = ScriptedProbe::new(true, &[true, true, true]);
    let admission = admit_normal_instance(&probe, |_| panic!("must not sleep"));
    assert_eq!(admission, Admission::AlreadyOpen);
}

#[test]
fn coordinator_waits_for_unlocked_sibling_to_exit() {
    let probe = ScriptedProbe::new(false, &[true, true, true, true, false]);
    let slept = RefCell::new(Vec::new());
    let admission = admit_normal_instance(&probe, |interval| slept.borrow_mut().push(interval));

    assert_eq!(
        admission,
        Admission::Proceed {
            polls: 3,
            lockfile: Some("created")
        }
    );
    assert_eq!(slept.into_inner(), vec![POLL_INTERVAL; 3]);
    assert_eq!(POLL_INTERVAL, Duration::from_secs(1));
}

#[test]
fn coordinator_backs_off_when_sibling_creates_lockfile_first() {
    let mut probe = ScriptedProbe::new(false, &[true, true]);
    probe.claimed_first = false;
    let admission = admit_normal_instance(&probe, |_| panic!("must not sleep"));
    assert_eq!(admission, Admission::AlreadyOpen);
}

#[test]
fn concurrent_launches_admit_exactly_one_instance() {
    let root = test_dir("concurrent");
    let path = root.join(LOCKFILE_NAME);
    let first = sibling_lock(&path, 100, 200, 2);
    let second = sibling_lock(&path, 200, 100, u32::MAX);

    let slept = Cell::new(0_u32);
    let admitted = admit_normal_instance(&EarlyLockfileRead(&first), |_| {
        slept.set(slept.get() + 1)
    });
    let guard = match admitted {
        Admission::Proceed { polls, lockfile } => {
            assert_eq!(polls, 1);
            lockfile.expect("first launch must hold the lockfile")
        }
        Admission::AlreadyOpen => panic!("first launch must be admitted"),
    };
    assert_eq!(slept.get(), 1);

    let backed_off = admit_normal_instance(&EarlyLockfileRead(&second), |_| {
        panic!("second launch must not wait")
    });
    assert!(matches!(backed_off, Admission::AlreadyOpen));
    assert_eq!(
        fs::read_to_string(&path).expect("must read lockfile").trim(),
        "100"
    );

    drop(guard);
    assert!(!path.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn update_flows_are_skipped_while_a_sibling_runs() {
    assert!(update_flow_blocked(&ScriptedProbe::new(false, &[true])));
    assert!(!update_flow_blocked(&ScriptedProbe::new(true, &[false])));
}

#[test]
fn version_mode_needs_no_state_root() {
    let root = test_dir("version-layout");
    let context = LaunchContext {
        args: ArgumentSet::new(args(&["--verbose", "--version"])),
        current_exe: root.join("setupbase"),
        layout: InstallerLayout::in_temp_dir(&root),
        style: OutputStyle::Plain,
    };
    let mut restarter = SelfRestarter::new(root.join("setupbase"));

    let code = run_mode(&context, &mut restarter).expect("version mode must not fail");
    assert_eq!(code, ExitStatus::Success.code());
    assert!(restarter.pending_args().is_none());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_script_fails_before_controller_runs() {
    let root = test_dir("missing-script");
    let context = normal_context(&root);
    let mut core = installer_core();
    let built = Cell::new(false);

    let code = run_normal_session(
        &mut core,
        &args(&["--script", &root.join("missing.qs").display().to_string()]),
        &context,
        |_| {
            built.set(true);
            Ok(FakeController::new(Rc::default()))
        },
    )
    .expect("missing script is not fatal");

    assert_eq!(code, Status::Failure.code());
    assert!(!built.get());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn existing_script_is_handed_to_controller() {
    let root = test_dir("script");
    let script = root.join("control.qs");
    fs::write(&script, "function Controller() {}").expect("must write script");
    let context = normal_context(&root);
    let mut core = installer_core();
    let events = Rc::new(RefCell::new(Vec::new()));

    let code = run_normal_session(
        &mut core,
        &args(&["Script", &script.display().to_string(), "Key=value"]),
        &context,
        |_| Ok(FakeController::new(Rc::clone(&events))),
    )
    .expect("must run session");

    assert_eq!(code, 0);
    assert_eq!(
        *events.borrow(),
        vec![
            "params:1".to_string(),
            "script:true".to_string(),
            "gui:Installer".to_string(),
            "init".to_string(),
            "exec".to_string(),
        ]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn temporary_repositories_accumulate_without_persisting() {
    let root = test_dir("temp-repos");
    let context = normal_context(&root);
    let mut core = installer_core();

    let outcome = apply_arguments(
        &args(&[
            "--addTempRepository",
            "z",
            "--setTempRepository",
            "a,b,c",
            "--addTempRepository",
            "d",
        ]),
        &mut core,
        &context,
    )
    .expect("must apply arguments");
    expect_session(outcome);

    assert_eq!(core.temporary_repositories(), args(&["a", "b", "c", "d"]).as_slice());
    assert!(core.user_repositories().is_empty());
    assert!(!context.store.path().exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn add_repository_persists_user_repositories() {
    let root = test_dir("user-repos");
    let context = normal_context(&root);
    let mut core = installer_core();

    let outcome = apply_arguments(
        &args(&["--addRepository", " https://r1.example , /srv/r2 "]),
        &mut core,
        &context,
    )
    .expect("must apply arguments");
    expect_session(outcome);

    let expected = args(&["https://r1.example", "/srv/r2"]);
    assert_eq!(core.user_repositories(), expected.as_slice());
    assert_eq!(
        context.store.list_repositories().expect("must list store"),
        expected
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn repository_flags_without_usable_list_fail() {
    let root = test_dir("empty-repos");
    let context = normal_context(&root);

    for tokens in [
        args(&["--addTempRepository"]),
        args(&["--setTempRepository", " , "]),
        args(&["--addRepository", ""]),
    ] {
        let mut core = installer_core();
        let outcome = apply_arguments(&tokens, &mut core, &context).expect("must not be fatal");
        assert_eq!(outcome, ArgumentOutcome::Exit(ExitStatus::Failure));
    }
    assert!(!context.store.path().exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn empty_value_is_recorded_and_distinct_from_absent_key() {
    let root = test_dir("empty-value");
    let context = normal_context(&root);
    let mut core = installer_core();

    let session = expect_session(
        apply_arguments(&args(&["key=", "other=a=b"]), &mut core, &context)
            .expect("must apply arguments"),
    );

    assert_eq!(session.params.get("key").map(String::as_str), Some(""));
    assert_eq!(core.value("key"), Some(""));
    assert!(core.contains_value("key"));
    assert!(!core.contains_value("absent"));
    assert_eq!(core.value("other"), Some("a=b"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn help_exits_successfully_without_running_controller() {
    let root = test_dir("help");
    let context = normal_context(&root);
    let mut core = installer_core();
    let built = Cell::new(false);

    let code = run_normal_session(&mut core, &args(&["-h", "--bogus"]), &context, |_| {
        built.set(true);
        Ok(FakeController::new(Rc::default()))
    })
    .expect("help must succeed");

    assert_eq!(code, Status::Success.code());
    assert!(!built.get());
    assert!(usage_text().contains("--addTempRepository"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn maintenance_submodes_require_an_uninstaller() {
    let root = test_dir("submodes");
    let context = normal_context(&root);

    let mut installer = installer_core();
    expect_session(
        apply_arguments(&args(&["--updater"]), &mut installer, &context).expect("must apply"),
    );
    assert_eq!(installer.maintenance_mode(), MaintenanceMode::Uninstall);

    let mut updater = uninstaller_core();
    expect_session(
        apply_arguments(&args(&["Updater"]), &mut updater, &context).expect("must apply"),
    );
    assert_eq!(updater.maintenance_mode(), MaintenanceMode::Updater);

    let mut manager = uninstaller_core();
    expect_session(
        apply_arguments(&args(&["--manage-packages"]), &mut manager, &context)
            .expect("must apply"),
    );
    assert_eq!(manager.maintenance_mode(), MaintenanceMode::PackageManager);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn runtime_switches_are_collected_into_options() {
    let root = test_dir("switches");
    let context = normal_context(&root);
    let mut core = installer_core();

    let session = expect_session(
        apply_arguments(
            &args(&[
                "--verbose",
                "ShowVirtualComponents",
                "--no-force-installations",
                "--proxy",
                "--not-a-flag",
            ]),
            &mut core,
            &context,
        )
        .expect("must apply arguments"),
    );

    assert!(session.runtime.verbose);
    assert!(session.runtime.virtual_components_visible);
    assert_eq!(session.runtime.virtual_component_style, ComponentStyle::Italic);
    assert!(session.runtime.no_force_installations);
    assert_eq!(session.runtime.proxy, ProxyMode::System);
    assert!(core.is_verbose());
    assert_eq!(core.proxy(), &ProxyMode::System);

    let _ = fs::remove_dir_all(&root);
}

#[cfg(all(unix, not(target_vendor = "apple")))]
#[test]
fn http_proxy_environment_seeds_manual_proxy() {
    let root = test_dir("env-proxy");
    let mut context = normal_context(&root);
    context.http_proxy = Some("proxy.internal:3128".to_string());
    let mut core = installer_core();

    let session = expect_session(
        apply_arguments(&[], &mut core, &context).expect("must apply arguments"),
    );
    assert_eq!(
        session.runtime.proxy,
        ProxyMode::Manual("http://proxy.internal:3128".to_string())
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn outcome_translation_prefers_loop_result_then_core_state() {
    let mut core = installer_core();
    assert_eq!(translate_outcome(7, &core), 7);

    core.set_status(Status::Success);
    assert_eq!(translate_outcome(0, &core), 0);

    core.set_status(Status::Canceled);
    assert_eq!(translate_outcome(0, &core), Status::Canceled.code());

    core.set_status(Status::Unfinished);
    assert_eq!(translate_outcome(0, &core), Status::Failure.code());

    core.set_status(Status::Failure);
    core.set_maintenance_tool_written();
    assert_eq!(translate_outcome(0, &core), 0);
}

#[test]
fn failed_controller_init_aborts_with_its_status() {
    let mut core = installer_core();
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut controller = FakeController::new(Rc::clone(&events));
    controller.init_status = Status::Canceled;

    let code = run_session(
        &mut core,
        NormalSession::default(),
        &mut controller,
        OutputStyle::Plain,
    )
    .expect("init failure is not fatal");

    assert_eq!(code, Status::Canceled.code());
    assert!(!events.borrow().iter().any(|event| event == "exec"));
}

#[test]
fn nonzero_event_loop_result_is_returned_verbatim() {
    let mut core = uninstaller_core();
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut controller = FakeController::new(Rc::clone(&events));
    controller.exec_result = 42;

    let code = run_session(
        &mut core,
        NormalSession::default(),
        &mut controller,
        OutputStyle::Plain,
    )
    .expect("must run session");

    assert_eq!(code, 42);
    assert!(events.borrow().contains(&"gui:Maintenance".to_string()));
}

fn console_controller(root: &std::path::Path) -> ConsoleController {
    let source_exe = root.join("installerbase");
    fs::write(&source_exe, b"#!fake installer base").expect("must write fake executable");
    ConsoleController::new(ConsoleContext {
        source_exe,
        backups_dir: root.join("backups"),
        runtime: RuntimeOptions::default(),
        style: OutputStyle::Plain,
    })
}

fn run_console(controller: &mut ConsoleController, core: &mut PackageManagerCore) -> i32 {
    controller.set_gui(GuiFlavor::for_core(core));
    assert_eq!(controller.init(core), Status::Success);
    let loop_result = controller.exec(core).expect("console loop must not fail");
    translate_outcome(loop_result, core)
}

#[test]
fn console_install_then_uninstall_round_trip() {
    let root = test_dir("console-install");
    let target = root.join("target");
    fs::create_dir_all(&target).expect("must create target dir");

    let payload = PayloadContent::new(
        MagicMarker::Installer,
        PayloadBody {
            settings: PayloadSettings {
                name: "Atlas".to_string(),
                version: "1.0.0".to_string(),
                target_dir: Some(target.display().to_string()),
                repositories: Vec::new(),
            },
            operations: vec![
                PerformedOperation::new("Mkdir", args(&["@TargetDir@/bin"])),
                PerformedOperation::new(
                    "AppendFile",
                    args(&["@TargetDir@/bin/readme.txt", "hello"]),
                ),
            ],
            components: vec![InstalledComponent {
                name: "atlas.core".to_string(),
                version: "1.0.0".to_string(),
                is_virtual: false,
            }],
        },
    );
    let mut core = PackageManagerCore::from_payload(&payload);
    let mut controller = console_controller(&root);

    assert_eq!(run_console(&mut controller, &mut core), 0);
    assert_eq!(core.status(), Status::Success);
    assert_eq!(
        fs::read_to_string(target.join("bin").join("readme.txt")).expect("must read file"),
        "hello"
    );

    let tool = target.join(maintenance_tool_file_name());
    let written = load_payload(&PayloadLocation::Embedded(tool)).expect("must load tool payload");
    assert_eq!(written.magic_marker, MagicMarker::Uninstaller);
    assert_eq!(written.performed_operations().len(), 2);
    assert!(written.performed_operations()[0]
        .values
        .contains_key("createddir"));

    let mut maintenance = PackageManagerCore::from_payload(&written);
    assert_eq!(run_console(&mut controller, &mut maintenance), 0);
    assert!(!target.join("bin").exists());
    assert!(target.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn console_install_rolls_back_on_failure() {
    let root = test_dir("console-rollback");
    let created = root.join("created");
    let mut core = PackageManagerCore::new(
        MagicMarker::Installer,
        vec![
            PerformedOperation::new("Mkdir", vec![created.display().to_string()]),
            PerformedOperation::new(
                "Copy",
                vec![
                    root.join("missing").display().to_string(),
                    created.join("copy").display().to_string(),
                ],
            ),
        ],
    );
    let mut controller = console_controller(&root);

    assert_eq!(run_console(&mut controller, &mut core), Status::Failure.code());
    assert_eq!(core.status(), Status::Failure);
    assert!(!created.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rich_status_lines_carry_badges() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed Atlas 1.0.0"),
        "installed Atlas 1.0.0"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "installed Atlas 1.0.0"),
        "[OK] installed Atlas 1.0.0"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "error", "Unknown error, aborting."),
        "[ERR] Unknown error, aborting."
    );
}

#[test]
fn virtual_components_are_marked_in_listings() {
    let component = InstalledComponent {
        name: "atlas.runtime".to_string(),
        version: "2.0.0".to_string(),
        is_virtual: true,
    };
    assert_eq!(
        render_component_line(OutputStyle::Plain, &component, ComponentStyle::Italic),
        "component: atlas.runtime 2.0.0 (virtual)"
    );
    let rich = render_component_line(OutputStyle::Rich, &component, ComponentStyle::Italic);
    assert!(rich.contains("component: atlas.runtime 2.0.0 (virtual)"));
    assert_ne!(rich, "component: atlas.runtime 2.0.0 (virtual)");
}

#[test]
fn creation_time_only_accepts_stamped_timestamps() {
    assert_eq!(
        parse_creation_time(b"2026-10-17 - 14:03:59\0\0\0"),
        Some("2026-10-17 - 14:03:59")
    );
    assert_eq!(parse_creation_time(b"MY_InstallerCreateDateTime_MY\0\0\0"), None);
    assert_eq!(parse_creation_time(b"2026/10/17 - 14:03:59"), None);
}

#[test]
fn boundary_reports_domain_errors_by_message() {
    let err = anyhow::Error::from(setupbase_core::SetupError::InvalidServerPort {
        value: "abc".to_string(),
    })
    .context("failed to start server");
    assert_eq!(describe_error(&err), "invalid server port: 'abc'");

    let generic = anyhow::anyhow!("disk full").context("failed writing payload");
    assert_eq!(describe_error(&generic), "failed writing payload: disk full");
}

#[test]
fn boundary_maps_every_escape_to_failure() {
    assert_eq!(run_guarded(OutputStyle::Plain, || Ok(3)), 3);
    assert_eq!(
        run_guarded(OutputStyle::Plain, || Err(anyhow::anyhow!("boom"))),
        ExitStatus::Failure.code()
    );
    assert_eq!(
        run_guarded(OutputStyle::Plain, || panic!("unexpected state")),
        ExitStatus::Failure.code()
    );
}
