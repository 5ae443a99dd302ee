use clap::{Arg, ArgAction, Command};

/// Overwritten in place by the packaging tool with the installer creation time.
#[used]
static INSTALLER_CREATION_TIME: [u8; 32] = *b"MY_InstallerCreateDateTime_MY\0\0\0";

/// `yyyy-MM-dd - HH:mm:ss`
const CREATION_TIME_LEN: usize = 21;

fn flag(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(long).action(ArgAction::SetTrue).help(help)
}

fn list_option(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .value_name("URLS")
        .action(ArgAction::Set)
        .help(help)
}

/// Describes the command line for `--help`. Parsing is done by the classifier,
/// which needs the positional and legacy forms clap does not model.
pub fn usage_command() -> Command {
    Command::new("setupbase")
        .about("Installer and maintenance tool")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .action(ArgAction::SetTrue)
                .help("Displays this help."),
        )
        .arg(flag("version", "version", "Displays version information."))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose mode. Prints out more information."),
        )
        .arg(flag(
            "proxy",
            "proxy",
            "Use the system proxy for repository access.",
        ))
        .arg(
            Arg::new("script")
                .long("script")
                .value_name("FILE")
                .action(ArgAction::Set)
                .help("Run the installer with the given control script."),
        )
        .arg(flag(
            "show-virtual-components",
            "show-virtual-components",
            "Show virtual components in the package listing.",
        ))
        .arg(flag(
            "updater",
            "updater",
            "Start the maintenance tool in updater mode.",
        ))
        .arg(flag(
            "manage-packages",
            "manage-packages",
            "Start the maintenance tool in package manager mode.",
        ))
        .arg(list_option(
            "addRepository",
            "addRepository",
            "Add comma-separated repositories and remember them.",
        ))
        .arg(list_option(
            "addTempRepository",
            "addTempRepository",
            "Add comma-separated repositories for this session only.",
        ))
        .arg(list_option(
            "setTempRepository",
            "setTempRepository",
            "Use only the given comma-separated repositories for this session.",
        ))
        .arg(flag(
            "no-force-installations",
            "no-force-installations",
            "Allow deselecting components that are marked as forced.",
        ))
        .arg(flag(
            "checkupdates",
            "checkupdates",
            "Check for updates without showing any UI and exit.",
        ))
        .arg(
            Arg::new("settings")
                .value_name("KEY=VALUE")
                .num_args(0..)
                .help("Set installer configuration values."),
        )
}

pub fn usage_text() -> String {
    usage_command().render_help().to_string()
}

pub fn version_lines() -> Vec<String> {
    let mut lines = Vec::new();
    let stamped = std::hint::black_box(&INSTALLER_CREATION_TIME);
    if let Some(created) = parse_creation_time(stamped) {
        lines.push(format!("Installer creation time: {created}"));
    }
    lines.push(format!(
        "Setupbase Version: \"{}\", Installer base SHA1: \"{}\", Build date: {}.",
        env!("CARGO_PKG_VERSION"),
        option_env!("SETUPBASE_GIT_SHA").unwrap_or("unknown"),
        option_env!("SETUPBASE_BUILD_DATE").unwrap_or("unknown"),
    ));
    lines
}

pub(crate) fn parse_creation_time(raw: &[u8]) -> Option<&str> {
    let end = raw.iter().position(|byte| *byte == 0).unwrap_or(raw.len());
    let text = std::str::from_utf8(&raw[..end]).ok()?.trim();
    if text.len() != CREATION_TIME_LEN {
        return None;
    }

    let well_formed = text.bytes().enumerate().all(|(index, byte)| match index {
        4 | 7 => byte == b'-',
        10 | 12 => byte == b' ',
        11 => byte == b'-',
        15 | 18 => byte == b':',
        _ => byte.is_ascii_digit(),
    });
    well_formed.then_some(text)
}
