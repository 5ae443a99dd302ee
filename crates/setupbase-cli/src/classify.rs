use std::collections::{BTreeMap, BTreeSet};

use setupbase_installer::UPDATE_BASE_FLAG;

pub const VERSION_FLAG: &str = "--version";
pub const START_SERVER_FLAG: &str = "--startserver";
pub const CHECK_UPDATES_FLAG: &str = "--checkupdates";
pub const RUN_OPERATION_FLAG: &str = "--runoperation";
pub const UNDO_OPERATION_FLAG: &str = "--undooperation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationMode {
    Version,
    StartServer,
    CheckUpdates,
    RunOperation,
    UndoOperation,
    UpdateInstallerBase,
    Normal,
}

/// Raw command line tokens (program name excluded) with the derived
/// `key=value` map and flag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSet {
    tokens: Vec<String>,
    values: BTreeMap<String, String>,
    flags: BTreeSet<String>,
}

impl ArgumentSet {
    pub fn new(tokens: Vec<String>) -> Self {
        let mut values = BTreeMap::new();
        let mut flags = BTreeSet::new();
        for token in &tokens {
            if let Some((key, value)) = token.split_once('=') {
                values.insert(key.to_string(), value.to_string());
            } else if token.starts_with('-') {
                flags.insert(token.clone());
            }
        }
        Self {
            tokens,
            values,
            flags,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// `key=value` tokens; later occurrences of a key win.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn is_verbose(&self) -> bool {
        self.has_flag("--verbose") || self.has_flag("-v")
    }

    /// Flags outside `known`, in command line order.
    pub fn unknown_flags<'a>(&'a self, known: &[&str]) -> Vec<&'a str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .filter(|token| token.starts_with('-') && !token.contains('='))
            .filter(|token| !known.contains(token))
            .collect()
    }
}

type ModePredicate = fn(&ArgumentSet) -> bool;

/// Evaluated top-down; the first matching predicate selects the mode.
pub const MODE_PRECEDENCE: [(InvocationMode, ModePredicate); 6] = [
    (InvocationMode::Version, |args| args.has_flag(VERSION_FLAG)),
    (InvocationMode::StartServer, |args| {
        args.first() == Some(START_SERVER_FLAG) && args.len() >= 2
    }),
    (InvocationMode::CheckUpdates, |args| {
        args.has_flag(CHECK_UPDATES_FLAG)
    }),
    (InvocationMode::RunOperation, |args| {
        args.has_flag(RUN_OPERATION_FLAG)
    }),
    (InvocationMode::UndoOperation, |args| {
        args.has_flag(UNDO_OPERATION_FLAG)
    }),
    (InvocationMode::UpdateInstallerBase, |args| {
        args.has_flag(UPDATE_BASE_FLAG)
    }),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mode: InvocationMode,
    /// Tokens left for the selected mode's own parsing.
    pub residual: Vec<String>,
}

pub fn classify(args: &ArgumentSet) -> Classification {
    let mode = MODE_PRECEDENCE
        .iter()
        .find(|(_, predicate)| predicate(args))
        .map(|(mode, _)| *mode)
        .unwrap_or(InvocationMode::Normal);

    let residual = match mode {
        InvocationMode::Version => Vec::new(),
        InvocationMode::StartServer => args.tokens()[1..].to_vec(),
        InvocationMode::CheckUpdates => args
            .tokens()
            .iter()
            .filter(|token| *token != CHECK_UPDATES_FLAG)
            .cloned()
            .collect(),
        InvocationMode::RunOperation
        | InvocationMode::UndoOperation
        | InvocationMode::UpdateInstallerBase
        | InvocationMode::Normal => args.tokens().to_vec(),
    };

    Classification { mode, residual }
}
