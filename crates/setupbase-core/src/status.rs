/// Lifecycle status of a package manager run.
///
/// The numeric values are the process exit codes handed back to whoever
/// launched the installer, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Failure,
    Running,
    Canceled,
    Unfinished,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Running => 2,
            Self::Canceled => 3,
            Self::Unfinished => 4,
        }
    }
}

/// Terminal outcome of a launcher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Success,
    Failure,
    Canceled,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self.status().code()
    }

    pub fn status(self) -> Status {
        match self {
            Self::Success => Status::Success,
            Self::Failure => Status::Failure,
            Self::Canceled => Status::Canceled,
        }
    }
}
